//! Port definitions for the synchronization engine.
//!
//! These traits define the two external collaborators:
//! - `RepositoryStore`: reads trees and files at a commit, diffs commits by
//!   path, writes commits with arbitrary path mutations, manages tags.
//! - `DatabaseService`: enumerates catalog objects and applies DDL changes
//!   for a named database.
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{DbObject, RepoChange};
use crate::error::{DbResult, StoreResult};

/// Kind of change between two commits for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Rename,
    Copy,
}

/// One path-level difference between two commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub change_type: ChangeType,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
}

impl DiffEntry {
    /// The path this entry primarily refers to (new side, else old side).
    pub fn path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("")
    }
}

/// Repository access at the granularity the engine needs.
///
/// Guarantees:
/// - Tree reads and diffs at a fixed commit are concurrent-safe.
/// - Mutating operations (commit, tag move, push) are serialized by the
///   implementation; commits are append-only on the default branch tip.
/// - `commit_and_push` applies all changes atomically in one commit.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Whether the repository has no commits (unborn HEAD).
    async fn is_empty(&self) -> StoreResult<bool>;

    /// Whether the commitish resolves to the default-branch tip.
    async fn is_head(&self, commitish: &str) -> StoreResult<bool>;

    /// Whether a tag with this exact name exists.
    async fn tag_exists(&self, name: &str) -> StoreResult<bool>;

    /// Read one file at a commit. `None` when the path is absent.
    async fn read_file(&self, commitish: &str, path: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Read every file under a folder at a commit, keyed by full path.
    async fn read_tree(&self, commitish: &str, folder: &str)
        -> StoreResult<BTreeMap<String, Vec<u8>>>;

    /// Path-level differences between two commits, restricted to paths under
    /// any of `path_filters` (all paths when empty).
    async fn diff(
        &self,
        from_commitish: &str,
        to_commitish: &str,
        path_filters: &[String],
    ) -> StoreResult<Vec<DiffEntry>>;

    /// Write a commit applying `changes` to the branch tip (`content = None`
    /// deletes the path), point each tag in `tags` at it, push, and return
    /// the new commit id.
    async fn commit_and_push(
        &self,
        changes: &[RepoChange],
        message: &str,
        tags: &[String],
    ) -> StoreResult<String>;

    /// Force-move a tag to a commitish and push the update.
    async fn move_tag_and_push(&self, tag: &str, commitish: &str) -> StoreResult<()>;

    /// Bring the local repository up to date with its remote. A no-op for
    /// repositories without a configured remote.
    async fn fetch_remote(&self) -> StoreResult<()>;
}

/// Database access at the granularity the engine needs.
///
/// The target binding is per-call: every method takes the database name
/// explicitly, and implementations must not leak a current-database context
/// across calls.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    /// Enumerate all non-system managed objects with complete definitions.
    async fn list_objects(&self, db_name: &str) -> DbResult<Vec<DbObject>>;

    /// Apply a list of object changes as batched DDL inside one
    /// transactional scope. `definition = None` deletes the object.
    async fn apply_changes(&self, db_name: &str, changes: &[DbObject]) -> DbResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_entry_prefers_new_path() {
        let entry = DiffEntry {
            change_type: ChangeType::Rename,
            old_path: Some("base/VIEW/dbo/old.sql".to_string()),
            new_path: Some("base/VIEW/dbo/new.sql".to_string()),
        };
        assert_eq!(entry.path(), "base/VIEW/dbo/new.sql");

        let entry = DiffEntry {
            change_type: ChangeType::Delete,
            old_path: Some("base/VIEW/dbo/gone.sql".to_string()),
            new_path: None,
        };
        assert_eq!(entry.path(), "base/VIEW/dbo/gone.sql");
    }
}
