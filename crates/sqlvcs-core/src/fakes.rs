//! In-memory fakes for the engine ports (testing only)
//!
//! Provides `MemoryRepositoryStore` and `MemoryDatabase` that satisfy the
//! port contracts without git or a SQL Server, so the orchestrator's
//! end-to-end behavior can be exercised hermetically.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::{DbObject, RepoChange};
use crate::error::{DbResult, StoreError, StoreResult};
use crate::ports::{ChangeType, DatabaseService, DiffEntry, RepositoryStore};

// ---------------------------------------------------------------------------
// MemoryRepositoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CommitRec {
    #[allow(dead_code)]
    parent: Option<String>,
    #[allow(dead_code)]
    message: String,
    tree: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct StoreState {
    commits: HashMap<String, CommitRec>,
    head: Option<String>,
    tags: HashMap<String, String>,
}

/// In-memory repository: an append-only commit chain with content-derived
/// ids, one branch head, and lightweight tags.
#[derive(Debug, Default)]
pub struct MemoryRepositoryStore {
    state: Mutex<StoreState>,
}

impl MemoryRepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit ids visible in the store, oldest first along the head chain.
    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits.len()
    }

    pub fn head_id(&self) -> Option<String> {
        self.state.lock().unwrap().head.clone()
    }

    pub fn tag_target(&self, tag: &str) -> Option<String> {
        self.state.lock().unwrap().tags.get(tag).cloned()
    }

    fn resolve(&self, state: &StoreState, commitish: &str) -> StoreResult<String> {
        if commitish.eq_ignore_ascii_case("HEAD") {
            return state
                .head
                .clone()
                .ok_or_else(|| StoreError::CommitNotFound("HEAD".to_string()));
        }
        if let Some(id) = state.tags.get(commitish) {
            return Ok(id.clone());
        }
        if state.commits.contains_key(commitish) {
            return Ok(commitish.to_string());
        }
        Err(StoreError::CommitNotFound(commitish.to_string()))
    }

    fn commit_id(parent: Option<&str>, message: &str, tree: &BTreeMap<String, Vec<u8>>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(parent.unwrap_or("").as_bytes());
        hasher.update(message.as_bytes());
        for (path, content) in tree {
            hasher.update(path.as_bytes());
            hasher.update(content);
        }
        hex::encode(hasher.finalize())
    }
}

fn under(path: &str, folder: &str) -> bool {
    let folder = folder.trim_end_matches('/');
    folder.is_empty() || path == folder || path.starts_with(&format!("{folder}/"))
}

#[async_trait]
impl RepositoryStore for MemoryRepositoryStore {
    async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.state.lock().unwrap().head.is_none())
    }

    async fn is_head(&self, commitish: &str) -> StoreResult<bool> {
        let state = self.state.lock().unwrap();
        let resolved = self.resolve(&state, commitish)?;
        Ok(state.head.as_deref() == Some(resolved.as_str()))
    }

    async fn tag_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.state.lock().unwrap().tags.contains_key(name))
    }

    async fn read_file(&self, commitish: &str, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let state = self.state.lock().unwrap();
        let id = self.resolve(&state, commitish)?;
        Ok(state.commits[&id].tree.get(path).cloned())
    }

    async fn read_tree(
        &self,
        commitish: &str,
        folder: &str,
    ) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        let state = self.state.lock().unwrap();
        let id = self.resolve(&state, commitish)?;
        Ok(state.commits[&id]
            .tree
            .iter()
            .filter(|(path, _)| under(path, folder))
            .map(|(path, content)| (path.clone(), content.clone()))
            .collect())
    }

    async fn diff(
        &self,
        from_commitish: &str,
        to_commitish: &str,
        path_filters: &[String],
    ) -> StoreResult<Vec<DiffEntry>> {
        let state = self.state.lock().unwrap();
        let from_id = self.resolve(&state, from_commitish)?;
        let to_id = self.resolve(&state, to_commitish)?;
        let from_tree = &state.commits[&from_id].tree;
        let to_tree = &state.commits[&to_id].tree;

        let matches = |path: &str| {
            path_filters.is_empty() || path_filters.iter().any(|f| under(path, f))
        };

        let mut paths: Vec<&String> = from_tree.keys().chain(to_tree.keys()).collect();
        paths.sort();
        paths.dedup();

        let mut entries = Vec::new();
        for path in paths {
            if !matches(path) {
                continue;
            }
            match (from_tree.get(path), to_tree.get(path)) {
                (Some(_), None) => entries.push(DiffEntry {
                    change_type: ChangeType::Delete,
                    old_path: Some(path.clone()),
                    new_path: None,
                }),
                (None, Some(_)) => entries.push(DiffEntry {
                    change_type: ChangeType::Add,
                    old_path: None,
                    new_path: Some(path.clone()),
                }),
                (Some(old), Some(new)) if old != new => entries.push(DiffEntry {
                    change_type: ChangeType::Modify,
                    old_path: Some(path.clone()),
                    new_path: Some(path.clone()),
                }),
                _ => {}
            }
        }
        Ok(entries)
    }

    async fn commit_and_push(
        &self,
        changes: &[RepoChange],
        message: &str,
        tags: &[String],
    ) -> StoreResult<String> {
        let mut state = self.state.lock().unwrap();
        let mut tree = match &state.head {
            Some(id) => state.commits[id].tree.clone(),
            None => BTreeMap::new(),
        };
        for change in changes {
            match &change.content {
                Some(content) => {
                    tree.insert(change.path.clone(), content.as_bytes().to_vec());
                }
                None => {
                    tree.remove(&change.path);
                }
            }
        }
        let parent = state.head.clone();
        let id = Self::commit_id(parent.as_deref(), message, &tree);
        state.commits.insert(
            id.clone(),
            CommitRec {
                parent,
                message: message.to_string(),
                tree,
            },
        );
        state.head = Some(id.clone());
        for tag in tags {
            state.tags.insert(tag.clone(), id.clone());
        }
        Ok(id)
    }

    async fn move_tag_and_push(&self, tag: &str, commitish: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let id = self.resolve(&state, commitish)?;
        state.tags.insert(tag.to_string(), id);
        Ok(())
    }

    async fn fetch_remote(&self) -> StoreResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryDatabase
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DbState {
    /// Per database: object key string -> definition.
    objects: HashMap<String, BTreeMap<String, DbObject>>,
    /// Per database: number of `apply_changes` calls that did work.
    apply_calls: HashMap<String, usize>,
}

/// In-memory database fleet: definitions are stored verbatim, applies are
/// counted so tests can assert idempotence.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<DbState>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace one object in a database.
    pub fn put_object(&self, db_name: &str, object: DbObject) {
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .entry(db_name.to_lowercase())
            .or_default()
            .insert(object.key.to_string(), object);
    }

    /// Remove one object from a database.
    pub fn remove_object(&self, db_name: &str, key_string: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(objects) = state.objects.get_mut(&db_name.to_lowercase()) {
            objects.remove(key_string);
        }
    }

    /// Definition currently stored for a key, if any.
    pub fn definition(&self, db_name: &str, key_string: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&db_name.to_lowercase())
            .and_then(|objects| objects.get(key_string))
            .and_then(|o| o.definition.clone())
    }

    /// How many apply calls actually executed against the database.
    pub fn apply_calls(&self, db_name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .apply_calls
            .get(&db_name.to_lowercase())
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DatabaseService for MemoryDatabase {
    async fn list_objects(&self, db_name: &str) -> DbResult<Vec<DbObject>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .objects
            .get(&db_name.to_lowercase())
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply_changes(&self, db_name: &str, changes: &[DbObject]) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let db = db_name.to_lowercase();
        *state.apply_calls.entry(db.clone()).or_insert(0) += 1;
        let objects = state.objects.entry(db).or_default();
        for change in changes {
            match &change.definition {
                Some(_) => {
                    objects.insert(change.key.to_string(), change.clone());
                }
                None => {
                    objects.remove(&change.key.to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ObjectKey, ObjectType};

    #[tokio::test]
    async fn empty_store_reports_empty_then_commits() {
        let store = MemoryRepositoryStore::new();
        assert!(store.is_empty().await.unwrap());

        let id = store
            .commit_and_push(
                &[RepoChange::write("base/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 1\nGO")],
                "init",
                &["d1".to_string()],
            )
            .await
            .unwrap();

        assert!(!store.is_empty().await.unwrap());
        assert!(store.is_head(&id).await.unwrap());
        assert!(store.tag_exists("d1").await.unwrap());
        assert_eq!(store.tag_target("d1"), Some(id));
    }

    #[tokio::test]
    async fn diff_reports_add_modify_delete() {
        let store = MemoryRepositoryStore::new();
        let first = store
            .commit_and_push(
                &[
                    RepoChange::write("base/VIEW/dbo/a.sql", "CREATE VIEW a AS SELECT 1\nGO"),
                    RepoChange::write("base/VIEW/dbo/b.sql", "CREATE VIEW b AS SELECT 1\nGO"),
                ],
                "one",
                &[],
            )
            .await
            .unwrap();
        let second = store
            .commit_and_push(
                &[
                    RepoChange::write("base/VIEW/dbo/a.sql", "CREATE VIEW a AS SELECT 2\nGO"),
                    RepoChange::delete("base/VIEW/dbo/b.sql"),
                    RepoChange::write("base/VIEW/dbo/c.sql", "CREATE VIEW c AS SELECT 3\nGO"),
                ],
                "two",
                &[],
            )
            .await
            .unwrap();

        let entries = store
            .diff(&first, &second, &["base".to_string()])
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().any(|e| e.change_type == ChangeType::Modify));
        assert!(entries.iter().any(|e| e.change_type == ChangeType::Delete));
        assert!(entries.iter().any(|e| e.change_type == ChangeType::Add));
    }

    #[tokio::test]
    async fn memory_database_applies_and_counts() {
        let db = MemoryDatabase::new();
        let key = ObjectKey::new(ObjectType::View, "dbo", "v");
        db.put_object("d1", DbObject::new(key.clone(), "CREATE VIEW v AS SELECT 1\nGO"));

        db.apply_changes("d1", &[DbObject::deleted(key.clone())])
            .await
            .unwrap();
        assert_eq!(db.apply_calls("d1"), 1);
        assert!(db.list_objects("d1").await.unwrap().is_empty());
    }
}
