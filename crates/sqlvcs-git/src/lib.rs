//! git2-backed repository store for sqlvcs.
//!
//! Commits are built against the branch-tip tree with
//! [`git2::build::TreeUpdateBuilder`], so no working-tree checkout is
//! needed. Tags are lightweight and force-moved on update. Remote
//! operations talk to `origin` when it is configured and are a logged
//! no-op otherwise, which keeps local-only repositories first-class for
//! tests and air-gapped use.
//!
//! `git2::Repository` is not `Sync`, so the handle lives behind a mutex;
//! this also serializes mutating operations (commit, tag move, push) as
//! the engine's shared-resource policy requires.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use git2::build::TreeUpdateBuilder;
use git2::{
    Commit, Delta, DiffOptions, FileMode, ObjectType, Repository, RepositoryInitOptions, Signature,
};
use tracing::{debug, info, warn};

use sqlvcs_core::{
    ChangeType, DiffEntry, RepoChange, RepositoryStore, StoreError, StoreResult,
};

const REMOTE_NAME: &str = "origin";

/// Repository store over a local git repository.
pub struct GitRepositoryStore {
    inner: Mutex<Repository>,
    branch: String,
}

impl GitRepositoryStore {
    /// Open an existing repository or initialize a new one with the given
    /// default branch.
    pub fn open_or_init(path: &Path, branch: &str) -> StoreResult<Self> {
        let repo = match Repository::open(path) {
            Ok(repo) => repo,
            Err(_) => {
                let mut opts = RepositoryInitOptions::new();
                opts.initial_head(branch);
                Repository::init_opts(path, &opts).map_err(store_err)?
            }
        };

        // A fresh clone of nothing may have HEAD pointing at a different
        // unborn branch; align it with the configured one.
        if repo.head().is_err() {
            repo.set_head(&format!("refs/heads/{branch}"))
                .map_err(store_err)?;
        }

        Ok(Self {
            inner: Mutex::new(repo),
            branch: branch.to_string(),
        })
    }

    fn signature(repo: &Repository) -> StoreResult<Signature<'static>> {
        repo.signature()
            .or_else(|_| Signature::now("sqlvcs", "sqlvcs@local"))
            .map_err(store_err)
    }

    fn resolve<'r>(repo: &'r Repository, commitish: &str) -> StoreResult<Commit<'r>> {
        repo.revparse_single(commitish)
            .and_then(|object| object.peel_to_commit())
            .map_err(|_| StoreError::CommitNotFound(commitish.to_string()))
    }

    fn head_commit(repo: &Repository) -> StoreResult<Option<Commit<'_>>> {
        match repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit().map_err(store_err)?)),
            Err(_) => Ok(None),
        }
    }

    /// Push the branch and any tag refs to `origin`, if configured.
    fn push_refs(repo: &Repository, branch: &str, tags: &[String]) -> StoreResult<()> {
        let mut remote = match repo.find_remote(REMOTE_NAME) {
            Ok(remote) => remote,
            Err(_) => {
                debug!("no remote configured, skipping push");
                return Ok(());
            }
        };

        let mut refspecs = vec![format!("refs/heads/{branch}:refs/heads/{branch}")];
        for tag in tags {
            // Force-update: tags move when a database re-syncs.
            refspecs.push(format!("+refs/tags/{tag}:refs/tags/{tag}"));
        }
        remote
            .push(&refspecs, None)
            .map_err(|e| StoreError::Remote(e.to_string()))
    }
}

fn store_err(e: git2::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl RepositoryStore for GitRepositoryStore {
    async fn is_empty(&self) -> StoreResult<bool> {
        let repo = self.inner.lock().unwrap();
        let result = Self::head_commit(&repo)?.is_none();
        Ok(result)
    }

    async fn is_head(&self, commitish: &str) -> StoreResult<bool> {
        let repo = self.inner.lock().unwrap();
        let resolved = Self::resolve(&repo, commitish)?;
        let head = Self::head_commit(&repo)?
            .ok_or_else(|| StoreError::CommitNotFound("HEAD".to_string()))?;
        Ok(resolved.id() == head.id())
    }

    async fn tag_exists(&self, name: &str) -> StoreResult<bool> {
        let repo = self.inner.lock().unwrap();
        let result = repo.find_reference(&format!("refs/tags/{name}")).is_ok();
        Ok(result)
    }

    async fn read_file(&self, commitish: &str, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let repo = self.inner.lock().unwrap();
        let commit = Self::resolve(&repo, commitish)?;
        let tree = commit.tree().map_err(store_err)?;
        let Ok(entry) = tree.get_path(Path::new(path)) else {
            return Ok(None);
        };
        let object = entry.to_object(&repo).map_err(store_err)?;
        Ok(object.as_blob().map(|blob| blob.content().to_vec()))
    }

    async fn read_tree(
        &self,
        commitish: &str,
        folder: &str,
    ) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        let repo = self.inner.lock().unwrap();
        let commit = Self::resolve(&repo, commitish)?;
        let root = commit.tree().map_err(store_err)?;

        let folder = folder.trim_matches('/');
        let subtree = if folder.is_empty() {
            root
        } else {
            match root.get_path(Path::new(folder)) {
                Ok(entry) => match entry.to_object(&repo).map_err(store_err)?.into_tree() {
                    Ok(tree) => tree,
                    Err(_) => return Ok(BTreeMap::new()),
                },
                Err(_) => return Ok(BTreeMap::new()),
            }
        };

        let mut files = BTreeMap::new();
        let mut walk_error = None;
        subtree
            .walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
                if entry.kind() == Some(ObjectType::Blob) {
                    let name = entry.name().unwrap_or_default();
                    let path = if folder.is_empty() {
                        format!("{dir}{name}")
                    } else {
                        format!("{folder}/{dir}{name}")
                    };
                    match entry.to_object(&repo) {
                        Ok(object) => {
                            if let Some(blob) = object.as_blob() {
                                files.insert(path, blob.content().to_vec());
                            }
                        }
                        Err(e) => {
                            walk_error = Some(e);
                            return git2::TreeWalkResult::Abort;
                        }
                    }
                }
                git2::TreeWalkResult::Ok
            })
            .map_err(store_err)?;
        if let Some(e) = walk_error {
            return Err(store_err(e));
        }
        Ok(files)
    }

    async fn diff(
        &self,
        from_commitish: &str,
        to_commitish: &str,
        path_filters: &[String],
    ) -> StoreResult<Vec<DiffEntry>> {
        let repo = self.inner.lock().unwrap();
        let from_tree = Self::resolve(&repo, from_commitish)?
            .tree()
            .map_err(store_err)?;
        let to_tree = Self::resolve(&repo, to_commitish)?
            .tree()
            .map_err(store_err)?;

        let mut opts = DiffOptions::new();
        for filter in path_filters {
            opts.pathspec(filter.as_str());
        }
        let diff = repo
            .diff_tree_to_tree(Some(&from_tree), Some(&to_tree), Some(&mut opts))
            .map_err(store_err)?;

        let mut entries = Vec::new();
        for delta in diff.deltas() {
            let change_type = match delta.status() {
                Delta::Added => ChangeType::Add,
                Delta::Modified => ChangeType::Modify,
                Delta::Deleted => ChangeType::Delete,
                Delta::Renamed => ChangeType::Rename,
                Delta::Copied => ChangeType::Copy,
                _ => continue,
            };
            let old_path = delta
                .old_file()
                .path()
                .map(|p| p.to_string_lossy().into_owned());
            let new_path = delta
                .new_file()
                .path()
                .map(|p| p.to_string_lossy().into_owned());
            entries.push(DiffEntry {
                change_type,
                old_path: if matches!(change_type, ChangeType::Add) {
                    None
                } else {
                    old_path
                },
                new_path: if matches!(change_type, ChangeType::Delete) {
                    None
                } else {
                    new_path
                },
            });
        }
        Ok(entries)
    }

    async fn commit_and_push(
        &self,
        changes: &[RepoChange],
        message: &str,
        tags: &[String],
    ) -> StoreResult<String> {
        let repo = self.inner.lock().unwrap();
        let signature = Self::signature(&repo)?;
        let parent = Self::head_commit(&repo)?;
        let baseline = match &parent {
            Some(commit) => commit.tree().map_err(store_err)?,
            None => {
                let oid = repo
                    .treebuilder(None)
                    .and_then(|builder| builder.write())
                    .map_err(store_err)?;
                repo.find_tree(oid).map_err(store_err)?
            }
        };

        let mut builder = TreeUpdateBuilder::new();
        for change in changes {
            match &change.content {
                Some(content) => {
                    let blob = repo.blob(content.as_bytes()).map_err(store_err)?;
                    builder.upsert(change.path.as_str(), blob, FileMode::Blob);
                }
                None => {
                    // Removing a path the baseline lacks is a hard error in
                    // libgit2; deleting an absent file is a no-op for us.
                    if baseline.get_path(Path::new(&change.path)).is_ok() {
                        builder.remove(change.path.as_str());
                    }
                }
            }
        }

        let tree_oid = builder.create_updated(&repo, &baseline).map_err(store_err)?;
        let tree = repo.find_tree(tree_oid).map_err(store_err)?;

        let branch_ref = format!("refs/heads/{}", self.branch);
        let parents: Vec<&Commit> = parent.iter().collect();
        let commit_oid = repo
            .commit(Some(&branch_ref), &signature, &signature, message, &tree, &parents)
            .map_err(store_err)?;

        let commit_object = repo
            .find_object(commit_oid, Some(ObjectType::Commit))
            .map_err(store_err)?;
        for tag in tags {
            repo.tag_lightweight(tag, &commit_object, true)
                .map_err(store_err)?;
        }

        Self::push_refs(&repo, &self.branch, tags)?;
        info!(commit = %commit_oid, tags = tags.len(), "committed");
        Ok(commit_oid.to_string())
    }

    async fn move_tag_and_push(&self, tag: &str, commitish: &str) -> StoreResult<()> {
        let repo = self.inner.lock().unwrap();
        let commit = Self::resolve(&repo, commitish)?;
        let object = repo
            .find_object(commit.id(), Some(ObjectType::Commit))
            .map_err(store_err)?;
        repo.tag_lightweight(tag, &object, true).map_err(store_err)?;
        Self::push_refs(&repo, &self.branch, std::slice::from_ref(&tag.to_string()))
    }

    async fn fetch_remote(&self) -> StoreResult<()> {
        let repo = self.inner.lock().unwrap();
        let mut remote = match repo.find_remote(REMOTE_NAME) {
            Ok(remote) => remote,
            Err(_) => {
                debug!("no remote configured, skipping fetch");
                return Ok(());
            }
        };

        remote
            .fetch(&[self.branch.as_str()], None, None)
            .map_err(|e| StoreError::Remote(e.to_string()))?;

        // Fast-forward the local branch when the remote is ahead.
        let remote_ref = format!("refs/remotes/{REMOTE_NAME}/{}", self.branch);
        let Ok(remote_commit) = Self::resolve(&repo, &remote_ref) else {
            return Ok(());
        };
        let local = Self::head_commit(&repo)?;
        let fast_forward = match &local {
            Some(local) => repo
                .graph_descendant_of(remote_commit.id(), local.id())
                .unwrap_or(false),
            None => true,
        };
        if fast_forward {
            repo.reference(
                &format!("refs/heads/{}", self.branch),
                remote_commit.id(),
                true,
                "fast-forward from remote",
            )
            .map_err(store_err)?;
        } else if local.map(|l| l.id()) != Some(remote_commit.id()) {
            warn!("local branch diverged from remote; keeping local state");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, GitRepositoryStore) {
        let dir = TempDir::new().unwrap();
        let store = GitRepositoryStore::open_or_init(dir.path(), "main").unwrap();
        (dir, store)
    }

    fn write(path: &str, content: &str) -> RepoChange {
        RepoChange::write(path, content)
    }

    #[tokio::test]
    async fn fresh_repository_is_empty() {
        let (_dir, store) = open_store();
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn commit_writes_files_and_tags() {
        let (_dir, store) = open_store();
        let commit = store
            .commit_and_push(
                &[write("base/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 1\nGO")],
                "Repo initialized with DB: d1",
                &["d1".to_string()],
            )
            .await
            .unwrap();

        assert!(!store.is_empty().await.unwrap());
        assert!(store.is_head(&commit).await.unwrap());
        assert!(store.tag_exists("d1").await.unwrap());

        let content = store
            .read_file("d1", "base/VIEW/dbo/v.sql")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content, b"CREATE VIEW v AS SELECT 1\nGO");
        assert!(store
            .read_file("HEAD", "base/VIEW/dbo/missing.sql")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn read_tree_is_scoped_to_folder() {
        let (_dir, store) = open_store();
        store
            .commit_and_push(
                &[
                    write("base/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 1\nGO"),
                    write("diff/d2/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 2\nGO"),
                ],
                "seed",
                &[],
            )
            .await
            .unwrap();

        let base = store.read_tree("HEAD", "base").await.unwrap();
        assert_eq!(base.len(), 1);
        assert!(base.contains_key("base/VIEW/dbo/v.sql"));

        let overlay = store.read_tree("HEAD", "diff/d2").await.unwrap();
        assert_eq!(overlay.len(), 1);
        assert!(overlay.contains_key("diff/d2/VIEW/dbo/v.sql"));

        let missing = store.read_tree("HEAD", "diff/other").await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn diff_respects_path_filters() {
        let (_dir, store) = open_store();
        let first = store
            .commit_and_push(
                &[
                    write("base/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 1\nGO"),
                    write("diff/d2/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 2\nGO"),
                ],
                "seed",
                &[],
            )
            .await
            .unwrap();
        let second = store
            .commit_and_push(
                &[
                    write("base/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 3\nGO"),
                    RepoChange::delete("diff/d2/VIEW/dbo/v.sql"),
                    write("diff/d3/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 4\nGO"),
                ],
                "update",
                &[],
            )
            .await
            .unwrap();

        let all = store.diff(&first, &second, &[]).await.unwrap();
        assert_eq!(all.len(), 3);

        let filtered = store
            .diff(&first, &second, &["base".to_string(), "diff/d2".to_string()])
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);
        assert!(filtered
            .iter()
            .any(|e| e.change_type == ChangeType::Modify && e.path() == "base/VIEW/dbo/v.sql"));
        assert!(filtered
            .iter()
            .any(|e| e.change_type == ChangeType::Delete && e.path() == "diff/d2/VIEW/dbo/v.sql"));
    }

    #[tokio::test]
    async fn tombstones_round_trip_as_empty_files() {
        let (_dir, store) = open_store();
        store
            .commit_and_push(
                &[RepoChange::tombstone("diff/d2/VIEW/dbo/v.sql")],
                "tombstone",
                &[],
            )
            .await
            .unwrap();
        let content = store
            .read_file("HEAD", "diff/d2/VIEW/dbo/v.sql")
            .await
            .unwrap()
            .unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn move_tag_repoints_existing_tag() {
        let (_dir, store) = open_store();
        let first = store
            .commit_and_push(
                &[write("base/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 1\nGO")],
                "one",
                &["d1".to_string()],
            )
            .await
            .unwrap();
        let second = store
            .commit_and_push(
                &[write("base/VIEW/dbo/w.sql", "CREATE VIEW w AS SELECT 2\nGO")],
                "two",
                &[],
            )
            .await
            .unwrap();

        assert!(store.is_head(&second).await.unwrap());
        assert!(!store.is_head("d1").await.unwrap());

        store.move_tag_and_push("d1", &second).await.unwrap();
        assert!(store.is_head("d1").await.unwrap());
        let _ = first;
    }

    #[tokio::test]
    async fn deleting_absent_path_is_a_noop() {
        let (_dir, store) = open_store();
        store
            .commit_and_push(
                &[write("base/VIEW/dbo/v.sql", "CREATE VIEW v AS SELECT 1\nGO")],
                "one",
                &[],
            )
            .await
            .unwrap();
        // Deleting a path that does not exist must not fail the commit.
        store
            .commit_and_push(
                &[RepoChange::delete("base/VIEW/dbo/never_existed.sql")],
                "two",
                &[],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fetch_without_remote_is_a_noop() {
        let (_dir, store) = open_store();
        store.fetch_remote().await.unwrap();
    }
}
