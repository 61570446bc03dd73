//! Top-level synchronization operations.
//!
//! Three public operations: `init_repo` seeds an empty repository from one
//! database, `sync_db_to_repo` folds live drift into the per-database
//! overlay, and `sync_repo_to_db` applies a commit across a fleet of
//! databases with per-target tagging.
//!
//! Fleet fan-out runs one task per target under a semaphore bound; a
//! failing target lands in its own `SyncReport` and never aborts peers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::domain::{DbObject, ObjectKey, RepoChange, SyncReport, SyncStatus, SyncSummary};
use crate::error::{Result, SyncError};
use crate::ignore::IgnoreRules;
use crate::normalize::SqlNormalizer;
use crate::ordering::order_for_apply;
use crate::paths::{self, BASE_ROOT};
use crate::ports::{ChangeType, DatabaseService, DiffEntry, RepositoryStore};
use crate::resolver::OverlayResolver;

/// The synchronization engine over abstract repository and database ports.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn RepositoryStore>,
    db: Arc<dyn DatabaseService>,
    config: Arc<SyncConfig>,
    normalizer: Arc<SqlNormalizer>,
    ignore: Arc<IgnoreRules>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        db: Arc<dyn DatabaseService>,
        config: SyncConfig,
        ignore: IgnoreRules,
    ) -> Self {
        let normalizer = SqlNormalizer::new(&config.default_schema);
        Self {
            store,
            db,
            config: Arc::new(config),
            normalizer: Arc::new(normalizer),
            ignore: Arc::new(ignore),
        }
    }

    /// Seed an empty repository with the full base tree of one database,
    /// tag the commit with the database name, and push.
    pub async fn init_repo(&self, db_name: &str) -> Result<String> {
        if !self.store.is_empty().await? {
            return Err(SyncError::RepoNotEmpty);
        }

        let objects = self.db.list_objects(db_name).await?;
        if objects.is_empty() {
            return Err(SyncError::NoObjects(db_name.to_string()));
        }

        let mut changes = Vec::new();
        for object in &objects {
            let path = paths::key_to_path(&object.key, BASE_ROOT);
            if !self.ignore.should_process(&path) {
                continue;
            }
            let Some(definition) = &object.definition else {
                continue;
            };
            changes.push(RepoChange::write(path, definition.clone()));
        }
        if changes.is_empty() {
            return Err(SyncError::NoObjects(db_name.to_string()));
        }

        let tag = db_name.to_lowercase();
        let message = format!("Repo initialized with DB: {db_name}");
        let commit = self
            .store
            .commit_and_push(&changes, &message, std::slice::from_ref(&tag))
            .await?;

        info!(db = db_name, commit = %short(&commit), files = changes.len(), "repository initialized");
        Ok(format!(
            "Initialized repository with {} objects from {} at {}",
            changes.len(),
            db_name,
            short(&commit)
        ))
    }

    /// Fold live drift of one database into its overlay subtree.
    ///
    /// Returns the overlay delta that was (or, for a dry run, would be)
    /// committed. An onboarded database resolves against its tag with the
    /// HEAD cross-check absorbing upstream commits; a database without a
    /// tag resolves against HEAD and is tagged on its first commit.
    pub async fn sync_db_to_repo(&self, db_name: &str, dry_run: bool) -> Result<Vec<RepoChange>> {
        self.store.fetch_remote().await?;

        let tag = db_name.to_lowercase();
        let onboarded = self.store.tag_exists(&tag).await?;
        let reference = if onboarded { tag.clone() } else { "HEAD".to_string() };

        let live = self.db.list_objects(db_name).await?;
        let resolver = OverlayResolver::new(
            self.store.as_ref(),
            &self.normalizer,
            &self.ignore,
            &self.config,
        );
        let delta = resolver
            .resolve_overlay_delta(&live, &reference, db_name)
            .await?;

        if dry_run || delta.is_empty() {
            return Ok(delta);
        }

        let tags: Vec<String> = if onboarded { Vec::new() } else { vec![tag] };
        let message = format!("Repo synced with DB: {db_name}");
        let commit = self.store.commit_and_push(&delta, &message, &tags).await?;
        info!(db = db_name, commit = %short(&commit), changes = delta.len(), "overlay synced");

        Ok(delta)
    }

    /// Apply a commit across a fleet of databases, one cooperative task per
    /// target. Never raises for a single target; every target lands in a
    /// `SyncReport` bucket.
    ///
    /// A non-HEAD commitish with `force = false` is downgraded to a dry
    /// run: historical states may be previewed but not applied by default.
    pub async fn sync_repo_to_db(
        &self,
        commitish: &str,
        db_names: &[String],
        dry_run: bool,
        force: bool,
    ) -> Result<SyncSummary> {
        self.store.fetch_remote().await?;
        let is_head = self.store.is_head(commitish).await?;
        let dry_run = dry_run || (!is_head && !force);

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_targets.max(1)));
        let mut tasks = Vec::new();

        for db_name in db_names {
            let engine = self.clone();
            let commitish = commitish.to_string();
            let target = db_name.clone();
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let work = engine.sync_one_target(&commitish, &target, dry_run, force);
                let timeout_secs = engine.config.target_timeout_secs;
                if timeout_secs == 0 {
                    return work.await;
                }
                match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), work)
                    .await
                {
                    Ok(report) => report,
                    Err(_) => SyncReport::new(
                        &target,
                        SyncStatus::Failed,
                        format!("timed out after {timeout_secs}s"),
                    ),
                }
            });
            tasks.push((db_name.clone(), handle));
        }

        let mut reports = Vec::new();
        for (db_name, handle) in tasks {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => SyncReport::new(
                    &db_name,
                    SyncStatus::Failed,
                    format!("sync task aborted: {e}"),
                ),
            };
            reports.push(report);
        }

        Ok(SyncSummary::new(reports))
    }

    async fn sync_one_target(
        &self,
        commitish: &str,
        db_name: &str,
        dry_run: bool,
        force: bool,
    ) -> SyncReport {
        match self.try_sync_one_target(commitish, db_name, dry_run, force).await {
            Ok((status, message)) => SyncReport::new(db_name, status, message),
            Err(SyncError::DbNotOnboarded(_)) => SyncReport::new(
                db_name,
                SyncStatus::SkippedNotOnboarded,
                format!("no tag '{}' exists; initialize or sync the database first", db_name.to_lowercase()),
            ),
            Err(SyncError::DbOutOfSync { changes, .. }) => SyncReport::new(
                db_name,
                SyncStatus::SkippedOutOfSync,
                format!(
                    "{} overlay change(s) pending: {}",
                    changes.len(),
                    changes
                        .iter()
                        .map(|c| c.path.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ),
            Err(e) => {
                warn!(db = db_name, error = %e, "target sync failed");
                SyncReport::new(db_name, SyncStatus::Failed, e.to_string())
            }
        }
    }

    async fn try_sync_one_target(
        &self,
        commitish: &str,
        db_name: &str,
        dry_run: bool,
        force: bool,
    ) -> Result<(SyncStatus, String)> {
        let tag = db_name.to_lowercase();
        if !self.store.tag_exists(&tag).await? {
            return Err(SyncError::DbNotOnboarded(db_name.to_string()));
        }

        let live = self.db.list_objects(db_name).await?;
        let resolver = OverlayResolver::new(
            self.store.as_ref(),
            &self.normalizer,
            &self.ignore,
            &self.config,
        );
        let pending = resolver.resolve_overlay_delta(&live, &tag, db_name).await?;
        if !pending.is_empty() && !force {
            return Err(SyncError::DbOutOfSync {
                db_name: db_name.to_string(),
                changes: pending,
            });
        }

        let mut changes = self.translate_diff(commitish, db_name, &tag).await?;

        if !pending.is_empty() {
            // Force: revert live drift to the expected state at the
            // commitish. Keys the repo diff already covers stay as-is.
            let repairs = self.repair_objects(&pending, commitish, db_name).await?;
            let covered: std::collections::BTreeSet<ObjectKey> =
                changes.iter().map(|c| c.key.clone()).collect();
            changes.extend(
                repairs
                    .into_iter()
                    .filter(|repair| !covered.contains(&repair.key)),
            );
        }
        if changes.is_empty() {
            if dry_run {
                return Ok((SyncStatus::SuccessDryRun, "no changes to apply".to_string()));
            }
            self.store.move_tag_and_push(&tag, commitish).await?;
            return Ok((SyncStatus::Synced, "already up to date".to_string()));
        }

        let ordered = order_for_apply(changes)?;
        if dry_run {
            return Ok((
                SyncStatus::SuccessDryRun,
                format!("would apply {} object change(s)", ordered.len()),
            ));
        }

        self.db.apply_changes(db_name, &ordered).await?;
        self.store.move_tag_and_push(&tag, commitish).await?;
        info!(db = db_name, changes = ordered.len(), commitish, "database synced");
        Ok((
            SyncStatus::Synced,
            format!("applied {} object change(s)", ordered.len()),
        ))
    }

    /// Convert a pending overlay delta into the object states the target
    /// must return to: the overlay file at the commitish when present,
    /// else the base file, else deletion.
    async fn repair_objects(
        &self,
        pending: &[RepoChange],
        commitish: &str,
        db_name: &str,
    ) -> Result<Vec<DbObject>> {
        let diff_root = self.config.diff_root(db_name);
        let mut repairs = Vec::new();
        for change in pending {
            let key = paths::path_to_key(&change.path)?;
            let diff_path = paths::key_to_path(&key, &diff_root);
            let base_path = paths::key_to_path(&key, BASE_ROOT);
            let expected = match self.store.read_file(commitish, &diff_path).await? {
                Some(bytes) => Some(bytes),
                None => self.store.read_file(commitish, &base_path).await?,
            };
            let object = match expected {
                Some(bytes) => object_from_bytes(key, &bytes),
                None => DbObject::deleted(key),
            };
            repairs.push(object);
        }
        Ok(repairs)
    }

    /// Translate the repository diff between the target's tag and the
    /// commitish into object-level changes.
    ///
    /// Overlay entries supersede base entries for the same key; a removed
    /// overlay falls back to the base content at the commitish; a tombstone
    /// (or removed base without overlay) deletes the object.
    async fn translate_diff(
        &self,
        commitish: &str,
        db_name: &str,
        tag: &str,
    ) -> Result<Vec<DbObject>> {
        let diff_root = self.config.diff_root(db_name);
        let filters = vec![BASE_ROOT.to_string(), diff_root.clone()];
        let entries = self.store.diff(tag, commitish, &filters).await?;

        let mut base_ops: Vec<(PathOp, String)> = Vec::new();
        let mut overlay_ops: Vec<(PathOp, String)> = Vec::new();
        for entry in entries {
            for (op, path) in expand_entry(&entry) {
                if !self.ignore.should_process(&path) {
                    continue;
                }
                if under(&path, BASE_ROOT) {
                    base_ops.push((op, path));
                } else if under(&path, &diff_root) {
                    overlay_ops.push((op, path));
                }
            }
        }

        let mut translated: BTreeMap<ObjectKey, DbObject> = BTreeMap::new();

        for (op, path) in base_ops {
            let key = paths::path_to_key(&path)?;
            let overlay_path = paths::key_to_path(&key, &diff_root);
            if self.store.read_file(commitish, &overlay_path).await?.is_some() {
                // The overlay pins this object for this database.
                continue;
            }
            let object = match op {
                PathOp::Upsert => match self.store.read_file(commitish, &path).await? {
                    Some(bytes) => object_from_bytes(key.clone(), &bytes),
                    None => continue,
                },
                PathOp::Remove => DbObject::deleted(key.clone()),
            };
            translated.insert(key, object);
        }

        for (op, path) in overlay_ops {
            let key = paths::path_to_key(&path)?;
            let object = match op {
                PathOp::Upsert => match self.store.read_file(commitish, &path).await? {
                    Some(bytes) => object_from_bytes(key.clone(), &bytes),
                    None => continue,
                },
                PathOp::Remove => {
                    let base_path = paths::key_to_path(&key, BASE_ROOT);
                    match self.store.read_file(commitish, &base_path).await? {
                        Some(bytes) => object_from_bytes(key.clone(), &bytes),
                        None => DbObject::deleted(key.clone()),
                    }
                }
            };
            translated.insert(key, object);
        }

        Ok(translated.into_values().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathOp {
    Upsert,
    Remove,
}

/// Flatten a diff entry into per-path operations; a rename removes the old
/// path and upserts the new one.
fn expand_entry(entry: &DiffEntry) -> Vec<(PathOp, String)> {
    match entry.change_type {
        ChangeType::Add | ChangeType::Modify | ChangeType::Copy => entry
            .new_path
            .clone()
            .map(|p| vec![(PathOp::Upsert, p)])
            .unwrap_or_default(),
        ChangeType::Delete => entry
            .old_path
            .clone()
            .map(|p| vec![(PathOp::Remove, p)])
            .unwrap_or_default(),
        ChangeType::Rename => {
            let mut ops = Vec::new();
            if let Some(old) = &entry.old_path {
                ops.push((PathOp::Remove, old.clone()));
            }
            if let Some(new) = &entry.new_path {
                ops.push((PathOp::Upsert, new.clone()));
            }
            ops
        }
    }
}

/// A zero-byte file is a tombstone: the object is deliberately absent.
fn object_from_bytes(key: ObjectKey, bytes: &[u8]) -> DbObject {
    if bytes.is_empty() {
        DbObject::deleted(key)
    } else {
        DbObject {
            key,
            definition: Some(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

fn under(path: &str, folder: &str) -> bool {
    let folder = folder.trim_end_matches('/');
    path == folder || path.starts_with(&format!("{folder}/"))
}

fn short(commit: &str) -> &str {
    &commit[..8.min(commit.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObjectType;
    use crate::fakes::{MemoryDatabase, MemoryRepositoryStore};

    const PROC: &str = "CREATE PROCEDURE [dbo].[p]\nAS\nSELECT 1\nGO";

    fn engine_with(store: MemoryRepositoryStore, db: MemoryDatabase) -> SyncEngine {
        SyncEngine::new(
            Arc::new(store),
            Arc::new(db),
            SyncConfig::default(),
            IgnoreRules::empty(),
        )
    }

    fn proc_object() -> DbObject {
        DbObject::new(ObjectKey::new(ObjectType::Procedure, "dbo", "p"), PROC)
    }

    #[tokio::test]
    async fn init_repo_rejects_non_empty_repository() {
        let store = MemoryRepositoryStore::new();
        let db = MemoryDatabase::new();
        db.put_object("d1", proc_object());
        let engine = engine_with(store, db);

        engine.init_repo("d1").await.unwrap();
        let err = engine.init_repo("d1").await.unwrap_err();
        assert!(matches!(err, SyncError::RepoNotEmpty));
    }

    #[tokio::test]
    async fn init_repo_rejects_empty_database() {
        let engine = engine_with(MemoryRepositoryStore::new(), MemoryDatabase::new());
        let err = engine.init_repo("empty").await.unwrap_err();
        assert!(matches!(err, SyncError::NoObjects(_)));
    }

    #[tokio::test]
    async fn not_onboarded_target_is_skipped() {
        let store = MemoryRepositoryStore::new();
        let db = MemoryDatabase::new();
        db.put_object("d1", proc_object());
        let engine = engine_with(store, db);
        engine.init_repo("d1").await.unwrap();

        let summary = engine
            .sync_repo_to_db("HEAD", &["stranger".to_string()], false, false)
            .await
            .unwrap();
        assert_eq!(summary.count(SyncStatus::SkippedNotOnboarded), 1);
    }

    #[tokio::test]
    async fn non_head_commitish_without_force_is_dry_run() {
        let store = MemoryRepositoryStore::new();
        let db = MemoryDatabase::new();
        db.put_object("d1", proc_object());
        let engine = engine_with(store, db);
        engine.init_repo("d1").await.unwrap();
        let first = {
            let summary = engine
                .sync_repo_to_db("HEAD", &["d1".to_string()], false, false)
                .await
                .unwrap();
            assert_eq!(summary.count(SyncStatus::Synced), 1);
            "d1".to_string()
        };

        // Advance HEAD past the tag, then target the old commit.
        let engine2 = engine.clone();
        engine2
            .store
            .commit_and_push(
                &[RepoChange::write(
                    "base/VIEW/dbo/v.sql",
                    "CREATE VIEW v AS SELECT 1\nGO",
                )],
                "advance",
                &[],
            )
            .await
            .unwrap();

        let summary = engine
            .sync_repo_to_db(&first, &["d1".to_string()], false, false)
            .await
            .unwrap();
        assert_eq!(summary.count(SyncStatus::SuccessDryRun), 1);
    }

    #[tokio::test]
    async fn failed_target_does_not_abort_peers() {
        let store = MemoryRepositoryStore::new();
        let db = MemoryDatabase::new();
        db.put_object("d1", proc_object());
        db.put_object(
            "d2",
            DbObject::new(
                ObjectKey::new(ObjectType::Procedure, "dbo", "p"),
                "CREATE PROCEDURE [dbo].[p]\nAS\nSELECT 2\nGO",
            ),
        );
        let engine = engine_with(store, db);
        engine.init_repo("d1").await.unwrap();
        engine.sync_db_to_repo("d2", false).await.unwrap();

        let summary = engine
            .sync_repo_to_db(
                "HEAD",
                &["d1".to_string(), "missing".to_string(), "d2".to_string()],
                false,
                false,
            )
            .await
            .unwrap();
        assert_eq!(summary.count(SyncStatus::Synced), 2);
        assert_eq!(summary.count(SyncStatus::SkippedNotOnboarded), 1);
    }
}
