//! End-to-end engine scenarios against the in-memory port fakes.

use std::sync::Arc;

use sqlvcs_core::fakes::{MemoryDatabase, MemoryRepositoryStore};
use sqlvcs_core::{
    DbObject, IgnoreRules, ObjectKey, ObjectType, RepositoryStore, SyncConfig, SyncEngine,
    SyncStatus,
};

const PROC_V1: &str = "CREATE PROCEDURE [dbo].[p]\nAS\nSELECT 1\nGO";
const PROC_V2: &str = "CREATE PROCEDURE [dbo].[p]\nAS\nSELECT 2\nGO";

fn proc_key() -> ObjectKey {
    ObjectKey::new(ObjectType::Procedure, "dbo", "p")
}

struct Fleet {
    store: Arc<MemoryRepositoryStore>,
    db: Arc<MemoryDatabase>,
    engine: SyncEngine,
}

fn fleet() -> Fleet {
    fleet_with_ignore(IgnoreRules::empty())
}

fn fleet_with_ignore(ignore: IgnoreRules) -> Fleet {
    let store = Arc::new(MemoryRepositoryStore::new());
    let db = Arc::new(MemoryDatabase::new());
    let engine = SyncEngine::new(
        store.clone(),
        db.clone(),
        SyncConfig::default(),
        ignore,
    );
    Fleet { store, db, engine }
}

/// Scenario 1: init then noop. One procedure lands under `base/`, one
/// commit exists, the tag points at HEAD, and an immediate db-to-repo sync
/// finds nothing to do.
#[tokio::test]
async fn init_then_noop() {
    let f = fleet();
    f.db.put_object("d", DbObject::new(proc_key(), PROC_V1));

    f.engine.init_repo("d").await.unwrap();

    assert_eq!(f.store.commit_count(), 1);
    let head = f.store.head_id().unwrap();
    assert_eq!(f.store.tag_target("d"), Some(head));

    let delta = f.engine.sync_db_to_repo("d", false).await.unwrap();
    assert!(delta.is_empty(), "round-trip must be identity");
    assert_eq!(f.store.commit_count(), 1, "no further commits");
}

/// Scenario 2: overlay on divergence. Two databases identical except one
/// literal; the second lands as a `diff/` overlay with its own tag.
#[tokio::test]
async fn overlay_on_divergence() {
    let f = fleet();
    f.db.put_object("d1", DbObject::new(proc_key(), PROC_V1));
    f.db.put_object("d2", DbObject::new(proc_key(), PROC_V2));

    f.engine.init_repo("d1").await.unwrap();
    let delta = f.engine.sync_db_to_repo("d2", false).await.unwrap();

    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].path, "diff/d2/PROCEDURE/dbo/p.sql");
    assert_eq!(delta[0].content.as_deref(), Some(PROC_V2));

    assert!(f.store.tag_target("d1").is_some());
    assert!(f.store.tag_target("d2").is_some());
    assert_ne!(f.store.tag_target("d1"), f.store.tag_target("d2"));
}

/// Scenario 3: deleted-in-DB tombstone. Dropping the procedure from d2
/// writes a zero-byte overlay file, and applying HEAD to d1 afterwards
/// does not drop d1's copy.
#[tokio::test]
async fn deleted_in_db_tombstone() {
    let f = fleet();
    f.db.put_object("d1", DbObject::new(proc_key(), PROC_V1));
    f.db.put_object("d2", DbObject::new(proc_key(), PROC_V2));
    f.engine.init_repo("d1").await.unwrap();
    f.engine.sync_db_to_repo("d2", false).await.unwrap();

    f.db.remove_object("d2", &proc_key().to_string());
    let delta = f.engine.sync_db_to_repo("d2", false).await.unwrap();
    assert_eq!(delta.len(), 1);
    assert!(delta[0].is_tombstone());
    assert_eq!(delta[0].path, "diff/d2/PROCEDURE/dbo/p.sql");

    let summary = f
        .engine
        .sync_repo_to_db("HEAD", &["d1".to_string()], false, false)
        .await
        .unwrap();
    assert_eq!(summary.count(SyncStatus::Synced), 1);
    assert_eq!(
        f.db.definition("d1", &proc_key().to_string()).as_deref(),
        Some(PROC_V1),
        "d1 keeps its procedure"
    );
}

/// Scenario 6: out-of-sync guard. A manual alter skips the target and
/// reports the pending delta; force applies; a further forced-free sync
/// reports a clean target.
#[tokio::test]
async fn out_of_sync_guard_and_force() {
    let f = fleet();
    f.db.put_object("d", DbObject::new(proc_key(), PROC_V1));
    f.engine.init_repo("d").await.unwrap();

    // Manual drift.
    f.db.put_object("d", DbObject::new(proc_key(), PROC_V2));

    let summary = f
        .engine
        .sync_repo_to_db("HEAD", &["d".to_string()], false, false)
        .await
        .unwrap();
    assert_eq!(summary.count(SyncStatus::SkippedOutOfSync), 1);
    assert!(summary.reports[0].message.contains("diff/d/PROCEDURE/dbo/p.sql"));

    // Force reverts the drift to the repository state.
    let summary = f
        .engine
        .sync_repo_to_db("HEAD", &["d".to_string()], false, true)
        .await
        .unwrap();
    assert_eq!(summary.count(SyncStatus::Synced), 1);
    assert_eq!(
        f.db.definition("d", &proc_key().to_string()).as_deref(),
        Some(PROC_V1)
    );

    // With the drift gone, the guard passes and there is nothing to do.
    let summary = f
        .engine
        .sync_repo_to_db("HEAD", &["d".to_string()], false, false)
        .await
        .unwrap();
    assert_eq!(summary.count(SyncStatus::Synced), 1);
}

/// Invariant 2: overlay idempotence — the second of two back-to-back
/// db-to-repo syncs yields zero changes.
#[tokio::test]
async fn overlay_idempotence() {
    let f = fleet();
    f.db.put_object("d1", DbObject::new(proc_key(), PROC_V1));
    f.db.put_object("d2", DbObject::new(proc_key(), PROC_V2));
    f.engine.init_repo("d1").await.unwrap();

    let first = f.engine.sync_db_to_repo("d2", false).await.unwrap();
    assert_eq!(first.len(), 1);
    let second = f.engine.sync_db_to_repo("d2", false).await.unwrap();
    assert!(second.is_empty());
}

/// Invariant 3: apply idempotence — the second of two back-to-back
/// repo-to-db syncs executes no DDL.
#[tokio::test]
async fn apply_idempotence() {
    let f = fleet();
    f.db.put_object("d1", DbObject::new(proc_key(), PROC_V1));
    f.engine.init_repo("d1").await.unwrap();

    // A new object appears in the database and lands as a second commit.
    f.engine
        .sync_db_to_repo("d1", false)
        .await
        .unwrap();
    let view_key = ObjectKey::new(ObjectType::View, "dbo", "v");
    f.db.put_object(
        "d1",
        DbObject::new(view_key.clone(), "CREATE VIEW v AS SELECT 1\nGO"),
    );
    f.engine.sync_db_to_repo("d1", false).await.unwrap();

    // The tag is still at the init commit; the first apply replays the
    // overlay commit, the second finds nothing to do.
    f.engine
        .sync_repo_to_db("HEAD", &["d1".to_string()], false, false)
        .await
        .unwrap();
    let after_first = f.db.apply_calls("d1");

    f.engine
        .sync_repo_to_db("HEAD", &["d1".to_string()], false, false)
        .await
        .unwrap();
    let after_second = f.db.apply_calls("d1");
    assert_eq!(after_first, after_second, "second sync executes no DDL");
}

/// Invariant 6: tag monotonicity — a successful non-dry-run sync leaves
/// the tag at the target commit.
#[tokio::test]
async fn tag_monotonicity() {
    let f = fleet();
    f.db.put_object("d1", DbObject::new(proc_key(), PROC_V1));
    f.db.put_object("d2", DbObject::new(proc_key(), PROC_V2));
    f.engine.init_repo("d1").await.unwrap();
    f.engine.sync_db_to_repo("d2", false).await.unwrap();

    // d1's tag is one commit behind HEAD now.
    let head = f.store.head_id().unwrap();
    assert_ne!(f.store.tag_target("d1"), Some(head.clone()));

    let summary = f
        .engine
        .sync_repo_to_db("HEAD", &["d1".to_string()], false, false)
        .await
        .unwrap();
    assert_eq!(summary.count(SyncStatus::Synced), 1);
    assert_eq!(f.store.tag_target("d1"), Some(head));
}

/// Invariant 6 flip side: a dry run never moves tags.
#[tokio::test]
async fn dry_run_never_moves_tags() {
    let f = fleet();
    f.db.put_object("d1", DbObject::new(proc_key(), PROC_V1));
    f.db.put_object("d2", DbObject::new(proc_key(), PROC_V2));
    f.engine.init_repo("d1").await.unwrap();
    f.engine.sync_db_to_repo("d2", false).await.unwrap();

    let tag_before = f.store.tag_target("d1");
    let summary = f
        .engine
        .sync_repo_to_db("HEAD", &["d1".to_string()], true, false)
        .await
        .unwrap();
    assert_eq!(summary.count(SyncStatus::SuccessDryRun), 1);
    assert_eq!(f.store.tag_target("d1"), tag_before);
}

/// Invariant 7: an ignored path never reaches a commit nor the applier.
#[tokio::test]
async fn ignore_rules_hold_in_both_directions() {
    let f = fleet_with_ignore(IgnoreRules::parse("**/TABLE/dbo/scratch.sql\n"));
    f.db.put_object("d1", DbObject::new(proc_key(), PROC_V1));
    f.db.put_object(
        "d1",
        DbObject::new(
            ObjectKey::new(ObjectType::Table, "dbo", "scratch"),
            "CREATE TABLE [dbo].[scratch] ([x] INT NULL);\nGO",
        ),
    );

    f.engine.init_repo("d1").await.unwrap();
    let tree = RepositoryStore::read_tree(f.store.as_ref(), "HEAD", "base")
        .await
        .unwrap();
    assert!(tree.contains_key("base/PROCEDURE/dbo/p.sql"));
    assert!(!tree.keys().any(|p| p.contains("scratch")));
}

/// Repository-to-database translation: a base modification flows to the
/// target, an overlay pin wins over base, and an overlay removal falls
/// back to base.
#[tokio::test]
async fn overlay_resolution_after_apply() {
    let f = fleet();
    f.db.put_object("d1", DbObject::new(proc_key(), PROC_V1));
    f.db.put_object("d2", DbObject::new(proc_key(), PROC_V2));
    f.engine.init_repo("d1").await.unwrap();
    f.engine.sync_db_to_repo("d2", false).await.unwrap();

    // d2 drifts back to base; its overlay goes away on the next sync.
    f.db.put_object("d2", DbObject::new(proc_key(), PROC_V1));
    let delta = f.engine.sync_db_to_repo("d2", false).await.unwrap();
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].content, None, "overlay delete");

    // Applying HEAD to d2 keeps the base definition in place.
    let summary = f
        .engine
        .sync_repo_to_db("HEAD", &["d2".to_string()], false, false)
        .await
        .unwrap();
    assert_eq!(summary.count(SyncStatus::Synced), 1);
    assert_eq!(
        f.db.definition("d2", &proc_key().to_string()).as_deref(),
        Some(PROC_V1)
    );
}
