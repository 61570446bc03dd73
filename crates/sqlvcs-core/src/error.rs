//! Error taxonomy for the synchronization engine.
//!
//! Three layers, each with its own enum:
//! - [`StoreError`] — repository port faults (transport, resolution).
//! - [`DbError`] — database port faults (connection, query, DDL).
//! - [`SyncError`] — the engine-level taxonomy surfaced to callers.
//!
//! Per-target failures inside a fleet sync are captured into
//! `SyncReport::Failed`; only orchestrator-wide preconditions propagate as
//! `Err` from the engine's public operations.

use thiserror::Error;

use crate::domain::RepoChange;

/// Result type for repository store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for database service operations.
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by a repository store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A commitish did not resolve to a commit.
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// A branch or tag reference was missing.
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// Remote transport failure (fetch or push).
    #[error("remote operation failed: {0}")]
    Remote(String),

    /// Any other backend fault.
    #[error("repository backend error: {0}")]
    Backend(String),
}

/// Errors raised by a database service implementation.
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection establishment or routing failure.
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Catalog query failure.
    #[error("catalog query failed: {0}")]
    Query(String),

    /// A DDL batch failed during apply; the transaction was rolled back.
    #[error("DDL execution failed: {0}")]
    DdlExecution(String),
}

/// Engine-level errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Repository path does not end in `.sql`.
    #[error("invalid file type (expected .sql): {0}")]
    InvalidFileType(String),

    /// Repository path has too few segments or an empty component.
    #[error("invalid repository path: {0}")]
    InvalidPath(String),

    /// Unknown object type token in a repository path.
    #[error("invalid object type: {0}")]
    InvalidObjectType(String),

    /// `init_repo` called against a repository that already has commits.
    #[error("repository is not empty")]
    RepoNotEmpty,

    /// The source database contains no managed objects.
    #[error("no objects found in database: {0}")]
    NoObjects(String),

    /// The target database has no tag and cannot be synced to.
    #[error("database not onboarded: {0}")]
    DbNotOnboarded(String),

    /// The live database deviates from its overlay-resolved expected state.
    #[error("database out of sync: {db_name} ({} pending overlay changes)", .changes.len())]
    DbOutOfSync {
        db_name: String,
        changes: Vec<RepoChange>,
    },

    /// The FK or view reference graph has a cycle.
    #[error("dependency cycle detected: {0}")]
    DependencyCycle(String),

    /// Repository port fault.
    #[error("repository error: {0}")]
    Store(#[from] StoreError),

    /// Database port fault.
    #[error("database error: {0}")]
    Db(#[from] DbError),
}
