//! sqlvcs Core Library
//!
//! Keeps SQL Server schemas as canonical `.sql` files in a Git repository
//! and syncs the two directions: catalog drift folds into per-database
//! overlay commits, and Git references apply back across a fleet of
//! databases as ordered DDL under per-database tags.
//!
//! The crate is backend-agnostic: repository and database access go
//! through the [`ports`] traits, with git2 and tiberius adapters living in
//! `sqlvcs-git` and `sqlvcs-mssql`, and in-memory [`fakes`] for tests.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod ignore;
pub mod normalize;
pub mod ordering;
pub mod paths;
pub mod ports;
pub mod resolver;
pub mod table;
pub mod telemetry;

pub use config::SyncConfig;
pub use domain::{
    DbObject, FullObject, ObjectKey, ObjectType, RepoChange, SyncReport, SyncStatus, SyncSummary,
};
pub use engine::SyncEngine;
pub use error::{DbError, DbResult, Result, StoreError, StoreResult, SyncError};
pub use ignore::{IgnoreRules, IGNORE_FILE_NAME};
pub use normalize::SqlNormalizer;
pub use ordering::order_for_apply;
pub use paths::{key_to_path, path_to_key, path_to_object, BASE_ROOT};
pub use ports::{ChangeType, DatabaseService, DiffEntry, RepositoryStore};
pub use resolver::OverlayResolver;
pub use table::{
    build_alter_script, is_indexable_type, parse_create_table, render_create_table,
    render_data_type, CheckSpec, ColumnSpec, ForeignKeySpec, IndexSpec, LiveColumn,
    LivePrimaryKey, ParsedTable, PrimaryKeySpec, TableInspector, TableSpec, TableStructure,
    UniqueSpec,
};
pub use telemetry::init_tracing;
