//! Domain model for managed schema objects and sync outcomes.
//!
//! Every managed object is identified by the triple `(type, schema, name)`
//! with all components lowercased; the triple is the primary key within a
//! database. Definitions are complete DDL texts executable as `GO`-separated
//! batches, with `None` denoting deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of managed object classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Procedure,
    Function,
    View,
    Trigger,
    Table,
    TableType,
    ScalarType,
    Sequence,
    Synonym,
}

impl ObjectType {
    /// All managed types, in declaration order.
    pub const ALL: [ObjectType; 9] = [
        ObjectType::Procedure,
        ObjectType::Function,
        ObjectType::View,
        ObjectType::Trigger,
        ObjectType::Table,
        ObjectType::TableType,
        ObjectType::ScalarType,
        ObjectType::Sequence,
        ObjectType::Synonym,
    ];

    /// The uppercase path segment used in the repository layout.
    pub fn as_segment(&self) -> &'static str {
        match self {
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::Function => "FUNCTION",
            ObjectType::View => "VIEW",
            ObjectType::Trigger => "TRIGGER",
            ObjectType::Table => "TABLE",
            ObjectType::TableType => "TABLE_TYPE",
            ObjectType::ScalarType => "SCALAR_TYPE",
            ObjectType::Sequence => "SEQUENCE",
            ObjectType::Synonym => "SYNONYM",
        }
    }

    /// Parse an uppercase path segment back into a type.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment.to_ascii_uppercase().as_str() {
            "PROCEDURE" => Some(ObjectType::Procedure),
            "FUNCTION" => Some(ObjectType::Function),
            "VIEW" => Some(ObjectType::View),
            "TRIGGER" => Some(ObjectType::Trigger),
            "TABLE" => Some(ObjectType::Table),
            "TABLE_TYPE" => Some(ObjectType::TableType),
            "SCALAR_TYPE" => Some(ObjectType::ScalarType),
            "SEQUENCE" => Some(ObjectType::Sequence),
            "SYNONYM" => Some(ObjectType::Synonym),
            _ => None,
        }
    }

    /// The `DROP <KEYWORD> IF EXISTS` keyword for this type.
    ///
    /// User-defined table types and scalar types both drop as `TYPE`.
    pub fn drop_keyword(&self) -> &'static str {
        match self {
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::Function => "FUNCTION",
            ObjectType::View => "VIEW",
            ObjectType::Trigger => "TRIGGER",
            ObjectType::Table => "TABLE",
            ObjectType::TableType | ObjectType::ScalarType => "TYPE",
            ObjectType::Sequence => "SEQUENCE",
            ObjectType::Synonym => "SYNONYM",
        }
    }

    /// Coarse apply ordering: types and sequences before tables, tables
    /// before modules, views after functions and procedures, triggers last.
    pub fn apply_rank(&self) -> u8 {
        match self {
            ObjectType::ScalarType => 0,
            ObjectType::TableType => 1,
            ObjectType::Sequence => 2,
            ObjectType::Synonym => 3,
            ObjectType::Table => 4,
            ObjectType::Function => 5,
            ObjectType::Procedure => 6,
            ObjectType::View => 7,
            ObjectType::Trigger => 8,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_segment())
    }
}

/// Identity of a managed object: `(type, schema, name)`, all lowercased.
///
/// The constructor lowercases both identifier components so keys compare
/// consistently regardless of how the catalog or a repository path cased
/// them. Identifier casing *inside* definitions is preserved elsewhere and
/// never flows through this type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub object_type: ObjectType,
    pub schema: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(object_type: ObjectType, schema: &str, name: &str) -> Self {
        Self {
            object_type,
            schema: schema.to_lowercase(),
            name: name.to_lowercase(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.object_type, self.schema, self.name)
    }
}

/// A managed object with its DDL text.
///
/// `definition = None` denotes deletion when the object travels through the
/// change applier, and "absent in this source" in three-way resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbObject {
    pub key: ObjectKey,
    pub definition: Option<String>,
}

impl DbObject {
    pub fn new(key: ObjectKey, definition: impl Into<String>) -> Self {
        Self {
            key,
            definition: Some(definition.into()),
        }
    }

    pub fn deleted(key: ObjectKey) -> Self {
        Self {
            key,
            definition: None,
        }
    }
}

/// Per-key triple materialized during a sync: live catalog, base tree, and
/// per-database overlay, any of which may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullObject {
    pub db_definition: Option<String>,
    pub base_definition: Option<String>,
    pub diff_definition: Option<String>,
}

/// A single mutation to the repository working tree.
///
/// `content = None` deletes the file, `content = Some("")` writes a
/// zero-byte tombstone, non-empty content creates or replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoChange {
    pub path: String,
    pub content: Option<String>,
}

impl RepoChange {
    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
        }
    }

    pub fn tombstone(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(String::new()),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
        }
    }

    /// Whether this change writes a zero-byte tombstone.
    pub fn is_tombstone(&self) -> bool {
        matches!(self.content.as_deref(), Some(""))
    }
}

/// Outcome bucket for one target database in a fleet sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Synced,
    SuccessDryRun,
    SkippedNotOnboarded,
    SkippedOutOfSync,
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Synced => "SYNCED",
            SyncStatus::SuccessDryRun => "SUCCESS_DRY_RUN",
            SyncStatus::SkippedNotOnboarded => "SKIPPED_NOT_ONBOARDED",
            SyncStatus::SkippedOutOfSync => "SKIPPED_OUT_OF_SYNC",
            SyncStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Per-target result of `sync_repo_to_db`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub db_name: String,
    pub status: SyncStatus,
    pub message: String,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn new(db_name: impl Into<String>, status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            status,
            message: message.into(),
            finished_at: Utc::now(),
        }
    }
}

/// Aggregate summary over a batch of per-target reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub reports: Vec<SyncReport>,
}

impl SyncSummary {
    pub fn new(reports: Vec<SyncReport>) -> Self {
        Self { reports }
    }

    pub fn count(&self, status: SyncStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }

    /// Whether every target landed in a non-failed bucket.
    pub fn all_ok(&self) -> bool {
        self.count(SyncStatus::Failed) == 0
    }
}
