//! Codec between object identity and repository paths.
//!
//! Repository layout, two disjoint subtrees:
//! - `base/<TYPE>/<schema>/<name>.sql` — canonical, database-agnostic form.
//! - `<prefix>/<dbName>/<TYPE>/<schema>/<name>.sql` — per-database overlay.
//!
//! Identity tuples are lowercased on parse; the path side carries the
//! uppercase type segment. Invalid paths are a fatal error at the boundary.

use crate::domain::{DbObject, ObjectKey, ObjectType};
use crate::error::{Result, SyncError};

/// Root of the canonical subtree.
pub const BASE_ROOT: &str = "base";

/// Repository path for an object under the given root.
pub fn key_to_path(key: &ObjectKey, root: &str) -> String {
    format!(
        "{}/{}/{}/{}.sql",
        root, key.object_type, key.schema, key.name
    )
}

/// Parse a repository path back into an object identity.
///
/// Validates the `.sql` suffix and the segment shape, then reads the last
/// three segments as `<TYPE>/<schema>/<name>.sql`.
pub fn path_to_key(path: &str) -> Result<ObjectKey> {
    let Some(stem) = path.strip_suffix(".sql") else {
        return Err(SyncError::InvalidFileType(path.to_string()));
    };

    let segments: Vec<&str> = stem.split('/').collect();
    if segments.len() < 4 || segments.iter().any(|s| s.is_empty()) {
        return Err(SyncError::InvalidPath(path.to_string()));
    }

    let name = segments[segments.len() - 1];
    let schema = segments[segments.len() - 2];
    let type_segment = segments[segments.len() - 3];

    let object_type = ObjectType::from_segment(type_segment)
        .ok_or_else(|| SyncError::InvalidObjectType(type_segment.to_string()))?;

    Ok(ObjectKey::new(object_type, schema, name))
}

/// Parse a path and attach a definition, yielding a full object record.
pub fn path_to_object(path: &str, definition: Option<String>) -> Result<DbObject> {
    Ok(DbObject {
        key: path_to_key(path)?,
        definition,
    })
}
