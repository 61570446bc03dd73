//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by every sync operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Schema whose prefix the normalizer folds away (conventionally `dbo`).
    pub default_schema: String,

    /// First path segment of the per-database overlay subtree.
    pub diff_prefix: String,

    /// Branch whose tip receives sync commits.
    pub default_branch: String,

    /// Upper bound on concurrently synced target databases. Each in-flight
    /// target holds a live database connection.
    pub max_parallel_targets: usize,

    /// Per-target wall-clock limit in seconds; 0 disables the limit. A
    /// timed-out target fails on its own without affecting peers.
    pub target_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_schema: "dbo".to_string(),
            diff_prefix: "diff".to_string(),
            default_branch: "main".to_string(),
            max_parallel_targets: 8,
            target_timeout_secs: 0,
        }
    }
}

impl SyncConfig {
    /// Root of the overlay subtree for one database: `<prefix>/<db>`.
    pub fn diff_root(&self, db_name: &str) -> String {
        format!("{}/{}", self.diff_prefix, db_name.to_lowercase())
    }
}
