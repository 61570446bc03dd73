//! Repository path filtering via `.syncignore` globs.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

/// Conventional ignore file name at the repository root.
pub const IGNORE_FILE_NAME: &str = ".syncignore";

/// Compiled ignore rules: one glob per line, `#` comments and blank lines
/// skipped, `*`/`**`/`?` semantics over forward-slash repository paths.
#[derive(Debug)]
pub struct IgnoreRules {
    set: GlobSet,
    patterns: Vec<String>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::empty()
    }
}

impl IgnoreRules {
    /// Rule set that processes everything.
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Parse rules from ignore-file text. Unparseable globs are skipped
    /// with a warning rather than failing the sync.
    pub fn parse(text: &str) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut patterns = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match Glob::new(line) {
                Ok(glob) => {
                    builder.add(glob);
                    patterns.push(line.to_string());
                }
                Err(e) => warn!(pattern = line, error = %e, "skipping unparseable ignore glob"),
            }
        }
        match builder.build() {
            Ok(set) => Self { set, patterns },
            Err(e) => {
                warn!(error = %e, "ignore glob set failed to compile, processing all paths");
                Self::empty()
            }
        }
    }

    /// Load rules from a file on disk. A missing file yields the empty set.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(_) => Self::empty(),
        }
    }

    /// True iff no configured glob matches the path.
    pub fn should_process(&self, path: &str) -> bool {
        !self.set.is_match(path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
