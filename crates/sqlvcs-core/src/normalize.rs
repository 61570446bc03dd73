//! Canonical SQL text form and semantic equivalence.
//!
//! Two DDLs are equivalent when they differ only in comments, case,
//! whitespace, statement terminators, identifier quoting, an optional
//! `OR ALTER`, or presence of the default-schema prefix — everything the
//! SQL Server scripter emits inconsistently between environments. The
//! normalizer is deterministic and purely textual; it never fails.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;

/// Produces the canonical token form of a SQL module and decides
/// equivalence. Results are cached keyed by the raw input, since the same
/// definitions are normalized repeatedly within one sync.
pub struct SqlNormalizer {
    whitespace: Regex,
    bracket_ident: Regex,
    batch_split: Regex,
    create_or_alter: Regex,
    module_schema: Regex,
    schema_ref: Regex,
    cache: Mutex<HashMap<String, String>>,
}

impl SqlNormalizer {
    pub fn new(default_schema: &str) -> Self {
        let schema = regex::escape(&default_schema.to_lowercase());
        Self {
            whitespace: Regex::new(r"\s+").expect("static regex"),
            bracket_ident: Regex::new(r"\[(\w+)\]").expect("static regex"),
            batch_split: Regex::new(r"\bgo\b").expect("static regex"),
            create_or_alter: Regex::new(r"\bcreate or alter\b").expect("static regex"),
            module_schema: Regex::new(&format!(
                r"\b(create|alter) (procedure|function|view|trigger) {schema}\."
            ))
            .expect("schema regex"),
            schema_ref: Regex::new(&format!(r"\b{schema}\.")).expect("schema regex"),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Canonical form of `sql`. Empty string when no batch contains a
    /// `create`.
    pub fn normalize(&self, sql: &str) -> String {
        if let Some(hit) = self.cache.lock().unwrap().get(sql) {
            return hit.clone();
        }
        let canonical = self.normalize_uncached(sql);
        self.cache
            .lock()
            .unwrap()
            .insert(sql.to_string(), canonical.clone());
        canonical
    }

    /// Null-propagating variant: `None` stays `None`.
    pub fn normalize_opt(&self, sql: Option<&str>) -> Option<String> {
        sql.map(|s| self.normalize(s))
    }

    /// Whether two SQL texts mean the same thing. Both-`None` inputs are
    /// equivalent; one `None` and one non-`None` are not.
    pub fn equivalent(&self, a: Option<&str>, b: Option<&str>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.normalize(a) == self.normalize(b),
            _ => false,
        }
    }

    fn normalize_uncached(&self, sql: &str) -> String {
        let text = strip_comments(sql);
        let text = text.to_lowercase();
        let text = self.whitespace.replace_all(&text, " ");
        let text = text.trim();
        let text = text.replace(';', "");
        // Deleting terminators can leave doubled spaces ("x ; go").
        let text = self.whitespace.replace_all(&text, " ").into_owned();
        let text = self.bracket_ident.replace_all(&text, "$1").into_owned();

        let batch = self
            .batch_split
            .split(&text)
            .find(|batch| batch.contains("create"))
            .map(str::trim)
            .unwrap_or("")
            .to_string();

        let batch = self.create_or_alter.replace_all(&batch, "create");
        let batch = self.module_schema.replace_all(&batch, "$1 $2 ");
        self.schema_ref.replace_all(&batch, "").into_owned()
    }
}

/// Remove `-- …` line comments and `/* … */` runs. A `--` inside an open
/// block comment does not start a line comment.
fn strip_comments(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            i += 2;
            while i < bytes.len() {
                if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                    i += 2;
                    break;
                }
                i += 1;
            }
        } else if bytes[i] == b'-' && i + 1 < bytes.len() && bytes[i + 1] == b'-' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
        } else {
            // Non-comment bytes are copied through, multi-byte chars intact.
            let ch_len = utf8_len(bytes[i]);
            out.push_str(&sql[i..i + ch_len]);
            i += ch_len;
        }
    }
    out
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> SqlNormalizer {
        SqlNormalizer::new("dbo")
    }

    #[test]
    fn equivalence_is_reflexive() {
        let n = normalizer();
        let sql = "CREATE VIEW v AS SELECT 1\nGO";
        assert!(n.equivalent(Some(sql), Some(sql)));
    }

    #[test]
    fn equivalence_is_symmetric_and_transitive() {
        let n = normalizer();
        let a = "CREATE OR ALTER PROCEDURE [dbo].[p] AS SELECT 1;\nGO";
        let b = "create procedure p as select 1\ngo";
        let c = "CREATE PROCEDURE p\nAS\n  SELECT 1\nGO";
        assert!(n.equivalent(Some(a), Some(b)));
        assert!(n.equivalent(Some(b), Some(a)));
        assert!(n.equivalent(Some(b), Some(c)));
        assert!(n.equivalent(Some(a), Some(c)));
    }

    #[test]
    fn null_handling() {
        let n = normalizer();
        assert!(n.equivalent(None, None));
        assert!(!n.equivalent(Some("CREATE VIEW v AS SELECT 1 GO"), None));
        assert!(!n.equivalent(None, Some("CREATE VIEW v AS SELECT 1 GO")));
        assert_eq!(n.normalize_opt(None), None);
    }

    #[test]
    fn comments_are_stripped() {
        let n = normalizer();
        assert!(n.equivalent(
            Some("CREATE VIEW v AS SELECT 1 -- x\nGO"),
            Some("create view v as select 1 GO"),
        ));
        assert!(n.equivalent(
            Some("CREATE /* block\ncomment */ VIEW v AS SELECT 1 GO"),
            Some("CREATE VIEW v AS SELECT 1 GO"),
        ));
    }

    #[test]
    fn line_comment_marker_inside_block_comment_is_inert() {
        let n = normalizer();
        assert!(n.equivalent(
            Some("CREATE VIEW v AS /* -- not a line comment */ SELECT 1 GO"),
            Some("CREATE VIEW v AS SELECT 1 GO"),
        ));
    }

    #[test]
    fn bracket_quoting_and_default_schema_fold_away() {
        let n = normalizer();
        assert!(n.equivalent(
            Some("CREATE PROCEDURE [dbo].[p] AS SELECT 1 GO"),
            Some("create procedure p as select 1 go"),
        ));
    }

    #[test]
    fn create_or_alter_equals_create() {
        let n = normalizer();
        assert!(n.equivalent(
            Some("CREATE OR ALTER VIEW v AS SELECT 1 GO"),
            Some("CREATE VIEW v AS SELECT 1 GO"),
        ));
    }

    #[test]
    fn semicolons_and_whitespace_are_insignificant() {
        let n = normalizer();
        assert!(n.equivalent(
            Some("CREATE   VIEW v AS\n\tSELECT 1 ;\nGO"),
            Some("CREATE VIEW v AS SELECT 1\nGO"),
        ));
    }

    #[test]
    fn set_options_header_batch_is_skipped() {
        let n = normalizer();
        let with_header = "SET ANSI_NULLS ON\nGO\nSET QUOTED_IDENTIFIER ON\nGO\nCREATE VIEW v AS SELECT 1\nGO";
        assert!(n.equivalent(Some(with_header), Some("CREATE VIEW v AS SELECT 1 GO")));
    }

    #[test]
    fn no_create_batch_normalizes_to_empty() {
        let n = normalizer();
        assert_eq!(n.normalize("SELECT 1\nGO\nSELECT 2"), "");
        assert!(n.equivalent(Some("SELECT 1 GO"), Some("PRINT 'x' GO")));
    }

    #[test]
    fn default_schema_references_are_deleted_everywhere() {
        let n = normalizer();
        assert!(n.equivalent(
            Some("CREATE VIEW v AS SELECT * FROM dbo.users GO"),
            Some("CREATE VIEW v AS SELECT * FROM users GO"),
        ));
    }

    #[test]
    fn non_default_schema_is_preserved() {
        let n = normalizer();
        assert!(!n.equivalent(
            Some("CREATE VIEW v AS SELECT * FROM audit.users GO"),
            Some("CREATE VIEW v AS SELECT * FROM users GO"),
        ));
    }

    #[test]
    fn go_requires_word_boundaries() {
        let n = normalizer();
        // "category" contains "go" only without boundaries; must not split.
        let sql = "CREATE VIEW v AS SELECT category FROM t GO";
        assert_eq!(
            n.normalize(sql),
            "create view v as select category from t"
        );
    }

    #[test]
    fn cache_returns_identical_results() {
        let n = normalizer();
        let sql = "CREATE VIEW v AS SELECT 1 GO";
        let first = n.normalize(sql);
        let second = n.normalize(sql);
        assert_eq!(first, second);
    }
}
