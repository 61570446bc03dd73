//! Parsing of stored `CREATE TABLE` scripts.
//!
//! Extracts columns, the primary-key constraint, check constraints, and the
//! trailing `CREATE INDEX` statements. Commas inside nested parentheses do
//! not split column entries (`DECIMAL(10,2)`).

use std::sync::OnceLock;

use regex::Regex;

/// One column as written in the stored definition. Identifier casing is
/// preserved exactly as the file has it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedColumn {
    pub name: String,
    pub data_type: String,
    pub identity: Option<(i64, i64)>,
    pub nullable: bool,
    pub default: Option<String>,
}

/// The table-level primary-key constraint, if the file declares one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// A named check constraint with its expression (outer parens stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCheck {
    pub name: String,
    pub expression: String,
}

/// A `CREATE INDEX` statement following the table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIndex {
    pub name: String,
    pub on_clause: String,
    pub create_statement: String,
}

/// Everything the diff planner tracks from a stored table script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    pub columns: Vec<ParsedColumn>,
    pub primary_key: Option<ParsedPrimaryKey>,
    pub checks: Vec<ParsedCheck>,
    pub indexes: Vec<ParsedIndex>,
}

fn column_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:\[(\w+)\]|(\w+))").expect("static regex"))
}

fn column_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z_]\w*)\s*(\([^)]*\))?").expect("static regex"))
}

fn identity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bIDENTITY\s*\(\s*(\d+)\s*,\s*(\d+)\s*\)").expect("static regex")
    })
}

fn primary_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:CONSTRAINT\s+(?:\[(\w+)\]|(\w+))\s+)?PRIMARY\s+KEY(?:\s+(?:CLUSTERED|NONCLUSTERED))?\s*\(",
        )
        .expect("static regex")
    })
}

fn check_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)CONSTRAINT\s+(?:\[(\w+)\]|(\w+))\s+CHECK\s*\(").expect("static regex")
    })
}

fn create_index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bCREATE\s+(?:UNIQUE\s+)?(?:(?:NON)?CLUSTERED\s+)?INDEX\s+(?:\[(\w+)\]|(\w+))\s+ON\s+((?:\[\w+\]|\w+)(?:\s*\.\s*(?:\[\w+\]|\w+))?)",
        )
        .expect("static regex")
    })
}

fn create_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bCREATE\s+TABLE\b").expect("static regex"))
}

/// Parse a stored `CREATE TABLE` script. Returns `None` when the text holds
/// no `CREATE TABLE` statement or the body cannot be isolated.
pub fn parse_create_table(definition: &str) -> Option<ParsedTable> {
    let text = strip_line_comments(definition);

    let start = create_table_re().find(&text)?.end();
    let open = text[start..].find('(')? + start;
    let close = matching_paren(&text, open)?;
    let body = &text[open + 1..close];

    let constraint_pos = top_level_keyword(body, "constraint");
    let column_block = &body[..constraint_pos.unwrap_or(body.len())];

    let mut columns = Vec::new();
    for entry in split_top_level_commas(column_block) {
        if let Some(column) = parse_column(&entry) {
            columns.push(column);
        }
    }

    let primary_key = parse_primary_key(body);
    let checks = parse_checks(body);
    let indexes = parse_indexes(&text[close + 1..]);

    Some(ParsedTable {
        columns,
        primary_key,
        checks,
        indexes,
    })
}

fn parse_column(entry: &str) -> Option<ParsedColumn> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let name_caps = column_name_re().captures(entry)?;
    // A bare keyword here is a table-level constraint, not a column.
    if let Some(word) = name_caps.get(2) {
        let upper = word.as_str().to_ascii_uppercase();
        if matches!(
            upper.as_str(),
            "CONSTRAINT" | "PRIMARY" | "UNIQUE" | "FOREIGN" | "CHECK" | "INDEX"
        ) {
            return None;
        }
    }
    let name = name_caps
        .get(1)
        .or_else(|| name_caps.get(2))?
        .as_str()
        .to_string();
    let rest = &entry[name_caps.get(0).unwrap().end()..];

    let type_caps = column_type_re().captures(rest)?;
    let mut data_type = type_caps.get(1)?.as_str().to_string();
    if let Some(args) = type_caps.get(2) {
        data_type.push_str(args.as_str());
    }
    let tail = &rest[type_caps.get(0).unwrap().end()..];

    let identity = identity_re()
        .captures(tail)
        .map(|c| (c[1].parse().unwrap_or(1), c[2].parse().unwrap_or(1)));

    let nullable = !not_null_re().is_match(tail);
    let default = find_default(tail);

    Some(ParsedColumn {
        name,
        data_type,
        identity,
        nullable,
        default,
    })
}

/// `DEFAULT <expr>` — the expression runs to the end of the (already
/// comma-balanced) column entry.
fn find_default(tail: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\bDEFAULT\s+(.+)$").expect("static regex"));
    re.captures(tail.trim())
        .map(|c| c[1].trim().trim_end_matches(',').trim().to_string())
}

fn parse_primary_key(body: &str) -> Option<ParsedPrimaryKey> {
    let caps = primary_key_re().captures(body)?;
    let name = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string());
    let open = caps.get(0).unwrap().end() - 1;
    let close = matching_paren(body, open)?;
    let columns = split_top_level_commas(&body[open + 1..close])
        .into_iter()
        .map(|c| clean_key_column(&c))
        .filter(|c| !c.is_empty())
        .collect();
    Some(ParsedPrimaryKey { name, columns })
}

fn parse_checks(body: &str) -> Vec<ParsedCheck> {
    let mut checks = Vec::new();
    for caps in check_re().captures_iter(body) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string());
        let open = caps.get(0).unwrap().end() - 1;
        let (Some(name), Some(close)) = (name, matching_paren(body, open)) else {
            continue;
        };
        checks.push(ParsedCheck {
            name,
            expression: body[open + 1..close].trim().to_string(),
        });
    }
    checks
}

fn parse_indexes(tail: &str) -> Vec<ParsedIndex> {
    let mut indexes = Vec::new();
    let matches: Vec<_> = create_index_re().captures_iter(tail).collect();
    for (i, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).unwrap();
        let end_limit = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(tail.len());
        let statement = statement_slice(&tail[whole.start()..end_limit]);
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        indexes.push(ParsedIndex {
            name,
            on_clause: caps[3].to_string(),
            create_statement: statement,
        });
    }
    indexes
}

/// Trim a raw statement region down to the statement itself: stop at the
/// first top-level `;` or a `GO` batch delimiter line.
fn statement_slice(region: &str) -> String {
    let mut depth = 0usize;
    for (i, ch) in region.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => return region[..i].trim().to_string(),
            _ => {}
        }
    }
    // No terminator: cut at a GO line if present.
    static GO_LINE: OnceLock<Regex> = OnceLock::new();
    let go = GO_LINE.get_or_init(|| Regex::new(r"(?im)^\s*GO\s*$").expect("static regex"));
    match go.find(region) {
        Some(m) => region[..m.start()].trim().to_string(),
        None => region.trim().to_string(),
    }
}

/// Strip `[`/`]` quoting and an `ASC`/`DESC` suffix from a key column.
fn clean_key_column(raw: &str) -> String {
    let cleaned = raw.trim().trim_start_matches('[').replace(']', "");
    let cleaned = cleaned.trim();
    for suffix in [" ASC", " asc", " DESC", " desc"] {
        if let Some(stripped) = cleaned.strip_suffix(suffix) {
            return stripped.trim().to_string();
        }
    }
    cleaned.to_string()
}

fn strip_line_comments(text: &str) -> String {
    text.lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Index of the `)` matching the `(` at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    if !text[open..].starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    for (i, ch) in text[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte offset of the first occurrence of `keyword` at parenthesis depth 0,
/// case-insensitive, on a word boundary. ASCII lowering keeps byte offsets
/// aligned with the original text.
fn top_level_keyword(text: &str, keyword: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ => {
                if depth == 0
                    && lower[i..].starts_with(keyword)
                    && (i == 0 || !lower.as_bytes()[i - 1].is_ascii_alphanumeric())
                {
                    let after = i + keyword.len();
                    if after >= lower.len() || !lower.as_bytes()[after].is_ascii_alphanumeric() {
                        return Some(i);
                    }
                }
            }
        }
        i += 1;
    }
    None
}

fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].to_string());
    parts
}

fn not_null_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bNOT\s+NULL\b").expect("static regex"))
}
