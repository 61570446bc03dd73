//! Canonical `CREATE TABLE` emission.
//!
//! The catalog reader maps `sys.*` rows into [`TableSpec`] and renders it
//! here, so the emitted form and the planner's parser evolve together.
//! Constraint order inside the body is fixed: primary key, uniques,
//! foreign keys, checks; non-constraint indexes follow the table as
//! separate statements.

use sha2::{Digest, Sha256};

/// One column of a table or table type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    /// Already-rendered type, e.g. `NVARCHAR(50)` or `DECIMAL(10, 2)`.
    pub data_type: String,
    pub nullable: bool,
    pub identity: Option<(i64, i64)>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeySpec {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueSpec {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSpec {
    pub name: String,
    /// Catalog definition text, parenthesized as SQL Server stores it.
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    pub filter: Option<String>,
}

/// Everything needed to script one table canonically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Option<PrimaryKeySpec>,
    pub uniques: Vec<UniqueSpec>,
    pub foreign_keys: Vec<ForeignKeySpec>,
    pub checks: Vec<CheckSpec>,
    pub indexes: Vec<IndexSpec>,
}

/// Render the canonical script: the `CREATE TABLE` batch followed by one
/// `CREATE INDEX` batch per non-constraint index, `GO`-terminated.
pub fn render_create_table(spec: &TableSpec) -> String {
    let mut lines: Vec<String> = Vec::new();

    for column in &spec.columns {
        lines.push(format!("  {}", render_column(column)));
    }
    if let Some(pk) = &spec.primary_key {
        lines.push(format!(
            "  CONSTRAINT [{}] PRIMARY KEY ({})",
            pk.name,
            bracket_list(&pk.columns)
        ));
    }
    for unique in &spec.uniques {
        lines.push(format!(
            "  CONSTRAINT [{}] UNIQUE ({})",
            unique.name,
            bracket_list(&unique.columns)
        ));
    }
    for fk in &spec.foreign_keys {
        lines.push(format!(
            "  CONSTRAINT [{}] FOREIGN KEY ({}) REFERENCES [{}].[{}] ({})",
            fk.name,
            bracket_list(&fk.columns),
            fk.referenced_schema,
            fk.referenced_table,
            bracket_list(&fk.referenced_columns)
        ));
    }
    for check in &spec.checks {
        lines.push(format!(
            "  CONSTRAINT [{}] CHECK {}",
            check.name,
            parenthesized(&check.definition)
        ));
    }

    let mut script = format!(
        "CREATE TABLE [{}].[{}] (\n{}\n);\nGO",
        spec.schema,
        spec.name,
        lines.join(",\n")
    );

    for index in &spec.indexes {
        script.push('\n');
        script.push_str(&render_create_index(spec, index));
        script.push_str("\nGO");
    }
    script.push('\n');
    script
}

fn render_create_index(spec: &TableSpec, index: &IndexSpec) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let mut stmt = format!(
        "CREATE {}INDEX [{}] ON [{}].[{}] ({})",
        unique,
        index.name,
        spec.schema,
        spec.name,
        bracket_list(&index.columns)
    );
    if let Some(filter) = &index.filter {
        stmt.push_str(&format!(" WHERE {}", parenthesized(filter)));
    }
    stmt.push(';');
    stmt
}

fn render_column(column: &ColumnSpec) -> String {
    let mut rendered = format!("[{}] {}", column.name, column.data_type);
    if let Some((seed, increment)) = column.identity {
        rendered.push_str(&format!(" IDENTITY({seed},{increment})"));
    }
    rendered.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
    if let Some(default) = &column.default {
        rendered.push_str(&format!(" DEFAULT {default}"));
    }
    rendered
}

fn bracket_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("[{c}]"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parenthesized(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.starts_with('(') && trimmed.ends_with(')') {
        trimmed.to_string()
    } else {
        format!("({trimmed})")
    }
}

/// Width and precision rendering for catalog types.
///
/// `max_length` is the catalog byte length (-1 for `MAX`); `nvarchar` and
/// `nchar` halve the byte count into characters.
pub fn render_data_type(base_type: &str, max_length: i32, precision: u8, scale: u8) -> String {
    let lower = base_type.to_lowercase();
    let upper = base_type.to_uppercase();
    match lower.as_str() {
        "varchar" | "char" | "varbinary" | "binary" => {
            if max_length == -1 {
                format!("{upper}(MAX)")
            } else {
                format!("{upper}({max_length})")
            }
        }
        "nvarchar" | "nchar" => {
            if max_length == -1 {
                format!("{upper}(MAX)")
            } else {
                format!("{upper}({})", max_length / 2)
            }
        }
        "decimal" | "numeric" => format!("{upper}({precision}, {scale})"),
        "datetime2" | "time" | "datetimeoffset" => {
            if scale > 0 {
                format!("{upper}({scale})")
            } else {
                upper
            }
        }
        _ => upper,
    }
}

/// Types whose presence in an index key makes the index non-scriptable.
pub fn is_indexable_type(rendered_type: &str) -> bool {
    let lower = rendered_type.to_lowercase();
    if lower.ends_with("(max)") {
        return false;
    }
    !matches!(
        lower.as_str(),
        "text" | "ntext" | "image" | "xml" | "geography" | "geometry"
    )
}

/// Rewrite system-generated constraint names (`PK__…`, `UQ__…`, `FK__…`,
/// `CK__…`) into deterministic forms; user-chosen names pass through.
pub fn normalize_pk_name(raw: &str, table: &str) -> String {
    if raw.starts_with("PK__") {
        format!("PK_{table}")
    } else {
        raw.to_string()
    }
}

pub fn normalize_uq_name(raw: &str, table: &str, columns: &[String]) -> String {
    if raw.starts_with("UQ__") {
        format!("UQ_{table}_{}", columns.join("_"))
    } else {
        raw.to_string()
    }
}

pub fn normalize_fk_name(raw: &str, table: &str, referenced_table: &str) -> String {
    if raw.starts_with("FK__") {
        format!("FK_{table}_{referenced_table}")
    } else {
        raw.to_string()
    }
}

pub fn normalize_ck_name(raw: &str, table: &str, definition: &str) -> String {
    if raw.starts_with("CK__") {
        format!("CK_{table}_{}", definition_hash(definition))
    } else {
        raw.to_string()
    }
}

/// Stable four-digit hash of a check definition.
fn definition_hash(definition: &str) -> u64 {
    let digest = Sha256::digest(definition.as_bytes());
    let mut value = 0u64;
    for byte in &digest[..8] {
        value = (value << 8) | u64::from(*byte);
    }
    value % 10_000
}
