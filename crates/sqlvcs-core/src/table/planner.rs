//! Ordered ALTER planning against a live table.
//!
//! The plan drops only the dependent constraints and indexes it must,
//! alters columns in place, and recreates the canonical indexes, so row
//! data survives every change except an explicit column removal.

use async_trait::async_trait;
use tracing::warn;

use crate::domain::DbObject;
use crate::error::DbResult;
use crate::table::parser::{parse_create_table, ParsedColumn, ParsedTable};

/// One live column as the catalog reports it. `name` keeps the catalog's
/// original casing; comparisons against parsed columns are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_identity: bool,
}

/// The live primary-key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivePrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

/// Live structure of one table, read from the system catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStructure {
    pub columns: Vec<LiveColumn>,
    pub primary_key: Option<LivePrimaryKey>,
    /// Names of check constraints currently on the table.
    pub check_names: Vec<String>,
}

/// Live-catalog lookups the planner needs beyond the stored script.
#[async_trait]
pub trait TableInspector: Send + Sync {
    /// Structure of the table, or `None` when it does not exist.
    async fn table_structure(&self, schema: &str, table: &str)
        -> DbResult<Option<TableStructure>>;

    /// Names of check, default, and foreign-key constraints that reference
    /// the column and must be dropped before the column can be.
    async fn column_dependents(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> DbResult<Vec<String>>;

    /// Names of indexes keyed on the column or referencing it in a filtered
    /// index's predicate; these block an `ALTER COLUMN`.
    async fn column_indexes(&self, schema: &str, table: &str, column: &str)
        -> DbResult<Vec<String>>;
}

/// Produce the evolution script for a stored table object.
///
/// - Table absent in the database: the stored definition, unchanged.
/// - Structures match on all tracked attributes: the empty string.
/// - Otherwise: `GO`-separated ALTER statements followed by idempotent
///   recreation of the file's `CREATE INDEX` statements.
pub async fn build_alter_script(
    object: &DbObject,
    inspector: &dyn TableInspector,
) -> DbResult<String> {
    let schema = &object.key.schema;
    let table = &object.key.name;
    let Some(definition) = object.definition.as_deref() else {
        return Ok(String::new());
    };

    let Some(parsed) = parse_create_table(definition) else {
        warn!(%schema, %table, "stored table script is not a parseable CREATE TABLE, skipping");
        return Ok(String::new());
    };

    let Some(live) = inspector.table_structure(schema, table).await? else {
        return Ok(definition.to_string());
    };

    let mut statements: Vec<String> = Vec::new();
    let qualified = format!("[{schema}].[{table}]");

    let parsed_pk_columns: Vec<String> = parsed
        .primary_key
        .as_ref()
        .map(|pk| pk.columns.iter().map(|c| c.to_lowercase()).collect())
        .unwrap_or_default();
    let live_pk_columns: Vec<String> = live
        .primary_key
        .as_ref()
        .map(|pk| pk.columns.iter().map(|c| c.to_lowercase()).collect())
        .unwrap_or_default();
    let pk_differs = parsed_pk_columns != live_pk_columns;

    // 1. Primary key drop when the key columns changed.
    if pk_differs {
        if let Some(live_pk) = &live.primary_key {
            statements.push(format!(
                "ALTER TABLE {qualified} DROP CONSTRAINT [{}]",
                live_pk.name
            ));
        }
    }

    // 2. Removed columns, dependents first.
    for live_column in &live.columns {
        if find_parsed(&parsed, &live_column.name).is_some() {
            continue;
        }
        for constraint in inspector
            .column_dependents(schema, table, &live_column.name)
            .await?
        {
            statements.push(format!(
                "ALTER TABLE {qualified} DROP CONSTRAINT [{constraint}]"
            ));
        }
        statements.push(format!(
            "ALTER TABLE {qualified} DROP COLUMN [{}]",
            live_column.name
        ));
    }

    // 3. Added and altered columns.
    for column in &parsed.columns {
        match find_live(&live, &column.name) {
            None => statements.push(add_column_statement(&qualified, column)),
            Some(live_column) => {
                let type_changed = !types_equal(&column.data_type, &live_column.data_type);
                let null_changed = column.nullable != live_column.nullable;
                if !type_changed && !null_changed {
                    continue;
                }
                if column.identity.is_some() || live_column.is_identity {
                    warn!(
                        %schema, %table, column = %column.name,
                        "identity column change requires a rebuild, skipping"
                    );
                    continue;
                }
                for index in inspector
                    .column_indexes(schema, table, &column.name)
                    .await?
                {
                    statements.push(format!("DROP INDEX IF EXISTS [{index}] ON {qualified}"));
                }
                statements.push(format!(
                    "ALTER TABLE {qualified} ALTER COLUMN [{}] {} {}",
                    column.name,
                    column.data_type,
                    if column.nullable { "NULL" } else { "NOT NULL" },
                ));
            }
        }
    }

    // 4. Primary key recreation.
    if pk_differs && !parsed_pk_columns.is_empty() {
        let pk_name = parsed
            .primary_key
            .as_ref()
            .and_then(|pk| pk.name.clone())
            .unwrap_or_else(|| format!("PK_{schema}_{table}"));
        let columns = parsed
            .primary_key
            .as_ref()
            .map(|pk| {
                pk.columns
                    .iter()
                    .map(|c| format!("[{c}]"))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        statements.push(format!(
            "ALTER TABLE {qualified} ADD CONSTRAINT [{pk_name}] PRIMARY KEY ({columns})"
        ));
    }

    // 5. Check constraints the file has and the table does not.
    for check in &parsed.checks {
        let exists = live
            .check_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&check.name));
        if !exists {
            statements.push(format!(
                "ALTER TABLE {qualified} ADD CONSTRAINT [{}] CHECK ({})",
                check.name, check.expression
            ));
        }
    }

    if statements.is_empty() {
        return Ok(String::new());
    }

    // 6. Idempotent index recreation from the canonical file.
    for index in &parsed.indexes {
        statements.push(format!(
            "DROP INDEX IF EXISTS [{}] ON {}",
            index.name, index.on_clause
        ));
        statements.push(index.create_statement.clone());
    }

    Ok(statements.join("\nGO\n"))
}

fn add_column_statement(qualified: &str, column: &ParsedColumn) -> String {
    let mut stmt = format!("ALTER TABLE {qualified} ADD [{}] {}", column.name, column.data_type);
    if let Some((seed, increment)) = column.identity {
        stmt.push_str(&format!(" IDENTITY({seed},{increment})"));
    }
    stmt.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
    if let Some(default) = &column.default {
        stmt.push_str(&format!(" DEFAULT {default}"));
    }
    stmt
}

fn find_parsed<'a>(parsed: &'a ParsedTable, name: &str) -> Option<&'a ParsedColumn> {
    parsed
        .columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
}

fn find_live<'a>(live: &'a TableStructure, name: &str) -> Option<&'a LiveColumn> {
    live.columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Rendered types compare case-insensitively with interior whitespace
/// ignored, so `DECIMAL(10,2)` equals `decimal(10, 2)`.
fn types_equal(a: &str, b: &str) -> bool {
    let canon = |s: &str| {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase()
    };
    canon(a) == canon(b)
}
