//! Transactional DDL application.
//!
//! The change list arrives already ordered (types before tables, tables
//! before modules); this module assembles one script per apply, splits it
//! on `GO` batch delimiters, and executes every batch inside a single
//! transaction. Any batch failure rolls the whole apply back.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use sqlvcs_core::table::planner;
use sqlvcs_core::{DbError, DbObject, DbResult, ObjectType};

use crate::inspector::MssqlInspector;
use crate::{MssqlService, SqlClient};

fn go_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*GO\s*;?\s*$").expect("static regex"))
}

/// Split a script into executable batches on `GO` delimiter lines.
pub fn split_batches(script: &str) -> Vec<String> {
    go_line_re()
        .split(script)
        .map(str::trim)
        .filter(|batch| !batch.is_empty())
        .map(str::to_string)
        .collect()
}

/// `IF NOT EXISTS` guard so schema pre-creation is idempotent.
pub fn create_schema_statement(schema: &str) -> String {
    format!(
        "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = '{schema}') \
         EXEC('CREATE SCHEMA [{schema}]')"
    )
}

/// `DROP <KEYWORD> IF EXISTS` line for one object.
pub fn drop_statement(object: &DbObject) -> String {
    format!(
        "DROP {} IF EXISTS [{}].[{}];",
        object.key.object_type.drop_keyword(),
        object.key.schema,
        object.key.name
    )
}

/// Assemble the full script for a change list. Table changes evolve in
/// place through the diff planner; every other class is drop-and-create.
pub async fn build_script(
    inspector: &dyn sqlvcs_core::TableInspector,
    default_schema: &str,
    changes: &[DbObject],
) -> DbResult<String> {
    let default_schema = default_schema.to_lowercase();
    let mut parts: Vec<String> = Vec::new();

    let schemas: BTreeSet<&str> = changes
        .iter()
        .map(|change| change.key.schema.as_str())
        .filter(|schema| *schema != default_schema)
        .collect();
    for schema in schemas {
        parts.push(create_schema_statement(schema));
        parts.push("GO".to_string());
    }

    for change in changes {
        match change.key.object_type {
            ObjectType::Table => match &change.definition {
                Some(_) => {
                    let script = planner::build_alter_script(change, inspector).await?;
                    if script.is_empty() {
                        debug!(key = %change.key, "table already matches, skipping");
                        continue;
                    }
                    parts.push(script);
                    parts.push("GO".to_string());
                }
                None => {
                    parts.push(drop_statement(change));
                    parts.push("GO".to_string());
                }
            },
            _ => {
                parts.push(drop_statement(change));
                parts.push("GO".to_string());
                if let Some(definition) = &change.definition {
                    parts.push(definition.trim_end().to_string());
                    parts.push("GO".to_string());
                }
            }
        }
    }

    Ok(parts.join("\n"))
}

async fn run_batch(client: &mut SqlClient, batch: &str) -> Result<(), tiberius::error::Error> {
    client.simple_query(batch).await?.into_results().await?;
    Ok(())
}

/// Execute a change list transactionally against one database.
pub(crate) async fn apply_changes(
    service: &MssqlService,
    db_name: &str,
    changes: &[DbObject],
) -> DbResult<()> {
    if changes.is_empty() {
        return Ok(());
    }

    let inspector = MssqlInspector::new(service, db_name);
    let script = build_script(
        &inspector,
        &service.sync_config().default_schema,
        changes,
    )
    .await?;
    let batches = split_batches(&script);
    if batches.is_empty() {
        return Ok(());
    }

    // One connection held for the whole transaction.
    let mut client = service.checkout(db_name).await?;

    run_batch(&mut client, "BEGIN TRANSACTION")
        .await
        .map_err(|e| DbError::Query(e.to_string()))?;

    for batch in &batches {
        if let Err(e) = run_batch(&mut client, batch).await {
            let _ = run_batch(&mut client, "ROLLBACK TRANSACTION").await;
            return Err(DbError::DdlExecution(format!(
                "batch failed and transaction rolled back: {e}"
            )));
        }
    }

    run_batch(&mut client, "COMMIT TRANSACTION")
        .await
        .map_err(|e| DbError::DdlExecution(e.to_string()))?;

    service.checkin(db_name, client).await;
    info!(db = db_name, batches = batches.len(), "changes applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlvcs_core::{ObjectKey, TableInspector, TableStructure};

    fn object(ty: ObjectType, schema: &str, name: &str) -> DbObject {
        DbObject::new(ObjectKey::new(ty, schema, name), "CREATE ...")
    }

    /// Inspector for an empty database: every table is new.
    struct EmptyDbInspector;

    #[async_trait]
    impl TableInspector for EmptyDbInspector {
        async fn table_structure(
            &self,
            _schema: &str,
            _table: &str,
        ) -> DbResult<Option<TableStructure>> {
            Ok(None)
        }

        async fn column_dependents(
            &self,
            _schema: &str,
            _table: &str,
            _column: &str,
        ) -> DbResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn column_indexes(
            &self,
            _schema: &str,
            _table: &str,
            _column: &str,
        ) -> DbResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn script_precreates_non_default_schemas() {
        let changes = vec![
            DbObject::new(
                ObjectKey::new(ObjectType::View, "reporting", "v"),
                "CREATE VIEW [reporting].[v] AS SELECT 1\nGO",
            ),
            DbObject::new(
                ObjectKey::new(ObjectType::View, "dbo", "w"),
                "CREATE VIEW [dbo].[w] AS SELECT 1\nGO",
            ),
        ];
        let script = build_script(&EmptyDbInspector, "dbo", &changes).await.unwrap();

        let schema_stmt = script.find("CREATE SCHEMA [reporting]").unwrap();
        let first_object = script.find("DROP VIEW IF EXISTS").unwrap();
        assert!(schema_stmt < first_object, "schemas come first");
        assert!(!script.contains("CREATE SCHEMA [dbo]"));
    }

    #[tokio::test]
    async fn non_table_objects_drop_then_create() {
        let changes = vec![DbObject::new(
            ObjectKey::new(ObjectType::Procedure, "dbo", "p"),
            "CREATE PROCEDURE [dbo].[p] AS SELECT 1\nGO",
        )];
        let script = build_script(&EmptyDbInspector, "dbo", &changes).await.unwrap();
        let batches = split_batches(&script);
        assert_eq!(batches[0], "DROP PROCEDURE IF EXISTS [dbo].[p];");
        assert!(batches[1].starts_with("CREATE PROCEDURE"));
    }

    #[tokio::test]
    async fn deleted_objects_emit_only_a_drop() {
        let changes = vec![DbObject::deleted(ObjectKey::new(
            ObjectType::Table,
            "dbo",
            "old_table",
        ))];
        let script = build_script(&EmptyDbInspector, "dbo", &changes).await.unwrap();
        let batches = split_batches(&script);
        assert_eq!(batches, vec!["DROP TABLE IF EXISTS [dbo].[old_table];".to_string()]);
    }

    #[tokio::test]
    async fn new_tables_pass_through_their_definition() {
        let definition = "CREATE TABLE [dbo].[t] (\n  [id] INT NOT NULL\n);\nGO\n";
        let changes = vec![DbObject::new(
            ObjectKey::new(ObjectType::Table, "dbo", "t"),
            definition,
        )];
        let script = build_script(&EmptyDbInspector, "dbo", &changes).await.unwrap();
        assert!(script.contains("CREATE TABLE [dbo].[t]"));
        assert!(!script.contains("DROP TABLE"));
    }

    #[test]
    fn split_batches_on_go_lines() {
        let script = "CREATE VIEW v AS SELECT 1\nGO\nCREATE VIEW w AS SELECT 2\ngo\n";
        let batches = split_batches(script);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], "CREATE VIEW v AS SELECT 1");
        assert_eq!(batches[1], "CREATE VIEW w AS SELECT 2");
    }

    #[test]
    fn go_inside_a_statement_does_not_split() {
        let script = "CREATE VIEW v AS SELECT category FROM t\nGO";
        let batches = split_batches(script);
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn drop_statement_uses_type_keyword() {
        assert_eq!(
            drop_statement(&DbObject::deleted(ObjectKey::new(
                ObjectType::TableType,
                "dbo",
                "id_list"
            ))),
            "DROP TYPE IF EXISTS [dbo].[id_list];"
        );
        assert_eq!(
            drop_statement(&object(ObjectType::Procedure, "dbo", "p")),
            "DROP PROCEDURE IF EXISTS [dbo].[p];"
        );
        assert_eq!(
            drop_statement(&object(ObjectType::Sequence, "dbo", "s")),
            "DROP SEQUENCE IF EXISTS [dbo].[s];"
        );
    }

    #[test]
    fn schema_statement_is_guarded() {
        let stmt = create_schema_statement("reporting");
        assert!(stmt.contains("IF NOT EXISTS"));
        assert!(stmt.contains("CREATE SCHEMA [reporting]"));
    }
}
