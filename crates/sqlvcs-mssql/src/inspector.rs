//! Live table structure lookups for the diff planner.

use async_trait::async_trait;

use sqlvcs_core::table::emit;
use sqlvcs_core::{DbError, DbResult, LiveColumn, LivePrimaryKey, TableInspector, TableStructure};

use crate::MssqlService;

const COLUMNS_SQL: &str = "\
SELECT c.name AS column_name, bt.name AS base_type,
       CAST(c.max_length AS INT) AS max_length,
       CAST(c.precision AS INT) AS precision, CAST(c.scale AS INT) AS scale,
       c.is_nullable, c.is_identity
FROM sys.columns c
JOIN sys.objects o ON o.object_id = c.object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
JOIN sys.types bt ON bt.user_type_id = c.system_type_id
WHERE s.name = @P1 AND o.name = @P2
ORDER BY c.column_id";

const PRIMARY_KEY_SQL: &str = "\
SELECT kc.name AS constraint_name, col.name AS column_name
FROM sys.key_constraints kc
JOIN sys.objects o ON o.object_id = kc.parent_object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
JOIN sys.index_columns ic
       ON ic.object_id = o.object_id AND ic.index_id = kc.unique_index_id
JOIN sys.columns col ON col.object_id = o.object_id AND col.column_id = ic.column_id
WHERE kc.type = 'PK' AND s.name = @P1 AND o.name = @P2
ORDER BY ic.key_ordinal";

const CHECK_NAMES_SQL: &str = "\
SELECT cc.name AS constraint_name
FROM sys.check_constraints cc
JOIN sys.objects o ON o.object_id = cc.parent_object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
WHERE s.name = @P1 AND o.name = @P2
ORDER BY cc.name";

/// Check, default, and foreign-key constraints that reference a column and
/// block its removal. Column-scoped constraints are matched by id; table
/// check expressions additionally by a bracketed-name scan.
const COLUMN_DEPENDENTS_SQL: &str = "\
SELECT dc.name AS constraint_name
FROM sys.default_constraints dc
JOIN sys.columns c
       ON c.object_id = dc.parent_object_id AND c.column_id = dc.parent_column_id
JOIN sys.objects o ON o.object_id = dc.parent_object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
WHERE s.name = @P1 AND o.name = @P2 AND c.name = @P3
UNION
SELECT cc.name
FROM sys.check_constraints cc
JOIN sys.objects o ON o.object_id = cc.parent_object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
LEFT JOIN sys.columns c
       ON c.object_id = cc.parent_object_id AND c.column_id = cc.parent_column_id
WHERE s.name = @P1 AND o.name = @P2
  AND (c.name = @P3 OR cc.definition LIKE '%\\[' + @P3 + '\\]%' ESCAPE '\\')
UNION
SELECT fk.name
FROM sys.foreign_keys fk
JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
JOIN sys.columns pc
       ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
JOIN sys.objects o ON o.object_id = fk.parent_object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
WHERE s.name = @P1 AND o.name = @P2 AND pc.name = @P3";

/// Indexes keyed on the column, or filtered indexes whose predicate names
/// it; both block `ALTER COLUMN`.
const COLUMN_INDEXES_SQL: &str = "\
SELECT i.name AS index_name
FROM sys.indexes i
JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
JOIN sys.objects o ON o.object_id = i.object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
WHERE s.name = @P1 AND o.name = @P2 AND c.name = @P3
  AND i.index_id > 0 AND i.is_primary_key = 0 AND i.is_hypothetical = 0
UNION
SELECT i.name
FROM sys.indexes i
JOIN sys.objects o ON o.object_id = i.object_id
JOIN sys.schemas s ON s.schema_id = o.schema_id
WHERE s.name = @P1 AND o.name = @P2
  AND i.has_filter = 1 AND i.filter_definition LIKE '%\\[' + @P3 + '\\]%' ESCAPE '\\'";

/// [`TableInspector`] bound to one database of an [`MssqlService`].
pub struct MssqlInspector<'a> {
    service: &'a MssqlService,
    db_name: String,
}

impl<'a> MssqlInspector<'a> {
    pub fn new(service: &'a MssqlService, db_name: &str) -> Self {
        Self {
            service,
            db_name: db_name.to_string(),
        }
    }
}

fn name_column(row: &tiberius::Row, column: &str) -> DbResult<String> {
    row.try_get::<&str, _>(column)
        .map_err(|e| DbError::Query(e.to_string()))?
        .map(str::to_string)
        .ok_or_else(|| DbError::Query(format!("null value in column {column}")))
}

#[async_trait]
impl TableInspector for MssqlInspector<'_> {
    async fn table_structure(
        &self,
        schema: &str,
        table: &str,
    ) -> DbResult<Option<TableStructure>> {
        let rows = self
            .service
            .query(&self.db_name, COLUMNS_SQL, &[&schema, &table])
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let base_type = name_column(row, "base_type")?;
            let max_length = row
                .try_get::<i32, _>("max_length")
                .map_err(|e| DbError::Query(e.to_string()))?
                .unwrap_or(0);
            let precision = row
                .try_get::<i32, _>("precision")
                .map_err(|e| DbError::Query(e.to_string()))?
                .unwrap_or(0) as u8;
            let scale = row
                .try_get::<i32, _>("scale")
                .map_err(|e| DbError::Query(e.to_string()))?
                .unwrap_or(0) as u8;
            columns.push(LiveColumn {
                name: name_column(row, "column_name")?,
                data_type: emit::render_data_type(&base_type, max_length, precision, scale),
                nullable: row
                    .try_get::<bool, _>("is_nullable")
                    .map_err(|e| DbError::Query(e.to_string()))?
                    .unwrap_or(true),
                is_identity: row
                    .try_get::<bool, _>("is_identity")
                    .map_err(|e| DbError::Query(e.to_string()))?
                    .unwrap_or(false),
            });
        }

        let pk_rows = self
            .service
            .query(&self.db_name, PRIMARY_KEY_SQL, &[&schema, &table])
            .await?;
        let mut primary_key: Option<LivePrimaryKey> = None;
        for row in &pk_rows {
            let column = name_column(row, "column_name")?;
            match &mut primary_key {
                Some(pk) => pk.columns.push(column),
                None => {
                    primary_key = Some(LivePrimaryKey {
                        name: name_column(row, "constraint_name")?,
                        columns: vec![column],
                    })
                }
            }
        }

        let check_rows = self
            .service
            .query(&self.db_name, CHECK_NAMES_SQL, &[&schema, &table])
            .await?;
        let mut check_names = Vec::with_capacity(check_rows.len());
        for row in &check_rows {
            check_names.push(name_column(row, "constraint_name")?);
        }

        Ok(Some(TableStructure {
            columns,
            primary_key,
            check_names,
        }))
    }

    async fn column_dependents(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> DbResult<Vec<String>> {
        let rows = self
            .service
            .query(
                &self.db_name,
                COLUMN_DEPENDENTS_SQL,
                &[&schema, &table, &column],
            )
            .await?;
        rows.iter()
            .map(|row| name_column(row, "constraint_name"))
            .collect()
    }

    async fn column_indexes(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> DbResult<Vec<String>> {
        let rows = self
            .service
            .query(
                &self.db_name,
                COLUMN_INDEXES_SQL,
                &[&schema, &table, &column],
            )
            .await?;
        rows.iter()
            .map(|row| name_column(row, "index_name"))
            .collect()
    }
}
