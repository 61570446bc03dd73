//! Canonical DDL extraction from the system catalog.
//!
//! Every managed object class is read from `sys.*` views and rendered into
//! a deterministic, self-contained script. Row mapping and rendering are
//! split so the renderers stay unit-testable without a server.

use std::collections::BTreeMap;

use tiberius::Row;

use sqlvcs_core::table::emit::{
    self, CheckSpec, ColumnSpec, ForeignKeySpec, IndexSpec, PrimaryKeySpec, TableSpec, UniqueSpec,
};
use sqlvcs_core::{DbError, DbObject, DbResult, ObjectKey, ObjectType};

use crate::MssqlService;

// ---------------------------------------------------------------------------
// Row access helpers
// ---------------------------------------------------------------------------

fn get_str(row: &Row, column: &str) -> DbResult<String> {
    row.try_get::<&str, _>(column)
        .map_err(|e| DbError::Query(e.to_string()))?
        .map(str::to_string)
        .ok_or_else(|| DbError::Query(format!("null value in column {column}")))
}

fn get_opt_str(row: &Row, column: &str) -> DbResult<Option<String>> {
    Ok(row
        .try_get::<&str, _>(column)
        .map_err(|e| DbError::Query(e.to_string()))?
        .map(str::to_string))
}

fn get_i32(row: &Row, column: &str) -> DbResult<i32> {
    Ok(row
        .try_get::<i32, _>(column)
        .map_err(|e| DbError::Query(e.to_string()))?
        .unwrap_or(0))
}

fn get_i64(row: &Row, column: &str) -> DbResult<Option<i64>> {
    row.try_get::<i64, _>(column)
        .map_err(|e| DbError::Query(e.to_string()))
}

fn get_bool(row: &Row, column: &str) -> DbResult<bool> {
    Ok(row
        .try_get::<bool, _>(column)
        .map_err(|e| DbError::Query(e.to_string()))?
        .unwrap_or(false))
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}

// ---------------------------------------------------------------------------
// Modules: procedures, functions, views, triggers
// ---------------------------------------------------------------------------

const MODULES_SQL: &str = "\
SELECT s.name AS schema_name, o.name AS object_name, RTRIM(o.type) AS type_code,
       m.definition, m.uses_ansi_nulls, m.uses_quoted_identifier
FROM sys.objects o
JOIN sys.schemas s ON s.schema_id = o.schema_id
JOIN sys.sql_modules m ON m.object_id = o.object_id
WHERE o.is_ms_shipped = 0
  AND o.type IN ('P', 'FN', 'IF', 'TF', 'FS', 'FT', 'V', 'TR')
ORDER BY s.name, o.type, o.name";

fn module_object_type(type_code: &str) -> Option<ObjectType> {
    match type_code {
        "P" => Some(ObjectType::Procedure),
        "FN" | "IF" | "TF" | "FS" | "FT" => Some(ObjectType::Function),
        "V" => Some(ObjectType::View),
        "TR" => Some(ObjectType::Trigger),
        _ => None,
    }
}

/// Module scripts carry the stored SET options as a four-line header and a
/// trailing batch terminator; the module text itself is verbatim.
pub fn render_module(definition: &str, ansi_nulls: bool, quoted_identifier: bool) -> String {
    format!(
        "SET ANSI_NULLS {}\nGO\nSET QUOTED_IDENTIFIER {}\nGO\n{}\nGO\n",
        on_off(ansi_nulls),
        on_off(quoted_identifier),
        definition.trim_end()
    )
}

async fn read_modules(service: &MssqlService, db_name: &str) -> DbResult<Vec<DbObject>> {
    let rows = service.query(db_name, MODULES_SQL, &[]).await?;
    let mut objects = Vec::with_capacity(rows.len());
    for row in &rows {
        let type_code = get_str(row, "type_code")?;
        let Some(object_type) = module_object_type(type_code.trim()) else {
            continue;
        };
        let schema = get_str(row, "schema_name")?;
        let name = get_str(row, "object_name")?;
        let definition = get_str(row, "definition")?;
        let ansi_nulls = get_bool(row, "uses_ansi_nulls")?;
        let quoted = get_bool(row, "uses_quoted_identifier")?;
        objects.push(DbObject::new(
            ObjectKey::new(object_type, &schema, &name),
            render_module(&definition, ansi_nulls, quoted),
        ));
    }
    Ok(objects)
}

// ---------------------------------------------------------------------------
// Synonyms
// ---------------------------------------------------------------------------

const SYNONYMS_SQL: &str = "\
SELECT s.name AS schema_name, sy.name AS synonym_name, sy.base_object_name
FROM sys.synonyms sy
JOIN sys.schemas s ON s.schema_id = sy.schema_id
WHERE sy.is_ms_shipped = 0
ORDER BY s.name, sy.name";

pub fn render_synonym(schema: &str, name: &str, base_object_name: &str) -> String {
    format!("CREATE SYNONYM [{schema}].[{name}] FOR {base_object_name};\nGO\n")
}

async fn read_synonyms(service: &MssqlService, db_name: &str) -> DbResult<Vec<DbObject>> {
    let rows = service.query(db_name, SYNONYMS_SQL, &[]).await?;
    let mut objects = Vec::with_capacity(rows.len());
    for row in &rows {
        let schema = get_str(row, "schema_name")?;
        let name = get_str(row, "synonym_name")?;
        let base = get_str(row, "base_object_name")?;
        objects.push(DbObject::new(
            ObjectKey::new(ObjectType::Synonym, &schema, &name),
            render_synonym(&schema, &name, &base),
        ));
    }
    Ok(objects)
}

// ---------------------------------------------------------------------------
// Table types
// ---------------------------------------------------------------------------

const TABLE_TYPES_SQL: &str = "\
SELECT s.name AS schema_name, tt.name AS type_name, c.name AS column_name,
       bt.name AS base_type, CAST(c.max_length AS INT) AS max_length,
       CAST(c.precision AS INT) AS precision, CAST(c.scale AS INT) AS scale,
       c.is_nullable, c.is_identity,
       CAST(ic.seed_value AS BIGINT) AS seed_value,
       CAST(ic.increment_value AS BIGINT) AS increment_value
FROM sys.table_types tt
JOIN sys.schemas s ON s.schema_id = tt.schema_id
JOIN sys.columns c ON c.object_id = tt.type_table_object_id
JOIN sys.types bt ON bt.user_type_id = c.system_type_id
LEFT JOIN sys.identity_columns ic
       ON ic.object_id = c.object_id AND ic.column_id = c.column_id
WHERE tt.is_user_defined = 1
ORDER BY s.name, tt.name, c.column_id";

/// Table-type column line: `[name] TYPE [IDENTITY(s,i)] NULL|NOT NULL`.
pub fn render_type_column(
    name: &str,
    data_type: &str,
    identity: Option<(i64, i64)>,
    nullable: bool,
) -> String {
    let mut line = format!("[{name}] {data_type}");
    if let Some((seed, increment)) = identity {
        line.push_str(&format!(" IDENTITY({seed},{increment})"));
    }
    line.push_str(if nullable { " NULL" } else { " NOT NULL" });
    line
}

pub fn render_table_type(schema: &str, name: &str, columns: &[String]) -> String {
    format!(
        "CREATE TYPE [{schema}].[{name}] AS TABLE (\n  {}\n);\nGO\n",
        columns.join(",\n  ")
    )
}

async fn read_table_types(service: &MssqlService, db_name: &str) -> DbResult<Vec<DbObject>> {
    let rows = service.query(db_name, TABLE_TYPES_SQL, &[]).await?;
    let mut grouped: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for row in &rows {
        let schema = get_str(row, "schema_name")?;
        let name = get_str(row, "type_name")?;
        let column = get_str(row, "column_name")?;
        let data_type = emit::render_data_type(
            &get_str(row, "base_type")?,
            get_i32(row, "max_length")?,
            get_i32(row, "precision")? as u8,
            get_i32(row, "scale")? as u8,
        );
        let identity = if get_bool(row, "is_identity")? {
            Some((
                get_i64(row, "seed_value")?.unwrap_or(1),
                get_i64(row, "increment_value")?.unwrap_or(1),
            ))
        } else {
            None
        };
        let nullable = get_bool(row, "is_nullable")?;
        grouped
            .entry((schema, name))
            .or_default()
            .push(render_type_column(&column, &data_type, identity, nullable));
    }

    Ok(grouped
        .into_iter()
        .map(|((schema, name), columns)| {
            DbObject::new(
                ObjectKey::new(ObjectType::TableType, &schema, &name),
                render_table_type(&schema, &name, &columns),
            )
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Scalar types
// ---------------------------------------------------------------------------

const SCALAR_TYPES_SQL: &str = "\
SELECT s.name AS schema_name, t.name AS type_name, bt.name AS base_type,
       CAST(t.max_length AS INT) AS max_length,
       CAST(t.precision AS INT) AS precision, CAST(t.scale AS INT) AS scale,
       t.is_nullable
FROM sys.types t
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.types bt ON bt.user_type_id = t.system_type_id
WHERE t.is_user_defined = 1 AND t.is_table_type = 0
ORDER BY s.name, t.name";

pub fn render_scalar_type(schema: &str, name: &str, base_type: &str, nullable: bool) -> String {
    let not_null = if nullable { "" } else { " NOT NULL" };
    format!("CREATE TYPE [{schema}].[{name}]\n  FROM {base_type}{not_null};\nGO\n")
}

async fn read_scalar_types(service: &MssqlService, db_name: &str) -> DbResult<Vec<DbObject>> {
    let rows = service.query(db_name, SCALAR_TYPES_SQL, &[]).await?;
    let mut objects = Vec::with_capacity(rows.len());
    for row in &rows {
        let schema = get_str(row, "schema_name")?;
        let name = get_str(row, "type_name")?;
        let base = emit::render_data_type(
            &get_str(row, "base_type")?,
            get_i32(row, "max_length")?,
            get_i32(row, "precision")? as u8,
            get_i32(row, "scale")? as u8,
        );
        let nullable = get_bool(row, "is_nullable")?;
        objects.push(DbObject::new(
            ObjectKey::new(ObjectType::ScalarType, &schema, &name),
            render_scalar_type(&schema, &name, &base, nullable),
        ));
    }
    Ok(objects)
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

const SEQUENCES_SQL: &str = "\
SELECT s.name AS schema_name, sq.name AS sequence_name, bt.name AS type_name,
       CAST(sq.start_value AS BIGINT) AS start_value,
       CAST(sq.increment AS BIGINT) AS increment,
       CAST(sq.minimum_value AS BIGINT) AS minimum_value,
       CAST(sq.maximum_value AS BIGINT) AS maximum_value,
       sq.is_cycling, sq.is_cached, CAST(sq.cache_size AS INT) AS cache_size
FROM sys.sequences sq
JOIN sys.schemas s ON s.schema_id = sq.schema_id
JOIN sys.types bt ON bt.user_type_id = sq.system_type_id
WHERE sq.is_ms_shipped = 0
ORDER BY s.name, sq.name";

#[allow(clippy::too_many_arguments)]
pub fn render_sequence(
    schema: &str,
    name: &str,
    type_name: &str,
    start: i64,
    increment: i64,
    min_value: i64,
    max_value: i64,
    cycling: bool,
    cache_size: Option<i32>,
) -> String {
    let cycle = if cycling { "CYCLE" } else { "NO CYCLE" };
    let cache = match cache_size {
        Some(size) => format!("CACHE {size}"),
        None => "NO CACHE".to_string(),
    };
    format!(
        "CREATE SEQUENCE [{schema}].[{name}] AS {} START WITH {start} INCREMENT BY {increment} \
         MINVALUE {min_value} MAXVALUE {max_value} {cycle} {cache};\nGO\n",
        type_name.to_uppercase()
    )
}

async fn read_sequences(service: &MssqlService, db_name: &str) -> DbResult<Vec<DbObject>> {
    let rows = service.query(db_name, SEQUENCES_SQL, &[]).await?;
    let mut objects = Vec::with_capacity(rows.len());
    for row in &rows {
        let schema = get_str(row, "schema_name")?;
        let name = get_str(row, "sequence_name")?;
        let cached = get_bool(row, "is_cached")?;
        let cache_size = if cached {
            Some(get_i32(row, "cache_size")?)
        } else {
            None
        };
        objects.push(DbObject::new(
            ObjectKey::new(ObjectType::Sequence, &schema, &name),
            render_sequence(
                &schema,
                &name,
                &get_str(row, "type_name")?,
                get_i64(row, "start_value")?.unwrap_or(1),
                get_i64(row, "increment")?.unwrap_or(1),
                get_i64(row, "minimum_value")?.unwrap_or(i64::MIN),
                get_i64(row, "maximum_value")?.unwrap_or(i64::MAX),
                get_bool(row, "is_cycling")?,
                cache_size,
            ),
        ));
    }
    Ok(objects)
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

const TABLE_COLUMNS_SQL: &str = "\
SELECT s.name AS schema_name, t.name AS table_name, c.name AS column_name,
       bt.name AS base_type, CAST(c.max_length AS INT) AS max_length,
       CAST(c.precision AS INT) AS precision, CAST(c.scale AS INT) AS scale,
       c.is_nullable, c.is_identity,
       CAST(ic.seed_value AS BIGINT) AS seed_value,
       CAST(ic.increment_value AS BIGINT) AS increment_value,
       dc.definition AS default_definition
FROM sys.tables t
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.columns c ON c.object_id = t.object_id
JOIN sys.types bt ON bt.user_type_id = c.system_type_id
LEFT JOIN sys.identity_columns ic
       ON ic.object_id = c.object_id AND ic.column_id = c.column_id
LEFT JOIN sys.default_constraints dc
       ON dc.parent_object_id = c.object_id AND dc.parent_column_id = c.column_id
WHERE t.is_ms_shipped = 0
ORDER BY s.name, t.name, c.column_id";

const KEY_CONSTRAINTS_SQL: &str = "\
SELECT s.name AS schema_name, t.name AS table_name, kc.name AS constraint_name,
       RTRIM(kc.type) AS constraint_type, col.name AS column_name
FROM sys.key_constraints kc
JOIN sys.tables t ON t.object_id = kc.parent_object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.index_columns ic
       ON ic.object_id = t.object_id AND ic.index_id = kc.unique_index_id
JOIN sys.columns col ON col.object_id = t.object_id AND col.column_id = ic.column_id
WHERE t.is_ms_shipped = 0
ORDER BY s.name, t.name, kc.name, ic.key_ordinal";

const FOREIGN_KEYS_SQL: &str = "\
SELECT s.name AS schema_name, t.name AS table_name, fk.name AS constraint_name,
       pc.name AS column_name, rs.name AS referenced_schema,
       rt.name AS referenced_table, rc.name AS referenced_column
FROM sys.foreign_keys fk
JOIN sys.tables t ON t.object_id = fk.parent_object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
JOIN sys.columns pc
       ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
JOIN sys.tables rt ON rt.object_id = fk.referenced_object_id
JOIN sys.schemas rs ON rs.schema_id = rt.schema_id
JOIN sys.columns rc
       ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
WHERE t.is_ms_shipped = 0
ORDER BY s.name, t.name, fk.name, fkc.constraint_column_id";

const CHECK_CONSTRAINTS_SQL: &str = "\
SELECT s.name AS schema_name, t.name AS table_name, cc.name AS constraint_name,
       cc.definition
FROM sys.check_constraints cc
JOIN sys.tables t ON t.object_id = cc.parent_object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
WHERE t.is_ms_shipped = 0
ORDER BY s.name, t.name, cc.name";

const INDEXES_SQL: &str = "\
SELECT s.name AS schema_name, t.name AS table_name, i.name AS index_name,
       i.is_unique, i.filter_definition, col.name AS column_name,
       bt.name AS column_base_type, CAST(col.max_length AS INT) AS column_max_length,
       CAST(col.precision AS INT) AS column_precision, CAST(col.scale AS INT) AS column_scale
FROM sys.indexes i
JOIN sys.tables t ON t.object_id = i.object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.index_columns ic
       ON ic.object_id = i.object_id AND ic.index_id = i.index_id
      AND ic.is_included_column = 0
JOIN sys.columns col ON col.object_id = ic.object_id AND col.column_id = ic.column_id
JOIN sys.types bt ON bt.user_type_id = col.system_type_id
WHERE t.is_ms_shipped = 0
  AND i.index_id > 0 AND i.type IN (1, 2)
  AND i.is_primary_key = 0 AND i.is_unique_constraint = 0 AND i.is_hypothetical = 0
ORDER BY s.name, t.name, i.name, ic.key_ordinal";

async fn read_tables(service: &MssqlService, db_name: &str) -> DbResult<Vec<DbObject>> {
    let mut specs: BTreeMap<(String, String), TableSpec> = BTreeMap::new();

    for row in &service.query(db_name, TABLE_COLUMNS_SQL, &[]).await? {
        let schema = get_str(row, "schema_name")?;
        let table = get_str(row, "table_name")?;
        let data_type = emit::render_data_type(
            &get_str(row, "base_type")?,
            get_i32(row, "max_length")?,
            get_i32(row, "precision")? as u8,
            get_i32(row, "scale")? as u8,
        );
        let identity = if get_bool(row, "is_identity")? {
            Some((
                get_i64(row, "seed_value")?.unwrap_or(1),
                get_i64(row, "increment_value")?.unwrap_or(1),
            ))
        } else {
            None
        };
        let column = ColumnSpec {
            name: get_str(row, "column_name")?,
            data_type,
            nullable: get_bool(row, "is_nullable")?,
            identity,
            default: get_opt_str(row, "default_definition")?,
        };
        specs
            .entry((schema.clone(), table.clone()))
            .or_insert_with(|| empty_spec(&schema, &table))
            .columns
            .push(column);
    }

    for row in &service.query(db_name, KEY_CONSTRAINTS_SQL, &[]).await? {
        let schema = get_str(row, "schema_name")?;
        let table = get_str(row, "table_name")?;
        let constraint = get_str(row, "constraint_name")?;
        let column = get_str(row, "column_name")?;
        let kind = get_str(row, "constraint_type")?;
        let Some(spec) = specs.get_mut(&(schema, table)) else {
            continue;
        };
        match kind.trim() {
            "PK" => match &mut spec.primary_key {
                Some(pk) => pk.columns.push(column),
                None => {
                    spec.primary_key = Some(PrimaryKeySpec {
                        name: constraint,
                        columns: vec![column],
                    })
                }
            },
            "UQ" => {
                if let Some(unique) = spec.uniques.iter_mut().find(|u| u.name == constraint) {
                    unique.columns.push(column);
                } else {
                    spec.uniques.push(UniqueSpec {
                        name: constraint,
                        columns: vec![column],
                    });
                }
            }
            _ => {}
        }
    }

    for row in &service.query(db_name, FOREIGN_KEYS_SQL, &[]).await? {
        let schema = get_str(row, "schema_name")?;
        let table = get_str(row, "table_name")?;
        let constraint = get_str(row, "constraint_name")?;
        let Some(spec) = specs.get_mut(&(schema, table)) else {
            continue;
        };
        let column = get_str(row, "column_name")?;
        let referenced_column = get_str(row, "referenced_column")?;
        if let Some(fk) = spec.foreign_keys.iter_mut().find(|f| f.name == constraint) {
            fk.columns.push(column);
            fk.referenced_columns.push(referenced_column);
        } else {
            spec.foreign_keys.push(ForeignKeySpec {
                name: constraint,
                columns: vec![column],
                referenced_schema: get_str(row, "referenced_schema")?,
                referenced_table: get_str(row, "referenced_table")?,
                referenced_columns: vec![referenced_column],
            });
        }
    }

    for row in &service.query(db_name, CHECK_CONSTRAINTS_SQL, &[]).await? {
        let schema = get_str(row, "schema_name")?;
        let table = get_str(row, "table_name")?;
        let Some(spec) = specs.get_mut(&(schema, table)) else {
            continue;
        };
        spec.checks.push(CheckSpec {
            name: get_str(row, "constraint_name")?,
            definition: get_str(row, "definition")?,
        });
    }

    // An index is dropped entirely when any of its key columns carries a
    // non-indexable type.
    let mut disqualified: std::collections::BTreeSet<(String, String, String)> =
        std::collections::BTreeSet::new();
    for row in &service.query(db_name, INDEXES_SQL, &[]).await? {
        let schema = get_str(row, "schema_name")?;
        let table = get_str(row, "table_name")?;
        let index = get_str(row, "index_name")?;
        let column_type = emit::render_data_type(
            &get_str(row, "column_base_type")?,
            get_i32(row, "column_max_length")?,
            get_i32(row, "column_precision")? as u8,
            get_i32(row, "column_scale")? as u8,
        );
        if !emit::is_indexable_type(&column_type) {
            disqualified.insert((schema.clone(), table.clone(), index.clone()));
        }
        let Some(spec) = specs.get_mut(&(schema, table)) else {
            continue;
        };
        let column = get_str(row, "column_name")?;
        if let Some(existing) = spec.indexes.iter_mut().find(|i| i.name == index) {
            existing.columns.push(column);
        } else {
            spec.indexes.push(IndexSpec {
                name: index,
                unique: get_bool(row, "is_unique")?,
                columns: vec![column],
                filter: get_opt_str(row, "filter_definition")?,
            });
        }
    }

    Ok(specs
        .into_values()
        .map(|mut spec| {
            let schema = spec.schema.clone();
            let table = spec.name.clone();
            spec.indexes.retain(|index| {
                !disqualified.contains(&(schema.clone(), table.clone(), index.name.clone()))
            });
            normalize_constraint_names(&mut spec);
            DbObject::new(
                ObjectKey::new(ObjectType::Table, &spec.schema, &spec.name),
                emit::render_create_table(&spec),
            )
        })
        .collect())
}

fn empty_spec(schema: &str, table: &str) -> TableSpec {
    TableSpec {
        schema: schema.to_string(),
        name: table.to_string(),
        columns: Vec::new(),
        primary_key: None,
        uniques: Vec::new(),
        foreign_keys: Vec::new(),
        checks: Vec::new(),
        indexes: Vec::new(),
    }
}

/// Rewrite system-generated constraint names into deterministic forms.
fn normalize_constraint_names(spec: &mut TableSpec) {
    let table = spec.name.clone();
    if let Some(pk) = &mut spec.primary_key {
        pk.name = emit::normalize_pk_name(&pk.name, &table);
    }
    for unique in &mut spec.uniques {
        unique.name = emit::normalize_uq_name(&unique.name, &table, &unique.columns);
    }
    for fk in &mut spec.foreign_keys {
        fk.name = emit::normalize_fk_name(&fk.name, &table, &fk.referenced_table);
    }
    for check in &mut spec.checks {
        check.name = emit::normalize_ck_name(&check.name, &table, &check.definition);
    }
}

/// Enumerate all non-system managed objects of the bound database.
pub(crate) async fn list_objects(service: &MssqlService, db_name: &str) -> DbResult<Vec<DbObject>> {
    let mut objects = read_modules(service, db_name).await?;
    objects.extend(read_synonyms(service, db_name).await?);
    objects.extend(read_table_types(service, db_name).await?);
    objects.extend(read_scalar_types(service, db_name).await?);
    objects.extend(read_sequences(service, db_name).await?);
    objects.extend(read_tables(service, db_name).await?);
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_header_reflects_stored_flags() {
        let script = render_module("CREATE VIEW v AS SELECT 1", true, false);
        assert!(script.starts_with("SET ANSI_NULLS ON\nGO\nSET QUOTED_IDENTIFIER OFF\nGO\n"));
        assert!(script.ends_with("CREATE VIEW v AS SELECT 1\nGO\n"));
    }

    #[test]
    fn synonym_rendering() {
        let script = render_synonym("dbo", "orders_alias", "[sales].[dbo].[orders]");
        assert_eq!(
            script,
            "CREATE SYNONYM [dbo].[orders_alias] FOR [sales].[dbo].[orders];\nGO\n"
        );
    }

    #[test]
    fn table_type_rendering() {
        let columns = vec![
            render_type_column("Id", "INT", Some((1, 1)), false),
            render_type_column("Label", "NVARCHAR(20)", None, true),
        ];
        let script = render_table_type("dbo", "id_list", &columns);
        assert_eq!(
            script,
            "CREATE TYPE [dbo].[id_list] AS TABLE (\n  [Id] INT IDENTITY(1,1) NOT NULL,\n  [Label] NVARCHAR(20) NULL\n);\nGO\n"
        );
    }

    #[test]
    fn scalar_type_rendering() {
        assert_eq!(
            render_scalar_type("dbo", "short_name", "NVARCHAR(25)", false),
            "CREATE TYPE [dbo].[short_name]\n  FROM NVARCHAR(25) NOT NULL;\nGO\n"
        );
        assert_eq!(
            render_scalar_type("dbo", "loose_name", "NVARCHAR(25)", true),
            "CREATE TYPE [dbo].[loose_name]\n  FROM NVARCHAR(25);\nGO\n"
        );
    }

    #[test]
    fn sequence_rendering_covers_cycle_and_cache() {
        let script = render_sequence("dbo", "order_seq", "bigint", 1, 1, 1, 9999, false, Some(50));
        assert_eq!(
            script,
            "CREATE SEQUENCE [dbo].[order_seq] AS BIGINT START WITH 1 INCREMENT BY 1 MINVALUE 1 MAXVALUE 9999 NO CYCLE CACHE 50;\nGO\n"
        );
        let script = render_sequence("dbo", "wrap_seq", "int", 0, 1, 0, 9, true, None);
        assert!(script.contains("CYCLE NO CACHE"));
    }

    #[test]
    fn module_type_codes_map_to_object_types() {
        assert_eq!(module_object_type("P"), Some(ObjectType::Procedure));
        assert_eq!(module_object_type("FN"), Some(ObjectType::Function));
        assert_eq!(module_object_type("IF"), Some(ObjectType::Function));
        assert_eq!(module_object_type("TF"), Some(ObjectType::Function));
        assert_eq!(module_object_type("V"), Some(ObjectType::View));
        assert_eq!(module_object_type("TR"), Some(ObjectType::Trigger));
        assert_eq!(module_object_type("SO"), None);
    }
}
