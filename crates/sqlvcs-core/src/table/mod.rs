//! Table evolution under data preservation.
//!
//! The stored `CREATE TABLE` scripts are this engine's own catalog output,
//! so the parser here is regex- and bracket-scan-based rather than a real
//! SQL parser, and must change in lockstep with the catalog emitter.

pub mod emit;
pub mod parser;
pub mod planner;

pub use emit::{
    is_indexable_type, normalize_ck_name, normalize_fk_name, normalize_pk_name, normalize_uq_name,
    render_create_table, render_data_type, CheckSpec, ColumnSpec, ForeignKeySpec, IndexSpec,
    PrimaryKeySpec, TableSpec, UniqueSpec,
};
pub use parser::{
    parse_create_table, ParsedCheck, ParsedColumn, ParsedIndex, ParsedPrimaryKey, ParsedTable,
};
pub use planner::{
    build_alter_script, LiveColumn, LivePrimaryKey, TableInspector, TableStructure,
};
