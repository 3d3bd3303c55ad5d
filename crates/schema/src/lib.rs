// In-memory model of the user's table definitions: column logical types,
// id-column policy, and secondary indexes. Definitions arrive as serde
// values from the evaluator's configuration phase, are validated here, and
// are then queried by the sink for DDL and COPY shapes.

mod column;
mod ddl;
mod ident;
mod table;

pub use column::{Column, ColumnSpec, ColumnType};
pub use ddl::{Ddl, PROBE_SCHEMAS, PROBE_TABLESPACES};
pub use ident::Identifier;
pub use table::{
    Cluster, IdPolicy, IdsConfig, IdsSpec, IndexDef, IndexPolicy, IndexSpec, Schema, TableDef,
    TableSpec, DEFAULT_SRID,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("illegal identifier {0:?}: identifiers match [A-Za-z_][A-Za-z0-9_]* and are at most 63 bytes")]
    IllegalIdentifier(String),
    #[error("duplicate table {0:?}")]
    DuplicateTable(String),
    #[error("table {table:?} declares column {column:?} more than once")]
    DuplicateColumn { table: String, column: String },
    #[error("table {table:?} column {column:?} has unknown type {type_name:?}")]
    UnknownType {
        table: String,
        column: String,
        type_name: String,
    },
    #[error("table {table:?} has unknown option {option:?}")]
    UnknownOption { table: String, option: String },
    #[error(
        "table {table:?} column {column:?} is not a geometry or area column and cannot take a projection"
    )]
    ProjectionOnNonSpatial { table: String, column: String },
    #[error("table {table:?} index references unknown column {column:?}")]
    IndexUnknownColumn { table: String, column: String },
    #[error("table {table:?} declares neither columns nor an id column")]
    EmptyTable { table: String },
    #[error("table {table:?} requests cluster = \"auto\" but has no geometry column")]
    ClusterWithoutGeometry { table: String },
    #[error(
        "schema {name:?} does not exist in the database; create it first: CREATE SCHEMA \"{name}\";"
    )]
    MissingSchema { name: String },
    #[error(
        "tablespace {name:?} does not exist in the database; create it first: CREATE TABLESPACE \"{name}\" LOCATION '...';"
    )]
    MissingTablespace { name: String },
    #[error("malformed table definition: {0}")]
    Definition(#[from] serde_json::Error),
}
