// The bridge between user row-mapping logic and the rest of the pipeline.
// User logic is a black box behind the `Evaluator` trait: the dispatcher
// hands it one object at a time through a `Context`, and the context offers
// the object's tags, geometry constructors, and `insert` into declared
// tables. Configuration (table definition) happens once, up front, through
// a separate `DefineContext`; the two context types are what makes
// "insert during configuration" and "define_table during processing"
// unrepresentable.

mod context;
mod object;
mod value;

pub use context::{Context, DefineContext, EmittedRow, EvalStats, GeometryOptions, RowOutput};
pub use object::{Expanded, ExpandedMember, ObjectView};
pub use value::Value;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown table {table:?}: did you mean {closest:?} ?")]
    UnknownTable { table: String, closest: String },
    #[error("table {table:?} has no column {column:?}: did you mean {closest:?} ?")]
    UnknownColumn {
        table: String,
        column: String,
        closest: String,
    },
    #[error("column {column:?} of table {table:?} is not_null but the row carries no value")]
    NullInNotNull { table: String, column: String },
    #[error("cannot coerce {value} into {type_name} for column {column:?} of table {table:?}")]
    Uncoercible {
        table: String,
        column: String,
        type_name: &'static str,
        value: String,
    },
    #[error("row id {found} does not match the object {expect} being processed")]
    IdMismatch { expect: osm::TypedId, found: String },
    #[error("table {table:?} with ids policy {policy:?} does not accept {kind} objects")]
    WrongObjectKind {
        table: String,
        policy: &'static str,
        kind: osm::ObjectType,
    },
    #[error("row output failed")]
    Output(#[source] anyhow::Error),
    #[error(transparent)]
    Schema(#[from] schema::Error),
}

/// User-defined row-mapping logic. Implementations receive each object of
/// the stream exactly once per (re)processing and emit zero or more rows
/// through the context.
pub trait Evaluator {
    /// Called once before any object flows; declares the output tables.
    fn configure(&mut self, ctx: &mut DefineContext) -> Result<(), Error>;

    fn process_node(&mut self, ctx: &mut Context<'_>) -> Result<(), Error>;
    fn process_way(&mut self, ctx: &mut Context<'_>) -> Result<(), Error>;
    fn process_relation(&mut self, ctx: &mut Context<'_>) -> Result<(), Error>;
}
