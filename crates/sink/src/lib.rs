// The bulk-load sink stages emitted rows per table in the Postgres COPY
// text format, drains them over COPY streams, and drives the commit
// protocols: staging-table create / index build / CLUSTER / ANALYZE /
// atomic rename on import, batched delete-then-insert on update.

mod copy;
mod memory;
mod postgres;

pub use copy::{encode_row, TableStage, DEFAULT_WATERMARK};
pub use memory::MemorySink;
pub use postgres::{PgSink, SinkConfig};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Database failures are fatal; staging tables are left in place for
    // inspection.
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Schema(#[from] schema::Error),
    #[error("row for table {table:?} carries {found} values but the table has {expect} columns")]
    RowShape {
        table: String,
        expect: usize,
        found: usize,
    },
    #[error("row for unknown table {0:?}")]
    UnknownTable(String),
    #[error("value {value} cannot be rendered for a {type_name} column")]
    Render {
        type_name: &'static str,
        value: String,
    },
}
