use evaluate::{EmittedRow, RowOutput};
use osm::TypedId;

/// An in-memory row sink with the same last-write-wins semantics as the
/// database path: for every (type, id) it holds exactly the rows of the
/// most recent emission, or none after a delete. Used by dispatcher tests
/// and useful for dry runs.
#[derive(Default)]
pub struct MemorySink {
    rows: Vec<EmittedRow>,
    flushes: u64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[EmittedRow] {
        &self.rows
    }

    pub fn rows_for_table<'s>(&'s self, table: &'s str) -> impl Iterator<Item = &'s EmittedRow> {
        self.rows.iter().filter(move |row| row.table == table)
    }

    pub fn rows_for_object<'s>(
        &'s self,
        table: &'s str,
        object: TypedId,
    ) -> impl Iterator<Item = &'s EmittedRow> {
        self.rows_for_table(table)
            .filter(move |row| row.object == object)
    }

    /// Counts explicit flush points; the memory sink has no watermark.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn mark_flush(&mut self) {
        self.flushes += 1;
    }
}

impl RowOutput for MemorySink {
    fn stage(&mut self, row: EmittedRow) -> anyhow::Result<()> {
        self.rows.push(row);
        Ok(())
    }

    fn delete_object(&mut self, object: TypedId) -> anyhow::Result<()> {
        self.rows.retain(|row| row.object != object);
        Ok(())
    }
}
