// The dispatcher drives the whole flex pipeline: it feeds change events
// into the middle, invokes the evaluator at the right moment, and during
// updates walks the reverse indexes to re-render every way and relation
// whose geometry inputs changed. Runs are single-writer: one dispatcher
// owns the middle and the evaluator for the duration of a run, and sinks
// are scoped inside the run so staged rows never outlive their sink.

mod dispatch;
mod expand;
mod run;

pub use dispatch::{Dispatcher, RunConfig, RunStats};
pub use run::{run_import, run_update, BulkSink, RunMode};

/// The single terminal status of a run. Geometry-construction failures are
/// deliberately absent: they are counted in `RunStats` and never abort.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("configuration error")]
    Config(#[from] schema::Error),
    #[error("evaluation error")]
    Evaluation(#[source] evaluate::Error),
    #[error("middle storage error")]
    Storage(#[from] middle::Error),
    #[error("database error")]
    Database(#[from] sink::Error),
    #[error("row output error")]
    Output(#[source] anyhow::Error),
    #[error("an import stream only carries additions, got {0:?} for {1}")]
    UnexpectedAction(osm::Action, osm::TypedId),
    #[error("import events must arrive in node, way, relation order; got {0} after {1}")]
    OutOfOrder(osm::ObjectType, osm::ObjectType),
    #[error("event received outside an accepting phase")]
    PhaseViolation,
    #[error("run cancelled")]
    Cancelled,
}

impl From<evaluate::Error> for RunError {
    fn from(err: evaluate::Error) -> Self {
        // Schema problems surface as configuration errors even when they
        // are detected through the evaluator's define path.
        match err {
            evaluate::Error::Schema(inner) => RunError::Config(inner),
            other => RunError::Evaluation(other),
        }
    }
}

/// Run the evaluator's configuration phase and validate the resulting
/// table definitions. This happens exactly once, before any event flows.
pub fn configure<E: evaluate::Evaluator>(evaluator: &mut E) -> Result<schema::Schema, RunError> {
    let mut ctx = evaluate::DefineContext::new();
    evaluator.configure(&mut ctx)?;
    Ok(ctx.into_schema()?)
}
