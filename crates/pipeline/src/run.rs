use super::dispatch::{Dispatcher, RunConfig, RunStats};
use super::RunError;
use evaluate::{Evaluator, RowOutput};
use middle::Middle;
use osm::Change;
use schema::Schema;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunMode {
    Import,
    Update,
}

/// What the orchestrators need from a sink beyond staging rows: draining
/// watermarked buffers between batches, a full drain, and the commit
/// protocol. The Postgres sink implements this against the database; the
/// memory sink implements it trivially for tests and dry runs.
#[async_trait::async_trait]
pub trait BulkSink: RowOutput + Send {
    async fn flush_ready(&mut self) -> anyhow::Result<()>;
    async fn flush_all(&mut self) -> anyhow::Result<()>;
    async fn commit(&mut self, mode: RunMode) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl BulkSink for sink::MemorySink {
    async fn flush_ready(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn flush_all(&mut self) -> anyhow::Result<()> {
        self.mark_flush();
        Ok(())
    }

    async fn commit(&mut self, _mode: RunMode) -> anyhow::Result<()> {
        self.mark_flush();
        Ok(())
    }
}

#[async_trait::async_trait]
impl BulkSink for sink::PgSink<'_> {
    // Inherent methods shadow the trait methods of the same name, so these
    // dispatch to the real database paths.
    async fn flush_ready(&mut self) -> anyhow::Result<()> {
        Ok(sink::PgSink::flush_ready(self).await?)
    }

    async fn flush_all(&mut self) -> anyhow::Result<()> {
        Ok(sink::PgSink::flush_all(self).await?)
    }

    async fn commit(&mut self, mode: RunMode) -> anyhow::Result<()> {
        match mode {
            RunMode::Import => self.commit_import().await?,
            RunMode::Update => self.commit_update().await?,
        }
        Ok(())
    }
}

fn sink_error(err: anyhow::Error) -> RunError {
    match err.downcast::<sink::Error>() {
        Ok(db) => RunError::Database(db),
        Err(other) => RunError::Output(other),
    }
}

/// Drive a full import: nodes, then ways, then relations, each stored in
/// the middle and evaluated in its phase. Cancellation is honored at phase
/// boundaries; on success the sink's import commit protocol runs.
pub async fn run_import<E, S>(
    evaluator: &mut E,
    schema: &Schema,
    config: &RunConfig,
    middle: &mut Middle,
    sink: &mut S,
    events: impl IntoIterator<Item = Change>,
    cancel: &CancellationToken,
) -> Result<RunStats, RunError>
where
    E: Evaluator,
    S: BulkSink,
{
    let mut dispatcher = Dispatcher::import(evaluator, schema, config, middle);
    let mut previous_kind = None;
    let mut since_flush = 0usize;

    for change in events {
        let kind = change.kind();
        if previous_kind.is_some() && previous_kind != Some(kind) && cancel.is_cancelled() {
            sink.flush_all().await.map_err(sink_error)?;
            return Err(RunError::Cancelled);
        }
        previous_kind = Some(kind);

        dispatcher.apply(&change, sink)?;
        since_flush += 1;
        if since_flush >= config.batch_size {
            sink.flush_ready().await.map_err(sink_error)?;
            since_flush = 0;
        }
    }

    let stats = dispatcher.finish();
    sink.flush_all().await.map_err(sink_error)?;
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    sink.commit(RunMode::Import).await.map_err(sink_error)?;
    tracing::info!(
        nodes = stats.nodes,
        ways = stats.ways,
        relations = stats.relations,
        rows = stats.eval.rows_emitted,
        geometry_failures = stats.eval.geometry_failures,
        "import complete"
    );
    Ok(stats)
}

/// Drive an update: apply every change, then re-render all dependents of
/// the touched primitives. Cancellation is honored between propagation
/// batches: the current batch completes, staged rows flush, and the run
/// aborts without commit.
pub async fn run_update<E, S>(
    evaluator: &mut E,
    schema: &Schema,
    config: &RunConfig,
    middle: &mut Middle,
    sink: &mut S,
    events: impl IntoIterator<Item = Change>,
    cancel: &CancellationToken,
) -> Result<RunStats, RunError>
where
    E: Evaluator,
    S: BulkSink,
{
    let mut dispatcher = Dispatcher::update(evaluator, schema, config, middle);

    let mut since_flush = 0usize;
    for change in events {
        dispatcher.apply(&change, sink)?;
        since_flush += 1;
        if since_flush >= config.batch_size {
            sink.flush_ready().await.map_err(sink_error)?;
            since_flush = 0;
        }
    }

    let targets = dispatcher.propagation_targets()?;
    tracing::info!(dependents = targets.len(), "propagating changes");

    for batch in targets.chunks(config.batch_size.max(1)) {
        if cancel.is_cancelled() {
            sink.flush_all().await.map_err(sink_error)?;
            return Err(RunError::Cancelled);
        }
        for &target in batch {
            dispatcher.reprocess(target, sink)?;
        }
        sink.flush_ready().await.map_err(sink_error)?;
    }

    let stats = dispatcher.finish();
    sink.flush_all().await.map_err(sink_error)?;
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    sink.commit(RunMode::Update).await.map_err(sink_error)?;
    tracing::info!(
        nodes = stats.nodes,
        ways = stats.ways,
        relations = stats.relations,
        reprocessed = stats.reprocessed,
        rows = stats.eval.rows_emitted,
        geometry_failures = stats.eval.geometry_failures,
        "update complete"
    );
    Ok(stats)
}
