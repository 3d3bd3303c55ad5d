use super::copy::{encode_row, TableStage, DEFAULT_WATERMARK};
use super::Error;
use evaluate::{EmittedRow, RowOutput};
use osm::{ObjectType, TypedId};
use schema::{Ddl, IdPolicy, Schema, TableDef, PROBE_SCHEMAS, PROBE_TABLESPACES};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub database_url: String,
    /// Per-table staging byte watermark.
    pub watermark: usize,
    /// Whether the produced tables will receive updates later. Controls id
    /// index creation and index fillfactor at import commit.
    pub updatable: bool,
}

impl SinkConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            watermark: DEFAULT_WATERMARK,
            updatable: false,
        }
    }
}

/// The Postgres bulk-load sink. Row staging is synchronous and cheap; all
/// database traffic happens in the async methods, which the dispatcher
/// calls between events and at phase boundaries.
///
/// The sink borrows the schema for the duration of a run: it is created
/// inside the run and dropped when the run ends, so it always outlives the
/// events staged into it.
pub struct PgSink<'s> {
    schema: &'s Schema,
    config: SinkConfig,
    pool: sqlx::PgPool,
    /// Import runs write COPY batches into staging names; update runs write
    /// into the final tables.
    import: bool,
    stages: BTreeMap<String, TableStage>,
    /// Tables whose stage passed the watermark since the last flush.
    ready: BTreeSet<String>,
    /// Deletes batched per table, executed before that table's next COPY.
    pending_deletes: BTreeMap<String, Vec<(char, i64)>>,
}

impl<'s> PgSink<'s> {
    pub async fn connect(schema: &'s Schema, config: SinkConfig) -> Result<PgSink<'s>, Error> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&config.database_url)
            .await?;
        Ok(Self {
            schema,
            config,
            pool,
            import: true,
            stages: BTreeMap::new(),
            ready: BTreeSet::new(),
            pending_deletes: BTreeMap::new(),
        })
    }

    /// Validate referenced schemas and tablespaces against the live
    /// database, before any data flows.
    #[tracing::instrument(err, skip(self))]
    pub async fn check_capabilities(&self) -> Result<(), Error> {
        let schemas: BTreeSet<String> = sqlx::query_scalar(PROBE_SCHEMAS)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();
        let tablespaces: BTreeSet<String> = sqlx::query_scalar(PROBE_TABLESPACES)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();
        self.schema.check_capabilities(&schemas, &tablespaces)?;
        Ok(())
    }

    /// Import prep: drop staging leftovers from any earlier failed run and
    /// create fresh staging tables.
    #[tracing::instrument(err, skip(self))]
    pub async fn prepare_import(&mut self) -> Result<(), Error> {
        self.check_capabilities().await?;
        self.import = true;
        for table in self.schema.tables() {
            let ddl = Ddl::new(table);
            sqlx::query(&format!(
                "DROP TABLE IF EXISTS {}",
                table.qualified_staging_name()
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&ddl.create_table()).execute(&self.pool).await?;
            tracing::info!(table = %table.name, "created staging table");
        }
        Ok(())
    }

    /// Update prep: the final tables must already exist; COPY goes straight
    /// at them.
    #[tracing::instrument(err, skip(self))]
    pub async fn prepare_update(&mut self) -> Result<(), Error> {
        self.check_capabilities().await?;
        self.import = false;
        Ok(())
    }

    /// Drain every stage past its watermark. Called by the dispatcher
    /// between events.
    pub async fn flush_ready(&mut self) -> Result<(), Error> {
        let ready: Vec<String> = std::mem::take(&mut self.ready).into_iter().collect();
        for table in ready {
            self.flush_table(&table).await?;
        }
        Ok(())
    }

    /// Drain everything: pending deletes, then every non-empty stage.
    #[tracing::instrument(err, skip(self))]
    pub async fn flush_all(&mut self) -> Result<(), Error> {
        self.ready.clear();
        let tables: Vec<String> = self
            .stages
            .iter()
            .filter(|(_, stage)| !stage.is_empty())
            .map(|(name, _)| name.clone())
            .chain(self.pending_deletes.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for table in tables {
            self.flush_table(&table).await?;
        }
        Ok(())
    }

    // Deletes first, then the COPY batch: within a table the two are
    // strictly ordered so a reprocessed object's old rows never survive
    // its new ones.
    async fn flush_table(&mut self, table: &str) -> Result<(), Error> {
        let def = self
            .schema
            .get(table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;

        if let Some(deletes) = self.pending_deletes.remove(table) {
            self.run_deletes(def, deletes).await?;
        }

        let Some((batch, rows)) = self.stages.get_mut(table).and_then(TableStage::drain) else {
            return Ok(());
        };

        let statement = Ddl::new(def).copy_statement(self.import);
        let mut conn = self.pool.acquire().await?;
        let mut copy = conn.copy_in_raw(&statement).await?;
        copy.send(batch.into_bytes()).await?;
        copy.finish().await?;
        tracing::debug!(table, rows, "flushed COPY batch");
        Ok(())
    }

    async fn run_deletes(&self, def: &TableDef, deletes: Vec<(char, i64)>) -> Result<(), Error> {
        let Some(statement) = Ddl::new(def).delete_by_ids() else {
            return Ok(());
        };
        let ids = def.ids.as_ref().expect("delete_by_ids implies ids");

        if ids.type_column.is_some() {
            // Group by object kind; one batched statement per kind.
            let mut by_kind: BTreeMap<char, Vec<i64>> = BTreeMap::new();
            for (kind, id) in deletes {
                by_kind.entry(kind).or_default().push(id);
            }
            for (kind, ids) in by_kind {
                sqlx::query(&statement)
                    .bind(kind.to_string())
                    .bind(&ids)
                    .execute(&self.pool)
                    .await?;
            }
        } else {
            let ids: Vec<i64> = deletes.into_iter().map(|(_, id)| id).collect();
            sqlx::query(&statement).bind(&ids).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Import commit: final flush, then per table build indexes, CLUSTER
    /// when requested, ANALYZE, and atomically rename staging into place.
    /// Index builds precede ANALYZE so planner statistics always describe
    /// the indexed state.
    #[tracing::instrument(err, skip(self))]
    pub async fn commit_import(&mut self) -> Result<(), Error> {
        self.flush_all().await?;
        for table in self.schema.tables() {
            let ddl = Ddl::new(table);
            for statement in ddl.create_indexes(self.config.updatable) {
                sqlx::query(&statement).execute(&self.pool).await?;
            }
            if let Some(cluster) = ddl.cluster() {
                sqlx::query(&cluster).execute(&self.pool).await?;
            }
            sqlx::query(&ddl.analyze(true)).execute(&self.pool).await?;
            sqlx::query(&ddl.drop_final_if_exists())
                .execute(&self.pool)
                .await?;
            sqlx::query(&ddl.rename_to_final())
                .execute(&self.pool)
                .await?;
            tracing::info!(table = %table.name, "committed table");
        }
        self.write_properties("import").await?;
        Ok(())
    }

    /// Update commit: final flush (deletes then inserts), then refresh
    /// statistics.
    #[tracing::instrument(err, skip(self))]
    pub async fn commit_update(&mut self) -> Result<(), Error> {
        self.flush_all().await?;
        for table in self.schema.tables() {
            sqlx::query(&Ddl::new(table).analyze(false))
                .execute(&self.pool)
                .await?;
        }
        self.write_properties("update").await?;
        Ok(())
    }

    // Run bookkeeping the next invocation can read back, mirroring the
    // properties table the final database carries.
    async fn write_properties(&self, mode: &str) -> Result<(), Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS \"osmflex_properties\" \
             (property text PRIMARY KEY, value text NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        for (property, value) in [
            ("mode", mode.to_string()),
            ("updatable", self.config.updatable.to_string()),
            ("watermark", self.config.watermark.to_string()),
        ] {
            sqlx::query(
                "INSERT INTO \"osmflex_properties\" (property, value) VALUES ($1, $2) \
                 ON CONFLICT (property) DO UPDATE SET value = excluded.value",
            )
            .bind(property)
            .bind(value)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Abort without committing: connections return to the pool, staging
    /// tables stay behind for inspection.
    pub async fn abort(self) {
        self.pool.close().await;
    }
}

impl RowOutput for PgSink<'_> {
    fn stage(&mut self, row: EmittedRow) -> anyhow::Result<()> {
        let def = self
            .schema
            .get(&row.table)
            .ok_or_else(|| Error::UnknownTable(row.table.clone()))?;
        let line = encode_row(&row.table, &def.copy_columns(), &row.values)?;

        let watermark = self.config.watermark;
        let stage = self
            .stages
            .entry(row.table.clone())
            .or_insert_with(|| TableStage::new(watermark));
        if stage.push(&line) {
            self.ready.insert(row.table);
        }
        Ok(())
    }

    fn delete_object(&mut self, object: TypedId) -> anyhow::Result<()> {
        for table in self.schema.tables() {
            let Some(ids) = &table.ids else { continue };
            let id = match (ids.policy, object.kind) {
                (IdPolicy::Node, ObjectType::Node)
                | (IdPolicy::Way, ObjectType::Way)
                | (IdPolicy::Relation, ObjectType::Relation)
                | (IdPolicy::Area, ObjectType::Way)
                | (IdPolicy::Any, _) => object.id,
                (IdPolicy::Area, ObjectType::Relation) => -object.id,
                _ => continue,
            };
            self.pending_deletes
                .entry(table.name.to_string())
                .or_default()
                .push((object.kind.as_char(), id));
        }
        Ok(())
    }
}
