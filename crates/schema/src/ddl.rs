use super::table::{Cluster, IndexDef, IndexPolicy, TableDef};

/// Renders every SQL shape the sink executes for one table. All statements
/// are built from validated identifiers; only index where-clauses pass
/// through as raw SQL, and those are part of the user's trusted definition.
pub struct Ddl<'a> {
    table: &'a TableDef,
}

/// Probe for schemas present in the database, run at configuration time.
pub const PROBE_SCHEMAS: &str = "SELECT nspname FROM pg_namespace";
/// Probe for tablespaces present in the database, run at configuration time.
pub const PROBE_TABLESPACES: &str = "SELECT spcname FROM pg_tablespace";

impl<'a> Ddl<'a> {
    pub fn new(table: &'a TableDef) -> Self {
        Self { table }
    }

    /// CREATE TABLE under the staging name; the commit-time rename moves it
    /// to its final name.
    pub fn create_table(&self) -> String {
        let columns = self
            .table
            .all_columns()
            .iter()
            .map(|c| {
                let mut sql = format!("{} {}", c.name.quoted(), c.rendered_sql_type(self.table.srid));
                if c.not_null {
                    sql.push_str(" NOT NULL");
                }
                sql
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "CREATE TABLE {} ({})",
            self.table.qualified_staging_name(),
            columns
        );
        if let Some(tablespace) = &self.table.data_tablespace {
            sql.push_str(&format!(" TABLESPACE {}", tablespace.quoted()));
        }
        sql
    }

    pub fn copy_statement(&self, target_is_staging: bool) -> String {
        let columns = self
            .table
            .copy_columns()
            .iter()
            .map(|c| c.name.quoted())
            .collect::<Vec<_>>()
            .join(", ");
        let target = if target_is_staging {
            self.table.qualified_staging_name()
        } else {
            self.table.qualified_name()
        };
        format!("COPY {target} ({columns}) FROM STDIN")
    }

    /// Index builds at import commit, in declaration order. A default gist
    /// index on the geometry column is appended when no declared index
    /// covers it, and the id index follows its declared policy.
    /// `updatable` lowers fillfactor handling: non-updatable tables pack
    /// index pages full.
    pub fn create_indexes(&self, updatable: bool) -> Vec<String> {
        let mut statements = Vec::new();
        let mut geometry_covered = false;
        let geometry = self.table.geometry_column();

        for index in &self.table.indexes {
            if let Some(geometry) = geometry {
                if index.columns.iter().any(|c| c.as_str() == geometry.name.as_str()) {
                    geometry_covered = true;
                }
            }
            statements.push(self.render_index(index, updatable));
        }

        if let (Some(geometry), false) = (geometry, geometry_covered) {
            statements.push(self.render_index(
                &IndexDef {
                    method: "gist".to_string(),
                    columns: vec![geometry.name.clone()],
                    tablespace: None,
                    fillfactor: None,
                    where_clause: None,
                    unique: false,
                },
                updatable,
            ));
        }

        if let Some(ids) = &self.table.ids {
            let build = match ids.index {
                IndexPolicy::Auto => updatable,
                IndexPolicy::Always | IndexPolicy::Unique => true,
                IndexPolicy::No => false,
            };
            if build {
                let mut columns = Vec::new();
                if let Some(type_column) = &ids.type_column {
                    columns.push(type_column.clone());
                }
                columns.push(ids.column.clone());
                statements.push(self.render_index(
                    &IndexDef {
                        method: "btree".to_string(),
                        columns,
                        tablespace: None,
                        fillfactor: None,
                        where_clause: None,
                        unique: ids.index == IndexPolicy::Unique,
                    },
                    updatable,
                ));
            }
        }
        statements
    }

    fn render_index(&self, index: &IndexDef, updatable: bool) -> String {
        let name = format!(
            "{}_{}_idx",
            self.table.name,
            index
                .columns
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join("_")
        );
        let columns = index
            .columns
            .iter()
            .map(|c| c.quoted())
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "CREATE {}INDEX \"{}\" ON {} USING {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            name,
            self.table.qualified_staging_name(),
            index.method,
            columns,
        );

        let fillfactor = index.fillfactor.or(if !updatable { Some(100) } else { None });
        if let Some(fillfactor) = fillfactor {
            sql.push_str(&format!(" WITH (fillfactor={fillfactor})"));
        }
        let tablespace = index
            .tablespace
            .as_ref()
            .or(self.table.index_tablespace.as_ref());
        if let Some(tablespace) = tablespace {
            sql.push_str(&format!(" TABLESPACE {}", tablespace.quoted()));
        }
        if let Some(where_clause) = &index.where_clause {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        sql
    }

    /// CLUSTER at import commit, when requested and a geometry index exists.
    pub fn cluster(&self) -> Option<String> {
        let geometry = self.table.geometry_column()?;
        match self.table.cluster {
            Cluster::No => None,
            Cluster::Auto => Some(format!(
                "CLUSTER {} USING \"{}_{}_idx\"",
                self.table.qualified_staging_name(),
                self.table.name,
                geometry.name,
            )),
        }
    }

    pub fn analyze(&self, target_is_staging: bool) -> String {
        let target = if target_is_staging {
            self.table.qualified_staging_name()
        } else {
            self.table.qualified_name()
        };
        format!("ANALYZE {target}")
    }

    /// The atomic commit-time rename from staging to final.
    pub fn rename_to_final(&self) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.table.qualified_staging_name(),
            self.table.name.quoted(),
        )
    }

    pub fn drop_final_if_exists(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table.qualified_name())
    }

    /// Batched delete of all rows belonging to a set of primitives, keyed by
    /// the id columns. With an `any` ids policy the statement takes the type
    /// character as $1 and the id array as $2; otherwise just the id array
    /// as $1.
    pub fn delete_by_ids(&self) -> Option<String> {
        let ids = self.table.ids.as_ref()?;
        Some(match &ids.type_column {
            Some(type_column) => format!(
                "DELETE FROM {} WHERE {} = $1 AND {} = ANY($2)",
                self.table.qualified_name(),
                type_column.quoted(),
                ids.column.quoted(),
            ),
            None => format!(
                "DELETE FROM {} WHERE {} = ANY($1)",
                self.table.qualified_name(),
                ids.column.quoted(),
            ),
        })
    }
}
