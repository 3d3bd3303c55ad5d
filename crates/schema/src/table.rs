use super::column::{Column, ColumnSpec, ColumnType};
use super::{Error, Identifier};
use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IdPolicy {
    Node,
    Way,
    Relation,
    Area,
    Any,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IndexPolicy {
    Auto,
    Always,
    Unique,
    No,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cluster {
    No,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdsConfig {
    pub policy: IdPolicy,
    /// Column holding the numeric object id.
    pub column: Identifier,
    /// Column holding the object kind; present only for the `any` policy.
    pub type_column: Option<Identifier>,
    pub index: IndexPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub method: String,
    pub columns: Vec<Identifier>,
    pub tablespace: Option<Identifier>,
    pub fillfactor: Option<u16>,
    pub where_clause: Option<String>,
    pub unique: bool,
}

#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: Identifier,
    pub schema: Option<Identifier>,
    pub cluster: Cluster,
    pub ids: Option<IdsConfig>,
    pub columns: Vec<Column>,
    pub indexes: Vec<IndexDef>,
    pub data_tablespace: Option<Identifier>,
    pub index_tablespace: Option<Identifier>,
    /// Default SRID for spatial columns without an explicit projection.
    pub srid: u32,
}

// --- serde-facing definition shapes ---

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    pub name: Identifier,
    #[serde(default)]
    pub schema: Option<Identifier>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub ids: Option<IdsSpec>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    #[serde(default)]
    pub data_tablespace: Option<Identifier>,
    #[serde(default)]
    pub index_tablespace: Option<Identifier>,
    #[serde(default)]
    pub srid: Option<u32>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct IdsSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id_column: Identifier,
    #[serde(default)]
    pub type_column: Option<Identifier>,
    #[serde(default)]
    pub index: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct IndexSpec {
    #[serde(default)]
    pub method: Option<String>,
    pub columns: Vec<Identifier>,
    #[serde(default)]
    pub tablespace: Option<Identifier>,
    #[serde(default)]
    pub fillfactor: Option<u16>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

const INDEX_METHODS: &[&str] = &["btree", "gist", "gin", "hash", "spgist", "brin"];

pub const DEFAULT_SRID: u32 = 3857;

impl TableDef {
    pub fn from_spec(spec: TableSpec) -> Result<Self, Error> {
        let table_name = spec.name.to_string();

        let cluster = match spec.cluster.as_deref() {
            None | Some("no") => Cluster::No,
            Some("auto") => Cluster::Auto,
            Some(other) => {
                return Err(Error::UnknownOption {
                    table: table_name,
                    option: format!("cluster = {other:?}"),
                })
            }
        };

        let ids = match spec.ids {
            None => None,
            Some(ids) => {
                let policy = match ids.type_name.as_str() {
                    "node" => IdPolicy::Node,
                    "way" => IdPolicy::Way,
                    "relation" => IdPolicy::Relation,
                    "area" => IdPolicy::Area,
                    "any" => IdPolicy::Any,
                    other => {
                        return Err(Error::UnknownOption {
                            table: table_name,
                            option: format!("ids.type = {other:?}"),
                        })
                    }
                };
                let index = match ids.index.as_deref() {
                    None | Some("auto") => IndexPolicy::Auto,
                    Some("always") => IndexPolicy::Always,
                    Some("unique") => IndexPolicy::Unique,
                    Some("no") => IndexPolicy::No,
                    Some(other) => {
                        return Err(Error::UnknownOption {
                            table: table_name,
                            option: format!("ids.index = {other:?}"),
                        })
                    }
                };
                let type_column = match (policy, ids.type_column) {
                    (IdPolicy::Any, None) => {
                        Some(Identifier::new("osm_type").expect("static identifier"))
                    }
                    (IdPolicy::Any, explicit) => explicit,
                    (_, Some(explicit)) => {
                        return Err(Error::UnknownOption {
                            table: table_name,
                            option: format!(
                                "ids.type_column = {:?} is only valid with ids.type = \"any\"",
                                explicit.as_str(),
                            ),
                        })
                    }
                    (_, None) => None,
                };
                Some(IdsConfig {
                    policy,
                    column: ids.id_column,
                    type_column,
                    index,
                })
            }
        };

        if ids.is_none() && spec.columns.is_empty() {
            return Err(Error::EmptyTable { table: table_name });
        }

        let columns = spec
            .columns
            .into_iter()
            .map(|c| Column::from_spec(&table_name, c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = BTreeSet::new();
        for column in TableDef::id_columns_of(&ids).iter().chain(columns.iter()) {
            if !seen.insert(column.name.to_string()) {
                return Err(Error::DuplicateColumn {
                    table: table_name,
                    column: column.name.to_string(),
                });
            }
        }

        let indexes = spec
            .indexes
            .into_iter()
            .map(|index| {
                let method = index.method.unwrap_or_else(|| "btree".to_string());
                if !INDEX_METHODS.contains(&method.as_str()) {
                    return Err(Error::UnknownOption {
                        table: table_name.clone(),
                        option: format!("index method {method:?}"),
                    });
                }
                for column in &index.columns {
                    if !seen.contains(column.as_str()) {
                        return Err(Error::IndexUnknownColumn {
                            table: table_name.clone(),
                            column: column.to_string(),
                        });
                    }
                }
                Ok(IndexDef {
                    method,
                    columns: index.columns,
                    tablespace: index.tablespace,
                    fillfactor: index.fillfactor,
                    where_clause: index.where_clause,
                    unique: index.unique,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let table = Self {
            name: spec.name,
            schema: spec.schema,
            cluster,
            ids,
            columns,
            indexes,
            data_tablespace: spec.data_tablespace,
            index_tablespace: spec.index_tablespace,
            srid: spec.srid.unwrap_or(DEFAULT_SRID),
        };

        if table.cluster == Cluster::Auto && table.geometry_column().is_none() {
            return Err(Error::ClusterWithoutGeometry {
                table: table.name.to_string(),
            });
        }
        Ok(table)
    }

    fn id_columns_of(ids: &Option<IdsConfig>) -> Vec<Column> {
        let Some(ids) = ids else {
            return Vec::new();
        };
        let mut columns = Vec::new();
        if let Some(type_column) = &ids.type_column {
            columns.push(Column {
                name: type_column.clone(),
                ctype: ColumnType::IdType,
                sql_type: None,
                not_null: true,
                create_only: false,
                projection: None,
            });
        }
        columns.push(Column {
            name: ids.column.clone(),
            ctype: ColumnType::IdNum,
            sql_type: None,
            not_null: true,
            create_only: false,
            projection: None,
        });
        columns
    }

    /// Synthesized id columns, if an ids config is declared.
    pub fn id_columns(&self) -> Vec<Column> {
        Self::id_columns_of(&self.ids)
    }

    /// All columns in DDL order: id columns first, then declared columns.
    pub fn all_columns(&self) -> Vec<Column> {
        let mut all = self.id_columns();
        all.extend(self.columns.iter().cloned());
        all
    }

    /// The columns a COPY stream carries: everything except create-only.
    pub fn copy_columns(&self) -> Vec<Column> {
        self.all_columns()
            .into_iter()
            .filter(|c| !c.create_only)
            .collect()
    }

    /// The first declared geometry column, the CLUSTER / default-gist target.
    pub fn geometry_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.ctype.is_geometry())
    }

    pub fn find_column(&self, name: &str) -> Option<Column> {
        self.all_columns().into_iter().find(|c| c.name.as_str() == name)
    }

    /// schema-qualified, quoted final name.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema.quoted(), self.name.quoted()),
            None => self.name.quoted(),
        }
    }

    /// The name data is staged under before the commit-time rename.
    pub fn staging_name(&self) -> String {
        format!("{}_staging", self.name)
    }

    pub fn qualified_staging_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.\"{}\"", schema.quoted(), self.staging_name()),
            None => format!("\"{}\"", self.staging_name()),
        }
    }
}

/// The validated set of user tables.
#[derive(Debug)]
pub struct Schema {
    tables: Vec<TableDef>,
}

impl Schema {
    pub fn build(specs: Vec<TableSpec>) -> Result<Self, Error> {
        let mut tables = Vec::new();
        let mut seen = BTreeSet::new();
        for spec in specs {
            let table = TableDef::from_spec(spec)?;
            let key = (
                table.schema.as_ref().map(|s| s.to_string()),
                table.name.to_string(),
            );
            if !seen.insert(key) {
                return Err(Error::DuplicateTable(table.name.to_string()));
            }
            tables.push(table);
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name.as_str() == name)
    }

    /// Every schema name the definition references.
    pub fn referenced_schemas(&self) -> BTreeSet<String> {
        self.tables
            .iter()
            .filter_map(|t| t.schema.as_ref().map(|s| s.to_string()))
            .collect()
    }

    /// Every tablespace name the definition references.
    pub fn referenced_tablespaces(&self) -> BTreeSet<String> {
        self.tables
            .iter()
            .flat_map(|t| {
                t.data_tablespace
                    .iter()
                    .chain(t.index_tablespace.iter())
                    .chain(t.indexes.iter().filter_map(|i| i.tablespace.as_ref()))
            })
            .map(|s| s.to_string())
            .collect()
    }

    /// Validate referenced schemas and tablespaces against what the live
    /// database reports. Runs before any data flows; the error names the
    /// missing object and the statement that would create it.
    pub fn check_capabilities(
        &self,
        existing_schemas: &BTreeSet<String>,
        existing_tablespaces: &BTreeSet<String>,
    ) -> Result<(), Error> {
        for name in self.referenced_schemas() {
            if !existing_schemas.contains(&name) {
                return Err(Error::MissingSchema { name });
            }
        }
        for name in self.referenced_tablespaces() {
            if !existing_tablespaces.contains(&name) {
                return Err(Error::MissingTablespace { name });
            }
        }
        Ok(())
    }
}
