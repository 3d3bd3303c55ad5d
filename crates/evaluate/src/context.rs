use super::object::{Expanded, ExpandedMember, ObjectView};
use super::value::{coerce, Value};
use super::Error;
use geometry::{Builder, BuilderConfig, Geometry, Projection, RingMember, RingRole};
use osm::{Id, Location, ObjectType, TypedId};
use schema::{IdPolicy, Schema, TableSpec};

/// Collects table definitions during the configuration phase. This is the
/// only place `define_table` exists; processing-phase contexts have no such
/// method, and this context has no `insert`.
#[derive(Default)]
pub struct DefineContext {
    specs: Vec<TableSpec>,
}

impl DefineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_table(&mut self, spec: serde_json::Value) -> Result<(), Error> {
        let spec: TableSpec = serde_json::from_value(spec).map_err(schema::Error::from)?;
        tracing::debug!(table = %spec.name, "defined output table");
        self.specs.push(spec);
        Ok(())
    }

    pub fn into_schema(self) -> Result<Schema, Error> {
        Ok(Schema::build(self.specs)?)
    }
}

/// A row emitted by user logic, with values aligned to the table's COPY
/// column order.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedRow {
    pub table: String,
    pub object: TypedId,
    pub values: Vec<Value>,
}

/// Where emitted rows go. The production implementation stages them for
/// bulk load; tests capture them in memory. The sink a context borrows
/// always outlives the event being processed.
pub trait RowOutput {
    fn stage(&mut self, row: EmittedRow) -> anyhow::Result<()>;

    /// Drop every previously-emitted row of the given object, in every
    /// table. Called before re-insertion during updates and on deletes.
    fn delete_object(&mut self, object: TypedId) -> anyhow::Result<()>;
}

/// Counters surfaced in run statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvalStats {
    pub rows_emitted: u64,
    pub rows_skipped_invalid_geometry: u64,
    pub geometry_failures: u64,
}

/// Per-invocation options on a geometry constructor, overriding the run's
/// builder defaults.
#[derive(Debug, Default, Clone)]
pub struct GeometryOptions {
    pub projection: Option<Projection>,
    pub split_antimeridian: Option<bool>,
    pub min_segment_length: Option<f64>,
}

/// The processing-phase context handed to `process_node` / `process_way` /
/// `process_relation`: read the current object, construct geometries, and
/// insert rows into declared tables.
pub struct Context<'a> {
    object: ObjectView<'a>,
    schema: &'a Schema,
    defaults: &'a BuilderConfig,
    output: &'a mut dyn RowOutput,
    stats: &'a mut EvalStats,
}

impl<'a> Context<'a> {
    pub fn new(
        object: ObjectView<'a>,
        schema: &'a Schema,
        defaults: &'a BuilderConfig,
        output: &'a mut dyn RowOutput,
        stats: &'a mut EvalStats,
    ) -> Self {
        Self {
            object,
            schema,
            defaults,
            output,
            stats,
        }
    }

    pub fn object(&self) -> &ObjectView<'a> {
        &self.object
    }

    // --- geometry constructors ---
    //
    // Construction failures are local: they increment a counter and yield
    // `Value::InvalidGeometry`, which `insert` treats as "skip this row".
    // User logic that wants a null-geometry row instead passes Value::Null.

    pub fn as_point(&mut self, options: &GeometryOptions) -> Value {
        let builder = self.builder(options);
        let result = match &self.object.expanded {
            Expanded::Node { location } => builder.node_point(*location),
            _ => Err(geometry::Error::TooFewPoints),
        };
        self.finish(builder.srid(), result)
    }

    pub fn as_linestring(&mut self, options: &GeometryOptions) -> Value {
        let builder = self.builder(options);
        let result = match &self.object.expanded {
            Expanded::Way { locations, .. } => {
                way_locations(locations).and_then(|locs| builder.way_linestring(&locs))
            }
            _ => Err(geometry::Error::TooFewPoints),
        };
        self.finish(builder.srid(), result)
    }

    pub fn as_polygon(&mut self, options: &GeometryOptions) -> Value {
        let builder = self.builder(options);
        let result = self.polygonal(&builder);
        self.finish(builder.srid(), result)
    }

    pub fn as_multipolygon(&mut self, options: &GeometryOptions) -> Value {
        let builder = self.builder(options);
        let result = self.polygonal(&builder).map(Geometry::into_multi);
        self.finish(builder.srid(), result)
    }

    pub fn as_multilinestring(&mut self, options: &GeometryOptions) -> Value {
        let builder = self.builder(options);
        let result = match &self.object.expanded {
            Expanded::Way { locations, .. } => way_locations(locations)
                .and_then(|locs| builder.way_linestring(&locs))
                .map(Geometry::into_multi),
            Expanded::Relation { members } => {
                member_lines(members).and_then(|lines| builder.relation_multilinestring(&lines))
            }
            _ => Err(geometry::Error::TooFewPoints),
        };
        self.finish(builder.srid(), result)
    }

    pub fn as_geometrycollection(&mut self, options: &GeometryOptions) -> Value {
        let builder = self.builder(options);
        let result = match &self.object.expanded {
            Expanded::Node { location } => builder.node_point(*location).map(|p| vec![p]),
            Expanded::Way { locations, .. } => way_locations(locations)
                .and_then(|locs| builder.way_linestring(&locs))
                .map(|l| vec![l]),
            Expanded::Relation { members } => collection_parts(&builder, members),
        }
        .and_then(|parts| builder.collection(parts));
        self.finish(builder.srid(), result)
    }

    // Shared way-or-relation polygon path.
    fn polygonal(&self, builder: &Builder) -> Result<Geometry, geometry::Error> {
        match &self.object.expanded {
            Expanded::Way { locations, closed } => {
                if !closed {
                    Err(geometry::Error::NotClosed)
                } else {
                    way_locations(locations).and_then(|locs| builder.way_polygon(&locs))
                }
            }
            Expanded::Relation { members } => {
                ring_members(members).and_then(|rings| builder.relation_multipolygon(&rings))
            }
            _ => Err(geometry::Error::TooFewPoints),
        }
    }

    /// Area of a previously-constructed geometry, in the run's area unit.
    pub fn area_of(&self, value: &Value) -> Value {
        match value {
            Value::Geometry(geometry, srid) => {
                let projection = match srid {
                    4326 => Projection::Wgs84,
                    _ => Projection::SphericalMercator,
                };
                let builder = Builder::new(BuilderConfig {
                    projection,
                    ..self.defaults.clone()
                });
                Value::Real(builder.area(geometry))
            }
            _ => Value::Real(0.0),
        }
    }

    // --- row emission ---

    pub fn insert(&mut self, table: &str, fields: Vec<(&str, Value)>) -> Result<(), Error> {
        let Some(def) = self.schema.get(table) else {
            return Err(Error::UnknownTable {
                table: table.to_string(),
                closest: closest(table, self.schema.tables().iter().map(|t| t.name.as_str())),
            });
        };

        // A failed geometry construction silently skips the whole row; the
        // failure was already counted when it happened.
        if fields
            .iter()
            .any(|(_, value)| matches!(value, Value::InvalidGeometry))
        {
            self.stats.rows_skipped_invalid_geometry += 1;
            tracing::debug!(object = %self.object.id, table, "skipping row with invalid geometry");
            return Ok(());
        }

        let columns = def.copy_columns();
        for (name, _) in &fields {
            if !columns.iter().any(|c| c.name.as_str() == *name) {
                return Err(Error::UnknownColumn {
                    table: table.to_string(),
                    column: name.to_string(),
                    closest: closest(name, columns.iter().map(|c| c.name.as_str())),
                });
            }
        }

        let ids = def.ids.as_ref();
        let mut values = Vec::with_capacity(columns.len());
        for column in &columns {
            let provided = fields
                .iter()
                .find(|(name, _)| *name == column.name.as_str())
                .map(|(_, value)| value.clone());

            let is_id_num = ids.map_or(false, |ids| ids.column == column.name);
            let is_id_type = ids
                .and_then(|ids| ids.type_column.as_ref())
                .map_or(false, |tc| *tc == column.name);

            let value = if is_id_num {
                let expect =
                    self.id_num_for(table, ids.expect("id column implies ids config").policy)?;
                match provided {
                    None => Value::Int(expect),
                    Some(Value::Int(found)) if found == expect => Value::Int(expect),
                    Some(other) => {
                        return Err(Error::IdMismatch {
                            expect: self.object.id,
                            found: format!("{other:?}"),
                        })
                    }
                }
            } else if is_id_type {
                let expect = self.object.id.kind.as_char().to_string();
                match provided {
                    None => Value::Text(expect),
                    Some(Value::Text(found)) if found == expect => Value::Text(expect),
                    Some(other) => {
                        return Err(Error::IdMismatch {
                            expect: self.object.id,
                            found: format!("{other:?}"),
                        })
                    }
                }
            } else {
                coerce(table, column, provided.unwrap_or(Value::Null))?
            };
            values.push(value);
        }

        self.stats.rows_emitted += 1;
        self.output
            .stage(EmittedRow {
                table: table.to_string(),
                object: self.object.id,
                values,
            })
            .map_err(Error::Output)
    }

    // The id written into the id_num column. The `area` policy follows the
    // convention of positive way ids and negated relation ids sharing one
    // id space.
    fn id_num_for(&self, table: &str, policy: IdPolicy) -> Result<Id, Error> {
        let kind = self.object.id.kind;
        let id = self.object.id.id;
        let accepted = match policy {
            IdPolicy::Node => kind == ObjectType::Node,
            IdPolicy::Way => kind == ObjectType::Way,
            IdPolicy::Relation => kind == ObjectType::Relation,
            IdPolicy::Area => kind == ObjectType::Way || kind == ObjectType::Relation,
            IdPolicy::Any => true,
        };
        if !accepted {
            return Err(Error::WrongObjectKind {
                table: table.to_string(),
                policy: match policy {
                    IdPolicy::Node => "node",
                    IdPolicy::Way => "way",
                    IdPolicy::Relation => "relation",
                    IdPolicy::Area => "area",
                    IdPolicy::Any => "any",
                },
                kind,
            });
        }
        Ok(match (policy, kind) {
            (IdPolicy::Area, ObjectType::Relation) => -id,
            _ => id,
        })
    }

    fn builder(&self, options: &GeometryOptions) -> Builder {
        let mut config = self.defaults.clone();
        if let Some(projection) = options.projection {
            config.projection = projection;
        }
        if let Some(split) = options.split_antimeridian {
            config.split_antimeridian = split;
        }
        if let Some(min) = options.min_segment_length {
            config.min_segment_length = min;
        }
        Builder::new(config)
    }

    fn finish(&mut self, srid: u32, result: Result<Geometry, geometry::Error>) -> Value {
        match result {
            Ok(geometry) => Value::Geometry(geometry, srid),
            Err(err) => {
                self.stats.geometry_failures += 1;
                tracing::debug!(object = %self.object.id, error = %err, "geometry construction failed");
                Value::InvalidGeometry
            }
        }
    }
}

// --- expansion helpers ---

fn way_locations(locations: &[(Id, Option<Location>)]) -> Result<Vec<Location>, geometry::Error> {
    locations
        .iter()
        .map(|(id, location)| location.ok_or(geometry::Error::MissingMember(TypedId::node(*id))))
        .collect()
}

fn ring_members(members: &[ExpandedMember]) -> Result<Vec<RingMember>, geometry::Error> {
    let mut rings = Vec::new();
    for member in members {
        match member {
            ExpandedMember::Way {
                id,
                role,
                locations,
            } => {
                let Some(locations) = locations else {
                    return Err(geometry::Error::MissingMember(TypedId::way(*id)));
                };
                rings.push(RingMember {
                    role: RingRole::from_role(role),
                    locations: way_locations(locations)?,
                });
            }
            // Node and nested-relation members carry no ring geometry.
            ExpandedMember::Node { .. } | ExpandedMember::Relation { .. } => {}
        }
    }
    Ok(rings)
}

fn member_lines(members: &[ExpandedMember]) -> Result<Vec<Vec<Location>>, geometry::Error> {
    let mut lines = Vec::new();
    for member in members {
        if let ExpandedMember::Way { id, locations, .. } = member {
            let Some(locations) = locations else {
                return Err(geometry::Error::MissingMember(TypedId::way(*id)));
            };
            lines.push(way_locations(locations)?);
        }
    }
    Ok(lines)
}

fn collection_parts(
    builder: &Builder,
    members: &[ExpandedMember],
) -> Result<Vec<Geometry>, geometry::Error> {
    let mut parts = Vec::new();
    for member in members {
        match member {
            ExpandedMember::Node { id, location, .. } => {
                let Some(location) = location else {
                    return Err(geometry::Error::MissingMember(TypedId::node(*id)));
                };
                parts.push(builder.node_point(*location)?);
            }
            ExpandedMember::Way { id, locations, .. } => {
                let Some(locations) = locations else {
                    return Err(geometry::Error::MissingMember(TypedId::way(*id)));
                };
                parts.push(builder.way_linestring(&way_locations(locations)?)?);
            }
            ExpandedMember::Relation { .. } => {}
        }
    }
    Ok(parts)
}

// "did you mean" suggestion, as a raw edit-distance minimum.
fn closest<'n>(needle: &str, haystack: impl Iterator<Item = &'n str>) -> String {
    haystack
        .min_by_key(|candidate| strsim::osa_distance(needle, candidate))
        .unwrap_or_default()
        .to_string()
}
