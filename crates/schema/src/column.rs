use super::{Error, Identifier};
use serde::{Deserialize, Serialize};

/// The closed set of logical column types. Each maps to a default SQL type,
/// which a definition may override per column.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Bool,
    Int2,
    Int4,
    Int8,
    Real,
    Numeric,
    Hstore,
    Json,
    Jsonb,
    /// Forward / backward / both, stored as a small integer in {-1, 0, 1}.
    Direction,
    Geometry,
    Point,
    Linestring,
    Polygon,
    Multipoint,
    Multilinestring,
    Multipolygon,
    Geometrycollection,
    /// Computed polygon area, stored as real.
    Area,
    /// The numeric object id of the row's source primitive.
    IdNum,
    /// The kind of the row's source primitive, stored as char(1): N, W, R.
    IdType,
}

impl ColumnType {
    pub fn parse(name: &str) -> Option<Self> {
        use ColumnType::*;
        Some(match name {
            "text" => Text,
            "bool" | "boolean" => Bool,
            "int2" | "smallint" => Int2,
            "int4" | "int" | "integer" => Int4,
            "int8" | "bigint" => Int8,
            "real" => Real,
            "numeric" => Numeric,
            "hstore" => Hstore,
            "json" => Json,
            "jsonb" => Jsonb,
            "direction" => Direction,
            "geometry" => Geometry,
            "point" => Point,
            "linestring" => Linestring,
            "polygon" => Polygon,
            "multipoint" => Multipoint,
            "multilinestring" => Multilinestring,
            "multipolygon" => Multipolygon,
            "geometrycollection" => Geometrycollection,
            "area" => Area,
            "id_num" => IdNum,
            "id_type" => IdType,
            _ => return None,
        })
    }

    pub fn is_geometry(&self) -> bool {
        use ColumnType::*;
        matches!(
            self,
            Geometry
                | Point
                | Linestring
                | Polygon
                | Multipoint
                | Multilinestring
                | Multipolygon
                | Geometrycollection
        )
    }

    /// Geometry and area columns accept projection attributes; others do not.
    pub fn is_spatial(&self) -> bool {
        self.is_geometry() || *self == ColumnType::Area
    }

    /// The default SQL type. Geometry subtypes render as PostGIS typmods
    /// carrying the column's SRID.
    pub fn sql_type(&self, srid: u32) -> String {
        use ColumnType::*;
        match self {
            Text => "text".to_string(),
            Bool => "boolean".to_string(),
            Int2 => "int2".to_string(),
            Int4 => "int4".to_string(),
            Int8 => "int8".to_string(),
            Real => "real".to_string(),
            Numeric => "numeric".to_string(),
            Hstore => "hstore".to_string(),
            Json => "json".to_string(),
            Jsonb => "jsonb".to_string(),
            Direction => "int2".to_string(),
            Geometry => format!("geometry(GEOMETRY, {srid})"),
            Point => format!("geometry(POINT, {srid})"),
            Linestring => format!("geometry(LINESTRING, {srid})"),
            Polygon => format!("geometry(POLYGON, {srid})"),
            Multipoint => format!("geometry(MULTIPOINT, {srid})"),
            Multilinestring => format!("geometry(MULTILINESTRING, {srid})"),
            Multipolygon => format!("geometry(MULTIPOLYGON, {srid})"),
            Geometrycollection => format!("geometry(GEOMETRYCOLLECTION, {srid})"),
            Area => "real".to_string(),
            IdNum => "int8".to_string(),
            IdType => "char(1)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: Identifier,
    pub ctype: ColumnType,
    /// Overrides the default SQL type when set.
    pub sql_type: Option<String>,
    pub not_null: bool,
    /// Created in DDL but never written by COPY; for columns the database
    /// fills itself (defaults, generated columns).
    pub create_only: bool,
    /// Target SRID; meaningful only on spatial columns.
    pub projection: Option<u32>,
}

/// The serde-facing shape of a column definition.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub column: Identifier,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub sql_type: Option<String>,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub create_only: bool,
    #[serde(default)]
    pub projection: Option<u32>,
}

impl Column {
    pub fn from_spec(table: &str, spec: ColumnSpec) -> Result<Self, Error> {
        let ctype = ColumnType::parse(&spec.type_name).ok_or_else(|| Error::UnknownType {
            table: table.to_string(),
            column: spec.column.to_string(),
            type_name: spec.type_name.clone(),
        })?;
        if spec.projection.is_some() && !ctype.is_spatial() {
            return Err(Error::ProjectionOnNonSpatial {
                table: table.to_string(),
                column: spec.column.to_string(),
            });
        }
        Ok(Self {
            name: spec.column,
            ctype,
            sql_type: spec.sql_type,
            not_null: spec.not_null,
            create_only: spec.create_only,
            projection: spec.projection,
        })
    }

    pub fn rendered_sql_type(&self, default_srid: u32) -> String {
        match &self.sql_type {
            Some(explicit) => explicit.clone(),
            None => self.ctype.sql_type(self.projection.unwrap_or(default_srid)),
        }
    }
}
