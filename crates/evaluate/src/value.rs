use super::Error;
use geometry::Geometry;
use schema::{Column, ColumnType};

/// A value passed by user logic for one column, and the normalized form the
/// sink renders into the COPY stream. Coercion maps arbitrary legal inputs
/// into a canonical `Value` per the column's logical type; it is idempotent,
/// so re-coercing an already-coerced value is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    Json(serde_json::Value),
    /// A constructed geometry and the SRID it was projected into.
    Geometry(Geometry, u32),
    /// A geometry whose construction failed. Inserting a row containing
    /// this skips the row; it never reaches coercion or the sink.
    InvalidGeometry,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Json(_) => "json",
            Value::Geometry(..) => "geometry",
            Value::InvalidGeometry => "invalid geometry",
        }
    }

    fn describe(&self) -> String {
        match self {
            Value::Text(s) => format!("{s:?}"),
            Value::Geometry(g, _) => g.kind_name().to_string(),
            other => format!("{other:?}"),
        }
    }
}

pub fn coerce(table: &str, column: &Column, value: Value) -> Result<Value, Error> {
    let fail = |value: &Value| Error::Uncoercible {
        table: table.to_string(),
        column: column.name.to_string(),
        type_name: type_label(column.ctype),
        value: value.describe(),
    };

    if matches!(value, Value::Null) {
        if column.not_null {
            return Err(Error::NullInNotNull {
                table: table.to_string(),
                column: column.name.to_string(),
            });
        }
        return Ok(Value::Null);
    }

    use ColumnType::*;
    Ok(match column.ctype {
        Text => match value {
            Value::Text(s) => Value::Text(s),
            Value::Bool(b) => Value::Text(if b { "true" } else { "false" }.to_string()),
            Value::Int(i) => Value::Text(i.to_string()),
            Value::Real(f) => Value::Text(format_real(f)),
            other => return Err(fail(&other)),
        },
        Bool => match &value {
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(1) => Value::Bool(true),
            Value::Int(0) => Value::Bool(false),
            Value::Text(s) => match s.as_str() {
                "yes" | "true" | "1" => Value::Bool(true),
                "no" | "false" | "0" => Value::Bool(false),
                _ => return Err(fail(&value)),
            },
            _ => return Err(fail(&value)),
        },
        Int2 => coerce_int(&value, i16::MIN as i64, i16::MAX as i64).ok_or_else(|| fail(&value))?,
        Int4 => coerce_int(&value, i32::MIN as i64, i32::MAX as i64).ok_or_else(|| fail(&value))?,
        Int8 | IdNum => coerce_int(&value, i64::MIN, i64::MAX).ok_or_else(|| fail(&value))?,
        Real | Area => match &value {
            Value::Real(f) => Value::Real(*f),
            Value::Int(i) => Value::Real(*i as f64),
            Value::Text(s) => match s.parse::<f64>() {
                Ok(f) => Value::Real(f),
                Err(_) => return Err(fail(&value)),
            },
            _ => return Err(fail(&value)),
        },
        Numeric => match &value {
            Value::Int(i) => Value::Text(i.to_string()),
            Value::Real(f) => Value::Text(format_real(*f)),
            Value::Text(s) if s.parse::<f64>().is_ok() => Value::Text(s.clone()),
            _ => return Err(fail(&value)),
        },
        Json | Jsonb => match value {
            Value::Json(v) => Value::Json(v),
            Value::Text(s) => Value::Json(serde_json::Value::String(s)),
            other => return Err(fail(&other)),
        },
        // hstore is a string-to-string map; only objects with string values
        // qualify.
        Hstore => match value {
            Value::Json(serde_json::Value::Object(map))
                if map.values().all(|v| v.is_string()) =>
            {
                Value::Json(serde_json::Value::Object(map))
            }
            other => return Err(fail(&other)),
        },
        // A fixed vocabulary mapping onto {-1, 0, 1}.
        Direction => match &value {
            Value::Int(i @ (-1 | 0 | 1)) => Value::Int(*i),
            Value::Bool(true) => Value::Int(1),
            Value::Bool(false) => Value::Int(0),
            Value::Text(s) => match s.as_str() {
                "yes" | "true" | "1" => Value::Int(1),
                "no" | "false" | "0" => Value::Int(0),
                "-1" | "reverse" => Value::Int(-1),
                _ => return Err(fail(&value)),
            },
            _ => return Err(fail(&value)),
        },
        IdType => match value {
            Value::Text(s) if matches!(s.as_str(), "N" | "W" | "R") => Value::Text(s),
            other => return Err(fail(&other)),
        },
        Geometry => match value {
            Value::Geometry(g, srid) => Value::Geometry(g, srid),
            other => return Err(fail(&other)),
        },
        Point | Linestring | Polygon | Multipoint | Multilinestring | Multipolygon
        | Geometrycollection => match value {
            Value::Geometry(g, srid) => {
                let lifted = lift_for(column.ctype, g).ok_or_else(|| Error::Uncoercible {
                    table: table.to_string(),
                    column: column.name.to_string(),
                    type_name: type_label(column.ctype),
                    value: "mismatched geometry kind".to_string(),
                })?;
                Value::Geometry(lifted, srid)
            }
            other => return Err(fail(&other)),
        },
    })
}

fn coerce_int(value: &Value, min: i64, max: i64) -> Option<Value> {
    let raw = match value {
        Value::Int(i) => *i,
        // Fractions truncate toward zero; width overflow clamps.
        Value::Real(f) => f.trunc() as i64,
        Value::Text(s) => s.parse::<i64>().ok()?,
        Value::Bool(b) => *b as i64,
        _ => return None,
    };
    Some(Value::Int(raw.clamp(min, max)))
}

// Match a constructed geometry against a typed geometry column, lifting
// single geometries into their multi counterparts where that is lossless.
fn lift_for(ctype: ColumnType, geometry: Geometry) -> Option<Geometry> {
    use ColumnType as C;
    match (ctype, &geometry) {
        (C::Point, Geometry::Point(_))
        | (C::Linestring, Geometry::LineString(_))
        | (C::Polygon, Geometry::Polygon(_))
        | (C::Multipoint, Geometry::MultiPoint(_))
        | (C::Multilinestring, Geometry::MultiLineString(_))
        | (C::Multipolygon, Geometry::MultiPolygon(_))
        | (C::Geometrycollection, Geometry::Collection(_)) => Some(geometry),
        (C::Multipoint, Geometry::Point(_))
        | (C::Multilinestring, Geometry::LineString(_))
        | (C::Multipolygon, Geometry::Polygon(_)) => Some(geometry.into_multi()),
        _ => None,
    }
}

fn type_label(ctype: ColumnType) -> &'static str {
    use ColumnType::*;
    match ctype {
        Text => "text",
        Bool => "bool",
        Int2 => "int2",
        Int4 => "int4",
        Int8 => "int8",
        Real => "real",
        Numeric => "numeric",
        Hstore => "hstore",
        Json => "json",
        Jsonb => "jsonb",
        Direction => "direction",
        Geometry => "geometry",
        Point => "point",
        Linestring => "linestring",
        Polygon => "polygon",
        Multipoint => "multipoint",
        Multilinestring => "multilinestring",
        Multipolygon => "multipolygon",
        Geometrycollection => "geometrycollection",
        Area => "area",
        IdNum => "id_num",
        IdType => "id_type",
    }
}

// Shortest representation that round-trips, mirroring how the sink renders
// reals into COPY text.
pub fn format_real(f: f64) -> String {
    let mut s = format!("{f}");
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

#[cfg(test)]
mod test {
    use super::*;
    use schema::Identifier;

    fn column(ctype: ColumnType, not_null: bool) -> Column {
        Column {
            name: Identifier::new("c").unwrap(),
            ctype,
            sql_type: None,
            not_null,
            create_only: false,
            projection: None,
        }
    }

    fn ok(ctype: ColumnType, value: Value) -> Value {
        coerce("t", &column(ctype, false), value).unwrap()
    }

    #[test]
    fn booleans_accept_the_documented_vocabulary() {
        for yes in [
            Value::Bool(true),
            Value::Int(1),
            Value::text("yes"),
            Value::text("true"),
            Value::text("1"),
        ] {
            assert_eq!(ok(ColumnType::Bool, yes), Value::Bool(true));
        }
        for no in [
            Value::Bool(false),
            Value::Int(0),
            Value::text("no"),
            Value::text("false"),
            Value::text("0"),
        ] {
            assert_eq!(ok(ColumnType::Bool, no), Value::Bool(false));
        }
        assert!(coerce("t", &column(ColumnType::Bool, false), Value::text("maybe")).is_err());
    }

    #[test]
    fn directions_map_onto_the_sign_domain() {
        assert_eq!(ok(ColumnType::Direction, Value::text("yes")), Value::Int(1));
        assert_eq!(ok(ColumnType::Direction, Value::text("-1")), Value::Int(-1));
        assert_eq!(
            ok(ColumnType::Direction, Value::text("reverse")),
            Value::Int(-1)
        );
        assert_eq!(ok(ColumnType::Direction, Value::Bool(false)), Value::Int(0));
        assert!(coerce("t", &column(ColumnType::Direction, false), Value::Int(2)).is_err());
    }

    #[test]
    fn integers_truncate_fractions_and_clamp_to_width() {
        assert_eq!(ok(ColumnType::Int4, Value::Real(3.9)), Value::Int(3));
        assert_eq!(ok(ColumnType::Int4, Value::Real(-3.9)), Value::Int(-3));
        assert_eq!(ok(ColumnType::Int2, Value::Int(100_000)), Value::Int(32767));
        assert_eq!(ok(ColumnType::Int8, Value::text("42")), Value::Int(42));
    }

    #[test]
    fn nulls_pass_unless_not_null() {
        assert_eq!(ok(ColumnType::Text, Value::Null), Value::Null);
        assert!(matches!(
            coerce("t", &column(ColumnType::Text, true), Value::Null),
            Err(Error::NullInNotNull { .. })
        ));
    }

    #[test]
    fn coercion_is_idempotent() {
        let cases = [
            (ColumnType::Bool, Value::text("yes")),
            (ColumnType::Direction, Value::text("reverse")),
            (ColumnType::Int2, Value::Int(1_000_000)),
            (ColumnType::Int4, Value::Real(7.5)),
            (ColumnType::Text, Value::Int(9)),
            (ColumnType::Text, Value::Real(2.5)),
            (ColumnType::Numeric, Value::Real(1.25)),
            (ColumnType::Real, Value::text("0.5")),
            (ColumnType::Json, Value::text("hello")),
        ];
        for (ctype, value) in cases {
            let once = ok(ctype, value.clone());
            let twice = ok(ctype, once.clone());
            assert_eq!(once, twice, "coercing {value:?} into {ctype:?} twice");
        }
    }

    #[test]
    fn geometry_kinds_check_and_lift() {
        use geometry::{Coord, Geometry};
        let point = Geometry::Point(Coord { x: 1.0, y: 2.0 });

        assert_eq!(
            ok(ColumnType::Point, Value::Geometry(point.clone(), 3857)),
            Value::Geometry(point.clone(), 3857)
        );
        match ok(ColumnType::Multipoint, Value::Geometry(point.clone(), 3857)) {
            Value::Geometry(g, 3857) => assert_eq!(g.kind_name(), "MULTIPOINT"),
            other => panic!("expected geometry, got {other:?}"),
        }
        assert!(coerce(
            "t",
            &column(ColumnType::Linestring, false),
            Value::Geometry(point, 3857)
        )
        .is_err());
    }
}
