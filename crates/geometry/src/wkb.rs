use super::model::{Coord, Geometry, Polygon};
use byteorder::{LittleEndian, WriteBytesExt};

// Geometry type codes per the WKB specification.
const POINT: u32 = 1;
const LINESTRING: u32 = 2;
const POLYGON: u32 = 3;
const MULTIPOINT: u32 = 4;
const MULTILINESTRING: u32 = 5;
const MULTIPOLYGON: u32 = 6;
const GEOMETRYCOLLECTION: u32 = 7;

// PostGIS EWKB: the SRID flag is set on the outermost geometry only.
const SRID_FLAG: u32 = 0x2000_0000;

impl Geometry {
    pub fn to_ewkb(&self, srid: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_geometry(&mut buf, self, Some(srid));
        buf
    }

    /// Hex EWKB, the representation COPY streams carry for geometry columns.
    pub fn to_hex_ewkb(&self, srid: u32) -> String {
        let bytes = self.to_ewkb(srid);
        let mut hex = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            hex.push_str(&format!("{byte:02X}"));
        }
        hex
    }
}

fn write_header(buf: &mut Vec<u8>, type_code: u32, srid: Option<u32>) {
    buf.push(0x01); // little-endian
    match srid {
        Some(srid) => {
            buf.write_u32::<LittleEndian>(type_code | SRID_FLAG).unwrap();
            buf.write_u32::<LittleEndian>(srid).unwrap();
        }
        None => buf.write_u32::<LittleEndian>(type_code).unwrap(),
    }
}

fn write_coord(buf: &mut Vec<u8>, coord: Coord) {
    buf.write_f64::<LittleEndian>(coord.x).unwrap();
    buf.write_f64::<LittleEndian>(coord.y).unwrap();
}

fn write_ring(buf: &mut Vec<u8>, ring: &[Coord]) {
    buf.write_u32::<LittleEndian>(ring.len() as u32).unwrap();
    for coord in ring {
        write_coord(buf, *coord);
    }
}

fn write_polygon_body(buf: &mut Vec<u8>, polygon: &Polygon) {
    buf.write_u32::<LittleEndian>(polygon.rings.len() as u32)
        .unwrap();
    for ring in &polygon.rings {
        write_ring(buf, ring);
    }
}

fn write_geometry(buf: &mut Vec<u8>, geometry: &Geometry, srid: Option<u32>) {
    match geometry {
        Geometry::Point(coord) => {
            write_header(buf, POINT, srid);
            write_coord(buf, *coord);
        }
        Geometry::LineString(coords) => {
            write_header(buf, LINESTRING, srid);
            write_ring(buf, coords);
        }
        Geometry::Polygon(polygon) => {
            write_header(buf, POLYGON, srid);
            write_polygon_body(buf, polygon);
        }
        Geometry::MultiPoint(points) => {
            write_header(buf, MULTIPOINT, srid);
            buf.write_u32::<LittleEndian>(points.len() as u32).unwrap();
            for point in points {
                write_header(buf, POINT, None);
                write_coord(buf, *point);
            }
        }
        Geometry::MultiLineString(lines) => {
            write_header(buf, MULTILINESTRING, srid);
            buf.write_u32::<LittleEndian>(lines.len() as u32).unwrap();
            for line in lines {
                write_header(buf, LINESTRING, None);
                write_ring(buf, line);
            }
        }
        Geometry::MultiPolygon(polygons) => {
            write_header(buf, MULTIPOLYGON, srid);
            buf.write_u32::<LittleEndian>(polygons.len() as u32).unwrap();
            for polygon in polygons {
                write_header(buf, POLYGON, None);
                write_polygon_body(buf, polygon);
            }
        }
        Geometry::Collection(members) => {
            write_header(buf, GEOMETRYCOLLECTION, srid);
            buf.write_u32::<LittleEndian>(members.len() as u32).unwrap();
            for member in members {
                write_geometry(buf, member, None);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn point_matches_the_postgis_reference_encoding() {
        // SELECT 'SRID=4326;POINT(1 2)'::geometry in PostGIS.
        let point = Geometry::Point(Coord { x: 1.0, y: 2.0 });
        assert_eq!(
            point.to_hex_ewkb(4326),
            "0101000020E6100000000000000000F03F0000000000000040",
        );
    }

    #[test]
    fn nested_geometries_omit_the_srid() {
        let multi = Geometry::MultiPoint(vec![Coord { x: 1.0, y: 2.0 }]);
        let hex = multi.to_hex_ewkb(4326);
        // Header with SRID once, then a bare point header.
        assert!(hex.starts_with("0104000020E610000001000000"));
        assert!(hex.ends_with("0101000000000000000000F03F0000000000000040"));
    }

    #[test]
    fn encoding_is_deterministic() {
        let polygon = Geometry::Polygon(Polygon {
            rings: vec![vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
                Coord { x: 0.0, y: 0.0 },
            ]],
        });
        assert_eq!(polygon.to_ewkb(3857), polygon.to_ewkb(3857));
    }
}
