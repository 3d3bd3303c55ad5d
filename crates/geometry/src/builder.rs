use super::area::{area, AreaUnit};
use super::model::{ring_contains, signed_ring_area, Coord, Geometry, Polygon};
use super::projection::Projection;
use super::ring::{assemble, AssembledRing, RingMember, RingRole};
use super::Error;
use osm::Location;
use serde::{Deserialize, Serialize};

/// Winding required of outer rings; inner rings always wind the other way.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    pub projection: Projection,
    /// Split line geometries that cross the antimeridian.
    pub split_antimeridian: bool,
    /// Segments shorter than this (in projected units) collapse into their
    /// predecessor. Zero still collapses exactly coincident points.
    pub min_segment_length: f64,
    pub orientation: Orientation,
    pub area_unit: AreaUnit,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            projection: Projection::default(),
            split_antimeridian: false,
            min_segment_length: 0.0,
            orientation: Orientation::default(),
            area_unit: AreaUnit::default(),
        }
    }
}

/// Constructs geometries from primitives plus expanded member coordinates.
/// Pure: no interior state beyond configuration, so it may be shared across
/// worker threads during propagation.
pub struct Builder {
    config: BuilderConfig,
}

impl Builder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub fn srid(&self) -> u32 {
        self.config.projection.srid()
    }

    pub fn node_point(&self, location: Location) -> Result<Geometry, Error> {
        if !location.is_valid() {
            return Err(Error::InvalidLocation);
        }
        Ok(Geometry::Point(self.config.projection.project(location)))
    }

    pub fn way_linestring(&self, locations: &[Location]) -> Result<Geometry, Error> {
        let parts = if self.config.split_antimeridian {
            split_antimeridian(locations)
        } else {
            vec![locations.to_vec()]
        };

        let mut lines = Vec::new();
        for part in parts {
            let coords = self.project_and_collapse(&part);
            if coords.len() >= 2 {
                lines.push(coords);
            }
        }
        match lines.len() {
            0 => Err(Error::TooFewPoints),
            1 => Ok(Geometry::LineString(lines.pop().expect("checked length"))),
            _ => Ok(Geometry::MultiLineString(lines)),
        }
    }

    /// A closed way as a single-ring polygon.
    pub fn way_polygon(&self, locations: &[Location]) -> Result<Geometry, Error> {
        if locations.len() < 4 || locations.first() != locations.last() {
            return Err(Error::NotClosed);
        }
        let ring = self.closed_ring(locations)?;
        Ok(Geometry::Polygon(Polygon {
            rings: vec![self.oriented(ring, true)],
        }))
    }

    /// Assemble a multipolygon relation from its member ways: join members
    /// into rings, classify outer against inner by role hint with a
    /// containment fallback, attach each hole to the smallest outer ring
    /// containing it, and fix winding per the orientation policy.
    ///
    /// A single outer ring emits a plain polygon; the caller lifts it with
    /// `into_multi` when the column type demands a multipolygon.
    pub fn relation_multipolygon(&self, members: &[RingMember]) -> Result<Geometry, Error> {
        let assembled = assemble(members)?;

        let mut rings = Vec::new();
        for AssembledRing { role, locations } in assembled {
            let coords = self.closed_ring(&locations)?;
            rings.push((role, coords));
        }

        // Resolve Unknown roles topologically: a ring inside an even number
        // of other rings is an outer.
        let classified: Vec<(bool, &Vec<Coord>)> = rings
            .iter()
            .map(|(role, coords)| {
                let is_outer = match role {
                    RingRole::Outer => true,
                    RingRole::Inner => false,
                    RingRole::Unknown => {
                        let depth = rings
                            .iter()
                            .filter(|(_, other)| {
                                !std::ptr::eq(other, coords) && ring_contains(other, coords[0])
                            })
                            .count();
                        depth % 2 == 0
                    }
                };
                (is_outer, coords)
            })
            .collect();

        let mut polygons: Vec<Polygon> = classified
            .iter()
            .filter(|(is_outer, _)| *is_outer)
            .map(|(_, coords)| Polygon {
                rings: vec![self.oriented((*coords).clone(), true)],
            })
            .collect();
        if polygons.is_empty() {
            return Err(Error::NoRings);
        }

        for (_, coords) in classified.iter().filter(|(is_outer, _)| !*is_outer) {
            // Smallest containing outer wins; an orphan hole is promoted to
            // its own polygon rather than dropped.
            let parent = polygons
                .iter()
                .enumerate()
                .filter(|(_, p)| ring_contains(p.outer(), coords[0]))
                .min_by(|(_, a), (_, b)| {
                    signed_ring_area(a.outer())
                        .abs()
                        .total_cmp(&signed_ring_area(b.outer()).abs())
                })
                .map(|(index, _)| index);
            match parent {
                Some(index) => {
                    let hole = self.oriented((*coords).clone(), false);
                    polygons[index].rings.push(hole);
                }
                None => polygons.push(Polygon {
                    rings: vec![self.oriented((*coords).clone(), true)],
                }),
            }
        }

        if polygons.len() == 1 {
            Ok(Geometry::Polygon(polygons.pop().expect("checked length")))
        } else {
            Ok(Geometry::MultiPolygon(polygons))
        }
    }

    /// Any relation as a multilinestring over its member ways.
    pub fn relation_multilinestring(
        &self,
        members: &[Vec<Location>],
    ) -> Result<Geometry, Error> {
        let mut lines = Vec::new();
        for member in members {
            let coords = self.project_and_collapse(member);
            if coords.len() >= 2 {
                lines.push(coords);
            }
        }
        if lines.is_empty() {
            return Err(Error::TooFewPoints);
        }
        Ok(Geometry::MultiLineString(lines))
    }

    /// Any relation as a heterogeneous collection of pre-built parts.
    pub fn collection(&self, parts: Vec<Geometry>) -> Result<Geometry, Error> {
        if parts.is_empty() {
            return Err(Error::TooFewPoints);
        }
        Ok(Geometry::Collection(parts))
    }

    pub fn area(&self, geometry: &Geometry) -> f64 {
        area(geometry, self.config.projection, self.config.area_unit)
    }

    // Project a closed location ring, collapse short segments, re-validate
    // closure.
    fn closed_ring(&self, locations: &[Location]) -> Result<Vec<Coord>, Error> {
        let mut coords = self.project_and_collapse(locations);
        if coords.first() != coords.last() {
            // Collapse may have eaten the closing point.
            if let Some(first) = coords.first().copied() {
                coords.push(first);
            }
        }
        if coords.len() < 4 {
            return Err(Error::TooFewPoints);
        }
        Ok(coords)
    }

    fn project_and_collapse(&self, locations: &[Location]) -> Vec<Coord> {
        let min = self.config.min_segment_length;
        let mut coords: Vec<Coord> = Vec::with_capacity(locations.len());
        for location in locations {
            let coord = self.config.projection.project(*location);
            match coords.last() {
                Some(last) => {
                    let (dx, dy) = (coord.x - last.x, coord.y - last.y);
                    let len = (dx * dx + dy * dy).sqrt();
                    if len > min || (min == 0.0 && len > 0.0) {
                        coords.push(coord);
                    }
                }
                None => coords.push(coord),
            }
        }
        coords
    }

    fn oriented(&self, mut ring: Vec<Coord>, is_outer: bool) -> Vec<Coord> {
        let want_ccw = match (self.config.orientation, is_outer) {
            (Orientation::CounterClockwise, true) | (Orientation::Clockwise, false) => true,
            _ => false,
        };
        if (signed_ring_area(&ring) > 0.0) != want_ccw {
            ring.reverse();
        }
        ring
    }
}

// Break a location sequence wherever consecutive longitudes jump across the
// antimeridian, interpolating a boundary point on each side.
fn split_antimeridian(locations: &[Location]) -> Vec<Vec<Location>> {
    const HALF_TURN: i64 = 1_800_000_000; // 180 degrees in fixed-point
    let mut parts: Vec<Vec<Location>> = Vec::new();
    let mut current: Vec<Location> = Vec::new();

    for &location in locations {
        if let Some(&previous) = current.last() {
            let jump = location.lon as i64 - previous.lon as i64;
            if jump.abs() > HALF_TURN {
                // Unwrap the longitude, then interpolate latitude at the
                // boundary nearest the previous point.
                let unwrapped = location.lon as i64 - 2 * HALF_TURN * jump.signum();
                let boundary = if previous.lon >= 0 { HALF_TURN } else { -HALF_TURN };
                let span = unwrapped - previous.lon as i64;
                let t = if span == 0 {
                    0.0
                } else {
                    (boundary - previous.lon as i64) as f64 / span as f64
                };
                let lat = previous.lat as f64 + t * (location.lat as f64 - previous.lat as f64);
                current.push(Location {
                    lon: boundary as i32,
                    lat: lat.round() as i32,
                });
                parts.push(std::mem::take(&mut current));
                current.push(Location {
                    lon: -boundary as i32,
                    lat: lat.round() as i32,
                });
            }
        }
        current.push(location);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod test {
    use super::super::ring::RingRole;
    use super::*;

    fn loc(lon: f64, lat: f64) -> Location {
        Location::from_degrees(lon, lat)
    }

    fn wgs84() -> Builder {
        Builder::new(BuilderConfig {
            projection: Projection::Wgs84,
            ..BuilderConfig::default()
        })
    }

    fn member(role: RingRole, points: &[(f64, f64)]) -> RingMember {
        RingMember {
            role,
            locations: points.iter().map(|&(lon, lat)| loc(lon, lat)).collect(),
        }
    }

    #[test]
    fn node_point_projects() {
        let geometry = wgs84().node_point(loc(10.0, 50.0)).unwrap();
        assert_eq!(geometry, Geometry::Point(Coord { x: 10.0, y: 50.0 }));
    }

    #[test]
    fn zero_length_segments_collapse() {
        let geometry = wgs84()
            .way_linestring(&[loc(0.0, 0.0), loc(0.0, 0.0), loc(1.0, 1.0)])
            .unwrap();
        match geometry {
            Geometry::LineString(coords) => assert_eq!(coords.len(), 2),
            other => panic!("expected a linestring, got {other:?}"),
        }

        // All points coincident: nothing left to build.
        assert_eq!(
            wgs84().way_linestring(&[loc(0.0, 0.0), loc(0.0, 0.0)]),
            Err(Error::TooFewPoints)
        );
    }

    #[test]
    fn an_open_way_cannot_be_a_polygon() {
        assert_eq!(
            wgs84().way_polygon(&[loc(0.0, 0.0), loc(1.0, 0.0), loc(1.0, 1.0)]),
            Err(Error::NotClosed)
        );
    }

    #[test]
    fn closed_way_polygon_is_oriented_counter_clockwise() {
        // Input winds clockwise; the builder re-winds it.
        let geometry = wgs84()
            .way_polygon(&[
                loc(0.0, 0.0),
                loc(0.0, 1.0),
                loc(1.0, 1.0),
                loc(1.0, 0.0),
                loc(0.0, 0.0),
            ])
            .unwrap();
        match geometry {
            Geometry::Polygon(polygon) => {
                assert!(signed_ring_area(polygon.outer()) > 0.0);
            }
            other => panic!("expected a polygon, got {other:?}"),
        }
    }

    #[test]
    fn multipolygon_with_hole() {
        // Two outer halves of a 4x4 square, plus a 1x1 inner ring.
        let geometry = wgs84()
            .relation_multipolygon(&[
                member(RingRole::Outer, &[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0)]),
                member(RingRole::Outer, &[(4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
                member(
                    RingRole::Inner,
                    &[(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0), (1.0, 1.0)],
                ),
            ])
            .unwrap();

        match geometry {
            Geometry::Polygon(polygon) => {
                assert_eq!(polygon.rings.len(), 2);
                assert!(signed_ring_area(&polygon.rings[0]) > 0.0, "outer is CCW");
                assert!(signed_ring_area(&polygon.rings[1]) < 0.0, "inner is CW");
            }
            other => panic!("expected a polygon, got {other:?}"),
        }
    }

    #[test]
    fn unknown_roles_classify_topologically() {
        let geometry = wgs84()
            .relation_multipolygon(&[
                member(
                    RingRole::Unknown,
                    &[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)],
                ),
                member(
                    RingRole::Unknown,
                    &[(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0), (1.0, 1.0)],
                ),
            ])
            .unwrap();
        match geometry {
            Geometry::Polygon(polygon) => assert_eq!(polygon.rings.len(), 2),
            other => panic!("expected a polygon, got {other:?}"),
        }
    }

    #[test]
    fn two_outers_become_a_multipolygon() {
        let geometry = wgs84()
            .relation_multipolygon(&[
                member(
                    RingRole::Outer,
                    &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)],
                ),
                member(
                    RingRole::Outer,
                    &[(5.0, 5.0), (6.0, 5.0), (6.0, 6.0), (5.0, 6.0), (5.0, 5.0)],
                ),
            ])
            .unwrap();
        match geometry {
            Geometry::MultiPolygon(polygons) => assert_eq!(polygons.len(), 2),
            other => panic!("expected a multipolygon, got {other:?}"),
        }
    }

    #[test]
    fn antimeridian_split_yields_two_parts() {
        let builder = Builder::new(BuilderConfig {
            projection: Projection::Wgs84,
            split_antimeridian: true,
            ..BuilderConfig::default()
        });
        let geometry = builder
            .way_linestring(&[loc(179.0, 10.0), loc(-179.0, 10.0)])
            .unwrap();
        match geometry {
            Geometry::MultiLineString(lines) => {
                assert_eq!(lines.len(), 2);
                // First part ends on the boundary, second begins on it.
                assert_eq!(lines[0].last().unwrap().x, 180.0);
                assert_eq!(lines[1].first().unwrap().x, -180.0);
            }
            other => panic!("expected a multilinestring, got {other:?}"),
        }
    }

    #[test]
    fn construction_is_deterministic() {
        let members = [
            member(RingRole::Outer, &[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0)]),
            member(RingRole::Outer, &[(4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
        ];
        let a = wgs84().relation_multipolygon(&members).unwrap();
        let b = wgs84().relation_multipolygon(&members).unwrap();
        assert_eq!(a.to_ewkb(4326), b.to_ewkb(4326));
    }
}
