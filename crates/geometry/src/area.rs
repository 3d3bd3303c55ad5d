use super::model::{signed_ring_area, Coord, Geometry, Polygon};
use super::projection::Projection;
use serde::{Deserialize, Serialize};

const EARTH_RADIUS: f64 = 6_378_137.0;

/// Units for area-typed columns: flat area in the units of the target
/// projection, or true spherical area in square meters.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AreaUnit {
    #[default]
    Projected,
    Spherical,
}

/// Area of a polygon or multipolygon: outer rings minus holes, always
/// non-negative. Non-areal geometries have zero area.
pub fn area(geometry: &Geometry, projection: Projection, unit: AreaUnit) -> f64 {
    match geometry {
        Geometry::Polygon(polygon) => polygon_area(polygon, projection, unit),
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .map(|p| polygon_area(p, projection, unit))
            .sum(),
        _ => 0.0,
    }
}

fn polygon_area(polygon: &Polygon, projection: Projection, unit: AreaUnit) -> f64 {
    let ring_area = |ring: &[Coord]| match unit {
        AreaUnit::Projected => signed_ring_area(ring).abs(),
        AreaUnit::Spherical => spherical_ring_area(ring, projection),
    };

    let mut total = 0.0;
    for (index, ring) in polygon.rings.iter().enumerate() {
        if index == 0 {
            total += ring_area(ring);
        } else {
            total -= ring_area(ring);
        }
    }
    total.max(0.0)
}

// Chamberlain & Duquette's spherical polygon area, on coordinates
// unprojected back to the sphere.
fn spherical_ring_area(ring: &[Coord], projection: Projection) -> f64 {
    let mut sum = 0.0;
    for window in ring.windows(2) {
        let (lon1, lat1) = projection.unproject(window[0]);
        let (lon2, lat2) = projection.unproject(window[1]);
        sum += (lon2.to_radians() - lon1.to_radians())
            * (2.0 + lat1.to_radians().sin() + lat2.to_radians().sin());
    }
    (sum * EARTH_RADIUS * EARTH_RADIUS / 2.0).abs()
}

#[cfg(test)]
mod test {
    use super::*;

    fn square(origin: f64, size: f64) -> Vec<Coord> {
        vec![
            Coord { x: origin, y: origin },
            Coord { x: origin + size, y: origin },
            Coord { x: origin + size, y: origin + size },
            Coord { x: origin, y: origin + size },
            Coord { x: origin, y: origin },
        ]
    }

    #[test]
    fn projected_area_subtracts_holes() {
        let polygon = Geometry::Polygon(Polygon {
            rings: vec![square(0.0, 4.0), square(1.0, 1.0)],
        });
        assert_eq!(
            area(&polygon, Projection::SphericalMercator, AreaUnit::Projected),
            15.0
        );
    }

    #[test]
    fn lines_have_no_area() {
        let line = Geometry::LineString(square(0.0, 4.0));
        assert_eq!(
            area(&line, Projection::SphericalMercator, AreaUnit::Projected),
            0.0
        );
    }

    #[test]
    fn spherical_area_of_a_small_equatorial_square_is_plausible() {
        // A square of roughly 0.01 degrees on a side at the equator covers
        // about 1.24 square kilometers.
        let ring: Vec<Coord> = square(0.0, 0.01);
        let polygon = Geometry::Polygon(Polygon { rings: vec![ring] });
        let got = area(&polygon, Projection::Wgs84, AreaUnit::Spherical);
        let expect = 1_238_000.0;
        assert!(
            (got - expect).abs() / expect < 0.01,
            "got {got}, expected about {expect}"
        );
    }
}
