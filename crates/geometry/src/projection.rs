use super::model::Coord;
use osm::Location;
use serde::{Deserialize, Serialize};

const EARTH_RADIUS: f64 = 6_378_137.0;
// Latitudes beyond this are clamped before the mercator transform; the
// projection diverges at the poles.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// The coordinate reference the builder projects into. The source data is
/// always WGS84 fixed-point.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    /// Pass-through latitude / longitude degrees, SRID 4326.
    Wgs84,
    /// Spherical ("web") mercator meters, SRID 3857.
    #[default]
    SphericalMercator,
}

impl Projection {
    pub fn srid(&self) -> u32 {
        match self {
            Projection::Wgs84 => 4326,
            Projection::SphericalMercator => 3857,
        }
    }

    pub fn project(&self, location: Location) -> Coord {
        match self {
            Projection::Wgs84 => Coord {
                x: location.lon_deg(),
                y: location.lat_deg(),
            },
            Projection::SphericalMercator => {
                let lon = location.lon_deg().to_radians();
                let lat = location
                    .lat_deg()
                    .clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT)
                    .to_radians();
                Coord {
                    x: EARTH_RADIUS * lon,
                    y: EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
                }
            }
        }
    }

    /// Exact inverse of `project`, used for spherical area computation.
    pub fn unproject(&self, coord: Coord) -> (f64, f64) {
        match self {
            Projection::Wgs84 => (coord.x, coord.y),
            Projection::SphericalMercator => {
                let lon = (coord.x / EARTH_RADIUS).to_degrees();
                let lat = (2.0 * (coord.y / EARTH_RADIUS).exp().atan()
                    - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                (lon, lat)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wgs84_is_pass_through() {
        let coord = Projection::Wgs84.project(Location::from_degrees(10.5, -33.25));
        assert_eq!(coord, Coord { x: 10.5, y: -33.25 });
    }

    #[test]
    fn mercator_fixed_points() {
        let origin = Projection::SphericalMercator.project(Location::from_degrees(0.0, 0.0));
        assert_eq!(origin, Coord { x: 0.0, y: 0.0 });

        // 180 degrees east maps to the projection's x extent.
        let east = Projection::SphericalMercator.project(Location::from_degrees(180.0, 0.0));
        assert!((east.x - 20_037_508.342_789_244).abs() < 1e-6);
        assert_eq!(east.y, 0.0);

        // Polar latitudes clamp instead of diverging.
        let pole = Projection::SphericalMercator.project(Location::from_degrees(0.0, 90.0));
        assert!(pole.y.is_finite());
    }

    #[test]
    fn mercator_round_trips() {
        let p = Projection::SphericalMercator;
        let coord = p.project(Location::from_degrees(13.4, 52.52));
        let (lon, lat) = p.unproject(coord);
        assert!((lon - 13.4).abs() < 1e-9);
        assert!((lat - 52.52).abs() < 1e-9);
    }
}
