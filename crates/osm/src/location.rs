use serde::{Deserialize, Serialize};

/// Coordinates are carried as fixed-point integers scaled by 1e7, which is
/// exact for every coordinate the OSM data model can express and keeps node
/// storage at eight bytes per location.
pub const COORDINATE_SCALE: f64 = 1e7;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub lon: i32,
    pub lat: i32,
}

impl Location {
    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self {
            lon: (lon * COORDINATE_SCALE).round() as i32,
            lat: (lat * COORDINATE_SCALE).round() as i32,
        }
    }

    pub fn lon_deg(&self) -> f64 {
        self.lon as f64 / COORDINATE_SCALE
    }

    pub fn lat_deg(&self) -> f64 {
        self.lat as f64 / COORDINATE_SCALE
    }

    /// Whether this location lies inside the valid WGS84 envelope.
    pub fn is_valid(&self) -> bool {
        self.lon_deg() >= -180.0
            && self.lon_deg() <= 180.0
            && self.lat_deg() >= -90.0
            && self.lat_deg() <= 90.0
    }
}

#[cfg(test)]
mod test {
    use super::Location;

    #[test]
    fn degrees_round_trip_at_fixed_point_resolution() {
        let loc = Location::from_degrees(10.1234567, -50.7654321);
        assert_eq!(loc.lon, 101234567);
        assert_eq!(loc.lat, -507654321);
        assert_eq!(loc.lon_deg(), 10.1234567);
        assert_eq!(loc.lat_deg(), -50.7654321);
        assert!(loc.is_valid());
        assert!(!Location::from_degrees(181.0, 0.0).is_valid());
    }
}
