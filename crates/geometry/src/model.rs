/// A projected coordinate pair, in the units of the builder's projection.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

/// A polygon as a list of rings: the first ring is the outer boundary,
/// the rest are holes. Rings are closed (first point repeated last).
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub rings: Vec<Vec<Coord>>,
}

impl Polygon {
    pub fn outer(&self) -> &[Coord] {
        &self.rings[0]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    Polygon(Polygon),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Polygon>),
    Collection(Vec<Geometry>),
}

impl Geometry {
    /// The WKT-style name, used in log and error text.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "POINT",
            Geometry::LineString(_) => "LINESTRING",
            Geometry::Polygon(_) => "POLYGON",
            Geometry::MultiPoint(_) => "MULTIPOINT",
            Geometry::MultiLineString(_) => "MULTILINESTRING",
            Geometry::MultiPolygon(_) => "MULTIPOLYGON",
            Geometry::Collection(_) => "GEOMETRYCOLLECTION",
        }
    }

    /// Lift a single geometry into its multi counterpart. Already-multi
    /// geometries pass through.
    pub fn into_multi(self) -> Geometry {
        match self {
            Geometry::Point(p) => Geometry::MultiPoint(vec![p]),
            Geometry::LineString(l) => Geometry::MultiLineString(vec![l]),
            Geometry::Polygon(p) => Geometry::MultiPolygon(vec![p]),
            other => other,
        }
    }
}

/// Signed area of a closed ring by the shoelace formula: positive for
/// counter-clockwise winding.
pub fn signed_ring_area(ring: &[Coord]) -> f64 {
    let mut sum = 0.0;
    for window in ring.windows(2) {
        sum += (window[0].x * window[1].y) - (window[1].x * window[0].y);
    }
    sum / 2.0
}

/// Whether `point` lies strictly inside `ring` (even-odd ray cast).
pub fn ring_contains(ring: &[Coord], point: Coord) -> bool {
    let mut inside = false;
    for window in ring.windows(2) {
        let (a, b) = (window[0], window[1]);
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if point.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}
