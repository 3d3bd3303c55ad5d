// The geometry builder turns primitives plus their expanded member
// coordinates into point / line / polygon / multi geometries, encoded as
// hex EWKB for the COPY stream. Construction is pure: identical inputs and
// configuration always produce byte-identical output.

mod area;
mod builder;
mod model;
mod projection;
mod ring;
mod wkb;

pub use area::AreaUnit;
pub use builder::{Builder, BuilderConfig, Orientation};
pub use model::{Coord, Geometry, Polygon};
pub use projection::Projection;
pub use ring::{RingMember, RingRole};

use osm::TypedId;

/// A geometry-construction failure. These stay local: the affected row is
/// skipped and a counter is incremented, but processing continues.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("geometry has too few distinct points")]
    TooFewPoints,
    #[error("way is not closed and cannot form a polygon")]
    NotClosed,
    #[error("member ways do not join into closed rings")]
    UnclosedRing,
    #[error("relation contributes no usable rings")]
    NoRings,
    #[error("location is outside the valid coordinate range")]
    InvalidLocation,
    #[error("member {0} has no stored geometry")]
    MissingMember(TypedId),
}
