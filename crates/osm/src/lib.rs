// This crate holds the shared OSM value types which every other crate in the
// workspace references: object ids, tag maps, the three primitive kinds, and
// the tagged change-event stream produced by a reader.

mod element;
mod event;
mod location;
mod tags;

pub use element::{Member, Metadata, Node, Relation, Way};
pub use event::{Action, Change};
pub use location::Location;
pub use tags::TagMap;

use serde::{Deserialize, Serialize};

/// Object ids are signed 64-bit, matching the upstream OSM data model.
/// Negative ids occur in practice (synthetic objects created by editors
/// and by area-from-relation mapping), so they are not rejected here.
pub type Id = i64;

/// The three primitive kinds, in their canonical processing order.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Node,
    Way,
    Relation,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Node => "node",
            ObjectType::Way => "way",
            ObjectType::Relation => "relation",
        }
    }

    /// Single-character tag used in id_type columns: N, W, or R.
    pub fn as_char(&self) -> char {
        match self {
            ObjectType::Node => 'N',
            ObjectType::Way => 'W',
            ObjectType::Relation => 'R',
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-qualified object reference: kind plus id.
/// Used as the deduplication key during update propagation.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypedId {
    pub kind: ObjectType,
    pub id: Id,
}

impl TypedId {
    pub fn node(id: Id) -> Self {
        Self {
            kind: ObjectType::Node,
            id,
        }
    }
    pub fn way(id: Id) -> Self {
        Self {
            kind: ObjectType::Way,
            id,
        }
    }
    pub fn relation(id: Id) -> Self {
        Self {
            kind: ObjectType::Relation,
            id,
        }
    }
}

impl std::fmt::Display for TypedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}
