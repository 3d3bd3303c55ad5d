use osm::{Location, Metadata, ObjectType, TagMap, TypedId};

/// The current object as user logic sees it: identity, tags, optional
/// attribution, and the expanded coordinate data geometry construction
/// needs. Expansion (resolving way refs and relation members against the
/// middle) happens in the dispatcher; a `None` location records a node
/// that was missing there.
pub struct ObjectView<'a> {
    pub id: TypedId,
    pub tags: &'a TagMap,
    pub meta: &'a Metadata,
    pub expanded: &'a Expanded,
}

#[derive(Debug, Clone)]
pub enum Expanded {
    Node {
        location: Location,
    },
    Way {
        /// One entry per ref, keeping the node id for diagnostics.
        locations: Vec<(osm::Id, Option<Location>)>,
        closed: bool,
    },
    Relation {
        members: Vec<ExpandedMember>,
    },
}

#[derive(Debug, Clone)]
pub enum ExpandedMember {
    Node {
        id: osm::Id,
        role: String,
        location: Option<Location>,
    },
    Way {
        id: osm::Id,
        role: String,
        /// None when the way itself is absent from the middle.
        locations: Option<Vec<(osm::Id, Option<Location>)>>,
    },
    /// Nested relations contribute no geometry of their own.
    Relation { id: osm::Id, role: String },
}

impl ObjectView<'_> {
    pub fn kind(&self) -> ObjectType {
        self.id.kind
    }
}
