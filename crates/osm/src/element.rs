use super::{Id, Location, ObjectType, TagMap};
use serde::{Deserialize, Serialize};

/// Optional object attribution, present only when the run is configured to
/// retain it (`extra_attributes`). The timestamp is seconds since the epoch.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub version: Option<u32>,
    pub timestamp: Option<i64>,
    pub changeset: Option<i64>,
    pub uid: Option<i64>,
    pub user: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Id,
    pub tags: TagMap,
    pub location: Location,
    #[serde(default)]
    pub meta: Metadata,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Way {
    pub id: Id,
    pub tags: TagMap,
    /// Ordered node references. A closed way repeats its first ref last.
    pub refs: Vec<Id>,
    #[serde(default)]
    pub meta: Metadata,
}

impl Way {
    pub fn is_closed(&self) -> bool {
        self.refs.len() >= 4 && self.refs.first() == self.refs.last()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Member {
    #[serde(rename = "type")]
    pub kind: ObjectType,
    #[serde(rename = "ref")]
    pub id: Id,
    pub role: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: Id,
    pub tags: TagMap,
    pub members: Vec<Member>,
    #[serde(default)]
    pub meta: Metadata,
}

impl Relation {
    /// A relation renders as a (multi)polygon when tagged as a multipolygon
    /// or an administrative boundary.
    pub fn is_area(&self) -> bool {
        matches!(self.tags.get("type"), Some("multipolygon") | Some("boundary"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn closed_way_requires_four_refs_and_matching_ends() {
        let mut way = Way {
            id: 1,
            tags: TagMap::new(),
            refs: vec![1, 2, 3, 1],
            meta: Metadata::default(),
        };
        assert!(way.is_closed());

        way.refs = vec![1, 2, 1];
        assert!(!way.is_closed());

        way.refs = vec![1, 2, 3, 4];
        assert!(!way.is_closed());
    }

    #[test]
    fn multipolygon_and_boundary_relations_are_areas() {
        let mut relation = Relation {
            id: 7,
            tags: [("type", "multipolygon")].into_iter().collect(),
            members: Vec::new(),
            meta: Metadata::default(),
        };
        assert!(relation.is_area());

        relation.tags = [("type", "boundary")].into_iter().collect();
        assert!(relation.is_area());

        relation.tags = [("type", "route")].into_iter().collect();
        assert!(!relation.is_area());
    }
}
