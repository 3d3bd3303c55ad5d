use evaluate::{Expanded, ExpandedMember};
use middle::Middle;
use osm::{ObjectType, Relation, Way};

// Expansion resolves a primitive's references against the middle into the
// coordinate data geometry construction needs. Missing lookups become
// `None` entries; the evaluator bridge turns those into geometry
// construction failures, never into run errors.

pub fn expand_way(middle: &Middle, way: &Way) -> Expanded {
    Expanded::Way {
        locations: way
            .refs
            .iter()
            .map(|&id| (id, middle.get_node_coords(id)))
            .collect(),
        closed: way.is_closed(),
    }
}

pub fn expand_relation(middle: &Middle, relation: &Relation) -> Expanded {
    Expanded::Relation {
        members: relation
            .members
            .iter()
            .map(|member| match member.kind {
                ObjectType::Node => ExpandedMember::Node {
                    id: member.id,
                    role: member.role.clone(),
                    location: middle.get_node_coords(member.id),
                },
                ObjectType::Way => ExpandedMember::Way {
                    id: member.id,
                    role: member.role.clone(),
                    locations: middle.get_way(member.id).map(|way| {
                        way.refs
                            .iter()
                            .map(|&id| (id, middle.get_node_coords(id)))
                            .collect()
                    }),
                },
                ObjectType::Relation => ExpandedMember::Relation {
                    id: member.id,
                    role: member.role.clone(),
                },
            })
            .collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use middle::Mode;
    use osm::{Location, Member, Metadata, Node, TagMap};

    #[test]
    fn missing_references_expand_to_none() {
        let mut store = Middle::new(Mode::Import);
        store.put_node(&Node {
            id: 1,
            tags: TagMap::new(),
            location: Location::from_degrees(10.0, 50.0),
            meta: Metadata::default(),
        });

        let way = Way {
            id: 100,
            tags: TagMap::new(),
            refs: vec![1, 2],
            meta: Metadata::default(),
        };
        match expand_way(&store, &way) {
            Expanded::Way { locations, closed } => {
                assert!(!closed);
                assert_eq!(locations[0], (1, Some(Location::from_degrees(10.0, 50.0))));
                assert_eq!(locations[1], (2, None));
            }
            other => panic!("expected way expansion, got {other:?}"),
        }

        let relation = Relation {
            id: 900,
            tags: TagMap::new(),
            members: vec![
                Member {
                    kind: ObjectType::Way,
                    id: 100,
                    role: "outer".to_string(),
                },
                Member {
                    kind: ObjectType::Way,
                    id: 101,
                    role: "outer".to_string(),
                },
            ],
            meta: Metadata::default(),
        };
        store.put_way(&way);
        match expand_relation(&store, &relation) {
            Expanded::Relation { members } => {
                assert!(matches!(
                    &members[0],
                    ExpandedMember::Way { locations: Some(_), .. }
                ));
                assert!(matches!(
                    &members[1],
                    ExpandedMember::Way { locations: None, .. }
                ));
            }
            other => panic!("expected relation expansion, got {other:?}"),
        }
    }
}
