// The middle is the reversible object store sitting between the dispatcher
// and the geometry builder. It answers two kinds of questions: "what are the
// coordinates / members of this primitive?" (forward) and "which primitives
// depend on this one?" (reverse). Reverse indexes exist only in update-capable
// mode; they are what turns a changed node into the set of ways and relations
// that must be re-rendered.

mod node_store;
mod object_log;
mod reverse_index;
mod snapshot;

use node_store::NodeStore;
use object_log::{ObjectLog, PutOutcome};
use osm::{Id, Location, Node, Relation, Way};
use reverse_index::ReverseIndex;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Any storage I/O failure is fatal; an import cannot proceed past it.
    #[error("middle storage I/O failure")]
    Io(#[from] std::io::Error),
    #[error("not a middle snapshot: bad magic {found:?}")]
    BadMagic { found: [u8; 8] },
    #[error("unsupported middle snapshot format version {0}")]
    UnsupportedVersion(u32),
    #[error("middle snapshot is truncated or corrupt: {0}")]
    Corrupt(&'static str),
}

/// Import mode stores only forward data. Update mode additionally maintains
/// the reverse dependency indexes and supports random mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    Import,
    Update,
}

pub struct Middle {
    pub(crate) mode: Mode,
    pub(crate) nodes: NodeStore,
    pub(crate) ways: ObjectLog<Way>,
    pub(crate) relations: ObjectLog<Relation>,
    // child id -> parent ids, one index per dependency edge kind.
    pub(crate) node_ways: ReverseIndex,
    pub(crate) node_relations: ReverseIndex,
    pub(crate) way_relations: ReverseIndex,
    pub(crate) relation_relations: ReverseIndex,
}

impl Middle {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            nodes: NodeStore::new(),
            ways: ObjectLog::new(),
            relations: ObjectLog::new(),
            node_ways: ReverseIndex::new(),
            node_relations: ReverseIndex::new(),
            way_relations: ReverseIndex::new(),
            relation_relations: ReverseIndex::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    // --- forward writes ---

    pub fn put_node(&mut self, node: &Node) {
        self.nodes.put(node.id, node.location);
    }

    pub fn put_way(&mut self, way: &Way) {
        match self.ways.put(way) {
            PutOutcome::Unchanged => return,
            PutOutcome::Inserted => {}
            PutOutcome::Replaced(old) => {
                if self.mode == Mode::Update {
                    for r in &old.refs {
                        self.node_ways.remove(*r, old.id);
                    }
                }
            }
        }
        if self.mode == Mode::Update {
            for r in &way.refs {
                self.node_ways.add(*r, way.id);
            }
        }
    }

    pub fn put_relation(&mut self, relation: &Relation) {
        match self.relations.put(relation) {
            PutOutcome::Unchanged => return,
            PutOutcome::Inserted => {}
            PutOutcome::Replaced(old) => {
                if self.mode == Mode::Update {
                    self.unlink_members(&old);
                }
            }
        }
        if self.mode == Mode::Update {
            for member in &relation.members {
                match member.kind {
                    osm::ObjectType::Node => self.node_relations.add(member.id, relation.id),
                    osm::ObjectType::Way => self.way_relations.add(member.id, relation.id),
                    osm::ObjectType::Relation => {
                        self.relation_relations.add(member.id, relation.id)
                    }
                }
            }
        }
    }

    // --- deletes ---

    /// Remove a node's location. The node's reverse entries (which ways and
    /// relations referenced it) are owned by those parents and survive, so a
    /// subsequent propagation pass can still find the dependents.
    pub fn delete_node(&mut self, id: Id) {
        self.nodes.remove(id);
    }

    pub fn delete_way(&mut self, id: Id) {
        if let Some(old) = self.ways.delete(id) {
            if self.mode == Mode::Update {
                for r in &old.refs {
                    self.node_ways.remove(*r, old.id);
                }
            }
        }
    }

    pub fn delete_relation(&mut self, id: Id) {
        if let Some(old) = self.relations.delete(id) {
            if self.mode == Mode::Update {
                self.unlink_members(&old);
            }
        }
    }

    fn unlink_members(&mut self, relation: &Relation) {
        for member in &relation.members {
            match member.kind {
                osm::ObjectType::Node => self.node_relations.remove(member.id, relation.id),
                osm::ObjectType::Way => self.way_relations.remove(member.id, relation.id),
                osm::ObjectType::Relation => {
                    self.relation_relations.remove(member.id, relation.id)
                }
            }
        }
    }

    // --- forward reads ---

    pub fn get_node_coords(&self, id: Id) -> Option<Location> {
        self.nodes.get(id)
    }

    pub fn get_way(&self, id: Id) -> Option<Way> {
        self.ways.get(id)
    }

    pub fn get_relation(&self, id: Id) -> Option<Relation> {
        self.relations.get(id)
    }

    // --- reverse reads ---

    pub fn ways_using_node(&self, id: Id) -> impl Iterator<Item = Id> + '_ {
        self.node_ways.parents_of(id)
    }

    pub fn relations_using_node(&self, id: Id) -> impl Iterator<Item = Id> + '_ {
        self.node_relations.parents_of(id)
    }

    pub fn relations_using_way(&self, id: Id) -> impl Iterator<Item = Id> + '_ {
        self.way_relations.parents_of(id)
    }

    pub fn relations_using_relation(&self, id: Id) -> impl Iterator<Item = Id> + '_ {
        self.relation_relations.parents_of(id)
    }

    // --- persistence ---

    /// Write a snapshot of the whole store. The encoding is fully ordered, so
    /// identical contents produce a byte-identical file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), Error> {
        use std::io::Write;
        let file = std::fs::File::create(path)?;
        let mut w = std::io::BufWriter::new(file);
        snapshot::write(self, &mut w)?;
        w.flush()?;
        tracing::info!(path = %path.display(), "wrote middle snapshot");
        Ok(())
    }

    pub fn load(path: &std::path::Path) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        let mut r = std::io::BufReader::new(file);
        let middle = snapshot::read(&mut r)?;
        tracing::info!(path = %path.display(), "loaded middle snapshot");
        Ok(middle)
    }
}
