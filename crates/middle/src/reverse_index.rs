use osm::Id;
use std::collections::{BTreeMap, BTreeSet};

/// child id -> ordered set of parent ids. Append-only during import,
/// mutated freely during update. Ordered containers keep iteration and
/// snapshot output deterministic.
pub struct ReverseIndex {
    entries: BTreeMap<Id, BTreeSet<Id>>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, child: Id, parent: Id) {
        self.entries.entry(child).or_default().insert(parent);
    }

    pub fn remove(&mut self, child: Id, parent: Id) {
        if let Some(parents) = self.entries.get_mut(&child) {
            parents.remove(&parent);
            if parents.is_empty() {
                self.entries.remove(&child);
            }
        }
    }

    pub fn parents_of(&self, child: Id) -> impl Iterator<Item = Id> + '_ {
        self.entries
            .get(&child)
            .into_iter()
            .flat_map(|parents| parents.iter().copied())
    }

    pub fn write_to<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        w.write_u64::<LittleEndian>(self.entries.len() as u64)?;
        for (child, parents) in &self.entries {
            w.write_i64::<LittleEndian>(*child)?;
            w.write_u32::<LittleEndian>(parents.len() as u32)?;
            for parent in parents {
                w.write_i64::<LittleEndian>(*parent)?;
            }
        }
        Ok(())
    }

    pub fn read_from<R: std::io::Read>(r: &mut R) -> std::io::Result<Self> {
        use byteorder::{LittleEndian, ReadBytesExt};
        let children = r.read_u64::<LittleEndian>()?;
        let mut entries = BTreeMap::new();
        for _ in 0..children {
            let child = r.read_i64::<LittleEndian>()?;
            let count = r.read_u32::<LittleEndian>()?;
            let mut parents = BTreeSet::new();
            for _ in 0..count {
                parents.insert(r.read_i64::<LittleEndian>()?);
            }
            entries.insert(child, parents);
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod test {
    use super::ReverseIndex;

    #[test]
    fn add_remove_and_iterate() {
        let mut index = ReverseIndex::new();
        index.add(1, 100);
        index.add(1, 101);
        index.add(1, 100); // set semantics
        index.add(2, 100);

        assert_eq!(index.parents_of(1).collect::<Vec<_>>(), vec![100, 101]);
        assert_eq!(index.parents_of(3).count(), 0);

        index.remove(1, 100);
        assert_eq!(index.parents_of(1).collect::<Vec<_>>(), vec![101]);

        index.remove(1, 101);
        assert_eq!(index.parents_of(1).count(), 0);
    }

    #[test]
    fn serialization_round_trips() {
        let mut index = ReverseIndex::new();
        index.add(5, 50);
        index.add(5, 51);
        index.add(-9, 50);

        let mut buf = Vec::new();
        index.write_to(&mut buf).unwrap();
        let restored = ReverseIndex::read_from(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.parents_of(5).collect::<Vec<_>>(), vec![50, 51]);
        assert_eq!(restored.parents_of(-9).collect::<Vec<_>>(), vec![50]);
    }
}
