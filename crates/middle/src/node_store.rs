use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use osm::{Id, Location};
use std::collections::BTreeMap;
use std::io::{Read, Write};

// Node ids cluster densely, so locations live in fixed blocks of 512 slots
// keyed by id >> 9. A block costs 4KiB and one hash-free probe per lookup;
// absent slots carry a sentinel outside the valid coordinate range.
const BLOCK_BITS: u32 = 9;
pub const BLOCK_SIZE: usize = 1 << BLOCK_BITS;

const ABSENT: Location = Location {
    lon: i32::MIN,
    lat: i32::MIN,
};

pub struct NodeStore {
    blocks: BTreeMap<i64, Vec<Location>>,
    len: usize,
}

impl NodeStore {
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            len: 0,
        }
    }

    fn split(id: Id) -> (i64, usize) {
        (
            id.div_euclid(BLOCK_SIZE as i64),
            id.rem_euclid(BLOCK_SIZE as i64) as usize,
        )
    }

    pub fn put(&mut self, id: Id, location: Location) {
        let (block_id, slot) = Self::split(id);
        let block = self
            .blocks
            .entry(block_id)
            .or_insert_with(|| vec![ABSENT; BLOCK_SIZE]);
        if block[slot] == ABSENT {
            self.len += 1;
        }
        block[slot] = location;
    }

    pub fn get(&self, id: Id) -> Option<Location> {
        let (block_id, slot) = Self::split(id);
        match self.blocks.get(&block_id) {
            Some(block) if block[slot] != ABSENT => Some(block[slot]),
            _ => None,
        }
    }

    pub fn remove(&mut self, id: Id) {
        let (block_id, slot) = Self::split(id);
        if let Some(block) = self.blocks.get_mut(&block_id) {
            if block[slot] != ABSENT {
                self.len -= 1;
            }
            block[slot] = ABSENT;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u64::<LittleEndian>(self.blocks.len() as u64)?;
        w.write_u64::<LittleEndian>(self.len as u64)?;
        // BTreeMap iteration is ordered, which keeps snapshots reproducible.
        for (block_id, block) in &self.blocks {
            w.write_i64::<LittleEndian>(*block_id)?;
            for location in block {
                w.write_i32::<LittleEndian>(location.lon)?;
                w.write_i32::<LittleEndian>(location.lat)?;
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let block_count = r.read_u64::<LittleEndian>()?;
        let len = r.read_u64::<LittleEndian>()? as usize;
        let mut blocks = BTreeMap::new();
        for _ in 0..block_count {
            let block_id = r.read_i64::<LittleEndian>()?;
            let mut block = Vec::with_capacity(BLOCK_SIZE);
            for _ in 0..BLOCK_SIZE {
                let lon = r.read_i32::<LittleEndian>()?;
                let lat = r.read_i32::<LittleEndian>()?;
                block.push(Location { lon, lat });
            }
            blocks.insert(block_id, block);
        }
        Ok(Self { blocks, len })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn put_get_remove_across_blocks() {
        let mut store = NodeStore::new();
        let far = 10 * BLOCK_SIZE as i64 + 3;

        store.put(1, Location::from_degrees(10.0, 50.0));
        store.put(far, Location::from_degrees(-1.0, -2.0));
        store.put(-5, Location::from_degrees(3.0, 4.0));

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(1), Some(Location::from_degrees(10.0, 50.0)));
        assert_eq!(store.get(far), Some(Location::from_degrees(-1.0, -2.0)));
        assert_eq!(store.get(-5), Some(Location::from_degrees(3.0, 4.0)));
        assert_eq!(store.get(2), None);

        store.remove(far);
        assert_eq!(store.get(far), None);
        assert_eq!(store.len(), 2);

        // Re-putting the same id does not double count.
        store.put(1, Location::from_degrees(11.0, 50.0));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1), Some(Location::from_degrees(11.0, 50.0)));
    }

    #[test]
    fn encoding_round_trips() {
        let mut store = NodeStore::new();
        store.put(1, Location::from_degrees(10.0, 50.0));
        store.put(100_000, Location::from_degrees(-73.9, 40.7));

        let mut buf = Vec::new();
        store.write_to(&mut buf).unwrap();
        let restored = NodeStore::read_from(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(1), Some(Location::from_degrees(10.0, 50.0)));
        assert_eq!(
            restored.get(100_000),
            Some(Location::from_degrees(-73.9, 40.7))
        );
    }
}
