use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use osm::{Id, Member, Metadata, ObjectType, Relation, TagMap, Way};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::marker::PhantomData;

/// Ways and relations are stored as length-prefixed records in an append-only
/// log. Modifications append a fresh record and repoint the id index; the old
/// bytes become dead weight until the next full import, which is the accepted
/// trade for strictly sequential writes.
pub struct ObjectLog<T> {
    log: Vec<u8>,
    index: BTreeMap<Id, Slot>,
    _marker: PhantomData<T>,
}

#[derive(Debug, Copy, Clone)]
struct Slot {
    offset: u64,
    // 0 encodes "no version on the source object".
    version: u32,
    deleted: bool,
}

pub enum PutOutcome<T> {
    Inserted,
    Replaced(T),
    /// The stored record already carries this (id, version); nothing changed.
    Unchanged,
}

impl<T: Record> ObjectLog<T> {
    pub fn new() -> Self {
        Self {
            log: Vec::new(),
            index: BTreeMap::new(),
            _marker: PhantomData,
        }
    }

    pub fn put(&mut self, record: &T) -> PutOutcome<T> {
        let id = record.id();
        let version = record.version().unwrap_or(0);

        let previous = match self.index.get(&id) {
            Some(slot) if !slot.deleted => {
                if version != 0 && slot.version == version {
                    return PutOutcome::Unchanged;
                }
                Some(self.decode_at(slot.offset))
            }
            _ => None,
        };

        let offset = self.log.len() as u64;
        let mut buf = Vec::new();
        record.encode(&mut buf);
        self.log
            .write_u32::<LittleEndian>(buf.len() as u32)
            .expect("writing to a Vec cannot fail");
        self.log.extend_from_slice(&buf);

        self.index.insert(
            id,
            Slot {
                offset,
                version,
                deleted: false,
            },
        );

        match previous {
            Some(old) => PutOutcome::Replaced(old),
            None => PutOutcome::Inserted,
        }
    }

    pub fn get(&self, id: Id) -> Option<T> {
        match self.index.get(&id) {
            Some(slot) if !slot.deleted => Some(self.decode_at(slot.offset)),
            _ => None,
        }
    }

    /// Tombstone the record, returning its last live payload so the caller
    /// can unlink reverse entries derived from it.
    pub fn delete(&mut self, id: Id) -> Option<T> {
        match self.index.get_mut(&id) {
            Some(slot) if !slot.deleted => {
                slot.deleted = true;
                let offset = slot.offset;
                Some(self.decode_at(offset))
            }
            _ => None,
        }
    }

    fn decode_at(&self, offset: u64) -> T {
        let mut r = &self.log[offset as usize..];
        let len = r.read_u32::<LittleEndian>().expect("log record header") as usize;
        T::decode(&r[..len]).expect("log record payload")
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u64::<LittleEndian>(self.log.len() as u64)?;
        w.write_all(&self.log)?;
        w.write_u64::<LittleEndian>(self.index.len() as u64)?;
        for (id, slot) in &self.index {
            w.write_i64::<LittleEndian>(*id)?;
            w.write_u64::<LittleEndian>(slot.offset)?;
            w.write_u32::<LittleEndian>(slot.version)?;
            w.write_u8(slot.deleted as u8)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let log_len = r.read_u64::<LittleEndian>()? as usize;
        let mut log = vec![0u8; log_len];
        r.read_exact(&mut log)?;

        let entries = r.read_u64::<LittleEndian>()?;
        let mut index = BTreeMap::new();
        for _ in 0..entries {
            let id = r.read_i64::<LittleEndian>()?;
            let offset = r.read_u64::<LittleEndian>()?;
            let version = r.read_u32::<LittleEndian>()?;
            let deleted = r.read_u8()? != 0;
            index.insert(
                id,
                Slot {
                    offset,
                    version,
                    deleted,
                },
            );
        }
        Ok(Self {
            log,
            index,
            _marker: PhantomData,
        })
    }
}

/// Anything storable in an ObjectLog: it knows its id and version and can
/// encode itself into / decode itself from a flat byte record.
pub trait Record: Sized {
    fn id(&self) -> Id;
    fn version(&self) -> Option<u32>;
    fn encode(&self, buf: &mut Vec<u8>);
    fn decode(bytes: &[u8]) -> std::io::Result<Self>;
}

fn corrupt(what: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, what)
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.write_u32::<LittleEndian>(s.len() as u32).unwrap();
    buf.extend_from_slice(s.as_bytes());
}

fn read_string(r: &mut &[u8]) -> std::io::Result<String> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if r.len() < len {
        return Err(corrupt("string overruns record"));
    }
    let rest = *r;
    let (head, tail) = rest.split_at(len);
    let s = std::str::from_utf8(head)
        .map_err(|_| corrupt("string is not UTF-8"))?
        .to_string();
    *r = tail;
    Ok(s)
}

fn write_tags(buf: &mut Vec<u8>, tags: &TagMap) {
    buf.write_u32::<LittleEndian>(tags.len() as u32).unwrap();
    for (k, v) in tags.iter() {
        write_string(buf, k);
        write_string(buf, v);
    }
}

fn read_tags(r: &mut &[u8]) -> std::io::Result<TagMap> {
    let count = r.read_u32::<LittleEndian>()?;
    let mut tags = TagMap::new();
    for _ in 0..count {
        let k = read_string(r)?;
        let v = read_string(r)?;
        tags.insert(k, v);
    }
    Ok(tags)
}

const META_VERSION: u8 = 1 << 0;
const META_TIMESTAMP: u8 = 1 << 1;
const META_CHANGESET: u8 = 1 << 2;
const META_UID: u8 = 1 << 3;
const META_USER: u8 = 1 << 4;

fn write_meta(buf: &mut Vec<u8>, meta: &Metadata) {
    let mut flags = 0u8;
    if meta.version.is_some() {
        flags |= META_VERSION;
    }
    if meta.timestamp.is_some() {
        flags |= META_TIMESTAMP;
    }
    if meta.changeset.is_some() {
        flags |= META_CHANGESET;
    }
    if meta.uid.is_some() {
        flags |= META_UID;
    }
    if meta.user.is_some() {
        flags |= META_USER;
    }
    buf.push(flags);
    if let Some(v) = meta.version {
        buf.write_u32::<LittleEndian>(v).unwrap();
    }
    if let Some(t) = meta.timestamp {
        buf.write_i64::<LittleEndian>(t).unwrap();
    }
    if let Some(c) = meta.changeset {
        buf.write_i64::<LittleEndian>(c).unwrap();
    }
    if let Some(u) = meta.uid {
        buf.write_i64::<LittleEndian>(u).unwrap();
    }
    if let Some(u) = &meta.user {
        write_string(buf, u);
    }
}

fn read_meta(r: &mut &[u8]) -> std::io::Result<Metadata> {
    let flags = r.read_u8()?;
    let mut meta = Metadata::default();
    if flags & META_VERSION != 0 {
        meta.version = Some(r.read_u32::<LittleEndian>()?);
    }
    if flags & META_TIMESTAMP != 0 {
        meta.timestamp = Some(r.read_i64::<LittleEndian>()?);
    }
    if flags & META_CHANGESET != 0 {
        meta.changeset = Some(r.read_i64::<LittleEndian>()?);
    }
    if flags & META_UID != 0 {
        meta.uid = Some(r.read_i64::<LittleEndian>()?);
    }
    if flags & META_USER != 0 {
        meta.user = Some(read_string(r)?);
    }
    Ok(meta)
}

impl Record for Way {
    fn id(&self) -> Id {
        self.id
    }

    fn version(&self) -> Option<u32> {
        self.meta.version
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.write_i64::<LittleEndian>(self.id).unwrap();
        write_meta(buf, &self.meta);
        write_tags(buf, &self.tags);
        buf.write_u32::<LittleEndian>(self.refs.len() as u32)
            .unwrap();
        for r in &self.refs {
            buf.write_i64::<LittleEndian>(*r).unwrap();
        }
    }

    fn decode(bytes: &[u8]) -> std::io::Result<Self> {
        let mut r = bytes;
        let id = r.read_i64::<LittleEndian>()?;
        let meta = read_meta(&mut r)?;
        let tags = read_tags(&mut r)?;
        let count = r.read_u32::<LittleEndian>()?;
        let mut refs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            refs.push(r.read_i64::<LittleEndian>()?);
        }
        Ok(Way {
            id,
            tags,
            refs,
            meta,
        })
    }
}

impl Record for Relation {
    fn id(&self) -> Id {
        self.id
    }

    fn version(&self) -> Option<u32> {
        self.meta.version
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.write_i64::<LittleEndian>(self.id).unwrap();
        write_meta(buf, &self.meta);
        write_tags(buf, &self.tags);
        buf.write_u32::<LittleEndian>(self.members.len() as u32)
            .unwrap();
        for member in &self.members {
            let kind = match member.kind {
                ObjectType::Node => 0u8,
                ObjectType::Way => 1,
                ObjectType::Relation => 2,
            };
            buf.push(kind);
            buf.write_i64::<LittleEndian>(member.id).unwrap();
            write_string(buf, &member.role);
        }
    }

    fn decode(bytes: &[u8]) -> std::io::Result<Self> {
        let mut r = bytes;
        let id = r.read_i64::<LittleEndian>()?;
        let meta = read_meta(&mut r)?;
        let tags = read_tags(&mut r)?;
        let count = r.read_u32::<LittleEndian>()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let kind = match r.read_u8()? {
                0 => ObjectType::Node,
                1 => ObjectType::Way,
                2 => ObjectType::Relation,
                _ => return Err(corrupt("unknown member kind")),
            };
            let id = r.read_i64::<LittleEndian>()?;
            let role = read_string(&mut r)?;
            members.push(Member { kind, id, role });
        }
        Ok(Relation {
            id,
            tags,
            members,
            meta,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn way(id: Id, version: Option<u32>, refs: Vec<Id>) -> Way {
        Way {
            id,
            tags: [("highway", "residential"), ("name", "Mill Road")]
                .into_iter()
                .collect(),
            refs,
            meta: Metadata {
                version,
                ..Metadata::default()
            },
        }
    }

    #[test]
    fn put_is_idempotent_on_id_and_version() {
        let mut log = ObjectLog::<Way>::new();

        assert!(matches!(log.put(&way(1, Some(3), vec![10, 11])), PutOutcome::Inserted));
        let before = log.log.len();

        // Same (id, version): the log does not grow.
        assert!(matches!(log.put(&way(1, Some(3), vec![10, 11])), PutOutcome::Unchanged));
        assert_eq!(log.log.len(), before);

        // Bumped version: old payload is handed back.
        match log.put(&way(1, Some(4), vec![10, 12])) {
            PutOutcome::Replaced(old) => assert_eq!(old.refs, vec![10, 11]),
            _ => panic!("expected replacement"),
        }
        assert_eq!(log.get(1).unwrap().refs, vec![10, 12]);
    }

    #[test]
    fn unversioned_puts_always_replace() {
        let mut log = ObjectLog::<Way>::new();
        log.put(&way(1, None, vec![10]));
        assert!(matches!(
            log.put(&way(1, None, vec![11])),
            PutOutcome::Replaced(_)
        ));
        assert_eq!(log.get(1).unwrap().refs, vec![11]);
    }

    #[test]
    fn delete_tombstones_and_returns_last_payload() {
        let mut log = ObjectLog::<Way>::new();
        log.put(&way(1, Some(1), vec![10, 11]));

        let old = log.delete(1).unwrap();
        assert_eq!(old.refs, vec![10, 11]);
        assert!(log.get(1).is_none());
        assert!(log.delete(1).is_none());
    }

    #[test]
    fn relation_records_round_trip() {
        let relation = Relation {
            id: -7,
            tags: [("type", "multipolygon")].into_iter().collect(),
            members: vec![
                Member {
                    kind: ObjectType::Way,
                    id: 100,
                    role: "outer".to_string(),
                },
                Member {
                    kind: ObjectType::Node,
                    id: 4,
                    role: String::new(),
                },
            ],
            meta: Metadata {
                version: Some(9),
                timestamp: Some(1_700_000_000),
                user: Some("mapper".to_string()),
                ..Metadata::default()
            },
        };

        let mut buf = Vec::new();
        relation.encode(&mut buf);
        assert_eq!(Relation::decode(&buf).unwrap(), relation);
    }

    #[test]
    fn log_serialization_round_trips() {
        let mut log = ObjectLog::<Way>::new();
        log.put(&way(1, Some(1), vec![10, 11]));
        log.put(&way(2, Some(5), vec![11, 12]));
        log.delete(1);

        let mut buf = Vec::new();
        log.write_to(&mut buf).unwrap();
        let restored = ObjectLog::<Way>::read_from(&mut buf.as_slice()).unwrap();

        assert!(restored.get(1).is_none());
        assert_eq!(restored.get(2).unwrap().refs, vec![11, 12]);
    }
}
