use super::{Error, Middle, Mode};
use crate::node_store::NodeStore;
use crate::object_log::ObjectLog;
use crate::reverse_index::ReverseIndex;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

// On-disk layout: header, node store, way log, relation log, then the four
// reverse indexes. Every section is written from ordered containers, so the
// same store contents always produce the same bytes.
const MAGIC: [u8; 8] = *b"OFLEXMID";
const FORMAT_VERSION: u32 = 1;

pub fn write<W: Write>(middle: &Middle, w: &mut W) -> Result<(), Error> {
    w.write_all(&MAGIC)?;
    w.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    w.write_u8(match middle.mode {
        Mode::Import => 0,
        Mode::Update => 1,
    })?;

    middle.nodes.write_to(w)?;
    middle.ways.write_to(w)?;
    middle.relations.write_to(w)?;
    middle.node_ways.write_to(w)?;
    middle.node_relations.write_to(w)?;
    middle.way_relations.write_to(w)?;
    middle.relation_relations.write_to(w)?;
    Ok(())
}

pub fn read<R: Read>(r: &mut R) -> Result<Middle, Error> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::BadMagic { found: magic });
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let mode = match r.read_u8()? {
        0 => Mode::Import,
        1 => Mode::Update,
        _ => return Err(Error::Corrupt("unknown mode byte")),
    };

    Ok(Middle {
        mode,
        nodes: NodeStore::read_from(r)?,
        ways: ObjectLog::read_from(r)?,
        relations: ObjectLog::read_from(r)?,
        node_ways: ReverseIndex::read_from(r)?,
        node_relations: ReverseIndex::read_from(r)?,
        way_relations: ReverseIndex::read_from(r)?,
        relation_relations: ReverseIndex::read_from(r)?,
    })
}
