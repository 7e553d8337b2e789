//! Assembles v5 index/data file pairs from in-memory resources. Used to
//! build fixtures and by tools that repack extracted content.

use std::collections::BTreeMap;

use anyhow::{Result, ensure};

use crate::chunk::{self, CHUNK_HEADER_LEN, Tag, V5_XOR_KEY, build_chunk};
use crate::index::{Maxs, ObjectEntry};

#[derive(Debug, Clone, Default)]
pub struct ObjectSpec {
    pub id: u16,
    /// Pixel coordinates; stored divided by 8.
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub parent: u8,
    pub parent_state: u8,
    pub walk_x: i16,
    pub walk_y: i16,
    pub actor_dir: u8,
    pub name: String,
    pub verbs: Vec<(u8, Vec<u8>)>,
}

pub fn room_block(width: u16, height: u16, children: &[Vec<u8>]) -> Vec<u8> {
    let num_objects = children
        .iter()
        .filter(|c| c.len() >= 4 && c[..4] == chunk::OBCD.0)
        .count() as u16;
    let mut rmhd = Vec::with_capacity(6);
    rmhd.extend_from_slice(&width.to_le_bytes());
    rmhd.extend_from_slice(&height.to_le_bytes());
    rmhd.extend_from_slice(&num_objects.to_le_bytes());

    let mut payload = build_chunk(chunk::RMHD, &rmhd);
    for child in children {
        payload.extend_from_slice(child);
    }
    build_chunk(chunk::ROOM, &payload)
}

pub fn local_script_block(id: u8, code: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(code.len() + 1);
    payload.push(id);
    payload.extend_from_slice(code);
    build_chunk(chunk::LSCR, &payload)
}

pub fn palette_block(palette: &[u8]) -> Vec<u8> {
    let mut payload = palette.to_vec();
    payload.resize(768, 0);
    build_chunk(chunk::CLUT, &payload)
}

/// Entries are `(slot, frequency, flags, start, end)`.
pub fn cycle_block(entries: &[(u8, u16, u16, u8, u8)]) -> Vec<u8> {
    let mut payload = Vec::new();
    for &(slot, freq, flags, start, end) in entries {
        payload.push(slot);
        payload.extend_from_slice(&[0, 0]);
        payload.extend_from_slice(&freq.to_be_bytes());
        payload.extend_from_slice(&flags.to_be_bytes());
        payload.push(start);
        payload.push(end);
    }
    payload.push(0);
    build_chunk(chunk::CYCL, &payload)
}

pub fn object_block(spec: &ObjectSpec) -> Vec<u8> {
    let mut cdhd = Vec::with_capacity(13);
    cdhd.extend_from_slice(&spec.id.to_le_bytes());
    for v in [spec.x, spec.y, spec.width, spec.height] {
        cdhd.push((v / 8) as u8);
    }
    cdhd.push(spec.parent_state);
    cdhd.push(spec.parent);
    cdhd.extend_from_slice(&spec.walk_x.to_le_bytes());
    cdhd.extend_from_slice(&spec.walk_y.to_le_bytes());
    cdhd.push(spec.actor_dir);

    let table_len = spec.verbs.len() * 3 + 1;
    let mut table = Vec::with_capacity(table_len);
    let mut bodies = Vec::new();
    for (verb, code) in &spec.verbs {
        let offset = (CHUNK_HEADER_LEN + table_len + bodies.len()) as u16;
        table.push(*verb);
        table.extend_from_slice(&offset.to_le_bytes());
        bodies.extend_from_slice(code);
    }
    table.push(0);
    table.extend_from_slice(&bodies);

    let mut name = spec.name.as_bytes().to_vec();
    name.push(0);

    let mut payload = build_chunk(chunk::CDHD, &cdhd);
    payload.extend(build_chunk(chunk::VERB, &table));
    payload.extend(build_chunk(chunk::OBNA, &name));
    build_chunk(chunk::OBCD, &payload)
}

#[derive(Debug, Default)]
struct RoomContents {
    name: String,
    block: Vec<u8>,
    resources: Vec<(Kind, u16, Vec<u8>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Script,
    Sound,
    Costume,
    Charset,
}

impl Kind {
    fn tag(self) -> Tag {
        match self {
            Kind::Script => chunk::SCRP,
            Kind::Sound => chunk::SOUN,
            Kind::Costume => chunk::COST,
            Kind::Charset => chunk::CHAR,
        }
    }
}

#[derive(Debug, Default)]
pub struct GameWriter {
    maxs: Maxs,
    rooms: BTreeMap<u8, RoomContents>,
    objects: BTreeMap<u16, ObjectEntry>,
}

impl GameWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_maxs(&mut self, maxs: Maxs) -> &mut Self {
        self.maxs = maxs;
        self
    }

    pub fn add_room(
        &mut self,
        room: u8,
        name: &str,
        width: u16,
        height: u16,
        children: &[Vec<u8>],
    ) -> &mut Self {
        self.add_room_block(room, name, room_block(width, height, children))
    }

    pub fn add_room_block(&mut self, room: u8, name: &str, block: Vec<u8>) -> &mut Self {
        let entry = self.rooms.entry(room).or_default();
        entry.name = name.to_string();
        entry.block = block;
        self
    }

    pub fn add_script(&mut self, room: u8, id: u16, code: &[u8]) -> &mut Self {
        self.add_resource(room, Kind::Script, id, code)
    }

    pub fn add_sound(&mut self, room: u8, id: u16, data: &[u8]) -> &mut Self {
        self.add_resource(room, Kind::Sound, id, data)
    }

    pub fn add_costume(&mut self, room: u8, id: u16, data: &[u8]) -> &mut Self {
        self.add_resource(room, Kind::Costume, id, data)
    }

    pub fn add_charset(&mut self, room: u8, id: u16, data: &[u8]) -> &mut Self {
        self.add_resource(room, Kind::Charset, id, data)
    }

    fn add_resource(&mut self, room: u8, kind: Kind, id: u16, data: &[u8]) -> &mut Self {
        self.rooms
            .entry(room)
            .or_default()
            .resources
            .push((kind, id, data.to_vec()));
        self
    }

    pub fn set_object(&mut self, id: u16, owner: u8, state: u8, class: u32) -> &mut Self {
        self.objects.insert(id, ObjectEntry { owner, state, class });
        self
    }

    /// Returns `(index, data)` with the XOR obfuscation applied.
    pub fn finish(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        for (room, contents) in &self.rooms {
            ensure!(!contents.block.is_empty(), "room {room} has resources but no ROOM block");
        }

        let loff_len = CHUNK_HEADER_LEN + 1 + self.rooms.len() * 5;
        let mut body = Vec::new();
        let mut room_offsets = Vec::new();
        let mut dirs: BTreeMap<(u8, u16), (u8, u32)> = BTreeMap::new();

        for (&room, contents) in &self.rooms {
            let lflf_start = CHUNK_HEADER_LEN + loff_len + body.len();
            let room_start = lflf_start + CHUNK_HEADER_LEN;
            room_offsets.push((room, room_start as u32));

            let mut lflf = contents.block.clone();
            for (kind, id, data) in &contents.resources {
                // Offsets are relative to the ROOM block, which opens the LFLF.
                dirs.insert((kind_code(*kind), *id), (room, lflf.len() as u32));
                lflf.extend(build_chunk(kind.tag(), data));
            }
            body.extend(build_chunk(chunk::LFLF, &lflf));
        }

        let mut loff = vec![self.rooms.len() as u8];
        for (room, offset) in &room_offsets {
            loff.push(*room);
            loff.extend_from_slice(&offset.to_le_bytes());
        }
        let mut lecf = build_chunk(chunk::LOFF, &loff);
        lecf.extend(body);
        let mut data = build_chunk(chunk::LECF, &lecf);

        let mut index = Vec::new();
        index.extend(build_chunk(chunk::RNAM, &self.room_names()));
        index.extend(build_chunk(chunk::MAXS, &self.maxs_payload()));

        let max_room = self.rooms.keys().next_back().copied().unwrap_or(0) as usize;
        let mut droo = vec![(0u8, 0u32); max_room + 1];
        for room in self.rooms.keys() {
            droo[*room as usize] = (*room, 0);
        }
        index.extend(build_chunk(chunk::DROO, &directory_payload(&droo)));

        for kind in [Kind::Script, Kind::Sound, Kind::Costume, Kind::Charset] {
            let code = kind_code(kind);
            let max_id = dirs
                .keys()
                .filter(|(k, _)| *k == code)
                .map(|(_, id)| *id as usize)
                .max();
            let mut entries = vec![(0u8, 0u32); max_id.map_or(0, |m| m + 1)];
            for ((k, id), entry) in &dirs {
                if *k == code {
                    entries[*id as usize] = *entry;
                }
            }
            let tag = match kind {
                Kind::Script => chunk::DSCR,
                Kind::Sound => chunk::DSOU,
                Kind::Costume => chunk::DCOS,
                Kind::Charset => chunk::DCHR,
            };
            index.extend(build_chunk(tag, &directory_payload(&entries)));
        }
        index.extend(build_chunk(chunk::DOBJ, &self.objects_payload()));

        chunk::xor_in_place(&mut index, V5_XOR_KEY);
        chunk::xor_in_place(&mut data, V5_XOR_KEY);
        Ok((index, data))
    }

    fn room_names(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (room, contents) in &self.rooms {
            out.push(*room);
            let mut name = [0u8; 9];
            for (slot, byte) in name.iter_mut().zip(contents.name.bytes().take(8)) {
                *slot = byte;
            }
            out.extend(name.iter().map(|b| b ^ 0xFF));
        }
        out.push(0);
        out
    }

    fn maxs_payload(&self) -> Vec<u8> {
        let m = &self.maxs;
        let words = [
            m.num_variables,
            0,
            m.num_bit_variables,
            m.num_local_objects,
            m.num_arrays,
            m.num_charsets,
            0,
            0,
            m.num_inventory,
        ];
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn objects_payload(&self) -> Vec<u8> {
        let count = self.objects.keys().next_back().map_or(0, |id| *id as usize + 1);
        let mut owner_state = vec![0u8; count];
        let mut classes = vec![0u32; count];
        for (id, entry) in &self.objects {
            owner_state[*id as usize] = (entry.owner & 0x0F) | (entry.state << 4);
            classes[*id as usize] = entry.class;
        }
        let mut out = (count as u16).to_le_bytes().to_vec();
        out.extend(owner_state);
        for class in classes {
            out.extend_from_slice(&class.to_le_bytes());
        }
        out
    }
}

fn kind_code(kind: Kind) -> u8 {
    kind as u8
}

fn directory_payload(entries: &[(u8, u32)]) -> Vec<u8> {
    let mut out = (entries.len() as u16).to_le_bytes().to_vec();
    out.extend(entries.iter().map(|(room, _)| *room));
    for (_, offset) in entries {
        out.extend_from_slice(&offset.to_le_bytes());
    }
    out
}
