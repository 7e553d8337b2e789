use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::chunk::{self, Tag, V5_XOR_KEY};

/// Table sizes declared by the `MAXS` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Maxs {
    pub num_variables: u16,
    pub num_bit_variables: u16,
    pub num_local_objects: u16,
    pub num_charsets: u16,
    pub num_inventory: u16,
    pub num_verbs: u16,
    pub num_arrays: u16,
    pub num_global_scripts: u16,
}

impl Default for Maxs {
    fn default() -> Self {
        Maxs {
            num_variables: 800,
            num_bit_variables: 2048,
            num_local_objects: 200,
            num_charsets: 9,
            num_inventory: 80,
            num_verbs: 100,
            num_arrays: 50,
            num_global_scripts: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DirEntry {
    pub room: u8,
    pub offset: u32,
}

/// One of the per-kind `Dxxx` tables mapping a resource number to the room
/// that stores it and the offset of its block inside that room.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Directory {
    pub entries: Vec<DirEntry>,
}

impl Directory {
    pub fn get(&self, id: usize) -> Option<DirEntry> {
        self.entries.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose room is zero are unused slots.
    pub fn present(&self) -> impl Iterator<Item = (usize, DirEntry)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, entry)| entry.room != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ObjectEntry {
    pub owner: u8,
    pub state: u8,
    pub class: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexFile {
    pub maxs: Maxs,
    pub room_names: Vec<(u8, String)>,
    pub rooms: Directory,
    pub scripts: Directory,
    pub sounds: Directory,
    pub costumes: Directory,
    pub charsets: Directory,
    pub objects: Vec<ObjectEntry>,
}

impl IndexFile {
    /// Reads a v5 `.000` file from disk, removing the XOR obfuscation.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut bytes =
            fs::read(path).with_context(|| format!("reading index file {}", path.display()))?;
        chunk::xor_in_place(&mut bytes, V5_XOR_KEY);
        Self::parse(&bytes).with_context(|| format!("parsing index file {}", path.display()))
    }

    /// Parses already decoded index bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut index = IndexFile::default();
        let mut saw_maxs = false;

        for block in chunk::chunks(bytes) {
            let block = block?;
            let payload = block.payload();
            match block.tag {
                chunk::RNAM => index.room_names = parse_room_names(payload)?,
                chunk::MAXS => {
                    index.maxs = parse_maxs(payload)?;
                    saw_maxs = true;
                }
                chunk::DROO => index.rooms = parse_directory(chunk::DROO, payload)?,
                chunk::DSCR => index.scripts = parse_directory(chunk::DSCR, payload)?,
                chunk::DSOU => index.sounds = parse_directory(chunk::DSOU, payload)?,
                chunk::DCOS => index.costumes = parse_directory(chunk::DCOS, payload)?,
                chunk::DCHR => index.charsets = parse_directory(chunk::DCHR, payload)?,
                chunk::DOBJ => index.objects = parse_objects(payload)?,
                other => bail!("unknown block {other} in index file"),
            }
        }

        ensure!(saw_maxs, "index file has no MAXS block");
        if !index.scripts.is_empty() {
            index.maxs.num_global_scripts = index.scripts.len() as u16;
        }
        Ok(index)
    }
}

fn parse_room_names(payload: &[u8]) -> Result<Vec<(u8, String)>> {
    const NAME_LEN: usize = 9;
    let mut names = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let room = payload[pos];
        if room == 0 {
            break;
        }
        pos += 1;
        ensure!(
            pos + NAME_LEN <= payload.len(),
            "RNAM entry for room {room} is truncated"
        );
        let raw: Vec<u8> = payload[pos..pos + NAME_LEN]
            .iter()
            .map(|b| b ^ 0xFF)
            .take_while(|&b| b != 0)
            .collect();
        names.push((room, String::from_utf8_lossy(&raw).into_owned()));
        pos += NAME_LEN;
    }
    Ok(names)
}

fn parse_maxs(payload: &[u8]) -> Result<Maxs> {
    ensure!(payload.len() >= 18, "MAXS block too short ({} bytes)", payload.len());
    let word = |i: usize| LittleEndian::read_u16(&payload[i * 2..i * 2 + 2]);
    Ok(Maxs {
        num_variables: word(0),
        num_bit_variables: word(2),
        num_local_objects: word(3),
        num_charsets: word(5),
        num_inventory: word(8),
        ..Maxs::default()
    })
}

fn parse_directory(tag: Tag, payload: &[u8]) -> Result<Directory> {
    ensure!(payload.len() >= 2, "{tag} block too short");
    let count = LittleEndian::read_u16(&payload[..2]) as usize;
    let needed = 2 + count * 5;
    ensure!(
        payload.len() >= needed,
        "{tag} declares {count} entries but holds {} bytes",
        payload.len()
    );
    let rooms = &payload[2..2 + count];
    let offsets = &payload[2 + count..needed];
    let entries = (0..count)
        .map(|i| DirEntry {
            room: rooms[i],
            offset: LittleEndian::read_u32(&offsets[i * 4..i * 4 + 4]),
        })
        .collect();
    Ok(Directory { entries })
}

fn parse_objects(payload: &[u8]) -> Result<Vec<ObjectEntry>> {
    ensure!(payload.len() >= 2, "DOBJ block too short");
    let count = LittleEndian::read_u16(&payload[..2]) as usize;
    let needed = 2 + count * 5;
    ensure!(
        payload.len() >= needed,
        "DOBJ declares {count} objects but holds {} bytes",
        payload.len()
    );
    let owner_state = &payload[2..2 + count];
    let classes = &payload[2 + count..needed];
    Ok((0..count)
        .map(|i| ObjectEntry {
            owner: owner_state[i] & 0x0F,
            state: owner_state[i] >> 4,
            class: LittleEndian::read_u32(&classes[i * 4..i * 4 + 4]),
        })
        .collect())
}
