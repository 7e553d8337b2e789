use std::collections::BTreeMap;

use anyhow::{Context, Result, bail, ensure};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;

use crate::chunk::{self, CHUNK_HEADER_LEN, Chunk};

/// Default verb slot in an object's `VERB` table.
pub const DEFAULT_VERB: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleEntry {
    /// 1-based cycle slot.
    pub slot: u8,
    pub delay: u16,
    pub flags: u16,
    pub start: u8,
    pub end: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoxPoint {
    pub x: i16,
    pub y: i16,
}

/// Walk box quad in clockwise order starting at the upper left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WalkBox {
    pub ul: BoxPoint,
    pub ur: BoxPoint,
    pub lr: BoxPoint,
    pub ll: BoxPoint,
    pub mask: u8,
    pub flags: u8,
    pub scale: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectCode {
    pub id: u16,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub parent: u8,
    pub parent_state: u8,
    pub walk_x: i16,
    pub walk_y: i16,
    pub actor_dir: u8,
    /// `(verb, entry point)` where the entry point is an offset into `code`.
    pub verbs: Vec<(u8, u16)>,
    pub name: String,
    /// The complete `OBCD` block.
    #[serde(skip)]
    pub code: Vec<u8>,
}

impl ObjectCode {
    pub fn verb_entry(&self, verb: u8) -> Option<u16> {
        self.verbs
            .iter()
            .find(|(v, _)| *v == verb)
            .or_else(|| self.verbs.iter().find(|(v, _)| *v == DEFAULT_VERB))
            .map(|(_, entry)| *entry)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RoomData {
    pub width: u16,
    pub height: u16,
    pub num_objects: u16,
    #[serde(skip)]
    pub palette: Option<Vec<u8>>,
    pub cycles: Vec<CycleEntry>,
    pub boxes: Vec<WalkBox>,
    #[serde(skip)]
    pub local_scripts: BTreeMap<u8, Vec<u8>>,
    #[serde(skip)]
    pub entry_code: Option<Vec<u8>>,
    #[serde(skip)]
    pub exit_code: Option<Vec<u8>>,
    pub objects: Vec<ObjectCode>,
}

impl RoomData {
    /// Parses a complete `ROOM` block (header included).
    pub fn parse(block: &[u8]) -> Result<Self> {
        let room = chunk::parse_chunk(block, 0)?;
        ensure!(room.tag == chunk::ROOM, "expected ROOM block, found {}", room.tag);

        let mut data = RoomData::default();
        let mut saw_header = false;
        for child in room.children() {
            let child = child?;
            let payload = child.payload();
            match child.tag {
                chunk::RMHD => {
                    ensure!(payload.len() >= 6, "RMHD block too short");
                    data.width = LittleEndian::read_u16(&payload[0..2]);
                    data.height = LittleEndian::read_u16(&payload[2..4]);
                    data.num_objects = LittleEndian::read_u16(&payload[4..6]);
                    saw_header = true;
                }
                chunk::CLUT => {
                    ensure!(payload.len() >= 768, "CLUT block holds {} bytes", payload.len());
                    data.palette = Some(payload[..768].to_vec());
                }
                chunk::CYCL => data.cycles = parse_cycles(payload)?,
                chunk::BOXD => data.boxes = parse_boxes(payload)?,
                chunk::LSCR => {
                    ensure!(!payload.is_empty(), "empty LSCR block");
                    data.local_scripts
                        .insert(payload[0], payload[1..].to_vec());
                }
                chunk::ENCD => data.entry_code = Some(payload.to_vec()),
                chunk::EXCD => data.exit_code = Some(payload.to_vec()),
                chunk::OBCD => {
                    let object = parse_object(&child)
                        .with_context(|| format!("parsing OBCD at {}", child.offset))?;
                    data.objects.push(object);
                }
                _ => {}
            }
        }
        ensure!(saw_header, "ROOM block has no RMHD");
        Ok(data)
    }
}

fn parse_cycles(payload: &[u8]) -> Result<Vec<CycleEntry>> {
    let mut cycles = Vec::new();
    let mut pos = 0;
    loop {
        let Some(&slot) = payload.get(pos) else {
            bail!("CYCL block is not terminated");
        };
        pos += 1;
        if slot == 0 {
            break;
        }
        ensure!((1..=16).contains(&slot), "invalid color cycle slot {slot}");
        ensure!(pos + 8 <= payload.len(), "CYCL entry {slot} truncated");
        let freq = BigEndian::read_u16(&payload[pos + 2..pos + 4]);
        let flags = BigEndian::read_u16(&payload[pos + 4..pos + 6]);
        let delay = if freq == 0 { 0 } else { (16384 / freq as u32) as u16 };
        cycles.push(CycleEntry {
            slot,
            delay,
            flags,
            start: payload[pos + 6],
            end: payload[pos + 7],
        });
        pos += 8;
    }
    Ok(cycles)
}

fn parse_boxes(payload: &[u8]) -> Result<Vec<WalkBox>> {
    const BOX_LEN: usize = 20;
    ensure!(payload.len() >= 2, "BOXD block too short");
    let count = LittleEndian::read_u16(&payload[..2]) as usize;
    ensure!(
        payload.len() >= 2 + count * BOX_LEN,
        "BOXD declares {count} boxes but holds {} bytes",
        payload.len()
    );
    let mut boxes = Vec::with_capacity(count);
    for i in 0..count {
        let b = &payload[2 + i * BOX_LEN..2 + (i + 1) * BOX_LEN];
        let point = |at: usize| BoxPoint {
            x: LittleEndian::read_i16(&b[at..at + 2]),
            y: LittleEndian::read_i16(&b[at + 2..at + 4]),
        };
        boxes.push(WalkBox {
            ul: point(0),
            ur: point(4),
            lr: point(8),
            ll: point(12),
            mask: b[16],
            flags: b[17],
            scale: LittleEndian::read_u16(&b[18..20]),
        });
    }
    Ok(boxes)
}

fn parse_object(block: &Chunk<'_>) -> Result<ObjectCode> {
    let header = block
        .children()
        .find(|c| matches!(c, Ok(c) if c.tag == chunk::CDHD))
        .transpose()?;
    let Some(header) = header else {
        bail!("OBCD without CDHD");
    };
    let h = header.payload();
    ensure!(h.len() >= 13, "CDHD block too short ({} bytes)", h.len());

    let mut object = ObjectCode {
        id: LittleEndian::read_u16(&h[0..2]),
        x: h[2] as i32 * 8,
        y: h[3] as i32 * 8,
        width: h[4] as i32 * 8,
        height: h[5] as i32 * 8,
        parent_state: h[6],
        parent: h[7],
        walk_x: LittleEndian::read_i16(&h[8..10]),
        walk_y: LittleEndian::read_i16(&h[10..12]),
        actor_dir: h[12],
        verbs: Vec::new(),
        name: String::new(),
        code: block.raw.to_vec(),
    };

    for child in block.children() {
        let child = child?;
        match child.tag {
            chunk::VERB => {
                let base = CHUNK_HEADER_LEN + child.offset;
                let table = child.payload();
                let mut pos = 0;
                while let Some(&verb) = table.get(pos) {
                    if verb == 0 {
                        break;
                    }
                    ensure!(pos + 3 <= table.len(), "VERB table truncated");
                    let rel = LittleEndian::read_u16(&table[pos + 1..pos + 3]) as usize;
                    let entry = base + rel;
                    ensure!(
                        entry < block.raw.len(),
                        "verb {verb} entry {entry} outside object code"
                    );
                    object.verbs.push((verb, entry as u16));
                    pos += 3;
                }
            }
            chunk::OBNA => {
                let raw = child.payload();
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                object.name = String::from_utf8_lossy(&raw[..end]).into_owned();
            }
            _ => {}
        }
    }
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ObjectSpec, cycle_block, local_script_block, object_block, room_block};

    #[test]
    fn parses_objects_scripts_and_cycles() {
        let object = ObjectSpec {
            id: 17,
            x: 16,
            y: 24,
            width: 32,
            height: 8,
            walk_x: 40,
            walk_y: 100,
            actor_dir: 2,
            name: "door".into(),
            verbs: vec![(3, vec![0x80, 0xA0]), (DEFAULT_VERB, vec![0xA0])],
            ..ObjectSpec::default()
        };
        let block = room_block(
            320,
            200,
            &[
                cycle_block(&[(1, 0x100, 2, 16, 31)]),
                local_script_block(201, &[0x80, 0xA0]),
                object_block(&object),
            ],
        );
        let room = RoomData::parse(&block).unwrap();

        assert_eq!((room.width, room.height, room.num_objects), (320, 200, 1));
        assert_eq!(room.cycles[0].delay, 64);
        assert_eq!(room.cycles[0].flags, 2);
        assert_eq!(room.local_scripts.get(&201).unwrap(), &vec![0x80, 0xA0]);

        let obj = &room.objects[0];
        assert_eq!(obj.id, 17);
        assert_eq!((obj.x, obj.y, obj.width, obj.height), (16, 24, 32, 8));
        assert_eq!(obj.name, "door");
        let entry = obj.verb_entry(3).unwrap() as usize;
        assert_eq!(&obj.code[entry..entry + 2], &[0x80, 0xA0]);
        let fallback = obj.verb_entry(9).unwrap() as usize;
        assert_eq!(obj.code[fallback], 0xA0);
    }

    #[test]
    fn rejects_unterminated_cycles() {
        assert!(parse_cycles(&[1, 0, 0, 1, 0, 0, 0, 4, 8]).is_err());
    }
}
