use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail, ensure};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapOptions};

use crate::chunk::{self, CHUNK_HEADER_LEN, Tag, V5_XOR_KEY};
use crate::index::DirEntry;

/// Memory-mapped `.001` data file. Bytes are de-obfuscated on read, so
/// slices handed out are always owned copies.
#[derive(Debug)]
pub struct DataArchive {
    path: PathBuf,
    mmap: Mmap,
    key: u8,
    room_offsets: BTreeMap<u8, u32>,
}

impl DataArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_key(path, V5_XOR_KEY)
    }

    pub fn open_with_key<P: AsRef<Path>>(path: P, key: u8) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening data file at {}", path_buf.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping data file {}", path_buf.display()))?;

        let mut archive = DataArchive {
            path: path_buf,
            mmap,
            key,
            room_offsets: BTreeMap::new(),
        };
        archive.room_offsets = archive
            .parse_room_offsets()
            .with_context(|| format!("reading LOFF table of {}", archive.path.display()))?;
        Ok(archive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn room_offsets(&self) -> &BTreeMap<u8, u32> {
        &self.room_offsets
    }

    fn read_decoded(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| anyhow!("read at {offset} overflows"))?;
        ensure!(
            end <= self.mmap.len(),
            "short read: wanted {len} bytes at {offset}, file has {}",
            self.mmap.len()
        );
        let mut bytes = self.mmap[offset..end].to_vec();
        chunk::xor_in_place(&mut bytes, self.key);
        Ok(bytes)
    }

    fn read_block_header(&self, offset: usize) -> Result<(Tag, usize)> {
        let header = self.read_decoded(offset, CHUNK_HEADER_LEN)?;
        chunk::read_header(&header, 0)
    }

    fn parse_room_offsets(&self) -> Result<BTreeMap<u8, u32>> {
        let (tag, _) = self.read_block_header(0)?;
        ensure!(tag == chunk::LECF, "data file starts with {tag}, expected LECF");
        let (tag, size) = self.read_block_header(CHUNK_HEADER_LEN)?;
        ensure!(tag == chunk::LOFF, "LECF starts with {tag}, expected LOFF");
        let payload = self.read_decoded(
            CHUNK_HEADER_LEN * 2,
            size - CHUNK_HEADER_LEN,
        )?;
        ensure!(!payload.is_empty(), "empty LOFF block");

        let count = payload[0] as usize;
        ensure!(
            payload.len() >= 1 + count * 5,
            "LOFF declares {count} rooms but holds {} bytes",
            payload.len()
        );
        let mut offsets = BTreeMap::new();
        for i in 0..count {
            let base = 1 + i * 5;
            let room = payload[base];
            let offset = LittleEndian::read_u32(&payload[base + 1..base + 5]);
            offsets.insert(room, offset);
        }
        Ok(offsets)
    }

    /// Reads the room block for `room`, header included.
    pub fn read_room(&self, room: u8) -> Result<Vec<u8>> {
        self.read_block(room, 0, chunk::ROOM)
    }

    /// Reads a resource block located through an index directory entry,
    /// checking that the block carries `expected`.
    pub fn read_resource(&self, entry: DirEntry, expected: Tag) -> Result<Vec<u8>> {
        self.read_block(entry.room, entry.offset, expected)
    }

    fn read_block(&self, room: u8, offset: u32, expected: Tag) -> Result<Vec<u8>> {
        let Some(&room_offset) = self.room_offsets.get(&room) else {
            bail!("room {room} has no LOFF entry");
        };
        let start = room_offset as usize + offset as usize;
        let (tag, size) = self.read_block_header(start)?;
        ensure!(
            tag == expected,
            "expected {expected} at {start} (room {room} + {offset}), found {tag}"
        );
        let bytes = self.read_decoded(start, size)?;
        debug_assert_eq!(BigEndian::read_u32(&bytes[4..8]) as usize, size);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexFile;
    use crate::writer::GameWriter;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn reads_scripts_and_rooms_through_the_index() {
        let mut game = GameWriter::new();
        game.add_room(2, "dock", 640, 144, &[]);
        game.add_script(2, 7, &[0x80, 0xA0]);
        game.add_sound(2, 1, b"fake-sound");
        let (index_bytes, data_bytes) = game.finish().unwrap();

        let index_file = write_temp(&index_bytes);
        let data_file = write_temp(&data_bytes);
        let index = IndexFile::open(index_file.path()).unwrap();
        let archive = DataArchive::open(data_file.path()).unwrap();

        assert!(archive.room_offsets().contains_key(&2));
        let script = archive
            .read_resource(index.scripts.get(7).unwrap(), chunk::SCRP)
            .unwrap();
        assert_eq!(&script[..4], b"SCRP");
        assert_eq!(&script[8..], &[0x80, 0xA0]);

        let room = archive.read_room(2).unwrap();
        let rmhd = chunk::expect_chunk(&room[8..], chunk::RMHD).unwrap();
        assert_eq!(LittleEndian::read_u16(&rmhd.payload()[0..2]), 640);

        let wrong = archive.read_resource(index.sounds.get(1).unwrap(), chunk::SCRP);
        assert!(wrong.is_err());
    }

    #[test]
    fn rejects_files_without_loff() {
        let mut bytes = chunk::build_chunk(chunk::LECF, &chunk::build_chunk(chunk::ROOM, &[]));
        chunk::xor_in_place(&mut bytes, V5_XOR_KEY);
        let file = write_temp(&bytes);
        assert!(DataArchive::open(file.path()).is_err());
    }
}
