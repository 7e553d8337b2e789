use std::fmt;

use anyhow::{Result, bail, ensure};
use byteorder::{BigEndian, ByteOrder};

/// Every block starts with a four byte tag and a big-endian size that
/// includes the header itself.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Key used by the v5 `.000`/`.001` files.
pub const V5_XOR_KEY: u8 = 0x69;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Tag(*bytes)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        Ok(())
    }
}

pub const RNAM: Tag = Tag::new(b"RNAM");
pub const MAXS: Tag = Tag::new(b"MAXS");
pub const DROO: Tag = Tag::new(b"DROO");
pub const DSCR: Tag = Tag::new(b"DSCR");
pub const DSOU: Tag = Tag::new(b"DSOU");
pub const DCOS: Tag = Tag::new(b"DCOS");
pub const DCHR: Tag = Tag::new(b"DCHR");
pub const DOBJ: Tag = Tag::new(b"DOBJ");
pub const LECF: Tag = Tag::new(b"LECF");
pub const LOFF: Tag = Tag::new(b"LOFF");
pub const LFLF: Tag = Tag::new(b"LFLF");
pub const ROOM: Tag = Tag::new(b"ROOM");
pub const RMHD: Tag = Tag::new(b"RMHD");
pub const CLUT: Tag = Tag::new(b"CLUT");
pub const CYCL: Tag = Tag::new(b"CYCL");
pub const BOXD: Tag = Tag::new(b"BOXD");
pub const LSCR: Tag = Tag::new(b"LSCR");
pub const ENCD: Tag = Tag::new(b"ENCD");
pub const EXCD: Tag = Tag::new(b"EXCD");
pub const OBCD: Tag = Tag::new(b"OBCD");
pub const CDHD: Tag = Tag::new(b"CDHD");
pub const VERB: Tag = Tag::new(b"VERB");
pub const OBNA: Tag = Tag::new(b"OBNA");
pub const SCRP: Tag = Tag::new(b"SCRP");
pub const SOUN: Tag = Tag::new(b"SOUN");
pub const COST: Tag = Tag::new(b"COST");
pub const CHAR: Tag = Tag::new(b"CHAR");
pub const AWIZ: Tag = Tag::new(b"AWIZ");
pub const WIZH: Tag = Tag::new(b"WIZH");
pub const WIZD: Tag = Tag::new(b"WIZD");
pub const RGBS: Tag = Tag::new(b"RGBS");
pub const SPOT: Tag = Tag::new(b"SPOT");
pub const RMAP: Tag = Tag::new(b"RMAP");
pub const TRNS: Tag = Tag::new(b"TRNS");

/// A block located inside a larger buffer.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub tag: Tag,
    /// Offset of the header within the buffer that was scanned.
    pub offset: usize,
    /// Header plus payload.
    pub raw: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn payload(&self) -> &'a [u8] {
        &self.raw[CHUNK_HEADER_LEN..]
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == CHUNK_HEADER_LEN
    }

    /// Children of this block, for container tags such as `ROOM` or `OBCD`.
    pub fn children(&self) -> ChunkIter<'a> {
        ChunkIter::new(self.payload())
    }
}

pub fn read_header(bytes: &[u8], offset: usize) -> Result<(Tag, usize)> {
    ensure!(
        offset + CHUNK_HEADER_LEN <= bytes.len(),
        "block header at {offset} runs past end of buffer ({} bytes)",
        bytes.len()
    );
    let tag = Tag(bytes[offset..offset + 4].try_into()?);
    let size = BigEndian::read_u32(&bytes[offset + 4..offset + 8]) as usize;
    if size < CHUNK_HEADER_LEN {
        bail!("({tag}) illegal block length {size} at offset {offset}");
    }
    Ok((tag, size))
}

pub fn parse_chunk(bytes: &[u8], offset: usize) -> Result<Chunk<'_>> {
    let (tag, size) = read_header(bytes, offset)?;
    let end = offset
        .checked_add(size)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "({tag}) block at {offset} claims {size} bytes but only {} remain",
                bytes.len() - offset
            )
        })?;
    Ok(Chunk {
        tag,
        offset,
        raw: &bytes[offset..end],
    })
}

/// Walks sibling blocks. Stops after the first error.
pub struct ChunkIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> ChunkIter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ChunkIter {
            bytes,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.bytes.len() {
            return None;
        }
        match parse_chunk(self.bytes, self.pos) {
            Ok(chunk) => {
                self.pos += chunk.len();
                Some(Ok(chunk))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

pub fn chunks(bytes: &[u8]) -> ChunkIter<'_> {
    ChunkIter::new(bytes)
}

pub fn find_chunk<'a>(bytes: &'a [u8], tag: Tag) -> Result<Option<Chunk<'a>>> {
    for chunk in chunks(bytes) {
        let chunk = chunk?;
        if chunk.tag == tag {
            return Ok(Some(chunk));
        }
    }
    Ok(None)
}

pub fn expect_chunk<'a>(bytes: &'a [u8], tag: Tag) -> Result<Chunk<'a>> {
    match find_chunk(bytes, tag)? {
        Some(chunk) => Ok(chunk),
        None => bail!("required block {tag} not found"),
    }
}

pub fn xor_in_place(buf: &mut [u8], key: u8) {
    if key == 0 {
        return;
    }
    for byte in buf {
        *byte ^= key;
    }
}

/// Builds a block with a correct header. Used by the packers and by tests
/// that need synthetic game data.
pub fn build_chunk(tag: Tag, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + CHUNK_HEADER_LEN);
    out.extend_from_slice(&tag.0);
    out.extend_from_slice(&((payload.len() + CHUNK_HEADER_LEN) as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_sibling_blocks() {
        let mut data = build_chunk(RMHD, &[1, 0, 2, 0, 3, 0]);
        data.extend(build_chunk(CLUT, &[9; 4]));
        let tags: Vec<Tag> = chunks(&data).map(|c| c.unwrap().tag).collect();
        assert_eq!(tags, vec![RMHD, CLUT]);

        let clut = expect_chunk(&data, CLUT).unwrap();
        assert_eq!(clut.offset, 14);
        assert_eq!(clut.payload(), &[9, 9, 9, 9]);
    }

    #[test]
    fn rejects_short_and_oversized_blocks() {
        let mut data = Vec::new();
        data.extend_from_slice(b"ABCD");
        data.extend_from_slice(&4u32.to_be_bytes());
        assert!(parse_chunk(&data, 0).is_err());

        let mut data = Vec::new();
        data.extend_from_slice(b"ABCD");
        data.extend_from_slice(&64u32.to_be_bytes());
        assert!(parse_chunk(&data, 0).is_err());
        assert!(find_chunk(&data, CLUT).is_err());
    }

    #[test]
    fn tag_display_escapes_binary() {
        assert_eq!(ROOM.to_string(), "ROOM");
        assert_eq!(Tag([b'A', 0, b'B', 0xFF]).to_string(), "A\\x00B\\xFF");
    }
}
