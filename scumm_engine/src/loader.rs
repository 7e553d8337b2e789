use std::path::Path;

use anyhow::{Context, Result};
use scumm_formats::chunk::{self, CHUNK_HEADER_LEN, Tag};
use scumm_formats::{DataArchive, Directory, IndexFile};

use crate::resources::{ResourceKind, ResourceSource};

/// Resource source over an index file and its memory-mapped data file.
#[derive(Debug)]
pub struct ArchiveSource {
    index: IndexFile,
    archive: DataArchive,
}

impl ArchiveSource {
    pub fn open(index_path: &Path, data_path: &Path) -> Result<Self> {
        let index = IndexFile::open(index_path)?;
        let archive = DataArchive::open(data_path)?;
        Ok(ArchiveSource { index, archive })
    }

    pub fn index(&self) -> &IndexFile {
        &self.index
    }

    fn read_listed(&self, dir: &Directory, id: u16, tag: Tag) -> Result<Option<Vec<u8>>> {
        let Some(entry) = dir.get(id as usize).filter(|entry| entry.room != 0) else {
            return Ok(None);
        };
        self.archive
            .read_resource(entry, tag)
            .with_context(|| format!("reading {tag} {id} from room {}", entry.room))
            .map(Some)
    }
}

impl ResourceSource for ArchiveSource {
    fn load(&self, kind: ResourceKind, id: u16) -> Result<Option<Vec<u8>>> {
        match kind {
            ResourceKind::Script => {
                let block = self.read_listed(&self.index.scripts, id, chunk::SCRP)?;
                Ok(block.map(|mut bytes| bytes.split_off(CHUNK_HEADER_LEN)))
            }
            ResourceKind::Sound => self.read_listed(&self.index.sounds, id, chunk::SOUN),
            ResourceKind::Costume => self.read_listed(&self.index.costumes, id, chunk::COST),
            ResourceKind::Charset => self.read_listed(&self.index.charsets, id, chunk::CHAR),
            ResourceKind::Room => {
                let Ok(room) = u8::try_from(id) else {
                    return Ok(None);
                };
                if !self.archive.room_offsets().contains_key(&room) {
                    return Ok(None);
                }
                self.archive.read_room(room).map(Some)
            }
            _ => Ok(None),
        }
    }
}
