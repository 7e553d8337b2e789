//! Lazily loaded, lockable resource cache with LRU eviction.
//!
//! Buffers are handed out as [`Bytes`], so a caller that keeps a clone
//! keeps the bytes alive even after the cache dropped its entry. Code that
//! wants to observe a reload goes through a [`ResourceHandle`] instead.

use std::collections::BTreeMap;

use bytes::Bytes;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::{FatalError, VmResult};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum ResourceKind {
    Script = 1,
    Sound = 2,
    Costume = 3,
    Room = 4,
    Charset = 5,
    ActorName = 6,
    String = 7,
    Verb = 8,
    Image = 9,
    Inventory = 10,
}

impl ResourceKind {
    /// Kinds backed by the game data files. Everything else is created by
    /// scripts and can never be thrown away.
    pub fn is_purgeable(self) -> bool {
        matches!(
            self,
            ResourceKind::Script
                | ResourceKind::Sound
                | ResourceKind::Costume
                | ResourceKind::Room
                | ResourceKind::Charset
        )
    }
}

/// Where resource bytes come from.
pub trait ResourceSource {
    /// `Ok(None)` when the index has no entry for `id`.
    fn load(&self, kind: ResourceKind, id: u16) -> anyhow::Result<Option<Vec<u8>>>;
}

#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    entries: BTreeMap<(ResourceKind, u16), Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ResourceKind, id: u16, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert((kind, id), bytes.into());
        self
    }
}

impl ResourceSource for MemorySource {
    fn load(&self, kind: ResourceKind, id: u16) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(&(kind, id)).cloned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub id: u16,
}

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    age: u8,
}

pub struct ResourceManager {
    source: Box<dyn ResourceSource>,
    entries: BTreeMap<(ResourceKind, u16), Entry>,
    locks: BTreeMap<(ResourceKind, u16), u32>,
    /// Bytes of purgeable entries, the only ones the threshold governs.
    resident_bytes: usize,
    /// Bytes of script-created entries. These behave as permanently locked.
    pinned_bytes: usize,
    max_heap_threshold: usize,
    expire_counter: u8,
    loads: u64,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("resident", &self.entries.len())
            .field("resident_bytes", &self.resident_bytes)
            .field("pinned_bytes", &self.pinned_bytes)
            .field("max_heap_threshold", &self.max_heap_threshold)
            .finish()
    }
}

impl ResourceManager {
    pub fn new(source: Box<dyn ResourceSource>, max_heap_threshold: usize) -> Self {
        ResourceManager {
            source,
            entries: BTreeMap::new(),
            locks: BTreeMap::new(),
            resident_bytes: 0,
            pinned_bytes: 0,
            max_heap_threshold,
            expire_counter: 0,
            loads: 0,
        }
    }

    pub fn max_heap_threshold(&self) -> usize {
        self.max_heap_threshold
    }

    /// Bytes held by resources that came from the game files.
    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    /// Bytes held by script-created resources, outside the eviction budget.
    pub fn pinned_bytes(&self) -> usize {
        self.pinned_bytes
    }

    /// Number of reads issued to the source so far.
    pub fn loads(&self) -> u64 {
        self.loads
    }

    pub fn is_resident(&self, kind: ResourceKind, id: u16) -> bool {
        self.entries.contains_key(&(kind, id))
    }

    pub fn lock_depth(&self, kind: ResourceKind, id: u16) -> u32 {
        self.locks.get(&(kind, id)).copied().unwrap_or(0)
    }

    pub fn handle(&self, kind: ResourceKind, id: u16) -> ResourceHandle {
        ResourceHandle { kind, id }
    }

    /// Returns the resident bytes, loading them first when needed.
    /// `Ok(None)` means the source has no such resource.
    pub fn get(&mut self, kind: ResourceKind, id: u16) -> VmResult<Option<Bytes>> {
        if let Some(entry) = self.entries.get_mut(&(kind, id)) {
            entry.age = 0;
            return Ok(Some(entry.data.clone()));
        }
        if !kind.is_purgeable() {
            return Ok(None);
        }
        let Some(bytes) = self.source.load(kind, id)? else {
            debug!("{kind:?} {id} has no index entry");
            return Ok(None);
        };
        self.loads += 1;
        trace!("loaded {kind:?} {id} ({} bytes)", bytes.len());
        Ok(Some(self.insert(kind, id, bytes)))
    }

    /// Like [`get`](Self::get) but a missing resource is fatal.
    pub fn require(&mut self, kind: ResourceKind, id: u16) -> VmResult<Bytes> {
        self.get(kind, id)?
            .ok_or(FatalError::ResourceMissing { kind, id })
    }

    pub fn ensure_loaded(&mut self, kind: ResourceKind, id: u16) -> VmResult<()> {
        self.require(kind, id).map(|_| ())
    }

    /// Revalidates a handle, reloading the bytes if they were evicted.
    pub fn resolve(&mut self, handle: ResourceHandle) -> VmResult<Bytes> {
        self.require(handle.kind, handle.id)
    }

    /// Resident bytes without touching the age or the source.
    pub fn peek(&self, kind: ResourceKind, id: u16) -> Option<&Bytes> {
        self.entries.get(&(kind, id)).map(|entry| &entry.data)
    }

    pub fn lock(&mut self, kind: ResourceKind, id: u16) {
        *self.locks.entry((kind, id)).or_insert(0) += 1;
    }

    pub fn unlock(&mut self, kind: ResourceKind, id: u16) {
        if let Some(depth) = self.locks.get_mut(&(kind, id)) {
            *depth -= 1;
            if *depth == 0 {
                self.locks.remove(&(kind, id));
            }
        }
    }

    /// Stores script-created data, replacing any previous bytes.
    pub fn create(&mut self, kind: ResourceKind, id: u16, bytes: Vec<u8>) -> Bytes {
        self.nuke(kind, id);
        self.insert(kind, id, bytes)
    }

    pub fn nuke(&mut self, kind: ResourceKind, id: u16) {
        if let Some(entry) = self.entries.remove(&(kind, id)) {
            debug!("nuked {kind:?} {id}");
            *self.bytes_for(kind) -= entry.data.len();
        }
    }

    pub fn set_resource_counter(&mut self, kind: ResourceKind, id: u16, age: u8) {
        if let Some(entry) = self.entries.get_mut(&(kind, id)) {
            entry.age = age;
        }
    }

    /// Advances the expire counter; every 256 calls the cache is swept.
    pub fn tick_expire(&mut self) {
        self.expire_counter = self.expire_counter.wrapping_add(1);
        if self.expire_counter == 0 {
            self.increase_resource_counter();
        }
    }

    /// Ages every unlocked resident resource, then evicts the oldest ones
    /// until the cache fits under the threshold.
    pub fn increase_resource_counter(&mut self) {
        for (key, entry) in self.entries.iter_mut() {
            if !self.locks.contains_key(key) {
                entry.age = entry.age.saturating_add(1);
            }
        }
        self.evict_until(0);
    }

    pub fn free_resources(&mut self) {
        self.entries.clear();
        self.resident_bytes = 0;
        self.pinned_bytes = 0;
    }

    /// Script-created resources; these cannot be reloaded and travel with
    /// save games.
    pub fn created_resources(&self) -> Vec<(ResourceKind, u16, Vec<u8>)> {
        self.entries
            .iter()
            .filter(|((kind, _), _)| !kind.is_purgeable())
            .map(|(&(kind, id), entry)| (kind, id, entry.data.to_vec()))
            .collect()
    }

    pub fn restore_created(&mut self, created: Vec<(ResourceKind, u16, Vec<u8>)>) {
        let stale: Vec<_> = self
            .entries
            .keys()
            .filter(|(kind, _)| !kind.is_purgeable())
            .copied()
            .collect();
        for (kind, id) in stale {
            self.nuke(kind, id);
        }
        for (kind, id, bytes) in created {
            self.insert(kind, id, bytes);
        }
    }

    pub fn locks(&self) -> Vec<(ResourceKind, u16, u32)> {
        self.locks
            .iter()
            .map(|(&(kind, id), &depth)| (kind, id, depth))
            .collect()
    }

    pub fn restore_locks(&mut self, locks: Vec<(ResourceKind, u16, u32)>) {
        self.locks = locks
            .into_iter()
            .filter(|&(_, _, depth)| depth > 0)
            .map(|(kind, id, depth)| ((kind, id), depth))
            .collect();
    }

    fn bytes_for(&mut self, kind: ResourceKind) -> &mut usize {
        if kind.is_purgeable() {
            &mut self.resident_bytes
        } else {
            &mut self.pinned_bytes
        }
    }

    fn insert(&mut self, kind: ResourceKind, id: u16, bytes: Vec<u8>) -> Bytes {
        if kind.is_purgeable() {
            self.evict_until(bytes.len());
        }
        let data = Bytes::from(bytes);
        *self.bytes_for(kind) += data.len();
        self.entries.insert(
            (kind, id),
            Entry {
                data: data.clone(),
                age: 0,
            },
        );
        data
    }

    fn evict_until(&mut self, incoming: usize) {
        while self.resident_bytes + incoming > self.max_heap_threshold {
            let victim = self
                .entries
                .iter()
                .filter(|(key, _)| key.0.is_purgeable() && !self.locks.contains_key(key))
                .fold(None::<((ResourceKind, u16), u8)>, |best, (key, entry)| match best {
                    Some((_, age)) if age >= entry.age => best,
                    _ => Some((*key, entry.age)),
                });
            let Some(((kind, id), age)) = victim else {
                break;
            };
            debug!("evicting {kind:?} {id} (age {age})");
            self.nuke(kind, id);
        }
    }
}
