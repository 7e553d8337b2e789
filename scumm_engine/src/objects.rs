//! Global object ownership/state/class tables, the current room's object
//! list and the inventory.

use std::collections::BTreeMap;

use bytes::Bytes;
use scumm_formats::ObjectCode;
use scumm_formats::room::DEFAULT_VERB;
use serde::{Deserialize, Serialize};

use crate::error::{FatalError, VmResult};

/// Owner value meaning "lies in its room".
pub const OWNER_ROOM: u8 = 0x0F;

pub const CLASS_NEVER_CLIP: i32 = 20;
pub const CLASS_ALWAYS_CLIP: i32 = 21;
pub const CLASS_IGNORE_BOXES: i32 = 22;
pub const CLASS_Y_FLIP: i32 = 29;
pub const CLASS_X_FLIP: i32 = 30;
pub const CLASS_PLAYER: i32 = 31;
pub const CLASS_UNTOUCHABLE: i32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectLocation {
    NotFound,
    Room,
    Inventory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlobalObject {
    pub owner: u8,
    pub state: u8,
    pub class: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomObject {
    pub id: u16,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// 1-based index of the parent in the room list, 0 for none.
    pub parent: u8,
    pub parent_state: u8,
    pub walk_x: i32,
    pub walk_y: i32,
    pub actor_dir: u8,
    pub verbs: Vec<(u8, u16)>,
    pub name: String,
    /// Mirror of the global state, refreshed once per tick.
    pub state: u8,
    #[serde(skip)]
    pub code: Bytes,
}

impl RoomObject {
    pub fn from_code(code: &ObjectCode) -> Self {
        RoomObject {
            id: code.id,
            x: code.x,
            y: code.y,
            width: code.width,
            height: code.height,
            parent: code.parent,
            parent_state: code.parent_state,
            walk_x: code.walk_x as i32,
            walk_y: code.walk_y as i32,
            actor_dir: code.actor_dir,
            verbs: code.verbs.clone(),
            name: code.name.clone(),
            state: 0,
            code: Bytes::from(code.code.clone()),
        }
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        self.x <= x && self.x + self.width > x && self.y <= y && self.y + self.height > y
    }
}

/// Verb entry lookup shared by room and inventory objects: exact verb
/// first, then the default entry.
pub fn verb_entry(verbs: &[(u8, u16)], verb: u8) -> Option<u16> {
    verbs
        .iter()
        .find(|(v, _)| *v == verb)
        .or_else(|| verbs.iter().find(|(v, _)| *v == DEFAULT_VERB))
        .map(|(_, entry)| *entry)
}

/// Carried object. Its code lives in the resource cache under
/// `ResourceKind::Inventory` keyed by the object id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub obj: u16,
    pub name: String,
    pub verbs: Vec<(u8, u16)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTable {
    globals: Vec<GlobalObject>,
    room: Vec<RoomObject>,
    inventory: Vec<InventoryItem>,
    max_inventory: usize,
    max_local: usize,
    new_names: BTreeMap<u16, Vec<u8>>,
    /// Floating objects in the room list and the room they were loaded from.
    #[serde(default)]
    floating: BTreeMap<u16, u16>,
}

impl ObjectTable {
    pub fn new(num_global: usize, num_local: usize, num_inventory: usize) -> Self {
        ObjectTable {
            globals: vec![GlobalObject::default(); num_global],
            room: Vec::new(),
            inventory: Vec::new(),
            max_inventory: num_inventory,
            max_local: num_local,
            new_names: BTreeMap::new(),
            floating: BTreeMap::new(),
        }
    }

    /// Seeds the global tables from the index file's object directory.
    pub fn load_globals(&mut self, entries: &[scumm_formats::ObjectEntry]) {
        for (slot, entry) in self.globals.iter_mut().zip(entries) {
            *slot = GlobalObject {
                owner: entry.owner,
                state: entry.state,
                class: entry.class,
            };
        }
    }

    pub fn num_globals(&self) -> usize {
        self.globals.len()
    }

    fn global(&self, obj: i32) -> VmResult<&GlobalObject> {
        usize::try_from(obj)
            .ok()
            .and_then(|i| self.globals.get(i))
            .ok_or(FatalError::InvalidObject(obj))
    }

    fn global_mut(&mut self, obj: i32) -> VmResult<&mut GlobalObject> {
        usize::try_from(obj)
            .ok()
            .and_then(|i| self.globals.get_mut(i))
            .ok_or(FatalError::InvalidObject(obj))
    }

    pub fn owner(&self, obj: i32) -> VmResult<u8> {
        self.global(obj).map(|g| g.owner)
    }

    pub fn set_owner(&mut self, obj: i32, owner: i32) -> VmResult<()> {
        self.global_mut(obj)?.owner = owner as u8;
        Ok(())
    }

    pub fn state(&self, obj: i32) -> VmResult<u8> {
        self.global(obj).map(|g| g.state)
    }

    pub fn set_state(&mut self, obj: i32, state: i32) -> VmResult<()> {
        self.global_mut(obj)?.state = state as u8;
        Ok(())
    }

    fn class_bit(cls: i32) -> VmResult<u32> {
        let cls = cls & 0x7F;
        if !(1..=32).contains(&cls) {
            return Err(FatalError::InvalidIndex {
                table: "object class",
                index: cls,
            });
        }
        Ok(1 << (cls - 1))
    }

    pub fn class_of(&self, obj: i32, cls: i32) -> VmResult<bool> {
        let bit = Self::class_bit(cls)?;
        Ok(self.global(obj)?.class & bit != 0)
    }

    pub fn set_class(&mut self, obj: i32, cls: i32, set: bool) -> VmResult<()> {
        let bit = Self::class_bit(cls)?;
        let global = self.global_mut(obj)?;
        if set {
            global.class |= bit;
        } else {
            global.class &= !bit;
        }
        Ok(())
    }

    pub fn clear_classes(&mut self, obj: i32) -> VmResult<()> {
        self.global_mut(obj)?.class = 0;
        Ok(())
    }

    /// Replaces the room object list. Objects beyond the local table size
    /// are dropped.
    pub fn load_room(&mut self, objects: &[ObjectCode]) {
        self.room = objects
            .iter()
            .take(self.max_local.saturating_sub(1))
            .map(RoomObject::from_code)
            .collect();
        self.update_states();
    }

    pub fn clear_room(&mut self) {
        self.room.clear();
        self.floating.clear();
    }

    /// Appends an object borrowed from another room. A reload of the same
    /// object replaces the earlier copy.
    pub fn add_floating(&mut self, mut object: RoomObject, source_room: u16) -> VmResult<()> {
        if let Some(index) = self.room_index(object.id as i32) {
            self.room.remove(index);
        }
        if self.room.len() + 1 >= self.max_local {
            return Err(FatalError::InvalidIndex {
                table: "local object",
                index: self.room.len() as i32,
            });
        }
        if let Some(global) = self.globals.get(object.id as usize) {
            object.state = global.state;
        }
        self.floating.insert(object.id, source_room);
        self.room.push(object);
        Ok(())
    }

    pub fn floating(&self) -> &BTreeMap<u16, u16> {
        &self.floating
    }

    /// Removes a floating copy of `obj` from the room list. Objects that
    /// belong to the room itself stay.
    pub fn drop_floating(&mut self, obj: i32) -> bool {
        let Ok(id) = u16::try_from(obj) else {
            return false;
        };
        if self.floating.remove(&id).is_none() {
            return false;
        }
        self.room.retain(|o| o.id != id);
        true
    }

    pub fn room_objects(&self) -> &[RoomObject] {
        &self.room
    }

    /// Copies the global state of every room object into its mirror.
    pub fn update_states(&mut self) {
        for object in self.room.iter_mut() {
            if let Some(global) = self.globals.get(object.id as usize) {
                object.state = global.state;
            }
        }
    }

    /// Room-list index of `obj`, searching from the top.
    pub fn room_index(&self, obj: i32) -> Option<usize> {
        if obj < 1 {
            return None;
        }
        self.room.iter().rposition(|o| o.id as i32 == obj)
    }

    pub fn room_object(&self, obj: i32) -> Option<&RoomObject> {
        self.room_index(obj).map(|i| &self.room[i])
    }

    pub fn room_object_mut(&mut self, obj: i32) -> Option<&mut RoomObject> {
        self.room_index(obj).map(move |i| &mut self.room[i])
    }

    pub fn room_object_at(&self, index: usize) -> Option<&RoomObject> {
        self.room.get(index)
    }

    pub fn where_is(&self, obj: i32) -> ObjectLocation {
        let Ok(global) = self.global(obj) else {
            return ObjectLocation::NotFound;
        };
        if obj < 1 {
            return ObjectLocation::NotFound;
        }
        if global.owner != OWNER_ROOM {
            if self.inventory.iter().any(|item| item.obj as i32 == obj) {
                return ObjectLocation::Inventory;
            }
            return ObjectLocation::NotFound;
        }
        if self.room_index(obj).is_some() {
            ObjectLocation::Room
        } else {
            ObjectLocation::NotFound
        }
    }

    /// Topmost touchable object under `(x, y)` whose parent chain is in the
    /// required states.
    pub fn find_at(&self, x: i32, y: i32) -> VmResult<i32> {
        for (index, object) in self.room.iter().enumerate() {
            if object.id < 1 || self.class_of(object.id as i32, CLASS_UNTOUCHABLE)? {
                continue;
            }
            let mut b = index;
            loop {
                let wanted = self.room[b].parent_state;
                let parent = self.room[b].parent as usize;
                if parent == 0 {
                    if object.contains(x, y) {
                        return Ok(object.id as i32);
                    }
                    break;
                }
                let Some(parent_object) = self.room.get(parent - 1) else {
                    break;
                };
                if parent_object.state & 0xF != wanted {
                    break;
                }
                b = parent - 1;
            }
        }
        Ok(0)
    }

    pub fn inventory(&self) -> &[InventoryItem] {
        &self.inventory
    }

    pub fn inventory_item(&self, obj: i32) -> Option<&InventoryItem> {
        self.inventory.iter().find(|item| item.obj as i32 == obj)
    }

    pub fn add_to_inventory(&mut self, item: InventoryItem) -> VmResult<()> {
        if self.inventory.iter().any(|existing| existing.obj == item.obj) {
            return Ok(());
        }
        if self.inventory.len() >= self.max_inventory {
            return Err(FatalError::InvalidIndex {
                table: "inventory",
                index: self.inventory.len() as i32,
            });
        }
        self.inventory.push(item);
        Ok(())
    }

    /// Drops `obj` from the inventory; later items move up.
    pub fn remove_from_inventory(&mut self, obj: i32) -> bool {
        let before = self.inventory.len();
        self.inventory.retain(|item| item.obj as i32 != obj);
        before != self.inventory.len()
    }

    /// `index`-th (1-based) carried object belonging to `owner`, or 0.
    pub fn find_inventory(&self, owner: i32, index: i32) -> VmResult<i32> {
        let mut count = 1;
        for item in &self.inventory {
            if self.owner(item.obj as i32)? as i32 == owner {
                if count == index {
                    return Ok(item.obj as i32);
                }
                count += 1;
            }
        }
        Ok(0)
    }

    pub fn inventory_count(&self, owner: i32) -> VmResult<i32> {
        let mut count = 0;
        for item in &self.inventory {
            if self.owner(item.obj as i32)? as i32 == owner {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn set_new_name(&mut self, obj: u16, name: Vec<u8>) {
        self.new_names.insert(obj, name);
    }

    /// Drops renames of objects that stay behind when the room changes.
    pub fn forget_room_names(&mut self) {
        let globals = &self.globals;
        self.new_names.retain(|obj, _| {
            globals
                .get(*obj as usize)
                .map_or(true, |g| g.owner != OWNER_ROOM)
        });
    }

    /// Display name: a script-assigned name wins over the room's `OBNA`.
    pub fn name(&self, obj: i32) -> Option<String> {
        if let Some(name) = u16::try_from(obj).ok().and_then(|id| self.new_names.get(&id)) {
            return Some(String::from_utf8_lossy(name).into_owned());
        }
        self.room_object(obj)
            .map(|o| o.name.clone())
            .or_else(|| self.inventory_item(obj).map(|item| item.name.clone()))
    }

    /// Re-attaches object code after a restore; only the bytes are missing.
    pub fn attach_code(&mut self, objects: &[ObjectCode]) {
        for object in self.room.iter_mut() {
            if let Some(code) = objects.iter().find(|c| c.id == object.id) {
                object.code = Bytes::from(code.code.clone());
            }
        }
    }
}
