use serde::{Deserialize, Serialize};

use crate::error::{FatalError, VmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerbKind {
    #[default]
    Text,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerbMode {
    #[default]
    Off,
    On,
    Dimmed,
}

impl VerbMode {
    pub fn from_script(mode: i32) -> Self {
        match mode {
            1 => VerbMode::On,
            2 => VerbMode::Dimmed,
            _ => VerbMode::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerbSlot {
    pub verb_id: i32,
    pub color: i32,
    pub hicolor: i32,
    pub dimcolor: i32,
    pub bkcolor: i32,
    pub x: i32,
    pub y: i32,
    pub mode: VerbMode,
    pub save_id: i32,
    pub key: i32,
    pub center: bool,
    pub image_object: i32,
    pub kind: VerbKind,
}

/// Verb slots; slot 0 is a scratch slot used while a verb is unassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbTable {
    slots: Vec<VerbSlot>,
}

impl VerbTable {
    pub fn new(num_verbs: usize) -> Self {
        VerbTable {
            slots: vec![VerbSlot::default(); num_verbs.max(1)],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot holding `verb_id` under `save_id`, 0 when absent.
    pub fn find(&self, verb_id: i32, save_id: i32) -> usize {
        (1..self.slots.len())
            .find(|&i| self.slots[i].verb_id == verb_id && self.slots[i].save_id == save_id)
            .unwrap_or(0)
    }

    /// First slot nobody uses, 0 when the table is full.
    pub fn free_slot(&self) -> usize {
        (1..self.slots.len())
            .find(|&i| self.slots[i].verb_id == 0)
            .unwrap_or(0)
    }

    pub fn get(&self, slot: usize) -> VmResult<&VerbSlot> {
        self.slots.get(slot).ok_or(FatalError::InvalidIndex {
            table: "verb",
            index: slot as i32,
        })
    }

    pub fn get_mut(&mut self, slot: usize) -> VmResult<&mut VerbSlot> {
        self.slots.get_mut(slot).ok_or(FatalError::InvalidIndex {
            table: "verb",
            index: slot as i32,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &VerbSlot)> {
        self.slots.iter().enumerate().skip(1)
    }

    /// Clears a slot. Returns whether it was in use.
    pub fn kill(&mut self, slot: usize) -> bool {
        if slot == 0 {
            return false;
        }
        match self.slots.get_mut(slot) {
            Some(entry) => {
                let used = entry.verb_id != 0;
                *entry = VerbSlot::default();
                used
            }
            None => false,
        }
    }

    /// Verb slot whose key binding matches `key`.
    pub fn find_by_key(&self, key: i32) -> Option<usize> {
        self.iter()
            .find(|(_, v)| v.key != 0 && v.key == key && v.mode == VerbMode::On && v.save_id == 0)
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_distinguishes_save_ids() {
        let mut table = VerbTable::new(8);
        let slot = table.free_slot();
        assert_eq!(slot, 1);
        *table.get_mut(slot).unwrap() = VerbSlot {
            verb_id: 12,
            save_id: 0,
            ..VerbSlot::default()
        };
        assert_eq!(table.find(12, 0), 1);
        assert_eq!(table.find(12, 3), 0);
        assert!(table.kill(1));
        assert_eq!(table.find(12, 0), 0);
        assert!(!table.kill(0));
    }
}
