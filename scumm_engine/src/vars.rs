//! Global variable store and the per-version symbolic variable layout.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{FatalError, VmResult};
use crate::version::{GameVersion, GameVersionTraits};

/// Indices of the engine-visible variables. `None` means the title has no
/// such variable; reads yield 0 and writes are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarLayout {
    pub keypress: Option<u16>,
    pub ego: Option<u16>,
    pub camera_pos_x: Option<u16>,
    pub have_msg: Option<u16>,
    pub room: Option<u16>,
    pub override_flag: Option<u16>,
    pub machine_speed: Option<u16>,
    pub me: Option<u16>,
    pub num_actor: Option<u16>,
    pub current_lights: Option<u16>,
    pub current_drive: Option<u16>,
    pub tmr_1: Option<u16>,
    pub tmr_2: Option<u16>,
    pub tmr_3: Option<u16>,
    pub music_timer: Option<u16>,
    pub actor_range_min: Option<u16>,
    pub actor_range_max: Option<u16>,
    pub camera_min_x: Option<u16>,
    pub camera_max_x: Option<u16>,
    pub timer_next: Option<u16>,
    pub virt_mouse_x: Option<u16>,
    pub virt_mouse_y: Option<u16>,
    pub room_resource: Option<u16>,
    pub last_sound: Option<u16>,
    pub cutsceneexit_key: Option<u16>,
    pub talk_actor: Option<u16>,
    pub camera_fast_x: Option<u16>,
    pub scroll_script: Option<u16>,
    pub entry_script: Option<u16>,
    pub entry_script2: Option<u16>,
    pub exit_script: Option<u16>,
    pub exit_script2: Option<u16>,
    pub verb_script: Option<u16>,
    pub sentence_script: Option<u16>,
    pub inventory_script: Option<u16>,
    pub cutscene_start_script: Option<u16>,
    pub cutscene_end_script: Option<u16>,
    pub charinc: Option<u16>,
    pub walkto_obj: Option<u16>,
    pub heapspace: Option<u16>,
    pub mouse_x: Option<u16>,
    pub mouse_y: Option<u16>,
    pub timer: Option<u16>,
    pub tmr_4: Option<u16>,
    pub cursorstate: Option<u16>,
    pub userput: Option<u16>,
    pub soundresult: Option<u16>,
    pub talkstop_key: Option<u16>,
    pub fade_delay: Option<u16>,
    pub new_room: Option<u16>,
    pub camera_pos_y: Option<u16>,
    pub camera_min_y: Option<u16>,
    pub camera_max_y: Option<u16>,
    pub camera_threshold_x: Option<u16>,
    pub camera_threshold_y: Option<u16>,
    pub camera_speed_x: Option<u16>,
    pub camera_speed_y: Option<u16>,
    pub camera_accel_x: Option<u16>,
    pub camera_accel_y: Option<u16>,
    pub camera_dest_x: Option<u16>,
    pub camera_dest_y: Option<u16>,
    pub camera_follow_actor: Option<u16>,
}

impl VarLayout {
    pub fn for_traits(traits: &GameVersionTraits) -> Self {
        let mut layout = VarLayout {
            keypress: Some(0),
            ego: Some(1),
            camera_pos_x: Some(2),
            have_msg: Some(3),
            room: Some(4),
            override_flag: Some(5),
            machine_speed: Some(6),
            me: Some(7),
            num_actor: Some(8),
            current_lights: Some(9),
            current_drive: Some(10),
            tmr_1: Some(11),
            tmr_2: Some(12),
            tmr_3: Some(13),
            music_timer: Some(14),
            actor_range_min: Some(15),
            actor_range_max: Some(16),
            camera_min_x: Some(17),
            camera_max_x: Some(18),
            timer_next: Some(19),
            virt_mouse_x: Some(20),
            virt_mouse_y: Some(21),
            room_resource: Some(22),
            last_sound: Some(23),
            cutsceneexit_key: Some(24),
            talk_actor: Some(25),
            camera_fast_x: Some(26),
            scroll_script: Some(27),
            entry_script: Some(28),
            entry_script2: Some(29),
            exit_script: Some(30),
            exit_script2: Some(31),
            verb_script: Some(32),
            sentence_script: Some(33),
            inventory_script: Some(34),
            cutscene_start_script: Some(35),
            cutscene_end_script: Some(36),
            charinc: Some(37),
            walkto_obj: Some(38),
            heapspace: Some(40),
            mouse_x: Some(44),
            mouse_y: Some(45),
            timer: Some(46),
            tmr_4: Some(47),
            cursorstate: Some(52),
            userput: Some(53),
            soundresult: Some(56),
            talkstop_key: Some(57),
            fade_delay: Some(59),
            new_room: Some(72),
            ..VarLayout::default()
        };
        if traits.version == GameVersion::V4 {
            layout.new_room = None;
        }
        if traits.new_camera {
            layout.camera_pos_y = Some(100);
            layout.camera_min_y = Some(103);
            layout.camera_max_y = Some(104);
            layout.camera_threshold_x = Some(105);
            layout.camera_threshold_y = Some(106);
            layout.camera_speed_x = Some(107);
            layout.camera_speed_y = Some(108);
            layout.camera_accel_x = Some(109);
            layout.camera_accel_y = Some(110);
            layout.camera_dest_x = Some(111);
            layout.camera_dest_y = Some(112);
            layout.camera_follow_actor = Some(113);
        }
        layout
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableStore {
    vars: Vec<i32>,
    bits: Vec<bool>,
}

impl VariableStore {
    pub fn new(num_variables: usize, num_bit_variables: usize) -> Self {
        VariableStore {
            vars: vec![0; num_variables],
            bits: vec![false; num_bit_variables],
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn values(&self) -> &[i32] {
        &self.vars
    }

    pub fn get(&self, index: u16) -> VmResult<i32> {
        self.vars
            .get(index as usize)
            .copied()
            .ok_or(FatalError::InvalidVariable(index as u32))
    }

    pub fn set(&mut self, index: u16, value: i32) -> VmResult<()> {
        let slot = self
            .vars
            .get_mut(index as usize)
            .ok_or(FatalError::InvalidVariable(index as u32))?;
        *slot = value;
        Ok(())
    }

    pub fn get_bit(&self, bit: u16) -> VmResult<bool> {
        self.bits
            .get(bit as usize)
            .copied()
            .ok_or(FatalError::InvalidVariable(0x8000 | bit as u32))
    }

    pub fn set_bit(&mut self, bit: u16, value: bool) -> VmResult<()> {
        let slot = self
            .bits
            .get_mut(bit as usize)
            .ok_or(FatalError::InvalidVariable(0x8000 | bit as u32))?;
        *slot = value;
        Ok(())
    }

    /// Reads a symbolic variable; absent or out-of-range reads yield 0.
    pub fn read(&self, var: Option<u16>) -> i32 {
        var.and_then(|index| self.vars.get(index as usize).copied())
            .unwrap_or(0)
    }

    pub fn write(&mut self, var: Option<u16>, value: i32) {
        let Some(index) = var else {
            return;
        };
        match self.vars.get_mut(index as usize) {
            Some(slot) => *slot = value,
            None => debug!("dropping write to variable {index} beyond the store"),
        }
    }

    pub fn add(&mut self, var: Option<u16>, delta: i32) {
        let value = self.read(var).wrapping_add(delta);
        self.write(var, value);
    }
}
