//! Room switching, room-wide effects, the camera opcodes and the
//! resource routines.

use log::{debug, warn};

use crate::error::{FatalError, VmResult};
use crate::objects::ObjectLocation;
use crate::resources::ResourceKind;

use super::fetch::{PARAM_1, PARAM_2, PARAM_3};
use super::{Flashlight, SaveRequest, Vm};

const RESOURCE_KINDS: [ResourceKind; 4] = [
    ResourceKind::Script,
    ResourceKind::Sound,
    ResourceKind::Costume,
    ResourceKind::Room,
];

impl Vm {
    pub(super) fn op_load_room(&mut self) -> VmResult<()> {
        let room = self.get_var_or_direct_byte(PARAM_1)?;
        // Small-header titles re-entering the current room keep it as is.
        if !self.traits.small_header || room != self.room.number {
            self.start_scene(room, None, 0)?;
        }
        self.full_redraw = true;
        Ok(())
    }

    pub(super) fn op_load_room_with_ego(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let room = self.get_var_or_direct_byte(PARAM_2)?;

        let ego = self.ego();
        let (ax, ay, old_dir) = {
            let actor = self.actors.get(ego)?;
            (actor.x, actor.y, actor.facing)
        };
        self.put_actor(ego, ax, ay, room)?;
        self.ego_positioned = false;

        let x = self.fetch_i16()?;
        let y = self.fetch_i16()?;

        self.set_var(self.layout.walkto_obj, obj);
        self.start_scene(room, Some(ego), obj)?;
        self.set_var(self.layout.walkto_obj, 0);

        if self.traits.small_header {
            if self.objects.where_is(obj) != ObjectLocation::Room {
                return Err(FatalError::InvalidObject(obj));
            }
            if !self.ego_positioned {
                let (wx, wy, dir) = self
                    .object_walk_position(obj)
                    .ok_or(FatalError::InvalidObject(obj))?;
                let current = self.room.number;
                self.put_actor(ego, wx, wy, current)?;
                let actor = self.actors.get_mut(ego)?;
                if actor.facing == old_dir {
                    actor.set_direction(dir + 180);
                }
            }
            self.actors.get_mut(ego)?.stop_moving();
        }

        let ego_x = self.actors.get(ego)?.x;
        self.camera.cur.x = ego_x;
        self.camera.dest.x = ego_x;
        self.set_camera_follows(ego)?;
        self.full_redraw = true;

        if x != -1 {
            self.walk_actor(ego, x, y, -1)?;
        }
        Ok(())
    }

    pub(super) fn op_pseudo_room(&mut self) -> VmResult<()> {
        let room = self.fetch_byte()?;
        loop {
            let pseudo = self.fetch_byte()?;
            if pseudo == 0 {
                break;
            }
            if pseudo >= 0x80 {
                self.resource_mapper[(pseudo & 0x7F) as usize] = room;
            }
        }
        Ok(())
    }

    pub(super) fn op_room_ops(&mut self) -> VmResult<()> {
        self.opcode = self.fetch_byte()?;
        let sub = self.opcode & 0x1F;
        match sub {
            1 => {
                let half = self.traits.screen_width / 2;
                let max = (self.room.width - half).max(half);
                let a = self.get_var_or_direct_word(PARAM_1)?.clamp(half, max);
                let b = self.get_var_or_direct_word(PARAM_2)?.clamp(half, max);
                self.set_var(self.layout.camera_min_x, a);
                self.set_var(self.layout.camera_max_x, b);
            }
            2 if self.traits.small_header => {
                let a = self.get_var_or_direct_word(PARAM_1)?;
                let b = self.get_var_or_direct_word(PARAM_2)?;
                self.palette.set_room_color(b, a)?;
                self.full_redraw = true;
            }
            3 => {
                let a = self.get_var_or_direct_word(PARAM_1)?;
                let b = self.get_var_or_direct_word(PARAM_2)?;
                self.screen.init_screens(a, b - a);
            }
            4 if self.traits.small_header => {
                let a = self.get_var_or_direct_word(PARAM_1)?;
                let b = self.get_var_or_direct_word(PARAM_2)?;
                if !(0..256).contains(&a) {
                    return Err(FatalError::InvalidIndex {
                        table: "shadow palette",
                        index: a,
                    });
                }
                self.palette.set_shadow_entry(b, a)?;
            }
            4 => {
                let r = self.get_var_or_direct_word(PARAM_1)?;
                let g = self.get_var_or_direct_word(PARAM_2)?;
                let b = self.get_var_or_direct_word(PARAM_3)?;
                self.opcode = self.fetch_byte()?;
                let index = self.get_var_or_direct_byte(PARAM_1)?;
                self.palette.set_pal_color(index, r, g, b)?;
            }
            5 => self.screen.shake = true,
            6 => self.screen.shake = false,
            7 => {
                let scale1 = self.get_var_or_direct_byte(PARAM_1)?;
                let y1 = self.get_var_or_direct_byte(PARAM_2)?;
                self.opcode = self.fetch_byte()?;
                let scale2 = self.get_var_or_direct_byte(PARAM_1)?;
                let y2 = self.get_var_or_direct_byte(PARAM_2)?;
                self.opcode = self.fetch_byte()?;
                let slot = self.get_var_or_direct_byte(PARAM_2)?;
                self.boxes.set_scale_slot(slot, y1, scale1, y2, scale2)?;
            }
            8 => {
                let scale = self.get_var_or_direct_byte(PARAM_1)?;
                let start = self.get_var_or_direct_byte(PARAM_2)?;
                let end = self.get_var_or_direct_byte(PARAM_3)?;
                self.palette.darken_palette(scale, scale, scale, start, end)?;
            }
            9 => {
                let flag = self.get_var_or_direct_byte(PARAM_1)?;
                let slot = self.get_var_or_direct_byte(PARAM_2)?;
                match flag {
                    1 | 2 => {
                        self.save_request = Some(SaveRequest {
                            load: flag == 2,
                            slot: slot as u8,
                        });
                        debug!("save/load request {flag} for slot {slot}");
                    }
                    _ => warn!("roomOps: unknown save/load flag {flag}"),
                }
            }
            10 => {
                let effect = self.get_var_or_direct_word(PARAM_1)?;
                self.room_effect(effect);
            }
            11 | 12 => {
                let r = self.get_var_or_direct_word(PARAM_1)?;
                let g = self.get_var_or_direct_word(PARAM_2)?;
                let b = self.get_var_or_direct_word(PARAM_3)?;
                self.opcode = self.fetch_byte()?;
                let start = self.get_var_or_direct_byte(PARAM_1)?;
                let end = self.get_var_or_direct_byte(PARAM_2)?;
                if sub == 11 {
                    self.palette.darken_palette(r, g, b, start, end)?;
                } else {
                    self.palette.setup_shadow_palette(r, g, b, start, end)?;
                }
            }
            13 | 14 => {
                let slot = self.get_var_or_direct_byte(PARAM_1)?;
                let name = self.fetch_inline_string()?;
                warn!(
                    "roomOps: {} of string {slot} as '{}' not supported",
                    if sub == 13 { "save" } else { "load" },
                    String::from_utf8_lossy(&name)
                );
            }
            15 => {
                let string = self.get_var_or_direct_byte(PARAM_1)?;
                self.opcode = self.fetch_byte()?;
                let start = self.get_var_or_direct_byte(PARAM_1)?;
                let end = self.get_var_or_direct_byte(PARAM_2)?;
                self.opcode = self.fetch_byte()?;
                let time = self.get_var_or_direct_byte(PARAM_1)?;
                let red = self.string_bytes(string)?;
                let green = self.string_bytes(string + 1)?;
                let blue = self.string_bytes(string + 2)?;
                self.palette
                    .pal_manipulate_init(start, end, [&red, &green, &blue], time)?;
            }
            16 => {
                let slot = self.get_var_or_direct_byte(PARAM_1)?;
                let speed = self.get_var_or_direct_byte(PARAM_2)?;
                let delay = if speed != 0 { 0x4000 / (speed * 0x4C) } else { 0 };
                self.palette.set_cycle_delay(slot, delay as u16)?;
            }
            _ => {
                return Err(FatalError::UnknownSubOpcode {
                    op: "roomOps",
                    sub: self.opcode,
                })
            }
        }
        Ok(())
    }

    /// Non-zero arms the switch-out/switch-in pair; zero fades the room in.
    fn room_effect(&mut self, effect: i32) {
        if effect != 0 {
            self.effects.switch_in = (effect & 0xFF) as u8;
            self.effects.switch_out = (effect >> 8) as u8;
        } else {
            self.effects.do_effect = true;
            self.full_redraw = true;
        }
    }

    pub(super) fn op_set_camera_at(&mut self) -> VmResult<()> {
        let x = self.get_var_or_direct_word(PARAM_1)?;
        self.set_camera_at_ex(x)
    }

    pub(super) fn op_pan_camera_to(&mut self) -> VmResult<()> {
        let x = self.get_var_or_direct_word(PARAM_1)?;
        self.camera.pan_to(x, 0);
        Ok(())
    }

    pub(super) fn op_lights(&mut self) -> VmResult<()> {
        let a = self.get_var_or_direct_byte(PARAM_1)?;
        let b = self.fetch_byte()? as i32;
        let c = self.fetch_byte()?;
        match c {
            0 => self.set_var(self.layout.current_lights, a),
            1 => {
                self.flashlight = Flashlight {
                    x_strips: a,
                    y_strips: b,
                }
            }
            _ => debug!("lights: ignored mode {c}"),
        }
        self.full_redraw = true;
        Ok(())
    }

    pub(super) fn op_old_room_effect(&mut self) -> VmResult<()> {
        self.opcode = self.fetch_byte()?;
        if self.opcode & 0x1F == 3 {
            let effect = self.get_var_or_direct_word(PARAM_1)?;
            self.room_effect(effect);
        }
        Ok(())
    }

    pub(super) fn op_matrix_ops(&mut self) -> VmResult<()> {
        self.opcode = self.fetch_byte()?;
        match self.opcode & 0x1F {
            1 => {
                let index = self.get_var_or_direct_byte(PARAM_1)?;
                let flags = self.get_var_or_direct_byte(PARAM_2)?;
                self.boxes.set_flags(index, flags as u8)?;
            }
            2 => {
                let index = self.get_var_or_direct_byte(PARAM_1)?;
                let scale = self.get_var_or_direct_byte(PARAM_2)?;
                self.boxes.set_scale(index, scale as u16)?;
            }
            3 => {
                let index = self.get_var_or_direct_byte(PARAM_1)?;
                let slot = self.get_var_or_direct_byte(PARAM_2)?;
                self.boxes.set_scale(index, ((slot - 1) | 0x8000) as u16)?;
            }
            4 => self.boxes.create_box_matrix(),
            other => warn!("matrixOps: unknown sub-opcode {other}"),
        }
        Ok(())
    }

    /// Real room behind a possibly pseudo room id.
    fn lockable(&self, kind: ResourceKind, id: i32) -> Option<u16> {
        match kind {
            ResourceKind::Script if id as usize >= self.traits.num_global_scripts => None,
            ResourceKind::Room => u16::try_from(self.map_room(id)).ok(),
            _ => u16::try_from(id).ok(),
        }
    }

    pub(super) fn op_resource_routines(&mut self) -> VmResult<()> {
        self.opcode = self.fetch_byte()?;
        let sub = self.opcode & 0x3F;
        let resid = if sub != 17 {
            self.get_var_or_direct_byte(PARAM_1)?
        } else {
            0
        };
        let id = resid as u16;
        match sub {
            1..=4 => {
                let kind = RESOURCE_KINDS[sub as usize - 1];
                self.resources.ensure_loaded(kind, id)?;
            }
            5..=8 => {
                let kind = RESOURCE_KINDS[sub as usize - 5];
                self.resources.set_resource_counter(kind, id, 0x7F);
            }
            9..=12 => {
                let kind = RESOURCE_KINDS[sub as usize - 9];
                if let Some(id) = self.lockable(kind, resid) {
                    self.resources.lock(kind, id);
                }
            }
            13..=16 => {
                let kind = RESOURCE_KINDS[sub as usize - 13];
                if let Some(id) = self.lockable(kind, resid) {
                    self.resources.unlock(kind, id);
                }
            }
            17 => {}
            18 => self.resources.ensure_loaded(ResourceKind::Charset, id)?,
            19 => self.resources.nuke(ResourceKind::Charset, id),
            20 => {
                let obj = self.get_var_or_direct_word(PARAM_2)?;
                self.load_floating_object(obj, resid)?;
            }
            32 | 33 => debug!(
                "resourceRoutines: {} flobject {resid}",
                if sub == 32 { "lock" } else { "unlock" }
            ),
            35 | 37 => {
                let arg = self.get_var_or_direct_byte(PARAM_2)?;
                debug!("resourceRoutines: sub-opcode {sub} on {resid} with {arg}");
            }
            36 => {
                let arg = self.get_var_or_direct_byte(PARAM_2)?;
                let extra = self.fetch_byte()?;
                debug!("resourceRoutines: sub-opcode 36 on {resid} with {arg}, {extra}");
            }
            _ => {
                return Err(FatalError::UnknownSubOpcode {
                    op: "resourceRoutines",
                    sub: self.opcode,
                })
            }
        }
        Ok(())
    }
}
