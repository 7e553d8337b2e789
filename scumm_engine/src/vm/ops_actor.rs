use log::{debug, warn};

use crate::actors::{old_dir_to_new_dir, Actor, NUM_ACTOR_PALETTE};
use crate::error::{FatalError, VmResult};
use crate::objects::ObjectLocation;
use crate::opcodes::V4_ACTOR_OPS_CONVERT;
use crate::resources::ResourceKind;

use super::fetch::{PARAM_1, PARAM_2, PARAM_3};
use super::Vm;

/// Where `putActorAtObject` drops an actor when the object is nowhere.
const LOST_OBJECT_POS: (i32, i32) = (240, 120);

impl Vm {
    /// Actor operand of the query and movement opcodes. Actor 0 is the
    /// sentinel and never a valid target here.
    fn actor_operand(&mut self, mask: u8) -> VmResult<i32> {
        let act = self.get_var_or_direct_byte(mask)?;
        if act == 0 || !self.actors.is_valid(act) {
            return Err(FatalError::InvalidActor(act));
        }
        Ok(act)
    }

    pub(super) fn op_put_actor(&mut self) -> VmResult<()> {
        let act = self.actor_operand(PARAM_1)?;
        let x = self.get_var_or_direct_word(PARAM_2)?;
        let y = self.get_var_or_direct_word(PARAM_3)?;
        let room = self.actors.get(act)?.room;
        self.put_actor(act, x, y, room)
    }

    pub(super) fn op_put_actor_at_object(&mut self) -> VmResult<()> {
        let act = self.actor_operand(PARAM_1)?;
        let obj = self.get_var_or_direct_word(PARAM_2)?;
        let (x, y) = match self.objects.where_is(obj) {
            ObjectLocation::NotFound => LOST_OBJECT_POS,
            _ => self.object_or_actor_xy(obj).unwrap_or(LOST_OBJECT_POS),
        };
        let room = self.actors.get(act)?.room;
        self.put_actor(act, x, y, room)
    }

    pub(super) fn op_put_actor_in_room(&mut self) -> VmResult<()> {
        let act = self.actor_operand(PARAM_1)?;
        let room = self.get_var_or_direct_byte(PARAM_2)?;
        let visible = self.actors.get(act)?.visible;
        if visible && self.room.number != room && self.var(self.layout.talk_actor) == act {
            self.stop_talk()?;
        }
        self.actors.get_mut(act)?.room = room;
        if room == 0 {
            self.put_actor(act, 0, 0, 0)?;
        }
        Ok(())
    }

    fn set_actor_costume(&mut self, act: i32, costume: i32) -> VmResult<()> {
        let current_room = self.room.number;
        let player = self.is_player(act);
        let palette_len = if self.traits.new_costumes { 256 } else { NUM_ACTOR_PALETTE };
        let actor = self.actors.get_mut(act)?;
        if actor.visible {
            actor.hide();
            actor.costume = costume;
            actor.show(current_room, &self.boxes, player);
        } else {
            actor.costume = costume;
        }
        actor.anim_counter = 0;
        actor.anim_progress = 0;
        actor.palette = vec![0xFF; palette_len];
        if self.traits.new_costumes && actor.visible && costume != 0 {
            self.resources.ensure_loaded(ResourceKind::Costume, costume as u16)?;
        }
        Ok(())
    }

    /// Sub-opcode loop configuring one actor. Small-header titles number
    /// the sub-opcodes differently and go through a translation table.
    pub(super) fn op_actor_ops(&mut self) -> VmResult<()> {
        let act = self.get_var_or_direct_byte(PARAM_1)?;
        self.actors.get(act)?;
        loop {
            let raw = self.fetch_byte()?;
            if raw == 0xFF {
                break;
            }
            self.opcode = raw;
            if self.traits.small_header {
                let converted = ((raw & 0x1F) as usize)
                    .checked_sub(1)
                    .and_then(|i| V4_ACTOR_OPS_CONVERT.get(i))
                    .ok_or(FatalError::UnknownSubOpcode {
                        op: "actorOps",
                        sub: raw,
                    })?;
                self.opcode = (raw & 0xE0) | converted;
            }
            match self.opcode & 0x1F {
                0 => {
                    self.get_var_or_direct_byte(PARAM_1)?;
                }
                1 => {
                    let costume = self.get_var_or_direct_byte(PARAM_1)?;
                    self.set_actor_costume(act, costume)?;
                }
                2 => {
                    let x = self.get_var_or_direct_byte(PARAM_1)?;
                    let y = self.get_var_or_direct_byte(PARAM_2)?;
                    self.actors.get_mut(act)?.set_walk_speed(x, y);
                }
                3 => self.actors.get_mut(act)?.sound = self.get_var_or_direct_byte(PARAM_1)?,
                4 => self.actors.get_mut(act)?.walk_frame = self.get_var_or_direct_byte(PARAM_1)?,
                5 => {
                    let start = self.get_var_or_direct_byte(PARAM_1)?;
                    let stop = self.get_var_or_direct_byte(PARAM_2)?;
                    let actor = self.actors.get_mut(act)?;
                    actor.talk_start_frame = start;
                    actor.talk_stop_frame = stop;
                }
                6 => self.actors.get_mut(act)?.stand_frame = self.get_var_or_direct_byte(PARAM_1)?,
                7 => {
                    self.get_var_or_direct_byte(PARAM_1)?;
                    self.get_var_or_direct_byte(PARAM_2)?;
                    self.get_var_or_direct_byte(PARAM_3)?;
                }
                8 => self.actors.get_mut(act)?.init(0),
                9 => {
                    let elevation = self.get_var_or_direct_word(PARAM_1)?;
                    let actor = self.actors.get_mut(act)?;
                    actor.elevation = elevation;
                    actor.need_redraw = true;
                }
                10 => {
                    let actor = self.actors.get_mut(act)?;
                    actor.init_frame = 1;
                    actor.walk_frame = 2;
                    actor.stand_frame = 3;
                    actor.talk_start_frame = 4;
                    actor.talk_stop_frame = 5;
                }
                11 => {
                    let index = self.get_var_or_direct_byte(PARAM_1)?;
                    let value = self.get_var_or_direct_byte(PARAM_2)?;
                    let actor = self.actors.get_mut(act)?;
                    actor.set_palette(index, value)?;
                    actor.need_redraw = true;
                }
                12 => {
                    let color = self.get_var_or_direct_byte(PARAM_1)?;
                    if act == 0 {
                        self.text_slots[0].default.color = color;
                    } else {
                        self.actors.get_mut(act)?.talk_color = color;
                    }
                }
                13 => {
                    let name = self.fetch_inline_string()?;
                    self.resources.create(ResourceKind::ActorName, act as u16, name);
                }
                14 => self.actors.get_mut(act)?.init_frame = self.get_var_or_direct_byte(PARAM_1)?,
                16 => self.actors.get_mut(act)?.width = self.get_var_or_direct_byte(PARAM_1)?,
                17 => {
                    let x = self.get_var_or_direct_byte(PARAM_1)?;
                    let y = self.get_var_or_direct_byte(PARAM_2)?;
                    let actor = self.actors.get_mut(act)?;
                    actor.scale_x = x;
                    actor.scale_y = y;
                    actor.need_redraw = true;
                }
                18 => self.actors.get_mut(act)?.force_clip = 0,
                19 => self.actors.get_mut(act)?.force_clip = self.get_var_or_direct_byte(PARAM_1)?,
                20 | 21 => {
                    let actor = self.actors.get_mut(act)?;
                    actor.ignore_boxes = self.opcode & 1 == 0;
                    actor.force_clip = 0;
                    if actor.is_in_room(self.room.number) {
                        let (x, y, room) = (actor.x, actor.y, actor.room);
                        self.put_actor(act, x, y, room)?;
                    }
                }
                22 => {
                    let speed = self.get_var_or_direct_byte(PARAM_1)?;
                    let actor = self.actors.get_mut(act)?;
                    actor.anim_speed = speed;
                    actor.anim_progress = 0;
                }
                23 => self.actors.get_mut(act)?.shadow_mode = self.get_var_or_direct_byte(PARAM_1)?,
                _ => {
                    return Err(FatalError::UnknownSubOpcode {
                        op: "actorOps",
                        sub: raw,
                    })
                }
            }
        }
        Ok(())
    }

    pub(super) fn op_walk_actor_to(&mut self) -> VmResult<()> {
        let act = self.actor_operand(PARAM_1)?;
        let x = self.get_var_or_direct_word(PARAM_2)?;
        let y = self.get_var_or_direct_word(PARAM_3)?;
        self.walk_actor(act, x, y, -1)
    }

    /// Walks next to another actor, on the side the walker comes from.
    /// A distance of 0xFF derives the gap from both actors' scaled widths.
    pub(super) fn op_walk_actor_to_actor(&mut self) -> VmResult<()> {
        let nr = self.actor_operand(PARAM_1)?;
        let nr2 = self.actor_operand(PARAM_2)?;
        let mut dist = self.fetch_byte()? as i32;
        let room = self.room.number;

        let a = self.actors.get(nr)?;
        if !a.is_in_room(room) {
            return Ok(());
        }
        let b = self.actors.get(nr2)?;
        if !b.is_in_room(room) {
            return Ok(());
        }
        if dist == 0xFF {
            dist = a.scale_x * a.width / 0xFF;
            dist += (b.scale_x * b.width / 0xFF) / 2;
        }
        let x = if b.x < a.x { b.x + dist } else { b.x - dist };
        let y = b.y;
        self.walk_actor(nr, x, y, -1)
    }

    pub(super) fn op_walk_actor_to_object(&mut self) -> VmResult<()> {
        let act = self.actor_operand(PARAM_1)?;
        let obj = self.get_var_or_direct_word(PARAM_2)?;
        if self.objects.where_is(obj) == ObjectLocation::NotFound {
            return Ok(());
        }
        let target = if self.objects.where_is(obj) == ObjectLocation::Room {
            self.object_walk_position(obj)
        } else {
            self.object_or_actor_xy(obj).map(|(x, y)| (x, y, -1))
        };
        if let Some((x, y, dir)) = target {
            self.walk_actor(act, x, y, dir)?;
        }
        Ok(())
    }

    fn object_or_actor_width(&self, obj: i32) -> i32 {
        if self.is_actor(obj) {
            return self.actors.get(obj).map_or(0, |a| a.width);
        }
        self.objects.room_object(obj).map_or(0, |o| o.width)
    }

    /// Turns toward an object or actor. Small-header titles pick a vertical
    /// facing when the target is within half its width.
    pub(super) fn op_face_actor(&mut self) -> VmResult<()> {
        let act = self.actor_operand(PARAM_1)?;
        let obj = self.get_var_or_direct_word(PARAM_2)?;
        let room = self.room.number;
        let actor = self.actors.get(act)?;
        if !actor.is_in_room(room) {
            return Ok(());
        }
        let Some((x2, y2)) = self.object_or_actor_xy(obj) else {
            return Ok(());
        };
        let (x, y) = (actor.x, actor.y);
        let dir = if self.traits.small_header {
            let width = self.object_or_actor_width(obj);
            let mut old = if x < x2 { 1 } else { 0 };
            if (x - x2).abs() < width / 2 {
                old = if y > y2 { 3 } else { 2 };
            }
            old_dir_to_new_dir(old)
        } else if x2 > x {
            90
        } else {
            270
        };
        self.actors.get_mut(act)?.turn_to_direction(dir);
        Ok(())
    }

    pub(super) fn op_animate_actor(&mut self) -> VmResult<()> {
        let act = self.actor_operand(PARAM_1)?;
        let anim = self.get_var_or_direct_byte(PARAM_2)?;
        let room = self.room.number;
        let actor = self.actors.get_mut(act)?;
        let in_room = actor.is_in_room(room);
        actor.animate(anim, in_room);
        Ok(())
    }

    pub(super) fn op_actor_from_pos(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let x = self.get_var_or_direct_word(PARAM_1)?;
        let y = self.get_var_or_direct_word(PARAM_2)?;
        let hit = self.actors.actor_at(x, y, self.room.number).unwrap_or(0);
        self.set_result(hit as i32)
    }

    pub(super) fn op_actor_follow_camera(&mut self) -> VmResult<()> {
        let act = self.get_var_or_direct_byte(PARAM_1)?;
        self.actor_follow_camera(act)
    }

    fn object_coordinate(&self, obj: i32, is_y: bool) -> VmResult<i32> {
        if obj < 1 {
            return Ok(0);
        }
        if self.is_actor(obj) {
            let actor = self.actors.get(obj)?;
            return Ok(if is_y { actor.y } else { actor.x });
        }
        if self.objects.where_is(obj) == ObjectLocation::NotFound {
            return Ok(-1);
        }
        Ok(self
            .object_or_actor_xy(obj)
            .map_or(-1, |(x, y)| if is_y { y } else { x }))
    }

    pub(super) fn op_get_actor_xy(&mut self, is_y: bool) -> VmResult<()> {
        self.get_result_pos()?;
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let value = self.object_coordinate(obj, is_y)?;
        self.set_result(value)
    }

    pub(super) fn op_get_actor_room(&mut self) -> VmResult<()> {
        self.op_actor_query(|a| a.room)
    }

    pub(super) fn op_actor_query(&mut self, query: impl Fn(&Actor) -> i32) -> VmResult<()> {
        self.get_result_pos()?;
        let act = self.actor_operand(PARAM_1)?;
        let value = query(self.actors.get(act)?);
        self.set_result(value)
    }

    /// Chessboard distance between two objects or actors; 0xFF when either
    /// one has no position in the current room.
    pub(crate) fn get_obj_act_to_obj_act_dist(&self, a: i32, b: i32) -> i32 {
        let acta = self.is_actor(a).then(|| self.actors.get(a).ok()).flatten();
        let actb = self.is_actor(b).then(|| self.actors.get(b).ok()).flatten();
        if let (Some(x), Some(y)) = (acta, actb) {
            if x.room == y.room && x.room != 0 && !x.is_in_room(self.room.number) {
                return 0;
            }
        }
        let Some((x, y)) = self.object_or_actor_xy(a) else {
            return 0xFF;
        };
        let Some((mut x2, mut y2)) = self.object_or_actor_xy(b) else {
            return 0xFF;
        };
        if let (Some(walker), None) = (acta, actb) {
            if !walker.ignore_boxes {
                let fit = self.boxes.adjust_xy_to_be_in_box(x2, y2, self.is_player(a));
                x2 = fit.x;
                y2 = fit.y;
            }
        }
        (x - x2).abs().max((y - y2).abs())
    }

    pub(super) fn op_get_dist(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let o1 = self.get_var_or_direct_word(PARAM_1)?;
        let o2 = self.get_var_or_direct_word(PARAM_2)?;
        let dist = self.get_obj_act_to_obj_act_dist(o1, o2);
        self.set_result(dist)
    }

    /// Nearest actor in `[VAR_ACTOR_RANGE_MIN, VAR_ACTOR_RANGE_MAX]`;
    /// distances of 0xFF and beyond never qualify.
    pub(super) fn op_get_closest_obj_actor(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let act = self.get_var_or_direct_word(PARAM_1)?;
        let min = self.var(self.layout.actor_range_min);
        let mut obj = self.var(self.layout.actor_range_max);
        let mut closest = (0xFF, 0xFF);
        loop {
            let dist = self.get_obj_act_to_obj_act_dist(act, obj);
            if dist < closest.1 {
                closest = (obj, dist);
            }
            obj -= 1;
            if obj < min {
                break;
            }
        }
        debug!("closest to {act}: {} at {}", closest.0, closest.1);
        self.set_result(closest.0)
    }
}

impl Vm {
    /// `setClass 0` on a small-header actor also drops its box overrides.
    pub(crate) fn reset_actor_class_flags(&mut self, obj: i32) -> VmResult<()> {
        if self.traits.small_header && self.is_actor(obj) {
            let actor = self.actors.get_mut(obj)?;
            actor.ignore_boxes = false;
            actor.force_clip = 0;
        } else if self.traits.small_header && obj == 0 {
            warn!("setClass 0 on the actor sentinel");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::FatalError;
    use crate::resources::ResourceKind;
    use crate::vm::test_support::VmBuilder;
    use crate::vm::Vm;

    fn vm_in_room(code: &[u8], v4: bool) -> Vm {
        let builder = if v4 { VmBuilder::v4() } else { VmBuilder::v5() };
        let mut vm = builder.script(1, code).build();
        vm.room.number = 1;
        vm.room.width = 640;
        vm.room.height = 200;
        vm
    }

    fn place(vm: &mut Vm, act: i32, x: i32, y: i32) {
        let actor = vm.actors.get_mut(act).unwrap();
        actor.room = 1;
        actor.x = x;
        actor.y = y;
    }

    #[test]
    fn put_actor_keeps_the_actor_room() {
        let mut vm = vm_in_room(&[0x01, 0x02, 0x30, 0x00, 0x50, 0x00, 0x00], false);
        vm.actors.get_mut(2).unwrap().room = 1;
        vm.run_script(1, false, false, &[]).unwrap();
        let actor = vm.actors().get(2).unwrap();
        assert_eq!((actor.x, actor.y, actor.room), (0x30, 0x50, 1));
        assert!(actor.visible);
    }

    #[test]
    fn actor_ops_configure_the_record() {
        let vm_code = [
            0x13, 0x03, //
            0x01, 0x07, // costume 7
            0x02, 0x04, 0x01, // walk speed 4,1
            0x0B, 0x02, 0x09, // palette[2] = 9
            0x0D, b'B', b'o', b'b', 0x00, // name
            0x10, 0x20, // width
            0x14, // ignore boxes
            0xFF, 0x00,
        ];
        let mut vm = vm_in_room(&vm_code, false);
        vm.run_script(1, false, false, &[]).unwrap();
        let actor = vm.actors().get(3).unwrap();
        assert_eq!(actor.costume, 7);
        assert_eq!((actor.speed_x, actor.speed_y), (4, 1));
        assert_eq!(actor.palette[2], 9);
        assert_eq!(actor.palette[3], 0xFF);
        assert_eq!(actor.width, 0x20);
        assert!(actor.ignore_boxes);
        let name = vm.resources().peek(ResourceKind::ActorName, 3).unwrap();
        assert_eq!(&name[..], b"Bob");
    }

    #[test]
    fn small_header_actor_ops_are_translated() {
        // 0x04 is the v4 walk speed, 0x02 a one-operand filler
        let mut vm = vm_in_room(&[0x13, 0x01, 0x04, 0x06, 0x03, 0x02, 0x09, 0xFF, 0x00], true);
        vm.run_script(1, false, false, &[]).unwrap();
        let actor = vm.actors().get(1).unwrap();
        assert_eq!((actor.speed_x, actor.speed_y), (6, 3));

        let mut vm = vm_in_room(&[0x13, 0x01, 0x15, 0xFF], true);
        assert!(matches!(
            vm.run_script(1, false, false, &[]),
            Err(FatalError::UnknownSubOpcode { op: "actorOps", sub: 0x15 })
        ));
    }

    #[test]
    fn actor_zero_talk_colour_sets_the_default() {
        let mut vm = vm_in_room(&[0x13, 0x00, 0x0C, 0x05, 0xFF, 0x00], false);
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.text_slots[0].default.color, 5);
    }

    #[test]
    fn queries_reject_the_sentinel() {
        let mut vm = vm_in_room(&[0x71, 0x0A, 0x00, 0x00], false);
        assert!(matches!(
            vm.run_script(1, false, false, &[]),
            Err(FatalError::InvalidActor(0))
        ));
    }

    #[test]
    fn queries_read_actor_fields() {
        // v10 = costume(4); v11 = facing(4); v12 = x(4)
        let mut vm = vm_in_room(
            &[0x71, 0x0A, 0x00, 0x04, 0x63, 0x0B, 0x00, 0x04, 0x43, 0x0C, 0x00, 0x04, 0x00, 0x00],
            false,
        );
        place(&mut vm, 4, 77, 90);
        vm.actors.get_mut(4).unwrap().costume = 12;
        vm.actors.get_mut(4).unwrap().facing = 90;
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(10).unwrap(), 12);
        assert_eq!(vm.vars().get(11).unwrap(), 1);
        assert_eq!(vm.vars().get(12).unwrap(), 77);
    }

    #[test]
    fn distance_is_chessboard_and_ff_when_absent() {
        // v10 = dist(1, 2); v11 = dist(1, 3)
        let mut vm = vm_in_room(
            &[
                0x34, 0x0A, 0x00, 0x01, 0x00, 0x02, 0x00, //
                0x34, 0x0B, 0x00, 0x01, 0x00, 0x03, 0x00, //
                0x00,
            ],
            false,
        );
        place(&mut vm, 1, 10, 10);
        place(&mut vm, 2, 40, 20);
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(10).unwrap(), 30);
        assert_eq!(vm.vars().get(11).unwrap(), 0xFF);
    }

    #[test]
    fn closest_actor_scans_the_range() {
        let mut vm = vm_in_room(&[0x66, 0x0A, 0x00, 0x01, 0x00, 0x00], false);
        place(&mut vm, 1, 10, 10);
        place(&mut vm, 2, 60, 10);
        place(&mut vm, 3, 20, 12);
        let layout = vm.layout().clone();
        vm.set_var(layout.actor_range_min, 2);
        vm.set_var(layout.actor_range_max, 4);
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(10).unwrap(), 3);
    }

    #[test]
    fn face_actor_turns_toward_the_target() {
        let mut vm = vm_in_room(&[0x09, 0x01, 0x02, 0x00, 0x00], false);
        place(&mut vm, 1, 10, 10);
        place(&mut vm, 2, 50, 10);
        vm.run_script(1, false, false, &[]).unwrap();
        let actor = vm.actors().get(1).unwrap();
        assert_eq!(actor.target_facing, 90);
        assert!(actor.is_moving());
    }

    #[test]
    fn put_actor_in_room_zero_parks_the_actor() {
        let mut vm = vm_in_room(&[0x2D, 0x02, 0x00, 0x00], false);
        place(&mut vm, 2, 30, 30);
        vm.run_script(1, false, false, &[]).unwrap();
        let actor = vm.actors().get(2).unwrap();
        assert_eq!((actor.x, actor.y, actor.room), (0, 0, 0));
    }

    #[test]
    fn walk_to_actor_stops_short_by_the_gap() {
        let mut vm = vm_in_room(&[0x0D, 0x01, 0x02, 0x0A, 0x00], false);
        place(&mut vm, 1, 10, 50);
        place(&mut vm, 2, 100, 50);
        vm.actors.get_mut(1).unwrap().ignore_boxes = true;
        vm.run_script(1, false, false, &[]).unwrap();
        let actor = vm.actors().get(1).unwrap();
        assert_eq!(actor.walk.dest_x, 90);
        assert!(actor.is_moving());
    }
}
