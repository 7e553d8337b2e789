//! Room changes and the camera glue between the controller and the
//! variables scripts observe.

use bytes::Bytes;
use log::{debug, info, warn};
use scumm_formats::RoomData;

use crate::camera::{CameraMode, CameraPoint, CameraSpeed};
use crate::error::{FatalError, VmResult};
use crate::objects::{ObjectLocation, RoomObject};
use crate::resources::ResourceKind;

use super::{ScriptSource, Vm};

impl Vm {
    /// Leaves the current room and enters `room`. With `ego`, that actor
    /// is placed at object `obj`'s walk position before the entry code runs.
    pub fn start_scene(&mut self, room: i32, ego: Option<i32>, obj: i32) -> VmResult<()> {
        info!("loading room {room}");
        self.talk.text.clear();
        self.effects.new_effect = self.effects.switch_in;

        if let Some(cur) = self.current {
            let slot = &self.slots[cur];
            if slot.source.is_room_bound() {
                if slot.cutscene_override != 0 {
                    return Err(FatalError::ActiveCutscene {
                        script: slot.number,
                    });
                }
                self.current = None;
            }
        }

        if !self.traits.small_header {
            self.set_var(self.layout.new_room, room);
        }

        self.run_exit_script()?;
        self.kill_scripts_and_resources();
        self.palette.stop_cycle(0)?;

        for actor in self.actors.iter_mut() {
            actor.hide();
        }
        self.palette.reset_for_room();

        self.set_var(self.layout.room, room);
        self.full_redraw = true;
        self.screen.clear_text_mask();
        self.screen.mark_all_dirty();
        self.resources.increase_resource_counter();

        self.room.number = room;
        self.room.resource = self.map_room(room) as u16;
        self.set_var(self.layout.room_resource, self.room.resource as i32);

        self.objects.clear_room();
        self.room.local_scripts.clear();
        self.room.entry_code = None;
        self.room.exit_code = None;
        self.boxes.load(&[]);

        if room == 0 {
            return Ok(());
        }
        self.load_room_blocks()?;

        let half_w = self.traits.screen_width / 2;
        let half_h = self.traits.screen_height / 2;
        self.set_var(self.layout.camera_min_x, half_w);
        self.set_var(self.layout.camera_max_x, self.room.width - half_w);
        if self.traits.new_camera {
            self.set_var(self.layout.camera_min_y, half_h);
            self.set_var(self.layout.camera_max_y, self.room.height - half_h);
            self.set_camera_at(half_w, half_h)?;
        } else {
            self.camera.mode = CameraMode::Normal;
            self.camera.cur = CameraPoint {
                x: half_w,
                y: half_h,
            };
            self.camera.dest = self.camera.cur;
            let bounds = self.camera_bounds();
            self.camera.camera_moved(&bounds, false);
        }
        self.camera.last = self.camera.cur;

        if self.room.resource == 0 {
            return Ok(());
        }

        if let Some(actor) = ego {
            self.place_at_object(actor, obj, true)?;
        }

        let current_room = self.room.number;
        for number in 1..self.actors.len() as i32 {
            let player = self.is_player(number);
            let actor = self.actors.get_mut(number)?;
            if actor.is_in_room(current_room) {
                actor.show(current_room, &self.boxes, player);
            }
        }

        self.ego_positioned = false;
        self.run_entry_script()?;
        if let Some(actor) = ego {
            if !self.traits.small_header && !self.ego_positioned {
                self.place_at_object(actor, obj, false)?;
            }
        }
        debug!("room {room} entered");
        Ok(())
    }

    pub(crate) fn place_at_object(&mut self, actor: i32, obj: i32, turn: bool) -> VmResult<()> {
        if self.objects.where_is(obj) != ObjectLocation::Room {
            return Err(FatalError::InvalidObject(obj));
        }
        let Some((x, y, dir)) = self.object_walk_position(obj) else {
            return Err(FatalError::InvalidObject(obj));
        };
        let room = self.room.number;
        self.put_actor(actor, x, y, room)?;
        let actor = self.actors.get_mut(actor)?;
        if turn {
            actor.set_direction(dir + 180);
        }
        actor.stop_moving();
        Ok(())
    }

    /// Installs the sub-blocks of the room resource: dimensions, palette,
    /// cycles, boxes, scripts and objects.
    fn load_room_blocks(&mut self) -> VmResult<()> {
        let block = self
            .resources
            .require(ResourceKind::Room, self.room.resource)?;
        let data = RoomData::parse(&block)?;

        self.room.width = data.width as i32;
        self.room.height = data.height as i32;
        self.room.local_scripts = data
            .local_scripts
            .into_iter()
            .map(|(id, code)| (id as u16, Bytes::from(code)))
            .collect();
        self.room.entry_code = data.entry_code.map(Bytes::from);
        self.room.exit_code = data.exit_code.map(Bytes::from);

        if let Some(clut) = data.palette.as_deref() {
            self.palette.load_room_palette(clut)?;
        }
        self.palette.load_cycles(&data.cycles)?;
        self.boxes.load(&data.boxes);
        self.objects.load_room(&data.objects);
        debug!(
            "room {}: {}x{}, {} objects, {} local scripts",
            self.room.number,
            self.room.width,
            self.room.height,
            data.objects.len(),
            self.room.local_scripts.len()
        );
        Ok(())
    }

    fn run_exit_script(&mut self) -> VmResult<()> {
        let script = self.var(self.layout.exit_script);
        if script != 0 {
            self.run_script(script as u16, false, false, &[])?;
        }
        self.run_room_script(ScriptSource::RoomExit)?;
        let script = self.var(self.layout.exit_script2);
        if script != 0 {
            self.run_script(script as u16, false, false, &[])?;
        }
        Ok(())
    }

    fn run_entry_script(&mut self) -> VmResult<()> {
        let script = self.var(self.layout.entry_script);
        if script != 0 {
            self.run_script(script as u16, false, false, &[])?;
        }
        self.run_room_script(ScriptSource::RoomEntry)?;
        let script = self.var(self.layout.entry_script2);
        if script != 0 {
            self.run_script(script as u16, false, false, &[])?;
        }
        Ok(())
    }

    /// Kills every slot running code of the room being left and drops the
    /// names scripts gave to its objects.
    fn kill_scripts_and_resources(&mut self) {
        for i in 1..self.slots.len() {
            let slot = &self.slots[i];
            if !slot.is_live() || !slot.source.is_room_bound() {
                continue;
            }
            if slot.cutscene_override != 0 {
                warn!(
                    "script {} stopped with active cutscene/override in exit",
                    slot.number
                );
            }
            self.kill_slot(i);
        }
        self.objects.forget_room_names();
    }

    /// Copies object `obj` of `room` into the current room's object list.
    pub(crate) fn load_floating_object(&mut self, obj: i32, room: i32) -> VmResult<()> {
        let already = u16::try_from(obj)
            .map(|id| self.objects.floating().contains_key(&id))
            .unwrap_or(false);
        if already {
            debug!("floating object {obj} already loaded");
            return Ok(());
        }
        let code = self.object_code_in_room(obj, room)?;
        self.objects
            .add_floating(RoomObject::from_code(&code), room as u16)?;
        debug!("floating object {obj} loaded from room {room}");
        Ok(())
    }

    fn run_scroll_script(&mut self) -> VmResult<()> {
        let script = self.var(self.layout.scroll_script);
        if script != 0 {
            self.set_var(self.layout.camera_pos_x, self.camera.cur.x);
            self.run_script(script as u16, false, false, &[])?;
        }
        Ok(())
    }

    /// Points the camera at `(x, y)` and runs the scroll script.
    pub fn set_camera_at(&mut self, x: i32, y: i32) -> VmResult<()> {
        let bounds = self.camera_bounds();
        let before = self.camera.cur;
        let new_camera = self.traits.new_camera;
        self.camera.set_at(x, y, &bounds, new_camera);
        if !new_camera {
            self.camera.camera_moved(&bounds, false);
        }
        self.set_var(self.layout.camera_pos_x, self.camera.cur.x);
        self.set_var(self.layout.camera_pos_y, self.camera.cur.y);
        if !new_camera || self.camera.cur != before {
            self.run_scroll_script()?;
        }
        if self.camera.cur != before {
            self.screen.mark_all_dirty();
        }
        Ok(())
    }

    /// `setCameraAt` form: stop following and jump.
    pub(crate) fn set_camera_at_ex(&mut self, x: i32) -> VmResult<()> {
        self.camera.mode = CameraMode::Normal;
        self.camera.cur.x = x;
        self.set_camera_at(x, 0)?;
        self.camera.moving_to_actor = false;
        Ok(())
    }

    /// Makes the camera follow `act`, entering the actor's room when it is
    /// elsewhere and recentring when the actor is outside the trigger band.
    pub fn set_camera_follows(&mut self, act: i32) -> VmResult<()> {
        let (x, y, room) = {
            let actor = self.actors.get(act)?;
            (actor.x, actor.y, actor.room)
        };
        self.camera.follow(act);
        if self.traits.new_camera {
            if room != self.room.number {
                self.start_scene(room, None, 0)?;
            }
            return self.set_camera_at(x, y);
        }

        if room == 0 || room != self.room.number {
            self.start_scene(room, None, 0)?;
            self.camera.follow(act);
            self.camera.cur.x = x;
            self.set_camera_at(x, 0)?;
        }
        if self.camera.outside_band(x) {
            self.set_camera_at(x, 0)?;
        }
        let current_room = self.room.number;
        for actor in self.actors.iter_mut().filter(|a| a.is_in_room(current_room)) {
            actor.need_redraw = true;
        }
        self.run_inventory_script(0)
    }

    pub(crate) fn actor_follow_camera(&mut self, act: i32) -> VmResult<()> {
        let before = self.camera.follows;
        self.set_camera_follows(act)?;
        if self.camera.follows != before {
            self.run_inventory_script(0)?;
        }
        self.camera.moving_to_actor = false;
        Ok(())
    }

    /// One camera step, once per tick after the scripts ran.
    pub(crate) fn move_camera(&mut self) -> VmResult<()> {
        let bounds = self.camera_bounds();
        let followed = if self.camera.follows != 0 {
            let room = self.room.number;
            self.actors
                .get(self.camera.follows)
                .ok()
                .filter(|a| a.is_in_room(room))
                .map(|a| CameraPoint { x: a.x, y: a.y })
        } else {
            None
        };

        let step = if self.traits.new_camera {
            let l = &self.layout;
            let mut speed = CameraSpeed {
                threshold_x: self.var(l.camera_threshold_x),
                threshold_y: self.var(l.camera_threshold_y),
                speed_x: self.var(l.camera_speed_x),
                speed_y: self.var(l.camera_speed_y),
                accel_x: self.var(l.camera_accel_x),
                accel_y: self.var(l.camera_accel_y),
            };
            let step = self.camera.step_new(followed, &bounds, &mut speed);
            self.set_var(self.layout.camera_speed_x, speed.speed_x);
            self.set_var(self.layout.camera_speed_y, speed.speed_y);
            self.set_var(self.layout.camera_pos_x, self.camera.cur.x);
            self.set_var(self.layout.camera_pos_y, self.camera.cur.y);
            step
        } else {
            self.camera.step_classic(followed, &bounds)
        };

        if step.moved {
            self.screen.mark_all_dirty();
            self.run_scroll_script()?;
        }
        let dx = self.camera.cur.x - self.camera.last.x;
        let dy = self.camera.cur.y - self.camera.last.y;
        if dx != 0 || dy != 0 {
            self.screen.scroll_text_mask(-dx, -dy);
        }
        self.camera.last = self.camera.cur;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use scumm_formats::chunk::{build_chunk, ENCD, EXCD};
    use scumm_formats::writer::{local_script_block, object_block, room_block, ObjectSpec};
    use scumm_formats::Rect;

    use crate::camera::CameraMode;
    use crate::objects::{ObjectLocation, OWNER_ROOM};
    use crate::vm::test_support::VmBuilder;
    use crate::vm::Vm;

    /// Room 1: entry code sets v20, exit code sets v21; local script 200.
    /// Room 2: 640 wide with a door object 30.
    fn two_rooms() -> Vm {
        let room1 = room_block(
            320,
            144,
            &[
                build_chunk(ENCD, &[0x1A, 0x14, 0x00, 0x01, 0x00, 0x00]),
                build_chunk(EXCD, &[0x1A, 0x15, 0x00, 0x02, 0x00, 0x00]),
                local_script_block(200, &[0x1A, 0x16, 0x00, 0x03, 0x00, 0x00]),
            ],
        );
        let room2 = room_block(
            640,
            144,
            &[object_block(&ObjectSpec {
                id: 30,
                x: 64,
                y: 8,
                width: 16,
                height: 32,
                walk_x: 400,
                walk_y: 120,
                actor_dir: 1,
                name: "door".into(),
                ..ObjectSpec::default()
            })],
        );
        let mut vm = VmBuilder::v5().room(1, room1).room(2, room2).build();
        vm.objects.set_owner(30, OWNER_ROOM as i32).unwrap();
        let ego = vm.layout().ego;
        vm.set_var(ego, 1);
        vm
    }

    #[test]
    fn entering_and_leaving_runs_room_code() {
        let mut vm = two_rooms();
        vm.start_scene(1, None, 0).unwrap();
        assert_eq!(vm.current_room(), 1);
        assert_eq!(vm.vars().get(20).unwrap(), 1);
        assert_eq!(vm.vars().get(4).unwrap(), 1);
        vm.run_script(200, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(22).unwrap(), 3);

        vm.start_scene(2, None, 0).unwrap();
        assert_eq!(vm.vars().get(21).unwrap(), 2);
        assert_eq!(vm.room.width, 640);
        assert!(vm.room.local_scripts.is_empty());
        assert_eq!(vm.vars().get(17).unwrap(), 160);
        assert_eq!(vm.objects().where_is(30), ObjectLocation::Room);
    }

    #[test]
    fn ego_is_placed_at_the_object_walk_position() {
        let mut vm = two_rooms();
        vm.actors.get_mut(1).unwrap().costume = 1;
        vm.start_scene(2, Some(1), 30).unwrap();
        let actor = vm.actors().get(1).unwrap();
        assert_eq!((actor.x, actor.y, actor.room), (400, 120, 2));
        assert!(actor.visible);
        assert!(!actor.is_moving());
    }

    #[test]
    fn room_zero_clears_everything() {
        let mut vm = two_rooms();
        vm.start_scene(2, None, 0).unwrap();
        vm.start_scene(0, None, 0).unwrap();
        assert_eq!(vm.current_room(), 0);
        assert!(vm.objects().room_objects().is_empty());
    }

    #[test]
    fn following_an_actor_recentres_outside_the_band() {
        let mut vm = two_rooms();
        vm.start_scene(2, None, 0).unwrap();
        vm.put_actor(2, 500, 100, 2).unwrap();
        vm.set_camera_follows(2).unwrap();
        assert_eq!(vm.camera().mode, CameraMode::FollowActor);
        assert_eq!(vm.camera().cur.x, 480);
        assert_eq!(vm.vars().get(2).unwrap(), 480);
    }

    #[test]
    fn following_an_actor_in_another_room_switches_rooms() {
        let mut vm = two_rooms();
        vm.start_scene(1, None, 0).unwrap();
        vm.put_actor(3, 200, 100, 2).unwrap();
        vm.set_camera_follows(3).unwrap();
        assert_eq!(vm.current_room(), 2);
        assert_eq!(vm.camera().follows, 3);
        assert_eq!(vm.camera().cur.x, 200);
    }

    #[test]
    fn camera_steps_toward_the_destination() {
        let mut vm = two_rooms();
        vm.start_scene(2, None, 0).unwrap();
        vm.camera.pan_to(320, 0);
        for _ in 0..4 {
            vm.move_camera().unwrap();
        }
        assert_eq!(vm.camera().cur.x, 192);
    }

    #[test]
    fn printed_text_mask_scrolls_with_the_camera() {
        let room2 = room_block(640, 144, &[]);
        let print_ab = [
            0x14, 0xFE, 0x00, 40, 0x00, 20, 0x00, 0x0F, b'a', b'b', 0x00, 0x00,
        ];
        let mut vm = VmBuilder::v5().room(2, room2).script(5, &print_ab).build();
        vm.start_scene(2, None, 0).unwrap();
        assert_eq!(vm.screen().text_mask(), None);
        vm.run_script(5, false, false, &[]).unwrap();
        assert_eq!(vm.screen().text_mask(), Some(Rect::new(40, 20, 56, 28)));

        vm.camera.pan_to(320, 0);
        for _ in 0..4 {
            vm.move_camera().unwrap();
        }
        assert_eq!(vm.camera().cur.x, 192);
        assert_eq!(vm.screen().text_mask(), Some(Rect::new(8, 20, 24, 28)));

        vm.move_camera().unwrap();
        assert_eq!(vm.screen().text_mask(), Some(Rect::new(0, 20, 16, 28)));
        vm.start_scene(2, None, 0).unwrap();
        assert_eq!(vm.screen().text_mask(), None);
    }

    #[test]
    fn floating_objects_come_from_their_room() {
        let mut vm = two_rooms();
        vm.start_scene(1, None, 0).unwrap();
        vm.load_floating_object(30, 2).unwrap();
        vm.load_floating_object(30, 2).unwrap();
        assert_eq!(vm.objects().room_objects().len(), 1);
        assert_eq!(vm.objects().where_is(30), ObjectLocation::Room);
    }
}
