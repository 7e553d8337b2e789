//! Object ownership, state, classes and the inventory.

use log::{debug, warn};
use scumm_formats::{ObjectCode, Rect, RoomData};

use crate::error::{FatalError, VmResult};
use crate::objects::{InventoryItem, ObjectLocation, CLASS_ALWAYS_CLIP, CLASS_IGNORE_BOXES, CLASS_UNTOUCHABLE, OWNER_ROOM};
use crate::resources::ResourceKind;

use super::fetch::{PARAM_1, PARAM_2, PARAM_3};
use super::{ScriptSource, Vm};

/// `drawObject` position meaning "leave where it is".
const KEEP_POSITION: i32 = 0xFF;

impl Vm {
    /// Queues a redraw of the screen area covered by a room object.
    pub(crate) fn mark_object_rect_dirty(&mut self, obj: i32) {
        let Some(object) = self.objects.room_object(obj) else {
            return;
        };
        let rect = Rect::new(
            object.x,
            object.y,
            object.x + object.width,
            object.y + object.height,
        )
        .translate(-self.camera.screen_start_strip * 8, self.screen.top);
        self.screen.mark_dirty(rect);
    }

    /// Takes an object out of the room's picture. The object stays in the
    /// room list; only its pixels are invalidated.
    fn remove_object_from_room(&mut self, obj: i32) {
        self.mark_object_rect_dirty(obj);
    }

    pub(crate) fn set_owner_of(&mut self, obj: i32, owner: i32) -> VmResult<()> {
        if owner == 0 {
            self.clear_owner_of(obj)?;
            if let Some(cur) = self.current {
                let slot = &self.slots[cur];
                if slot.source == ScriptSource::Inventory && slot.number as i32 == obj {
                    self.objects.set_owner(obj, 0)?;
                    self.run_inventory_script(0)?;
                    return self.stop_object_code();
                }
            }
        }
        self.objects.set_owner(obj, owner)?;
        self.run_inventory_script(0)
    }

    /// Stops the object's code and forgets the object: floating copies
    /// leave the room list, carried objects leave the inventory.
    pub(crate) fn clear_owner_of(&mut self, obj: i32) -> VmResult<()> {
        self.stop_object_script(obj)?;
        if self.objects.owner(obj)? == OWNER_ROOM {
            if self.objects.drop_floating(obj) {
                debug!("dropped floating object {obj}");
            }
        } else if self.objects.remove_from_inventory(obj) {
            self.resources.nuke(ResourceKind::Inventory, obj as u16);
        }
        Ok(())
    }

    pub(crate) fn object_code_in_room(&mut self, obj: i32, room: i32) -> VmResult<ObjectCode> {
        let block = self.resources.require(ResourceKind::Room, room as u16)?;
        let data = RoomData::parse(&block)?;
        data.objects
            .into_iter()
            .find(|o| o.id as i32 == obj)
            .ok_or(FatalError::InvalidObject(obj))
    }

    /// Copies an object's verbs, name and code into the inventory. Objects
    /// of other rooms are read straight from that room's resource.
    pub(crate) fn add_object_to_inventory(&mut self, obj: i32, room: i32) -> VmResult<()> {
        let (item, code) = if room == self.room.resource as i32 && self.objects.room_index(obj).is_some() {
            let object = self
                .objects
                .room_object(obj)
                .ok_or(FatalError::InvalidObject(obj))?;
            let item = InventoryItem {
                obj: object.id,
                name: object.name.clone(),
                verbs: object.verbs.clone(),
            };
            (item, object.code.to_vec())
        } else {
            let code = self.object_code_in_room(obj, room)?;
            let item = InventoryItem {
                obj: code.id,
                name: code.name.clone(),
                verbs: code.verbs.clone(),
            };
            (item, code.code)
        };
        self.objects.add_to_inventory(item)?;
        self.resources.create(ResourceKind::Inventory, obj as u16, code);
        debug!("object {obj} from room {room} added to the inventory");
        Ok(())
    }

    pub(super) fn op_get_object_owner(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let owner = self.objects.owner(obj)?;
        self.set_result(owner as i32)
    }

    pub(super) fn op_set_owner_of(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let owner = self.get_var_or_direct_byte(PARAM_2)?;
        self.set_owner_of(obj, owner)
    }

    pub(super) fn op_get_object_state(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let state = self.objects.state(obj)?;
        self.set_result(state as i32)
    }

    pub(super) fn op_set_state(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let state = self.get_var_or_direct_byte(PARAM_2)?;
        self.objects.set_state(obj, state)?;
        self.remove_object_from_room(obj);
        Ok(())
    }

    /// Class list terminated by `0xFF`. Class 0 clears every class; bit
    /// 0x80 sets, its absence clears.
    pub(super) fn op_set_class(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        loop {
            self.opcode = self.fetch_byte()?;
            if self.opcode == 0xFF {
                break;
            }
            let cls = self.get_var_or_direct_word(PARAM_1)?;
            if cls == 0 {
                self.objects.clear_classes(obj)?;
                self.reset_actor_class_flags(obj)?;
                continue;
            }
            let set = cls & 0x80 != 0;
            self.objects.set_class(obj, cls, set)?;
            if self.traits.small_header && self.is_actor(obj) {
                let actor = self.actors.get_mut(obj)?;
                match cls & 0x7F {
                    CLASS_ALWAYS_CLIP => actor.force_clip = set as i32,
                    CLASS_IGNORE_BOXES => actor.ignore_boxes = set,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Redraws an object, optionally moving it (strip units) or picking the
    /// state. Objects occupying the same rectangle are switched off first.
    pub(super) fn op_draw_object(&mut self) -> VmResult<()> {
        let mut state = 1;
        let mut xpos = KEEP_POSITION;
        let mut ypos = KEEP_POSITION;
        let obj = self.get_var_or_direct_word(PARAM_1)?;

        if self.traits.small_header {
            xpos = self.get_var_or_direct_word(PARAM_2)?;
            ypos = self.get_var_or_direct_word(PARAM_3)?;
        } else {
            self.opcode = self.fetch_byte()?;
            match self.opcode & 0x1F {
                1 => {
                    xpos = self.get_var_or_direct_word(PARAM_1)?;
                    ypos = self.get_var_or_direct_word(PARAM_2)?;
                }
                2 => state = self.get_var_or_direct_word(PARAM_1)?,
                0x1F => {}
                _ => {
                    return Err(FatalError::UnknownSubOpcode {
                        op: "drawObject",
                        sub: self.opcode,
                    })
                }
            }
        }

        let Some(object) = self.objects.room_object_mut(obj) else {
            debug!("drawObject: {obj} is not in the room");
            return Ok(());
        };
        if xpos != KEEP_POSITION {
            object.walk_x += xpos * 8 - object.x;
            object.x = xpos * 8;
            object.walk_y += ypos * 8 - object.y;
            object.y = ypos * 8;
        }
        let rect = (object.x, object.y, object.width, object.height);
        self.mark_object_rect_dirty(obj);

        let covered: Vec<i32> = self
            .objects
            .room_objects()
            .iter()
            .filter(|o| o.id != 0 && (o.x, o.y, o.width, o.height) == rect)
            .map(|o| o.id as i32)
            .collect();
        for other in covered {
            self.objects.set_state(other, 0)?;
        }
        self.objects.set_state(obj, state)?;
        self.objects.update_states();
        Ok(())
    }

    fn take_object(&mut self, obj: i32, room: i32) -> VmResult<()> {
        self.add_object_to_inventory(obj, room)?;
        let ego = self.ego();
        self.objects.set_owner(obj, ego)?;
        self.objects.set_class(obj, CLASS_UNTOUCHABLE, true)?;
        self.objects.set_state(obj, 1)?;
        self.remove_object_from_room(obj);
        self.run_inventory_script(1)
    }

    pub(super) fn op_pickup_object(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let mut room = self.get_var_or_direct_byte(PARAM_2)?;
        if room == 0 {
            room = self.room.resource as i32;
        }
        self.take_object(obj, room)
    }

    pub(super) fn op_pickup_object_old(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        if obj < 1 {
            return Err(FatalError::InvalidObject(obj));
        }
        if self.objects.room_index(obj).is_none() {
            return Ok(());
        }
        if self.objects.where_is(obj) == ObjectLocation::Inventory {
            return Ok(());
        }
        let room = self.room.resource as i32;
        self.take_object(obj, room)
    }

    pub(super) fn op_find_object(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let x = self.get_var_or_direct_byte(PARAM_1)?;
        let y = self.get_var_or_direct_byte(PARAM_2)?;
        let obj = self.objects.find_at(x, y)?;
        self.set_result(obj)
    }

    pub(super) fn op_find_inventory(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let owner = self.get_var_or_direct_byte(PARAM_1)?;
        let index = self.get_var_or_direct_byte(PARAM_2)?;
        let obj = self.objects.find_inventory(owner, index)?;
        self.set_result(obj)
    }

    pub(super) fn op_get_inventory_count(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let owner = self.get_var_or_direct_byte(PARAM_1)?;
        let count = self.objects.inventory_count(owner)?;
        self.set_result(count)
    }

    /// Offset of an object's handler for a verb (or its default handler),
    /// 0 when there is none.
    pub(super) fn op_get_verb_entrypoint(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let verb = self.get_var_or_direct_word(PARAM_2)?;
        let verbs = match self.objects.where_is(obj) {
            ObjectLocation::NotFound => None,
            ObjectLocation::Room => self.objects.room_object(obj).map(|o| o.verbs.clone()),
            ObjectLocation::Inventory => self.objects.inventory_item(obj).map(|i| i.verbs.clone()),
        };
        let entry = verbs
            .and_then(|verbs| crate::objects::verb_entry(&verbs, verb as u8))
            .unwrap_or(0);
        self.set_result(entry as i32)
    }

    pub(super) fn op_set_object_name(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let name = self.fetch_inline_string()?;
        if obj < self.actors.len() as i32 {
            return Err(FatalError::InvalidObject(obj));
        }
        if self.objects.where_is(obj) == ObjectLocation::NotFound {
            warn!(
                "can't find object {obj} to rename it to {:?}",
                String::from_utf8_lossy(&name)
            );
            return Ok(());
        }
        self.objects.set_new_name(obj as u16, name);
        self.run_inventory_script(0)
    }
}

#[cfg(test)]
mod tests {
    use scumm_formats::writer::{object_block, room_block, ObjectSpec};
    use scumm_formats::ObjectCode;

    use crate::error::FatalError;
    use crate::objects::{ObjectLocation, CLASS_UNTOUCHABLE, OWNER_ROOM};
    use crate::resources::ResourceKind;
    use crate::vm::test_support::VmBuilder;
    use crate::vm::Vm;

    fn object(id: u16, x: i32) -> ObjectCode {
        ObjectCode {
            id,
            x,
            y: 0,
            width: 16,
            height: 16,
            parent: 0,
            parent_state: 0,
            walk_x: 4,
            walk_y: 60,
            actor_dir: 1,
            verbs: vec![(3, 40)],
            name: format!("thing{id}"),
            code: vec![0; 48],
        }
    }

    fn vm_with_objects(builder: VmBuilder, code: &[u8]) -> Vm {
        let mut vm = builder.script(1, code).build();
        vm.room.number = 1;
        vm.room.resource = 1;
        for id in [50, 51, 52] {
            vm.objects.set_owner(id, OWNER_ROOM as i32).unwrap();
        }
        vm.objects
            .load_room(&[object(50, 0), object(51, 0), object(52, 64)]);
        let ego = vm.layout().ego;
        vm.set_var(ego, 1);
        vm
    }

    #[test]
    fn owner_and_state_round_trip_through_variables() {
        let mut vm = vm_with_objects(
            VmBuilder::v5(),
            &[
                0x29, 0x14, 0x00, 0x03, // setOwnerOf(20, 3)
                0x10, 0x0A, 0x00, 0x14, 0x00, // v10 = owner(20)
                0x07, 0x15, 0x00, 0x02, // setState(21, 2)
                0x0F, 0x0B, 0x00, 0x15, 0x00, // v11 = state(21)
                0x00,
            ],
        );
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(10).unwrap(), 3);
        assert_eq!(vm.vars().get(11).unwrap(), 2);
    }

    #[test]
    fn set_class_sets_clears_and_resets() {
        let mut vm = vm_with_objects(
            VmBuilder::v5(),
            &[0x5D, 0x16, 0x00, 0x01, 0x85, 0x00, 0x01, 0x86, 0x00, 0x01, 0x06, 0x00, 0xFF, 0x00],
        );
        vm.run_script(1, false, false, &[]).unwrap();
        assert!(vm.objects().class_of(22, 5).unwrap());
        assert!(!vm.objects().class_of(22, 6).unwrap());

        let mut vm = vm_with_objects(
            VmBuilder::v5(),
            &[0x5D, 0x16, 0x00, 0x01, 0x85, 0x00, 0x01, 0x00, 0x00, 0xFF, 0x00],
        );
        vm.run_script(1, false, false, &[]).unwrap();
        assert!(!vm.objects().class_of(22, 5).unwrap());
    }

    #[test]
    fn small_header_actor_classes_drive_box_flags() {
        let mut vm = vm_with_objects(
            VmBuilder::v4(),
            &[0x5D, 0x02, 0x00, 0x01, 0x96, 0x00, 0x01, 0x95, 0x00, 0xFF, 0x00],
        );
        vm.run_script(1, false, false, &[]).unwrap();
        let actor = vm.actors().get(2).unwrap();
        assert!(actor.ignore_boxes);
        assert_eq!(actor.force_clip, 1);

        let mut vm = vm_with_objects(VmBuilder::v4(), &[0x5D, 0x02, 0x00, 0x01, 0x00, 0x00, 0xFF, 0x00]);
        vm.actors.get_mut(2).unwrap().ignore_boxes = true;
        vm.run_script(1, false, false, &[]).unwrap();
        assert!(!vm.actors().get(2).unwrap().ignore_boxes);
    }

    #[test]
    fn draw_object_switches_off_objects_in_the_same_place() {
        let mut vm = vm_with_objects(VmBuilder::v5(), &[0x05, 0x33, 0x00, 0x1F, 0x00]);
        vm.objects.set_state(50, 1).unwrap();
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.objects().state(50).unwrap(), 0);
        assert_eq!(vm.objects().state(51).unwrap(), 1);
        assert_eq!(vm.objects().room_object(51).unwrap().state, 1);
        assert!(!vm.screen().dirty().is_empty());
    }

    #[test]
    fn draw_object_moves_in_strip_units() {
        // drawObject(52) at 2,3
        let mut vm = vm_with_objects(VmBuilder::v5(), &[0x05, 0x34, 0x00, 0x01, 0x02, 0x00, 0x03, 0x00, 0x00]);
        vm.run_script(1, false, false, &[]).unwrap();
        let object = vm.objects().room_object(52).unwrap();
        assert_eq!((object.x, object.y), (16, 24));
        assert_eq!((object.walk_x, object.walk_y), (4 + 16 - 64, 60 + 24));
    }

    #[test]
    fn small_header_draw_object_reads_a_position() {
        let mut vm = vm_with_objects(VmBuilder::v4(), &[0x25, 0x34, 0x00, 0x01, 0x00, 0x05, 0x00, 0x00]);
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.objects().room_object(52).unwrap().x, 8);
        assert_eq!(vm.objects().state(52).unwrap(), 1);
    }

    #[test]
    fn pickup_moves_the_object_to_the_ego() {
        let mut vm = vm_with_objects(VmBuilder::v5(), &[0x25, 0x32, 0x00, 0x00, 0x00]);
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.objects().where_is(50), ObjectLocation::Inventory);
        assert_eq!(vm.objects().owner(50).unwrap(), 1);
        assert_eq!(vm.objects().state(50).unwrap(), 1);
        assert!(vm.objects().class_of(50, CLASS_UNTOUCHABLE).unwrap());
        assert_eq!(vm.objects().inventory_item(50).unwrap().name, "thing50");
        assert!(vm.resources().peek(ResourceKind::Inventory, 50).is_some());
    }

    #[test]
    fn pickup_from_another_room_parses_that_room() {
        let block = room_block(
            320,
            200,
            &[object_block(&ObjectSpec {
                id: 70,
                width: 8,
                height: 8,
                name: "key".into(),
                verbs: vec![(2, vec![0x00])],
                ..ObjectSpec::default()
            })],
        );
        let mut vm = vm_with_objects(VmBuilder::v5().room(4, block), &[0x25, 0x46, 0x00, 0x04, 0x00]);
        vm.run_script(1, false, false, &[]).unwrap();
        let item = vm.objects().inventory_item(70).unwrap();
        assert_eq!(item.name, "key");
        assert_eq!(item.verbs.len(), 1);
        assert_eq!(vm.objects().inventory_count(1).unwrap(), 1);
    }

    #[test]
    fn clearing_the_owner_drops_inventory_code() {
        let mut vm = vm_with_objects(VmBuilder::v5(), &[0x25, 0x32, 0x00, 0x00, 0x29, 0x32, 0x00, 0x00, 0x00]);
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.objects().where_is(50), ObjectLocation::NotFound);
        assert!(vm.resources().peek(ResourceKind::Inventory, 50).is_none());
    }

    #[test]
    fn find_object_and_verb_entrypoints() {
        let mut vm = vm_with_objects(
            VmBuilder::v5(),
            &[
                0x35, 0x0A, 0x00, 0x46, 0x04, // v10 = findObject(70, 4)
                0x0B, 0x0B, 0x00, 0x34, 0x00, 0x03, 0x00, // v11 = entry(52, 3)
                0x0B, 0x0C, 0x00, 0x34, 0x00, 0x04, 0x00, // v12 = entry(52, 4)
                0x00,
            ],
        );
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(10).unwrap(), 52);
        assert_eq!(vm.vars().get(11).unwrap(), 40);
        assert_eq!(vm.vars().get(12).unwrap(), 0);
    }

    #[test]
    fn renaming_needs_a_real_object() {
        let mut vm = vm_with_objects(VmBuilder::v5(), &[0x54, 0x33, 0x00, b'm', b'a', b'p', 0x00, 0x00]);
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.objects().name(51).as_deref(), Some("map"));

        let mut vm = vm_with_objects(VmBuilder::v5(), &[0x54, 0x02, 0x00, b'x', 0x00]);
        assert!(matches!(
            vm.run_script(1, false, false, &[]),
            Err(FatalError::InvalidObject(2))
        ));
    }
}
