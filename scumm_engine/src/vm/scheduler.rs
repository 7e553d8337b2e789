//! Script slots: starting, nesting, stopping, freezing, the per-tick run
//! over all slots, cutscenes and the sentence queue.

use bytes::Bytes;
use log::{debug, trace, warn};

use crate::error::{FatalError, VmResult};
use crate::objects::{verb_entry, ObjectLocation};
use crate::resources::ResourceKind;

use super::{
    CutsceneFrame, NestFrame, ScriptSlot, ScriptSource, Sentence, SlotStatus, Vm, WaitCondition,
    MAX_CUTSCENE_FRAMES, MAX_NEST, MAX_SENTENCES, NUM_LOCALS,
};

impl Vm {
    fn find_free_slot(&self, number: u16) -> VmResult<usize> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| !slot.is_live())
            .map(|(i, _)| i)
            .ok_or(FatalError::NoFreeSlot(number))
    }

    /// Code buffer of a live slot.
    pub(crate) fn slot_code(&mut self, slot: usize) -> VmResult<Bytes> {
        let ScriptSlot { number, source, .. } = self.slots[slot];
        let code = match source {
            ScriptSource::Global => Some(self.resources.require(ResourceKind::Script, number)?),
            ScriptSource::Local => self.room.local_scripts.get(&number).cloned(),
            ScriptSource::RoomEntry => self.room.entry_code.clone(),
            ScriptSource::RoomExit => self.room.exit_code.clone(),
            ScriptSource::Object => self.objects.room_object(number as i32).map(|o| o.code.clone()),
            ScriptSource::Inventory => Some(self.resources.require(ResourceKind::Inventory, number)?),
        };
        code.ok_or(FatalError::ResourceMissing {
            kind: match source {
                ScriptSource::Inventory => ResourceKind::Inventory,
                ScriptSource::Global => ResourceKind::Script,
                _ => ResourceKind::Room,
            },
            id: number,
        })
    }

    fn start_slot(&mut self, slot: usize, template: ScriptSlot, args: &[i32]) -> VmResult<()> {
        if template.source == ScriptSource::Global {
            self.resources.lock(ResourceKind::Script, template.number);
        }
        self.slots[slot] = template;
        let locals = &mut self.slots[slot].locals;
        for (local, arg) in locals.iter_mut().zip(args.iter().take(NUM_LOCALS)) {
            *local = *arg;
        }
        self.run_script_nested(slot)
    }

    /// Starts script `number` and runs it until it yields.
    pub fn run_script(
        &mut self,
        number: u16,
        freeze_resistant: bool,
        recursive: bool,
        args: &[i32],
    ) -> VmResult<()> {
        if number == 0 {
            return Ok(());
        }
        if !recursive {
            self.stop_script(number)?;
        }
        let source = if (number as usize) < self.traits.num_global_scripts {
            if self.resources.get(ResourceKind::Script, number)?.is_none() {
                debug!("script {number} has no code, not starting it");
                return Ok(());
            }
            ScriptSource::Global
        } else {
            if !self.room.local_scripts.contains_key(&number) {
                debug!(
                    "local script {number} not in room {}, not starting it",
                    self.room.number
                );
                return Ok(());
            }
            ScriptSource::Local
        };
        let slot = self.find_free_slot(number)?;
        trace!("starting script {number} in slot {slot}");
        self.start_slot(
            slot,
            ScriptSlot {
                number,
                source,
                status: SlotStatus::Running,
                freeze_resistant,
                recursive,
                ..ScriptSlot::default()
            },
            args,
        )
    }

    /// Runs the verb handler `verb` of object `obj`, from the room or the
    /// inventory.
    pub fn run_object_script(
        &mut self,
        obj: i32,
        verb: u8,
        freeze_resistant: bool,
        recursive: bool,
        args: &[i32],
    ) -> VmResult<()> {
        if obj == 0 {
            return Ok(());
        }
        if !recursive {
            self.stop_object_script(obj)?;
        }
        let (source, entry) = match self.objects.where_is(obj) {
            ObjectLocation::NotFound => {
                warn!("object {obj} not found, not running verb {verb}");
                return Ok(());
            }
            ObjectLocation::Inventory => (
                ScriptSource::Inventory,
                self.objects
                    .inventory_item(obj)
                    .and_then(|item| verb_entry(&item.verbs, verb)),
            ),
            ObjectLocation::Room => (
                ScriptSource::Object,
                self.objects
                    .room_object(obj)
                    .and_then(|o| verb_entry(&o.verbs, verb)),
            ),
        };
        let Some(entry) = entry else {
            debug!("object {obj} has no verb {verb}");
            return Ok(());
        };
        let slot = self.find_free_slot(obj as u16)?;
        self.start_slot(
            slot,
            ScriptSlot {
                number: obj as u16,
                source,
                status: SlotStatus::Running,
                pc: entry as usize,
                freeze_resistant,
                recursive,
                ..ScriptSlot::default()
            },
            args,
        )
    }

    /// Runs the room's entry or exit code, if the room has any.
    pub(crate) fn run_room_script(&mut self, source: ScriptSource) -> VmResult<()> {
        let (number, present) = match source {
            ScriptSource::RoomEntry => (super::ROOM_ENTRY_SCRIPT, self.room.entry_code.is_some()),
            _ => (super::ROOM_EXIT_SCRIPT, self.room.exit_code.is_some()),
        };
        if !present {
            return Ok(());
        }
        let slot = self.find_free_slot(number)?;
        self.start_slot(
            slot,
            ScriptSlot {
                number,
                source,
                status: SlotStatus::Running,
                ..ScriptSlot::default()
            },
            &[],
        )
    }

    /// Runs `slot` now; the caller resumes afterwards unless it was
    /// stopped, replaced or frozen meanwhile.
    fn run_script_nested(&mut self, slot: usize) -> VmResult<()> {
        if self.nest.len() >= MAX_NEST {
            return Err(FatalError::NestingTooDeep(MAX_NEST));
        }
        let caller = self.current;
        if let Some(cur) = caller {
            self.slots[cur].pc = self.pc;
        }
        self.nest.push(match caller {
            Some(cur) => NestFrame {
                number: self.slots[cur].number,
                source: self.slots[cur].source,
                slot: Some(cur),
            },
            None => NestFrame {
                number: 0,
                source: ScriptSource::Global,
                slot: None,
            },
        });
        let saved_code = std::mem::take(&mut self.code);
        let saved = (self.opcode, self.opcode_pc, self.result_var);

        self.current = Some(slot);
        let result = self.slot_code(slot).and_then(|code| {
            self.code = code;
            self.pc = self.slots[slot].pc;
            self.execute_script()
        });

        let frame = self.nest.pop();
        result?;

        self.current = None;
        self.code = saved_code;
        (self.opcode, self.opcode_pc, self.result_var) = saved;
        if let Some(NestFrame {
            number,
            source,
            slot: Some(cur),
        }) = frame
        {
            let resumed = &self.slots[cur];
            if resumed.number == number
                && resumed.source == source
                && resumed.is_live()
                && !resumed.is_frozen()
            {
                self.current = Some(cur);
                self.pc = resumed.pc;
            }
        }
        Ok(())
    }

    /// Executes the current slot until it yields or ends.
    fn execute_script(&mut self) -> VmResult<()> {
        while let Some(slot) = self.current {
            if self.pc >= self.code.len() {
                trace!("script {} ran off its code", self.slots[slot].number);
                self.kill_slot(slot);
                self.current = None;
                break;
            }
            self.opcode_pc = self.pc;
            let opcode = self.fetch_byte()?;
            self.opcode = opcode;
            self.slots[slot].did_exec = true;
            self.execute_opcode(opcode)?;
        }
        Ok(())
    }

    /// Parks the current slot at the next instruction and leaves it.
    pub(crate) fn break_here(&mut self) -> VmResult<()> {
        let slot = self.current_index()?;
        self.slots[slot].pc = self.pc;
        self.current = None;
        Ok(())
    }

    pub(crate) fn kill_slot(&mut self, slot: usize) {
        let ScriptSlot { number, source, .. } = self.slots[slot];
        if source == ScriptSource::Global && self.slots[slot].is_live() {
            self.resources.unlock(ResourceKind::Script, number);
        }
        self.slots[slot] = ScriptSlot::default();
        if self.cutscene_script == Some(slot) {
            self.cutscene_script = None;
        }
    }

    fn forget_nest_frames(&mut self, pred: impl Fn(&NestFrame) -> bool) {
        for frame in self.nest.iter_mut().filter(|f| pred(f)) {
            frame.slot = None;
        }
    }

    /// Stops every instance of global or local script `number`.
    pub fn stop_script(&mut self, number: u16) -> VmResult<()> {
        if number == 0 {
            return Ok(());
        }
        for i in 1..self.slots.len() {
            let slot = &self.slots[i];
            if slot.number == number && slot.is_live() && slot.source.is_script() {
                if slot.cutscene_override != 0 {
                    return Err(FatalError::ActiveCutscene { script: number });
                }
                self.kill_slot(i);
                if self.current == Some(i) {
                    self.current = None;
                }
            }
        }
        self.forget_nest_frames(|f| f.number == number && f.source.is_script());
        Ok(())
    }

    /// Stops every running verb handler of `obj`.
    pub fn stop_object_script(&mut self, obj: i32) -> VmResult<()> {
        if obj == 0 {
            return Ok(());
        }
        let number = obj as u16;
        let object_code = |source: ScriptSource| !source.is_script();
        for i in 1..self.slots.len() {
            let slot = &self.slots[i];
            if slot.number == number && slot.is_live() && object_code(slot.source) {
                if slot.cutscene_override != 0 {
                    return Err(FatalError::ActiveCutscene { script: number });
                }
                self.kill_slot(i);
                if self.current == Some(i) {
                    self.current = None;
                }
            }
        }
        self.forget_nest_frames(|f| f.number == number && object_code(f.source));
        Ok(())
    }

    /// Ends the executing slot (`stopObjectCode`, or `stopScript 0`).
    pub(crate) fn stop_object_code(&mut self) -> VmResult<()> {
        let slot = self.current_index()?;
        let ScriptSlot {
            number,
            source,
            cutscene_override,
            ..
        } = self.slots[slot];
        if cutscene_override != 0 {
            if source.is_script() {
                return Err(FatalError::ActiveCutscene { script: number });
            }
            warn!("object script {number} ended with an active cutscene override");
        }
        self.kill_slot(slot);
        self.current = None;
        Ok(())
    }

    pub fn is_script_running(&self, number: u16) -> bool {
        self.slots
            .iter()
            .any(|s| s.is_live() && s.number == number && s.source.is_script())
    }

    /// True when any slot runs `number`, of any kind.
    pub fn is_script_in_use(&self, number: i32) -> bool {
        number > 0 && self.slots.iter().any(|s| s.is_live() && s.number as i32 == number)
    }

    /// Room entry or exit code still running.
    pub fn is_room_script_running(&self, number: u16) -> bool {
        self.slots.iter().any(|s| {
            s.is_live()
                && s.number == number
                && matches!(s.source, ScriptSource::RoomEntry | ScriptSource::RoomExit)
        })
    }

    /// Freezes every live slot except the current one. Freeze-resistant
    /// slots only freeze when `flag >= 0x80`. The cutscene slot stays awake.
    pub fn freeze_scripts(&mut self, flag: i32) {
        let current = self.current;
        for (i, slot) in self.slots.iter_mut().enumerate().skip(1) {
            if Some(i) != current && slot.is_live() && (!slot.freeze_resistant || flag >= 0x80) {
                slot.freeze_count = slot.freeze_count.saturating_add(1);
            }
        }
        for sentence in self.sentences.iter_mut() {
            sentence.freeze_count = sentence.freeze_count.saturating_add(1);
        }
        if let Some(slot) = self.cutscene_script {
            self.slots[slot].freeze_count = 0;
        }
    }

    pub fn unfreeze_scripts(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.freeze_count = slot.freeze_count.saturating_sub(1);
        }
        for sentence in self.sentences.iter_mut() {
            sentence.freeze_count = sentence.freeze_count.saturating_sub(1);
        }
    }

    /// Counts down sleeping slots and wakes those that ran out.
    pub fn decrease_script_delay(&mut self, amount: i32) {
        for slot in self.slots.iter_mut() {
            if slot.status == SlotStatus::Paused && !slot.is_frozen() {
                slot.delay -= amount;
                if slot.delay <= 0 {
                    slot.delay = 0;
                    slot.status = SlotStatus::Running;
                }
            }
        }
    }

    pub(crate) fn wait_condition_holds(&self, condition: WaitCondition) -> bool {
        match condition {
            WaitCondition::ActorMoving(actor) => {
                let room = self.room.number;
                self.actors
                    .get(actor)
                    .map_or(false, |a| a.is_in_room(room) && a.is_moving())
            }
            WaitCondition::Message => self.var(self.layout.have_msg) != 0,
            WaitCondition::Camera => self.camera.cur.x / 8 != self.camera.dest.x / 8,
            WaitCondition::Sentence => {
                let sentence_script = self.var(self.layout.sentence_script);
                let busy = self.is_script_in_use(sentence_script);
                match self.sentences.last() {
                    Some(top) => !(top.freeze_count > 0 && !busy),
                    None => busy,
                }
            }
        }
    }

    /// Parks the current slot on `condition`, rewound to the wait opcode.
    pub(crate) fn block_on(&mut self, condition: WaitCondition) -> VmResult<()> {
        let slot = self.current_index()?;
        self.pc = self.opcode_pc;
        self.slots[slot].pending = Some(condition);
        self.break_here()
    }

    /// One pass over all slots in index order; each live, unfrozen slot
    /// runs at most once per tick.
    pub fn run_all_scripts(&mut self) -> VmResult<()> {
        for slot in self.slots.iter_mut() {
            slot.did_exec = false;
        }
        self.current = None;
        for i in 1..self.slots.len() {
            let slot = &self.slots[i];
            if slot.status != SlotStatus::Running || slot.did_exec || slot.is_frozen() {
                continue;
            }
            if let Some(condition) = slot.pending {
                if self.wait_condition_holds(condition) {
                    continue;
                }
                self.slots[i].pending = None;
            }
            self.current = Some(i);
            self.code = self.slot_code(i)?;
            self.pc = self.slots[i].pc;
            self.execute_script()?;
        }
        self.current = None;
        Ok(())
    }

    pub fn begin_cutscene(&mut self, args: &[i32]) -> VmResult<()> {
        let slot = self.current_index()?;
        if self.cutscenes.len() >= MAX_CUTSCENE_FRAMES {
            return Err(FatalError::CutsceneStack("too many nested cutscenes"));
        }
        self.slots[slot].cutscene_override += 1;
        self.cutscenes.push(CutsceneFrame {
            data: args.first().copied().unwrap_or(0),
            script: None,
            override_pc: 0,
            camera_mode: self.camera.mode,
            camera_follows: self.camera.follows,
        });
        self.cutscene_script = Some(slot);
        let start = self.var(self.layout.cutscene_start_script);
        if start != 0 {
            self.run_script(start as u16, false, false, args)?;
        }
        self.cutscene_script = None;
        Ok(())
    }

    pub fn end_cutscene(&mut self) -> VmResult<()> {
        let slot = self.current_index()?;
        if self.cutscenes.len() <= 1 {
            return Err(FatalError::CutsceneStack("end without a matching begin"));
        }
        let frame = self.cutscenes.pop().unwrap_or_default();
        let ss = &mut self.slots[slot];
        ss.cutscene_override = ss.cutscene_override.saturating_sub(1);
        if frame.override_pc != 0 {
            ss.cutscene_override = ss.cutscene_override.saturating_sub(1);
        }
        self.set_var(self.layout.override_flag, 0);
        let end = self.var(self.layout.cutscene_end_script);
        if end != 0 {
            self.run_script(end as u16, false, false, &[frame.data])?;
        }
        Ok(())
    }

    /// Jumps the overriding script to its override point and restores the
    /// camera recorded when the cutscene began.
    pub fn abort_cutscene(&mut self) -> VmResult<()> {
        let depth = self.cutscenes.len() - 1;
        let frame = self.cutscenes[depth];
        let (Some(slot), true) = (frame.script, frame.override_pc != 0) else {
            return Ok(());
        };
        let ss = &mut self.slots[slot];
        ss.pc = frame.override_pc;
        ss.status = SlotStatus::Running;
        ss.pending = None;
        ss.freeze_count = 0;
        ss.cutscene_override = ss.cutscene_override.saturating_sub(1);
        let number = ss.number;
        self.set_var(self.layout.override_flag, 1);
        self.cutscenes[depth].override_pc = 0;
        self.cutscenes[depth].script = None;
        if depth > 0 {
            self.camera.mode = frame.camera_mode;
            self.camera.follows = frame.camera_follows;
        }
        debug!("cutscene aborted, script {number} resumes at {:#x}", frame.override_pc);
        Ok(())
    }

    /// Arms the override at the current position and skips the jump that
    /// follows it; an abort resumes on that jump.
    pub fn begin_override(&mut self) -> VmResult<()> {
        let slot = self.current_index()?;
        let depth = self.cutscenes.len() - 1;
        self.cutscenes[depth].override_pc = self.pc;
        self.cutscenes[depth].script = Some(slot);
        self.slots[slot].cutscene_override += 1;
        self.fetch_byte()?;
        self.fetch_word()?;
        self.set_var(self.layout.override_flag, 0);
        Ok(())
    }

    pub fn end_override(&mut self) -> VmResult<()> {
        let depth = self.cutscenes.len() - 1;
        if let Some(slot) = self.cutscenes[depth].script.take() {
            let ss = &mut self.slots[slot];
            ss.cutscene_override = ss.cutscene_override.saturating_sub(1);
        }
        self.cutscenes[depth].override_pc = 0;
        self.set_var(self.layout.override_flag, 0);
        Ok(())
    }

    pub fn push_sentence(&mut self, verb: i32, obj_a: i32, obj_b: i32) -> VmResult<()> {
        if self.sentences.len() >= MAX_SENTENCES {
            return Err(FatalError::SentenceOverflow);
        }
        self.sentences.push(Sentence {
            verb,
            obj_a,
            obj_b,
            preposition: obj_b != 0,
            freeze_count: 0,
        });
        Ok(())
    }

    /// Pops the newest sentence into the sentence script once the previous
    /// run finished.
    pub fn check_and_run_sentence_script(&mut self) -> VmResult<()> {
        let script = self.var(self.layout.sentence_script);
        let busy = self
            .slots
            .iter()
            .any(|s| s.is_live() && s.number as i32 == script && !s.is_frozen());
        if busy {
            return Ok(());
        }
        match self.sentences.last() {
            Some(top) if top.freeze_count == 0 => {}
            _ => return Ok(()),
        }
        let Some(sentence) = self.sentences.pop() else {
            return Ok(());
        };
        if sentence.preposition && sentence.obj_a == sentence.obj_b {
            return Ok(());
        }
        self.current = None;
        if script != 0 {
            self.run_script(
                script as u16,
                false,
                false,
                &[sentence.verb, sentence.obj_a, sentence.obj_b],
            )?;
        }
        Ok(())
    }

    pub(crate) fn run_inventory_script(&mut self, arg: i32) -> VmResult<()> {
        let script = self.var(self.layout.inventory_script);
        if script != 0 {
            self.run_script(script as u16, false, false, &[arg])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraMode;
    use crate::vm::test_support::VmBuilder;

    // startScript 2; stopObjectCode
    const START_2: &[u8] = &[0x0A, 0x02, 0xFF, 0x00];
    // a = 1 (var 10), breakHere, a = 2, stopObjectCode
    const YIELDS: &[u8] = &[0x1A, 0x0A, 0x00, 0x01, 0x00, 0x80, 0x1A, 0x0A, 0x00, 0x02, 0x00, 0x00];

    #[test]
    fn nested_script_returns_to_caller() {
        // Script 1 starts 2, which yields; 1 then writes var 11.
        let mut vm = VmBuilder::v5()
            .script(1, &[0x0A, 0x02, 0xFF, 0x1A, 0x0B, 0x00, 0x07, 0x00, 0x00])
            .script(2, YIELDS)
            .build();
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 1);
        assert_eq!(vm.vars.get(11).unwrap(), 7);
        assert!(vm.is_script_running(2));
        assert!(!vm.is_script_running(1));
        assert_eq!(vm.current, None);

        vm.run_all_scripts().unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 2);
        assert!(!vm.is_script_running(2));
    }

    #[test]
    fn missing_script_is_a_silent_noop() {
        let mut vm = VmBuilder::v5().script(1, START_2).build();
        vm.run_script(1, false, false, &[]).unwrap();
        assert!(vm.slots.iter().all(|s| !s.is_live()));
        vm.run_script(0, false, false, &[]).unwrap();
    }

    #[test]
    fn arguments_land_in_locals() {
        // local0 -> var 10
        let mut vm = VmBuilder::v5()
            .script(3, &[0x1A | 0x80, 0x0A, 0x00, 0x00, 0x40, 0x80, 0x00])
            .build();
        vm.run_script(3, false, false, &[42, 1]).unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 42);
        let slot = vm.slots.iter().find(|s| s.number == 3).unwrap();
        assert_eq!(&slot.locals[..2], &[42, 1]);
    }

    #[test]
    fn global_scripts_stay_locked_while_live() {
        let mut vm = VmBuilder::v5().script(2, YIELDS).build();
        vm.run_script(2, false, false, &[]).unwrap();
        assert_eq!(vm.resources.lock_depth(ResourceKind::Script, 2), 1);
        vm.stop_script(2).unwrap();
        assert_eq!(vm.resources.lock_depth(ResourceKind::Script, 2), 0);
    }

    #[test]
    fn freeze_counts_nest() {
        let mut vm = VmBuilder::v5().script(2, YIELDS).script(4, YIELDS).build();
        vm.run_script(2, false, false, &[]).unwrap();
        vm.run_script(4, true, false, &[]).unwrap();
        let slot_of = |vm: &Vm, n| vm.slots.iter().position(|s| s.number == n).unwrap();
        let (a, b) = (slot_of(&vm, 2), slot_of(&vm, 4));

        vm.freeze_scripts(1);
        vm.freeze_scripts(0x80);
        assert_eq!(vm.slots[a].freeze_count, 2);
        assert_eq!(vm.slots[b].freeze_count, 1);

        vm.run_all_scripts().unwrap();
        assert!(vm.is_script_running(2));
        vm.unfreeze_scripts();
        assert!(vm.slots[a].is_frozen());
        assert!(!vm.slots[b].is_frozen());
        vm.unfreeze_scripts();
        vm.run_all_scripts().unwrap();
        assert!(!vm.is_script_running(2));
    }

    #[test]
    fn delay_parks_a_slot_for_the_given_ticks() {
        // delay 45; var 10 = 1; stop
        let mut vm = VmBuilder::v5()
            .script(5, &[0x2E, 45, 0, 0, 0x1A, 0x0A, 0x00, 0x01, 0x00, 0x00])
            .build();
        vm.run_script(5, false, false, &[]).unwrap();
        let mut ticks = 0;
        while vm.vars.get(10).unwrap() == 0 {
            vm.decrease_script_delay(1);
            vm.run_all_scripts().unwrap();
            ticks += 1;
            assert!(ticks < 100);
        }
        assert_eq!(ticks, 45);
    }

    #[test]
    fn wait_reruns_once_the_condition_clears() {
        // wait for message; var 10 = 1
        let mut vm = VmBuilder::v5()
            .script(6, &[0xAE, 0x02, 0x1A, 0x0A, 0x00, 0x01, 0x00, 0x00])
            .build();
        let have_msg = vm.layout.have_msg;
        vm.set_var(have_msg, 1);
        vm.run_script(6, false, false, &[]).unwrap();
        let slot = vm.slots.iter().position(|s| s.number == 6).unwrap();
        assert_eq!(vm.slots[slot].pending, Some(WaitCondition::Message));
        assert_eq!(vm.slots[slot].pc, 0);

        vm.run_all_scripts().unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 0);
        vm.set_var(have_msg, 0);
        vm.run_all_scripts().unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 1);
    }

    #[test]
    fn actor_wait_only_blocks_on_a_walker_in_this_room() {
        // wait for actor; var 10 = 1
        let wait_for = |actor: u8| [0xAE, 0x01, actor, 0x1A, 0x0A, 0x00, 0x01, 0x00, 0x00];
        let mut vm = VmBuilder::v5()
            .script(6, &wait_for(3))
            .script(7, &wait_for(200))
            .build();
        vm.room.number = 1;
        let walker = vm.actors.get_mut(3).unwrap();
        walker.room = 2;
        walker.moving = 1;

        vm.run_script(6, false, false, &[]).unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 1);

        vm.vars.set(10, 0).unwrap();
        vm.run_script(7, false, false, &[]).unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 1);

        vm.vars.set(10, 0).unwrap();
        vm.actors.get_mut(3).unwrap().room = 1;
        vm.run_script(6, false, false, &[]).unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 0);
        let slot = vm.slots.iter().find(|s| s.number == 6 && s.is_live()).unwrap();
        assert_eq!(slot.pending, Some(WaitCondition::ActorMoving(3)));
    }

    #[test]
    fn override_skips_jump_and_abort_restores_camera() {
        // cutscene; override; jump; breakHere; breakHere; endCutscene
        let code = [
            0x40, 0xFF, // cutscene, no args
            0x58, 0x01, // beginOverride
            0x18, 0x01, 0x00, // jump +1 (skipped on entry)
            0x80, 0x80, // breakHere x2
            0xC0, // endCutscene
            0x00,
        ];
        let mut vm = VmBuilder::v5().script(7, &code).build();
        vm.camera.follow(3);
        vm.run_script(7, false, false, &[]).unwrap();
        let slot = vm.slots.iter().position(|s| s.number == 7).unwrap();
        assert_eq!(vm.cutscene_depth(), 1);
        assert_eq!(vm.slots[slot].pc, 8);
        assert_eq!(vm.slots[slot].cutscene_override, 2);

        vm.camera.stop_following();
        vm.abort_cutscene().unwrap();
        assert_eq!(vm.slots[slot].pc, 4);
        assert_eq!(vm.var(vm.layout.override_flag), 1);
        assert_eq!(vm.camera.mode, CameraMode::FollowActor);
        assert_eq!(vm.camera.follows, 3);

        // The jump lands on the second breakHere; then endCutscene.
        vm.run_all_scripts().unwrap();
        vm.run_all_scripts().unwrap();
        assert_eq!(vm.cutscene_depth(), 0);
        assert!(!vm.is_script_running(7));
    }

    #[test]
    fn stopping_a_script_inside_a_cutscene_is_fatal() {
        let mut vm = VmBuilder::v5().script(8, &[0x40, 0xFF, 0x80, 0x00]).build();
        vm.run_script(8, false, false, &[]).unwrap();
        assert!(matches!(
            vm.stop_script(8),
            Err(FatalError::ActiveCutscene { script: 8 })
        ));
    }

    #[test]
    fn sentences_feed_the_sentence_script() {
        // var 10 = local1
        let mut vm = VmBuilder::v5()
            .script(9, &[0x1A | 0x80, 0x0A, 0x00, 0x01, 0x40, 0x00])
            .build();
        let sentence_var = vm.layout.sentence_script;
        vm.set_var(sentence_var, 9);
        vm.push_sentence(3, 55, 0).unwrap();
        vm.freeze_scripts(0);
        vm.check_and_run_sentence_script().unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 0);
        vm.unfreeze_scripts();
        vm.check_and_run_sentence_script().unwrap();
        assert_eq!(vm.vars.get(10).unwrap(), 55);
        assert!(vm.sentences.is_empty());
    }

    #[test]
    fn nesting_is_bounded() {
        // Script 1 recursively starts itself (0x40 recursive bit).
        let mut vm = VmBuilder::v5().script(1, &[0x4A, 0x01, 0xFF, 0x00]).build();
        assert!(matches!(
            vm.run_script(1, false, true, &[]),
            Err(FatalError::NestingTooDeep(MAX_NEST)) | Err(FatalError::NoFreeSlot(1))
        ));
    }
}
