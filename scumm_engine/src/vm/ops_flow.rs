//! Control flow, script control, cutscenes and waits.

use log::{debug, info};

use crate::error::{FatalError, VmResult};

use super::fetch::{PARAM_1, PARAM_2, PARAM_3};
use super::{SlotStatus, Vm, WaitCondition};

impl Vm {
    pub(super) fn op_break_here(&mut self) -> VmResult<()> {
        self.break_here()
    }

    /// Comparisons truncate both operands to 16 bits.
    pub(super) fn op_compare(&mut self, cond: impl Fn(i16, i16) -> bool) -> VmResult<()> {
        let a = self.get_var()? as i16;
        let b = self.get_var_or_direct_word(PARAM_1)? as i16;
        self.jump_relative(cond(a, b))
    }

    pub(super) fn op_equal_zero(&mut self, zero: bool) -> VmResult<()> {
        let a = self.get_var()?;
        self.jump_relative((a == 0) == zero)
    }

    pub(super) fn op_if_state(&mut self, equal: bool) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let state = self.get_var_or_direct_byte(PARAM_2)?;
        let current = self.objects.state(obj)? as i32;
        self.jump_relative((current == state) == equal)
    }

    pub(super) fn op_if_class_of_is(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let mut cond = true;
        loop {
            self.opcode = self.fetch_byte()?;
            if self.opcode == 0xFF {
                break;
            }
            let cls = self.get_var_or_direct_word(PARAM_1)?;
            let has = self.objects.class_of(obj, cls)?;
            if (cls & 0x80 != 0) != has {
                cond = false;
            }
        }
        self.jump_relative(cond)
    }

    pub(super) fn op_is_actor_in_box(&mut self) -> VmResult<()> {
        let act = self.get_var_or_direct_byte(PARAM_1)?;
        let walk_box = self.get_var_or_direct_byte(PARAM_2)?;
        let actor = self.actors.get(act)?;
        let inside = self.boxes.check_xy_in_box_bounds(walk_box, actor.x, actor.y);
        self.jump_relative(inside)
    }

    pub(super) fn op_begin_override(&mut self) -> VmResult<()> {
        if self.fetch_byte()? != 0 {
            self.begin_override()
        } else {
            self.end_override()
        }
    }

    pub(super) fn op_cutscene(&mut self) -> VmResult<()> {
        let args = self.get_word_vararg()?;
        self.begin_cutscene(&args)
    }

    pub(super) fn op_system_ops(&mut self) -> VmResult<()> {
        let sub = self.fetch_byte()?;
        match sub {
            1 => {
                info!("script {} requested a restart", self.script_number());
                self.restart_requested = true;
            }
            2 => self.paused = true,
            3 => {
                info!("script {} requested quit", self.script_number());
                self.quit_requested = true;
            }
            _ => return Err(FatalError::UnknownSubOpcode { op: "systemOps", sub }),
        }
        Ok(())
    }

    pub(super) fn op_start_script(&mut self) -> VmResult<()> {
        let op = self.opcode;
        let script = self.get_var_or_direct_byte(PARAM_1)?;
        let args = self.get_word_vararg()?;
        self.run_script(script as u16, op & PARAM_3 != 0, op & PARAM_2 != 0, &args)
    }

    /// Replaces the current script with another, keeping its flags.
    pub(super) fn op_chain_script(&mut self) -> VmResult<()> {
        let script = self.get_var_or_direct_byte(PARAM_1)?;
        let args = self.get_word_vararg()?;
        let cur = self.current_index()?;
        let (freeze_resistant, recursive) = {
            let slot = &self.slots[cur];
            (slot.freeze_resistant, slot.recursive)
        };
        self.kill_slot(cur);
        self.current = None;
        self.run_script(script as u16, freeze_resistant, recursive, &args)
    }

    pub(super) fn op_stop_script(&mut self) -> VmResult<()> {
        let script = self.get_var_or_direct_byte(PARAM_1)?;
        if script == 0 {
            self.stop_object_code()
        } else {
            self.stop_script(script as u16)
        }
    }

    pub(super) fn op_freeze_scripts(&mut self) -> VmResult<()> {
        let flag = self.get_var_or_direct_byte(PARAM_1)?;
        if flag != 0 {
            self.freeze_scripts(flag);
        } else {
            self.unfreeze_scripts();
        }
        Ok(())
    }

    pub(super) fn op_is_script_running(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let script = self.get_var_or_direct_byte(PARAM_1)?;
        let running = self.is_script_running(script as u16);
        self.set_result(running as i32)
    }

    pub(super) fn op_start_object(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        let verb = self.get_var_or_direct_byte(PARAM_2)?;
        let args = self.get_word_vararg()?;
        self.run_object_script(obj, verb as u8, false, false, &args)
    }

    pub(super) fn op_stop_object_script(&mut self) -> VmResult<()> {
        let obj = self.get_var_or_direct_word(PARAM_1)?;
        self.stop_object_script(obj)
    }

    fn sleep(&mut self, ticks: i32) -> VmResult<()> {
        let slot = self.current_index()?;
        self.slots[slot].delay = ticks;
        self.slots[slot].status = SlotStatus::Paused;
        self.break_here()
    }

    /// 24-bit little-endian tick count.
    pub(super) fn op_delay(&mut self) -> VmResult<()> {
        let lo = self.fetch_byte()? as i32;
        let mid = self.fetch_byte()? as i32;
        let hi = self.fetch_byte()? as i32;
        self.sleep(lo | mid << 8 | hi << 16)
    }

    pub(super) fn op_delay_variable(&mut self) -> VmResult<()> {
        let ticks = self.get_var()?;
        self.sleep(ticks)
    }

    fn wait_for(&mut self, condition: WaitCondition) -> VmResult<()> {
        if self.wait_condition_holds(condition) {
            self.block_on(condition)
        } else {
            Ok(())
        }
    }

    pub(super) fn op_wait(&mut self) -> VmResult<()> {
        self.opcode = self.fetch_byte()?;
        let condition = match self.opcode & 0x1F {
            1 => {
                let act = self.get_var_or_direct_byte(PARAM_1)?;
                WaitCondition::ActorMoving(act)
            }
            2 => WaitCondition::Message,
            3 => WaitCondition::Camera,
            4 => WaitCondition::Sentence,
            _ => {
                return Err(FatalError::UnknownSubOpcode {
                    op: "wait",
                    sub: self.opcode,
                })
            }
        };
        self.wait_for(condition)
    }

    pub(super) fn op_wait_for_sentence(&mut self) -> VmResult<()> {
        self.wait_for(WaitCondition::Sentence)
    }

    pub(super) fn op_do_sentence(&mut self) -> VmResult<()> {
        let verb = self.get_var_or_direct_byte(PARAM_1)?;
        if verb == 0xFE {
            self.sentences.clear();
            let script = self.var(self.layout.sentence_script);
            return self.stop_script(script as u16);
        }
        let obj_a = self.get_var_or_direct_word(PARAM_2)?;
        let obj_b = self.get_var_or_direct_word(PARAM_3)?;
        self.push_sentence(verb, obj_a, obj_b)
    }

    pub(super) fn op_debug(&mut self) -> VmResult<()> {
        let value = self.get_var_or_direct_word(PARAM_1)?;
        debug!("script {} debug: {value}", self.script_number());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::FatalError;
    use crate::vm::test_support::VmBuilder;
    use crate::vm::SlotStatus;

    /// `if` body: var 20 = 1 when the branch falls through.
    fn branch(test: &[u8]) -> Vec<u8> {
        let mut code = test.to_vec();
        code.extend_from_slice(&[0x05, 0x00]);
        code.extend_from_slice(&[0x1A, 0x14, 0x00, 0x01, 0x00, 0x00]);
        code
    }

    fn falls_through(test: &[u8], a: i32) -> bool {
        let mut vm = VmBuilder::v5().script(1, &branch(test)).build();
        vm.vars_mut().set(10, a).unwrap();
        vm.run_script(1, false, false, &[]).unwrap();
        vm.vars().get(20).unwrap() == 1
    }

    #[test]
    fn comparisons_fall_through_when_true() {
        // isEqual var10, 5
        assert!(falls_through(&[0x48, 0x0A, 0x00, 0x05, 0x00], 5));
        assert!(!falls_through(&[0x48, 0x0A, 0x00, 0x05, 0x00], 4));
        // isLess: 5 < var10
        assert!(falls_through(&[0x44, 0x0A, 0x00, 0x05, 0x00], 9));
        assert!(!falls_through(&[0x44, 0x0A, 0x00, 0x05, 0x00], 5));
        // isGreaterEqual: 5 >= var10
        assert!(falls_through(&[0x04, 0x0A, 0x00, 0x05, 0x00], 5));
        // equalZero / notEqualZero
        assert!(falls_through(&[0x28, 0x0A, 0x00], 0));
        assert!(falls_through(&[0xA8, 0x0A, 0x00], 3));
    }

    #[test]
    fn comparisons_truncate_to_sixteen_bits() {
        // 0x10005 reads as 5
        assert!(falls_through(&[0x48, 0x0A, 0x00, 0x05, 0x00], 0x1_0005));
    }

    #[test]
    fn class_tests_honour_the_negation_bit() {
        // ifClassOfIs obj 5: class 3 set, class 4 clear
        let test = [0x1D, 0x05, 0x00, 0x01, 0x83, 0x00, 0x01, 0x04, 0x00, 0xFF];
        let mut vm = VmBuilder::v5().script(1, &branch(&test)).build();
        vm.objects.set_class(5, 3, true).unwrap();
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(20).unwrap(), 1);

        let mut vm = VmBuilder::v5().script(1, &branch(&test)).build();
        vm.objects.set_class(5, 4, true).unwrap();
        vm.objects.set_class(5, 3, true).unwrap();
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(20).unwrap(), 0);
    }

    #[test]
    fn v4_state_tests_use_the_low_opcodes() {
        // ifState obj 7 == 2
        let test = [0x0F, 0x07, 0x00, 0x02];
        let mut vm = VmBuilder::v4().script(1, &branch(&test)).build();
        vm.objects.set_state(7, 2).unwrap();
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(20).unwrap(), 1);
    }

    #[test]
    fn start_script_flags_come_from_the_opcode_byte() {
        // startScript 2 (freeze resistant); script 2 yields
        let mut vm = VmBuilder::v5()
            .script(1, &[0x2A, 0x02, 0xFF, 0x00])
            .script(2, &[0x80, 0x00])
            .build();
        vm.run_script(1, false, false, &[]).unwrap();
        let slot = vm.slots().iter().find(|s| s.number == 2 && s.is_live()).unwrap();
        assert!(slot.freeze_resistant);
        assert!(!slot.recursive);
    }

    #[test]
    fn chain_script_replaces_the_caller() {
        let mut vm = VmBuilder::v5()
            .script(1, &[0x42, 0x02, 0x01, 0x07, 0x00, 0xFF, 0x1A, 0x0B, 0x00, 0x01, 0x00, 0x00])
            .script(2, &[0x1A, 0x0A, 0x00, 0x05, 0x00, 0x80, 0x00])
            .build();
        vm.run_script(1, false, false, &[]).unwrap();
        assert_eq!(vm.vars().get(10).unwrap(), 5);
        assert_eq!(vm.vars().get(11).unwrap(), 0);
        assert!(!vm.is_script_running(1));
        let slot = vm.slots().iter().find(|s| s.number == 2 && s.is_live()).unwrap();
        assert_eq!(slot.locals[0], 7);
    }

    #[test]
    fn delay_variable_reads_a_variable() {
        // delayVariable var 10
        let mut vm = VmBuilder::v5().script(1, &[0x2B, 0x0A, 0x00, 0x00]).build();
        vm.vars_mut().set(10, 3).unwrap();
        vm.run_script(1, false, false, &[]).unwrap();
        let slot = vm.slots().iter().find(|s| s.number == 1).unwrap();
        assert_eq!((slot.status, slot.delay), (SlotStatus::Paused, 3));
    }

    #[test]
    fn system_ops_raise_host_flags() {
        let mut vm = VmBuilder::v5().script(1, &[0x98, 0x03, 0x00]).build();
        vm.run_script(1, false, false, &[]).unwrap();
        assert!(vm.quit_requested());

        let mut vm = VmBuilder::v5().script(1, &[0x98, 0x09]).build();
        assert!(matches!(
            vm.run_script(1, false, false, &[]),
            Err(FatalError::UnknownSubOpcode { op: "systemOps", sub: 9 })
        ));
    }

    #[test]
    fn do_sentence_fe_clears_the_queue() {
        let mut vm = VmBuilder::v5()
            .script(1, &[0x19, 0x03, 0x05, 0x00, 0x00, 0x00, 0x19, 0xFE, 0x00])
            .build();
        vm.run_script(1, false, false, &[]).unwrap();
        assert!(vm.sentences().is_empty());
    }
}
