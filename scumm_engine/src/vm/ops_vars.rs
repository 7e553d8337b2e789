//! Variable arithmetic, the expression evaluator and string resources.

use log::warn;

use crate::error::{FatalError, VmResult};
use crate::resources::ResourceKind;

use super::fetch::{PARAM_1, PARAM_2, PARAM_3};
use super::Vm;

impl Vm {
    pub(super) fn op_move(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let value = self.get_var_or_direct_word(PARAM_1)?;
        self.set_result(value)
    }

    pub(super) fn op_arith(&mut self, op: impl Fn(i32, i32) -> i32) -> VmResult<()> {
        self.get_result_pos()?;
        let a = self.get_var_or_direct_word(PARAM_1)?;
        let current = self.read_var(self.result_var)?;
        self.set_result(op(current, a))
    }

    pub(super) fn op_divide(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let a = self.get_var_or_direct_word(PARAM_1)?;
        if a == 0 {
            return Err(FatalError::DivideByZero {
                script: self.script_number(),
            });
        }
        let current = self.read_var(self.result_var)?;
        self.set_result(current.wrapping_div(a))
    }

    pub(super) fn op_step(&mut self, delta: i32) -> VmResult<()> {
        self.get_result_pos()?;
        let current = self.read_var(self.result_var)?;
        self.set_result(current.wrapping_add(delta))
    }

    /// Fills consecutive variables; a count of 0 means 256.
    pub(super) fn op_set_var_range(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let mut count = self.fetch_byte()? as u32;
        if count == 0 {
            count = 256;
        }
        let words = self.opcode & 0x80 != 0;
        for _ in 0..count {
            let value = if words {
                self.fetch_i16()?
            } else {
                self.fetch_byte()? as i32
            };
            self.set_result(value)?;
            self.result_var = self.result_var.wrapping_add(1);
        }
        Ok(())
    }

    /// Stack evaluator. Sub-op 6 runs an embedded instruction and pushes
    /// whatever it left in variable 0.
    pub(super) fn op_expression(&mut self) -> VmResult<()> {
        fn pop(stack: &mut Vec<i32>) -> VmResult<i32> {
            stack.pop().ok_or(FatalError::InvalidIndex {
                table: "expression stack",
                index: -1,
            })
        }

        self.get_result_pos()?;
        let dst = self.result_var;
        let mut stack = Vec::new();
        loop {
            self.opcode = self.fetch_byte()?;
            if self.opcode == 0xFF {
                break;
            }
            match self.opcode & 0x1F {
                1 => stack.push(self.get_var_or_direct_word(PARAM_1)?),
                2 => {
                    let i = pop(&mut stack)?;
                    let j = pop(&mut stack)?;
                    stack.push(j.wrapping_add(i));
                }
                3 => {
                    let i = pop(&mut stack)?;
                    let j = pop(&mut stack)?;
                    stack.push(j.wrapping_sub(i));
                }
                4 => {
                    let i = pop(&mut stack)?;
                    let j = pop(&mut stack)?;
                    stack.push(j.wrapping_mul(i));
                }
                5 => {
                    let i = pop(&mut stack)?;
                    let j = pop(&mut stack)?;
                    if i == 0 {
                        return Err(FatalError::DivideByZero {
                            script: self.script_number(),
                        });
                    }
                    stack.push(j.wrapping_div(i));
                }
                6 => {
                    let byte = self.fetch_byte()?;
                    self.opcode = byte;
                    self.execute_opcode(byte)?;
                    stack.push(self.vars.get(0)?);
                }
                _ => {
                    return Err(FatalError::UnknownSubOpcode {
                        op: "expression",
                        sub: self.opcode,
                    })
                }
            }
        }
        self.result_var = dst;
        let value = pop(&mut stack)?;
        self.set_result(value)
    }

    pub(super) fn op_get_random_nr(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let max = self.get_var_or_direct_byte(PARAM_1)?;
        let value = self.rng.next_in(max);
        self.set_result(value)
    }

    fn string_id(&self, id: i32) -> VmResult<u16> {
        if id < 0 || id as usize >= self.traits.num_strings.max(1) {
            return Err(FatalError::InvalidIndex {
                table: "string",
                index: id,
            });
        }
        Ok(id as u16)
    }

    pub(crate) fn string_bytes(&mut self, id: i32) -> VmResult<Vec<u8>> {
        let id = self.string_id(id)?;
        Ok(self.resources.require(ResourceKind::String, id)?.to_vec())
    }

    pub(super) fn op_string_ops(&mut self) -> VmResult<()> {
        self.opcode = self.fetch_byte()?;
        match self.opcode & 0x1F {
            1 => {
                let a = self.get_var_or_direct_byte(PARAM_1)?;
                let text = self.fetch_inline_string()?;
                let id = self.string_id(a)?;
                self.resources.create(ResourceKind::String, id, text);
            }
            2 => {
                let a = self.get_var_or_direct_byte(PARAM_1)?;
                let b = self.get_var_or_direct_byte(PARAM_2)?;
                let (a, b) = (self.string_id(a)?, self.string_id(b)?);
                if let Some(source) = self.resources.get(ResourceKind::String, b)? {
                    self.resources.create(ResourceKind::String, a, source.to_vec());
                } else {
                    self.resources.nuke(ResourceKind::String, a);
                }
            }
            3 => {
                let a = self.get_var_or_direct_byte(PARAM_1)?;
                let b = self.get_var_or_direct_byte(PARAM_2)?;
                let c = self.get_var_or_direct_byte(PARAM_3)?;
                let mut text = self.string_bytes(a)?;
                let slot = usize::try_from(b)
                    .ok()
                    .and_then(|i| text.get_mut(i))
                    .ok_or(FatalError::InvalidIndex {
                        table: "string character",
                        index: b,
                    })?;
                *slot = c as u8;
                self.resources.create(ResourceKind::String, a as u16, text);
            }
            4 => {
                self.get_result_pos()?;
                let a = self.get_var_or_direct_byte(PARAM_1)?;
                let b = self.get_var_or_direct_byte(PARAM_2)?;
                let text = self.string_bytes(a)?;
                let value = usize::try_from(b)
                    .ok()
                    .and_then(|i| text.get(i).copied())
                    .ok_or(FatalError::InvalidIndex {
                        table: "string character",
                        index: b,
                    })?;
                self.set_result(value as i32)?;
            }
            5 => {
                let a = self.get_var_or_direct_byte(PARAM_1)?;
                let size = self.get_var_or_direct_byte(PARAM_2)?;
                let id = self.string_id(a)?;
                self.resources.nuke(ResourceKind::String, id);
                if size > 0 {
                    self.resources
                        .create(ResourceKind::String, id, vec![0; size as usize]);
                }
            }
            _ => {
                return Err(FatalError::UnknownSubOpcode {
                    op: "stringOps",
                    sub: self.opcode,
                })
            }
        }
        Ok(())
    }

    pub(super) fn op_get_string_width(&mut self) -> VmResult<()> {
        self.get_result_pos()?;
        let id = self.get_var_or_direct_byte(PARAM_1)?;
        let text = self.string_bytes(id)?;
        let width = self.text_width(&text);
        self.set_result(width)
    }

    /// Small-header variable file I/O. The operands are consumed and the
    /// transfer itself is skipped.
    pub(super) fn op_save_load_vars(&mut self) -> VmResult<()> {
        let save = self.fetch_byte()? == 1;
        loop {
            self.opcode = self.fetch_byte()?;
            match self.opcode & 0x1F {
                0 | 0x04 | 0x1F => break,
                0x01 => {
                    self.get_result_pos()?;
                    self.get_result_pos()?;
                }
                0x02 => {
                    self.get_var_or_direct_byte(PARAM_1)?;
                    self.get_var_or_direct_byte(PARAM_2)?;
                }
                0x03 => {
                    self.fetch_inline_string()?;
                }
                _ => {
                    return Err(FatalError::UnknownSubOpcode {
                        op: "saveLoadVars",
                        sub: self.opcode,
                    })
                }
            }
        }
        warn!(
            "script {}: variable {} ignored",
            self.script_number(),
            if save { "save" } else { "load" }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::FatalError;
    use crate::resources::ResourceKind;
    use crate::vm::test_support::VmBuilder;
    use crate::vm::Vm;

    fn run(code: &[u8]) -> Vm {
        let mut vm = VmBuilder::v5().script(1, code).build();
        vm.run_script(1, false, false, &[]).unwrap();
        vm
    }

    #[test]
    fn arithmetic_updates_in_place() {
        // v10 = 7; v10 += 5; v10 *= 3; v10 -= 6; v10 /= 2; v10++
        let vm = run(&[
            0x1A, 0x0A, 0x00, 0x07, 0x00, //
            0x5A, 0x0A, 0x00, 0x05, 0x00, //
            0x1B, 0x0A, 0x00, 0x03, 0x00, //
            0x3A, 0x0A, 0x00, 0x06, 0x00, //
            0x5B, 0x0A, 0x00, 0x02, 0x00, //
            0x46, 0x0A, 0x00, //
            0x00,
        ]);
        assert_eq!(vm.vars().get(10).unwrap(), 16);
    }

    #[test]
    fn divide_by_zero_is_fatal() {
        let mut vm = VmBuilder::v5().script(1, &[0x5B, 0x0A, 0x00, 0x00, 0x00]).build();
        assert!(matches!(
            vm.run_script(1, false, false, &[]),
            Err(FatalError::DivideByZero { script: 1 })
        ));
    }

    #[test]
    fn set_var_range_reads_bytes_or_words() {
        let vm = run(&[0x26, 0x0A, 0x00, 0x03, 1, 2, 3, 0xA6, 0x14, 0x00, 0x02, 0xFF, 0xFF, 0x10, 0x00, 0x00]);
        let values: Vec<i32> = (10..13).map(|v| vm.vars().get(v).unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(vm.vars().get(20).unwrap(), -1);
        assert_eq!(vm.vars().get(21).unwrap(), 16);
    }

    #[test]
    fn expression_evaluates_in_stack_order() {
        // v10 = (20 - 6) / 7
        let vm = run(&[
            0xAC, 0x0A, 0x00, //
            0x01, 0x14, 0x00, 0x01, 0x06, 0x00, 0x03, //
            0x01, 0x07, 0x00, 0x05, 0xFF, //
            0x00,
        ]);
        assert_eq!(vm.vars().get(10).unwrap(), 2);
    }

    #[test]
    fn expression_can_embed_an_instruction() {
        // v10 = 4 + (v0 = 9 via an embedded move)
        let vm = run(&[
            0xAC, 0x0A, 0x00, //
            0x01, 0x04, 0x00, //
            0x06, 0x1A, 0x00, 0x00, 0x09, 0x00, //
            0x02, 0xFF, //
            0x00,
        ]);
        assert_eq!(vm.vars().get(10).unwrap(), 13);
        assert_eq!(vm.vars().get(0).unwrap(), 9);
    }

    #[test]
    fn expression_division_by_zero_is_fatal() {
        let mut vm = VmBuilder::v5()
            .script(1, &[0xAC, 0x0A, 0x00, 0x01, 0x01, 0x00, 0x01, 0x00, 0x00, 0x05, 0xFF])
            .build();
        assert!(matches!(
            vm.run_script(1, false, false, &[]),
            Err(FatalError::DivideByZero { .. })
        ));
    }

    #[test]
    fn random_numbers_stay_in_range() {
        let code = [0x16, 0x0A, 0x00, 0x05, 0x00];
        let vm = run(&code);
        let value = vm.vars().get(10).unwrap();
        assert!((0..=5).contains(&value));
    }

    #[test]
    fn string_ops_edit_string_resources() {
        // load 1 "ab"; create 2 size 3; set 1[1] = 'z'; get v10 = 1[0]; copy 3 <- 1
        let vm = run(&[
            0x27, 0x01, 0x01, b'a', b'b', 0x00, //
            0x27, 0x05, 0x02, 0x03, //
            0x27, 0x03, 0x01, 0x01, b'z', //
            0x27, 0x04, 0x0A, 0x00, 0x01, 0x00, //
            0x27, 0x02, 0x03, 0x01, //
            0x00,
        ]);
        let text = vm.resources().peek(ResourceKind::String, 1).unwrap();
        assert_eq!(&text[..], b"az");
        assert_eq!(&vm.resources().peek(ResourceKind::String, 2).unwrap()[..], &[0, 0, 0]);
        assert_eq!(&vm.resources().peek(ResourceKind::String, 3).unwrap()[..], b"az");
        assert_eq!(vm.vars().get(10).unwrap(), b'a' as i32);
    }

    #[test]
    fn string_width_counts_printable_characters() {
        let vm = run(&[
            0x27, 0x01, 0x01, b'h', b'i', 0xFF, 0x01, b'!', 0x00, //
            0x67, 0x0A, 0x00, 0x01, //
            0x00,
        ]);
        assert_eq!(vm.vars().get(10).unwrap(), 24);
    }
}
