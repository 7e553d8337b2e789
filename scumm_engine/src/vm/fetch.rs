//! Operand decoding: byte/word fetches, the variable encoding and the
//! `PARAM` bits that pick between a literal and a variable reference.

use crate::error::{FatalError, VmResult};

use super::{Vm, NUM_LOCALS};

pub(crate) const PARAM_1: u8 = 0x80;
pub(crate) const PARAM_2: u8 = 0x40;
pub(crate) const PARAM_3: u8 = 0x20;

const VAR_INDEXED: u16 = 0x2000;
const VAR_BIT: u16 = 0x8000;
const VAR_LOCAL: u16 = 0x4000;
const VARARG_LIMIT: usize = 16;

impl Vm {
    pub(crate) fn fetch_byte(&mut self) -> VmResult<u8> {
        let byte = *self.code.get(self.pc).ok_or(FatalError::ScriptOutOfBounds {
            script: self.script_number(),
            pc: self.pc,
        })?;
        self.pc += 1;
        Ok(byte)
    }

    pub(crate) fn fetch_word(&mut self) -> VmResult<u16> {
        let lo = self.fetch_byte()? as u16;
        let hi = self.fetch_byte()? as u16;
        Ok(lo | hi << 8)
    }

    /// A literal word operand; literals are signed.
    pub(crate) fn fetch_i16(&mut self) -> VmResult<i32> {
        Ok(self.fetch_word()? as i16 as i32)
    }

    fn local_index(var: u16) -> VmResult<usize> {
        let index = (var & 0xFFF) as usize;
        if index >= NUM_LOCALS {
            return Err(FatalError::InvalidIndex {
                table: "local variable",
                index: index as i32,
            });
        }
        Ok(index)
    }

    /// Applies the indexed form (`0x2000`): a second word names either a
    /// variable whose value is added or a literal offset.
    fn resolve_indexed(&mut self, mut var: u16) -> VmResult<u16> {
        if var & VAR_INDEXED != 0 {
            let index = self.fetch_word()?;
            let offset = if index & VAR_INDEXED != 0 {
                self.read_var(index & !VAR_INDEXED)?
            } else {
                (index & 0xFFF) as i32
            };
            var = (var as i32 + offset) as u16 & !VAR_INDEXED;
        }
        Ok(var)
    }

    /// Reads an encoded variable reference. Indexed references consume an
    /// extra word from the code stream.
    pub(crate) fn read_var(&mut self, var: u16) -> VmResult<i32> {
        let var = self.resolve_indexed(var)?;
        if var & 0xF000 == 0 {
            return self.vars.get(var);
        }
        if var & VAR_BIT != 0 {
            return Ok(self.vars.get_bit(var & 0x7FFF)? as i32);
        }
        if var & VAR_LOCAL != 0 {
            let index = Self::local_index(var)?;
            let slot = self.current_index()?;
            return Ok(self.slots[slot].locals[index]);
        }
        Err(FatalError::IllegalVarBits(var))
    }

    pub(crate) fn write_var(&mut self, var: u16, value: i32) -> VmResult<()> {
        if var & 0xF000 == 0 {
            return self.vars.set(var, value);
        }
        if var & VAR_BIT != 0 {
            return self.vars.set_bit(var & 0x7FFF, value != 0);
        }
        if var & VAR_LOCAL != 0 {
            let index = Self::local_index(var)?;
            let slot = self.current_index()?;
            self.slots[slot].locals[index] = value;
            return Ok(());
        }
        Err(FatalError::IllegalVarBits(var))
    }

    /// Reads the next word as a variable reference and returns its value.
    pub(crate) fn get_var(&mut self) -> VmResult<i32> {
        let var = self.fetch_word()?;
        self.read_var(var)
    }

    pub(crate) fn get_var_or_direct_byte(&mut self, mask: u8) -> VmResult<i32> {
        if self.opcode & mask != 0 {
            self.get_var()
        } else {
            Ok(self.fetch_byte()? as i32)
        }
    }

    pub(crate) fn get_var_or_direct_word(&mut self, mask: u8) -> VmResult<i32> {
        if self.opcode & mask != 0 {
            self.get_var()
        } else {
            self.fetch_i16()
        }
    }

    /// Reads the result variable of the current instruction.
    pub(crate) fn get_result_pos(&mut self) -> VmResult<()> {
        let var = self.fetch_word()?;
        self.result_var = self.resolve_indexed(var)?;
        Ok(())
    }

    pub(crate) fn set_result(&mut self, value: i32) -> VmResult<()> {
        self.write_var(self.result_var, value)
    }

    /// Argument list terminated by `0xFF`; each entry carries its own
    /// `PARAM_1` bit in a leading sub-opcode byte.
    pub(crate) fn get_word_vararg(&mut self) -> VmResult<Vec<i32>> {
        let mut args = Vec::new();
        loop {
            self.opcode = self.fetch_byte()?;
            if self.opcode == 0xFF {
                break;
            }
            if args.len() >= VARARG_LIMIT {
                return Err(FatalError::InvalidIndex {
                    table: "script argument",
                    index: args.len() as i32,
                });
            }
            args.push(self.get_var_or_direct_word(PARAM_1)?);
        }
        Ok(args)
    }

    /// Raw bytes of an inline string up to (not including) its terminator.
    /// Escape codes are kept; those with arguments keep their two bytes.
    pub(crate) fn fetch_inline_string(&mut self) -> VmResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let byte = self.fetch_byte()?;
            if byte == 0 {
                break;
            }
            out.push(byte);
            if byte == 0xFF || byte == 0xFE {
                let code = self.fetch_byte()?;
                out.push(code);
                if !matches!(code, 1 | 2 | 3 | 8) {
                    out.push(self.fetch_byte()?);
                    out.push(self.fetch_byte()?);
                }
            }
        }
        Ok(out)
    }

    /// Relative branch: taken when `cond` is false.
    pub(crate) fn jump_relative(&mut self, cond: bool) -> VmResult<()> {
        let offset = self.fetch_i16()?;
        if !cond {
            let target = self.pc as i64 + offset as i64;
            if target < 0 {
                return Err(FatalError::ScriptOutOfBounds {
                    script: self.script_number(),
                    pc: self.pc,
                });
            }
            self.pc = target as usize;
        }
        Ok(())
    }
}
