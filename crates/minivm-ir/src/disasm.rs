//! Textual and raw dumps of a container's instruction stream.

use std::io::{self, Write};

use minivm_core::{Opcode, VmAddr};

use crate::container::InstContainer;

impl InstContainer {
    /// Disassemble the instruction at `pc` into `w`.
    /// Returns `Ok(false)` when `pc` is out of range.
    ///
    /// Planted breakpoints are looked through, so a dump never shows a
    /// debugger-injected `Break`.
    pub fn dump<W: Write>(&self, w: &mut W, pc: VmAddr) -> io::Result<bool> {
        let Some(inst) = self.real_inst(pc) else {
            return Ok(false);
        };
        let Some(op) = inst.opcode() else {
            return Ok(false);
        };
        write!(w, "{}", op.mnemonic())?;
        if op.has_sym_operand() {
            let name = self.syms().name(inst.operand()).unwrap_or("?");
            write!(w, "\t{name}")?;
        } else if op.has_num_operand() {
            if op == Opcode::Imm {
                write!(w, "\t{}", inst.imm())?;
            } else {
                write!(w, "\t{}", inst.operand())?;
            }
        }
        Ok(true)
    }

    /// Disassemble the whole container, one `pc:\tinst` row per line.
    pub fn dump_all<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for pc in 0..self.inst_count() as VmAddr {
            write!(w, "{pc}:\t")?;
            self.dump(w, pc)?;
            writeln!(w)?;
        }
        Ok(())
    }

    /// The disassembly of one instruction as a string, for debugger
    /// display.
    pub fn dump_string(&self, pc: VmAddr) -> Option<String> {
        let mut buf = Vec::new();
        match self.dump(&mut buf, pc) {
            Ok(true) => String::from_utf8(buf).ok(),
            _ => None,
        }
    }

    /// Dump the raw packed instruction words, little-endian.
    pub fn dump_raw<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for pc in 0..self.inst_count() as VmAddr {
            if let Some(inst) = self.real_inst(pc) {
                w.write_all(&inst.raw().to_le_bytes())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use minivm_core::MAIN_FUNC;

    use super::*;

    fn sample() -> InstContainer {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.push_var("x");
        cont.push_load_imm(-3);
        cont.push_store_var("x");
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        cont.seal().unwrap();
        cont
    }

    #[test]
    fn dump_formats_symbol_operands() {
        let cont = sample();
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        assert_eq!(cont.dump_string(pc).as_deref(), Some("Var\tx"));
    }

    #[test]
    fn dump_formats_signed_immediates() {
        let cont = sample();
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap() + 1;
        assert_eq!(cont.dump_string(pc).as_deref(), Some("Imm\t-3"));
    }

    #[test]
    fn dump_omits_missing_operands() {
        let cont = sample();
        let ret_pc = cont.inst_count() as VmAddr - 1;
        assert_eq!(cont.dump_string(ret_pc).as_deref(), Some("Ret"));
    }

    #[test]
    fn dump_sees_through_breakpoints() {
        let mut cont = sample();
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        cont.toggle_breakpoint(pc, true);
        assert_eq!(cont.dump_string(pc).as_deref(), Some("Var\tx"));
    }

    #[test]
    fn dump_all_lists_every_pc() {
        let cont = sample();
        let mut buf = Vec::new();
        cont.dump_all(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), cont.inst_count());
        assert!(text.starts_with("0:\tJmp"));
    }

    #[test]
    fn dump_raw_is_word_per_inst() {
        let cont = sample();
        let mut buf = Vec::new();
        cont.dump_raw(&mut buf).unwrap();
        assert_eq!(buf.len(), cont.inst_count() * 4);
    }

    #[test]
    fn dump_out_of_range() {
        let cont = sample();
        assert_eq!(cont.dump_string(9999), None);
    }
}
