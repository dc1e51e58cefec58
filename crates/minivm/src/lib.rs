//! MiniVM: execution core plus the wiring that turns a source file
//! into a running VM.
//!
//! The heavy lifting lives in the sub-crates; this crate provides the
//! per-mode configuration (front-end, memory back-end, register file,
//! standard library) and re-exports the public surface.

pub use minivm_core::{Inst, Opcode, SymbolPool, VmAddr, VmOpr};
pub use minivm_dbg::{Debugger, LineSource, ScriptedSource};
pub use minivm_front::{parse_eeyore, parse_tigger};
pub use minivm_ir::{EmitError, EmitErrorKind, InstContainer, StepAction};
pub use minivm_mem::{DenseMemoryPool, MemoryPool, SparseMemoryPool};
pub use minivm_vm::{register_stdlib, Vm, VmError};

use minivm_core::{REG_COUNT, RET_REG, ZERO_REG};

/// Which IR dialect a VM instance executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrMode {
    /// The high-level three-address IR: named variables, sparse memory
    /// pool, no static registers.
    Eeyore,
    /// The register-and-frame IR: 28 static registers, dense memory
    /// pool, return value in `a0`.
    Tigger,
}

/// Parse `src` into a fresh container with the mode's front-end.
/// The container still needs sealing.
pub fn parse_source(src: &str, src_file: &str, mode: IrMode) -> InstContainer {
    let mut cont = InstContainer::new(src_file);
    match mode {
        IrMode::Eeyore => parse_eeyore(src, &mut cont),
        IrMode::Tigger => parse_tigger(src, &mut cont),
    }
    cont
}

/// Configure a VM over a sealed container for the given mode, with the
/// standard library registered and the state reset, ready to run.
pub fn build_vm(cont: InstContainer, mode: IrMode) -> Vm {
    let mut vm = Vm::new(cont);
    match mode {
        IrMode::Eeyore => {
            vm.set_mem_pool(Box::new(SparseMemoryPool::new()));
        }
        IrMode::Tigger => {
            vm.set_mem_pool(Box::new(DenseMemoryPool::new()));
            vm.set_static_reg_count(REG_COUNT);
            vm.set_ret_reg(RET_REG);
        }
    }
    register_stdlib(&mut vm, mode == IrMode::Tigger);
    vm.reset();
    if mode == IrMode::Tigger {
        vm.set_reg(ZERO_REG, 0);
    }
    vm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eeyore_pipeline_runs() {
        let src = "f_main [0]\n  var x\n  x = 40 + 2\n  return x\nend f_main\n";
        let mut cont = parse_source(src, "test.eeyore", IrMode::Eeyore);
        cont.seal().unwrap();
        let mut vm = build_vm(cont, IrMode::Eeyore);
        assert_eq!(vm.run(), Some(42));
    }

    #[test]
    fn tigger_pipeline_runs() {
        let src = "f_main [0] [0]\n  t0 = 6\n  a0 = t0 * 7\n  return\nend f_main\n";
        let mut cont = parse_source(src, "test.tigger", IrMode::Tigger);
        cont.seal().unwrap();
        let mut vm = build_vm(cont, IrMode::Tigger);
        assert_eq!(vm.run(), Some(42));
    }
}
