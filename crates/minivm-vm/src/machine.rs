use std::collections::HashMap;
use std::rc::Rc;

use minivm_core::{MemId, RegId, SymId, SymbolPool, VmAddr, VmOpr};
use minivm_ir::InstContainer;
use minivm_mem::{MemoryPool, SparseMemoryPool};

use crate::error::VmError;

/// Named variables of one activation: symbol id to value.
pub type Environment = HashMap<SymId, VmOpr>;

/// An activation record: environment plus the pc to return to.
#[derive(Clone, Debug)]
pub struct Frame {
    pub env: Environment,
    pub ret_pc: VmAddr,
}

/// An external function. It reads its parameters through the VM (from
/// `p0…` bindings or argument registers, by convention) and reports
/// success; failure aborts the run with `ExtFuncError`.
pub type ExtFunc = Rc<dyn Fn(&mut Vm) -> bool>;

/// Hook invoked when the container's watch counter fires; evaluates
/// watchpoint expressions and may enable trap mode.
pub type WatchHook = Rc<dyn Fn(&mut Vm)>;

/// A MiniVM instance over a sealed instruction container.
pub struct Vm {
    pub(crate) cont: InstContainer,
    pub(crate) pc: VmAddr,
    pub(crate) oprs: Vec<VmOpr>,
    pub(crate) envs: Vec<Frame>,
    pub(crate) regs: Vec<VmOpr>,
    pub(crate) ret_reg: RegId,
    pub(crate) mem: Box<dyn MemoryPool>,
    pub(crate) ext: HashMap<SymId, ExtFunc>,
    pub(crate) watch_hook: Option<WatchHook>,
    pub(crate) error: Option<VmError>,
}

impl Vm {
    /// Create a VM over a sealed container, with a sparse memory pool
    /// and no static registers.
    pub fn new(cont: InstContainer) -> Self {
        Self {
            cont,
            pc: 0,
            oprs: Vec::new(),
            envs: Vec::new(),
            regs: Vec::new(),
            ret_reg: 0,
            mem: Box::new(SparseMemoryPool::new()),
            ext: HashMap::new(),
            watch_hook: None,
            error: None,
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Swap in a memory pool back-end. Do this before `reset`.
    pub fn set_mem_pool(&mut self, pool: Box<dyn MemoryPool>) {
        self.mem = pool;
    }

    /// Size the static register file (0 disables register mode).
    pub fn set_static_reg_count(&mut self, count: u32) {
        self.regs.clear();
        self.regs.resize(count as usize, 0);
    }

    /// Select the register holding the final value in register mode.
    pub fn set_ret_reg(&mut self, reg: RegId) {
        self.ret_reg = reg;
    }

    /// Register an external function under `name`.
    /// Returns false when the name is already bound.
    pub fn register_function(&mut self, name: &str, func: impl Fn(&mut Vm) -> bool + 'static) -> bool {
        let id = self.cont.syms_mut().intern(name);
        if self.ext.contains_key(&id) {
            return false;
        }
        self.ext.insert(id, Rc::new(func));
        true
    }

    /// Install the watchpoint hook.
    pub fn set_watch_hook(&mut self, hook: impl Fn(&mut Vm) + 'static) {
        self.watch_hook = Some(Rc::new(hook));
    }

    /// Reset the execution state. Must be called once before `run`.
    pub fn reset(&mut self) {
        self.pc = 0;
        self.oprs.clear();
        self.envs.clear();
        // the bottom frame is the global scope
        self.envs.push(Frame {
            env: Environment::new(),
            ret_pc: 0,
        });
        // balanced by the root Ret
        self.mem.save_state();
        for reg in &mut self.regs {
            *reg = 0;
        }
        self.error = None;
    }

    // ========================================================================
    // State access (externals, debugger)
    // ========================================================================

    pub fn pc(&self) -> VmAddr {
        self.pc
    }

    /// The operand stack, bottom to top.
    pub fn oprs(&self) -> &[VmOpr] {
        &self.oprs
    }

    pub fn push_opr(&mut self, value: VmOpr) {
        self.oprs.push(value);
    }

    pub fn pop_opr(&mut self) -> Option<VmOpr> {
        self.oprs.pop()
    }

    /// Number of live activation records (the global scope included).
    pub fn env_depth(&self) -> usize {
        self.envs.len()
    }

    /// The activation records, bottom (global) to top.
    pub fn frames(&self) -> &[Frame] {
        &self.envs
    }

    /// Value of a static register.
    pub fn reg(&self, id: RegId) -> Option<VmOpr> {
        self.regs.get(id as usize).copied()
    }

    /// Write a static register. Returns false when out of range.
    pub fn set_reg(&mut self, id: RegId, value: VmOpr) -> bool {
        match self.regs.get_mut(id as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// All static registers; empty when register mode is disabled.
    pub fn regs(&self) -> &[VmOpr] {
        &self.regs
    }

    pub(crate) fn ret_reg(&self) -> RegId {
        self.ret_reg
    }

    /// Resolve a symbol first in the current, then the global
    /// environment.
    pub fn var(&self, id: SymId) -> Option<VmOpr> {
        let cur = self.envs.last()?;
        if let Some(&value) = cur.env.get(&id) {
            return Some(value);
        }
        self.envs.first()?.env.get(&id).copied()
    }

    /// Mutable slot of a symbol, current environment first.
    pub(crate) fn var_slot(&mut self, id: SymId) -> Option<&mut VmOpr> {
        if self.envs.last()?.env.contains_key(&id) {
            return self.envs.last_mut()?.env.get_mut(&id);
        }
        self.envs.first_mut()?.env.get_mut(&id)
    }

    /// Read parameter `i` of the current activation (`p{i}` binding).
    pub fn param(&self, i: usize) -> Option<VmOpr> {
        let id = self.cont.syms().lookup(&format!("p{i}"))?;
        self.envs.last()?.env.get(&id).copied()
    }

    pub fn mem(&self) -> &dyn MemoryPool {
        self.mem.as_ref()
    }

    pub fn mem_mut(&mut self) -> &mut dyn MemoryPool {
        self.mem.as_mut()
    }

    /// Convenience memory read used by externals and the debugger.
    pub fn load_word(&self, addr: MemId) -> Option<VmOpr> {
        self.mem.load_word(addr)
    }

    pub fn container(&self) -> &InstContainer {
        &self.cont
    }

    pub fn container_mut(&mut self) -> &mut InstContainer {
        &mut self.cont
    }

    pub fn syms(&self) -> &SymbolPool {
        self.cont.syms()
    }

    /// The sticky error code of the last run; 255 when the VM never
    /// produced one.
    pub fn error_code(&self) -> u32 {
        self.error.map(VmError::code).unwrap_or(VmError::VmIrrelevant.code())
    }

    pub fn last_error(&self) -> Option<VmError> {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use minivm_core::MAIN_FUNC;

    use super::*;

    fn empty_vm() -> Vm {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.push_op(minivm_core::Opcode::Ret);
        cont.exit_function();
        cont.seal().unwrap();
        Vm::new(cont)
    }

    #[test]
    fn reset_installs_global_frame() {
        let mut vm = empty_vm();
        vm.reset();
        assert_eq!(vm.env_depth(), 1);
        assert_eq!(vm.pc(), 0);
        assert_eq!(vm.oprs().len(), 0);
    }

    #[test]
    fn register_file_sizing() {
        let mut vm = empty_vm();
        assert_eq!(vm.reg(0), None);
        vm.set_static_reg_count(4);
        assert_eq!(vm.reg(3), Some(0));
        assert!(vm.set_reg(3, 9));
        assert_eq!(vm.reg(3), Some(9));
        assert!(!vm.set_reg(4, 1));
    }

    #[test]
    fn register_function_rejects_duplicates() {
        let mut vm = empty_vm();
        assert!(vm.register_function("f_id", |_| true));
        assert!(!vm.register_function("f_id", |_| true));
    }

    #[test]
    fn var_prefers_current_env() {
        let mut vm = empty_vm();
        vm.reset();
        let x = vm.cont.syms_mut().intern("x");
        vm.envs[0].env.insert(x, 1);
        assert_eq!(vm.var(x), Some(1));
        vm.envs.push(Frame {
            env: Environment::from([(x, 2)]),
            ret_pc: 0,
        });
        assert_eq!(vm.var(x), Some(2));
        vm.envs.pop();
        assert_eq!(vm.var(x), Some(1));
    }

    #[test]
    fn var_falls_back_to_global() {
        let mut vm = empty_vm();
        vm.reset();
        let x = vm.cont.syms_mut().intern("x");
        vm.envs[0].env.insert(x, 7);
        vm.envs.push(Frame {
            env: Environment::new(),
            ret_pc: 0,
        });
        assert_eq!(vm.var(x), Some(7));
        let y = vm.cont.syms_mut().intern("y");
        assert_eq!(vm.var(y), None);
    }

    #[test]
    fn error_code_defaults_to_irrelevant() {
        let vm = empty_vm();
        assert_eq!(vm.error_code(), 255);
    }
}
