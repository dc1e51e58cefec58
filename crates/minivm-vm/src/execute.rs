//! The dispatch loop.
//!
//! One match arm per opcode, fetching every instruction through the
//! container so the debugger's interposition (breakpoints, trap mode,
//! step counters) applies uniformly. `CallExt` shares the `Ret` arm's
//! logic, mirroring the fall-through of the threaded original.

use minivm_core::{Inst, Opcode, SymId, VmOpr, DEBUGGER_FUNC, OPERAND_BITS, OPERAND_MASK};

use crate::error::VmError;
use crate::machine::{Environment, Frame, Vm};

impl Vm {
    /// Run until the root environment returns, the debugger callback
    /// requests termination, or a dynamic error occurs.
    ///
    /// Returns the final value: the operand stack top when registers
    /// are disabled, the return register otherwise. On error, reports
    /// once with pc and nearest line, stores the sticky code, and
    /// returns `None`. A VM that has never been `reset` (or whose
    /// previous run completed) is reset first.
    pub fn run(&mut self) -> Option<VmOpr> {
        if self.envs.is_empty() {
            self.reset();
        }
        match self.execute() {
            Ok(value) => {
                tracing::debug!(value, "vm run finished");
                Some(value)
            }
            Err(err) => {
                self.report_error(err);
                None
            }
        }
    }

    fn report_error(&mut self, err: VmError) {
        match self.cont.find_line(self.pc) {
            Some(line) => eprintln!("error (line {line}, pc {}): {err}", self.pc),
            None => eprintln!("error (pc {}): {err}", self.pc),
        }
        self.error = Some(err);
    }

    fn execute(&mut self) -> Result<VmOpr, VmError> {
        loop {
            let inst = self.fetch()?;
            let op = inst.opcode().ok_or(VmError::InvalidPcAddr)?;
            match op {
                Opcode::Var => {
                    self.bind(inst.operand(), 0)?;
                    self.pc += 1;
                }
                Opcode::Arr => {
                    // the popped size narrows to unsigned with wraparound
                    let size = self.pop()? as u32;
                    let mem_id = self.mem.allocate(size, true);
                    self.bind(inst.operand(), mem_id as VmOpr)?;
                    self.pc += 1;
                }
                Opcode::Ld => {
                    let addr = self.pop()?;
                    let value = self
                        .mem
                        .load_word(addr as u32)
                        .ok_or(VmError::InvalidMemPoolAddr)?;
                    self.oprs.push(value);
                    self.pc += 1;
                }
                Opcode::LdVar => {
                    let value = self.var(inst.operand()).ok_or(VmError::SymbolNotFound)?;
                    self.oprs.push(value);
                    self.pc += 1;
                }
                Opcode::LdReg => {
                    let value = self.reg(inst.operand()).ok_or(VmError::InvalidRegNum)?;
                    self.oprs.push(value);
                    self.pc += 1;
                }
                Opcode::St => {
                    let addr = self.pop()?;
                    let value = self.pop()?;
                    if !self.mem.store_word(addr as u32, value) {
                        return Err(VmError::InvalidMemPoolAddr);
                    }
                    self.pc += 1;
                }
                Opcode::StVar => {
                    let value = self.pop()?;
                    let slot = self
                        .var_slot(inst.operand())
                        .ok_or(VmError::SymbolNotFound)?;
                    *slot = value;
                    self.pc += 1;
                }
                Opcode::StVarP => {
                    let value = *self.top_mut()?;
                    let slot = self
                        .var_slot(inst.operand())
                        .ok_or(VmError::SymbolNotFound)?;
                    *slot = value;
                    self.pc += 1;
                }
                Opcode::StReg => {
                    let value = self.pop()?;
                    if !self.set_reg(inst.operand(), value) {
                        return Err(VmError::InvalidRegNum);
                    }
                    self.pc += 1;
                }
                Opcode::StRegP => {
                    let value = *self.top_mut()?;
                    if !self.set_reg(inst.operand(), value) {
                        return Err(VmError::InvalidRegNum);
                    }
                    self.pc += 1;
                }
                Opcode::Imm => {
                    self.oprs.push(inst.imm());
                    self.pc += 1;
                }
                Opcode::ImmHi => {
                    let hi = (inst.operand() & 0xff) << OPERAND_BITS;
                    let top = self.top_mut()?;
                    *top = ((*top as u32 & OPERAND_MASK) | hi) as VmOpr;
                    self.pc += 1;
                }
                Opcode::Bnz => {
                    if self.pop()? != 0 {
                        self.pc = inst.operand();
                    } else {
                        self.pc += 1;
                    }
                }
                Opcode::Jmp => {
                    self.pc = inst.operand();
                }
                Opcode::Call => {
                    self.init_call();
                    self.pc = inst.operand();
                }
                Opcode::CallExt => {
                    let func = self
                        .ext
                        .get(&inst.operand())
                        .cloned()
                        .ok_or(VmError::InvalidExtFunc)?;
                    self.init_call();
                    if !func(self) {
                        return Err(VmError::ExtFuncError);
                    }
                    // an external call returns immediately
                    if let Some(value) = self.do_ret()? {
                        return Ok(value);
                    }
                }
                Opcode::Ret => {
                    if let Some(value) = self.do_ret()? {
                        return Ok(value);
                    }
                }
                Opcode::Break => {
                    match self.debugger_func() {
                        Some(func) => {
                            if !func(self) {
                                return Ok(0);
                            }
                            // trap mode was cleared inside the debugger:
                            // re-fetch the same pc so the underlying
                            // instruction executes next
                        }
                        None => self.pc += 1,
                    }
                }
                Opcode::LNot => {
                    let top = self.top_mut()?;
                    *top = (*top == 0) as VmOpr;
                    self.pc += 1;
                }
                Opcode::LAnd => self.binary(|l, r| (l != 0 && r != 0) as VmOpr)?,
                Opcode::LOr => self.binary(|l, r| (l != 0 || r != 0) as VmOpr)?,
                Opcode::Eq => self.binary(|l, r| (l == r) as VmOpr)?,
                Opcode::Ne => self.binary(|l, r| (l != r) as VmOpr)?,
                Opcode::Gt => self.binary(|l, r| (l > r) as VmOpr)?,
                Opcode::Lt => self.binary(|l, r| (l < r) as VmOpr)?,
                Opcode::Ge => self.binary(|l, r| (l >= r) as VmOpr)?,
                Opcode::Le => self.binary(|l, r| (l <= r) as VmOpr)?,
                Opcode::Neg => {
                    let top = self.top_mut()?;
                    *top = top.wrapping_neg();
                    self.pc += 1;
                }
                Opcode::Add => self.binary(VmOpr::wrapping_add)?,
                Opcode::Sub => self.binary(VmOpr::wrapping_sub)?,
                Opcode::Mul => self.binary(VmOpr::wrapping_mul)?,
                Opcode::Div => self.binary(|l, r| if r == 0 { 0 } else { l.wrapping_div(r) })?,
                Opcode::Mod => self.binary(|l, r| if r == 0 { 0 } else { l.wrapping_rem(r) })?,
                Opcode::Clear => {
                    self.oprs.clear();
                    self.pc += 1;
                }
            }
        }
    }

    /// Fetch through the container, forwarding a fired watch tick to
    /// the hook before the trap check so a watch hit breaks on this
    /// very fetch.
    fn fetch(&mut self) -> Result<Inst, VmError> {
        let inst = self.cont.get_inst(self.pc).ok_or(VmError::InvalidPcAddr)?;
        if self.cont.take_watch_tick() {
            if let Some(hook) = self.watch_hook.clone() {
                hook(self);
            }
            if self.cont.trap_mode() {
                return Ok(Inst::new(Opcode::Break, 0));
            }
        }
        Ok(inst)
    }

    fn debugger_func(&self) -> Option<crate::machine::ExtFunc> {
        let id = self.cont.syms().lookup(DEBUGGER_FUNC)?;
        self.ext.get(&id).cloned()
    }

    fn pop(&mut self) -> Result<VmOpr, VmError> {
        self.oprs.pop().ok_or(VmError::EmptyOprStack)
    }

    fn top_mut(&mut self) -> Result<&mut VmOpr, VmError> {
        self.oprs.last_mut().ok_or(VmError::EmptyOprStack)
    }

    fn binary(&mut self, f: impl Fn(VmOpr, VmOpr) -> VmOpr) -> Result<(), VmError> {
        let rhs = self.pop()?;
        let top = self.top_mut()?;
        *top = f(*top, rhs);
        self.pc += 1;
        Ok(())
    }

    /// Bind a symbol in the current environment.
    fn bind(&mut self, id: SymId, value: VmOpr) -> Result<(), VmError> {
        let Some(frame) = self.envs.last_mut() else {
            unreachable!("no active frame");
        };
        if frame.env.insert(id, value).is_some() {
            return Err(VmError::SymbolRedef);
        }
        Ok(())
    }

    /// Call prologue: checkpoint memory, open an environment with the
    /// return address, and drain the operand stack into parameters.
    /// The parameter index is the pre-pop stack depth minus one, so the
    /// bottom of the drained stack becomes `p0`.
    fn init_call(&mut self) {
        self.mem.save_state();
        let ret_pc = self.pc + 1;
        let mut env = Environment::new();
        while let Some(value) = self.oprs.pop() {
            let id = self.cont.syms_mut().intern(&format!("p{}", self.oprs.len()));
            env.insert(id, value);
        }
        self.envs.push(Frame { env, ret_pc });
    }

    /// Return epilogue, shared by `Ret` and `CallExt`. Yields the final
    /// value when the root environment returns.
    fn do_ret(&mut self) -> Result<Option<VmOpr>, VmError> {
        self.mem.restore_state();
        let Some(frame) = self.envs.pop() else {
            unreachable!("no active frame");
        };
        if self.envs.is_empty() {
            let value = if self.regs.is_empty() {
                self.pop()?
            } else {
                self.reg(self.ret_reg()).ok_or(VmError::InvalidRegNum)?
            };
            return Ok(Some(value));
        }
        self.pc = frame.ret_pc;
        Ok(None)
    }
}
