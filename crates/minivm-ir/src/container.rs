use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use minivm_core::{
    Inst, Opcode, RegId, SymId, SymbolPool, VmAddr, VmOpr, ENTRY_LABEL, FRAME_SYMBOL, IMM_MAX,
    IMM_MIN, MAIN_FUNC, OPERAND_BITS, OPERAND_MASK,
};

use crate::error::{EmitError, EmitErrorKind};
use crate::step::{StepAction, StepCounter};

/// Label bookkeeping for backfilling and debug queries.
#[derive(Clone, Debug, Default)]
struct LabelInfo {
    defined: bool,
    pc: VmAddr,
    /// pcs of every instruction whose operand refers to this label.
    refs: SmallVec<[VmAddr; 4]>,
}

/// Container for storing VM instructions.
///
/// Lifecycle: emit through the builder methods, [`seal`](Self::seal)
/// once, then serve the interpreter through
/// [`get_inst`](Self::get_inst). Emission after sealing and fetching
/// before sealing are both illegal.
pub struct InstContainer {
    syms: SymbolPool,
    errors: Vec<EmitError>,
    /// Line number most recently logged by the front-end.
    cur_line: u32,
    global_env: HashSet<SymId>,
    local_env: HashSet<SymId>,
    in_function: bool,
    src_file: String,
    /// First pc emitted for each source line.
    line_to_pc: HashMap<u32, VmAddr>,
    /// Source line of each pc, ordered for predecessor queries.
    pc_to_line: BTreeMap<VmAddr, u32>,
    labels: HashMap<String, LabelInfo>,
    /// Most recently defined label; acts as a peephole barrier.
    last_label: Option<String>,
    /// Function-scoped instructions; becomes the final stream at seal.
    insts: Vec<Inst>,
    /// Globally-scoped instructions, appended after `$entry` at seal.
    global_insts: Vec<Inst>,
    sealed: bool,
    /// Planted breakpoints: pc to the original opcode byte.
    breakpoints: HashMap<VmAddr, u8>,
    /// In trap mode every fetch yields `Break`. Written by the
    /// interrupt handler, hence atomic.
    trap: Arc<AtomicBool>,
    counters: VecDeque<StepCounter>,
    watch_enabled: bool,
    watch_tick: bool,
}

impl InstContainer {
    pub fn new(src_file: impl Into<String>) -> Self {
        let mut cont = Self {
            syms: SymbolPool::new(),
            errors: Vec::new(),
            cur_line: 0,
            global_env: HashSet::new(),
            local_env: HashSet::new(),
            in_function: false,
            src_file: src_file.into(),
            line_to_pc: HashMap::new(),
            pc_to_line: BTreeMap::new(),
            labels: HashMap::new(),
            last_label: None,
            insts: Vec::new(),
            global_insts: Vec::new(),
            sealed: false,
            breakpoints: HashMap::new(),
            trap: Arc::new(AtomicBool::new(false)),
            counters: VecDeque::new(),
            watch_enabled: false,
            watch_tick: false,
        };
        cont.seed_entry_jump();
        cont
    }

    /// Reset all internal state, keeping the container reusable.
    pub fn reset(&mut self, src_file: impl Into<String>) {
        self.syms.reset();
        self.errors.clear();
        self.cur_line = 0;
        self.global_env.clear();
        self.local_env.clear();
        self.in_function = false;
        self.src_file = src_file.into();
        self.line_to_pc.clear();
        self.pc_to_line.clear();
        self.labels.clear();
        self.last_label = None;
        self.insts.clear();
        self.global_insts.clear();
        self.sealed = false;
        self.breakpoints.clear();
        self.trap.store(false, Ordering::Relaxed);
        self.counters.clear();
        self.watch_enabled = false;
        self.watch_tick = false;
        self.seed_entry_jump();
    }

    /// Instruction 0 is always a jump to the entry point, resolved at
    /// seal time.
    fn seed_entry_jump(&mut self) {
        self.in_function = true;
        self.log_label_ref(ENTRY_LABEL);
        self.push_inst(Opcode::Jmp, 0);
        self.in_function = false;
    }

    // ========================================================================
    // Emission internals
    // ========================================================================

    fn push_inst(&mut self, op: Opcode, operand: u32) {
        debug_assert!(!self.sealed, "emission after seal");
        let inst = Inst::new(op, operand);
        if self.in_function {
            self.insts.push(inst);
        } else {
            self.global_insts.push(inst);
        }
    }

    /// The last emitted instruction, unless a label definition sits at
    /// the current pc: labels are rewrite barriers, since a jump may
    /// land between the store and the reload.
    fn last_inst_mut(&mut self) -> Option<&mut Inst> {
        if self.in_function {
            if let Some(label) = &self.last_label {
                if let Some(info) = self.labels.get(label) {
                    if info.defined && info.pc as usize == self.insts.len() {
                        return None;
                    }
                }
            }
            self.insts.last_mut()
        } else {
            self.global_insts.last_mut()
        }
    }

    /// Define a new symbol in the current environment.
    fn def_symbol(&mut self, sym: &str) -> SymId {
        let id = self.syms.intern(sym);
        let clash = if self.in_function {
            self.global_env.contains(&id) || !self.local_env.insert(id)
        } else {
            !self.global_env.insert(id)
        };
        if clash {
            self.log_error_sym(EmitErrorKind::DuplicateSymbol, sym);
        }
        id
    }

    /// Resolve a symbol that must already be defined.
    fn get_symbol(&mut self, sym: &str) -> SymId {
        match self.syms.lookup(sym) {
            Some(id) if self.local_env.contains(&id) || self.global_env.contains(&id) => id,
            _ => {
                self.log_error_sym(EmitErrorKind::UndefinedSymbol, sym);
                0
            }
        }
    }

    /// Record the next pc as referring to `label`, for backfilling.
    fn log_label_ref(&mut self, label: &str) {
        if !self.in_function {
            self.log_error(EmitErrorKind::LabelInGlobalScope);
            return;
        }
        let pc = self.insts.len() as VmAddr;
        self.labels.entry(label.to_owned()).or_default().refs.push(pc);
    }

    // ========================================================================
    // Builder API, for front-ends
    // ========================================================================

    /// `Var sym`: declare a scalar variable.
    pub fn push_var(&mut self, sym: &str) {
        let id = self.def_symbol(sym);
        self.push_inst(Opcode::Var, id);
    }

    /// `Arr sym`: declare an array; its byte size is on the stack.
    pub fn push_arr(&mut self, sym: &str) {
        let id = self.def_symbol(sym);
        self.push_inst(Opcode::Arr, id);
    }

    /// Define `label` at the next pc.
    pub fn push_label(&mut self, name: &str) {
        let pc = self.insts.len() as VmAddr;
        let duplicate = {
            let info = self.labels.entry(name.to_owned()).or_default();
            if info.defined {
                true
            } else {
                info.defined = true;
                info.pc = pc;
                false
            }
        };
        if duplicate {
            self.log_error_sym(EmitErrorKind::DuplicateLabel, name);
        } else {
            self.last_label = Some(name.to_owned());
        }
    }

    /// `Ld`: load through the address on the stack.
    pub fn push_load(&mut self) {
        self.push_inst(Opcode::Ld, 0);
    }

    /// `LdVar sym`, fusing a preceding `StVar sym` into `StVarP sym`.
    pub fn push_load_var(&mut self, sym: &str) {
        let id = self.get_symbol(sym);
        // `StVarP` itself is never rewritten again: in `t0 = t0 + t0`
        // the second reload must stay a real load.
        if let Some(last) = self.last_inst_mut() {
            if last.opcode() == Some(Opcode::StVar) && last.operand() == id {
                last.set_opcode(Opcode::StVarP);
                return;
            }
        }
        self.push_inst(Opcode::LdVar, id);
    }

    /// Load an immediate, splitting values wider than the operand field
    /// into an `Imm` / `ImmHi` pair.
    pub fn push_load_imm(&mut self, imm: VmOpr) {
        if (IMM_MIN..=IMM_MAX).contains(&imm) {
            self.push_inst(Opcode::Imm, imm as u32 & OPERAND_MASK);
        } else {
            self.push_inst(Opcode::Imm, imm as u32 & OPERAND_MASK);
            self.push_inst(
                Opcode::ImmHi,
                (imm as u32 >> OPERAND_BITS) & ((1 << (32 - OPERAND_BITS)) - 1),
            );
        }
    }

    /// `LdReg n`, fusing a preceding `StReg n` into `StRegP n`.
    pub fn push_load_reg(&mut self, reg: RegId) {
        if let Some(last) = self.last_inst_mut() {
            if last.opcode() == Some(Opcode::StReg) && last.operand() == reg {
                last.set_opcode(Opcode::StRegP);
                return;
            }
        }
        self.push_inst(Opcode::LdReg, reg);
    }

    /// Load the word in frame slot `offset`.
    pub fn push_load_frame(&mut self, offset: VmOpr) {
        self.push_load_frame_addr(offset);
        self.push_load();
    }

    /// Load the address of frame slot `offset`.
    pub fn push_load_frame_addr(&mut self, offset: VmOpr) {
        self.push_load_imm(offset * 4);
        self.push_load_var(FRAME_SYMBOL);
        self.push_op(Opcode::Add);
    }

    /// `St`: store through the address on the stack.
    pub fn push_store(&mut self) {
        self.push_inst(Opcode::St, 0);
    }

    /// `StVar sym`.
    pub fn push_store_var(&mut self, sym: &str) {
        let id = self.get_symbol(sym);
        self.push_inst(Opcode::StVar, id);
    }

    /// `StReg n`.
    pub fn push_store_reg(&mut self, reg: RegId) {
        self.push_inst(Opcode::StReg, reg);
    }

    /// Store the stack top into frame slot `offset`.
    pub fn push_store_frame(&mut self, offset: VmOpr) {
        self.push_load_frame_addr(offset);
        self.push_store();
    }

    /// `Bnz label`.
    pub fn push_bnz(&mut self, label: &str) {
        self.log_label_ref(label);
        self.push_inst(Opcode::Bnz, 0);
    }

    /// `Jmp label`.
    pub fn push_jump(&mut self, label: &str) {
        self.log_label_ref(label);
        self.push_inst(Opcode::Jmp, 0);
    }

    /// `Call label`. Calls to labels never defined are reclassified as
    /// external calls at seal time.
    pub fn push_call(&mut self, label: &str) {
        self.log_label_ref(label);
        self.push_inst(Opcode::Call, 0);
    }

    /// Emit an operand-less instruction (ALU ops, `Ret`, `Clear`, ...).
    pub fn push_op(&mut self, op: Opcode) {
        self.push_inst(op, 0);
    }

    // ========================================================================
    // Metadata logging, for front-ends
    // ========================================================================

    /// Record an error at the current line.
    pub fn log_error(&mut self, kind: EmitErrorKind) {
        self.errors.push(EmitError {
            kind,
            line: self.cur_line,
            symbol: None,
        });
    }

    /// Record an error with symbol context at the current line.
    pub fn log_error_sym(&mut self, kind: EmitErrorKind, sym: &str) {
        self.log_error_sym_at(kind, sym, self.cur_line);
    }

    /// Record an error with symbol context at an explicit line.
    pub fn log_error_sym_at(&mut self, kind: EmitErrorKind, sym: &str, line: u32) {
        self.errors.push(EmitError {
            kind,
            line,
            symbol: Some(sym.to_owned()),
        });
    }

    /// Update the current source line. Call before emitting the
    /// instructions belonging to that line.
    pub fn log_line(&mut self, line: u32) {
        self.cur_line = line;
        // only function-scoped pcs carry debug lines
        if !self.in_function {
            return;
        }
        let pc = self.insts.len() as VmAddr;
        self.line_to_pc.entry(line).or_insert(pc);
        self.pc_to_line.insert(pc, line);
    }

    /// Enter a function environment, declaring `param_count` parameters
    /// named `p0, p1, ...`.
    pub fn enter_function(&mut self, param_count: u32) {
        if self.in_function {
            self.log_error(EmitErrorKind::NestedFunction);
            return;
        }
        self.in_function = true;
        for i in 0..param_count {
            self.def_symbol(&format!("p{i}"));
        }
    }

    /// Enter a function environment and allocate a `slot_count`-slot
    /// stack frame (register-IR mode).
    pub fn enter_function_with_frame(&mut self, param_count: u32, slot_count: u32) {
        self.enter_function(param_count);
        self.push_load_imm(slot_count as VmOpr * 4);
        self.push_arr(FRAME_SYMBOL);
    }

    /// Leave the current function environment.
    pub fn exit_function(&mut self) {
        self.local_env.clear();
        self.in_function = false;
    }

    // ========================================================================
    // Sealing
    // ========================================================================

    /// Resolve every label and freeze the container.
    ///
    /// Appends the entry epilogue (`Call f_main; Ret`), backfills every
    /// defined label into its referring instructions, and rewrites calls
    /// to never-defined labels into `CallExt` by symbol name. Any
    /// emission or sealing error makes this fail; the driver treats that
    /// as the compile-time boundary and exits.
    pub fn seal(&mut self) -> Result<(), Vec<EmitError>> {
        debug_assert!(!self.sealed, "container sealed twice");
        // define the entry point, then lay out the global instructions
        // and the synthetic main call behind it
        self.push_label(ENTRY_LABEL);
        let mut globals = std::mem::take(&mut self.global_insts);
        self.insts.append(&mut globals);
        self.in_function = true;
        self.push_call(MAIN_FUNC);
        self.push_op(Opcode::Ret);
        self.in_function = false;

        // label backfilling
        let mut resolved = std::mem::take(&mut self.labels);
        resolved.retain(|label, info| {
            if info.defined {
                for &pc in &info.refs {
                    self.insts[pc as usize].set_operand(info.pc);
                }
                info.refs.clear();
                return true;
            }
            // undefined label: calls bind at runtime, anything else is fatal
            for &pc in &info.refs {
                let inst = &mut self.insts[pc as usize];
                if inst.opcode() == Some(Opcode::Call) {
                    inst.set_opcode(Opcode::CallExt);
                    inst.set_operand(self.syms.intern(label));
                } else {
                    let line = self
                        .pc_to_line
                        .range(..=pc)
                        .next_back()
                        .map(|(_, &l)| l)
                        .unwrap_or(0);
                    self.errors.push(EmitError {
                        kind: EmitErrorKind::UndefinedLabel,
                        line,
                        symbol: Some(label.clone()),
                    });
                }
            }
            false
        });
        self.labels = resolved;

        if !self.errors.is_empty() {
            return Err(std::mem::take(&mut self.errors));
        }
        self.global_env.clear();
        self.local_env.clear();
        self.sealed = true;
        tracing::debug!(
            insts = self.insts.len(),
            labels = self.labels.len(),
            "container sealed"
        );
        Ok(())
    }

    // ========================================================================
    // Debug control, for debuggers
    // ========================================================================

    /// Plant or remove a breakpoint. Planting swaps the stored opcode
    /// for `Break` and records the original; removing restores it.
    pub fn toggle_breakpoint(&mut self, pc: VmAddr, enable: bool) {
        if enable {
            if self.breakpoints.contains_key(&pc) {
                return;
            }
            if let Some(inst) = self.insts.get_mut(pc as usize) {
                self.breakpoints.insert(pc, inst.opcode_byte());
                inst.set_opcode(Opcode::Break);
            }
        } else if let Some(orig) = self.breakpoints.remove(&pc) {
            self.insts[pc as usize].set_opcode_byte(orig);
        }
    }

    /// Whether a breakpoint is planted at `pc`.
    pub fn has_breakpoint(&self, pc: VmAddr) -> bool {
        self.breakpoints.contains_key(&pc)
    }

    /// Enable or disable trap mode. In trap mode every fetch yields a
    /// virtual `Break` without touching the stored instructions.
    pub fn set_trap_mode(&mut self, enable: bool) {
        self.trap.store(enable, Ordering::Relaxed);
    }

    pub fn trap_mode(&self) -> bool {
        self.trap.load(Ordering::Relaxed)
    }

    /// The trap-mode flag itself, for wiring to a signal handler. The
    /// handler must do nothing beyond storing `true` into it.
    pub fn trap_flag(&self) -> Arc<AtomicBool> {
        self.trap.clone()
    }

    /// Enqueue a plain step counter: break after `n` more fetches.
    pub fn add_step_counter(&mut self, n: u64) {
        self.counters.push_back(StepCounter {
            remaining: n,
            action: None,
        });
    }

    /// Enqueue a step counter that runs `action` after `n` fetches.
    pub fn add_step_action(&mut self, n: u64, action: StepAction) {
        self.counters.push_back(StepCounter {
            remaining: n,
            action: Some(action),
        });
    }

    /// Enable or disable watch ticking. Enabling enqueues the
    /// self-reinstalling watch counter; disabling lets it drain.
    pub fn set_watch_enabled(&mut self, enable: bool) {
        if enable && !self.watch_enabled {
            self.add_step_action(0, StepAction::Watch);
        }
        self.watch_enabled = enable;
    }

    /// Consume the watch-tick flag raised by a fired watch counter.
    pub fn take_watch_tick(&mut self) -> bool {
        std::mem::take(&mut self.watch_tick)
    }

    // ========================================================================
    // Instruction service, for VM instances
    // ========================================================================

    /// Fetch the instruction at `pc`.
    ///
    /// Composed, in order: the step-counter queue runs (counters at zero
    /// fire, the rest tick down), then trap mode or a fired break yields
    /// a virtual `Break`, and only then is the stored instruction
    /// returned. `None` means `pc` is outside the sealed stream.
    pub fn get_inst(&mut self, pc: VmAddr) -> Option<Inst> {
        debug_assert!(self.sealed, "fetch before seal");
        let mut break_now = false;
        for _ in 0..self.counters.len() {
            let mut counter = match self.counters.pop_front() {
                Some(c) => c,
                None => break,
            };
            if counter.remaining == 0 {
                match counter.action.take() {
                    None => break_now = true,
                    Some(action) => self.fire_action(action, pc, &mut break_now),
                }
            } else {
                counter.remaining -= 1;
                self.counters.push_back(counter);
            }
        }
        if self.trap_mode() || break_now {
            return Some(Inst::new(Opcode::Break, 0));
        }
        self.insts.get(pc as usize).copied()
    }

    /// Run one fired step action; it may stop the fetch or re-enqueue
    /// itself.
    fn fire_action(&mut self, action: StepAction, pc: VmAddr, break_now: &mut bool) {
        match action {
            StepAction::LineDiff { line } => {
                let cur = self.find_line(pc);
                if cur.is_some() && cur != line {
                    *break_now = true;
                } else {
                    self.add_step_action(0, StepAction::LineDiff { line });
                }
            }
            StepAction::NextLine { line, depth } => {
                if depth == 0 {
                    let cur = self.find_line(pc);
                    if cur.is_some() && cur != line {
                        *break_now = true;
                        return;
                    }
                }
                let depth = match self.real_opcode(pc) {
                    Some(Opcode::Call) => depth + 1,
                    Some(Opcode::Ret) => depth.saturating_sub(1),
                    _ => depth,
                };
                self.add_step_action(0, StepAction::NextLine { line, depth });
            }
            StepAction::NextInst { n, depth } => {
                if depth == 0 {
                    if n == 0 {
                        *break_now = true;
                        return;
                    }
                    let depth = match self.real_opcode(pc) {
                        Some(Opcode::Call) => 1,
                        _ => 0,
                    };
                    self.add_step_action(0, StepAction::NextInst { n: n - 1, depth });
                } else {
                    let depth = match self.real_opcode(pc) {
                        Some(Opcode::Call) => depth + 1,
                        Some(Opcode::Ret) => depth - 1,
                        _ => depth,
                    };
                    self.add_step_action(0, StepAction::NextInst { n, depth });
                }
            }
            StepAction::Rearm { pc } => {
                self.toggle_breakpoint(pc, true);
            }
            StepAction::Watch => {
                self.watch_tick = true;
                if self.watch_enabled {
                    self.add_step_action(0, StepAction::Watch);
                }
            }
        }
    }

    /// The opcode stored at `pc`, seen through planted breakpoints.
    pub fn real_opcode(&self, pc: VmAddr) -> Option<Opcode> {
        if let Some(&orig) = self.breakpoints.get(&pc) {
            return Opcode::from_byte(orig);
        }
        self.insts.get(pc as usize).and_then(|i| i.opcode())
    }

    /// The instruction at `pc` with any planted breakpoint undone.
    pub fn real_inst(&self, pc: VmAddr) -> Option<Inst> {
        let mut inst = *self.insts.get(pc as usize)?;
        if let Some(&orig) = self.breakpoints.get(&pc) {
            inst.set_opcode_byte(orig);
        }
        Some(inst)
    }

    // ========================================================================
    // Debug queries
    // ========================================================================

    /// The first pc emitted for `line`.
    pub fn find_pc_by_line(&self, line: u32) -> Option<VmAddr> {
        self.line_to_pc.get(&line).copied()
    }

    /// The pc of a defined label.
    pub fn find_pc_by_label(&self, label: &str) -> Option<VmAddr> {
        let info = self.labels.get(label)?;
        info.defined.then_some(info.pc)
    }

    /// The nearest source line at or before `pc`. Pcs in the synthetic
    /// entry region have no line.
    pub fn find_line(&self, pc: VmAddr) -> Option<u32> {
        if let Some(entry) = self.labels.get(ENTRY_LABEL) {
            if entry.defined && pc >= entry.pc {
                return None;
            }
        }
        self.pc_to_line.range(..=pc).next_back().map(|(_, &l)| l)
    }

    pub fn src_file(&self) -> &str {
        &self.src_file
    }

    pub fn inst_count(&self) -> usize {
        self.insts.len()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn syms(&self) -> &SymbolPool {
        &self.syms
    }

    pub fn syms_mut(&mut self) -> &mut SymbolPool {
        &mut self.syms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed_main(emit: impl FnOnce(&mut InstContainer)) -> InstContainer {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        emit(&mut cont);
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        cont.seal().expect("seal should succeed");
        cont
    }

    #[test]
    fn instruction_zero_jumps_to_entry() {
        let cont = sealed_main(|_| {});
        let jmp = cont.real_inst(0).unwrap();
        assert_eq!(jmp.opcode(), Some(Opcode::Jmp));
        assert_eq!(jmp.operand(), cont.find_pc_by_label(ENTRY_LABEL).unwrap());
    }

    #[test]
    fn seal_appends_main_call_and_ret() {
        let cont = sealed_main(|_| {});
        let entry = cont.find_pc_by_label(ENTRY_LABEL).unwrap() as usize;
        let call = cont.real_inst(entry as VmAddr).unwrap();
        assert_eq!(call.opcode(), Some(Opcode::Call));
        assert_eq!(call.operand(), cont.find_pc_by_label(MAIN_FUNC).unwrap());
        let ret = cont.real_inst(entry as VmAddr + 1).unwrap();
        assert_eq!(ret.opcode(), Some(Opcode::Ret));
    }

    #[test]
    fn forward_label_is_backfilled() {
        let cont = sealed_main(|c| {
            c.push_jump("fwd");
            c.push_load_imm(1);
            c.push_label("fwd");
        });
        let target = cont.find_pc_by_label("fwd").unwrap();
        let jmp_pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        let jmp = cont.real_inst(jmp_pc).unwrap();
        assert_eq!(jmp.opcode(), Some(Opcode::Jmp));
        assert_eq!(jmp.operand(), target);
    }

    #[test]
    fn undefined_call_becomes_call_ext() {
        let cont = sealed_main(|c| {
            c.push_call("f_putint");
        });
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        let inst = cont.real_inst(pc).unwrap();
        assert_eq!(inst.opcode(), Some(Opcode::CallExt));
        assert_eq!(cont.syms().name(inst.operand()), Some("f_putint"));
    }

    #[test]
    fn undefined_jump_fails_seal() {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.push_jump("nowhere");
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        let errors = cont.seal().unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == EmitErrorKind::UndefinedLabel && e.symbol.as_deref() == Some("nowhere")));
    }

    #[test]
    fn duplicate_label_is_reported() {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.push_label("l0");
        cont.push_label("l0");
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        let errors = cont.seal().unwrap_err();
        assert!(errors.iter().any(|e| e.kind == EmitErrorKind::DuplicateLabel));
    }

    #[test]
    fn duplicate_symbol_is_reported() {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.push_var("x");
        cont.push_var("x");
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        assert!(cont.seal().is_err());
    }

    #[test]
    fn undefined_symbol_is_reported() {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.push_load_var("ghost");
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        let errors = cont.seal().unwrap_err();
        assert!(errors.iter().any(|e| e.kind == EmitErrorKind::UndefinedSymbol));
    }

    #[test]
    fn nested_function_is_reported() {
        let mut cont = InstContainer::new("test.ir");
        cont.enter_function(0);
        cont.enter_function(0);
        cont.exit_function();
        assert!(cont.seal().is_err());
    }

    #[test]
    fn label_ref_in_global_scope_is_reported() {
        let mut cont = InstContainer::new("test.ir");
        cont.push_jump("l0");
        assert!(cont.seal().is_err());
    }

    #[test]
    fn peephole_fuses_store_then_load() {
        let cont = sealed_main(|c| {
            c.push_var("x");
            c.push_load_imm(1);
            c.push_store_var("x");
            c.push_load_var("x");
        });
        let start = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        let ops: Vec<_> = (start..cont.inst_count() as VmAddr)
            .map(|pc| cont.real_opcode(pc).unwrap())
            .collect();
        assert!(ops.contains(&Opcode::StVarP));
        assert!(!ops.contains(&Opcode::LdVar));
    }

    #[test]
    fn peephole_respects_label_barrier() {
        let cont = sealed_main(|c| {
            c.push_var("x");
            c.push_load_imm(1);
            c.push_store_var("x");
            c.push_label("after_store");
            c.push_load_var("x");
        });
        let start = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        let ops: Vec<_> = (start..cont.inst_count() as VmAddr)
            .map(|pc| cont.real_opcode(pc).unwrap())
            .collect();
        assert!(ops.contains(&Opcode::StVar));
        assert!(ops.contains(&Opcode::LdVar));
    }

    #[test]
    fn peephole_ignores_other_symbols() {
        let cont = sealed_main(|c| {
            c.push_var("x");
            c.push_var("y");
            c.push_load_imm(1);
            c.push_store_var("x");
            c.push_load_var("y");
        });
        let start = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        let ops: Vec<_> = (start..cont.inst_count() as VmAddr)
            .map(|pc| cont.real_opcode(pc).unwrap())
            .collect();
        assert!(ops.contains(&Opcode::StVar));
        assert!(ops.contains(&Opcode::LdVar));
    }

    #[test]
    fn register_peephole_fuses() {
        let cont = sealed_main(|c| {
            c.push_load_imm(1);
            c.push_store_reg(3);
            c.push_load_reg(3);
        });
        let start = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        let ops: Vec<_> = (start..cont.inst_count() as VmAddr)
            .map(|pc| cont.real_opcode(pc).unwrap())
            .collect();
        assert!(ops.contains(&Opcode::StRegP));
        assert!(!ops.contains(&Opcode::LdReg));
    }

    #[test]
    fn wide_immediates_split() {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        let before = cont.inst_count();
        cont.push_load_imm(3);
        assert_eq!(cont.inst_count(), before + 1);
        cont.push_load_imm(0x0102_0304);
        assert_eq!(cont.inst_count(), before + 3);
        cont.push_load_imm(IMM_MAX);
        assert_eq!(cont.inst_count(), before + 4);
        cont.push_load_imm(IMM_MAX + 1);
        assert_eq!(cont.inst_count(), before + 6);
        cont.push_load_imm(IMM_MIN);
        assert_eq!(cont.inst_count(), before + 7);
        cont.push_load_imm(IMM_MIN - 1);
        assert_eq!(cont.inst_count(), before + 9);
    }

    #[test]
    fn line_map_keeps_first_pc() {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.log_line(5);
        let first = cont.inst_count() as VmAddr;
        cont.push_load_imm(1);
        cont.log_line(5);
        cont.push_load_imm(2);
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        cont.seal().unwrap();
        assert_eq!(cont.find_pc_by_line(5), Some(first));
    }

    #[test]
    fn find_line_is_nearest_predecessor() {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.log_line(1);
        cont.push_load_imm(1);
        cont.log_line(2);
        cont.push_load_imm(2);
        cont.push_load_imm(3);
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        cont.seal().unwrap();
        let base = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        assert_eq!(cont.find_line(base), Some(1));
        assert_eq!(cont.find_line(base + 1), Some(2));
        assert_eq!(cont.find_line(base + 2), Some(2));
        // the synthetic entry region has no lines
        let entry = cont.find_pc_by_label(ENTRY_LABEL).unwrap();
        assert_eq!(cont.find_line(entry), None);
        assert_eq!(cont.find_line(entry + 1), None);
    }

    #[test]
    fn breakpoint_toggle_is_transparent() {
        let mut cont = sealed_main(|c| {
            c.push_load_imm(42);
        });
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        let original = cont.get_inst(pc).unwrap();
        cont.toggle_breakpoint(pc, true);
        assert_eq!(cont.get_inst(pc).unwrap().opcode(), Some(Opcode::Break));
        assert_eq!(cont.real_inst(pc).unwrap(), original);
        cont.toggle_breakpoint(pc, false);
        assert_eq!(cont.get_inst(pc).unwrap(), original);
    }

    #[test]
    fn trap_mode_yields_break_without_mutation() {
        let mut cont = sealed_main(|c| {
            c.push_load_imm(42);
        });
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        let original = cont.get_inst(pc).unwrap();
        cont.set_trap_mode(true);
        assert_eq!(cont.get_inst(pc).unwrap().opcode(), Some(Opcode::Break));
        cont.set_trap_mode(false);
        assert_eq!(cont.get_inst(pc).unwrap(), original);
    }

    #[test]
    fn plain_counter_breaks_after_n_fetches() {
        let mut cont = sealed_main(|c| {
            c.push_load_imm(1);
            c.push_load_imm(2);
            c.push_load_imm(3);
        });
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        cont.add_step_counter(2);
        assert_ne!(cont.get_inst(pc).unwrap().opcode(), Some(Opcode::Break));
        assert_ne!(cont.get_inst(pc + 1).unwrap().opcode(), Some(Opcode::Break));
        assert_eq!(cont.get_inst(pc + 2).unwrap().opcode(), Some(Opcode::Break));
        // consumed: the next fetch is clean
        assert_ne!(cont.get_inst(pc + 2).unwrap().opcode(), Some(Opcode::Break));
    }

    #[test]
    fn zero_counter_breaks_immediately() {
        let mut cont = sealed_main(|c| {
            c.push_load_imm(1);
        });
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        cont.add_step_counter(0);
        assert_eq!(cont.get_inst(pc).unwrap().opcode(), Some(Opcode::Break));
    }

    #[test]
    fn counters_fire_in_fifo_order_within_one_fetch() {
        let mut cont = sealed_main(|c| {
            c.push_load_imm(1);
        });
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        // a zero counter fires while a pending one only ticks down
        cont.add_step_counter(0);
        cont.add_step_counter(2);
        assert_eq!(cont.get_inst(pc).unwrap().opcode(), Some(Opcode::Break));
        assert_ne!(cont.get_inst(pc).unwrap().opcode(), Some(Opcode::Break));
        assert_eq!(cont.get_inst(pc).unwrap().opcode(), Some(Opcode::Break));
    }

    #[test]
    fn rearm_restores_breakpoint_after_one_fetch() {
        let mut cont = sealed_main(|c| {
            c.push_load_imm(1);
            c.push_load_imm(2);
        });
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        cont.toggle_breakpoint(pc, true);
        // the hit protocol: disarm, then re-arm after one fetch
        cont.toggle_breakpoint(pc, false);
        cont.add_step_action(1, StepAction::Rearm { pc });
        assert_eq!(cont.get_inst(pc).unwrap().opcode(), Some(Opcode::Imm));
        let _ = cont.get_inst(pc + 1);
        assert!(cont.has_breakpoint(pc));
        assert_eq!(cont.get_inst(pc).unwrap().opcode(), Some(Opcode::Break));
    }

    #[test]
    fn line_diff_action_stops_on_new_line() {
        let mut cont = InstContainer::new("test.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.log_line(1);
        cont.push_load_imm(1);
        cont.push_load_imm(2);
        cont.log_line(2);
        cont.push_load_imm(3);
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        cont.seal().unwrap();
        let base = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        cont.add_step_action(0, StepAction::LineDiff { line: Some(1) });
        assert_ne!(cont.get_inst(base).unwrap().opcode(), Some(Opcode::Break));
        assert_ne!(cont.get_inst(base + 1).unwrap().opcode(), Some(Opcode::Break));
        assert_eq!(cont.get_inst(base + 2).unwrap().opcode(), Some(Opcode::Break));
    }

    #[test]
    fn watch_counter_reinstalls_while_enabled() {
        let mut cont = sealed_main(|c| {
            c.push_load_imm(1);
        });
        let pc = cont.find_pc_by_label(MAIN_FUNC).unwrap();
        cont.set_watch_enabled(true);
        let _ = cont.get_inst(pc);
        assert!(cont.take_watch_tick());
        let _ = cont.get_inst(pc);
        assert!(cont.take_watch_tick());
        cont.set_watch_enabled(false);
        let _ = cont.get_inst(pc); // final firing drains the counter
        assert!(cont.take_watch_tick());
        let _ = cont.get_inst(pc);
        assert!(!cont.take_watch_tick());
    }

    #[test]
    fn fetch_past_end_is_none() {
        let mut cont = sealed_main(|_| {});
        assert_eq!(cont.get_inst(10_000), None);
    }
}
