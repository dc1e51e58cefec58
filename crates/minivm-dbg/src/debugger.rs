//! The debugger proper: breakpoint and watchpoint bookkeeping, the
//! stepping commands, and the breakpoint-hit protocol.
//!
//! All interposition happens through the container: breakpoints swap
//! opcodes, trap mode forces virtual `Break`s, and the stepping
//! commands enqueue step counters. The `$debugger` callback registered
//! at attach time owns the CLI loop.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use minivm_core::{reg_index, reg_name, VmAddr, VmOpr, DEBUGGER_FUNC};
use minivm_ir::StepAction;
use minivm_vm::Vm;

use crate::cli::{LineSource, ReadlineSource};
use crate::eval::{EvalContext, ExprEvaluator};
use crate::signal::{install_interrupt, SignalGuard};
use crate::source::SourceFile;

const PROMPT: &str = "minidbg> ";

/// One command's registration entry, for dispatch and `help`.
struct CmdInfo {
    name: &'static str,
    abbr: &'static str,
    args: &'static str,
    brief: &'static str,
    details: &'static str,
}

const COMMANDS: &[CmdInfo] = &[
    CmdInfo {
        name: "break",
        abbr: "b",
        args: "[POS]",
        brief: "set breakpoint at POS",
        details: "Set a breakpoint at specific address (PC), POS defaults to current PC.",
    },
    CmdInfo {
        name: "continue",
        abbr: "c",
        args: "",
        brief: "continue running",
        details: "Continue running current program.",
    },
    CmdInfo {
        name: "delete",
        abbr: "d",
        args: "[N]",
        brief: "delete breakpoint/watchpoint",
        details: "Delete breakpoint/watchpoint N, delete all breakpoints and watchpoints by default.",
    },
    CmdInfo {
        name: "disasm",
        abbr: "da",
        args: "[N POS]",
        brief: "disassemble memory",
        details: "Disassemble N instructions at POS, 10 near the current line by default.",
    },
    CmdInfo {
        name: "help",
        abbr: "",
        args: "[CMD]",
        brief: "show help message of CMD",
        details: "Show a list of all debugger commands, or give details about a specific command.",
    },
    CmdInfo {
        name: "info",
        abbr: "",
        args: "ITEM",
        brief: "show information of ITEM",
        details: "Show information of ITEM.\n\nITEM:\n  stack/s  --- operand stack\n  env/e    --- environment stack\n  reg/r    --- static registers\n  break/b  --- breakpoints\n  watch/w  --- watchpoints",
    },
    CmdInfo {
        name: "layout",
        abbr: "",
        args: "TYPE",
        brief: "set layout of automatic disassemble",
        details: "Set layout of automatic disassemble, TYPE can be 'src' or 'asm'.",
    },
    CmdInfo {
        name: "next",
        abbr: "n",
        args: "",
        brief: "stepping over calls (source level)",
        details: "Source level single step, stepping over calls.",
    },
    CmdInfo {
        name: "nexti",
        abbr: "ni",
        args: "[N]",
        brief: "stepping over calls (instruction level)",
        details: "Perform N instruction level single steps, stepping over calls. N defaults to 1.",
    },
    CmdInfo {
        name: "print",
        abbr: "p",
        args: "[EXPR]",
        brief: "show value of EXPR",
        details: "Show value of EXPR, or just show the last value.",
    },
    CmdInfo {
        name: "quit",
        abbr: "q",
        args: "",
        brief: "quit debugger",
        details: "Quit the debugger and terminate the program.",
    },
    CmdInfo {
        name: "step",
        abbr: "s",
        args: "",
        brief: "stepping into calls (source level)",
        details: "Source level single step, stepping into calls.",
    },
    CmdInfo {
        name: "stepi",
        abbr: "si",
        args: "[N]",
        brief: "stepping into calls (instruction level)",
        details: "Perform N instruction level single steps, stepping into calls. N defaults to 1.",
    },
    CmdInfo {
        name: "watch",
        abbr: "w",
        args: "EXPR",
        brief: "set watchpoint at EXPR",
        details: "Set a watchpoint for a specific expression, pause when EXPR changes.\nSetting watchpoints may cause the VM to run slowly.",
    },
    CmdInfo {
        name: "x",
        abbr: "",
        args: "N EXPR",
        brief: "examine memory at EXPR",
        details: "Examine N units of memory at address EXPR, 4 bytes per unit.",
    },
];

fn lookup_command(word: &str) -> Option<&'static CmdInfo> {
    COMMANDS
        .iter()
        .find(|c| c.name == word || (!c.abbr.is_empty() && c.abbr == word))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BreakInfo {
    pc: VmAddr,
    hit_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct WatchInfo {
    record_id: u32,
    last_value: VmOpr,
    hit_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Source,
    Asm,
}

/// Expression-evaluation view of a VM: symbols resolve against the
/// environments, `$name` against the registers (`$pc` is synthetic),
/// and dereferences against the memory pool.
struct VmEvalContext<'a> {
    vm: &'a Vm,
}

impl EvalContext for VmEvalContext<'_> {
    fn value_of_sym(&self, sym: &str) -> Option<VmOpr> {
        if let Some(reg) = sym.strip_prefix('$') {
            if reg == "pc" {
                return Some(self.vm.pc() as VmOpr);
            }
            return self.vm.reg(reg_index(reg)?);
        }
        let id = self.vm.syms().lookup(sym)?;
        self.vm.var(id)
    }

    fn value_of_addr(&self, addr: VmOpr) -> Option<VmOpr> {
        self.vm.load_word(addr as u32)
    }
}

struct DebuggerState {
    eval: ExprEvaluator,
    input: Box<dyn LineSource>,
    next_id: u32,
    breaks: BTreeMap<u32, BreakInfo>,
    pc_to_break: HashMap<VmAddr, u32>,
    watches: BTreeMap<u32, WatchInfo>,
    layout: Layout,
    source: Option<SourceFile>,
    /// pcs at which the CLI was entered, oldest first.
    stops: Vec<VmAddr>,
    quit: bool,
}

/// The interactive debugger. Attach before `run`; keep it alive for
/// the run's duration (dropping it unhooks the interrupt handler).
pub struct Debugger {
    state: Rc<RefCell<DebuggerState>>,
    _signal: Option<SignalGuard>,
}

impl Debugger {
    /// Attach with interactive line editing.
    pub fn attach(vm: &mut Vm) -> Self {
        Self::attach_with_source(vm, Box::new(ReadlineSource::new()))
    }

    /// Attach with a custom command source (scripted in tests).
    ///
    /// Registers the `$debugger` external and the watch hook, wires
    /// SIGINT to trap mode, and enables trap mode so the first fetch
    /// lands in the CLI.
    pub fn attach_with_source(vm: &mut Vm, input: Box<dyn LineSource>) -> Self {
        let state = Rc::new(RefCell::new(DebuggerState {
            eval: ExprEvaluator::new(),
            input,
            next_id: 0,
            breaks: BTreeMap::new(),
            pc_to_break: HashMap::new(),
            watches: BTreeMap::new(),
            layout: Layout::Source,
            source: SourceFile::load(vm.container().src_file()),
            stops: Vec::new(),
            quit: false,
        }));
        let callback_state = state.clone();
        vm.register_function(DEBUGGER_FUNC, move |vm| {
            debugger_callback(&callback_state, vm)
        });
        let watch_state = state.clone();
        vm.set_watch_hook(move |vm| watch_tick(&watch_state, vm));
        let signal = install_interrupt(vm.container().trap_flag());
        vm.container_mut().set_trap_mode(true);
        Debugger {
            state,
            _signal: signal,
        }
    }

    /// Execute one command line; true means it would leave the CLI.
    pub fn handle_command(&self, vm: &mut Vm, line: &str) -> bool {
        self.state.borrow_mut().handle_line(vm, line)
    }

    /// Snapshot of breakpoints as `(id, pc, hit_count)`.
    pub fn breakpoints(&self) -> Vec<(u32, VmAddr, u32)> {
        self.state
            .borrow()
            .breaks
            .iter()
            .map(|(&id, info)| (id, info.pc, info.hit_count))
            .collect()
    }

    /// Snapshot of watchpoints as `(id, expression, value, hit_count)`.
    pub fn watchpoints(&self) -> Vec<(u32, String, VmOpr, u32)> {
        let state = self.state.borrow();
        state
            .watches
            .iter()
            .map(|(&id, info)| {
                let expr = state
                    .eval
                    .record_text(info.record_id)
                    .unwrap_or("?")
                    .to_owned();
                (id, expr, info.last_value, info.hit_count)
            })
            .collect()
    }

    /// pcs at which the CLI has been entered, oldest first.
    pub fn stop_pcs(&self) -> Vec<VmAddr> {
        self.state.borrow().stops.clone()
    }
}

/// The `$debugger` external: the breakpoint-hit protocol.
fn debugger_callback(state: &Rc<RefCell<DebuggerState>>, vm: &mut Vm) -> bool {
    let mut st = state.borrow_mut();
    let pc = vm.pc();
    // outside the source region: skip ahead with one source step
    if vm.container().find_line(pc).is_none() {
        vm.container_mut()
            .add_step_action(0, StepAction::LineDiff { line: None });
        vm.container_mut().set_trap_mode(false);
        return true;
    }
    st.stops.push(pc);
    if let Some(&id) = st.pc_to_break.get(&pc) {
        if let Some(info) = st.breaks.get_mut(&id) {
            info.hit_count += 1;
        }
        println!("Breakpoint {id} hit at pc {pc}");
        // let the original instruction run once, then re-arm
        vm.container_mut().toggle_breakpoint(pc, false);
        vm.container_mut().add_step_action(1, StepAction::Rearm { pc });
    }
    st.show_stop(vm);
    let quit = st.run_cli(vm);
    vm.container_mut().set_trap_mode(false);
    !quit
}

/// The watch hook: re-evaluate every watchpoint; any change arms trap
/// mode so the current fetch breaks.
fn watch_tick(state: &Rc<RefCell<DebuggerState>>, vm: &mut Vm) {
    let mut st = state.borrow_mut();
    let DebuggerState { eval, watches, .. } = &mut *st;
    let mut changed = false;
    {
        let ctx = VmEvalContext { vm: &*vm };
        for (id, info) in watches.iter_mut() {
            let Some(value) = eval.eval_record(info.record_id, &ctx) else {
                continue;
            };
            if value != info.last_value {
                let expr = eval.record_text(info.record_id).unwrap_or("?");
                println!("Watchpoint {id}: {expr}");
                println!("  old value = {}", info.last_value);
                println!("  new value = {value}");
                info.last_value = value;
                info.hit_count += 1;
                changed = true;
            }
        }
    }
    if changed {
        vm.container_mut().set_trap_mode(true);
    }
}

impl DebuggerState {
    fn run_cli(&mut self, vm: &mut Vm) -> bool {
        loop {
            let Some(line) = self.input.read_line(PROMPT) else {
                println!("quit");
                self.quit = true;
                return true;
            };
            if self.handle_line(vm, &line) {
                return self.quit;
            }
        }
    }

    /// Dispatch one command line; true leaves the CLI.
    fn handle_line(&mut self, vm: &mut Vm, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let Some(cmd) = lookup_command(word) else {
            println!("unknown command, run 'help' to see command list");
            return false;
        };
        match cmd.name {
            "help" => {
                self.cmd_help(rest);
                false
            }
            "quit" => {
                self.quit = true;
                true
            }
            "break" => {
                self.cmd_break(vm, rest);
                false
            }
            "watch" => {
                self.cmd_watch(vm, rest);
                false
            }
            "delete" => {
                self.cmd_delete(vm, rest);
                false
            }
            "continue" => true,
            "next" => {
                let pc = vm.pc();
                let line = vm.container().find_line(pc);
                vm.container_mut()
                    .add_step_action(0, StepAction::NextLine { line, depth: 0 });
                true
            }
            "step" => {
                let pc = vm.pc();
                let line = vm.container().find_line(pc);
                vm.container_mut()
                    .add_step_action(0, StepAction::LineDiff { line });
                true
            }
            "nexti" => match parse_count(rest) {
                Some(n) => {
                    vm.container_mut()
                        .add_step_action(0, StepAction::NextInst { n, depth: 0 });
                    true
                }
                None => {
                    log_error("invalid step count");
                    false
                }
            },
            "stepi" => match parse_count(rest) {
                Some(n) => {
                    vm.container_mut().add_step_counter(n);
                    true
                }
                None => {
                    log_error("invalid step count");
                    false
                }
            },
            "print" => {
                self.cmd_print(vm, rest);
                false
            }
            "x" => {
                self.cmd_examine(vm, rest);
                false
            }
            "info" => {
                self.cmd_info(vm, rest);
                false
            }
            "layout" => {
                self.cmd_layout(rest);
                false
            }
            "disasm" => {
                self.cmd_disasm(vm, rest);
                false
            }
            _ => false,
        }
    }

    fn cmd_help(&self, rest: &str) {
        if rest.is_empty() {
            println!("Debugger commands:");
            let cmd_len = COMMANDS
                .iter()
                .map(|c| c.name.len() + c.abbr.len() + 1)
                .max()
                .unwrap_or(0);
            let args_len = COMMANDS.iter().map(|c| c.args.len()).max().unwrap_or(0);
            for cmd in COMMANDS {
                let name = if cmd.abbr.is_empty() {
                    cmd.name.to_owned()
                } else {
                    format!("{}/{}", cmd.name, cmd.abbr)
                };
                println!(
                    "  {name:<cmd_len$}  {args:<args_len$}  --- {brief}",
                    args = cmd.args,
                    brief = cmd.brief,
                );
            }
        } else {
            let Some(cmd) = lookup_command(rest) else {
                println!("unknown command, run 'help' to see command list");
                return;
            };
            let name = if cmd.abbr.is_empty() {
                cmd.name.to_owned()
            } else {
                format!("{}/{}", cmd.name, cmd.abbr)
            };
            println!("Syntax: {name} {}", cmd.args);
            println!("  {}", cmd.details);
        }
    }

    /// Parse a `POS`: `:LINE`, a decimal pc, or a label name.
    fn read_position(&self, vm: &Vm, pos: &str) -> Option<VmAddr> {
        if let Some(line) = pos.strip_prefix(':') {
            let Ok(line) = line.parse::<u32>() else {
                log_error("invalid line number");
                return None;
            };
            let addr = vm.container().find_pc_by_line(line);
            if addr.is_none() {
                log_error("line number out of range");
            }
            addr
        } else if pos.starts_with(|c: char| c.is_ascii_digit()) {
            match pos.parse::<VmAddr>() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    log_error("invalid PC address");
                    None
                }
            }
        } else {
            let addr = vm.container().find_pc_by_label(pos);
            if addr.is_none() {
                log_error("function/label not found");
            }
            addr
        }
    }

    fn cmd_break(&mut self, vm: &mut Vm, rest: &str) {
        let pc = if rest.is_empty() {
            vm.pc()
        } else {
            match self.read_position(vm, rest) {
                Some(pc) => pc,
                None => return,
            }
        };
        if pc as usize >= vm.container().inst_count() {
            log_error("invalid PC address");
            return;
        }
        if self.pc_to_break.contains_key(&pc) {
            log_error("there is already a breakpoint at the specific POS");
            return;
        }
        vm.container_mut().toggle_breakpoint(pc, true);
        let id = self.next_id;
        self.next_id += 1;
        self.breaks.insert(id, BreakInfo { pc, hit_count: 0 });
        self.pc_to_break.insert(pc, id);
        println!("Breakpoint {id} at pc {pc}");
    }

    fn cmd_watch(&mut self, vm: &mut Vm, rest: &str) {
        if rest.is_empty() {
            log_error("invalid 'EXPR'");
            return;
        }
        let record_id = self.eval.next_id();
        let value = {
            let ctx = VmEvalContext { vm: &*vm };
            self.eval.eval(rest, &ctx)
        };
        let Some(value) = value else {
            log_error("invalid 'EXPR'");
            return;
        };
        let id = self.next_id;
        self.next_id += 1;
        self.watches.insert(
            id,
            WatchInfo {
                record_id,
                last_value: value,
                hit_count: 0,
            },
        );
        vm.container_mut().set_watch_enabled(true);
        println!("Watchpoint {id}: {rest}");
    }

    fn cmd_delete(&mut self, vm: &mut Vm, rest: &str) {
        if rest.is_empty() {
            let answer = self
                .input
                .read_line("are you sure to delete all breakpoints & watchpoints? [y/n] ");
            if !matches!(answer.as_deref().map(str::trim), Some("y") | Some("Y")) {
                return;
            }
            let break_ids: Vec<_> = self.breaks.keys().copied().collect();
            for id in break_ids {
                self.delete_break(vm, id);
            }
            let watch_ids: Vec<_> = self.watches.keys().copied().collect();
            for id in watch_ids {
                self.delete_watch(vm, id);
            }
            return;
        }
        let Ok(id) = rest.parse::<u32>() else {
            log_error("invalid breakpoint/watchpoint id");
            return;
        };
        if !self.delete_break(vm, id) && !self.delete_watch(vm, id) {
            log_error("breakpoint/watchpoint not found");
        }
    }

    fn delete_break(&mut self, vm: &mut Vm, id: u32) -> bool {
        let Some(info) = self.breaks.remove(&id) else {
            return false;
        };
        vm.container_mut().toggle_breakpoint(info.pc, false);
        self.pc_to_break.remove(&info.pc);
        true
    }

    fn delete_watch(&mut self, vm: &mut Vm, id: u32) -> bool {
        let Some(info) = self.watches.remove(&id) else {
            return false;
        };
        self.eval.remove_record(info.record_id);
        if self.watches.is_empty() {
            vm.container_mut().set_watch_enabled(false);
        }
        true
    }

    fn cmd_print(&mut self, vm: &Vm, rest: &str) {
        let ctx = VmEvalContext { vm };
        if rest.is_empty() {
            // re-show the most recent record that still evaluates
            let mut id = self.eval.next_id();
            loop {
                if id == 0 {
                    log_error("there is no last value available");
                    return;
                }
                id -= 1;
                if let Some(value) = self.eval.eval_record(id, &ctx) {
                    println!("${id} = {value}");
                    return;
                }
            }
        }
        let id = self.eval.next_id();
        match self.eval.eval(rest, &ctx) {
            Some(value) => println!("${id} = {value}"),
            None => log_error("invalid 'EXPR'"),
        }
    }

    fn cmd_examine(&mut self, vm: &Vm, rest: &str) {
        let Some((count, expr)) = rest.split_once(char::is_whitespace) else {
            log_error("expected 'N EXPR'");
            return;
        };
        let Ok(count) = count.parse::<u32>() else {
            log_error("invalid unit count");
            return;
        };
        let addr = {
            let ctx = VmEvalContext { vm };
            self.eval.eval(expr.trim(), &ctx)
        };
        let Some(addr) = addr else {
            log_error("invalid 'EXPR'");
            return;
        };
        for i in 0..count {
            let addr = addr as u32 + 4 * i;
            match vm.load_word(addr) {
                Some(value) => println!("{addr:#010x}: {value}"),
                None => {
                    log_error("invalid memory pool address");
                    return;
                }
            }
        }
    }

    fn cmd_info(&self, vm: &Vm, rest: &str) {
        match rest {
            "stack" | "s" => {
                let oprs = vm.oprs();
                if oprs.is_empty() {
                    println!("operand stack is empty");
                    return;
                }
                for (i, value) in oprs.iter().rev().enumerate() {
                    println!("oprs[{}]: {value}", oprs.len() - 1 - i);
                }
            }
            "env" | "e" => {
                let frames = vm.frames();
                for (i, frame) in frames.iter().enumerate().rev() {
                    let kind = if i == 0 { "global" } else { "local" };
                    println!("env #{i} ({kind}), return pc {}:", frame.ret_pc);
                    let mut vars: Vec<_> = frame
                        .env
                        .iter()
                        .map(|(&id, &value)| (vm.syms().name(id).unwrap_or("?"), value))
                        .collect();
                    vars.sort();
                    for (name, value) in vars {
                        println!("  {name} = {value}");
                    }
                }
            }
            "reg" | "r" => {
                if vm.regs().is_empty() {
                    println!("static registers are disabled");
                    return;
                }
                println!("pc = {}", vm.pc());
                for (i, value) in vm.regs().iter().enumerate() {
                    let name = reg_name(i as u32).unwrap_or("?");
                    print!("{name:>4} = {value:<12}");
                    if i % 4 == 3 {
                        println!();
                    }
                }
                if vm.regs().len() % 4 != 0 {
                    println!();
                }
            }
            "break" | "b" => {
                if self.breaks.is_empty() {
                    println!("no breakpoints");
                    return;
                }
                for (id, info) in &self.breaks {
                    let line = vm
                        .container()
                        .find_line(info.pc)
                        .map(|l| format!(", line {l}"))
                        .unwrap_or_default();
                    println!(
                        "breakpoint {id}: pc {}{line}, hit_count = {}",
                        info.pc, info.hit_count
                    );
                }
            }
            "watch" | "w" => {
                if self.watches.is_empty() {
                    println!("no watchpoints");
                    return;
                }
                for (id, info) in &self.watches {
                    let expr = self.eval.record_text(info.record_id).unwrap_or("?");
                    println!(
                        "watchpoint {id}: {expr}, value = {}, hit_count = {}",
                        info.last_value, info.hit_count
                    );
                }
            }
            _ => log_error("unknown ITEM, run 'help info' for details"),
        }
    }

    fn cmd_layout(&mut self, rest: &str) {
        match rest {
            "src" => self.layout = Layout::Source,
            "asm" => self.layout = Layout::Asm,
            _ => log_error("TYPE must be 'src' or 'asm'"),
        }
    }

    fn cmd_disasm(&mut self, vm: &Vm, rest: &str) {
        let (count, start) = if rest.is_empty() {
            // ten instructions near the current line
            let start = vm
                .container()
                .find_line(vm.pc())
                .and_then(|line| vm.container().find_pc_by_line(line))
                .unwrap_or(vm.pc());
            (10, start)
        } else {
            let Some((count, pos)) = rest.split_once(char::is_whitespace) else {
                log_error("expected 'N POS'");
                return;
            };
            let Ok(count) = count.parse::<u32>() else {
                log_error("invalid unit count");
                return;
            };
            match self.read_position(vm, pos.trim()) {
                Some(start) => (count, start),
                None => return,
            }
        };
        self.disasm_window(vm, start, count);
    }

    fn disasm_window(&self, vm: &Vm, start: VmAddr, count: u32) {
        let end = (start + count).min(vm.container().inst_count() as VmAddr);
        for pc in start..end {
            let marker = if pc == vm.pc() { "=> " } else { "   " };
            match vm.container().dump_string(pc) {
                Some(text) => println!("{marker}{pc}:\t{text}"),
                None => break,
            }
        }
    }

    /// Print the stop location in the preferred layout.
    fn show_stop(&self, vm: &Vm) {
        let pc = vm.pc();
        if self.layout == Layout::Source {
            if let (Some(line), Some(source)) = (vm.container().find_line(pc), &self.source) {
                println!("at line {line}, pc {pc}:");
                print!("{}", source.window(line, 2));
                return;
            }
        }
        self.disasm_window(vm, pc.saturating_sub(2), 5);
    }
}

fn parse_count(rest: &str) -> Option<u64> {
    if rest.is_empty() {
        return Some(1);
    }
    rest.parse::<u64>().ok()
}

fn log_error(msg: &str) {
    println!("ERROR (debugger): {msg}");
}

#[cfg(test)]
mod tests {
    use minivm_core::{Opcode, MAIN_FUNC};
    use minivm_ir::InstContainer;

    use super::*;
    use crate::cli::ScriptedSource;

    fn vm_with_lines() -> Vm {
        let mut cont = InstContainer::new("no-such-file.ir");
        cont.push_label(MAIN_FUNC);
        cont.enter_function(0);
        cont.log_line(1);
        cont.push_var("x");
        cont.log_line(2);
        cont.push_load_imm(1);
        cont.push_store_var("x");
        cont.log_line(3);
        cont.push_load_imm(2);
        cont.push_store_var("x");
        cont.log_line(4);
        cont.push_load_var("x");
        cont.push_op(Opcode::Ret);
        cont.exit_function();
        cont.seal().unwrap();
        let mut vm = Vm::new(cont);
        vm.reset();
        vm
    }

    #[test]
    fn command_lookup_accepts_abbreviations() {
        assert_eq!(lookup_command("break").map(|c| c.name), Some("break"));
        assert_eq!(lookup_command("b").map(|c| c.name), Some("break"));
        assert_eq!(lookup_command("si").map(|c| c.name), Some("stepi"));
        assert!(lookup_command("bogus").is_none());
    }

    #[test]
    fn break_command_plants_and_deletes() {
        let mut vm = vm_with_lines();
        let dbg = Debugger::attach_with_source(&mut vm, Box::new(ScriptedSource::new(Vec::<String>::new())));
        let pc = vm.container().find_pc_by_label(MAIN_FUNC).unwrap();
        assert!(!dbg.handle_command(&mut vm, &format!("break {pc}")));
        assert!(vm.container().has_breakpoint(pc));
        assert_eq!(dbg.breakpoints(), vec![(0, pc, 0)]);
        // a second one at the same pc is rejected
        assert!(!dbg.handle_command(&mut vm, &format!("b {pc}")));
        assert_eq!(dbg.breakpoints().len(), 1);
        assert!(!dbg.handle_command(&mut vm, "delete 0"));
        assert!(!vm.container().has_breakpoint(pc));
        assert!(dbg.breakpoints().is_empty());
    }

    #[test]
    fn break_accepts_line_and_label_positions() {
        let mut vm = vm_with_lines();
        let dbg = Debugger::attach_with_source(&mut vm, Box::new(ScriptedSource::new(Vec::<String>::new())));
        assert!(!dbg.handle_command(&mut vm, "break :3"));
        let line_pc = vm.container().find_pc_by_line(3).unwrap();
        assert!(vm.container().has_breakpoint(line_pc));
        assert!(!dbg.handle_command(&mut vm, "break f_main"));
        let main_pc = vm.container().find_pc_by_label(MAIN_FUNC).unwrap();
        assert!(vm.container().has_breakpoint(main_pc));
    }

    #[test]
    fn step_commands_leave_the_cli() {
        let mut vm = vm_with_lines();
        let dbg = Debugger::attach_with_source(&mut vm, Box::new(ScriptedSource::new(Vec::<String>::new())));
        assert!(dbg.handle_command(&mut vm, "continue"));
        assert!(dbg.handle_command(&mut vm, "step"));
        assert!(dbg.handle_command(&mut vm, "next"));
        assert!(dbg.handle_command(&mut vm, "stepi 3"));
        assert!(dbg.handle_command(&mut vm, "nexti"));
        assert!(!dbg.handle_command(&mut vm, "info stack"));
        assert!(!dbg.handle_command(&mut vm, "help"));
        assert!(!dbg.handle_command(&mut vm, "not-a-command"));
    }

    #[test]
    fn watch_records_and_deletes() {
        let mut vm = vm_with_lines();
        let dbg = Debugger::attach_with_source(&mut vm, Box::new(ScriptedSource::new(Vec::<String>::new())));
        assert!(!dbg.handle_command(&mut vm, "watch 1 + 2"));
        let watches = dbg.watchpoints();
        assert_eq!(watches, vec![(0, "1 + 2".to_owned(), 3, 0)]);
        assert!(!dbg.handle_command(&mut vm, "delete 0"));
        assert!(dbg.watchpoints().is_empty());
    }
}
