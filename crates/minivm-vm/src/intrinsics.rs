//! The built-in external-function library.
//!
//! Console and array I/O plus the timing pair used by benchmark
//! programs. The two IR modes differ only in their calling convention:
//! the high-level IR reads `p0…` bindings and pushes results on the
//! operand stack, the register IR reads `a0…` and writes `a0`,
//! clobbering the caller-saved registers on the way out.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::{Duration, Instant};

use minivm_core::{MemId, VmOpr, ARG_REG_BASE, CALLER_SAVED_REGS, RET_REG};

use crate::machine::Vm;

/// Value written into caller-saved registers by library calls.
const CLOBBER: VmOpr = 0xdead_c0de_u32 as VmOpr;

/// Register the standard library on a VM instance.
pub fn register_stdlib(vm: &mut Vm, register_mode: bool) {
    let scanner = Rc::new(RefCell::new(Scanner::default()));
    let timers = Rc::new(RefCell::new(Timers::default()));

    let s = scanner.clone();
    vm.register_function("f_getint", move |vm| {
        if register_mode {
            reset_caller_saved(vm);
        }
        let value = s.borrow_mut().read_int().unwrap_or(0);
        give_result(vm, value, register_mode);
        true
    });

    let s = scanner.clone();
    vm.register_function("f_getch", move |vm| {
        if register_mode {
            reset_caller_saved(vm);
        }
        let value = s.borrow_mut().read_char();
        give_result(vm, value, register_mode);
        true
    });

    let s = scanner.clone();
    vm.register_function("f_getarray", move |vm| {
        let Some(arr) = param(vm, 0, register_mode) else {
            return false;
        };
        if register_mode {
            reset_caller_saved(vm);
        }
        let Some(len) = s.borrow_mut().read_int() else {
            return false;
        };
        for i in 0..len.max(0) {
            let value = s.borrow_mut().read_int().unwrap_or(0);
            if !vm.mem_mut().store_word(arr as MemId + 4 * i as MemId, value) {
                return false;
            }
        }
        give_result(vm, len, register_mode);
        true
    });

    vm.register_function("f_putint", move |vm| {
        let Some(value) = param(vm, 0, register_mode) else {
            return false;
        };
        if register_mode {
            reset_caller_saved(vm);
        }
        print!("{value}");
        io::stdout().flush().is_ok()
    });

    vm.register_function("f_putch", move |vm| {
        let Some(value) = param(vm, 0, register_mode) else {
            return false;
        };
        if register_mode {
            reset_caller_saved(vm);
        }
        print!("{}", (value as u8) as char);
        io::stdout().flush().is_ok()
    });

    vm.register_function("f_putarray", move |vm| {
        let (Some(len), Some(arr)) = (param(vm, 0, register_mode), param(vm, 1, register_mode))
        else {
            return false;
        };
        if register_mode {
            reset_caller_saved(vm);
        }
        print!("{len}:");
        for i in 0..len.max(0) {
            let Some(value) = vm.load_word(arr as MemId + 4 * i as MemId) else {
                return false;
            };
            print!(" {value}");
        }
        println!();
        io::stdout().flush().is_ok()
    });

    let t = timers.clone();
    vm.register_function("f__sysy_starttime", move |vm| {
        let Some(line) = param(vm, 0, register_mode) else {
            return false;
        };
        if register_mode {
            reset_caller_saved(vm);
        }
        t.borrow_mut().start(line);
        true
    });

    let t = timers;
    vm.register_function("f__sysy_stoptime", move |vm| {
        let Some(line) = param(vm, 0, register_mode) else {
            return false;
        };
        if register_mode {
            reset_caller_saved(vm);
        }
        t.borrow_mut().stop(line);
        true
    });
}

fn param(vm: &Vm, i: usize, register_mode: bool) -> Option<VmOpr> {
    if register_mode {
        vm.reg(ARG_REG_BASE + i as u32)
    } else {
        vm.param(i)
    }
}

fn give_result(vm: &mut Vm, value: VmOpr, register_mode: bool) {
    if register_mode {
        vm.set_reg(RET_REG, value);
    } else {
        vm.push_opr(value);
    }
}

fn reset_caller_saved(vm: &mut Vm) {
    for reg in CALLER_SAVED_REGS {
        vm.set_reg(reg, CLOBBER);
    }
}

/// Byte-wise stdin reader with one byte of pushback, so integer
/// scanning stops at the first non-digit without consuming it.
#[derive(Default)]
struct Scanner {
    peeked: Option<u8>,
}

impl Scanner {
    fn next_byte(&mut self) -> Option<u8> {
        if let Some(byte) = self.peeked.take() {
            return Some(byte);
        }
        let mut buf = [0u8; 1];
        match io::stdin().lock().read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    /// Read a whitespace-delimited signed integer.
    fn read_int(&mut self) -> Option<VmOpr> {
        let mut byte = self.next_byte()?;
        while byte.is_ascii_whitespace() {
            byte = self.next_byte()?;
        }
        let mut negative = false;
        if byte == b'-' || byte == b'+' {
            negative = byte == b'-';
            byte = self.next_byte()?;
        }
        if !byte.is_ascii_digit() {
            self.peeked = Some(byte);
            return None;
        }
        let mut value: i64 = 0;
        loop {
            value = value.wrapping_mul(10).wrapping_add((byte - b'0') as i64);
            match self.next_byte() {
                Some(next) if next.is_ascii_digit() => byte = next,
                Some(next) => {
                    self.peeked = Some(next);
                    break;
                }
                None => break,
            }
        }
        if negative {
            value = -value;
        }
        Some(value as VmOpr)
    }

    /// Read one raw byte; -1 at end of input.
    fn read_char(&mut self) -> VmOpr {
        self.next_byte().map(|b| b as VmOpr).unwrap_or(-1)
    }
}

/// Interval timers driven by the `starttime`/`stoptime` pair. Reports
/// go to stderr; the grand total prints when the VM (and with it this
/// state) is dropped, if any timer ever ran.
#[derive(Default)]
struct Timers {
    timer_id: u32,
    last_line: VmOpr,
    started: Option<Instant>,
    total: Duration,
}

impl Timers {
    fn start(&mut self, line: VmOpr) {
        self.last_line = line;
        self.started = Some(Instant::now());
    }

    fn stop(&mut self, line: VmOpr) {
        let elapsed = self
            .started
            .take()
            .map(|start| start.elapsed())
            .unwrap_or_default();
        self.total += elapsed;
        eprintln!(
            "Timer#{:03}@{:04}-{:04}: {}",
            self.timer_id,
            self.last_line,
            line,
            format_elapsed(elapsed)
        );
        self.timer_id += 1;
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        if self.timer_id > 0 {
            eprintln!("TOTAL: {}", format_elapsed(self.total));
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    const SECOND: u128 = 1_000_000;
    const MINUTE: u128 = 60 * SECOND;
    const HOUR: u128 = 60 * MINUTE;
    let mut us = elapsed.as_micros();
    let hours = us / HOUR;
    us %= HOUR;
    let minutes = us / MINUTE;
    us %= MINUTE;
    format!("{hours}H-{minutes}M-{}S-{}us", us / SECOND, us % SECOND)
}
