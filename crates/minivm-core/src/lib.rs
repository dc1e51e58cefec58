//! Core types shared by every MiniVM crate.
//!
//! This crate holds the pieces with no dependencies of their own: the
//! symbol pool (identifier interning), the packed instruction word and
//! its opcode enumeration, and the static-register name table used by
//! the register-IR mode.

mod inst;
mod reg;
mod symbol;

pub use inst::{Inst, Opcode, IMM_MAX, IMM_MIN, OPCODE_BITS, OPERAND_BITS, OPERAND_MASK};
pub use reg::{reg_index, reg_name, ARG_REG_BASE, CALLER_SAVED_REGS, REG_COUNT, REG_NAMES, RET_REG, ZERO_REG};
pub use symbol::SymbolPool;

/// Identifier of an interned symbol.
pub type SymId = u32;
/// Identifier of a static register.
pub type RegId = u32;
/// Program-counter address inside a sealed container.
pub type VmAddr = u32;
/// A VM operand: one 32-bit signed word.
pub type VmOpr = i32;
/// Identifier of a memory-pool allocation (its byte offset).
pub type MemId = u32;

/// Label of the synthetic entry point inserted at seal time.
pub const ENTRY_LABEL: &str = "$entry";
/// Symbol of the per-function frame area in register-IR mode.
pub const FRAME_SYMBOL: &str = "$frame";
/// Symbol the debugger registers its callback under.
pub const DEBUGGER_FUNC: &str = "$debugger";
/// Label of the user program's main function.
pub const MAIN_FUNC: &str = "f_main";
