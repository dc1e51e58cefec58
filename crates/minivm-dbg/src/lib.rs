//! Interactive debugger for MiniVM.
//!
//! The debugger attaches to a VM before `run`: it registers itself as
//! the `$debugger` external function, wires SIGINT to the container's
//! trap-mode flag, and enables trap mode so the first fetch drops into
//! the command-line interface. From there it speaks to the container
//! exclusively through the breakpoint / trap / step-counter protocol,
//! and evaluates user expressions against the VM's live state.

mod cli;
mod debugger;
mod eval;
mod signal;
mod source;

pub use cli::{LineSource, ReadlineSource, ScriptedSource};
pub use debugger::Debugger;
pub use eval::{EvalContext, ExprEvaluator};
