//! The MiniVM instruction container.
//!
//! The container is the hinge between the three phases of a program's
//! life: front-ends *emit* packed instructions through the builder API,
//! `seal` resolves every symbolic label (backfilling defined ones and
//! reclassifying unresolved calls as external calls), and the sealed
//! container then *serves* instructions to the interpreter, one fetch at
//! a time, under breakpoint / trap-mode / step-counter control.
//!
//! The fetch path is the debugger's sole interposition point; see
//! [`InstContainer::get_inst`].

mod container;
mod disasm;
mod error;
mod step;

pub use container::InstContainer;
pub use error::{EmitError, EmitErrorKind};
pub use step::{StepAction, StepCounter};
