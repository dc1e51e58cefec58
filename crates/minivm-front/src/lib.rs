//! Front-ends for the two IR dialects MiniVM executes.
//!
//! Both are line-oriented, statement-per-line languages; the parsers
//! here drive the instruction container's emission API and report
//! problems through its error channel. They are adapters with a fixed
//! contract, not part of the execution core.

mod eeyore;
mod lexer;
mod tigger;

pub use eeyore::parse_eeyore;
pub use tigger::parse_tigger;
