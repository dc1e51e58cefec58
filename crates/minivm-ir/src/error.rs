use std::fmt;

use thiserror::Error;

/// Error kinds reported during emission or sealing.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EmitErrorKind {
    #[error("symbol has already been defined")]
    DuplicateSymbol,
    #[error("label has already been defined")]
    DuplicateLabel,
    #[error("using undefined symbol")]
    UndefinedSymbol,
    #[error("using undefined label")]
    UndefinedLabel,
    #[error("nested function is unsupported")]
    NestedFunction,
    #[error("using label reference in global environment")]
    LabelInGlobalScope,
    #[error("{0}")]
    Parse(String),
}

/// An emission error with its source context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitError {
    pub kind: EmitErrorKind,
    /// Source line the error was logged at.
    pub line: u32,
    /// Offending symbol or label, when one is involved.
    pub symbol: Option<String>,
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(sym) => write!(
                f,
                "error (line {}, sym \"{}\"): {}",
                self.line, sym, self.kind
            ),
            None => write!(f, "error (line {}): {}", self.line, self.kind),
        }
    }
}

impl std::error::Error for EmitError {}
