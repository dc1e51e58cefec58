use minivm_core::VmAddr;

/// A queued stepping directive, consulted on every instruction fetch.
///
/// An entry without an action is a plain counter: it raises a virtual
/// `Break` once `remaining` more fetches have passed. An entry with an
/// action runs the action instead and may re-enqueue itself.
#[derive(Clone, Debug)]
pub struct StepCounter {
    pub remaining: u64,
    pub action: Option<StepAction>,
}

/// The finite set of step-counter callbacks.
///
/// Every variant is interpretable against container state alone, which
/// keeps the fetch path free of debugger references. Depth-tracking
/// variants inspect the *original* opcode at each fetched pc, so they
/// see through planted breakpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepAction {
    /// Stop at the first pc whose source line is known and differs from
    /// `line` (source-level step, entering calls).
    LineDiff { line: Option<u32> },
    /// Like `LineDiff`, but suppress the check while inside a call made
    /// after installation (source-level step over calls).
    NextLine { line: Option<u32>, depth: u32 },
    /// Stop after `n` instruction steps, counting a call and everything
    /// inside it as a single step.
    NextInst { n: u64, depth: u32 },
    /// Re-enable the breakpoint at `pc`.
    Rearm { pc: VmAddr },
    /// Watchpoint tick: raise the watch flag, then re-enqueue while
    /// watching stays enabled.
    Watch,
}
