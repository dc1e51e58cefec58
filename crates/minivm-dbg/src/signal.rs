//! Interrupt wiring: SIGINT sets the container's trap-mode flag.
//!
//! The handler does nothing beyond the atomic store, which keeps it
//! async-signal-safe; the next instruction fetch observes the flag and
//! yields a virtual `Break`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Keeps the handler registered; unregisters on drop.
pub struct SignalGuard {
    id: signal_hook::SigId,
}

/// Register SIGINT to store `true` into `flag`.
pub fn install_interrupt(flag: Arc<AtomicBool>) -> Option<SignalGuard> {
    signal_hook::flag::register(signal_hook::consts::SIGINT, flag)
        .ok()
        .map(|id| SignalGuard { id })
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
    }
}
