//! A single cooperative cancellation signal (spec.md §5: "The copy
//! exposes a single cancellation signal: on cancel, in-flight operations
//! are allowed to complete; no new operations start").
//!
//! Passed explicitly as a collaborator rather than checked through
//! process-global state (spec.md §9 Design Notes: "mutable global
//! logger... pass explicitly, no process-wide state" applies equally
//! here).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply-cloneable flag, set once to request cancellation and
/// checked between units of work (never mid-unit — spec.md §5 requires
/// in-flight operations to complete).
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that is not yet cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
