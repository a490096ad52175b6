//! Bounded-concurrency transfer engine (component C6, spec.md §4.6).
//!
//! Copies a resolved [`imgshuttle_sets::UnprocessedSet`] to a single
//! destination repository: blob-level dedup and cross-repository mounting,
//! bundle lockfile rewriting, and dependency-ordered processing so a
//! bundle (or image index) is only pushed once everything it depends on
//! has already landed.

#![warn(missing_docs)]

mod engine;
mod error;
mod skip;

pub use engine::{TransferEngine, TransferOutcome};
pub use error::{Error, Result};
pub use skip::SkippedDescriptor;
