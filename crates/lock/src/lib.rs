//! Lock-output writer (component C8, spec.md §4.8).
//!
//! Produces either an `ImagesLock` or a `BundleLock` describing a copy
//! run's destination digests, deciding between the two shapes by scanning
//! the run's [`imgshuttle_sets::ProcessedSet`] for the root-bundle marker
//! (spec.md §6, §9 Design Notes).

#![warn(missing_docs)]

mod bundle_lock;
mod error;
mod images_lock;
mod writer;

pub use bundle_lock::{BundleLock, BundleLockBundle};
pub use error::{Error, Result};
pub use images_lock::{ImagesLock, ImagesLockEntry};
pub use writer::{write_lock, LockOutput};
