//! Transitive closure resolution: images, nested bundles, and signatures
//! (component C4, spec.md §4.4).
//!
//! Depends only on [`imgshuttle_registry::RegistryBackend`], never on a
//! concrete client, so the same resolver runs unmodified against a live
//! registry or a tar-backed source.

#![warn(missing_docs)]

mod engine;
mod error;
mod origin;

pub use engine::ClosureResolver;
pub use error::{Error, Result};
pub use origin::CopyOrigin;
