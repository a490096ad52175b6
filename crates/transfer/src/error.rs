//! Error types for the transfer engine.

use thiserror::Error;

/// Result type for `imgshuttle-transfer` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while transferring images to a destination.
#[derive(Error, Debug)]
pub enum Error {
    /// A reference model error.
    #[error(transparent)]
    Core(#[from] imgshuttle_core::Error),

    /// A registry read or write failed.
    #[error(transparent)]
    Registry(#[from] imgshuttle_registry::Error),

    /// Bundle detection or lockfile rewriting failed.
    #[error(transparent)]
    Bundle(#[from] imgshuttle_bundle::Error),

    /// The configured destination repository reference could not be
    /// parsed as `registry/repository`.
    #[error("invalid destination repository reference '{0}'")]
    InvalidDestination(String),

    /// An invariant the resolver is supposed to guarantee did not hold
    /// (e.g. a bundle referencing an image outside its own closure).
    #[error("internal-inconsistency: {0}")]
    InternalInconsistency(String),

    /// A spawned task panicked.
    #[error("transfer task panicked: {0}")]
    TaskPanic(String),

    /// The run was cancelled before the transfer finished (spec.md §5,
    /// §7).
    #[error("cancelled")]
    Cancelled,
}
