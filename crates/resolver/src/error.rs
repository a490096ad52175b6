//! Error types for closure resolution.

use thiserror::Error;

/// Result type for `imgshuttle-resolver` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving a copy run's transitive closure.
#[derive(Error, Debug)]
pub enum Error {
    /// A reference model error bubbled up from `imgshuttle-core`.
    #[error(transparent)]
    Core(#[from] imgshuttle_core::Error),

    /// A registry read failed.
    #[error(transparent)]
    Registry(#[from] imgshuttle_registry::Error),

    /// Bundle detection or lockfile parsing failed.
    #[error(transparent)]
    Bundle(#[from] imgshuttle_bundle::Error),

    /// A manifest on the expansion frontier could not be fetched at all
    /// (spec.md §4.4: "Missing manifests on expansion: fail-fast").
    #[error("unreachable-ancestor: {0}")]
    UnreachableAncestor(String),

    /// An invariant the resolver relies on was violated.
    #[error("internal-inconsistency: {0}")]
    InternalInconsistency(String),

    /// Failed to read an on-disk lockfile.
    #[error("I/O error reading lockfile: {0}")]
    Io(#[from] std::io::Error),

    /// An on-disk lockfile was neither a well-formed `ImagesLock` nor a
    /// `BundleLock`.
    #[error("malformed lockfile: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An expansion task panicked.
    #[error("task panicked during closure resolution: {0}")]
    TaskPanic(String),

    /// The run was cancelled before the closure finished resolving
    /// (spec.md §5, §7).
    #[error("cancelled")]
    Cancelled,
}
