//! Error types for the lock-output writer.

use thiserror::Error;

/// Result type for `imgshuttle-lock` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while writing a lock output (spec.md §4.8, §7).
#[derive(Error, Debug)]
pub enum Error {
    /// A reference model error.
    #[error(transparent)]
    Core(#[from] imgshuttle_core::Error),

    /// Re-inspecting a candidate root bundle's manifest failed.
    #[error(transparent)]
    Registry(#[from] imgshuttle_registry::Error),

    /// Bundle detection failed while re-verifying a root bundle candidate.
    #[error(transparent)]
    Bundle(#[from] imgshuttle_bundle::Error),

    /// Serializing the lock document to YAML failed.
    #[error("failed to serialize lock output: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// More than one processed image carries the root-bundle label, or
    /// the set contains a bundle with no root-bundle label at all (a tar
    /// that predates root-bundle labeling) — spec.md §4.8 step 3a.
    #[error("root-bundle-indeterminate: {0}")]
    RootBundleIndeterminate(String),

    /// A user-supplied `ImagesLock` entry's source digest has no
    /// corresponding processed image.
    #[error("image-not-copied: {0}")]
    ImageNotCopied(String),

    /// An invariant the earlier pipeline stages are supposed to
    /// guarantee did not hold.
    #[error("internal-inconsistency: {0}")]
    InternalInconsistency(String),
}
