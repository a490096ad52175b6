//! Error types for registry operations.

use thiserror::Error;

/// Result type for `imgshuttle-registry` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during registry operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse a registry reference.
    #[error("invalid image reference '{0}': {1}")]
    InvalidReference(String, String),

    /// Registry authentication failed.
    #[error("authentication failed for registry '{0}': {1}")]
    AuthenticationFailed(String, String),

    /// Manifest or blob not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Failed to pull a blob from the source registry.
    #[error("failed to pull blob {digest}: {message}")]
    BlobPullFailed {
        /// The blob digest.
        digest: String,
        /// Error message.
        message: String,
    },

    /// Failed to push a blob to the destination registry.
    #[error("failed to push blob {digest}: {message}")]
    BlobPushFailed {
        /// The blob digest.
        digest: String,
        /// Error message.
        message: String,
    },

    /// Cross-repository mount was rejected or unsupported; caller should
    /// fall back to a streaming upload (spec.md §4.6).
    #[error("mount of {digest} from '{from}' to '{to}' failed: {message}")]
    MountFailed {
        /// The blob digest.
        digest: String,
        /// Source repository.
        from: String,
        /// Destination repository.
        to: String,
        /// Error message.
        message: String,
    },

    /// Failed to push a manifest.
    #[error("failed to push manifest: {0}")]
    ManifestPushFailed(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying registry transport error. The registry client is
    /// expected to apply its own retry policy for transient failures;
    /// this crate does not add a retry loop on top (spec.md §7).
    #[error("registry transport error: {0}")]
    Network(String),

    /// Digest mismatch after download.
    #[error("digest mismatch for blob: expected {expected}, got {actual}")]
    DigestMismatch {
        /// The expected digest.
        expected: String,
        /// The computed digest.
        actual: String,
    },

    /// A reference model error bubbled up from `imgshuttle-core`.
    #[error(transparent)]
    Reference(#[from] imgshuttle_core::Error),
}

impl Error {
    /// Create an invalid reference error.
    #[must_use]
    pub fn invalid_reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReference(reference.into(), message.into())
    }

    /// Create a blob pull failed error.
    #[must_use]
    pub fn blob_pull_failed(digest: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BlobPullFailed {
            digest: digest.into(),
            message: message.into(),
        }
    }

    /// Create a blob push failed error.
    #[must_use]
    pub fn blob_push_failed(digest: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BlobPushFailed {
            digest: digest.into(),
            message: message.into(),
        }
    }

    /// Create a mount failed error.
    #[must_use]
    pub fn mount_failed(
        digest: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MountFailed {
            digest: digest.into(),
            from: from.into(),
            to: to.into(),
            message: message.into(),
        }
    }

    /// Create a digest mismatch error.
    #[must_use]
    pub fn digest_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DigestMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
