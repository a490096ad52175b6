//! Error types for the image reference model.

use thiserror::Error;

/// Result type for `imgshuttle-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or validating references and digests.
#[derive(Error, Debug)]
pub enum Error {
    /// A reference string could not be parsed at all.
    #[error("invalid image reference '{0}'")]
    InvalidReference(String),

    /// A digest string was not `sha256:<64 hex chars>`.
    #[error("invalid digest '{0}'")]
    InvalidDigest(String),

    /// A reference lacked a digest where one is required.
    #[error("missing-digest: reference '{0}' has no digest")]
    MissingDigest(String),
}
