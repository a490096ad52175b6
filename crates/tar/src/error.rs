//! Error types for tar image set reading and writing.

use thiserror::Error;

/// Result type for `imgshuttle-tar` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or writing a tar image set.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error reading or writing the archive.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `manifest.json` was missing or malformed.
    #[error("malformed tar index: {0}")]
    Json(#[from] serde_json::Error),

    /// A reference model error.
    #[error(transparent)]
    Core(#[from] imgshuttle_core::Error),

    /// The archive has no `manifest.json` entry at all.
    #[error("tar archive has no manifest.json index")]
    MissingIndex,

    /// A blob or manifest digest referenced by `manifest.json` is not
    /// actually present in the archive.
    #[error("blob '{0}' referenced by the index is missing from the archive")]
    MissingBlob(String),

    /// A stored manifest's JSON body could not be interpreted as either
    /// an OCI manifest or an image index.
    #[error("malformed manifest bytes: {0}")]
    MalformedManifest(String),

    /// `push_blob`/`push_manifest`/`finalize` called after `finalize`
    /// already consumed the underlying tar builder.
    #[error("internal-inconsistency: tar writer already finalized")]
    AlreadyFinalized,

    /// A read-side `RegistryBackend` method was called on a `TarWriter`,
    /// or a write-side one on a `TarReader`.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Adapt a tar-crate error into the shared registry error type, so
/// `TarWriter`/`TarReader` can implement `imgshuttle_registry::RegistryBackend`
/// without that trait depending on this crate.
pub(crate) fn to_registry_error(e: Error) -> imgshuttle_registry::Error {
    match e {
        Error::Io(io) => imgshuttle_registry::Error::Io(io),
        Error::Core(c) => imgshuttle_registry::Error::Reference(c),
        other => imgshuttle_registry::Error::Network(other.to_string()),
    }
}
