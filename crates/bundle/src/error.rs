//! Error types for bundle detection and lockfile rewriting.

use thiserror::Error;

/// Result type for `imgshuttle-bundle` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while detecting or rewriting a bundle.
#[derive(Error, Debug)]
pub enum Error {
    /// The embedded images lockfile layer could not be located.
    #[error("bundle config does not reference an images lockfile layer")]
    MissingLockfileLayer,

    /// The located layer was not a well-formed single-file tar.
    #[error("malformed images lockfile layer: {0}")]
    MalformedLockfileLayer(String),

    /// The embedded YAML document did not parse as an `ImagesLock`.
    #[error("malformed images lockfile: {0}")]
    MalformedLockfile(#[from] serde_yaml::Error),

    /// The image config blob was not valid JSON.
    #[error("malformed image config: {0}")]
    MalformedConfig(#[from] serde_json::Error),

    /// The image config lacked a `rootfs.diff_ids` entry for the layer
    /// being rewritten.
    #[error("image config missing rootfs.diff_ids at layer index {0}")]
    MissingRootfsDiffId(usize),

    /// The manifest had no `layers[index]` entry for the layer being
    /// rewritten.
    #[error("manifest has no layer at index {0}")]
    MissingManifestLayer(usize),

    /// Propagated I/O failure while building the rewritten layer tarball.
    #[error("I/O error while rewriting bundle layer: {0}")]
    Io(#[from] std::io::Error),

    /// A registry read failed.
    #[error(transparent)]
    Registry(#[from] imgshuttle_registry::Error),

    /// A reference model error.
    #[error(transparent)]
    Core(#[from] imgshuttle_core::Error),
}
