//! Bundle detection and embedded-lockfile rewriting (spec.md §4.3).
//!
//! A bundle is an ordinary OCI image carrying a well-known label whose
//! config or manifest annotations mark it, and whose layers include a
//! single-file tar.gz holding an `ImagesLock` YAML document. This crate
//! never talks to a registry directly except through
//! [`imgshuttle_registry::RegistryBackend`], so it works unmodified
//! against a tar-backed source too.

#![warn(missing_docs)]

mod config;
mod detect;
mod error;
mod lockfile;
mod rewrite;

pub use config::{ConfigSection, ImageConfig};
pub use detect::{detect, uncompressed_digest, BundleDetection, BUNDLE_LABEL, LOCKFILE_PATH};
pub use error::{Error, Result};
pub use lockfile::{ImagesLock, ImagesLockEntry};
pub use rewrite::{
    build_lockfile_layer, rewrite, rewrite_config, rewrite_manifest, RewrittenBundle,
    LOCKFILE_LAYER_MEDIA_TYPE,
};
