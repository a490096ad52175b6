//! Shared reference model, digests, and manifest types for imgshuttle.
//!
//! This crate has no network or filesystem dependencies — it is the
//! vocabulary every other `imgshuttle-*` crate builds on.

#![warn(missing_docs)]

mod cancel;
mod digest;
mod error;
mod image;
mod manifest;
mod reference;

pub use cancel::CancelToken;
pub use digest::Digest;
pub use error::{Error, Result};
pub use image::{
    ProcessedImage, TarIndexEntry, UnprocessedImageRef, BUNDLE_LABEL, ROOT_BUNDLE_LABEL,
};
pub use manifest::{Descriptor, Manifest, ManifestIndex, ManifestOrIndex};
pub use reference::ImageReference;
