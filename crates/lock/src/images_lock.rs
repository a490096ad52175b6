//! The on-disk `ImagesLock` document (spec.md §3, §4.8).
//!
//! Shape-identical to the lockfile a bundle embeds in a layer
//! (`imgshuttle_bundle::ImagesLock`), but this is the copy-engine output:
//! one entry per processed image, rewritten to destination digests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One entry in an on-disk `ImagesLock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesLockEntry {
    /// The destination digested reference.
    pub image: String,
    /// Annotations carried alongside the entry, preserved from the
    /// source lockfile entry when rewriting a user-supplied `ImagesLock`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Emitted when the copied set has no root bundle (spec.md §3: `ImagesLock
/// { api_version, kind="ImagesLock", images: [{image: digest_ref}...] }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesLock {
    /// Lockfile schema version.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Always `"ImagesLock"`.
    pub kind: String,
    /// The processed images, in the order described by spec.md §4.8 step
    /// 3: the source lockfile's order when the run started from one,
    /// else sorted ascending by destination digest.
    pub images: Vec<ImagesLockEntry>,
}

impl ImagesLock {
    /// The `apiVersion` this tool writes.
    pub const API_VERSION: &'static str = "imgpkg.carvel.dev/v1alpha1";

    /// Build an `ImagesLock` from an ordered list of destination
    /// references.
    #[must_use]
    pub fn new(images: Vec<ImagesLockEntry>) -> Self {
        Self {
            api_version: Self::API_VERSION.to_string(),
            kind: "ImagesLock".to_string(),
            images,
        }
    }

    /// Serialize to YAML bytes.
    pub fn to_yaml(&self) -> Result<Vec<u8>, serde_yaml::Error> {
        serde_yaml::to_string(self).map(String::into_bytes)
    }

    /// Parse from YAML bytes.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_slice(bytes)
    }
}
