//! Registry-agnostic manifest representation.
//!
//! `imgshuttle-registry` adapts `oci-distribution`'s manifest types into
//! these, so the rest of the workspace never depends on the registry
//! client's own type surface.

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// A content descriptor: digest, media type, size, and any labels/media
/// annotations needed downstream (non-distributable detection reads
/// `media_type`; bundle detection reads `annotations`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// OCI media type of the referenced blob.
    pub media_type: String,
    /// Content digest.
    pub digest: Digest,
    /// Size in bytes.
    pub size: u64,
    /// Annotations carried on the descriptor, if any.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub annotations: std::collections::BTreeMap<String, String>,
}

/// A single-platform image manifest: one config blob, N layer blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest media type.
    pub media_type: String,
    /// The image config descriptor.
    pub config: Descriptor,
    /// Layer descriptors, in application order.
    pub layers: Vec<Descriptor>,
    /// Manifest-level annotations (this is where the bundle label lives
    /// for manifests that carry it directly rather than on the config).
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub annotations: std::collections::BTreeMap<String, String>,
}

/// A multi-platform image index: a list of child manifest descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestIndex {
    /// Index media type.
    pub media_type: String,
    /// Child manifest descriptors, one per platform.
    pub manifests: Vec<Descriptor>,
}

/// Either shape a manifest fetch can return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ManifestOrIndex {
    /// A single-platform manifest.
    Manifest(Manifest),
    /// A multi-platform index.
    Index(ManifestIndex),
}

impl ManifestOrIndex {
    /// `true` if this is an image index (C4/C6 never treat indices as
    /// bundles, but do walk their children).
    #[must_use]
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }
}
