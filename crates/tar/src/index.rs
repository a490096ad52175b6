//! `manifest.json`: the tar image set's index (spec.md §4.7, §6).
//!
//! Schema matches spec.md §6 verbatim, plus one additive field
//! (`repo_ref`) per image: the spec's schema captures enough to push the
//! archive's contents to a destination, but re-seeding a closure run
//! *from* a tar (spec.md §4.4 step 1, `tar_path`) needs the source
//! registry/repository identity back, which a bare digest cannot supply.
//! Extra object keys are forward-compatible with the documented schema.

use std::collections::BTreeMap;

use imgshuttle_core::Digest;
use serde::{Deserialize, Serialize};

/// The full on-disk shape of `manifest.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TarManifestFile {
    /// One entry per image the archive contains.
    pub images: Vec<TarManifestImageEntry>,
}

/// One image entry in `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TarManifestImageEntry {
    /// The image's manifest digest, as copied (source and destination
    /// digests are identical — pushes are byte-for-byte verbatim, spec.md
    /// §4.6).
    pub digest: Digest,
    /// The tag recorded at write time, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Labels carried alongside the entry (root-bundle marker, etc.,
    /// spec.md §6).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// `registry/repository` this entry was copied from (additive, see
    /// module docs).
    pub repo_ref: String,
    /// In-archive path of the manifest blob.
    pub manifest_path: String,
    /// In-archive path of the config blob, when the image is a
    /// single-platform manifest (absent for image index entries, which
    /// have no config of their own).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    /// Referenced layer blobs and their in-archive paths.
    #[serde(default)]
    pub layers: Vec<TarManifestLayerEntry>,
}

/// One layer reference inside a `manifest.json` image entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TarManifestLayerEntry {
    /// The layer's digest.
    pub digest: Digest,
    /// In-archive path of the layer blob.
    pub path: String,
}

/// The path every blob (manifest, config, or layer) is stored under,
/// keyed by its digest (spec.md §6: `blobs/sha256/<hex>`).
#[must_use]
pub fn blob_path(digest: &Digest) -> String {
    format!("blobs/sha256/{}", digest.hex())
}
