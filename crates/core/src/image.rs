//! The two record types that flow through a copy run (spec.md §3).

use std::collections::BTreeMap;

use crate::manifest::{Manifest, ManifestIndex};
use crate::reference::ImageReference;
use crate::Result;

/// An image discovered by the closure resolver, not yet copied.
///
/// Identity is `digest_ref + ":" + tag` (see `identity_key`): two entries
/// with the same digest but different source repositories are distinct,
/// by design (spec.md §9 Open Question) — the transfer engine's blob-level
/// dedup absorbs the resulting duplicate work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprocessedImageRef {
    /// The source-side digested reference. Always carries a digest.
    pub digest_ref: ImageReference,
    /// The source-side tag, if the seed had one.
    pub tag: Option<String>,
    /// Arbitrary metadata propagated through the closure (e.g. the
    /// root-bundle marker, see spec.md §6).
    pub labels: BTreeMap<String, String>,
    /// The original reference string the user or lockfile provided,
    /// kept for diagnostics.
    pub orig_ref: String,
}

impl UnprocessedImageRef {
    /// Construct a new entry, validating `digest_ref`.
    pub fn new(
        digest_ref: ImageReference,
        tag: Option<String>,
        labels: BTreeMap<String, String>,
        orig_ref: impl Into<String>,
    ) -> Result<Self> {
        digest_ref.validate()?;
        Ok(Self {
            digest_ref,
            tag,
            labels,
            orig_ref: orig_ref.into(),
        })
    }

    /// Parse `orig_ref` directly into a validated entry with no labels.
    ///
    /// `orig_ref` must already carry a digest; bare tag references have to
    /// be resolved against the registry first (the closure resolver does
    /// this before ever constructing an `UnprocessedImageRef`).
    pub fn from_str(orig_ref: &str) -> Result<Self> {
        let digest_ref = ImageReference::parse_digested(orig_ref)?;
        let tag = digest_ref.tag().map(str::to_string);
        Self::new(digest_ref, tag, BTreeMap::new(), orig_ref)
    }

    /// The set-identity key: `digest_ref + ":" + tag`.
    #[must_use]
    pub fn identity_key(&self) -> String {
        format!("{}:{}", self.digest_ref, self.tag.as_deref().unwrap_or(""))
    }

    /// `true` if this entry carries the root-bundle marker label
    /// (spec.md §6).
    #[must_use]
    pub fn is_root_bundle(&self) -> bool {
        self.labels.get(ROOT_BUNDLE_LABEL).map(String::as_str) == Some("true")
    }

    /// `true` if this entry carries the bundle label at all.
    #[must_use]
    pub fn is_labeled_bundle(&self) -> bool {
        self.labels.get(BUNDLE_LABEL).map(String::as_str) == Some("true")
    }
}

/// The well-known bundle label (spec.md §6).
pub const BUNDLE_LABEL: &str = "dev.carvel.imgpkg.bundle";

/// The marker that distinguishes the user's explicit seed bundle from any
/// bundle reached transitively (spec.md §6, §4.8, §9).
pub const ROOT_BUNDLE_LABEL: &str = "dev.imgshuttle.root-bundle";

/// An image after it has been copied to the destination.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// The unprocessed entry this was copied from.
    pub unprocessed: UnprocessedImageRef,
    /// The destination-side reference (after push).
    pub digest_ref: ImageReference,
    /// Populated when the source was a single-platform manifest.
    pub image: Option<Manifest>,
    /// Populated when the source was a multi-platform index.
    pub image_index: Option<ManifestIndex>,
}

impl ProcessedImage {
    /// `true` if this entry carries the root-bundle marker label.
    #[must_use]
    pub fn is_root_bundle(&self) -> bool {
        self.unprocessed.is_root_bundle()
    }

    /// `true` if this entry is (or was detected as) a labeled bundle.
    #[must_use]
    pub fn is_labeled_bundle(&self) -> bool {
        self.unprocessed.is_labeled_bundle()
    }
}

/// One entry in a tar image set's index (spec.md §4.7), used as the seed
/// shape when a copy run's source is a tar archive rather than a live
/// registry. Kept here rather than in the tar crate so the closure
/// resolver can seed from it without depending on the tar crate at all.
#[derive(Debug, Clone)]
pub struct TarIndexEntry {
    /// The repository reference this entry was copied from, as recorded
    /// at write time.
    pub repo_ref: String,
    /// The entry's digest.
    pub digest: crate::digest::Digest,
    /// Labels carried alongside the entry (root-bundle marker, etc.).
    pub labels: BTreeMap<String, String>,
    /// The tag recorded at write time, if any.
    pub tag: Option<String>,
}
