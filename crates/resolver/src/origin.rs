//! Seeding a closure resolution run from one of spec.md §4.4's four
//! origin shapes: a single image, a bundle, an on-disk lockfile, or a
//! tar image set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use imgshuttle_bundle::ImagesLock;
use imgshuttle_core::{ImageReference, UnprocessedImageRef, BUNDLE_LABEL, ROOT_BUNDLE_LABEL};

use crate::{Error, Result};

/// The single source a closure resolution run is seeded from.
///
/// A tar source is represented as already-parsed entries rather than a
/// path: the tar format itself lives in `imgshuttle-tar`, and this crate
/// has no reason to depend on it — by the time a `CopyOrigin` reaches the
/// resolver, the orchestrator has already read the archive's index.
#[derive(Debug, Clone)]
pub enum CopyOrigin {
    /// A single digested (or tagged) image reference.
    Image(String),
    /// A bundle reference. The seed entry is marked as the root bundle
    /// (spec.md §6, §4.8) so the lock-output writer can later find it
    /// unambiguously among every bundle the run may have copied.
    Bundle(String),
    /// The path to an on-disk `ImagesLock` or `BundleLock` YAML file.
    Lockfile(PathBuf),
    /// Entries recovered from a tar image set's index.
    Tar(Vec<UnprocessedImageRef>),
}

impl CopyOrigin {
    /// Produce the initial frontier of entries (spec.md §4.4 step 1,
    /// "Seed").
    pub fn seed(&self) -> Result<Vec<UnprocessedImageRef>> {
        match self {
            Self::Image(s) => Ok(vec![plain_entry(s)?]),
            Self::Bundle(s) => Ok(vec![root_bundle_entry(s)?]),
            Self::Lockfile(path) => seed_lockfile(path),
            Self::Tar(entries) => Ok(entries.clone()),
        }
    }
}

fn plain_entry(s: &str) -> Result<UnprocessedImageRef> {
    Ok(UnprocessedImageRef::from_str(s)?)
}

fn root_bundle_entry(s: &str) -> Result<UnprocessedImageRef> {
    let digest_ref = ImageReference::parse_digested(s)?;
    let tag = digest_ref.tag().map(str::to_string);
    let mut labels = BTreeMap::new();
    labels.insert(BUNDLE_LABEL.to_string(), "true".to_string());
    labels.insert(ROOT_BUNDLE_LABEL.to_string(), "true".to_string());
    Ok(UnprocessedImageRef::new(digest_ref, tag, labels, s)?)
}

/// Parse an on-disk lockfile as either shape (spec.md §3):
/// `ImagesLock { images: [...] }` or `BundleLock { bundle: { image, tag } }`.
/// `ImagesLock` is tried first since it is the more common on-disk shape;
/// a `BundleLock` document fails to deserialize as one (no `images` key)
/// and falls through to the `BundleLock` attempt.
fn seed_lockfile(path: &Path) -> Result<Vec<UnprocessedImageRef>> {
    let bytes = std::fs::read(path)?;

    if let Ok(lock) = ImagesLock::from_yaml(&bytes) {
        return lock.images.iter().map(|e| plain_entry(&e.image)).collect();
    }

    #[derive(serde::Deserialize)]
    struct BundleLockShape {
        bundle: BundleRefShape,
    }
    #[derive(serde::Deserialize)]
    struct BundleRefShape {
        image: String,
    }

    let parsed: BundleLockShape = serde_yaml::from_slice(&bytes)?;
    Ok(vec![root_bundle_entry(&parsed.bundle.image)?])
}
