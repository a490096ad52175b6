//! Lock-output writer (component C8, spec.md §4.8).
//!
//! Invoked after a successful copy when a lock-output path is configured.
//! Never called for tar destinations — the orchestrator rejects that
//! combination before this crate is ever reached (spec.md §4.8, §4.9).

use std::collections::BTreeMap;

use imgshuttle_core::{ManifestOrIndex, ProcessedImage};
use imgshuttle_registry::RegistryBackend;
use imgshuttle_sets::ProcessedSet;
use tracing::warn;

use crate::images_lock::{ImagesLock, ImagesLockEntry};
use crate::bundle_lock::BundleLock;
use crate::{Error, Result};

/// Either shape a copy run can emit (spec.md §3).
#[derive(Debug, Clone)]
pub enum LockOutput {
    /// Emitted when a root bundle was found among the processed images.
    Bundle(BundleLock),
    /// Emitted otherwise.
    Images(ImagesLock),
}

impl LockOutput {
    /// Serialize to YAML bytes, whichever shape this is.
    pub fn to_yaml(&self) -> Result<Vec<u8>> {
        Ok(match self {
            Self::Bundle(b) => b.to_yaml()?,
            Self::Images(i) => i.to_yaml()?,
        })
    }
}

/// Decide and build the lock output for a completed copy run (spec.md
/// §4.8).
///
/// `backend` must be the *destination* registry (or a tar-backed source
/// satisfying the same trait) — re-inspection reads the manifests already
/// pushed there. `source_lockfile`, when present, is the `ImagesLock` the
/// run was seeded from; its entry order and annotations are preserved in
/// the output (spec.md §4.8 step 3, "preserve its ordering").
pub async fn write_lock(
    backend: &dyn RegistryBackend,
    processed: &ProcessedSet,
    source_lockfile: Option<&imgshuttle_bundle::ImagesLock>,
) -> Result<LockOutput> {
    let all = processed.all();

    let mut root_candidates: Vec<&ProcessedImage> = all.iter().filter(|p| p.is_root_bundle()).collect();
    if root_candidates.len() > 1 {
        return Err(Error::InternalInconsistency(format!(
            "{} processed images carry the root-bundle label; expected at most one",
            root_candidates.len()
        )));
    }

    if let Some(root) = root_candidates.pop() {
        if is_bundle(backend, root).await? {
            return Ok(LockOutput::Bundle(bundle_lock_for(root)?));
        }
        warn!(
            digest_ref = %root.digest_ref,
            "root-bundle label present but re-inspection found no bundle label; treating as stale (spec.md §4.8 step 2)"
        );
    }

    for image in &all {
        if is_bundle(backend, image).await? {
            return Err(Error::RootBundleIndeterminate(format!(
                "{} is a bundle but carries no root-bundle label; regenerate the source tar",
                image.digest_ref
            )));
        }
    }

    match source_lockfile {
        Some(lock) => Ok(LockOutput::Images(rewrite_user_lockfile(lock, processed)?)),
        None => Ok(LockOutput::Images(ImagesLock::new(
            all.iter()
                .map(|p| ImagesLockEntry {
                    image: p.digest_ref.to_string(),
                    annotations: BTreeMap::new(),
                })
                .collect(),
        ))),
    }
}

/// Re-inspect a processed image's manifest for the bundle label (spec.md
/// §4.8 step 2's "defense against stale labels"). Image indices are never
/// bundles (spec.md §4.3 step 1).
async fn is_bundle(backend: &dyn RegistryBackend, image: &ProcessedImage) -> Result<bool> {
    let Some(manifest) = &image.image else {
        return Ok(false);
    };
    let repo_ref = image.digest_ref.repo_ref();
    let parsed = ManifestOrIndex::Manifest(manifest.clone());
    let detection = imgshuttle_bundle::detect(backend, &repo_ref, &parsed).await?;
    Ok(detection.is_bundle)
}

fn bundle_lock_for(root: &ProcessedImage) -> Result<BundleLock> {
    let digest = root
        .digest_ref
        .digest()
        .ok_or_else(|| Error::InternalInconsistency(format!("root bundle {} has no destination digest", root.digest_ref)))?;
    let tag = root
        .digest_ref
        .tag()
        .ok_or_else(|| Error::InternalInconsistency(format!("root bundle {} has no destination tag", root.digest_ref)))?;
    Ok(BundleLock::new(format!("{}@{digest}", root.digest_ref.repo_ref()), tag))
}

/// Rewrite a user-supplied `ImagesLock`'s entries to destination digests,
/// preserving order and annotations (spec.md §4.8 step 3).
fn rewrite_user_lockfile(lock: &imgshuttle_bundle::ImagesLock, processed: &ProcessedSet) -> Result<ImagesLock> {
    let mut entries = Vec::with_capacity(lock.images.len());
    for entry in &lock.images {
        let matches = processed.find_by_url(&entry.image);
        let found = matches
            .first()
            .ok_or_else(|| Error::ImageNotCopied(entry.image.clone()))?;
        entries.push(ImagesLockEntry {
            image: found.digest_ref.to_string(),
            annotations: entry.annotations.clone(),
        });
    }
    Ok(ImagesLock::new(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use imgshuttle_core::{Descriptor, Digest, ImageReference, Manifest, UnprocessedImageRef};
    use imgshuttle_registry::{FetchedManifest, MountOutcome};
    use std::collections::BTreeMap as Map;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeRegistry {
        blobs: StdMutex<Map<String, Vec<u8>>>,
    }

    impl FakeRegistry {
        fn put_blob(&self, repo_ref: &str, digest: &Digest, data: Vec<u8>) {
            self.blobs.lock().unwrap().insert(format!("{repo_ref}@{digest}"), data);
        }
    }

    #[async_trait]
    impl RegistryBackend for FakeRegistry {
        async fn pull_manifest(&self, repo_ref: &str, digest: &Digest) -> imgshuttle_registry::Result<FetchedManifest> {
            Err(imgshuttle_registry::Error::NotFound(format!("{repo_ref}@{digest}")))
        }

        async fn pull_blob(&self, repo_ref: &str, digest: &Digest) -> imgshuttle_registry::Result<Vec<u8>> {
            self.blobs
                .lock()
                .unwrap()
                .get(&format!("{repo_ref}@{digest}"))
                .cloned()
                .ok_or_else(|| imgshuttle_registry::Error::NotFound(format!("{repo_ref}@{digest}")))
        }

        async fn pull_blob_to_writer(
            &self,
            _repo_ref: &str,
            _descriptor: &Descriptor,
            _writer: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
        ) -> imgshuttle_registry::Result<()> {
            Ok(())
        }

        async fn blob_exists(&self, _repo_ref: &str, _digest: &Digest) -> imgshuttle_registry::Result<bool> {
            Ok(false)
        }

        async fn push_blob(&self, _repo_ref: &str, _digest: &Digest, _data: Vec<u8>) -> imgshuttle_registry::Result<()> {
            Ok(())
        }

        async fn mount_blob(&self, _to: &str, _from: &str, _digest: &Digest) -> imgshuttle_registry::Result<MountOutcome> {
            Ok(MountOutcome::Unsupported)
        }

        async fn push_manifest(&self, _repo_ref: &str, _media_type: &str, raw: &[u8]) -> imgshuttle_registry::Result<Digest> {
            Ok(Digest::of(raw))
        }

        async fn referrers(&self, _repo_ref: &str, _digest: &Digest) -> imgshuttle_registry::Result<Vec<Descriptor>> {
            Ok(Vec::new())
        }
    }

    fn digested(s: &str) -> ImageReference {
        ImageReference::parse_digested(s).unwrap()
    }

    fn plain_manifest(config_digest: Digest) -> Manifest {
        Manifest {
            media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
            config: Descriptor {
                media_type: "application/vnd.oci.image.config.v1+json".to_string(),
                digest: config_digest,
                size: 2,
                annotations: Map::new(),
            },
            layers: Vec::new(),
            annotations: Map::new(),
        }
    }

    fn processed(source: &str, dest: &str, labels: Map<String, String>, manifest: Manifest) -> ProcessedImage {
        ProcessedImage {
            unprocessed: UnprocessedImageRef::new(digested(source), None, labels, source.to_string()).unwrap(),
            digest_ref: digested(dest),
            image: Some(manifest),
            image_index: None,
        }
    }

    fn no_label_config() -> (Digest, Vec<u8>) {
        let bytes = br#"{"config":{"Labels":{}}}"#.to_vec();
        (Digest::of(&bytes), bytes)
    }

    fn bundle_label_config() -> (Digest, Vec<u8>) {
        let bytes = br#"{"config":{"Labels":{"dev.carvel.imgpkg.bundle":"true"}}}"#.to_vec();
        (Digest::of(&bytes), bytes)
    }

    #[tokio::test]
    async fn writes_images_lock_when_no_root_bundle() {
        let registry = FakeRegistry::default();
        let (config_digest, config_bytes) = no_label_config();
        registry.put_blob("dst/app", &config_digest, config_bytes);

        let set = ProcessedSet::new();
        set.add(processed(
            "src/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "dst/app:v1.imgpkg@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            Map::new(),
            plain_manifest(config_digest),
        ));

        let out = write_lock(&registry, &set, None).await.unwrap();
        assert!(matches!(out, LockOutput::Images(_)));
    }

    #[tokio::test]
    async fn writes_bundle_lock_when_root_bundle_present_and_verified() {
        let registry = FakeRegistry::default();
        let (config_digest, config_bytes) = bundle_label_config();
        registry.put_blob("dst/bundle", &config_digest, config_bytes);

        let mut labels = Map::new();
        labels.insert(imgshuttle_core::BUNDLE_LABEL.to_string(), "true".to_string());
        labels.insert(imgshuttle_core::ROOT_BUNDLE_LABEL.to_string(), "true".to_string());

        let set = ProcessedSet::new();
        set.add(processed(
            "src/bundle@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "dst/bundle:v1.imgpkg@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            labels,
            plain_manifest(config_digest),
        ));

        let out = write_lock(&registry, &set, None).await.unwrap();
        match out {
            LockOutput::Bundle(b) => {
                assert_eq!(b.bundle.tag, "v1.imgpkg");
                assert!(b.bundle.image.starts_with("dst/bundle@"));
            }
            LockOutput::Images(_) => panic!("expected BundleLock"),
        }
    }

    #[tokio::test]
    async fn stale_root_label_falls_back_to_images_lock() {
        let registry = FakeRegistry::default();
        let (config_digest, config_bytes) = no_label_config();
        registry.put_blob("dst/app", &config_digest, config_bytes);

        let mut labels = Map::new();
        labels.insert(imgshuttle_core::ROOT_BUNDLE_LABEL.to_string(), "true".to_string());

        let set = ProcessedSet::new();
        set.add(processed(
            "src/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "dst/app:v1.imgpkg@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            labels,
            plain_manifest(config_digest),
        ));

        let out = write_lock(&registry, &set, None).await.unwrap();
        assert!(matches!(out, LockOutput::Images(_)));
    }

    #[tokio::test]
    async fn unlabeled_bundle_is_indeterminate() {
        let registry = FakeRegistry::default();
        let (config_digest, config_bytes) = bundle_label_config();
        registry.put_blob("dst/app", &config_digest, config_bytes);

        let set = ProcessedSet::new();
        set.add(processed(
            "src/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "dst/app:v1.imgpkg@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            Map::new(),
            plain_manifest(config_digest),
        ));

        let err = write_lock(&registry, &set, None).await.unwrap_err();
        assert!(matches!(err, Error::RootBundleIndeterminate(_)));
    }

    #[tokio::test]
    async fn preserves_source_lockfile_order_and_fails_on_missing_entry() {
        let registry = FakeRegistry::default();
        let (config_digest, config_bytes) = no_label_config();
        registry.put_blob("dst/app", &config_digest, config_bytes);

        let set = ProcessedSet::new();
        set.add(processed(
            "src/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "dst/app:v1.imgpkg@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            Map::new(),
            plain_manifest(config_digest),
        ));

        let source_lock = imgshuttle_bundle::ImagesLock {
            api_version: imgshuttle_bundle::ImagesLock::API_VERSION.to_string(),
            kind: "ImagesLock".to_string(),
            images: vec![imgshuttle_bundle::ImagesLockEntry {
                image: "src/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_string(),
                annotations: Map::new(),
            }],
        };

        let out = write_lock(&registry, &set, Some(&source_lock)).await.unwrap();
        let LockOutput::Images(images) = out else { panic!("expected ImagesLock") };
        assert_eq!(images.images.len(), 1);
        assert!(images.images[0].image.starts_with("dst/app:v1.imgpkg@"));

        let source_lock_missing = imgshuttle_bundle::ImagesLock {
            api_version: imgshuttle_bundle::ImagesLock::API_VERSION.to_string(),
            kind: "ImagesLock".to_string(),
            images: vec![imgshuttle_bundle::ImagesLockEntry {
                image: "src/other@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_string(),
                annotations: Map::new(),
            }],
        };
        let err = write_lock(&registry, &set, Some(&source_lock_missing)).await.unwrap_err();
        assert!(matches!(err, Error::ImageNotCopied(_)));
    }
}
