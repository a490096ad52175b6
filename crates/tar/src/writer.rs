//! Writing a tar image set (spec.md §4.7, §6), including resume.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use imgshuttle_core::{Descriptor, Digest};
use imgshuttle_registry::{FetchedManifest, MountOutcome, RegistryBackend};
use imgshuttle_sets::ProcessedSet;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{to_registry_error, Error, Result};
use crate::index::{blob_path, TarManifestFile, TarManifestImageEntry, TarManifestLayerEntry};

const MANIFEST_INDEX_PATH: &str = "manifest.json";

struct WriterState {
    builder: Option<tar::Builder<File>>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written_digests: HashSet<String>,
}

/// A tar image set opened for writing, usable as a destination
/// `RegistryBackend` (spec.md §4.7: "pushing to a tar destination uses the
/// same backend trait as pushing to a registry").
///
/// Written to a temp file beside `final_path` and atomically renamed into
/// place on `finalize`, so a crash mid-write never leaves a half-written
/// archive at the destination path (same discipline as a content-addressed
/// blob store's temp-then-rename write).
pub struct TarWriter {
    state: Mutex<WriterState>,
}

impl TarWriter {
    /// Open `final_path` for writing. When `resume` is `true` and an
    /// archive already exists at `final_path`, every blob entry already
    /// present is copied forward into the new archive and recorded as
    /// already-written, so a re-run skips re-copying blobs it already has
    /// (spec.md §4.7 resume).
    pub fn open(final_path: impl Into<PathBuf>, resume: bool) -> Result<Self> {
        let final_path = final_path.into();
        let temp_path = temp_path_for(&final_path);

        let (builder, written_digests) = if resume && has_existing_content(&final_path)? {
            resume_from_existing(&final_path, &temp_path)?
        } else {
            let file = File::create(&temp_path)?;
            (tar::Builder::new(file), HashSet::new())
        };

        Ok(Self {
            state: Mutex::new(WriterState {
                builder: Some(builder),
                temp_path,
                final_path,
                written_digests,
            }),
        })
    }

    /// Write `manifest.json` from the final `ProcessedSet`, close the
    /// archive, and atomically rename it into place.
    pub async fn finalize(&self, processed: &ProcessedSet) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut builder = state.builder.take().ok_or(Error::AlreadyFinalized)?;

        let index = build_index(processed)?;
        let bytes = serde_json::to_vec_pretty(&index)?;
        append_bytes(&mut builder, MANIFEST_INDEX_PATH, &bytes)?;

        let file = builder.into_inner()?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&state.temp_path, &state.final_path)?;
        debug!(path = %state.final_path.display(), images = index.images.len(), "finalized tar image set");
        Ok(())
    }

    async fn push_blob_inner(&self, digest: &Digest, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.written_digests.contains(digest.hex()) {
            return Ok(());
        }
        let builder = state.builder.as_mut().ok_or(Error::AlreadyFinalized)?;
        append_bytes(builder, &blob_path(digest), data)?;
        state.written_digests.insert(digest.hex().to_string());
        Ok(())
    }
}

fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "imgshuttle.tar".into());
    name.push(".tmp");
    final_path.with_file_name(name)
}

fn has_existing_content(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len() > 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn resume_from_existing(
    final_path: &Path,
    temp_path: &Path,
) -> Result<(tar::Builder<File>, HashSet<String>)> {
    let mut written = HashSet::new();
    let mut archive = tar::Archive::new(File::open(final_path)?);
    let out = File::create(temp_path)?;
    let mut builder = tar::Builder::new(out);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path_buf = entry.path()?.to_path_buf();
        let path_str = path_buf.to_string_lossy().to_string();
        if path_str == MANIFEST_INDEX_PATH {
            continue;
        }
        if let Some(hex) = path_str.strip_prefix("blobs/sha256/") {
            written.insert(hex.to_string());
        }
        let header = entry.header().clone();
        builder.append(&header, &mut entry)?;
    }

    debug!(path = %final_path.display(), blobs = written.len(), "resuming tar image set");
    Ok((builder, written))
}

fn append_bytes(builder: &mut tar::Builder<File>, path: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, data)?;
    Ok(())
}

fn build_index(processed: &ProcessedSet) -> Result<TarManifestFile> {
    let mut images = Vec::new();
    for p in processed.all() {
        let Some(digest) = p.digest_ref.digest().cloned() else {
            warn!(reference = %p.digest_ref, "processed image has no destination digest, skipping in tar index");
            continue;
        };
        let (config_path, layers) = match &p.image {
            Some(manifest) => {
                let layers = manifest
                    .layers
                    .iter()
                    .map(|d| TarManifestLayerEntry {
                        digest: d.digest.clone(),
                        path: blob_path(&d.digest),
                    })
                    .collect();
                (Some(blob_path(&manifest.config.digest)), layers)
            }
            None => (None, Vec::new()),
        };

        images.push(TarManifestImageEntry {
            digest,
            tag: p.digest_ref.tag().map(str::to_string),
            labels: p.unprocessed.labels.clone(),
            repo_ref: p.digest_ref.repo_ref(),
            manifest_path: blob_path(p.digest_ref.digest().expect("checked above")),
            config_path,
            layers,
        });
    }
    Ok(TarManifestFile { images })
}

#[async_trait]
impl RegistryBackend for TarWriter {
    async fn pull_manifest(&self, _repo_ref: &str, _digest: &Digest) -> imgshuttle_registry::Result<FetchedManifest> {
        Err(to_registry_error(Error::Unsupported(
            "a tar writer is a destination only; cannot pull manifests".to_string(),
        )))
    }

    async fn pull_blob(&self, _repo_ref: &str, _digest: &Digest) -> imgshuttle_registry::Result<Vec<u8>> {
        Err(to_registry_error(Error::Unsupported(
            "a tar writer is a destination only; cannot pull blobs".to_string(),
        )))
    }

    async fn pull_blob_to_writer(
        &self,
        _repo_ref: &str,
        _descriptor: &Descriptor,
        _writer: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    ) -> imgshuttle_registry::Result<()> {
        Err(to_registry_error(Error::Unsupported(
            "a tar writer is a destination only; cannot pull blobs".to_string(),
        )))
    }

    async fn blob_exists(&self, _repo_ref: &str, digest: &Digest) -> imgshuttle_registry::Result<bool> {
        let state = self.state.lock().await;
        Ok(state.written_digests.contains(digest.hex()))
    }

    async fn push_blob(&self, _repo_ref: &str, digest: &Digest, data: Vec<u8>) -> imgshuttle_registry::Result<()> {
        self.push_blob_inner(digest, &data).await.map_err(to_registry_error)
    }

    async fn mount_blob(
        &self,
        _to_repo_ref: &str,
        _from_repo_ref: &str,
        _digest: &Digest,
    ) -> imgshuttle_registry::Result<MountOutcome> {
        Ok(MountOutcome::Unsupported)
    }

    async fn push_manifest(&self, _repo_ref: &str, _media_type: &str, raw: &[u8]) -> imgshuttle_registry::Result<Digest> {
        let digest = Digest::of(raw);
        self.push_blob_inner(&digest, raw).await.map_err(to_registry_error)?;
        Ok(digest)
    }

    async fn referrers(&self, _repo_ref: &str, _digest: &Digest) -> imgshuttle_registry::Result<Vec<Descriptor>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgshuttle_core::{ImageReference, ProcessedImage, UnprocessedImageRef};
    use std::collections::BTreeMap;

    fn digested(repo: &str, hex: &str) -> ImageReference {
        ImageReference::parse_digested(&format!("{repo}@sha256:{hex}")).unwrap()
    }

    fn hex(n: u8) -> String {
        format!("{n:02x}").repeat(32)
    }

    #[tokio::test]
    async fn pushes_and_finalizes_blobs_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tar");
        let writer = TarWriter::open(&path, false).unwrap();

        let manifest_digest = Digest::parse(&format!("sha256:{}", hex(1))).unwrap();
        writer
            .push_blob("registry.a/app", &manifest_digest, b"hello".to_vec())
            .await
            .unwrap();

        let processed = ProcessedSet::new();
        let digest_ref = digested("registry.a/app", &hex(1));
        let unprocessed =
            UnprocessedImageRef::new(digest_ref.clone(), None, BTreeMap::new(), "registry.a/app").unwrap();
        processed.add(ProcessedImage {
            unprocessed,
            digest_ref,
            image: None,
            image_index: None,
        });

        writer.finalize(&processed).await.unwrap();
        assert!(path.exists());

        let mut archive = tar::Archive::new(File::open(&path).unwrap());
        let mut found_manifest = false;
        let mut found_blob = false;
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let p = entry.path().unwrap().to_string_lossy().to_string();
            if p == "manifest.json" {
                found_manifest = true;
            }
            if p == format!("blobs/sha256/{}", hex(1)) {
                found_blob = true;
            }
        }
        assert!(found_manifest);
        assert!(found_blob);
    }

    #[tokio::test]
    async fn duplicate_digest_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tar");
        let writer = TarWriter::open(&path, false).unwrap();
        let digest = Digest::parse(&format!("sha256:{}", hex(2))).unwrap();

        writer.push_blob("r", &digest, b"data".to_vec()).await.unwrap();
        writer.push_blob("r", &digest, b"data".to_vec()).await.unwrap();

        assert!(writer.blob_exists("r", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn resume_preserves_previously_written_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tar");

        let digest = Digest::parse(&format!("sha256:{}", hex(3))).unwrap();
        {
            let writer = TarWriter::open(&path, false).unwrap();
            writer.push_blob("r", &digest, b"payload".to_vec()).await.unwrap();
            writer.finalize(&ProcessedSet::new()).await.unwrap();
        }

        let writer = TarWriter::open(&path, true).unwrap();
        assert!(writer.blob_exists("r", &digest).await.unwrap());
        writer.finalize(&ProcessedSet::new()).await.unwrap();

        let mut archive = tar::Archive::new(File::open(&path).unwrap());
        let blob_paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(blob_paths.contains(&format!("blobs/sha256/{}", hex(3))));
    }
}
