//! Reading a tar image set back as a `RegistryBackend` source, and as a
//! resolver seed list (spec.md §4.7, §4.4 step 1).

use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use imgshuttle_core::{Descriptor, Digest, TarIndexEntry, UnprocessedImageRef};
use imgshuttle_registry::{FetchedManifest, MountOutcome, RegistryBackend};
use tokio::io::AsyncWriteExt;

use crate::error::{to_registry_error, Error, Result};
use crate::index::TarManifestFile;
use crate::parse::manifest_or_index_from_bytes;

/// A tar image set opened for reading.
///
/// Archive I/O is re-scanned from disk on every call rather than loaded
/// into memory up front: this tool expects archives with many large layer
/// blobs, and a fresh sequential scan per lookup avoids holding the whole
/// thing resident for the lifetime of a run.
pub struct TarReader {
    path: PathBuf,
    index: TarManifestFile,
}

impl TarReader {
    /// Open `path` and read its `manifest.json` index.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let index = read_index(&path)?;
        Ok(Self { path, index })
    }

    /// The archive's index entries, in `manifest.json` order.
    #[must_use]
    pub fn entries(&self) -> &[crate::index::TarManifestImageEntry] {
        &self.index.images
    }

    /// The archive's entries converted to `imgshuttle_core::TarIndexEntry`,
    /// the shape the closure resolver seeds a tar-sourced run from
    /// (spec.md §4.4 step 1).
    #[must_use]
    pub fn seed_entries(&self) -> Vec<TarIndexEntry> {
        self.index
            .images
            .iter()
            .map(|e| TarIndexEntry {
                repo_ref: e.repo_ref.clone(),
                digest: e.digest.clone(),
                labels: e.labels.clone(),
                tag: e.tag.clone(),
            })
            .collect()
    }

    /// `seed_entries`, converted into `UnprocessedImageRef`s ready to pass
    /// as `CopyOrigin::Tar`'s payload.
    pub fn seed_refs(&self) -> Result<Vec<UnprocessedImageRef>> {
        self.index
            .images
            .iter()
            .map(|e| {
                let digest_ref = imgshuttle_core::ImageReference::parse_digested(&format!(
                    "{}@{}",
                    e.repo_ref, e.digest
                ))?;
                Ok(UnprocessedImageRef::new(
                    digest_ref,
                    e.tag.clone(),
                    e.labels.clone(),
                    format!("{}@{}", e.repo_ref, e.digest),
                )?)
            })
            .collect()
    }

    fn read_blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        read_archive_path(&self.path, &crate::index::blob_path(digest))?.ok_or_else(|| Error::MissingBlob(digest.to_string()))
    }
}

fn read_index(path: &Path) -> Result<TarManifestFile> {
    let bytes = read_archive_path(path, "manifest.json")?.ok_or(Error::MissingIndex)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn read_archive_path(path: &Path, want: &str) -> Result<Option<Vec<u8>>> {
    use std::io::Read;
    let mut archive = tar::Archive::new(File::open(path)?);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.to_string_lossy().to_string();
        if entry_path == want {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

#[async_trait]
impl RegistryBackend for TarReader {
    async fn pull_manifest(&self, _repo_ref: &str, digest: &Digest) -> imgshuttle_registry::Result<FetchedManifest> {
        let raw = self.read_blob(digest).map_err(to_registry_error)?;
        let parsed = manifest_or_index_from_bytes(&raw).map_err(to_registry_error)?;
        let media_type = match &parsed {
            imgshuttle_core::ManifestOrIndex::Manifest(m) => m.media_type.clone(),
            imgshuttle_core::ManifestOrIndex::Index(i) => i.media_type.clone(),
        };
        Ok(FetchedManifest { parsed, raw, media_type })
    }

    async fn pull_blob(&self, _repo_ref: &str, digest: &Digest) -> imgshuttle_registry::Result<Vec<u8>> {
        self.read_blob(digest).map_err(to_registry_error)
    }

    async fn pull_blob_to_writer(
        &self,
        _repo_ref: &str,
        descriptor: &Descriptor,
        writer: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    ) -> imgshuttle_registry::Result<()> {
        let data = self.read_blob(&descriptor.digest).map_err(to_registry_error)?;
        writer.write_all(&data).await.map_err(|e| to_registry_error(Error::Io(e)))?;
        Ok(())
    }

    async fn blob_exists(&self, _repo_ref: &str, digest: &Digest) -> imgshuttle_registry::Result<bool> {
        Ok(read_archive_path(&self.path, &crate::index::blob_path(digest))
            .map_err(to_registry_error)?
            .is_some())
    }

    async fn push_blob(&self, _repo_ref: &str, _digest: &Digest, _data: Vec<u8>) -> imgshuttle_registry::Result<()> {
        Err(to_registry_error(Error::Unsupported(
            "a tar reader is a source only; cannot push blobs".to_string(),
        )))
    }

    async fn mount_blob(
        &self,
        _to_repo_ref: &str,
        _from_repo_ref: &str,
        _digest: &Digest,
    ) -> imgshuttle_registry::Result<MountOutcome> {
        Ok(MountOutcome::Unsupported)
    }

    async fn push_manifest(&self, _repo_ref: &str, _media_type: &str, _raw: &[u8]) -> imgshuttle_registry::Result<Digest> {
        Err(to_registry_error(Error::Unsupported(
            "a tar reader is a source only; cannot push manifests".to_string(),
        )))
    }

    async fn referrers(&self, _repo_ref: &str, _digest: &Digest) -> imgshuttle_registry::Result<Vec<Descriptor>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::TarWriter;
    use imgshuttle_core::{ImageReference, ProcessedImage};
    use imgshuttle_sets::ProcessedSet;
    use std::collections::BTreeMap;

    fn hex(n: u8) -> String {
        format!("{n:02x}").repeat(32)
    }

    #[tokio::test]
    async fn reads_back_a_written_manifest_and_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tar");

        let manifest_bytes = serde_json::json!({
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": format!("sha256:{}", hex(9)),
                "size": 10,
            },
            "layers": [],
        })
        .to_string()
        .into_bytes();

        let writer = TarWriter::open(&path, false).unwrap();
        let manifest_digest = writer
            .push_manifest("registry.a/app", "application/vnd.oci.image.manifest.v1+json", &manifest_bytes)
            .await
            .unwrap();

        let digest_ref = ImageReference::parse_digested(&format!("registry.a/app@{manifest_digest}")).unwrap();
        let unprocessed =
            imgshuttle_core::UnprocessedImageRef::new(digest_ref.clone(), None, BTreeMap::new(), "registry.a/app")
                .unwrap();
        let processed = ProcessedSet::new();
        processed.add(ProcessedImage {
            unprocessed,
            digest_ref,
            image: None,
            image_index: None,
        });
        writer.finalize(&processed).await.unwrap();

        let reader = TarReader::open(&path).unwrap();
        assert_eq!(reader.entries().len(), 1);
        let fetched = reader.pull_manifest("registry.a/app", &manifest_digest).await.unwrap();
        assert_eq!(fetched.raw, manifest_bytes);

        let seeds = reader.seed_refs().unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].digest_ref.repo_ref(), "registry.a/app");
    }

    #[test]
    fn open_fails_without_an_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tar");
        let file = File::create(&path).unwrap();
        let builder = tar::Builder::new(file);
        builder.into_inner().unwrap();

        assert!(TarReader::open(&path).is_err());
    }
}
