//! Is-bundle detection (spec.md §4.3, step-numbered in the order the
//! detector actually performs them).

use std::io::Read;

use flate2::read::GzDecoder;
use imgshuttle_core::{Digest, Manifest, ManifestOrIndex};
use imgshuttle_registry::RegistryBackend;
use tar::Archive;
use tracing::debug;

use crate::config::ImageConfig;
use crate::lockfile::ImagesLock;
use crate::{Error, Result};

/// Path of the embedded lockfile inside the (single-file) lockfile layer
/// tarball (spec.md §4.3: "the layer whose path inside the gzipped tar
/// is `.imgpkg/images.yml`").
pub const LOCKFILE_PATH: &str = ".imgpkg/images.yml";

/// The two places the bundle label can legally appear (spec.md §4.3:
/// "looks for `dev.carvel.imgpkg.bundle = true` in either the manifest's
/// or the config's Labels").
pub const BUNDLE_LABEL: &str = imgshuttle_core::BUNDLE_LABEL;

/// Result of running bundle detection against a single manifest.
#[derive(Debug, Clone)]
pub struct BundleDetection {
    /// Whether the manifest is a bundle.
    pub is_bundle: bool,
    /// The parsed embedded lockfile, present only when `is_bundle` and
    /// the layer was found and parsed successfully.
    pub lockfile: Option<ImagesLock>,
    /// Index into `manifest.layers` of the lockfile layer, needed by the
    /// rewriter to know which layer (and which `diff_ids` slot) to
    /// replace.
    pub lockfile_layer_index: Option<usize>,
    /// The parsed image config, fetched as a side effect of checking its
    /// labels; reused by the rewriter so it isn't fetched twice.
    pub config: Option<ImageConfig>,
}

/// Decide whether `manifest_or_index` is a bundle, and if so, locate and
/// parse its embedded images lockfile.
///
/// Image indices are never bundles and are skipped outright (spec.md
/// §4.3 step 1): "bundles are always single-architecture".
pub async fn detect(
    backend: &dyn RegistryBackend,
    repo_ref: &str,
    manifest_or_index: &ManifestOrIndex,
) -> Result<BundleDetection> {
    let manifest = match manifest_or_index {
        ManifestOrIndex::Index(_) => {
            return Ok(BundleDetection {
                is_bundle: false,
                lockfile: None,
                lockfile_layer_index: None,
                config: None,
            })
        }
        ManifestOrIndex::Manifest(m) => m,
    };

    let has_manifest_label = manifest
        .annotations
        .get(BUNDLE_LABEL)
        .map(String::as_str)
        == Some("true");

    let config_bytes = backend
        .pull_blob(repo_ref, &manifest.config.digest)
        .await?;
    let config = ImageConfig::from_json(&config_bytes)?;
    let has_config_label = config.has_label(BUNDLE_LABEL);

    let is_bundle = has_manifest_label || has_config_label;
    if !is_bundle {
        return Ok(BundleDetection {
            is_bundle: false,
            lockfile: None,
            lockfile_layer_index: None,
            config: Some(config),
        });
    }

    debug!(%repo_ref, "manifest carries bundle label, locating lockfile layer");
    match find_lockfile_layer(backend, repo_ref, manifest).await? {
        Some((index, lockfile)) => Ok(BundleDetection {
            is_bundle: true,
            lockfile: Some(lockfile),
            lockfile_layer_index: Some(index),
            config: Some(config),
        }),
        None => Err(Error::MissingLockfileLayer),
    }
}

/// Pull each layer in order, looking for one whose contents, decompressed
/// and untarred, contain a `.imgpkg/images.yml` entry.
async fn find_lockfile_layer(
    backend: &dyn RegistryBackend,
    repo_ref: &str,
    manifest: &Manifest,
) -> Result<Option<(usize, ImagesLock)>> {
    for (index, layer) in manifest.layers.iter().enumerate() {
        let blob = backend.pull_blob(repo_ref, &layer.digest).await?;
        if let Some(lockfile) = extract_lockfile(&blob)? {
            return Ok(Some((index, lockfile)));
        }
    }
    Ok(None)
}

/// Try to read `.imgpkg/images.yml` out of a gzipped tar blob. Returns
/// `Ok(None)` (not an error) when the blob isn't a lockfile layer at all
/// — most layers in a bundle are ordinary filesystem layers.
fn extract_lockfile(blob: &[u8]) -> Result<Option<ImagesLock>> {
    let mut archive = Archive::new(GzDecoder::new(blob));
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };
    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(_) => return Ok(None),
        };
        let path = match entry.path() {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(_) => continue,
        };
        if path == LOCKFILE_PATH {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            return Ok(Some(ImagesLock::from_yaml(&contents)?));
        }
    }
    Ok(None)
}

/// The uncompressed digest of a layer's tar contents (used to keep
/// `rootfs.diff_ids` accurate after a rewrite — `diff_ids` is always over
/// the uncompressed tar stream, never the gzip bytes).
pub fn uncompressed_digest(gzip_bytes: &[u8]) -> Result<Digest> {
    let mut decoder = GzDecoder::new(gzip_bytes);
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(Digest::of(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_lockfile_layer(lock: &ImagesLock) -> Vec<u8> {
        let yaml = lock.to_yaml().unwrap();
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let mut header = tar::Header::new_gnu();
            header.set_size(yaml.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, LOCKFILE_PATH, yaml.as_slice())
                .unwrap();
            builder.finish().unwrap();
        }
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar_bytes).unwrap();
        gz.finish().unwrap()
    }

    #[test]
    fn extracts_lockfile_from_tar_gz_layer() {
        let lock = ImagesLock {
            api_version: ImagesLock::API_VERSION.to_string(),
            kind: "ImagesLock".to_string(),
            images: vec![crate::lockfile::ImagesLockEntry {
                image: "registry.a/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_string(),
                annotations: Default::default(),
            }],
        };
        let layer = make_lockfile_layer(&lock);
        let extracted = extract_lockfile(&layer).unwrap().unwrap();
        assert_eq!(extracted, lock);
    }

    #[test]
    fn non_lockfile_layer_returns_none() {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let mut header = tar::Header::new_gnu();
            header.set_size(5);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "etc/hostname", &b"foo\n\0"[..])
                .unwrap();
            builder.finish().unwrap();
        }
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar_bytes).unwrap();
        let layer = gz.finish().unwrap();

        assert!(extract_lockfile(&layer).unwrap().is_none());
    }
}
