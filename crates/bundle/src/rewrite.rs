//! Rewriting a bundle's embedded lockfile after its images have been
//! copied (spec.md §4.3 Rewriting: "replaces each `image:` entry in the
//! embedded lockfile with the destination digest, producing a new layer
//! tarball and a new config, yielding a new manifest digest").
//!
//! This module is side-effect-free: it returns owned bytes for the
//! caller (the transfer engine) to push, never pushing itself, so it
//! stays trivially testable against fixed inputs.

use std::io::Write;

use imgshuttle_core::{Descriptor, Digest};
use serde_json::Value;

use crate::config::ImageConfig;
use crate::detect::{uncompressed_digest, LOCKFILE_PATH};
use crate::lockfile::ImagesLock;
use crate::{Error, Result};

/// The media type used for the lockfile layer this tool writes.
/// Consistent with the config media type carrying the bundle marker
/// (spec.md §3 Supplemented).
pub const LOCKFILE_LAYER_MEDIA_TYPE: &str = "application/vnd.imgpkg.bundle.layer.v1+tar+gzip";

/// The bytes and descriptor produced by rewriting a bundle's embedded
/// lockfile, config, and manifest.
#[derive(Debug, Clone)]
pub struct RewrittenBundle {
    /// The new lockfile layer's raw (gzip) bytes.
    pub layer_bytes: Vec<u8>,
    /// The new lockfile layer's descriptor, ready to replace the old one
    /// at `lockfile_layer_index`.
    pub layer_descriptor: Descriptor,
    /// The new config blob's raw bytes.
    pub config_bytes: Vec<u8>,
    /// The new config blob's descriptor.
    pub config_descriptor: Descriptor,
    /// The new manifest's raw bytes, with `layers[lockfile_layer_index]`
    /// and `config` replaced to point at the above.
    pub manifest_bytes: Vec<u8>,
}

/// Build a fresh single-file tar.gz layer containing `lock` at
/// [`LOCKFILE_PATH`].
pub fn build_lockfile_layer(lock: &ImagesLock) -> Result<Vec<u8>> {
    let yaml = lock.to_yaml()?;

    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        let mut header = tar::Header::new_gnu();
        header.set_size(yaml.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, LOCKFILE_PATH, yaml.as_slice())?;
        builder.finish()?;
    }

    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(&tar_bytes)?;
    Ok(gz.finish()?)
}

/// Rewrite `original_config`'s `rootfs.diff_ids[lockfile_layer_index]` to
/// the uncompressed digest of the new lockfile layer, reserializing it.
pub fn rewrite_config(
    mut config: ImageConfig,
    lockfile_layer_index: usize,
    new_layer_bytes: &[u8],
) -> Result<Vec<u8>> {
    let new_diff_id = uncompressed_digest(new_layer_bytes)?;

    let rootfs = config
        .extra
        .get_mut("rootfs")
        .ok_or(Error::MissingRootfsDiffId(lockfile_layer_index))?;
    let diff_ids = rootfs
        .get_mut("diff_ids")
        .and_then(Value::as_array_mut)
        .ok_or(Error::MissingRootfsDiffId(lockfile_layer_index))?;
    let slot = diff_ids
        .get_mut(lockfile_layer_index)
        .ok_or(Error::MissingRootfsDiffId(lockfile_layer_index))?;
    *slot = Value::String(new_diff_id.to_string());

    Ok(config.to_json()?)
}

/// Replace `manifest_raw`'s `layers[lockfile_layer_index]` and `config`
/// descriptors in place, preserving every other field (`schemaVersion`,
/// `mediaType`, `annotations`, ...) byte-for-byte via `serde_json::Value`
/// surgery rather than reconstructing the manifest from our own typed
/// model, which would silently drop fields that model doesn't carry.
pub fn rewrite_manifest(
    manifest_raw: &[u8],
    lockfile_layer_index: usize,
    new_layer_descriptor: &Descriptor,
    new_config_descriptor: &Descriptor,
) -> Result<Vec<u8>> {
    let mut value: Value = serde_json::from_slice(manifest_raw)?;

    let layers = value
        .get_mut("layers")
        .and_then(Value::as_array_mut)
        .ok_or(Error::MissingManifestLayer(lockfile_layer_index))?;
    let slot = layers
        .get_mut(lockfile_layer_index)
        .ok_or(Error::MissingManifestLayer(lockfile_layer_index))?;
    *slot = descriptor_to_value(new_layer_descriptor);

    if let Some(config_slot) = value.get_mut("config") {
        *config_slot = descriptor_to_value(new_config_descriptor);
    }

    Ok(serde_json::to_vec(&value)?)
}

fn descriptor_to_value(descriptor: &Descriptor) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "mediaType".to_string(),
        Value::String(descriptor.media_type.clone()),
    );
    map.insert(
        "digest".to_string(),
        Value::String(descriptor.digest.as_str().to_string()),
    );
    map.insert(
        "size".to_string(),
        Value::Number(descriptor.size.into()),
    );
    if !descriptor.annotations.is_empty() {
        let annotations = descriptor
            .annotations
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        map.insert("annotations".to_string(), Value::Object(annotations));
    }
    Value::Object(map)
}

/// Run the full rewrite: build the new layer, update the config's
/// `diff_ids`, then splice both new descriptors into the manifest.
pub fn rewrite(
    new_lock: &ImagesLock,
    lockfile_layer_index: usize,
    config: ImageConfig,
    manifest_raw: &[u8],
) -> Result<RewrittenBundle> {
    let layer_bytes = build_lockfile_layer(new_lock)?;
    let layer_descriptor = Descriptor {
        media_type: LOCKFILE_LAYER_MEDIA_TYPE.to_string(),
        digest: Digest::of(&layer_bytes),
        size: layer_bytes.len() as u64,
        annotations: Default::default(),
    };

    let config_bytes = rewrite_config(config, lockfile_layer_index, &layer_bytes)?;
    let config_descriptor = Descriptor {
        media_type: "application/vnd.oci.image.config.v1+json".to_string(),
        digest: Digest::of(&config_bytes),
        size: config_bytes.len() as u64,
        annotations: Default::default(),
    };

    let manifest_bytes = rewrite_manifest(
        manifest_raw,
        lockfile_layer_index,
        &layer_descriptor,
        &config_descriptor,
    )?;

    Ok(RewrittenBundle {
        layer_bytes,
        layer_descriptor,
        config_bytes,
        config_descriptor,
        manifest_bytes,
    })
}
