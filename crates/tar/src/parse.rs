//! Value-based OCI manifest parsing.
//!
//! `imgshuttle_core::Manifest`/`Descriptor` derive `serde` without
//! camelCase renames (their field names match the wire format's snake_case
//! Rust-side names, not `mediaType`/`annotations` as OCI actually writes
//! them), so they can't deserialize real manifest bytes directly. Every
//! site that turns wire bytes into these types does its own key-by-key
//! extraction instead; see `imgshuttle-bundle`'s `rewrite.rs` for the
//! other occurrence of this idiom. A tar archive stores manifests exactly
//! as served, so reading one back needs the same treatment.

use std::collections::BTreeMap;

use imgshuttle_core::{Descriptor, Digest, Manifest, ManifestIndex, ManifestOrIndex};
use serde_json::Value;

use crate::error::{Error, Result};

fn str_field<'a>(v: &'a Value, key: &str) -> Result<&'a str> {
    v.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MalformedManifest(format!("missing '{key}' field")))
}

fn descriptor_from_value(v: &Value) -> Result<Descriptor> {
    let digest = Digest::parse(str_field(v, "digest")?)?;
    let media_type = str_field(v, "mediaType")?.to_string();
    let size = v
        .get("size")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::MalformedManifest("missing 'size' field".to_string()))?;
    let annotations = v
        .get("annotations")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, val)| val.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_else(BTreeMap::new);
    Ok(Descriptor {
        media_type,
        digest,
        size,
        annotations,
    })
}

/// Parse raw manifest/index bytes as served by a registry into our
/// registry-agnostic `ManifestOrIndex`, without relying on the derived
/// `Deserialize` impls (see module docs).
pub fn manifest_or_index_from_bytes(raw: &[u8]) -> Result<ManifestOrIndex> {
    let value: Value = serde_json::from_slice(raw)?;

    if let Some(manifests) = value.get("manifests").and_then(Value::as_array) {
        let media_type = value
            .get("mediaType")
            .and_then(Value::as_str)
            .unwrap_or("application/vnd.oci.image.index.v1+json")
            .to_string();
        let manifests = manifests.iter().map(descriptor_from_value).collect::<Result<_>>()?;
        return Ok(ManifestOrIndex::Index(ManifestIndex { media_type, manifests }));
    }

    let config = value
        .get("config")
        .ok_or_else(|| Error::MalformedManifest("missing 'config' field".to_string()))?;
    let config = descriptor_from_value(config)?;
    let layers = value
        .get("layers")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedManifest("missing 'layers' field".to_string()))?
        .iter()
        .map(descriptor_from_value)
        .collect::<Result<_>>()?;
    let media_type = value
        .get("mediaType")
        .and_then(Value::as_str)
        .unwrap_or("application/vnd.oci.image.manifest.v1+json")
        .to_string();
    let annotations = value
        .get("annotations")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, val)| val.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_else(BTreeMap::new);

    Ok(ManifestOrIndex::Manifest(Manifest {
        media_type,
        config,
        layers,
        annotations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_platform_manifest() {
        let raw = serde_json::json!({
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": format!("sha256:{}", "a".repeat(64)),
                "size": 100,
            },
            "layers": [{
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": format!("sha256:{}", "b".repeat(64)),
                "size": 200,
            }],
        })
        .to_string();

        let parsed = manifest_or_index_from_bytes(raw.as_bytes()).unwrap();
        match parsed {
            ManifestOrIndex::Manifest(m) => {
                assert_eq!(m.layers.len(), 1);
                assert_eq!(m.config.size, 100);
            }
            ManifestOrIndex::Index(_) => panic!("expected manifest"),
        }
    }

    #[test]
    fn parses_image_index() {
        let raw = serde_json::json!({
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": format!("sha256:{}", "c".repeat(64)),
                "size": 300,
            }],
        })
        .to_string();

        let parsed = manifest_or_index_from_bytes(raw.as_bytes()).unwrap();
        assert!(parsed.is_index());
    }

    #[test]
    fn rejects_manifest_missing_config() {
        let raw = serde_json::json!({ "mediaType": "x", "layers": [] }).to_string();
        assert!(manifest_or_index_from_bytes(raw.as_bytes()).is_err());
    }
}
