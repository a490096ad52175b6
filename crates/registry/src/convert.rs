//! Conversions between `oci-distribution`'s manifest types and
//! `imgshuttle-core`'s registry-agnostic ones.

use std::collections::BTreeMap;

use imgshuttle_core::{Descriptor, Digest, Manifest, ManifestIndex, ManifestOrIndex};
use oci_distribution::manifest::{OciDescriptor, OciImageIndex, OciImageManifest};

use crate::Result;

pub(crate) fn descriptor(d: &OciDescriptor) -> Result<Descriptor> {
    Ok(Descriptor {
        media_type: d.media_type.clone(),
        digest: Digest::parse(&d.digest)?,
        size: u64::try_from(d.size).unwrap_or(0),
        annotations: d
            .annotations
            .clone()
            .map(BTreeMap::from_iter)
            .unwrap_or_default(),
    })
}

pub(crate) fn manifest(m: &OciImageManifest) -> Result<Manifest> {
    Ok(Manifest {
        media_type: m
            .media_type
            .clone()
            .unwrap_or_else(|| "application/vnd.oci.image.manifest.v1+json".to_string()),
        config: descriptor(&m.config)?,
        layers: m.layers.iter().map(descriptor).collect::<Result<_>>()?,
        annotations: m
            .annotations
            .clone()
            .map(BTreeMap::from_iter)
            .unwrap_or_default(),
    })
}

pub(crate) fn manifest_index(i: &OciImageIndex) -> Result<ManifestIndex> {
    Ok(ManifestIndex {
        media_type: i
            .media_type
            .clone()
            .unwrap_or_else(|| "application/vnd.oci.image.index.v1+json".to_string()),
        manifests: i.manifests.iter().map(descriptor).collect::<Result<_>>()?,
    })
}

/// Convert an `oci_distribution::client::OciManifest` (the enum the
/// client hands back from a manifest fetch) into our own
/// `ManifestOrIndex`.
pub(crate) fn manifest_or_index(m: &oci_distribution::client::OciManifest) -> Result<ManifestOrIndex> {
    match m {
        oci_distribution::client::OciManifest::Image(img) => Ok(ManifestOrIndex::Manifest(manifest(img)?)),
        oci_distribution::client::OciManifest::ImageIndex(idx) => {
            Ok(ManifestOrIndex::Index(manifest_index(idx)?))
        }
    }
}
