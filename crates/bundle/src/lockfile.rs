//! The `ImagesLock` document embedded in a bundle's layer (spec.md §3, §6:
//! "a layer whose content is a YAML document with `apiVersion`,
//! `kind: ImagesLock`, and `images: [{image: <digested-ref>}, ...]`.
//! Ordering is preserved.").

use serde::{Deserialize, Serialize};

/// One entry in an `ImagesLock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesLockEntry {
    /// The digested reference this entry points to.
    pub image: String,
    /// Any additional annotations carried alongside the entry, preserved
    /// verbatim across a rewrite.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub annotations: std::collections::BTreeMap<String, String>,
}

/// The embedded (or on-disk, spec.md §4.8) images lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesLock {
    /// Lockfile schema version.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Always `"ImagesLock"`.
    pub kind: String,
    /// Ordered list of image references, in the order the bundle author
    /// wrote them.
    pub images: Vec<ImagesLockEntry>,
}

impl ImagesLock {
    /// The default `apiVersion` used for lockfiles this tool writes.
    pub const API_VERSION: &'static str = "imgpkg.carvel.dev/v1alpha1";

    /// Parse an `ImagesLock` from its YAML bytes.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_slice(bytes)
    }

    /// Serialize back to YAML bytes.
    pub fn to_yaml(&self) -> Result<Vec<u8>, serde_yaml::Error> {
        serde_yaml::to_string(self).map(String::into_bytes)
    }

    /// Replace each entry's `image` field with its destination digest,
    /// looked up via `resolve`. Order and annotations are preserved
    /// (spec.md §4.3 Rewriting).
    pub fn rewritten<E, F>(&self, mut resolve: F) -> Result<Self, E>
    where
        F: FnMut(&str) -> Result<String, E>,
    {
        let images = self
            .images
            .iter()
            .map(|entry| {
                Ok(ImagesLockEntry {
                    image: resolve(&entry.image)?,
                    annotations: entry.annotations.clone(),
                })
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            images,
        })
    }
}
