//! The `BundleLock` on-disk document (spec.md §3, §4.8).

use serde::{Deserialize, Serialize};

/// The bundle a `BundleLock` points at: its destination reference, split
/// into image (`registry/repository@digest`) and tag, matching the shape
/// carvel's `BundleLock` uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLockBundle {
    /// Destination digested reference (`registry/repository@sha256:...`).
    pub image: String,
    /// Destination tag, as assigned by the tag generator.
    pub tag: String,
}

/// Emitted instead of an `ImagesLock` when the copied set's root bundle is
/// found (spec.md §3: `BundleLock { api_version, kind="BundleLock",
/// bundle: {image, tag} }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLock {
    /// Lockfile schema version.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Always `"BundleLock"`.
    pub kind: String,
    /// The bundle this lock points at.
    pub bundle: BundleLockBundle,
}

impl BundleLock {
    /// The `apiVersion` this tool writes.
    pub const API_VERSION: &'static str = "imgpkg.carvel.dev/v1alpha1";

    /// Build a `BundleLock` for a destination image/tag pair.
    #[must_use]
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            api_version: Self::API_VERSION.to_string(),
            kind: "BundleLock".to_string(),
            bundle: BundleLockBundle {
                image: image.into(),
                tag: tag.into(),
            },
        }
    }

    /// Serialize to YAML bytes.
    pub fn to_yaml(&self) -> Result<Vec<u8>, serde_yaml::Error> {
        serde_yaml::to_string(self).map(String::into_bytes)
    }

    /// Parse from YAML bytes.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_yaml() {
        let lock = BundleLock::new("registry.b/app@sha256:abc", "v1.imgpkg");
        let bytes = lock.to_yaml().unwrap();
        let parsed = BundleLock::from_yaml(&bytes).unwrap();
        assert_eq!(lock, parsed);
    }

    #[test]
    fn serializes_with_expected_keys() {
        let lock = BundleLock::new("registry.b/app@sha256:abc", "v1.imgpkg");
        let yaml = String::from_utf8(lock.to_yaml().unwrap()).unwrap();
        assert!(yaml.contains("apiVersion"));
        assert!(yaml.contains("kind: BundleLock"));
        assert!(yaml.contains("image: registry.b/app@sha256:abc"));
    }
}
