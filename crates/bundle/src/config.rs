//! The slice of the OCI image config we need: its `Labels` map (spec.md
//! §4.3: "fetching the image config and inspecting for the well-known
//! bundle label").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An OCI image configuration blob, trimmed to the fields the bundle
/// detector and rewriter care about. Unknown fields round-trip via
/// `extra` so a rewrite never drops data the config author set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// The `config.Labels` map, where the bundle label lives.
    #[serde(default)]
    pub config: ConfigSection,

    /// Every other top-level field (`architecture`, `os`, `rootfs`,
    /// `history`, ...), preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The `config` object nested inside an image config blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSection {
    /// Labels set on the image, where the bundle marker lives.
    #[serde(default, rename = "Labels")]
    pub labels: BTreeMap<String, String>,

    /// Every other field of the `config` object, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ImageConfig {
    /// Parse a config blob from its JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serialize back to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// `true` if the bundle label is present and set to `"true"`.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.config.labels.get(label).map(String::as_str) == Some("true")
    }
}
