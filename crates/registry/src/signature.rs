//! Signature discovery (spec.md §4.4 step 3, §9 Design Notes).
//!
//! The cosign signature scheme itself is out of scope (spec.md §1): this
//! crate only defines the capability the closure resolver calls through.
//! A real implementation is expected to live outside this workspace and
//! be wired in at the orchestrator; `NoopSignatureFetcher` satisfies the
//! contract when signatures are disabled.

use async_trait::async_trait;
use imgshuttle_core::Digest;

use crate::Result;

/// A signature or attestation artifact discovered for an image digest,
/// represented the same way any other copyable image is (spec.md §4.4:
/// "returned signature artifacts are added to the set as ordinary image
/// entries").
#[derive(Debug, Clone)]
pub struct SignatureArtifact {
    /// The digested reference of the signature manifest itself.
    pub reference: String,
}

/// Looks up signature/attestation artifacts for a given image digest.
#[async_trait]
pub trait SignatureFetcher: Send + Sync {
    /// Return any signature artifacts associated with `digest` in
    /// `repo_ref`. An empty vec means "none found", not an error.
    async fn fetch_signatures(
        &self,
        repo_ref: &str,
        digest: &Digest,
    ) -> Result<Vec<SignatureArtifact>>;
}

/// A fetcher that never finds anything, used when signature inclusion is
/// disabled (spec.md §6: "signature inclusion boolean").
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSignatureFetcher;

#[async_trait]
impl SignatureFetcher for NoopSignatureFetcher {
    async fn fetch_signatures(
        &self,
        _repo_ref: &str,
        _digest: &Digest,
    ) -> Result<Vec<SignatureArtifact>> {
        Ok(Vec::new())
    }
}
