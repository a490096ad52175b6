//! The registry capability trait (spec.md §9 Design Notes: "duck-typed
//! polymorphism over... registry").
//!
//! Expressed as a small async trait rather than a concrete client type so
//! the transfer engine and closure resolver can run unmodified against a
//! live registry or a tar-backed source (spec.md §4.7: "on push to a
//! destination, the same dedup/mount logic as §4.6 applies").

use async_trait::async_trait;
use imgshuttle_core::{Descriptor, Digest, ManifestOrIndex};

use crate::Result;

/// Outcome of attempting a cross-repository blob mount (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// The blob was attached to the destination repository without
    /// re-uploading.
    Mounted,
    /// The registry does not support mounting here (different hosts, or
    /// the registry rejected it); the caller must fall back to streaming.
    Unsupported,
}

/// A manifest as fetched from a registry: both the parsed form (for
/// traversal/bundle-detection logic) and the exact bytes it was served
/// as. Pushes always use `raw` so the destination digest matches the
/// source digest byte-for-byte, unless a caller (the bundle detector)
/// deliberately constructs new bytes to rewrite a lockfile.
#[derive(Debug, Clone)]
pub struct FetchedManifest {
    /// The parsed manifest or index.
    pub parsed: ManifestOrIndex,
    /// The exact bytes the registry served.
    pub raw: Vec<u8>,
    /// The manifest's content-type / media type.
    pub media_type: String,
}

/// Read/write access to a single logical registry, or a registry-shaped
/// stand-in (a tar archive opened for reading, spec.md §4.7).
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Fetch a manifest or image index by digested reference.
    async fn pull_manifest(&self, repo_ref: &str, digest: &Digest) -> Result<FetchedManifest>;

    /// Fetch a blob's full contents. Used for config blobs and embedded
    /// lockfile layers, which are expected to be small; layer blobs
    /// destined for the destination go through `pull_blob_to_writer`
    /// instead so large layers never round-trip through memory.
    async fn pull_blob(&self, repo_ref: &str, digest: &Digest) -> Result<Vec<u8>>;

    /// Stream a blob's contents into `writer` (used when relaying a large
    /// layer straight into a destination push or a tar entry).
    async fn pull_blob_to_writer(
        &self,
        repo_ref: &str,
        descriptor: &Descriptor,
        writer: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    ) -> Result<()>;

    /// `true` if `repo_ref` already has a blob with this digest
    /// (spec.md §4.6 step 3: "if the destination already has the blob at
    /// that digest (HEAD returns 200), skip").
    async fn blob_exists(&self, repo_ref: &str, digest: &Digest) -> Result<bool>;

    /// Upload a blob's contents.
    async fn push_blob(&self, repo_ref: &str, digest: &Digest, data: Vec<u8>) -> Result<()>;

    /// Attempt a cross-repository mount of an existing blob, when source
    /// and destination share the same registry host.
    async fn mount_blob(
        &self,
        to_repo_ref: &str,
        from_repo_ref: &str,
        digest: &Digest,
    ) -> Result<MountOutcome>;

    /// Push raw manifest bytes, returning the digest the registry stored
    /// it under (expected to equal `Digest::of(raw)`, but callers should
    /// trust the returned value rather than assume it).
    async fn push_manifest(&self, repo_ref: &str, media_type: &str, raw: &[u8]) -> Result<Digest>;

    /// Fetch OCI referrers for a digest (used by signature discovery
    /// when the signature fetcher is referrers-based rather than
    /// tag-based).
    async fn referrers(&self, repo_ref: &str, digest: &Digest) -> Result<Vec<Descriptor>>;
}
