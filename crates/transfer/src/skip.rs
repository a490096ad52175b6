//! Records of blobs deliberately left uncopied (spec.md §4.6: "the
//! orchestrator surfaces a summary listing skipped descriptors").

use imgshuttle_core::Digest;

/// A blob that was not copied to the destination, and why.
#[derive(Debug, Clone)]
pub struct SkippedDescriptor {
    /// The blob's digest.
    pub digest: Digest,
    /// The blob's media type.
    pub media_type: String,
    /// The source repository it was found in.
    pub repo_ref: String,
    /// Human-readable reason for the skip.
    pub reason: String,
}
