//! Thread-safe, snapshot-on-read sets of images (component C2).
//!
//! Both sets are mutex-guarded `BTreeMap`s rather than a lock-free
//! concurrent map: runs are short-lived and critical sections are O(1),
//! so a single mutex with a `BTreeMap` (ordering falls out for free) beats
//! the complexity of a sharded map at the sizes this tool sees. spec.md §9
//! calls this out explicitly as the expected evolution path if that ever
//! changes.

use std::collections::BTreeMap;
use std::sync::Mutex;

use imgshuttle_core::{ProcessedImage, UnprocessedImageRef};

/// Concurrent set of images discovered but not yet copied.
#[derive(Default)]
pub struct UnprocessedSet {
    inner: Mutex<UnprocessedInner>,
}

#[derive(Default)]
struct UnprocessedInner {
    // Keyed by (digest_ref string, tag string) so that plain BTreeMap
    // iteration order is "ascending by digest_ref_string, then tag" —
    // exactly spec.md §3's ordering requirement, with no extra sort step.
    by_key: BTreeMap<(String, String), UnprocessedImageRef>,
    // digest_ref string -> full keys sharing it, for FindByURL (spec.md
    // §4.2: "matches on digest_ref only, tag ignored").
    by_digest_ref: BTreeMap<String, Vec<(String, String)>>,
}

impl UnprocessedSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an entry. Last writer wins, since equivalent
    /// references can be rediscovered through different traversal paths
    /// (spec.md §4.2).
    pub fn add(&self, entry: UnprocessedImageRef) {
        let digest_ref = entry.digest_ref.to_string();
        let key = (digest_ref.clone(), entry.tag.clone().unwrap_or_default());

        let mut inner = self.inner.lock().expect("unprocessed set mutex poisoned");
        if inner.by_key.insert(key.clone(), entry).is_none() {
            inner.by_digest_ref.entry(digest_ref).or_default().push(key);
        }
    }

    /// `true` if an entry with this identity key (digest_ref + tag) is
    /// already present — used by the closure resolver to break cycles.
    #[must_use]
    pub fn contains_identity(&self, digest_ref: &str, tag: Option<&str>) -> bool {
        let inner = self.inner.lock().expect("unprocessed set mutex poisoned");
        inner
            .by_key
            .contains_key(&(digest_ref.to_string(), tag.unwrap_or_default().to_string()))
    }

    /// All entries currently in the set, sorted ascending by digest_ref.
    #[must_use]
    pub fn all(&self) -> Vec<UnprocessedImageRef> {
        let inner = self.inner.lock().expect("unprocessed set mutex poisoned");
        inner.by_key.values().cloned().collect()
    }

    /// Exact count at the moment of the call.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("unprocessed set mutex poisoned").by_key.len()
    }

    /// `true` if the set has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries whose `digest_ref` matches `key`, irrespective of tag.
    #[must_use]
    pub fn find_by_url(&self, key: &str) -> Vec<UnprocessedImageRef> {
        let inner = self.inner.lock().expect("unprocessed set mutex poisoned");
        inner
            .by_digest_ref
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|k| inner.by_key.get(k).cloned())
            .collect()
    }
}

/// Concurrent set of images that have been copied to the destination.
#[derive(Default)]
pub struct ProcessedSet {
    inner: Mutex<ProcessedInner>,
}

#[derive(Default)]
struct ProcessedInner {
    // Keyed by destination digest_ref so that All() enumerates in
    // ascending destination-digest order (spec.md §5).
    by_key: BTreeMap<(String, String), ProcessedImage>,
    // source digest_ref string -> destination keys, for FindByURL
    // (spec.md §8: "FindByURL(src_digest) returns the entry whose source
    // digest equals src_digest, independently of tag").
    by_source_digest_ref: BTreeMap<String, Vec<(String, String)>>,
}

impl ProcessedSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a copied image.
    pub fn add(&self, entry: ProcessedImage) {
        let dest_digest_ref = entry.digest_ref.to_string();
        let source_digest_ref = entry.unprocessed.digest_ref.to_string();
        let key = (
            dest_digest_ref,
            entry.digest_ref.tag().unwrap_or_default().to_string(),
        );

        let mut inner = self.inner.lock().expect("processed set mutex poisoned");
        if inner.by_key.insert(key.clone(), entry).is_none() {
            inner
                .by_source_digest_ref
                .entry(source_digest_ref)
                .or_default()
                .push(key);
        }
    }

    /// All entries, sorted ascending by destination digest_ref.
    #[must_use]
    pub fn all(&self) -> Vec<ProcessedImage> {
        let inner = self.inner.lock().expect("processed set mutex poisoned");
        inner.by_key.values().cloned().collect()
    }

    /// Exact count at the moment of the call.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("processed set mutex poisoned").by_key.len()
    }

    /// `true` if the set has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find entries whose *source* digest_ref equals `src_digest_ref`,
    /// independently of tag (used by the lock-output writer, spec.md §4.8).
    #[must_use]
    pub fn find_by_url(&self, src_digest_ref: &str) -> Vec<ProcessedImage> {
        let inner = self.inner.lock().expect("processed set mutex poisoned");
        inner
            .by_source_digest_ref
            .get(src_digest_ref)
            .into_iter()
            .flatten()
            .filter_map(|k| inner.by_key.get(k).cloned())
            .collect()
    }

    /// The single entry whose labels mark it as the root bundle, if any.
    /// Returns `None` if none found, and the caller is responsible for
    /// treating more than one as `internal-inconsistency` (there should
    /// never be more than one root-labeled seed).
    #[must_use]
    pub fn root_bundle(&self) -> Option<ProcessedImage> {
        let inner = self.inner.lock().expect("processed set mutex poisoned");
        inner.by_key.values().find(|p| p.is_root_bundle()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgshuttle_core::ImageReference;
    use std::collections::BTreeMap as Map;

    fn unprocessed(repo: &str, digest_hex: &str, tag: Option<&str>) -> UnprocessedImageRef {
        let r = ImageReference::parse_digested(&format!("{repo}@sha256:{digest_hex}")).unwrap();
        UnprocessedImageRef::new(r, tag.map(str::to_string), Map::new(), repo.to_string()).unwrap()
    }

    fn hex(n: u8) -> String {
        format!("{:02x}", n).repeat(32)
    }

    #[test]
    fn all_is_sorted_ascending_by_digest_ref() {
        let set = UnprocessedSet::new();
        set.add(unprocessed("registry.b/app", &hex(2), None));
        set.add(unprocessed("registry.a/app", &hex(1), None));

        let all = set.all();
        assert_eq!(all.len(), 2);
        assert!(all[0].digest_ref.to_string() < all[1].digest_ref.to_string());
    }

    #[test]
    fn add_overwrites_same_identity() {
        let set = UnprocessedSet::new();
        set.add(unprocessed("registry.a/app", &hex(1), Some("v1")));
        set.add(unprocessed("registry.a/app", &hex(1), Some("v1")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn same_digest_different_repo_are_distinct() {
        let set = UnprocessedSet::new();
        set.add(unprocessed("registry.a/app", &hex(1), None));
        set.add(unprocessed("registry.b/app", &hex(1), None));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn find_by_url_ignores_tag() {
        let set = UnprocessedSet::new();
        let entry = unprocessed("registry.a/app", &hex(1), Some("v1"));
        let key = entry.digest_ref.to_string();
        set.add(entry);
        set.add(unprocessed("registry.a/app", &hex(1), Some("v2")));

        let found = set.find_by_url(&key);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn find_by_url_misses_unknown_key() {
        let set = UnprocessedSet::new();
        set.add(unprocessed("registry.a/app", &hex(1), None));
        assert!(set.find_by_url("nonexistent").is_empty());
    }

    #[test]
    fn empty_set_reports_length_zero() {
        let set = UnprocessedSet::new();
        assert_eq!(set.len(), 0);
        assert!(set.is_empty());
    }
}
