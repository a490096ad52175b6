//! Destination tag naming policies (spec.md §4.5).
//!
//! Expressed as a capability trait per spec.md §9 Design Notes
//! ("duck-typed polymorphism over... tag generators") so the transfer
//! engine is indifferent to which policy is active.

#![warn(missing_docs)]

use imgshuttle_core::ImageReference;

/// The portion of a repo-based tag preceding `-sha256` is truncated to
/// at most this many characters (spec.md §4.5, §8 invariant).
const MAX_SLUG_LEN: usize = 49;

/// The suffix every generated tag carries, marking it as
/// imgshuttle-assigned rather than user-chosen.
const SUFFIX: &str = ".imgpkg";

/// Produces a destination tag for a source image reference.
pub trait TagGenerator: Send + Sync {
    /// Generate the destination tag. `source` must carry a digest;
    /// its `tag()` (if any) and `repository()` feed the naming policy.
    fn generate(&self, source: &ImageReference) -> String;
}

/// Source tag if present, else `sha256-<digest>.imgpkg` (spec.md §4.5
/// "Default").
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTagGenerator;

impl TagGenerator for DefaultTagGenerator {
    fn generate(&self, source: &ImageReference) -> String {
        if let Some(tag) = source.tag() {
            return tag.to_string();
        }
        digest_shorthand(source)
    }
}

/// `<slugified-source-path>-sha256-<digest>.imgpkg` (spec.md §4.5
/// "Repo-based").
#[derive(Debug, Default, Clone, Copy)]
pub struct RepoBasedTagGenerator;

impl TagGenerator for RepoBasedTagGenerator {
    fn generate(&self, source: &ImageReference) -> String {
        let slug = slugify(source.repository());
        let digest_hex = source
            .digest()
            .map(imgshuttle_core::Digest::hex)
            .unwrap_or_default();
        format!("{slug}-sha256-{digest_hex}{SUFFIX}")
    }
}

/// `sha256-<digest>.imgpkg`, with no repository component.
fn digest_shorthand(source: &ImageReference) -> String {
    let digest_hex = source
        .digest()
        .map(imgshuttle_core::Digest::hex)
        .unwrap_or_default();
    format!("sha256-{digest_hex}{SUFFIX}")
}

/// Replace `/` with `-`, then truncate from the front (oldest characters
/// dropped) so the result is at most [`MAX_SLUG_LEN`] bytes.
fn slugify(repository_path: &str) -> String {
    let slug = repository_path.replace('/', "-");
    if slug.len() <= MAX_SLUG_LEN {
        return slug;
    }
    let drop = slug.len() - MAX_SLUG_LEN;
    slug.chars().skip_while({
        let mut to_drop = drop;
        move |_| {
            if to_drop > 0 {
                to_drop -= 1;
                true
            } else {
                false
            }
        }
    })
    .collect()
}
