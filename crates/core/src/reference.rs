//! Image reference parsing and normalization (component C1).
//!
//! Parses strings of the form `host[:port]/repo[/subrepo...]@sha256:<hex>`
//! and `host[:port]/repo[/subrepo...]:tag`, optionally both at once.

use std::fmt;

use crate::digest::Digest;
use crate::{Error, Result};

/// A parsed, normalized registry reference.
///
/// Exactly one piece of identity is load-bearing for content addressing:
/// `digest`. `tag` is carried for display and destination tag derivation
/// but two references differing only in tag are not the same identity
/// unless their digests also match (see `UnprocessedImageRef`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl ImageReference {
    /// Parse a reference string.
    pub fn parse(s: &str) -> Result<Self> {
        let (body, digest) = match s.split_once('@') {
            Some((body, digest_str)) => (body, Some(Digest::parse(digest_str)?)),
            None => (s, None),
        };

        let (path, tag) = split_tag(body);

        let Some((registry, repository)) = path.split_once('/') else {
            return Err(Error::InvalidReference(s.to_string()));
        };

        if registry.is_empty() || repository.is_empty() {
            return Err(Error::InvalidReference(s.to_string()));
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Parse a reference and require that it carry a digest.
    ///
    /// This is the constructor used at every point the spec calls for a
    /// "digested reference" — an `UnprocessedImageRef`'s `digest_ref`, a
    /// destination reference after push, etc.
    pub fn parse_digested(s: &str) -> Result<Self> {
        let r = Self::parse(s)?;
        if r.digest.is_none() {
            return Err(Error::MissingDigest(s.to_string()));
        }
        Ok(r)
    }

    /// Validate that this reference carries a digest.
    pub fn validate(&self) -> Result<()> {
        if self.digest.is_none() {
            return Err(Error::MissingDigest(self.to_string()));
        }
        Ok(())
    }

    /// The registry host (and port, if present).
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// The repository path, without registry host or tag/digest.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// `registry/repository`, with neither tag nor digest.
    #[must_use]
    pub fn repo_ref(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// The tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The digest, if any.
    #[must_use]
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Return a copy of this reference with its tag replaced.
    #[must_use]
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..self.clone()
        }
    }

    /// Return a copy of this reference with its digest replaced.
    #[must_use]
    pub fn with_digest(&self, digest: Digest) -> Self {
        Self {
            digest: Some(digest),
            ..self.clone()
        }
    }

    /// Return a copy of this reference pointed at a different repo_ref
    /// (registry + repository), keeping tag/digest.
    #[must_use]
    pub fn retargeted(&self, registry: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Split a trailing `:tag` off a `host[:port]/repo[/...]` string.
///
/// A colon only introduces a tag if it appears after the last `/` — a
/// colon before the first `/` is a registry port, not a tag separator.
fn split_tag(body: &str) -> (&str, Option<String>) {
    let last_slash = body.rfind('/');
    let last_colon = body.rfind(':');

    match (last_slash, last_colon) {
        (Some(slash), Some(colon)) if colon > slash => {
            (&body[..colon], Some(body[colon + 1..].to_string()))
        }
        (None, Some(colon)) => (&body[..colon], Some(body[colon + 1..].to_string())),
        _ => (body, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_digested_reference() {
        let r = ImageReference::parse(
            "registry.a/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        )
        .unwrap();
        assert_eq!(r.registry(), "registry.a");
        assert_eq!(r.repository(), "app");
        assert!(r.tag().is_none());
        assert!(r.digest().is_some());
    }

    #[test]
    fn parses_tagged_reference_with_port() {
        let r = ImageReference::parse("registry.foo.bar:5000/some/app:latest").unwrap();
        assert_eq!(r.registry(), "registry.foo.bar:5000");
        assert_eq!(r.repository(), "some/app");
        assert_eq!(r.tag(), Some("latest"));
    }

    #[test]
    fn parses_tagged_and_digested_reference() {
        let r = ImageReference::parse(
            "registry.a/app:v1@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        )
        .unwrap();
        assert_eq!(r.tag(), Some("v1"));
        assert!(r.digest().is_some());
    }

    #[test]
    fn missing_digest_fails_validate() {
        let r = ImageReference::parse("registry.a/app:v1").unwrap();
        assert!(r.validate().is_err());
        assert!(ImageReference::parse_digested("registry.a/app:v1").is_err());
    }

    #[test]
    fn rejects_reference_without_repository() {
        assert!(ImageReference::parse("justahost").is_err());
    }

    #[test]
    fn rejects_bad_digest() {
        assert!(ImageReference::parse("registry.a/app@sha256:short").is_err());
    }

    #[test]
    fn display_roundtrips() {
        let s = "registry.a/app:v1@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let r = ImageReference::parse(s).unwrap();
        assert_eq!(r.to_string(), s);
    }

    #[test]
    fn retargeted_keeps_tag_and_digest() {
        let r = ImageReference::parse(
            "registry.a/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        )
        .unwrap();
        let moved = r.retargeted("registry.b", "app");
        assert_eq!(moved.registry(), "registry.b");
        assert_eq!(moved.digest(), r.digest());
    }
}
