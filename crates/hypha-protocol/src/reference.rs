//! URL-keyed identities for hosts and processes.
//!
//! A [`Reference`] names either a Host or a Process. The hierarchy lives in
//! the URL path: `proc://a/x/y` is a child of `proc://a/x`, which is a child
//! of the root `proc://a`. Equality, hashing and the wire form all go through
//! the canonical URL string, which is computed once at construction.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("invalid reference url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("reference url '{0}' has no authority")]
    MissingAuthority(String),

    #[error("root reference '{0}' has no parent")]
    RootHasNoParent(String),

    #[error("invalid child segment '{0}'")]
    InvalidSegment(String),
}

/// What a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Host,
    Process,
}

/// Immutable identity of a host or process.
///
/// A reference `a` owns a reference `b` when both share scheme and authority
/// and `a`'s path segments are a prefix of `b`'s. Ownership is what the
/// transport layer routes on: a packet is delivered to the host whose
/// reference owns the packet's target path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    kind: ReferenceKind,
    url: Url,
}

impl Reference {
    /// Parse a host reference from an absolute URL.
    pub fn host(url: &str) -> Result<Self, ReferenceError> {
        Self::parse(ReferenceKind::Host, url)
    }

    /// Parse a process reference from an absolute URL.
    pub fn process(url: &str) -> Result<Self, ReferenceError> {
        Self::parse(ReferenceKind::Process, url)
    }

    pub fn parse(kind: ReferenceKind, raw: &str) -> Result<Self, ReferenceError> {
        let parsed = Url::parse(raw).map_err(|source| ReferenceError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;
        if !parsed.has_host() {
            return Err(ReferenceError::MissingAuthority(raw.to_string()));
        }
        let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();
        let url = rebuild(&parsed, &segments)?;
        Ok(Self { kind, url })
    }

    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The canonical string form: scheme + authority + normalized path,
    /// no trailing slash, no query or fragment.
    pub fn canonical(&self) -> &str {
        self.url.as_str()
    }

    /// Non-empty path segments, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.url.path().split('/').filter(|s| !s.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.segments().next().is_none()
    }

    /// The reference one path segment up. Roots have no parent.
    pub fn parent(&self) -> Result<Reference, ReferenceError> {
        let mut segments: Vec<&str> = self.segments().collect();
        if segments.pop().is_none() {
            return Err(ReferenceError::RootHasNoParent(self.canonical().to_string()));
        }
        Ok(Self {
            kind: self.kind,
            url: rebuild(&self.url, &segments)?,
        })
    }

    /// The reference one path segment down. `name` must be a single
    /// non-empty segment.
    pub fn child(&self, name: &str) -> Result<Reference, ReferenceError> {
        if name.is_empty() || name.contains('/') {
            return Err(ReferenceError::InvalidSegment(name.to_string()));
        }
        let raw = format!("{}/{}", self.canonical(), name);
        let url = Url::parse(&raw).map_err(|source| ReferenceError::InvalidUrl {
            url: raw.clone(),
            source,
        })?;
        let child = Self {
            kind: self.kind,
            url,
        };
        // Segments that re-parse into queries, fragments or extra slashes
        // would silently change the hierarchy.
        if child.segments().count() != self.segments().count() + 1
            || child.segments().last() != Some(name)
        {
            return Err(ReferenceError::InvalidSegment(name.to_string()));
        }
        Ok(child)
    }

    /// Whether `other` sits inside this reference's subtree (prefix match on
    /// whole path segments, so `proc://a/x` does not own `proc://a/xy`).
    pub fn owns(&self, other: &Reference) -> bool {
        if self.url.scheme() != other.url.scheme()
            || self.url.authority() != other.url.authority()
        {
            return false;
        }
        let mine: Vec<&str> = self.segments().collect();
        let theirs: Vec<&str> = other.segments().collect();
        theirs.len() >= mine.len() && mine.iter().zip(theirs.iter()).all(|(a, b)| a == b)
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical())
    }
}

fn rebuild(from: &Url, segments: &[&str]) -> Result<Url, ReferenceError> {
    let mut raw = format!("{}://{}", from.scheme(), from.authority());
    if !segments.is_empty() {
        raw.push('/');
        raw.push_str(&segments.join("/"));
    }
    Url::parse(&raw).map_err(|source| ReferenceError::InvalidUrl { url: raw, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalizes_trailing_slash() {
        let a = Reference::process("proc://a/").unwrap();
        let b = Reference::process("proc://a").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "proc://a");
    }

    #[test]
    fn test_child_then_parent_round_trips() {
        let root = Reference::process("proc://a").unwrap();
        let child = root.child("echo").unwrap();
        assert_eq!(child.canonical(), "proc://a/echo");
        assert_eq!(child.parent().unwrap(), root);
    }

    #[test]
    fn test_parent_of_nested() {
        let y = Reference::process("proc://a/x/y").unwrap();
        let x = Reference::process("proc://a/x").unwrap();
        assert_eq!(y.parent().unwrap(), x);
    }

    #[test]
    fn test_root_has_no_parent() {
        let root = Reference::process("proc://a").unwrap();
        assert!(matches!(
            root.parent(),
            Err(ReferenceError::RootHasNoParent(_))
        ));
    }

    #[test]
    fn test_rejects_relative_url() {
        assert!(Reference::process("not-a-url").is_err());
    }

    #[test]
    fn test_rejects_bad_child_segments() {
        let root = Reference::process("proc://a").unwrap();
        assert!(root.child("").is_err());
        assert!(root.child("x/y").is_err());
    }

    #[test]
    fn test_owns_is_segment_wise() {
        let a = Reference::process("proc://a/x").unwrap();
        let inside = Reference::process("proc://a/x/y").unwrap();
        let sibling = Reference::process("proc://a/xy").unwrap();
        assert!(a.owns(&inside));
        assert!(a.owns(&a));
        assert!(!a.owns(&sibling));
        assert!(!sibling.owns(&a));
    }

    #[test]
    fn test_owns_requires_same_authority() {
        let a = Reference::process("proc://a").unwrap();
        let b = Reference::process("proc://b/x").unwrap();
        assert!(!a.owns(&b));
    }

    #[test]
    fn test_host_owns_process_subtree() {
        let host = Reference::host("proc://a").unwrap();
        let process = Reference::process("proc://a/x/y").unwrap();
        assert!(host.owns(&process));
    }

    #[test]
    fn test_serde_round_trip() {
        let original = Reference::process("proc://a/x").unwrap();
        let encoded = serde_json::to_string(&original).unwrap();
        let decoded: Reference = serde_json::from_str(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_display_is_canonical() {
        let r = Reference::process("proc://cluster/workers/w1").unwrap();
        assert_eq!(format!("{}", r), "proc://cluster/workers/w1");
    }
}
