// Validated Types
//
// Strongly-typed wrappers that enforce invariants at construction time so
// that invalid ids, paths, or limits cannot flow through the pipeline.
// Mirrors the validated-newtype idiom the rest of the crate relies on.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

macro_rules! validated_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            inner: Uuid,
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    inner: Uuid::new_v4(),
                }
            }

            pub fn from_uuid(id: Uuid) -> Result<Self> {
                ensure!(!id.is_nil(), concat!(stringify!($name), " cannot be nil"));
                Ok(Self { inner: id })
            }

            pub fn parse(s: &str) -> Result<Self> {
                Self::from_uuid(Uuid::parse_str(s)?)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.inner
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.inner)
            }
        }
    };
}

validated_id!(ValidatedSourceId, "Opaque id for a registered Source.");
validated_id!(ValidatedDocumentId, "Opaque id for an indexed Document.");
validated_id!(ValidatedChunkId, "Opaque id for a Chunk.");
validated_id!(
    ValidatedInstanceId,
    "Opaque id for a Connector Instance."
);
validated_id!(ValidatedBindingId, "Opaque id for a Client Binding.");

/// A chunk id is deterministic given its document, index, and a content hash
/// prefix, so that re-indexing identical content is idempotent (spec P2).
impl ValidatedChunkId {
    pub fn derive(document_id: ValidatedDocumentId, chunk_index: usize, hash_prefix: &str) -> Self {
        let namespace = Uuid::NAMESPACE_OID;
        let name = format!("{}:{}:{}", document_id, chunk_index, hash_prefix);
        Self {
            inner: Uuid::new_v5(&namespace, name.as_bytes()),
        }
    }
}

/// A filesystem path validated to be non-empty, UTF-8, and free of
/// directory traversal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedPath {
    inner: PathBuf,
}

impl ValidatedPath {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("path is not valid UTF-8"))?;
        crate::validation::validate_relative_path(path_str)?;
        Ok(Self {
            inner: path.to_path_buf(),
        })
    }

    pub fn as_path(&self) -> &Path {
        &self.inner
    }

    pub fn as_str(&self) -> &str {
        self.inner.to_str().expect("ValidatedPath is always UTF-8")
    }
}

impl fmt::Display for ValidatedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A non-empty document/source title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedTitle(String);

impl ValidatedTitle {
    pub fn new(title: impl Into<String>) -> Result<Self> {
        let title = title.into();
        ensure!(!title.trim().is_empty(), "title cannot be empty");
        ensure!(title.len() < 1024, "title too long");
        Ok(Self(title))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A search/query limit clamped to a sane range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedLimit(usize);

impl ValidatedLimit {
    pub fn new(limit: usize) -> Result<Self> {
        ensure!(limit > 0 && limit <= 1000, "limit must be in 1..=1000");
        Ok(Self(limit))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for ValidatedLimit {
    fn default() -> Self {
        Self(10)
    }
}

/// A glob-style include/exclude pattern, auto-repaired when malformed
/// (spec.md §4.7 / §8 scenario 6: `.pdf` -> `*.pdf`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedPattern(String);

impl ValidatedPattern {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let raw = pattern.into();
        ensure!(!raw.trim().is_empty(), "pattern cannot be empty");
        Ok(Self(crate::patterns::normalize_pattern(&raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A non-empty search query string with whitespace collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedSearchQuery(String);

impl ValidatedSearchQuery {
    pub fn new(query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        let trimmed = query.split_whitespace().collect::<Vec<_>>().join(" ");
        ensure!(!trimmed.is_empty(), "query cannot be empty");
        Ok(Self(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Kind of a registered Source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Folder,
    Git,
}

/// How a Source's tree is kept up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    Watch,
    Manual,
    Scheduled,
}

/// Lifecycle status of a Source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    Active,
    Paused,
    Syncing,
    Error,
}

/// Relationship types between graph entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    WorksAt,
    Mentions,
    LocatedIn,
    PartOf,
    RelatedTo,
    Custom(String),
}

/// Status of a Connector Instance (spec.md §4.12 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Created,
    Auditing,
    Installed,
    Blocked,
    Failed,
    Starting,
    Running,
    Degraded,
    Stopping,
    Stopped,
    Removing,
    Removed,
    Updating,
    Restarting,
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Scope at which a Client Binding applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingScope {
    Project,
    User,
    Workspace,
}

/// Status of a Client Binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingStatus {
    Active,
    Invalid,
    Removed,
}

/// Outcome of an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    Pass,
    Warn,
    Block,
}

/// Severity of an individual audit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_deterministic() {
        let doc = ValidatedDocumentId::new();
        let a = ValidatedChunkId::derive(doc, 0, "abcd1234");
        let b = ValidatedChunkId::derive(doc, 0, "abcd1234");
        assert_eq!(a, b);
        let c = ValidatedChunkId::derive(doc, 1, "abcd1234");
        assert_ne!(a, c);
    }

    #[test]
    fn validated_limit_rejects_zero_and_oversized() {
        assert!(ValidatedLimit::new(0).is_err());
        assert!(ValidatedLimit::new(1001).is_err());
        assert!(ValidatedLimit::new(50).is_ok());
    }

    #[test]
    fn validated_search_query_collapses_whitespace() {
        let q = ValidatedSearchQuery::new("  hello   world  ").unwrap();
        assert_eq!(q.as_str(), "hello world");
        assert!(ValidatedSearchQuery::new("   ").is_err());
    }
}
