// Core entities and the Persistent Store contract (spec.md §3, §4.1).
//
// `Storage` implementations never hold a write lock across an external
// backend call (spec.md §5): callers stage rows in memory, commit a short
// transaction, then call out to vector/graph/embedding backends.

pub mod embedding;
pub mod extractor;
pub mod graph;
pub mod runtime;
pub mod vector;

pub use embedding::EmbeddingProvider;
pub use extractor::Extractor;
pub use graph::GraphStore;
pub use runtime::RuntimeProvider;
pub use vector::VectorStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::Result;
use crate::types::{
    AuditStatus, BindingScope, BindingStatus, ConnectorStatus, Severity, SourceKind, SourceStatus,
    SyncMode, ValidatedBindingId, ValidatedChunkId, ValidatedDocumentId, ValidatedInstanceId,
    ValidatedPath, ValidatedPattern, ValidatedSourceId, ValidatedTitle,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: ValidatedSourceId,
    pub display_name: String,
    pub root_path: ValidatedPath,
    pub kind: SourceKind,
    pub include_patterns: Vec<ValidatedPattern>,
    pub exclude_patterns: Vec<ValidatedPattern>,
    pub sync_mode: SyncMode,
    pub status: SourceStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub document_count: usize,
    pub chunk_count: usize,
    pub byte_count: u64,
}

impl Source {
    pub fn new(
        display_name: impl Into<String>,
        root_path: ValidatedPath,
        kind: SourceKind,
        include_patterns: Vec<ValidatedPattern>,
        exclude_patterns: Vec<ValidatedPattern>,
        sync_mode: SyncMode,
    ) -> Self {
        Self {
            id: ValidatedSourceId::new(),
            display_name: display_name.into(),
            root_path,
            kind,
            include_patterns,
            exclude_patterns,
            sync_mode,
            status: SourceStatus::Active,
            last_sync: None,
            document_count: 0,
            chunk_count: 0,
            byte_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbDocument {
    pub id: ValidatedDocumentId,
    pub source_id: ValidatedSourceId,
    pub path: ValidatedPath,
    pub title: ValidatedTitle,
    pub mime: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub content_hash: [u8; 32],
    pub chunk_count: usize,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ValidatedChunkId,
    pub document_id: ValidatedDocumentId,
    pub index: usize,
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorInstance {
    pub id: ValidatedInstanceId,
    pub package_id: String,
    pub package_version: String,
    pub display_name: String,
    pub status: ConnectorStatus,
    pub container_id: Option<String>,
    pub image_reference: String,
    pub config: HashMap<String, String>,
    pub granted_permissions: Option<crate::policy::PermissionSet>,
    pub audit_result: Option<AuditResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub health_status: HealthStatus,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientBinding {
    pub id: ValidatedBindingId,
    pub instance_id: ValidatedInstanceId,
    pub client_id: String,
    pub scope: BindingScope,
    pub config_file_path: ValidatedPath,
    pub change_set_id: String,
    pub status: BindingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditCheck {
    pub id: String,
    pub name: String,
    pub status: AuditStatus,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub status: AuditStatus,
    pub score: f64,
    pub checks: Vec<AuditCheck>,
}

/// A ranked hit from `search_lexical`.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk_id: ValidatedChunkId,
    pub document_id: ValidatedDocumentId,
    pub path: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub source_count: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    pub instance_count: usize,
    pub binding_count: usize,
}

/// Single source of truth for all durable metadata plus the lexical index
/// over chunk content (spec.md §4.1).
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_source(&self, source: Source) -> Result<()>;
    async fn get_source(&self, id: ValidatedSourceId) -> Result<Option<Source>>;
    async fn list_sources(&self) -> Result<Vec<Source>>;
    async fn update_source(&self, source: Source) -> Result<()>;
    /// Cascading delete: removes the source and every document/chunk/vector
    /// point/graph-provenance entry that references it (I3).
    async fn delete_source(&self, id: ValidatedSourceId) -> Result<()>;

    /// Writes the document row and all of its chunks in one transaction
    /// (spec.md §4.4 step 4), replacing any prior chunks for the document.
    async fn put_document(&self, document: KbDocument, chunks: Vec<Chunk>) -> Result<()>;
    async fn get_document(&self, id: ValidatedDocumentId) -> Result<Option<KbDocument>>;
    async fn find_document_by_path(
        &self,
        source_id: ValidatedSourceId,
        path: &str,
    ) -> Result<Option<KbDocument>>;
    async fn list_documents(&self, source_id: Option<ValidatedSourceId>) -> Result<Vec<KbDocument>>;
    async fn delete_document(&self, id: ValidatedDocumentId) -> Result<()>;

    async fn list_chunks(&self, document_id: ValidatedDocumentId) -> Result<Vec<Chunk>>;
    async fn get_chunk(&self, id: ValidatedChunkId) -> Result<Option<Chunk>>;

    async fn search_lexical(
        &self,
        query: &str,
        limit: usize,
        source_filter: Option<ValidatedSourceId>,
    ) -> Result<Vec<LexicalHit>>;

    async fn create_instance(&self, instance: ConnectorInstance) -> Result<()>;
    async fn get_instance(&self, id: ValidatedInstanceId) -> Result<Option<ConnectorInstance>>;
    async fn list_instances(&self) -> Result<Vec<ConnectorInstance>>;
    async fn update_instance(&self, instance: ConnectorInstance) -> Result<()>;
    async fn delete_instance(&self, id: ValidatedInstanceId) -> Result<()>;

    async fn create_binding(&self, binding: ClientBinding) -> Result<()>;
    async fn list_bindings(&self, instance_id: ValidatedInstanceId) -> Result<Vec<ClientBinding>>;
    async fn update_binding(&self, binding: ClientBinding) -> Result<()>;
    async fn delete_binding(&self, id: ValidatedBindingId) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Runs any pending schema migrations. Idempotent: already-applied
    /// migrations are skipped.
    async fn migrate(&self) -> Result<()>;

    /// Flush all pending writes to durable storage.
    async fn sync(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SourceKind, SyncMode};

    #[test]
    fn source_new_starts_active_with_zero_counters() {
        let source = Source::new(
            "docs",
            ValidatedPath::new("/tmp/docs").unwrap(),
            SourceKind::Folder,
            vec![],
            vec![],
            SyncMode::Manual,
        );
        assert_eq!(source.status, SourceStatus::Active);
        assert_eq!(source.document_count, 0);
        assert!(source.last_sync.is_none());
    }
}
