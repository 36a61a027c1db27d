// Conduit - local-first knowledge base daemon for AI tools.
//
// Dual lexical/vector/graph indexing over registered sources, hybrid
// retrieval, graph-augmented query, and a lifecycle engine supervising
// sandboxed connector instances. Served over a Unix domain socket (and
// optionally TCP) via axum, with a read-only MCP surface alongside it.

pub mod builders;
pub mod chunker;
pub mod config;
pub mod contracts;
pub mod embeddings;
pub mod errors;
pub mod events;
pub mod extractor;
pub mod extractors;
pub mod graph_query;
pub mod graph_store;
pub mod http_server;
pub mod http_types;
pub mod indexer;
pub mod kernel;
pub mod lifecycle;
pub mod observability;
pub mod patterns;
pub mod policy;
pub mod query_sanitization;
pub mod retrieval;
pub mod retry;
pub mod source_manager;
pub mod store;
pub mod types;
pub mod validation;
pub mod vector_store;

#[cfg(feature = "container-runtime")]
pub mod container_runtime;

/// Model Context Protocol surface: six read-only tools over the same
/// engines the HTTP API uses.
#[cfg(feature = "mcp-server")]
pub mod mcp;

pub use errors::{ConduitError, Result};

pub use config::{BackendToggles, DaemonConfig};

pub use types::{
    AuditStatus, BindingScope, BindingStatus, ConnectorStatus, RelationType, SourceKind,
    SourceStatus, SyncMode, ValidatedBindingId, ValidatedChunkId, ValidatedDocumentId,
    ValidatedInstanceId, ValidatedPath, ValidatedPattern, ValidatedSearchQuery, ValidatedSourceId,
    ValidatedTitle,
};

pub use contracts::{
    ClientBinding, ConnectorInstance, EmbeddingProvider, Extractor, GraphStore, HealthStatus,
    KbDocument, LexicalHit, RuntimeProvider, Source, Store, StoreStats, VectorStore,
};

pub use builders::SourceBuilder;
pub use store::FileStore;

pub use events::{Envelope, Event, EventBus};
pub use indexer::Indexer;
pub use source_manager::{SourceManager, SyncOptions, SyncReport};

pub use retrieval::{RetrievalEngine, SearchHit, SearchMode, SearchParams, SearchResponse};
pub use graph_query::{GraphQueryEngine, GraphQueryRequest, GraphQueryResponse};

pub use policy::{PermissionSet, PolicyConfig, PolicyEngine};
pub use lifecycle::LifecycleManager;

pub use kernel::{DaemonKernel, KernelBackends, KernelConfig};
pub use http_server::{build_router, AppState};

#[cfg(feature = "mcp-server")]
pub use mcp::{McpServer, ToolContext};
