//! Standalone MCP server entrypoint. Serves the six read-only tools
//! (`conduit::mcp`) over HTTP without the rest of the daemon surface,
//! for MCP clients that only need search/graph-query and not source or
//! instance management.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use conduit::config::DaemonConfig;
use conduit::contracts::Store;
use conduit::graph_query::GraphQueryEngine;
use conduit::mcp::{McpServer, ToolContext};
use conduit::retrieval::RetrievalEngine;
use conduit::store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = DaemonConfig::from_file(config_path.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let store: Arc<dyn Store> = Arc::new(FileStore::open(config.data_dir.clone()).await?);

    let mut retrieval = RetrievalEngine::new(store.clone());
    let mut graph = GraphQueryEngine::new(store.clone());

    if config.backends.vector {
        let vector_store = Arc::new(conduit::vector_store::InProcessVectorStore::new());
        retrieval = retrieval.with_vector_store(vector_store);
        retrieval = retrieval.with_embedder(Arc::new(conduit::embeddings::HashEmbeddingProvider::new(
            conduit::embeddings::EmbeddingConfig::default(),
        )));
    }
    if config.backends.graph {
        graph = graph.with_graph_store(Arc::new(conduit::graph_store::PetGraphStore::new()));
        graph = graph.with_extractor(Arc::new(conduit::extractor::NullExtractor));
    }

    let ctx = ToolContext { store, retrieval: Arc::new(retrieval), graph: Arc::new(graph) };
    let server = Arc::new(McpServer::new(ctx));

    let addr = config.http_addr.unwrap_or_else(|| "127.0.0.1:8765".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr, "mcp server listening");

    axum::serve(listener, server.router()).await?;
    Ok(())
}
