// Read-only MCP tool dispatch, grounded on `mcp/tools/search_tools.rs`'s
// tool-method-per-struct shape, collapsed here into a single dispatch
// function over a shared `ToolContext` since every tool here only reads.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::contracts::Store;
use crate::errors::{ConduitError, Result};
use crate::graph_query::{GraphQueryEngine, GraphQueryParams, GraphQueryRequest};
use crate::mcp::types::{KagQueryArgs, KbGetDocumentArgs, KbSearchArgs, KbSearchWithContextArgs};
use crate::retrieval::{RetrievalEngine, SearchParams};
use crate::types::{ValidatedDocumentId, ValidatedSourceId};

const DEFAULT_CONTEXT_CHUNKS: usize = 1;

#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn Store>,
    pub retrieval: Arc<RetrievalEngine>,
    pub graph: Arc<GraphQueryEngine>,
}

fn parse_args<T: serde::de::DeserializeOwned + Default>(args: Value) -> Result<T> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args).map_err(|e| ConduitError::ValidationError(e.to_string()))
}

pub async fn call(name: &str, args: Value, ctx: &ToolContext) -> Result<Value> {
    match name {
        "kb_search" => kb_search(args, ctx).await,
        "kb_search_with_context" => kb_search_with_context(args, ctx).await,
        "kb_list_sources" => kb_list_sources(ctx).await,
        "kb_get_document" => kb_get_document(args, ctx).await,
        "kb_stats" => kb_stats(ctx).await,
        "kag_query" => kag_query(args, ctx).await,
        other => Err(ConduitError::ValidationError(format!("unknown tool: {other}"))),
    }
}

async fn kb_search(args: Value, ctx: &ToolContext) -> Result<Value> {
    let args: KbSearchArgs = parse_args(args)?;
    let source_filter = args
        .source_id
        .map(|s| ValidatedSourceId::parse(&s))
        .transpose()
        .map_err(|e| ConduitError::ValidationError(e.to_string()))?;

    let response = ctx
        .retrieval
        .search(SearchParams { query: args.query, limit: args.limit.unwrap_or(10), source_filter, ..Default::default() })
        .await?;

    Ok(json!({ "hits": response.hits, "query_label": response.query_label, "degraded": response.degraded }))
}

async fn kb_search_with_context(args: Value, ctx: &ToolContext) -> Result<Value> {
    let args: KbSearchWithContextArgs = parse_args(args)?;
    let context_chunks = args.context_chunks.unwrap_or(DEFAULT_CONTEXT_CHUNKS);

    let response = ctx
        .retrieval
        .search(SearchParams { query: args.query, limit: args.limit.unwrap_or(5), ..Default::default() })
        .await?;

    let mut enriched = Vec::with_capacity(response.hits.len());
    for hit in response.hits {
        let document_id = ValidatedDocumentId::parse(&hit.document_id).map_err(|e| ConduitError::ValidationError(e.to_string()))?;
        let siblings = ctx.store.list_chunks(document_id).await.unwrap_or_default();
        let hit_index = siblings.iter().position(|c| c.id.to_string() == hit.chunk_id);

        let context: Vec<String> = match hit_index {
            Some(index) => {
                let start = index.saturating_sub(context_chunks);
                let end = (index + context_chunks + 1).min(siblings.len());
                siblings[start..end].iter().map(|c| c.content.clone()).collect()
            }
            None => Vec::new(),
        };

        enriched.push(json!({
            "hit": hit,
            "context": context,
        }));
    }

    Ok(json!({ "results": enriched, "query_label": response.query_label }))
}

async fn kb_list_sources(ctx: &ToolContext) -> Result<Value> {
    let sources = ctx.store.list_sources().await?;
    let rendered: Vec<Value> = sources
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id.to_string(),
                "display_name": s.display_name,
                "root_path": s.root_path.as_path().display().to_string(),
                "status": format!("{:?}", s.status),
                "document_count": s.document_count,
                "chunk_count": s.chunk_count,
            })
        })
        .collect();
    Ok(json!({ "sources": rendered }))
}

async fn kb_get_document(args: Value, ctx: &ToolContext) -> Result<Value> {
    let args: KbGetDocumentArgs = parse_args(args)?;
    let document_id = ValidatedDocumentId::parse(&args.document_id).map_err(|e| ConduitError::ValidationError(e.to_string()))?;
    let document = ctx.store.get_document(document_id).await?.ok_or_else(|| ConduitError::PathNotFound(args.document_id.clone()))?;
    let chunks = ctx.store.list_chunks(document_id).await?;
    let content = chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n");

    Ok(json!({
        "id": document.id.to_string(),
        "source_id": document.source_id.to_string(),
        "path": document.path.as_path().display().to_string(),
        "title": document.title.as_str(),
        "content": content,
        "chunk_count": document.chunk_count,
    }))
}

async fn kb_stats(ctx: &ToolContext) -> Result<Value> {
    let sources = ctx.store.list_sources().await?;
    let documents = ctx.store.list_documents(None).await?;
    let chunk_count: usize = documents.iter().map(|d| d.chunk_count).sum();

    Ok(json!({
        "source_count": sources.len(),
        "document_count": documents.len(),
        "chunk_count": chunk_count,
    }))
}

async fn kag_query(args: Value, ctx: &ToolContext) -> Result<Value> {
    let args: KagQueryArgs = parse_args(args)?;
    let request = GraphQueryRequest {
        query: args.query,
        seed_entities: None,
        params: GraphQueryParams {
            max_hops: args.max_hops.unwrap_or(2),
            max_entities: args.max_entities.unwrap_or(50),
            min_confidence: 0.0,
        },
    };
    let response = ctx.graph.kag_query(request).await?;
    serde_json::to_value(response).map_err(|e| ConduitError::Other(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;

    async fn test_context() -> ToolContext {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(FileStore::open(dir.path().to_path_buf()).await.unwrap());
        ToolContext {
            retrieval: Arc::new(RetrievalEngine::new(store.clone())),
            graph: Arc::new(GraphQueryEngine::new(store.clone())),
            store,
        }
    }

    #[tokio::test]
    async fn kb_list_sources_on_empty_store_returns_empty_list() {
        let ctx = test_context().await;
        let result = call("kb_list_sources", Value::Null, &ctx).await.unwrap();
        assert_eq!(result["sources"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn kb_stats_on_empty_store_reports_zero_counts() {
        let ctx = test_context().await;
        let result = call("kb_stats", Value::Null, &ctx).await.unwrap();
        assert_eq!(result["document_count"], 0);
    }

    #[tokio::test]
    async fn unknown_tool_name_errors() {
        let ctx = test_context().await;
        let result = call("kb_delete_everything", Value::Null, &ctx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn kag_query_without_graph_backend_errors() {
        let ctx = test_context().await;
        let args = json!({ "query": "widget factory" });
        let result = call("kag_query", args, &ctx).await;
        assert!(result.is_err());
    }
}
