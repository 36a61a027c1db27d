// HTTP surface (spec.md §6), grounded on the teacher's `http_server.rs`
// router-construction idiom: `Router::new().route(...).with_state(state)`,
// wrapped in the same `ServiceBuilder` layer stack (body-size limit, request
// tracing, permissive CORS), handlers returning `Result<Json<T>, ConduitError>`
// with `ConduitError`'s own `IntoResponse` impl doing the status/body mapping
// instead of the teacher's separate `(StatusCode, Json<ErrorResponse>)` tuple.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::builders::SourceBuilder;
use crate::contracts::graph::GraphStore;
use crate::contracts::runtime::RuntimeProvider;
use crate::contracts::vector::VectorStore;
use crate::contracts::Store;
use crate::errors::{ConduitError, Result};
use crate::graph_query::{GraphQueryEngine, GraphQueryParams, GraphQueryRequest};
use crate::http_types::{
    AddSourceRequest, CreateInstanceRequest, HealthResponse, InstanceResponse, KagQueryParams, SearchQueryParams,
    SearchResultsResponse, SourceResponse, SyncErrorEntry, SyncRequest, SyncResponse,
};
use crate::indexer::Indexer;
use crate::lifecycle::LifecycleManager;
use crate::retrieval::{RetrievalEngine, SearchMode, SearchParams};
use crate::source_manager::{SourceManager, SyncOptions};
use crate::types::{SourceKind, SyncMode, ValidatedInstanceId, ValidatedSourceId};

const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;
const BACKGROUND_JOB_DEADLINE: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub source_manager: Arc<SourceManager>,
    pub retrieval: Arc<RetrievalEngine>,
    pub graph: Arc<GraphQueryEngine>,
    pub lifecycle: Arc<LifecycleManager>,
    pub indexer: Arc<Indexer>,
    pub vector_store: Option<Arc<dyn VectorStore>>,
    pub graph_store: Option<Arc<dyn GraphStore>>,
    pub runtime: Option<Arc<dyn RuntimeProvider>>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/kb/sources", get(list_sources).post(add_source))
        .route("/api/v1/kb/sources/:id", delete(delete_source))
        .route("/api/v1/kb/sync", post(sync_source))
        .route("/api/v1/kb/search", get(search))
        .route("/api/v1/kb/migrate", post(migrate))
        .route("/api/v1/kb/kag-sync", post(kag_sync))
        .route("/api/v1/kb/kag-query", get(kag_query))
        .route("/api/v1/instances", get(list_instances).post(create_instance))
        .route("/api/v1/instances/:id", get(get_instance))
        .route("/api/v1/instances/:id/start", post(start_instance))
        .route("/api/v1/instances/:id/stop", post(stop_instance))
        .route("/api/v1/instances/:id", delete(remove_instance))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_ok = state.store.list_sources().await.is_ok();
    let vector_ok = match &state.vector_store {
        Some(vector_store) => vector_store.available().await,
        None => false,
    };
    let graph_ok = match &state.graph_store {
        Some(graph_store) => graph_store.available().await,
        None => false,
    };
    let runtime_ok = match &state.runtime {
        Some(runtime) => runtime.available().await,
        None => false,
    };
    Json(HealthResponse {
        status: if store_ok { "ok".to_string() } else { "degraded".to_string() },
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_ok,
        vector: vector_ok,
        graph: graph_ok,
        runtime: runtime_ok,
    })
}

fn source_to_response(source: crate::contracts::Source) -> SourceResponse {
    SourceResponse {
        id: source.id.to_string(),
        display_name: source.display_name,
        root_path: source.root_path.as_path().display().to_string(),
        status: format!("{:?}", source.status),
        document_count: source.document_count,
        chunk_count: source.chunk_count,
    }
}

async fn list_sources(State(state): State<AppState>) -> Result<Json<Vec<SourceResponse>>> {
    let sources = state.store.list_sources().await?;
    Ok(Json(sources.into_iter().map(source_to_response).collect()))
}

async fn add_source(State(state): State<AppState>, Json(req): Json<AddSourceRequest>) -> Result<(StatusCode, Json<SourceResponse>)> {
    let sync_mode = match req.sync_mode.as_deref() {
        Some("watch") => SyncMode::Watch,
        _ => SyncMode::Manual,
    };

    let mut builder = SourceBuilder::new()
        .display_name(req.name)
        .root_path(&req.path)
        .map_err(|e| ConduitError::ValidationError(e.to_string()))?
        .kind(SourceKind::Folder)
        .sync_mode(sync_mode);

    for pattern in &req.patterns {
        builder = builder.include(pattern).map_err(|e| ConduitError::ValidationError(e.to_string()))?;
    }
    for pattern in &req.excludes {
        builder = builder.exclude(pattern).map_err(|e| ConduitError::ValidationError(e.to_string()))?;
    }

    let source = builder.build().map_err(|e| ConduitError::ValidationError(e.to_string()))?;
    state.store.create_source(source.clone()).await?;
    Ok((StatusCode::CREATED, Json(source_to_response(source))))
}

async fn delete_source(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    let source_id = ValidatedSourceId::parse(&id).map_err(|e| ConduitError::ValidationError(e.to_string()))?;
    state
        .store
        .get_source(source_id)
        .await?
        .ok_or_else(|| ConduitError::SourceNotFound(id.clone()))?;
    state.store.delete_source(source_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_source(State(state): State<AppState>, Json(req): Json<SyncRequest>) -> Result<Json<SyncResponse>> {
    let source_id_str = req.source_id.ok_or_else(|| ConduitError::ValidationError("source_id is required".to_string()))?;
    let source_id = ValidatedSourceId::parse(&source_id_str).map_err(|e| ConduitError::ValidationError(e.to_string()))?;

    let started = std::time::Instant::now();
    let report = state.source_manager.sync(source_id, SyncOptions { rebuild_vectors: req.rebuild_vectors }).await?;

    Ok(Json(SyncResponse {
        source_id: source_id_str,
        added: report.added,
        updated: report.updated,
        deleted: report.deleted,
        errors: report
            .errors
            .into_iter()
            .map(|e| SyncErrorEntry { path: e.path, error: e.message, skipped: false })
            .collect(),
        duration_ms: started.elapsed().as_millis() as u64,
    }))
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchQueryParams>) -> Result<Json<SearchResultsResponse>> {
    let mode = match params.mode.as_deref() {
        Some("lexical") => SearchMode::Lexical,
        Some("semantic") => SearchMode::Semantic,
        _ => SearchMode::Hybrid,
    };

    let source_filter = params
        .source_id
        .map(|s| ValidatedSourceId::parse(&s))
        .transpose()
        .map_err(|e| ConduitError::ValidationError(e.to_string()))?;

    let search_params = SearchParams {
        query: params.q,
        mode,
        limit: params.limit.unwrap_or(10),
        source_filter,
        min_score: params.min_score.unwrap_or(0.0),
        semantic_weight: params.semantic_weight.unwrap_or(0.5),
        enable_mmr: params.enable_mmr.unwrap_or(false),
        mmr_lambda: params.mmr_lambda.unwrap_or(0.7),
        enable_rerank: params.enable_rerank.unwrap_or(false),
    };

    let response = state.retrieval.search(search_params).await?;
    Ok(Json(SearchResultsResponse {
        hits: response.hits,
        query_label: response.query_label,
        backends_used: response.backends_used,
        semantic_unavailable: response.degraded,
    }))
}

/// Migrations run detached from the request that triggered them (spec.md
/// §9): the handler returns `202 Accepted` immediately and the background
/// task keeps running even if the caller disconnects.
async fn migrate(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let indexer = state.indexer.clone();
    tokio::spawn(async move {
        let outcome = tokio::time::timeout(BACKGROUND_JOB_DEADLINE, indexer.backfill_vectors()).await;
        match outcome {
            Ok(Ok(count)) => info!(reembedded = count, "migration completed"),
            Ok(Err(err)) => warn!(error = %err, "migration failed"),
            Err(_) => warn!("migration exceeded its background deadline"),
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

async fn kag_sync(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let indexer = state.indexer.clone();
    tokio::spawn(async move {
        let outcome = tokio::time::timeout(BACKGROUND_JOB_DEADLINE, indexer.backfill_graph()).await;
        match outcome {
            Ok(Ok(count)) => info!(processed = count, "kag sync completed"),
            Ok(Err(err)) => warn!(error = %err, "kag sync failed"),
            Err(_) => warn!("kag sync exceeded its background deadline"),
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

async fn kag_query(State(state): State<AppState>, Query(params): Query<KagQueryParams>) -> Result<Json<crate::graph_query::GraphQueryResponse>> {
    let request = GraphQueryRequest {
        query: params.q,
        seed_entities: None,
        params: GraphQueryParams {
            max_hops: params.max_hops.unwrap_or(2),
            max_entities: params.max_entities.unwrap_or(50),
            min_confidence: params.min_confidence.unwrap_or(0.0),
        },
    };
    let response = state.graph.kag_query(request).await?;
    Ok(Json(response))
}

fn instance_to_response(instance: crate::contracts::ConnectorInstance) -> InstanceResponse {
    InstanceResponse {
        id: instance.id.to_string(),
        display_name: instance.display_name,
        status: instance.status.to_string(),
        container_id: instance.container_id,
        last_error: instance.last_error,
    }
}

async fn list_instances(State(state): State<AppState>) -> Result<Json<Vec<InstanceResponse>>> {
    let instances = state.store.list_instances().await?;
    Ok(Json(instances.into_iter().map(instance_to_response).collect()))
}

async fn get_instance(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<InstanceResponse>> {
    let instance_id = ValidatedInstanceId::parse(&id).map_err(|e| ConduitError::ValidationError(e.to_string()))?;
    let instance = state
        .store
        .get_instance(instance_id)
        .await?
        .ok_or_else(|| ConduitError::InstanceNotFound(id))?;
    Ok(Json(instance_to_response(instance)))
}

async fn create_instance(
    State(state): State<AppState>,
    Json(req): Json<CreateInstanceRequest>,
) -> Result<(StatusCode, Json<InstanceResponse>)> {
    let instance = state
        .lifecycle
        .create_and_audit(req.package_id, req.package_version, req.display_name, req.image_reference, req.declared_permissions)
        .await?;
    Ok((StatusCode::CREATED, Json(instance_to_response(instance))))
}

async fn start_instance(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<InstanceResponse>> {
    let instance_id = ValidatedInstanceId::parse(&id).map_err(|e| ConduitError::ValidationError(e.to_string()))?;
    let instance = state.lifecycle.start(instance_id).await?;
    Ok(Json(instance_to_response(instance)))
}

async fn stop_instance(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<InstanceResponse>> {
    let instance_id = ValidatedInstanceId::parse(&id).map_err(|e| ConduitError::ValidationError(e.to_string()))?;
    let instance = state.lifecycle.stop(instance_id, None).await?;
    Ok(Json(instance_to_response(instance)))
}

async fn remove_instance(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    let instance_id = ValidatedInstanceId::parse(&id).map_err(|e| ConduitError::ValidationError(e.to_string()))?;
    state.lifecycle.remove(instance_id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::policy::PolicyEngine;
    use crate::store::FileStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(FileStore::open(dir.path().to_path_buf()).await.unwrap());
        let indexer = Arc::new(crate::indexer::Indexer::new(store.clone()));
        let source_manager = Arc::new(SourceManager::new(store.clone(), indexer.clone(), EventBus::new()));
        let retrieval = Arc::new(RetrievalEngine::new(store.clone()));
        let graph = Arc::new(GraphQueryEngine::new(store.clone()));
        let policy = PolicyEngine::new(Default::default());
        let lifecycle = Arc::new(LifecycleManager::new(store.clone(), policy, EventBus::new()));
        AppState {
            store,
            source_manager,
            retrieval,
            graph,
            lifecycle,
            indexer,
            vector_store: None,
            graph_store: None,
            runtime: None,
        }
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let state = test_state().await;
        let app = build_router(state);
        let response =
            app.oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_instance_returns_404() {
        let state = test_state().await;
        let app = build_router(state);
        let response = app
            .oneshot(Request::builder().uri(format!("/api/v1/instances/{}", uuid::Uuid::new_v4())).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_sources_starts_empty() {
        let state = test_state().await;
        let app = build_router(state);
        let response =
            app.oneshot(Request::builder().uri("/api/v1/kb/sources").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
