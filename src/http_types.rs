// HTTP wire types (spec.md §6), grounded on the teacher's `http_server.rs`
// request/response struct shapes — renamed and reshaped to the endpoint
// table this crate exposes, with the error envelope widened to spec.md
// §7's `{code, message, details?}` rather than the teacher's `{error,
// message}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ConduitError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Maps a failure to spec.md §7's HTTP status table: not-found→404, invalid
/// transition→409, policy block→403, backend unavailable→503, validation
/// error→400, everything else→500.
pub fn status_for(error: &ConduitError) -> StatusCode {
    match error {
        ConduitError::SourceNotFound(_)
        | ConduitError::InstanceNotFound(_)
        | ConduitError::PathNotFound(_)
        | ConduitError::ContainerNotFound(_)
        | ConduitError::ConfigNotFound(_) => StatusCode::NOT_FOUND,
        ConduitError::InvalidTransition { .. } => StatusCode::CONFLICT,
        ConduitError::AuditBlocked(_) | ConduitError::PermissionDenied(_) | ConduitError::PermissionRequired(_) => {
            StatusCode::FORBIDDEN
        }
        ConduitError::StoreUnavailable(_)
        | ConduitError::VectorUnavailable(_)
        | ConduitError::GraphUnavailable(_)
        | ConduitError::EmbeddingUnavailable(_)
        | ConduitError::RuntimeUnavailable(_)
        | ConduitError::RuntimeNotFound => StatusCode::SERVICE_UNAVAILABLE,
        ConduitError::ValidationError(_) | ConduitError::ConfigInvalid(_) | ConduitError::PathNotReadable(_) => {
            StatusCode::BAD_REQUEST
        }
        ConduitError::SourceExists(_) | ConduitError::InstanceExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ConduitError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for(&self);
        let body = ErrorResponse { code: self.code().to_string(), message: self.to_string(), details: None };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ConduitError>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: bool,
    pub vector: bool,
    pub graph: bool,
    pub runtime: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddSourceRequest {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    pub sync_mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourceResponse {
    pub id: String,
    pub display_name: String,
    pub root_path: String,
    pub status: String,
    pub document_count: usize,
    pub chunk_count: usize,
}

#[derive(Debug, Deserialize, Default)]
pub struct SyncRequest {
    pub source_id: Option<String>,
    #[serde(default)]
    pub rebuild_vectors: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncErrorEntry {
    pub path: String,
    pub error: String,
    pub skipped: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub source_id: String,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<SyncErrorEntry>,
    pub duration_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
    pub q: String,
    pub mode: Option<String>,
    pub limit: Option<usize>,
    pub source_id: Option<String>,
    pub min_score: Option<f64>,
    pub semantic_weight: Option<f64>,
    pub enable_mmr: Option<bool>,
    pub mmr_lambda: Option<f64>,
    pub enable_rerank: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SearchResultsResponse {
    pub hits: Vec<crate::retrieval::SearchHit>,
    pub query_label: crate::retrieval::QueryLabel,
    pub backends_used: Vec<String>,
    pub semantic_unavailable: bool,
}

#[derive(Debug, Deserialize)]
pub struct KagQueryParams {
    pub q: String,
    pub max_hops: Option<usize>,
    pub max_entities: Option<usize>,
    pub min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub package_id: String,
    pub package_version: String,
    pub display_name: String,
    pub image_reference: String,
    #[serde(default)]
    pub declared_permissions: crate::policy::DeclaredPermissions,
}

#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    pub id: String,
    pub display_name: String,
    pub status: String,
    pub container_id: Option<String>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_errors_map_to_404() {
        assert_eq!(status_for(&ConduitError::SourceNotFound("x".to_string())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&ConduitError::InstanceNotFound("x".to_string())), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_transition_maps_to_409() {
        let err = ConduitError::InvalidTransition { from: "STOPPED".to_string(), to: "RUNNING".to_string() };
        assert_eq!(status_for(&err), StatusCode::CONFLICT);
    }

    #[test]
    fn policy_block_maps_to_403() {
        assert_eq!(status_for(&ConduitError::AuditBlocked("x".to_string())), StatusCode::FORBIDDEN);
    }

    #[test]
    fn backend_unavailable_maps_to_503() {
        assert_eq!(status_for(&ConduitError::VectorUnavailable("x".to_string())), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn validation_error_maps_to_400() {
        assert_eq!(status_for(&ConduitError::ValidationError("x".to_string())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn everything_else_maps_to_500() {
        assert_eq!(status_for(&ConduitError::IndexFailed("x".to_string())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
