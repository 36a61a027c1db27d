// Vector Store Adapter contract (spec.md §4.2).
//
// A capability wrapper over an external vector database. The Retrieval
// Engine consumes only this trait, so unit tests substitute an in-memory
// fake (spec.md §9's "dynamic dispatch across backends" design note).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::types::ValidatedChunkId;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

/// A single point to upsert: stable point id, embedding, opaque payload.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub embedding: Vec<f32>,
    pub payload: Value,
}

/// A scored hit returned from `search`.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

/// Optional filter applied to `search`/`delete`/`count`.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub source_id: Option<String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self, name: &str, dimension: usize, metric: DistanceMetric) -> Result<()>;
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;
    async fn delete(&self, ids: &[String]) -> Result<()>;
    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<()>;
    async fn search(&self, query_vector: &[f32], k: usize, filter: Option<&VectorFilter>) -> Result<Vec<VectorHit>>;
    async fn count(&self, filter: Option<&VectorFilter>) -> Result<usize>;
    async fn available(&self) -> bool;
}

/// Maps an application chunk id to a stable backend point id via a total,
/// deterministic function (spec.md §4.2), namespaced to avoid cross-domain
/// collisions with ids from other point sources.
pub fn point_id_for_chunk(chunk_id: ValidatedChunkId) -> String {
    use xxhash_rust::xxh3::xxh3_64;
    let namespaced = format!("conduit-chunk:{}", chunk_id);
    format!("{:016x}", xxh3_64(namespaced.as_bytes()))
}

/// Sanitizes a string for crossing the vector-backend boundary: invalid
/// UTF-8 byte sequences are replaced with the canonical placeholder (I6).
pub fn sanitize_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_deterministic() {
        let id = crate::types::ValidatedChunkId::derive(crate::types::ValidatedDocumentId::new(), 0, "abc");
        assert_eq!(point_id_for_chunk(id), point_id_for_chunk(id));
    }

    #[test]
    fn sanitize_utf8_replaces_invalid_bytes() {
        let bytes = vec![0x68, 0x69, 0xFF, 0xFE];
        let sanitized = sanitize_utf8(&bytes);
        assert!(sanitized.is_char_boundary(sanitized.len()));
        assert!(std::str::from_utf8(sanitized.as_bytes()).is_ok());
    }
}
