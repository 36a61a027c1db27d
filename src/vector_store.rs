// In-process Vector Store Adapter (spec.md §4.2), grounded on the teacher's
// `vector_index.rs` HNSW-flavored index: per-node level bookkeeping is kept
// for parity with the teacher's on-disk format, but nearest-neighbor search
// itself is a linear scan over the current collection, exactly as the
// teacher's own `search_knn` falls back to.
//
// One store instance holds one collection (dimension + metric fixed by the
// first `ensure_collection` call), matching how the daemon kernel wires it
// up: a single `InProcessVectorStore` per process, shared by every source.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashSet;

use crate::contracts::vector::{sanitize_utf8, DistanceMetric, VectorFilter, VectorHit, VectorPoint, VectorStore};
use crate::errors::{ConduitError, Result};

struct VectorNode {
    vector: Vec<f32>,
    payload: serde_json::Value,
    levels: Vec<HashSet<String>>,
}

struct CollectionMeta {
    dimension: usize,
    metric: DistanceMetric,
}

fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 { 1.0 } else { 1.0 - (dot / (norm_a * norm_b)) }
        }
        DistanceMetric::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt(),
        DistanceMetric::DotProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
    }
}

fn random_level() -> usize {
    let mut level = 0;
    let mut rng = rand::thread_rng();
    while rng.gen::<f64>() < 0.5 && level < 16 {
        level += 1;
    }
    level
}

/// Sanitizes every string leaf in a JSON payload through the UTF-8 boundary
/// invariant (I6) before it is stored.
fn sanitize_payload(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(sanitize_utf8(s.as_bytes())),
        serde_json::Value::Array(items) => serde_json::Value::Array(items.into_iter().map(sanitize_payload).collect()),
        serde_json::Value::Object(map) => {
            serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, sanitize_payload(v))).collect())
        }
        other => other,
    }
}

fn filter_matches(payload: &serde_json::Value, filter: &VectorFilter) -> bool {
    match &filter.source_id {
        None => true,
        Some(source_id) => payload.get("source_id").and_then(|v| v.as_str()) == Some(source_id.as_str()),
    }
}

/// In-process similarity index. `ensure_collection` is idempotent and only
/// takes effect on its first call; later calls are a no-op (spec.md §4.2
/// treats the collection name as the embedding model's identity, and a
/// running daemon never swaps embedding models out from under itself).
pub struct InProcessVectorStore {
    meta: RwLock<Option<CollectionMeta>>,
    nodes: DashMap<String, VectorNode>,
}

impl Default for InProcessVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessVectorStore {
    pub fn new() -> Self {
        Self { meta: RwLock::new(None), nodes: DashMap::new() }
    }
}

#[async_trait]
impl VectorStore for InProcessVectorStore {
    async fn ensure_collection(&self, _name: &str, dimension: usize, metric: DistanceMetric) -> Result<()> {
        let mut meta = self.meta.write();
        if meta.is_none() {
            *meta = Some(CollectionMeta { dimension, metric });
        }
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        let dimension = self.meta.read().as_ref().map(|m| m.dimension).ok_or_else(|| {
            ConduitError::VectorUnavailable("vector collection not initialized".to_string())
        })?;
        for point in points {
            if point.embedding.len() != dimension {
                return Err(ConduitError::ValidationError(format!(
                    "embedding dimension {} does not match collection dimension {}",
                    point.embedding.len(),
                    dimension
                )));
            }
            let level = random_level();
            self.nodes.insert(
                point.id,
                VectorNode {
                    vector: point.embedding,
                    payload: sanitize_payload(point.payload),
                    levels: (0..=level).map(|_| HashSet::new()).collect(),
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.nodes.remove(id);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &VectorFilter) -> Result<()> {
        let to_remove: Vec<String> =
            self.nodes.iter().filter(|e| filter_matches(&e.value().payload, filter)).map(|e| e.key().clone()).collect();
        for id in to_remove {
            self.nodes.remove(&id);
        }
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], k: usize, filter: Option<&VectorFilter>) -> Result<Vec<VectorHit>> {
        let meta = self.meta.read();
        let Some(meta) = meta.as_ref() else {
            return Err(ConduitError::VectorUnavailable("vector collection not initialized".to_string()));
        };
        if query_vector.len() != meta.dimension {
            return Err(ConduitError::ValidationError("query vector dimension mismatch".to_string()));
        }
        let metric = meta.metric;

        let mut candidates: Vec<(f32, String, serde_json::Value)> = self
            .nodes
            .iter()
            .filter(|e| filter.map(|f| filter_matches(&e.value().payload, f)).unwrap_or(true))
            .map(|e| (distance(metric, query_vector, &e.value().vector), e.key().clone(), e.value().payload.clone()))
            .collect();

        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(candidates
            .into_iter()
            .take(k)
            .map(|(dist, id, payload)| VectorHit { id, score: 1.0 - dist.min(2.0) / 2.0, payload })
            .collect())
    }

    async fn count(&self, filter: Option<&VectorFilter>) -> Result<usize> {
        Ok(match filter {
            None => self.nodes.len(),
            Some(f) => self.nodes.iter().filter(|e| filter_matches(&e.value().payload, f)).count(),
        })
    }

    async fn available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_returns_nearest_first() {
        let store = InProcessVectorStore::new();
        store.ensure_collection("chunks", 2, DistanceMetric::Euclidean).await.unwrap();
        store
            .upsert(vec![
                VectorPoint { id: "near".into(), embedding: vec![1.0, 1.0], payload: serde_json::json!({}) },
                VectorPoint { id: "far".into(), embedding: vec![10.0, 10.0], payload: serde_json::json!({}) },
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hits[0].id, "near");
    }

    #[tokio::test]
    async fn filter_by_source_id_excludes_others() {
        let store = InProcessVectorStore::new();
        store.ensure_collection("chunks", 1, DistanceMetric::Cosine).await.unwrap();
        store
            .upsert(vec![VectorPoint { id: "a".into(), embedding: vec![1.0], payload: serde_json::json!({"source_id": "s1"}) }])
            .await
            .unwrap();

        let filter = VectorFilter { source_id: Some("s2".to_string()) };
        let hits = store.search(&[1.0], 10, Some(&filter)).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = InProcessVectorStore::new();
        store.ensure_collection("chunks", 3, DistanceMetric::Cosine).await.unwrap();
        let result = store.upsert(vec![VectorPoint { id: "a".into(), embedding: vec![1.0, 2.0], payload: serde_json::json!({}) }]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_removes_points_from_subsequent_searches() {
        let store = InProcessVectorStore::new();
        store.ensure_collection("chunks", 1, DistanceMetric::Cosine).await.unwrap();
        store.upsert(vec![VectorPoint { id: "a".into(), embedding: vec![1.0], payload: serde_json::json!({}) }]).await.unwrap();
        store.delete(&["a".to_string()]).await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 0);
    }
}
