// Graph Store Adapter contract (spec.md §4.3).

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::ValidatedChunkId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone)]
pub struct GraphEntity {
    pub normalized_name: String,
    pub entity_type: String,
    pub confidence: f32,
    pub provenance: Vec<ValidatedChunkId>,
}

#[derive(Debug, Clone)]
pub struct GraphRelation {
    pub source: String,
    pub target: String,
    pub relation_type: String,
    pub confidence: f32,
    pub provenance: ValidatedChunkId,
}

#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
}

/// Unicode lower-case, whitespace-collapsed, trimmed — entities merge on
/// `(normalized_name, type)` collision (spec.md §4.3).
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_entity(
        &self,
        name: &str,
        entity_type: &str,
        confidence: f32,
        provenance_chunk: ValidatedChunkId,
    ) -> Result<()>;

    async fn upsert_relation(
        &self,
        source: &str,
        target: &str,
        relation_type: &str,
        confidence: f32,
        provenance_chunk: ValidatedChunkId,
    ) -> Result<()>;

    async fn neighbors(
        &self,
        entity: &str,
        max_hops: usize,
        direction: Direction,
        min_confidence: f32,
    ) -> Result<(Vec<GraphEntity>, Vec<GraphRelation>)>;

    async fn find_entity(&self, normalized_name: &str) -> Result<Option<GraphEntity>>;

    /// Removes `chunk_id` from every entity/relation's provenance set;
    /// entities/relations left with empty provenance are deleted (I3).
    async fn remove_provenance(&self, chunk_id: ValidatedChunkId) -> Result<()>;

    async fn stats(&self) -> Result<GraphStats>;

    async fn available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_name_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize_name("  Ada   Lovelace \n"), "ada lovelace");
    }
}
