// Graph Store Adapter (spec.md §4.3), reworked over `petgraph` directly
// (the teacher's `graph_storage.rs` trait shape — store_node/store_edge/
// get_subgraph/get_graph_stats — generalized to entity/relation domain data
// instead of source-code symbols).

use async_trait::async_trait;
use parking_lot::RwLock;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction as PetDirection;
use std::collections::{HashMap, HashSet};

use crate::contracts::graph::{normalize_name, Direction, GraphEntity, GraphRelation, GraphStats, GraphStore};
use crate::errors::Result;
use crate::types::ValidatedChunkId;

struct EntityNode {
    normalized_name: String,
    entity_type: String,
    confidence: f32,
    provenance: HashSet<ValidatedChunkId>,
}

struct RelationEdge {
    relation_type: String,
    confidence: f32,
    provenance: ValidatedChunkId,
}

struct Inner {
    graph: DiGraph<EntityNode, RelationEdge>,
    index_by_key: HashMap<(String, String), NodeIndex>,
}

/// `petgraph`-backed entity/relation store. Entities merge on
/// `(normalized_name, type)` collision; relations merge on
/// `(source, target, relation_type)`, keeping the max confidence and the
/// union of provenance.
pub struct PetGraphStore {
    inner: RwLock<Inner>,
}

impl Default for PetGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PetGraphStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner { graph: DiGraph::new(), index_by_key: HashMap::new() }) }
    }

    fn to_entity(node: &EntityNode) -> GraphEntity {
        GraphEntity {
            normalized_name: node.normalized_name.clone(),
            entity_type: node.entity_type.clone(),
            confidence: node.confidence,
            provenance: node.provenance.iter().copied().collect(),
        }
    }

    /// Finds a node by normalized name, creating an untyped placeholder
    /// entity if the relation references a name no extraction has upserted
    /// yet (relations may be reported slightly ahead of their endpoints).
    fn get_or_create_node(inner: &mut Inner, normalized_name: &str) -> NodeIndex {
        if let Some(&idx) = inner.index_by_key.values().find(|&&idx| inner.graph[idx].normalized_name == normalized_name) {
            return idx;
        }
        inner.graph.add_node(EntityNode {
            normalized_name: normalized_name.to_string(),
            entity_type: "unknown".to_string(),
            confidence: 0.0,
            provenance: HashSet::new(),
        })
    }
}

#[async_trait]
impl GraphStore for PetGraphStore {
    async fn upsert_entity(
        &self,
        name: &str,
        entity_type: &str,
        confidence: f32,
        provenance_chunk: ValidatedChunkId,
    ) -> Result<()> {
        let normalized = normalize_name(name);
        let mut inner = self.inner.write();
        let key = (normalized.clone(), entity_type.to_string());

        if let Some(&idx) = inner.index_by_key.get(&key) {
            let node = &mut inner.graph[idx];
            node.confidence = node.confidence.max(confidence);
            node.provenance.insert(provenance_chunk);
        } else {
            let idx = inner.graph.add_node(EntityNode {
                normalized_name: normalized,
                entity_type: entity_type.to_string(),
                confidence,
                provenance: HashSet::from([provenance_chunk]),
            });
            inner.index_by_key.insert(key, idx);
        }
        Ok(())
    }

    async fn upsert_relation(
        &self,
        source: &str,
        target: &str,
        relation_type: &str,
        confidence: f32,
        provenance_chunk: ValidatedChunkId,
    ) -> Result<()> {
        let source_key = normalize_name(source);
        let target_key = normalize_name(target);
        let mut inner = self.inner.write();

        let source_idx = Self::get_or_create_node(&mut inner, &source_key);
        let target_idx = Self::get_or_create_node(&mut inner, &target_key);

        if let Some(edge_idx) = inner
            .graph
            .edges_connecting(source_idx, target_idx)
            .find(|e| e.weight().relation_type == relation_type)
            .map(|e| e.id())
        {
            let edge = &mut inner.graph[edge_idx];
            edge.confidence = edge.confidence.max(confidence);
        } else {
            inner.graph.add_edge(
                source_idx,
                target_idx,
                RelationEdge { relation_type: relation_type.to_string(), confidence, provenance: provenance_chunk },
            );
        }
        Ok(())
    }

    async fn neighbors(
        &self,
        entity: &str,
        max_hops: usize,
        direction: Direction,
        min_confidence: f32,
    ) -> Result<(Vec<GraphEntity>, Vec<GraphRelation>)> {
        let normalized = normalize_name(entity);
        let inner = self.inner.read();

        let Some(&start) = inner.index_by_key.values().find(|&&idx| inner.graph[idx].normalized_name == normalized)
        else {
            return Ok((Vec::new(), Vec::new()));
        };

        let mut visited = HashSet::from([start]);
        let mut frontier = vec![start];
        let mut entities = vec![Self::to_entity(&inner.graph[start])];
        let mut relations = Vec::new();

        for _ in 0..max_hops {
            let mut next_frontier = Vec::new();
            for node in frontier {
                let directions: Vec<PetDirection> = match direction {
                    Direction::Outgoing => vec![PetDirection::Outgoing],
                    Direction::Incoming => vec![PetDirection::Incoming],
                    Direction::Both => vec![PetDirection::Outgoing, PetDirection::Incoming],
                };
                for dir in directions {
                    for edge in inner.graph.edges_directed(node, dir) {
                        if edge.weight().confidence < min_confidence {
                            continue;
                        }
                        let (source_idx, target_idx) = (edge.source(), edge.target());
                        let other = if dir == PetDirection::Outgoing { target_idx } else { source_idx };

                        relations.push(GraphRelation {
                            source: inner.graph[source_idx].normalized_name.clone(),
                            target: inner.graph[target_idx].normalized_name.clone(),
                            relation_type: edge.weight().relation_type.clone(),
                            confidence: edge.weight().confidence,
                            provenance: edge.weight().provenance,
                        });

                        if visited.insert(other) {
                            entities.push(Self::to_entity(&inner.graph[other]));
                            next_frontier.push(other);
                        }
                    }
                }
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }

        relations.dedup_by(|a, b| a.source == b.source && a.target == b.target && a.relation_type == b.relation_type);
        Ok((entities, relations))
    }

    async fn find_entity(&self, normalized_name: &str) -> Result<Option<GraphEntity>> {
        let inner = self.inner.read();
        Ok(inner
            .index_by_key
            .values()
            .find(|&&idx| inner.graph[idx].normalized_name == normalized_name)
            .map(|&idx| Self::to_entity(&inner.graph[idx])))
    }

    async fn remove_provenance(&self, chunk_id: ValidatedChunkId) -> Result<()> {
        let mut inner = self.inner.write();

        let stale_edges: Vec<_> = inner
            .graph
            .edge_indices()
            .filter(|&e| inner.graph[e].provenance == chunk_id)
            .collect();
        for edge in stale_edges {
            inner.graph.remove_edge(edge);
        }

        let mut stale_nodes: Vec<NodeIndex> = inner
            .graph
            .node_indices()
            .filter_map(|idx| {
                let node = &mut inner.graph[idx];
                node.provenance.remove(&chunk_id);
                node.provenance.is_empty().then_some(idx)
            })
            .collect();

        if stale_nodes.is_empty() {
            return Ok(());
        }

        // `Graph::remove_node` is a swap-remove: it moves the graph's last
        // node into the freed slot, renumbering that node's index. Removing
        // highest-index-first keeps every later removal in this batch
        // targeting a node that hasn't moved yet, but an unrelated surviving
        // node can still have been swapped into one of the freed slots, so
        // `index_by_key` is rebuilt from the graph's actual contents rather
        // than patched in place.
        stale_nodes.sort_unstable_by(|a, b| b.index().cmp(&a.index()));
        for idx in stale_nodes {
            inner.graph.remove_node(idx);
        }

        inner.index_by_key.clear();
        for idx in inner.graph.node_indices() {
            let key = {
                let node = &inner.graph[idx];
                (node.normalized_name.clone(), node.entity_type.clone())
            };
            inner.index_by_key.insert(key, idx);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let inner = self.inner.read();
        Ok(GraphStats { entity_count: inner.graph.node_count(), relation_count: inner.graph.edge_count() })
    }

    async fn available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_entity_merges_on_name_and_type_collision() {
        let store = PetGraphStore::new();
        let chunk_a = ValidatedChunkId::new();
        let chunk_b = ValidatedChunkId::new();
        store.upsert_entity("Ada Lovelace", "person", 0.6, chunk_a).await.unwrap();
        store.upsert_entity("ada   lovelace", "person", 0.9, chunk_b).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entity_count, 1);

        let entity = store.find_entity("ada lovelace").await.unwrap().unwrap();
        assert_eq!(entity.confidence, 0.9);
        assert_eq!(entity.provenance.len(), 2);
    }

    #[tokio::test]
    async fn neighbors_respects_min_confidence_and_hops() {
        let store = PetGraphStore::new();
        let chunk = ValidatedChunkId::new();
        store.upsert_entity("alice", "person", 1.0, chunk).await.unwrap();
        store.upsert_entity("bob", "person", 1.0, chunk).await.unwrap();
        store.upsert_entity("acme", "org", 1.0, chunk).await.unwrap();
        store.upsert_relation("alice", "bob", "knows", 0.9, chunk).await.unwrap();
        store.upsert_relation("bob", "acme", "works_at", 0.2, chunk).await.unwrap();

        let (entities, relations) = store.neighbors("alice", 2, Direction::Outgoing, 0.5).await.unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(entities.len(), 2);
    }

    #[tokio::test]
    async fn remove_provenance_deletes_orphaned_entities() {
        let store = PetGraphStore::new();
        let chunk = ValidatedChunkId::new();
        store.upsert_entity("solo", "thing", 1.0, chunk).await.unwrap();
        store.remove_provenance(chunk).await.unwrap();
        assert!(store.find_entity("solo").await.unwrap().is_none());
    }
}
