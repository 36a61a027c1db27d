// Graph Query Engine (spec.md §4.9): natural-language entity extraction,
// bounded-hop graph traversal, cited result assembly. Grounded on
// `natural_language_query.rs`'s overall parse-query -> execute-intent
// pipeline shape (query in, structured intent extracted, graph walked,
// results assembled) though none of that file's code-symbol-specific intent
// types carry over — KAG intents here are "seed entities, then expand,"
// not "find symbols matching a pattern."

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::contracts::extractor::Extractor;
use crate::contracts::graph::{normalize_name, Direction, GraphEntity, GraphRelation, GraphStore};
use crate::contracts::Store;
use crate::errors::{ConduitError, Result};
use crate::retry::with_retry;
use crate::types::ValidatedChunkId;

const MAX_HOPS_CEILING: usize = 3;
const MAX_SEED_ENTITIES: usize = 8;

#[derive(Debug, Clone)]
pub struct GraphQueryParams {
    pub max_hops: usize,
    pub max_entities: usize,
    pub min_confidence: f32,
}

impl Default for GraphQueryParams {
    fn default() -> Self {
        Self { max_hops: 2, max_entities: 50, min_confidence: 0.0 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphQueryRequest {
    pub query: String,
    /// Caller-supplied seed entity names, bypassing query-time extraction.
    pub seed_entities: Option<Vec<String>>,
    pub params: GraphQueryParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub path: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KagEntity {
    pub normalized_name: String,
    pub entity_type: String,
    pub confidence: f32,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KagRelation {
    pub source: String,
    pub target: String,
    pub relation_type: String,
    pub confidence: f32,
    pub citation: Citation,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphQueryResponse {
    pub seed_entities: Vec<String>,
    pub entities: Vec<KagEntity>,
    pub relations: Vec<KagRelation>,
}

pub struct GraphQueryEngine {
    store: Arc<dyn Store>,
    graph_store: Option<Arc<dyn GraphStore>>,
    extractor: Option<Arc<dyn Extractor>>,
}

impl GraphQueryEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, graph_store: None, extractor: None }
    }

    pub fn with_graph_store(mut self, graph_store: Arc<dyn GraphStore>) -> Self {
        self.graph_store = Some(graph_store);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn kag_query(&self, request: GraphQueryRequest) -> Result<GraphQueryResponse> {
        let graph_store = self
            .graph_store
            .as_ref()
            .ok_or_else(|| ConduitError::GraphUnavailable("no graph backend attached".to_string()))?;
        if !graph_store.available().await {
            return Err(ConduitError::GraphUnavailable("graph backend reported unavailable".to_string()));
        }

        let max_hops = request.params.max_hops.min(MAX_HOPS_CEILING);
        let seeds = self.resolve_seeds(&request).await?;
        if seeds.is_empty() {
            return Ok(GraphQueryResponse { seed_entities: Vec::new(), entities: Vec::new(), relations: Vec::new() });
        }

        let mut entities: HashMap<String, GraphEntity> = HashMap::new();
        let mut relations: HashMap<(String, String, String), GraphRelation> = HashMap::new();

        for seed in &seeds {
            let (found_entities, found_relations) = with_retry("graph_store.neighbors", || {
                graph_store.neighbors(seed, max_hops, Direction::Both, request.params.min_confidence)
            })
            .await?;
            for entity in found_entities {
                entities
                    .entry(entity.normalized_name.clone())
                    .and_modify(|existing| {
                        if entity.confidence > existing.confidence {
                            *existing = entity.clone();
                        }
                    })
                    .or_insert(entity);
            }
            for relation in found_relations {
                let key = (relation.source.clone(), relation.target.clone(), relation.relation_type.clone());
                relations
                    .entry(key)
                    .and_modify(|existing| {
                        if relation.confidence > existing.confidence {
                            *existing = relation.clone();
                        }
                    })
                    .or_insert(relation);
            }
        }

        let mut entities: Vec<GraphEntity> = entities.into_values().collect();
        entities.sort_by(|a, b| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.normalized_name.cmp(&b.normalized_name))
        });
        entities.truncate(request.params.max_entities);

        let mut relations: Vec<GraphRelation> = relations.into_values().collect();
        relations.sort_by(|a, b| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.source.cmp(&b.source))
        });

        let kept_names: std::collections::HashSet<&str> = entities.iter().map(|e| e.normalized_name.as_str()).collect();
        relations.retain(|r| kept_names.contains(r.source.as_str()) || kept_names.contains(r.target.as_str()));

        let mut kag_entities = Vec::with_capacity(entities.len());
        for entity in entities {
            let citations = self.citations_for(&entity.provenance).await;
            kag_entities.push(KagEntity {
                normalized_name: entity.normalized_name,
                entity_type: entity.entity_type,
                confidence: entity.confidence,
                citations,
            });
        }

        let mut kag_relations = Vec::with_capacity(relations.len());
        for relation in relations {
            let citation = self.citations_for(&[relation.provenance]).await.into_iter().next();
            let Some(citation) = citation else { continue };
            kag_relations.push(KagRelation {
                source: relation.source,
                target: relation.target,
                relation_type: relation.relation_type,
                confidence: relation.confidence,
                citation,
            });
        }

        Ok(GraphQueryResponse { seed_entities: seeds, entities: kag_entities, relations: kag_relations })
    }

    async fn resolve_seeds(&self, request: &GraphQueryRequest) -> Result<Vec<String>> {
        if let Some(hints) = &request.seed_entities {
            if !hints.is_empty() {
                return Ok(hints.iter().map(|h| normalize_name(h)).collect());
            }
        }

        let Some(extractor) = &self.extractor else {
            return Err(ConduitError::ValidationError(
                "no seed entities supplied and no extractor attached to derive them from the query".to_string(),
            ));
        };

        let result = with_retry("extractor.extract", || extractor.extract(&request.query)).await?;
        let mut names: Vec<String> = result.entities.into_iter().map(|e| normalize_name(&e.name)).collect();
        names.sort();
        names.dedup();
        names.truncate(MAX_SEED_ENTITIES);
        Ok(names)
    }

    async fn citations_for(&self, provenance: &[ValidatedChunkId]) -> Vec<Citation> {
        let mut citations = Vec::with_capacity(provenance.len());
        for chunk_id in provenance {
            let Ok(Some(chunk)) = self.store.get_chunk(*chunk_id).await else { continue };
            let Ok(Some(document)) = self.store.get_document(chunk.document_id).await else { continue };
            citations.push(Citation {
                chunk_id: chunk_id.to_string(),
                document_id: document.id.to_string(),
                path: document.path.as_path().to_string_lossy().to_string(),
                title: document.title.as_str().to_string(),
            });
        }
        citations
    }
}
