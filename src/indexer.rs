// Indexer (spec.md §4.4): per-document pipeline — extract, hash, dedupe,
// chunk, persist, embed, upsert vectors, enqueue graph extraction. Grounded
// directly on `services/indexing_service.rs` (closest-named teacher file):
// kept its five-decision shape (added/updated/skipped/error) and its
// sequential-within-a-document ordering rule (spec.md §5).

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::builders::DocumentBuilder;
use crate::chunker::{chunk_document, ChunkKind, ChunkerConfig};
use crate::contracts::embedding::EmbeddingProvider;
use crate::contracts::extractor::Extractor;
use crate::contracts::graph::GraphStore;
use crate::contracts::vector::{point_id_for_chunk, DistanceMetric, VectorPoint, VectorStore};
use crate::contracts::{Chunk, KbDocument, Source, Store};
use crate::errors::{ConduitError, Result};
use crate::extractors::{self, FormatKind};
use crate::retry::with_retry;
use crate::types::{ValidatedChunkId, ValidatedSourceId};

const VECTOR_COLLECTION: &str = "conduit_chunks";
const EMBED_BATCH_SIZE: usize = 32;
const GRAPH_CONFIDENCE_FLOOR: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexDecision {
    Added,
    Updated,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub path: String,
    pub decision: IndexDecision,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    pub rebuild_vectors: bool,
}

fn chunk_kind_for_extension(extension: &str) -> ChunkKind {
    match extractors::classify(extension) {
        FormatKind::Markdown => ChunkKind::Markdown,
        FormatKind::SourceCode => ChunkKind::SourceCode,
        _ => ChunkKind::Prose,
    }
}

/// Builds the document pipeline around a concrete Store plus the optional
/// vector/graph/embedding backends attached to a source.
pub struct Indexer {
    store: Arc<dyn Store>,
    vector_store: Option<Arc<dyn VectorStore>>,
    graph_store: Option<Arc<dyn GraphStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    extractor: Option<Arc<dyn Extractor>>,
    chunker_config: ChunkerConfig,
}

impl Indexer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            vector_store: None,
            graph_store: None,
            embedder: None,
            extractor: None,
            chunker_config: ChunkerConfig::default(),
        }
    }

    pub fn with_vector_store(mut self, vector_store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(vector_store);
        self
    }

    pub fn with_graph_store(mut self, graph_store: Arc<dyn GraphStore>) -> Self {
        self.graph_store = Some(graph_store);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Runs the per-document pipeline for one file already read from disk.
    #[instrument(skip(self, bytes), fields(path = %relative_path))]
    pub async fn index_document(
        &self,
        source: &Source,
        relative_path: &str,
        absolute_path: &Path,
        bytes: &[u8],
        options: IndexOptions,
    ) -> Result<IndexOutcome> {
        let extension = absolute_path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let extracted = extractors::extract(absolute_path, bytes)?;

        let content_hash: [u8; 32] = Sha256::digest(extracted.text.as_bytes()).into();

        let existing = self.store.find_document_by_path(source.id, relative_path).await?;

        let decision = match &existing {
            None => IndexDecision::Added,
            Some(doc) if doc.content_hash == content_hash && !options.rebuild_vectors => IndexDecision::Skipped,
            Some(_) => IndexDecision::Updated,
        };

        if decision == IndexDecision::Skipped {
            let chunk_count = existing.map(|d| d.chunk_count).unwrap_or(0);
            return Ok(IndexOutcome { path: relative_path.to_string(), decision, chunk_count });
        }

        let document_id = existing.as_ref().map(|d| d.id).unwrap_or_default();
        let previous_chunks = match &existing {
            Some(doc) => self.store.list_chunks(doc.id).await?,
            None => Vec::new(),
        };

        let title = Path::new(relative_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(relative_path)
            .to_string();

        let mut document = DocumentBuilder::new()
            .id(document_id)
            .source_id(source.id)
            .path(relative_path)?
            .title(title)?
            .mime(extracted.mime.clone())
            .content_hash(content_hash, bytes.len() as u64)
            .build()?;

        let config = ChunkerConfig {
            kind: chunk_kind_for_extension(extension),
            extension: extension.to_string(),
            ..self.chunker_config.clone()
        };
        let chunks = chunk_document(document.id, &extracted.text, &config)?;
        document.chunk_count = chunks.len();

        self.store.put_document(document.clone(), chunks.clone()).await?;

        if !previous_chunks.is_empty() {
            self.remove_stale_vectors_and_provenance(&previous_chunks).await;
        }

        if let Some(vector_store) = &self.vector_store {
            self.upsert_vectors(vector_store.as_ref(), source.id, &document, &chunks).await?;
        }

        if let Some(graph_store) = self.graph_store.clone() {
            if let Some(extractor) = self.extractor.clone() {
                self.enqueue_graph_extraction(graph_store, extractor, chunks.clone());
            }
        }

        Ok(IndexOutcome { path: relative_path.to_string(), decision, chunk_count: chunks.len() })
    }

    async fn remove_stale_vectors_and_provenance(&self, previous_chunks: &[Chunk]) {
        if let Some(vector_store) = &self.vector_store {
            let ids: Vec<String> = previous_chunks.iter().map(|c| point_id_for_chunk(c.id)).collect();
            if let Err(err) = with_retry("vector_store.delete", || vector_store.delete(&ids)).await {
                warn!(error = %err, "failed to delete stale vector points during re-index");
            }
        }
        if let Some(graph_store) = &self.graph_store {
            for chunk in previous_chunks {
                if let Err(err) = with_retry("graph_store.remove_provenance", || graph_store.remove_provenance(chunk.id)).await {
                    warn!(error = %err, chunk_id = %chunk.id, "failed to remove stale graph provenance during re-index");
                }
            }
        }
    }

    async fn upsert_vectors(
        &self,
        vector_store: &dyn VectorStore,
        source_id: ValidatedSourceId,
        document: &KbDocument,
        chunks: &[Chunk],
    ) -> Result<()> {
        let Some(embedder) = &self.embedder else {
            return Ok(());
        };
        if chunks.is_empty() {
            return Ok(());
        }

        with_retry("vector_store.ensure_collection", || {
            vector_store.ensure_collection(VECTOR_COLLECTION, embedder.dimension(), DistanceMetric::Cosine)
        })
        .await?;

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = with_retry("embedder.embed", || embedder.embed(&texts)).await?;
            if vectors.len() != batch.len() {
                return Err(ConduitError::EmbeddingUnavailable(
                    "embedding provider returned a mismatched batch size".to_string(),
                ));
            }

            let points: Vec<VectorPoint> = batch
                .iter()
                .zip(vectors.into_iter())
                .map(|(chunk, embedding)| VectorPoint {
                    id: point_id_for_chunk(chunk.id),
                    embedding,
                    payload: serde_json::json!({
                        "chunk_id": chunk.id.to_string(),
                        "document_id": document.id.to_string(),
                        "source_id": source_id.to_string(),
                    }),
                })
                .collect();
            with_retry("vector_store.upsert", || vector_store.upsert(points.clone())).await?;
        }
        Ok(())
    }

    /// Re-embeds and upserts vectors for every document already in the
    /// store (spec.md §6 `/migrate`), used to backfill after a vector
    /// backend is attached post-hoc or after an embedding model change.
    pub async fn backfill_vectors(&self) -> Result<usize> {
        let Some(vector_store) = self.vector_store.clone() else {
            return Err(ConduitError::VectorUnavailable("no vector backend attached".to_string()));
        };
        let documents = self.store.list_documents(None).await?;
        let mut reembedded = 0;
        for document in &documents {
            let chunks = self.store.list_chunks(document.id).await?;
            if chunks.is_empty() {
                continue;
            }
            self.upsert_vectors(vector_store.as_ref(), document.source_id, document, &chunks).await?;
            reembedded += 1;
        }
        Ok(reembedded)
    }

    /// Runs extraction over every indexed chunk and upserts the resulting
    /// entities/relations into the graph backend (spec.md §6 `/kag-sync`).
    pub async fn backfill_graph(&self) -> Result<usize> {
        let Some(graph_store) = self.graph_store.clone() else {
            return Err(ConduitError::GraphUnavailable("no graph backend attached".to_string()));
        };
        let Some(extractor) = self.extractor.clone() else {
            return Err(ConduitError::Other(anyhow::anyhow!("no extractor attached for graph sync")));
        };
        let documents = self.store.list_documents(None).await?;
        let mut processed = 0;
        for document in &documents {
            let chunks = self.store.list_chunks(document.id).await?;
            for chunk in chunks {
                let result = with_retry("extractor.extract", || extractor.extract(&chunk.content)).await?;
                apply_extraction(graph_store.as_ref(), chunk.id, &result).await;
                processed += 1;
            }
        }
        Ok(processed)
    }

    /// Spawns a detached background task per chunk batch: graph extraction
    /// never blocks indexing (spec.md §4.4 step 6).
    fn enqueue_graph_extraction(&self, graph_store: Arc<dyn GraphStore>, extractor: Arc<dyn Extractor>, chunks: Vec<Chunk>) {
        tokio::spawn(async move {
            for chunk in chunks {
                let result = match with_retry("extractor.extract", || extractor.extract(&chunk.content)).await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(error = %err, chunk_id = %chunk.id, "graph extraction failed for chunk");
                        continue;
                    }
                };
                apply_extraction(graph_store.as_ref(), chunk.id, &result).await;
            }
        });
    }

    /// Deletes every document under `source_id` whose relative path was not
    /// seen during the latest walk (spec.md §4.7 deletion detection).
    pub async fn prune_deleted(&self, source_id: ValidatedSourceId, seen_paths: &std::collections::HashSet<String>) -> Result<usize> {
        let documents = self.store.list_documents(Some(source_id)).await?;
        let mut removed = 0;
        for document in documents {
            let path = document.path.as_path().to_string_lossy().to_string();
            if !seen_paths.contains(&path) {
                let chunks = self.store.list_chunks(document.id).await?;
                self.store.delete_document(document.id).await?;
                self.remove_stale_vectors_and_provenance(&chunks).await;
                removed += 1;
                debug!(path = %path, "pruned deleted document");
            }
        }
        Ok(removed)
    }
}

async fn apply_extraction(
    graph_store: &dyn GraphStore,
    chunk_id: ValidatedChunkId,
    result: &crate::contracts::extractor::ExtractionResult,
) {
    for entity in &result.entities {
        if entity.confidence < GRAPH_CONFIDENCE_FLOOR {
            continue;
        }
        let outcome = with_retry("graph_store.upsert_entity", || {
            graph_store.upsert_entity(&entity.name, &entity.entity_type, entity.confidence, chunk_id)
        })
        .await;
        if let Err(err) = outcome {
            warn!(error = %err, entity = %entity.name, "failed to upsert extracted entity");
        }
    }
    for relation in &result.relations {
        let outcome = with_retry("graph_store.upsert_relation", || {
            graph_store.upsert_relation(&relation.source, &relation.target, &relation.relation_type, relation.confidence, chunk_id)
        })
        .await;
        if let Err(err) = outcome {
            warn!(error = %err, relation = %relation.relation_type, "failed to upsert extracted relation");
        }
    }
}
