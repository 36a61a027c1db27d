// Retrieval Engine (spec.md §4.8): hybrid lexical+vector search with RRF
// fusion, MMR diversification, optional rerank, and advisory query
// classification. Grounded on `semantic_search.rs`'s `HybridSearchConfig`/
// `ScoredDocument` shape, though its own `hybrid_search` is a TODO stub that
// never actually fuses text results — the fusion here is new, built to
// spec.md §4.8's RRF formula, and the service-entrypoint/graceful-degradation
// shape follows `services/search_service.rs`.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{instrument, warn};

use crate::contracts::embedding::EmbeddingProvider;
use crate::contracts::vector::{VectorFilter, VectorHit, VectorStore};
use crate::contracts::{LexicalHit, Store};
use crate::errors::Result;
use crate::retry::with_retry;
use crate::types::{ValidatedChunkId, ValidatedSourceId};

const RRF_K: f64 = 60.0;
const SNIPPET_RADIUS: usize = 120;
const RERANK_POOL_CAP: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Lexical,
    Semantic,
    Hybrid,
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Hybrid
    }
}

/// Five-label advisory classification of a query's apparent intent
/// (spec.md §4.8); never gates or filters results, only informs callers'
/// default parameter choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryLabel {
    Definition,
    Procedural,
    Exploratory,
    Factual,
    Comparative,
}

/// Classifies a query by lexical cue words. Advisory only — callers may use
/// this to pick defaults for `mmr_lambda`/`semantic_weight` before
/// overriding with any value the caller supplied explicitly.
pub fn classify_query(query: &str) -> QueryLabel {
    let lower = query.to_lowercase();
    let starts_with_any = |prefixes: &[&str]| prefixes.iter().any(|p| lower.starts_with(p));
    let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if starts_with_any(&["what is", "what are", "define", "definition of"]) {
        QueryLabel::Definition
    } else if starts_with_any(&["how to", "how do", "how can", "steps to"]) {
        QueryLabel::Procedural
    } else if contains_any(&[" vs ", " versus ", "compare", "difference between"]) {
        QueryLabel::Comparative
    } else if starts_with_any(&["why", "explore", "overview of", "tell me about"]) {
        QueryLabel::Exploratory
    } else {
        QueryLabel::Factual
    }
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub mode: SearchMode,
    pub limit: usize,
    pub source_filter: Option<ValidatedSourceId>,
    pub min_score: f64,
    pub semantic_weight: f64,
    pub enable_mmr: bool,
    pub mmr_lambda: f64,
    pub enable_rerank: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            mode: SearchMode::Hybrid,
            limit: 10,
            source_filter: None,
            min_score: 0.0,
            semantic_weight: 0.5,
            enable_mmr: false,
            mmr_lambda: 0.7,
            enable_rerank: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub chunk_id: String,
    pub path: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub source_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub query_label: QueryLabel,
    pub backends_used: Vec<String>,
    pub degraded: bool,
}

/// A candidate carries everything needed for fusion, MMR, and rendering,
/// plus the raw embedding when one was available from the vector leg (used
/// for cosine similarity in the MMR pass) and the chunk body (used for the
/// lexical-Jaccard MMR fallback and for rerank scoring).
#[derive(Debug, Clone)]
struct Candidate {
    chunk_id: ValidatedChunkId,
    document_id: String,
    path: String,
    title: String,
    source_id: String,
    content: String,
    start_offset: usize,
    lexical_rank: Option<usize>,
    semantic_rank: Option<usize>,
    fused_score: f64,
}

pub struct RetrievalEngine {
    store: Arc<dyn Store>,
    vector_store: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, vector_store: None, embedder: None }
    }

    pub fn with_vector_store(mut self, vector_store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(vector_store);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[instrument(skip(self, params), fields(query = %params.query, mode = ?params.mode))]
    pub async fn search(&self, params: SearchParams) -> Result<SearchResponse> {
        let label = classify_query(&params.query);
        let pool_size = (params.limit * 3).max(30);

        let (candidates, backends_used, degraded) = match params.mode {
            SearchMode::Lexical => {
                let lexical = self.lexical_search(&params.query, pool_size, params.source_filter).await?;
                (self.candidates_from_lexical(lexical), vec!["lexical".to_string()], false)
            }
            SearchMode::Semantic => match self.semantic_search(&params.query, pool_size, params.source_filter).await {
                Ok(semantic) => (self.candidates_from_semantic(semantic).await, vec!["semantic".to_string()], false),
                Err(err) => {
                    warn!(error = %err, "semantic search unavailable, degrading to lexical");
                    let lexical = self.lexical_search(&params.query, pool_size, params.source_filter).await?;
                    (self.candidates_from_lexical(lexical), vec!["lexical".to_string()], true)
                }
            },
            SearchMode::Hybrid => {
                let lexical_fut = self.lexical_search(&params.query, pool_size, params.source_filter);
                let semantic_fut = self.semantic_search(&params.query, pool_size, params.source_filter);
                let (lexical, semantic) = tokio::join!(lexical_fut, semantic_fut);
                let lexical = lexical?;

                match semantic {
                    Ok(semantic) => {
                        let fused = self.fuse(lexical, semantic, params.semantic_weight).await;
                        (fused, vec!["lexical".to_string(), "semantic".to_string()], false)
                    }
                    Err(err) => {
                        warn!(error = %err, "vector backend unavailable, falling back to lexical-only");
                        (self.candidates_from_lexical(lexical), vec!["lexical".to_string()], true)
                    }
                }
            }
        };

        let mut candidates: Vec<Candidate> = candidates.into_iter().filter(|c| c.fused_score >= params.min_score).collect();
        candidates.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.chunk_id.cmp(&b.chunk_id)));

        if params.enable_rerank {
            let pool_len = candidates.len().min(RERANK_POOL_CAP);
            let (head, tail) = candidates.split_at_mut(pool_len);
            self.rerank(&params.query, head).await;
            head.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
            let _ = tail;
        }

        let selected = if params.enable_mmr {
            self.mmr_select(candidates, params.limit, params.mmr_lambda).await
        } else {
            candidates.into_iter().take(params.limit).collect()
        };

        let hits = selected.into_iter().map(|c| self.render_hit(c, &params.query)).collect();

        Ok(SearchResponse { hits, query_label: label, backends_used, degraded })
    }

    async fn lexical_search(&self, query: &str, limit: usize, source_filter: Option<ValidatedSourceId>) -> Result<Vec<LexicalHit>> {
        self.store.search_lexical(query, limit, source_filter).await
    }

    async fn semantic_search(&self, query: &str, limit: usize, source_filter: Option<ValidatedSourceId>) -> Result<Vec<VectorHit>> {
        let vector_store = self.vector_store.as_ref().ok_or_else(|| {
            crate::errors::ConduitError::VectorUnavailable("no vector backend attached".to_string())
        })?;
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            crate::errors::ConduitError::EmbeddingUnavailable("no embedding provider attached".to_string())
        })?;
        if !vector_store.available().await {
            return Err(crate::errors::ConduitError::VectorUnavailable("vector backend reported unavailable".to_string()));
        }
        let query_owned = [query.to_string()];
        let vectors = with_retry("embedder.embed", || embedder.embed(&query_owned)).await?;
        let query_vector = vectors.into_iter().next().unwrap_or_default();
        let filter = source_filter.map(|id| VectorFilter { source_id: Some(id.to_string()) });
        with_retry("vector_store.search", || vector_store.search(&query_vector, limit, filter.as_ref())).await
    }

    fn candidates_from_lexical(&self, hits: Vec<LexicalHit>) -> Vec<Candidate> {
        hits.into_iter()
            .enumerate()
            .map(|(rank, hit)| Candidate {
                chunk_id: hit.chunk_id,
                document_id: hit.document_id.to_string(),
                path: hit.path,
                title: hit.title,
                source_id: String::new(),
                content: hit.snippet,
                start_offset: 0,
                lexical_rank: Some(rank + 1),
                semantic_rank: None,
                fused_score: hit.score,
            })
            .collect()
    }

    async fn candidates_from_semantic(&self, hits: Vec<VectorHit>) -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(hits.len());
        for (rank, hit) in hits.into_iter().enumerate() {
            let Some(candidate) = self.candidate_from_vector_hit(&hit, rank + 1, None).await else { continue };
            candidates.push(candidate);
        }
        candidates
    }

    async fn candidate_from_vector_hit(&self, hit: &VectorHit, semantic_rank: usize, lexical_rank: Option<usize>) -> Option<Candidate> {
        let chunk_id_str = hit.payload.get("chunk_id")?.as_str()?;
        let chunk_id = ValidatedChunkId::parse(chunk_id_str).ok()?;
        let chunk = self.store.get_chunk(chunk_id).await.ok()??;
        let document = self.store.get_document(chunk.document_id).await.ok()??;
        let source_id = hit.payload.get("source_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        Some(Candidate {
            chunk_id,
            document_id: document.id.to_string(),
            path: document.path.as_path().to_string_lossy().to_string(),
            title: document.title.as_str().to_string(),
            source_id,
            content: chunk.content,
            start_offset: chunk.start_offset,
            lexical_rank,
            semantic_rank: Some(semantic_rank),
            fused_score: hit.score as f64,
        })
    }

    /// Reciprocal Rank Fusion (spec.md §4.8): `semantic_weight / (k + rank)`
    /// on the vector ranking plus `(1 - semantic_weight) / (k + rank)` on
    /// the lexical ranking; a chunk present in only one leg contributes only
    /// that term.
    async fn fuse(&self, lexical: Vec<LexicalHit>, semantic: Vec<VectorHit>, semantic_weight: f64) -> Vec<Candidate> {
        let lexical_weight = 1.0 - semantic_weight;
        let mut by_chunk: std::collections::HashMap<ValidatedChunkId, Candidate> = std::collections::HashMap::new();

        for (rank, hit) in lexical.into_iter().enumerate() {
            let score = lexical_weight / (RRF_K + (rank + 1) as f64);
            by_chunk
                .entry(hit.chunk_id)
                .and_modify(|c| {
                    c.lexical_rank = Some(rank + 1);
                    c.fused_score += score;
                })
                .or_insert(Candidate {
                    chunk_id: hit.chunk_id,
                    document_id: hit.document_id.to_string(),
                    path: hit.path.clone(),
                    title: hit.title.clone(),
                    source_id: String::new(),
                    content: hit.snippet.clone(),
                    start_offset: 0,
                    lexical_rank: Some(rank + 1),
                    semantic_rank: None,
                    fused_score: score,
                });
        }

        for (rank, hit) in semantic.iter().enumerate() {
            let Some(chunk_id_str) = hit.payload.get("chunk_id").and_then(|v| v.as_str()) else { continue };
            let Ok(chunk_id) = ValidatedChunkId::parse(chunk_id_str) else { continue };
            let score = semantic_weight / (RRF_K + (rank + 1) as f64);

            if let Some(existing) = by_chunk.get_mut(&chunk_id) {
                existing.semantic_rank = Some(rank + 1);
                existing.fused_score += score;
                continue;
            }
            if let Some(mut candidate) = self.candidate_from_vector_hit(hit, rank + 1, None).await {
                candidate.fused_score = score;
                by_chunk.insert(chunk_id, candidate);
            }
        }

        by_chunk.into_values().collect()
    }

    /// Rescoring pass against the embedded query for the top rerank pool:
    /// replaces `fused_score` with cosine similarity to the query vector
    /// when an embedder is attached, leaving scores untouched otherwise.
    async fn rerank(&self, query: &str, candidates: &mut [Candidate]) {
        let Some(embedder) = &self.embedder else { return };
        if candidates.is_empty() {
            return;
        }
        let mut texts = vec![query.to_string()];
        texts.extend(candidates.iter().map(|c| c.content.clone()));
        let Ok(vectors) = embedder.embed(&texts).await else { return };
        if vectors.len() != texts.len() {
            return;
        }
        let query_vector = &vectors[0];
        for (candidate, vector) in candidates.iter_mut().zip(vectors[1..].iter()) {
            candidate.fused_score = cosine_similarity(query_vector, vector) as f64;
        }
    }

    /// Maximal Marginal Relevance diversification (spec.md §4.8): greedily
    /// picks the candidate maximizing `lambda * relevance - (1 - lambda) *
    /// max_similarity_to_selected`, re-embedding chunk content for cosine
    /// similarity when an embedder is attached, falling back to lexical
    /// Jaccard over token sets otherwise.
    async fn mmr_select(&self, candidates: Vec<Candidate>, limit: usize, lambda: f64) -> Vec<Candidate> {
        if candidates.is_empty() || limit == 0 {
            return Vec::new();
        }

        let embeddings = self.embed_for_mmr(&candidates).await;
        let token_sets: Vec<HashSet<&str>> = candidates.iter().map(|c| c.content.split_whitespace().collect()).collect();

        let mut remaining: Vec<usize> = (0..candidates.len()).collect();
        let mut selected: Vec<usize> = Vec::with_capacity(limit.min(candidates.len()));

        while !remaining.is_empty() && selected.len() < limit {
            let (best_idx_pos, _) = remaining
                .iter()
                .enumerate()
                .map(|(pos, &idx)| {
                    let max_sim = selected
                        .iter()
                        .map(|&sel| similarity(&embeddings, &token_sets, idx, sel))
                        .fold(0.0_f64, f64::max);
                    let relevance = candidates[idx].fused_score;
                    (pos, lambda * relevance - (1.0 - lambda) * max_sim)
                })
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .expect("remaining is non-empty");
            selected.push(remaining.remove(best_idx_pos));
        }

        selected.into_iter().map(|idx| candidates[idx].clone()).collect()
    }

    async fn embed_for_mmr(&self, candidates: &[Candidate]) -> Option<Vec<Vec<f32>>> {
        let embedder = self.embedder.as_ref()?;
        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        embedder.embed(&texts).await.ok()
    }

    fn render_hit(&self, candidate: Candidate, query: &str) -> SearchHit {
        let snippet = extract_snippet(&candidate.content, query, candidate.start_offset);
        SearchHit {
            document_id: candidate.document_id,
            chunk_id: candidate.chunk_id.to_string(),
            path: candidate.path,
            title: candidate.title,
            snippet,
            score: candidate.fused_score,
            source_id: candidate.source_id,
        }
    }
}

fn similarity(embeddings: &Option<Vec<Vec<f32>>>, token_sets: &[HashSet<&str>], a: usize, b: usize) -> f64 {
    if let Some(embeddings) = embeddings {
        return cosine_similarity(&embeddings[a], &embeddings[b]) as f64;
    }
    jaccard(&token_sets[a], &token_sets[b])
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Snippet window centered on the first occurrence of the query's leading
/// term, clamped to the chunk's own bounds, padded ±120 characters.
fn extract_snippet(content: &str, query: &str, _start_offset: usize) -> String {
    let lower_content = content.to_lowercase();
    let first_term = query.split_whitespace().next().unwrap_or("").to_lowercase();
    let match_pos = if first_term.is_empty() { None } else { lower_content.find(&first_term) };

    let center = match_pos.unwrap_or(0);
    let from = center.saturating_sub(SNIPPET_RADIUS);
    let to = (center + SNIPPET_RADIUS).min(content.len());

    let from = (0..=from).rev().find(|&i| content.is_char_boundary(i)).unwrap_or(0);
    let to = (to..=content.len()).find(|&i| content.is_char_boundary(i)).unwrap_or(content.len());

    content[from..to].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{ChunkBuilder, DocumentBuilder, SourceBuilder};
    use crate::store::FileStore;
    use crate::types::ValidatedDocumentId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn seeded_store() -> (Arc<dyn Store>, tempfile::TempDir, ValidatedSourceId, Chunk) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(FileStore::open(dir.path().to_path_buf()).await.unwrap());

        let source = SourceBuilder::new().display_name("docs").root_path(".").unwrap().build().unwrap();
        store.create_source(source.clone()).await.unwrap();

        let document_id = ValidatedDocumentId::new();
        let document = DocumentBuilder::new()
            .id(document_id)
            .source_id(source.id)
            .path("guide.md")
            .unwrap()
            .title("guide")
            .unwrap()
            .mime("text/markdown".to_string())
            .content_hash([0u8; 32], 42)
            .build()
            .unwrap();

        let chunk = ChunkBuilder::new()
            .document_id(document_id)
            .index(0)
            .content("rust ownership explains how memory is freed automatically".to_string())
            .offsets(0, 60)
            .build()
            .unwrap();

        store.put_document(document, vec![chunk.clone()]).await.unwrap();
        (store, dir, source.id, chunk)
    }

    #[tokio::test]
    async fn lexical_only_mode_returns_hits_without_vector_backend() {
        let (store, _dir, _source_id, _chunk) = seeded_store().await;
        let engine = RetrievalEngine::new(store);
        let params = SearchParams { query: "ownership".to_string(), mode: SearchMode::Lexical, ..SearchParams::default() };
        let response = engine.search(params).await.unwrap();
        assert!(!response.hits.is_empty());
        assert_eq!(response.backends_used, vec!["lexical".to_string()]);
        assert!(!response.degraded);
    }

    #[tokio::test]
    async fn hybrid_mode_degrades_gracefully_without_vector_backend() {
        let (store, _dir, _source_id, _chunk) = seeded_store().await;
        let engine = RetrievalEngine::new(store);
        let params = SearchParams { query: "ownership".to_string(), mode: SearchMode::Hybrid, ..SearchParams::default() };
        let response = engine.search(params).await.unwrap();
        assert!(response.degraded);
        assert_eq!(response.backends_used, vec!["lexical".to_string()]);
    }

    #[test]
    fn classifier_labels_common_query_shapes() {
        assert_eq!(classify_query("what is ownership"), QueryLabel::Definition);
        assert_eq!(classify_query("how to configure a source"), QueryLabel::Procedural);
        assert_eq!(classify_query("rust vs go performance"), QueryLabel::Comparative);
        assert_eq!(classify_query("why does borrowing exist"), QueryLabel::Exploratory);
        assert_eq!(classify_query("the default chunk size"), QueryLabel::Factual);
    }

    #[test]
    fn fusion_orders_deterministically_on_tied_scores() {
        let doc_id = ValidatedDocumentId::new();
        let a = ValidatedChunkId::derive(doc_id, 0, "aaa");
        let b = ValidatedChunkId::derive(doc_id, 1, "bbb");
        let mut candidates = vec![
            Candidate {
                chunk_id: a.max(b),
                document_id: "d".to_string(),
                path: "p".to_string(),
                title: "t".to_string(),
                source_id: "s".to_string(),
                content: String::new(),
                start_offset: 0,
                lexical_rank: Some(1),
                semantic_rank: None,
                fused_score: 0.5,
            },
            Candidate {
                chunk_id: a.min(b),
                document_id: "d".to_string(),
                path: "p".to_string(),
                title: "t".to_string(),
                source_id: "s".to_string(),
                content: String::new(),
                start_offset: 0,
                lexical_rank: Some(2),
                semantic_rank: None,
                fused_score: 0.5,
            },
        ];
        candidates.sort_by(|x, y| y.fused_score.partial_cmp(&x.fused_score).unwrap().then_with(|| x.chunk_id.cmp(&y.chunk_id)));
        assert_eq!(candidates[0].chunk_id, a.min(b));
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a: HashSet<&str> = ["alpha", "beta"].into_iter().collect();
        let b: HashSet<&str> = ["gamma", "delta"].into_iter().collect();
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    struct AlwaysUnavailableVectorStore;

    #[async_trait]
    impl VectorStore for AlwaysUnavailableVectorStore {
        async fn ensure_collection(&self, _name: &str, _dimension: usize, _metric: crate::contracts::vector::DistanceMetric) -> Result<()> {
            Ok(())
        }
        async fn upsert(&self, _points: Vec<crate::contracts::vector::VectorPoint>) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _ids: &[String]) -> Result<()> {
            Ok(())
        }
        async fn delete_by_filter(&self, _filter: &VectorFilter) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _query_vector: &[f32], _k: usize, _filter: Option<&VectorFilter>) -> Result<Vec<VectorHit>> {
            Ok(Vec::new())
        }
        async fn count(&self, _filter: Option<&VectorFilter>) -> Result<usize> {
            Ok(0)
        }
        async fn available(&self) -> bool {
            false
        }
    }

    struct NeverCalledEmbedder(AtomicBool);

    #[async_trait]
    impl EmbeddingProvider for NeverCalledEmbedder {
        async fn ensure_model(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.store(true, Ordering::SeqCst);
            Ok(batch.iter().map(|_| vec![0.0; 4]).collect())
        }
        fn dimension(&self) -> usize {
            4
        }
        fn model_name(&self) -> &str {
            "test"
        }
    }

    #[tokio::test]
    async fn semantic_mode_degrades_when_vector_backend_reports_unavailable() {
        let (store, _dir, _source_id, _chunk) = seeded_store().await;
        let embedder = Arc::new(NeverCalledEmbedder(AtomicBool::new(false)));
        let engine = RetrievalEngine::new(store).with_vector_store(Arc::new(AlwaysUnavailableVectorStore)).with_embedder(embedder.clone());
        let params = SearchParams { query: "ownership".to_string(), mode: SearchMode::Semantic, ..SearchParams::default() };
        let response = engine.search(params).await.unwrap();
        assert!(response.degraded);
        assert_eq!(response.backends_used, vec!["lexical".to_string()]);
        assert!(!embedder.0.load(Ordering::SeqCst), "embedder should never be called when the vector backend reports unavailable");
    }
}
