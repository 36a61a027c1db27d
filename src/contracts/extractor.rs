// Extractor Service contract (spec.md §4.6).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelation {
    pub source: String,
    pub relation_type: String,
    pub target: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relations: Vec<ExtractedRelation>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracts entities and relations from chunk text. On malformed model
    /// output this returns empty lists rather than failing the pipeline
    /// (spec.md §4.6).
    async fn extract(&self, chunk_text: &str) -> Result<ExtractionResult>;
}
