// Extractor Service (spec.md §4.6), grounded on the teacher's
// `natural_language_query.rs` parse-or-return-empty idiom (malformed model
// output never fails the pipeline) and `llm_search.rs`'s prompt-construction
// shape, retargeted from code-symbol intents to a structured
// entities/relations JSON prompt against a local LLM runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::contracts::extractor::{ExtractedEntity, ExtractedRelation, ExtractionResult, Extractor};
use crate::errors::Result;

const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.7;
const MAX_ENTITIES: usize = 20;
const MAX_RELATIONS: usize = 30;

fn build_prompt(chunk_text: &str) -> String {
    format!(
        "Extract named entities and relations from the text below. \
         Respond with ONLY JSON of the form \
         {{\"entities\":[{{\"name\":str,\"entity_type\":str,\"confidence\":0-1}}],\
         \"relations\":[{{\"source\":str,\"relation_type\":str,\"target\":str,\"confidence\":0-1}}]}}.\n\n\
         TEXT:\n{chunk_text}"
    )
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<ExtractedEntity>,
    #[serde(default)]
    relations: Vec<ExtractedRelation>,
}

/// Parses the model's raw completion as JSON, tolerating a leading/trailing
/// prose wrapper some local models add around the JSON body.
fn parse_model_output(raw: &str) -> Option<RawExtraction> {
    if let Ok(parsed) = serde_json::from_str::<RawExtraction>(raw) {
        return Some(parsed);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<RawExtraction>(&raw[start..=end]).ok()
}

/// Applies the confidence floor and per-chunk caps (spec.md §4.6), dropping
/// the lowest-confidence items first on overflow.
fn apply_floor_and_caps(mut raw: RawExtraction, floor: f32) -> ExtractionResult {
    raw.entities.retain(|e| e.confidence >= floor && (0.0..=1.0).contains(&e.confidence));
    raw.relations.retain(|r| r.confidence >= floor && (0.0..=1.0).contains(&r.confidence));

    raw.entities.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    raw.relations.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));

    raw.entities.truncate(MAX_ENTITIES);
    raw.relations.truncate(MAX_RELATIONS);

    ExtractionResult { entities: raw.entities, relations: raw.relations }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Calls a local LLM runtime's HTTP completion endpoint (an Ollama-style
/// `/api/generate`, running in a container owned by the Lifecycle Manager)
/// with a structured extraction prompt.
pub struct LocalLlmExtractor {
    client: reqwest::Client,
    base_url: String,
    model: String,
    confidence_floor: f32,
}

impl LocalLlmExtractor {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build().unwrap_or_default(),
            base_url: base_url.into(),
            model: model.into(),
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
        }
    }

    pub fn with_confidence_floor(mut self, floor: f32) -> Self {
        self.confidence_floor = floor;
        self
    }
}

#[async_trait]
impl Extractor for LocalLlmExtractor {
    async fn extract(&self, chunk_text: &str) -> Result<ExtractionResult> {
        let request =
            GenerateRequest { model: &self.model, prompt: build_prompt(chunk_text), stream: false, format: "json" };

        let response = match self.client.post(format!("{}/api/generate", self.base_url)).json(&request).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return Ok(ExtractionResult::default()),
        };

        let Ok(parsed) = response.json::<GenerateResponse>().await else {
            return Ok(ExtractionResult::default());
        };

        match parse_model_output(&parsed.response) {
            Some(raw) => Ok(apply_floor_and_caps(raw, self.confidence_floor)),
            None => Ok(ExtractionResult::default()),
        }
    }
}

/// An extractor that never runs a model, used when no LLM runtime is
/// configured; graph extraction is simply skipped for those chunks.
#[derive(Default)]
pub struct NullExtractor;

#[async_trait]
impl Extractor for NullExtractor {
    async fn extract(&self, _chunk_text: &str) -> Result<ExtractionResult> {
        Ok(ExtractionResult::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_wrapped_in_prose() {
        let raw = "Sure, here you go:\n{\"entities\":[{\"name\":\"Ada\",\"entity_type\":\"person\",\"confidence\":0.9}],\"relations\":[]}\nHope that helps!";
        let parsed = parse_model_output(raw).unwrap();
        assert_eq!(parsed.entities.len(), 1);
    }

    #[test]
    fn malformed_output_returns_none() {
        assert!(parse_model_output("not json at all").is_none());
    }

    #[test]
    fn floor_and_caps_drop_low_confidence_and_overflow() {
        let entities: Vec<ExtractedEntity> = (0..25)
            .map(|i| ExtractedEntity { name: format!("e{i}"), entity_type: "thing".into(), confidence: 0.7 + (i as f32) * 0.01 })
            .collect();
        let raw = RawExtraction { entities, relations: vec![] };
        let result = apply_floor_and_caps(raw, 0.7);
        assert_eq!(result.entities.len(), 20);
        assert!(result.entities[0].confidence >= result.entities[19].confidence);
    }

    #[tokio::test]
    async fn null_extractor_always_returns_empty() {
        let result = NullExtractor.extract("anything").await.unwrap();
        assert!(result.entities.is_empty());
        assert!(result.relations.is_empty());
    }
}
