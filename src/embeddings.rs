// Embedding Service (spec.md §4.5), keeping the teacher's
// `EmbeddingConfig`/`EmbeddingProvider`/`models` shape. The ONNX backend
// mirrors the teacher's intended `ort` integration (the teacher's own
// `LocalEmbeddingProvider` never wired `ort` in and fell back to a
// hash-based placeholder); the hash-based provider here keeps that
// fallback for tests and for builds without the `embeddings-onnx` feature.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::contracts::embedding::EmbeddingProvider;
use crate::errors::{ConduitError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model_name: String,
    pub model_path: Option<PathBuf>,
    pub dimension: usize,
    pub max_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        models::local_minilm_l6_v2(PathBuf::from("models/all-MiniLM-L6-v2.onnx"))
    }
}

/// Deterministic, dependency-free provider: same input text always yields
/// the same vector. Used when the `embeddings-onnx` feature is disabled and
/// in unit tests, matching the teacher's own hash-based placeholder.
pub struct HashEmbeddingProvider {
    config: EmbeddingConfig,
}

impl HashEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.config.dimension];
        let hash = xxhash_rust::xxh3::xxh3_64(text.as_bytes());
        for (i, value) in vector.iter_mut().enumerate() {
            let mixed = hash.wrapping_mul(137).wrapping_add(i as u64 * 2654435761);
            *value = ((mixed % 2000) as f32 / 1000.0) - 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in vector.iter_mut() {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn ensure_model(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(batch.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

#[cfg(feature = "embeddings-onnx")]
pub struct OnnxEmbeddingProvider {
    config: EmbeddingConfig,
    tokenizer: tokenizers::Tokenizer,
    session: Mutex<ort::session::Session>,
}

#[cfg(feature = "embeddings-onnx")]
impl OnnxEmbeddingProvider {
    pub fn load(config: EmbeddingConfig, tokenizer_path: &std::path::Path) -> Result<Self> {
        let model_path = config
            .model_path
            .clone()
            .ok_or_else(|| ConduitError::EmbeddingUnavailable("no model_path configured".to_string()))?;

        let session = ort::session::Session::builder()
            .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;

        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path)
            .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;

        Ok(Self { config, tokenizer, session: Mutex::new(session) })
    }

    fn mean_pool(hidden_states: &ndarray::ArrayViewD<'_, f32>, attention_mask: &[i64]) -> Vec<f32> {
        let shape = hidden_states.shape();
        let (seq_len, hidden_dim) = (shape[1], shape[2]);
        let mut pooled = vec![0.0f32; hidden_dim];
        let mut valid_tokens = 0.0f32;

        for t in 0..seq_len.min(attention_mask.len()) {
            if attention_mask[t] == 0 {
                continue;
            }
            valid_tokens += 1.0;
            for h in 0..hidden_dim {
                pooled[h] += hidden_states[[0, t, h]];
            }
        }
        if valid_tokens > 0.0 {
            for value in pooled.iter_mut() {
                *value /= valid_tokens;
            }
        }
        pooled
    }
}

#[cfg(feature = "embeddings-onnx")]
#[async_trait]
impl EmbeddingProvider for OnnxEmbeddingProvider {
    async fn ensure_model(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(batch.len());
        let session = self.session.lock().await;

        for text in batch {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;

            let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
            let seq_len = ids.len();

            let input_ids = ndarray::Array2::from_shape_vec((1, seq_len), ids)
                .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;
            let attention_mask = ndarray::Array2::from_shape_vec((1, seq_len), mask.clone())
                .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;
            let input_ids = ort::value::Tensor::from_array(input_ids)
                .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;
            let attention_mask = ort::value::Tensor::from_array(attention_mask)
                .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;

            let outputs = session
                .run(ort::inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask,
                ])
                .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;
            let view = ndarray::ArrayViewD::from_shape(shape, data)
                .map_err(|e| ConduitError::EmbeddingUnavailable(e.to_string()))?;

            embeddings.push(Self::mean_pool(&view, &mask));
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Named model configurations, mirroring the teacher's `models` module.
pub mod models {
    use super::EmbeddingConfig;
    use std::path::PathBuf;

    pub fn local_minilm_l6_v2(model_path: PathBuf) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: "all-MiniLM-L6-v2".to_string(),
            model_path: Some(model_path),
            dimension: 384,
            max_batch_size: 32,
        }
    }

    pub fn local_bge_small_en(model_path: PathBuf) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: "bge-small-en".to_string(),
            model_path: Some(model_path),
            dimension: 384,
            max_batch_size: 32,
        }
    }

    pub fn local_e5_small_v2(model_path: PathBuf) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: "e5-small-v2".to_string(),
            model_path: Some(model_path),
            dimension: 384,
            max_batch_size: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_provider_is_deterministic() {
        let provider = HashEmbeddingProvider::new(models::local_minilm_l6_v2(PathBuf::from("unused")));
        let a = provider.embed(&["hello world".to_string()]).await.unwrap();
        let b = provider.embed(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 384);
    }

    #[tokio::test]
    async fn hash_provider_differs_for_distinct_text() {
        let provider = HashEmbeddingProvider::new(models::local_minilm_l6_v2(PathBuf::from("unused")));
        let a = provider.embed(&["alpha".to_string()]).await.unwrap();
        let b = provider.embed(&["beta".to_string()]).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_vec() {
        let provider = HashEmbeddingProvider::new(models::local_minilm_l6_v2(PathBuf::from("unused")));
        assert!(provider.embed(&[]).await.unwrap().is_empty());
    }
}
