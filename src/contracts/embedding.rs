// Embedding Service contract (spec.md §4.5).

use async_trait::async_trait;

use crate::errors::Result;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Ensures the model is loaded; idempotent, may trigger a model pull
    /// via the external runtime.
    async fn ensure_model(&self, name: &str) -> Result<()>;

    /// Embeds a batch of texts. Same-model calls on identical inputs must
    /// return identical vectors.
    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Fixed dimensionality of this provider's current model.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}
