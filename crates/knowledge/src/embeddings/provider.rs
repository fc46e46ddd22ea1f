//! Embedding provider trait and factory.

use super::providers::{MockProvider, OllamaProvider};
use std::sync::Arc;
use tadabbur_core::config::EmbeddingSettings;
use tadabbur_core::{AppError, AppResult};

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Retrieval("No embedding returned".to_string()))
    }
}

/// Create an embedding provider from configuration.
///
/// No network call is made here; an unreachable Ollama surfaces on the
/// first search instead of at startup.
pub fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "mock" => Ok(Arc::new(MockProvider::new(settings.dimensions))),

        "ollama" => Ok(Arc::new(OllamaProvider::new(settings)?)),

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: mock, ollama",
            settings.provider
        ))),
    }
}
