//! Ollama Embedding Provider
//!
//! Embeds text through a local Ollama runtime (`/api/embeddings`).
//!
//! # Features
//! - Multilingual E5 models for mixed French and Arabic text
//! - Local-first (no API costs, privacy-preserving)
//! - Automatic retry with exponential backoff
//!
//! # Example
//! ```no_run
//! use tadabbur_core::config::EmbeddingSettings;
//! use tadabbur_knowledge::embeddings::EmbeddingProvider;
//! use tadabbur_knowledge::embeddings::providers::OllamaProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OllamaProvider::new(&EmbeddingSettings::default())?;
//! provider.verify().await?;
//! let embedding = provider.embed("query: patience").await?;
//! assert_eq!(embedding.len(), 768);
//! # Ok(())
//! # }
//! ```

use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tadabbur_core::config::EmbeddingSettings;
use tadabbur_core::{AppError, AppResult};
use tracing::{debug, instrument, warn};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Maximum attempts for a single embedding request
const MAX_RETRIES: u32 = 3;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

/// Ollama embedding provider using local API
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Create a provider from settings. No request is sent.
    ///
    /// The endpoint comes from the settings, then `OLLAMA_URL`, then the
    /// local default.
    pub fn new(settings: &EmbeddingSettings) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                AppError::Config(format!("Failed to create HTTP client for Ollama: {}", e))
            })?;

        let base_url = settings
            .endpoint
            .clone()
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
        })
    }

    /// Check that Ollama answers and the model has the configured width.
    #[instrument(skip(self), fields(model = %self.model))]
    pub async fn verify(&self) -> AppResult<()> {
        debug!("Verifying Ollama connection at {}", self.base_url);

        self.embed_with_retries("query: test connection", MAX_RETRIES)
            .await
            .map(|_| ())
            .map_err(|e| {
                AppError::Retrieval(format!(
                    "Ollama not available at {} ({}). Ensure Ollama is running and model '{}' is installed. Run: ollama pull {}",
                    self.base_url, e, self.model, self.model
                ))
            })
    }

    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model))]
    async fn embed_with_retries(&self, text: &str, retries: u32) -> AppResult<Vec<f32>> {
        let mut attempt = 0;

        loop {
            match self.embed_single(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    attempt += 1;
                    if attempt >= retries {
                        return Err(e);
                    }

                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                    warn!(
                        "Embedding failed (attempt {}/{}), retrying in {}ms: {}",
                        attempt, retries, backoff_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);

        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to send request to Ollama: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|r| r.error)
                .unwrap_or(error_text);

            return Err(AppError::Retrieval(format!(
                "Ollama API error ({}): {}",
                status, message
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to parse Ollama response: {}", e)))?;

        if body.embedding.len() != self.dimensions {
            return Err(AppError::Retrieval(format!(
                "Unexpected embedding dimensions: got {}, expected {}",
                body.embedding.len(),
                self.dimensions
            )));
        }

        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::Retrieval("Cannot embed empty text".to_string()));
        }

        self.embed_with_retries(text, MAX_RETRIES).await
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "ollama", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        // The endpoint takes one prompt per request
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_settings() {
        let settings = EmbeddingSettings {
            endpoint: Some("http://ollama:11434/".to_string()),
            ..EmbeddingSettings::default()
        };
        let provider = OllamaProvider::new(&settings).unwrap();

        assert_eq!(provider.base_url, "http://ollama:11434");
        assert_eq!(provider.dimensions(), 768);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_request() {
        let settings = EmbeddingSettings {
            endpoint: Some("http://127.0.0.1:9".to_string()),
            ..EmbeddingSettings::default()
        };
        let provider = OllamaProvider::new(&settings).unwrap();

        let result = provider.embed("   ").await;
        assert!(matches!(result, Err(AppError::Retrieval(_))));
    }
}
