//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a ready client.

use crate::client::LlmClient;
use crate::providers::{GeminiClient, OllamaClient};
use crate::types::ProviderType;
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("gemini", "ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (required by Gemini)
///
/// # Errors
/// Returns error if the provider is unknown or a required secret is missing.
/// Callers treat this as "generation unconfigured" rather than a fatal error.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> Result<Arc<dyn LlmClient>, String> {
    let provider_type =
        ProviderType::parse(provider).ok_or_else(|| format!("Unknown provider: {}", provider))?;

    let base_url = endpoint.unwrap_or(provider_type.default_endpoint());

    match provider_type {
        ProviderType::Gemini => {
            let key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| "Gemini provider requires API key".to_string())?;
            Ok(Arc::new(GeminiClient::new(key).with_base_url(base_url)))
        }
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_base_url(base_url))),
    }
}
