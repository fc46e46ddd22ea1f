//! Ollama LLM provider implementation.
//!
//! Talks to a local Ollama runtime through `/api/generate`.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::lines::lines;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tadabbur_core::{AppError, AppResult};

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama API response format, shared by whole and streamed replies.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaResponse {
    fn usage(&self) -> LlmUsage {
        LlmUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

/// Ollama LLM client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client with default settings.
    ///
    /// Default URL: http://localhost:11434
    pub fn new() -> Self {
        Self::with_base_url("http://localhost:11434")
    }

    /// Create a new Ollama client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Bound every request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    fn to_ollama_request(&self, request: &LlmRequest, stream: bool) -> OllamaRequest {
        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };

        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            options,
            stream,
        }
    }

    async fn send(&self, request: &LlmRequest, stream: bool) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.to_ollama_request(request, stream))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one NDJSON line of a streamed reply.
fn parse_stream_line(line: &str) -> Option<AppResult<LlmStreamChunk>> {
    if line.trim().is_empty() {
        return None;
    }

    let parsed: OllamaResponse = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => return Some(Err(AppError::Llm(format!("Failed to parse chunk: {}", e)))),
    };

    if let Some(error) = parsed.error {
        return Some(Err(AppError::Llm(format!("Ollama stream error: {}", error))));
    }

    Some(Ok(LlmStreamChunk {
        usage: parsed.done.then(|| parsed.usage()),
        content: parsed.response,
        done: parsed.done,
    }))
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending completion request to Ollama");

        let response = self.send(request, false).await?;

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(AppError::Llm(format!("Ollama error: {}", error)));
        }

        let usage = parsed.usage();
        tracing::debug!(tokens = usage.total_tokens, "Received completion from Ollama");

        Ok(LlmResponse {
            content: parsed.response,
            model: parsed.model,
            usage,
            finish_reason: parsed.done_reason,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Ollama");

        let response = self.send(request, true).await?;

        let stream = lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }
}
