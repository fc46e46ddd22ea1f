//! Gemini LLM provider implementation.
//!
//! Uses the Generative Language REST API:
//! - `POST {base}/models/{model}:generateContent`
//! - `POST {base}/models/{model}:streamGenerateContent?alt=sse`
//!
//! The API key travels as the `key` query parameter, so transport errors
//! are stripped of their URL before they are logged or returned.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::lines::lines;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tadabbur_core::{AppError, AppResult};

/// Gemini REST base URL.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn finish_reason(&self) -> Option<String> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.clone())
    }

    fn usage(&self) -> Option<LlmUsage> {
        self.usage_metadata
            .as_ref()
            .map(|u| LlmUsage::new(u.prompt_token_count, u.candidates_token_count))
    }

    fn check_blocked(&self) -> AppResult<()> {
        match self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            Some(reason) => Err(AppError::Llm(format!("Prompt blocked by Gemini: {}", reason))),
            None => Ok(()),
        }
    }
}

/// Gemini LLM client.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client for the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the REST base URL (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound every request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    fn to_gemini_request(request: &LlmRequest) -> GenerateContentRequest {
        let generation_config = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            })
        } else {
            None
        };

        GenerateContentRequest {
            contents: vec![Content::text(Some("user"), &request.prompt)],
            system_instruction: request
                .system
                .as_deref()
                .map(|system| Content::text(None, system)),
            generation_config,
        }
    }

    /// POST with retry on connection failures, rate limits and 5xx.
    async fn post(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: &GenerateContentRequest,
    ) -> AppResult<reqwest::Response> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = self
                .client
                .post(url)
                .query(query)
                .query(&[("key", self.api_key.as_str())])
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt >= MAX_ATTEMPTS {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(AppError::Llm(format!(
                            "Gemini API error ({}): {}",
                            status, error_text
                        )));
                    }
                    tracing::warn!(%status, attempt, "Gemini request failed, retrying");
                }
                Err(e) => {
                    let retryable = e.is_connect() || e.is_timeout();
                    let e = e.without_url();
                    if !retryable || attempt >= MAX_ATTEMPTS {
                        return Err(AppError::Llm(format!(
                            "Failed to send request to Gemini: {}",
                            e
                        )));
                    }
                    tracing::warn!(error = %e, attempt, "Gemini connection failed, retrying");
                }
            }

            tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
        }
    }
}

/// Parse one SSE line of a streamed reply.
///
/// Only `data:` lines carry payloads; comments, event names and blank
/// separators are skipped.
fn parse_sse_line(line: &str) -> Option<AppResult<LlmStreamChunk>> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    let parsed: GenerateContentResponse = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(e) => return Some(Err(AppError::Llm(format!("Failed to parse chunk: {}", e)))),
    };

    if let Err(e) = parsed.check_blocked() {
        return Some(Err(e));
    }

    let done = parsed.finish_reason().is_some();
    Some(Ok(LlmStreamChunk {
        content: parsed.text(),
        done,
        usage: if done { parsed.usage() } else { None },
    }))
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending completion request to Gemini");

        let url = self.endpoint(&request.model, "generateContent");
        let response = self
            .post(&url, &[], &Self::to_gemini_request(request))
            .await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Gemini response: {}", e.without_url())))?;

        parsed.check_blocked()?;

        let usage = parsed.usage().unwrap_or_default();
        tracing::debug!(tokens = usage.total_tokens, "Received completion from Gemini");

        Ok(LlmResponse {
            content: parsed.text(),
            model: request.model.clone(),
            usage,
            finish_reason: parsed.finish_reason(),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Gemini");

        let url = self.endpoint(&request.model, "streamGenerateContent");
        let response = self
            .post(&url, &[("alt", "sse")], &Self::to_gemini_request(request))
            .await?;

        let body = response.bytes_stream().map(|chunk| chunk.map_err(|e| e.without_url()));
        let stream = lines(body).filter_map(|line| async move {
            match line {
                Ok(line) => parse_sse_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }
}
