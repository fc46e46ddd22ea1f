//! LLM integration crate for Tadabbur.
//!
//! This crate provides a provider-agnostic abstraction over the text
//! generation backends used to rewrite questions and draft answers.
//!
//! # Providers
//! - **Gemini**: Google Generative Language REST API (default)
//! - **Ollama**: Local LLM runtime
//!
//! # Example
//! ```no_run
//! use tadabbur_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Qu'est-ce que la patience ?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod lines;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::{GeminiClient, OllamaClient};
pub use types::ProviderType;
