//! Embedding generation.
//!
//! The corpora were embedded with an E5-style model, which expects every
//! input to announce its role: `"passage: "` for indexed text and
//! `"query: "` for searches. Queries must use the same model and framing
//! as the stored vectors or distances are meaningless.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};

/// Role of a text sent to the embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingRole {
    Query,
    Passage,
}

impl EmbeddingRole {
    pub fn prefix(&self) -> &'static str {
        match self {
            EmbeddingRole::Query => "query: ",
            EmbeddingRole::Passage => "passage: ",
        }
    }

    /// Prepend the role marker to already-normalized text.
    pub fn frame(&self, text: &str) -> String {
        format!("{}{}", self.prefix(), text)
    }
}
