//! Retrieval-augmented question answering over the Qur'an and hadith.
//!
//! The pipeline for a question:
//! 1. rewrite it into search keywords ([`rewrite`])
//! 2. embed and search both corpora, merging by distance ([`retrieval`])
//! 3. answer from the retrieved texts only ([`generate`])
//!
//! [`pipeline::Orchestrator`] ties these together with the quota gate and
//! chat history, in batch or as an NDJSON event stream ([`events`]).

pub mod bootstrap;
pub mod embeddings;
pub mod events;
pub mod generate;
pub mod history;
pub mod index;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod quota;
pub mod retrieval;
pub mod rewrite;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use bootstrap::build_orchestrator;
pub use events::{EventStream, StreamEvent};
pub use generate::{AnswerFragment, AnswerGenerator, AnswerStream};
pub use history::{HistoryStore, MemoryHistoryStore, SqliteHistoryStore};
pub use model::ModelHandle;
pub use normalize::normalize_text;
pub use pipeline::{Orchestrator, SEARCH_TOP_K};
pub use quota::{DailyQuota, QuotaGate, UnlimitedQuota};
pub use retrieval::RetrievalService;
pub use rewrite::QueryRewriter;
pub use store::{CorpusIndex, StoreStats, VectorStore};
pub use types::{
    AskRequest, AskResponse, Corpus, CorpusMetadata, HistoryEntry, IndexedDocument,
    SearchRequest, SearchResult, SourceFilter, DEFAULT_SOURCE_LIMIT,
};
