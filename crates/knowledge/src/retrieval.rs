//! Dual-corpus semantic search.

use crate::embeddings::{EmbeddingProvider, EmbeddingRole};
use crate::normalize::normalize_text;
use crate::store::{knn_search, VectorStore};
use crate::types::{SearchResult, SourceFilter};
use std::sync::Arc;
use tadabbur_core::{AppError, AppResult};

/// Embeds queries and merges hits from the selected corpora.
#[derive(Debug, Clone)]
pub struct RetrievalService {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl RetrievalService {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Closest documents across the selected corpora, lowest score first.
    ///
    /// Each corpus contributes up to `top_k` hits before the merge, so the
    /// result is the global top `top_k`. Quran hits are collected first and
    /// the sort is stable, so Quran wins exact ties.
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        source: SourceFilter,
    ) -> AppResult<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let framed = EmbeddingRole::Query.frame(&normalize_text(query_text));
        let query = self
            .embedder
            .embed(&framed)
            .await
            .map_err(|e| match e {
                AppError::Retrieval(_) => e,
                other => AppError::Retrieval(format!("Query embedding failed: {}", other)),
            })?;

        let mut results = Vec::new();
        for &corpus in source.corpora() {
            let loaded = self.store.corpus(corpus).await?;
            let hits = knn_search(&loaded, &query, top_k)?;

            tracing::debug!(corpus = %corpus, hits = hits.len(), "Corpus searched");

            results.extend(
                hits.into_iter()
                    .map(|(neighbor, doc)| SearchResult::from_document(doc, corpus, neighbor.distance)),
            );
        }

        results.sort_by(|a, b| a.score.total_cmp(&b.score));
        results.truncate(top_k);

        Ok(results)
    }
}
