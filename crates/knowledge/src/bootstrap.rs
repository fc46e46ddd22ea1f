//! Wiring of the pipeline from configuration.

use crate::embeddings::create_provider;
use crate::generate::AnswerGenerator;
use crate::history::{HistoryStore, SqliteHistoryStore};
use crate::model::ModelHandle;
use crate::pipeline::Orchestrator;
use crate::quota::DailyQuota;
use crate::retrieval::RetrievalService;
use crate::rewrite::QueryRewriter;
use crate::store::{CorpusPaths, VectorStore};
use std::sync::Arc;
use tadabbur_core::config::AppConfig;
use tadabbur_core::AppResult;
use tadabbur_prompt::{load_prompt, ANSWER_GROUNDED, QUERY_REWRITE};

/// The vector store described by `config`, not yet loaded.
pub fn build_store(config: &AppConfig) -> VectorStore {
    let corpora = &config.corpora;
    VectorStore::new(
        CorpusPaths {
            index: config.resolve_path(&corpora.quran_index),
            data: config.resolve_path(&corpora.quran_data),
        },
        CorpusPaths {
            index: config.resolve_path(&corpora.hadith_index),
            data: config.resolve_path(&corpora.hadith_data),
        },
    )
}

/// The generative model, or `None` when it cannot be configured.
///
/// A missing API key is not an error: the service still answers, with a
/// fixed message in place of generated text.
pub fn build_model(config: &AppConfig) -> Option<ModelHandle> {
    let api_key = config.resolve_api_key(&config.provider);
    let endpoint = config.provider_endpoint(&config.provider);

    match tadabbur_llm::create_client(&config.provider, endpoint.as_deref(), api_key.as_deref()) {
        Ok(client) => {
            tracing::info!(provider = %config.provider, model = %config.model, "Generation model configured");
            Some(ModelHandle::new(client, config.model.clone()))
        }
        Err(e) => {
            tracing::warn!("Generation model not configured: {}", e);
            None
        }
    }
}

/// Build every service once and hand back the shared orchestrator.
pub fn build_orchestrator(config: &AppConfig) -> AppResult<Orchestrator> {
    let history: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::open(&config.history_path())?);
    build_orchestrator_with_history(config, history)
}

/// Same as [`build_orchestrator`] with a caller-provided history store.
pub fn build_orchestrator_with_history(
    config: &AppConfig,
    history: Arc<dyn HistoryStore>,
) -> AppResult<Orchestrator> {
    let prompts_dir = config.prompts_path();
    let rewrite_prompt = load_prompt(prompts_dir.as_deref(), QUERY_REWRITE)?;
    let answer_prompt = load_prompt(prompts_dir.as_deref(), ANSWER_GROUNDED)?;

    let embedder = create_provider(&config.embedding)?;
    let store = Arc::new(build_store(config));
    let model = build_model(config);

    Ok(Orchestrator::new(
        Arc::new(RetrievalService::new(store, embedder)),
        Arc::new(QueryRewriter::new(model.clone(), rewrite_prompt)),
        Arc::new(AnswerGenerator::new(model, answer_prompt)),
        Arc::new(DailyQuota::new(config.quota.clone())),
        history,
    ))
}
