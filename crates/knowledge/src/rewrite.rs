//! Question to search-keyword rewriting.

use crate::model::ModelHandle;
use serde_json::json;
use tadabbur_prompt::{build_prompt, PromptDefinition};

/// Questions with at most this many words are searched as-is.
pub const SHORT_QUESTION_WORDS: usize = 6;

/// Condenses long questions into keywords before embedding.
#[derive(Debug, Clone)]
pub struct QueryRewriter {
    model: Option<ModelHandle>,
    prompt: PromptDefinition,
}

impl QueryRewriter {
    pub fn new(model: Option<ModelHandle>, prompt: PromptDefinition) -> Self {
        Self { model, prompt }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    /// Rewrite `question` for search. Never fails: any problem yields the
    /// question unchanged.
    pub async fn rewrite(&self, question: &str) -> String {
        let Some(model) = self.model.as_ref() else {
            return question.to_string();
        };

        if question.split_whitespace().count() <= SHORT_QUESTION_WORDS {
            return question.to_string();
        }

        match self.try_rewrite(model, question).await {
            Ok(Some(rewritten)) => {
                tracing::info!("Query rewritten: '{}' -> '{}'", question, rewritten);
                rewritten
            }
            Ok(None) => {
                tracing::warn!("Rewrite was empty or longer than the question, keeping original");
                question.to_string()
            }
            Err(e) => {
                tracing::warn!("Query rewrite failed, keeping original: {}", e);
                question.to_string()
            }
        }
    }

    async fn try_rewrite(
        &self,
        model: &ModelHandle,
        question: &str,
    ) -> tadabbur_core::AppResult<Option<String>> {
        let prompt = build_prompt(&self.prompt, &json!({ "question": question }))?;
        let response = model.client().complete(&model.request(prompt)).await?;

        let rewritten = response.content.trim();
        if rewritten.is_empty() || rewritten.chars().count() > question.chars().count() {
            return Ok(None);
        }

        Ok(Some(rewritten.to_string()))
    }
}
