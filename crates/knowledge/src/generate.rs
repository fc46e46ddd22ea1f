//! Grounded answer generation, batch and streamed.
//!
//! The model never sees anything but the retrieved contexts and the
//! user's original question. Failures do not propagate as errors: batch
//! generation degrades to a fixed message, streaming ends with a single
//! in-band [`AnswerFragment::Error`].

use crate::model::ModelHandle;
use crate::types::SearchResult;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::pin::Pin;
use tadabbur_core::{AppError, AppResult};
use tadabbur_llm::LlmRequest;
use tadabbur_prompt::{build_prompt, PromptDefinition};
use tokio::sync::mpsc;

/// Answer returned when no generative model is configured.
pub const NOT_CONFIGURED_MESSAGE: &str =
    "Désolé, le service LLM n'est pas configuré. Veuillez vérifier la présence de GEMINI_API_KEY.";

/// Answer returned when the model call fails.
pub const GENERATION_FAILED_MESSAGE: &str =
    "Une erreur est survenue lors de la génération de la réponse.";

const FRAGMENT_BUFFER: usize = 32;

/// One piece of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerFragment {
    Text(String),
    /// Terminal. Nothing follows it.
    Error(String),
}

pub type AnswerStream = Pin<Box<dyn Stream<Item = AnswerFragment> + Send>>;

/// Produces answers from a question and its retrieved contexts.
#[derive(Debug, Clone)]
pub struct AnswerGenerator {
    model: Option<ModelHandle>,
    prompt: PromptDefinition,
}

impl AnswerGenerator {
    pub fn new(model: Option<ModelHandle>, prompt: PromptDefinition) -> Self {
        Self { model, prompt }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    fn request(&self, model: &ModelHandle, question: &str, contexts: &[SearchResult]) -> AppResult<LlmRequest> {
        let prompt = build_prompt(
            &self.prompt,
            &json!({ "question": question, "contexts": contexts }),
        )?;
        Ok(model.request(prompt))
    }

    /// Complete answer in one call.
    pub async fn generate(&self, question: &str, contexts: &[SearchResult]) -> String {
        let Some(model) = self.model.as_ref() else {
            return NOT_CONFIGURED_MESSAGE.to_string();
        };

        match self.answer(model, question, contexts).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error_code = e.code(), "{}", e);
                GENERATION_FAILED_MESSAGE.to_string()
            }
        }
    }

    async fn answer(
        &self,
        model: &ModelHandle,
        question: &str,
        contexts: &[SearchResult],
    ) -> AppResult<String> {
        let request = self.request(model, question, contexts)?;
        let response = model
            .client()
            .complete(&request)
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        Ok(response.content.trim().to_string())
    }

    /// Answer as a stream of text fragments.
    ///
    /// A background task pulls from the model and stops as soon as the
    /// returned stream is dropped.
    pub fn generate_stream(&self, question: &str, contexts: &[SearchResult]) -> AnswerStream {
        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);

        match self.model.clone() {
            None => {
                // Capacity is never zero, so the first send cannot fail for lack of room
                let _ = tx.try_send(AnswerFragment::Text(NOT_CONFIGURED_MESSAGE.to_string()));
            }
            Some(model) => match self.request(&model, question, contexts) {
                Ok(request) => {
                    tokio::spawn(produce(model, request, tx));
                }
                Err(e) => {
                    tracing::error!("Failed to build answer prompt: {}", e);
                    let _ = tx.try_send(AnswerFragment::Error(GENERATION_FAILED_MESSAGE.to_string()));
                }
            },
        }

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|fragment| (fragment, rx))
        }))
    }
}

async fn produce(model: ModelHandle, request: LlmRequest, tx: mpsc::Sender<AnswerFragment>) {
    let mut stream = tokio::select! {
        _ = tx.closed() => return,
        started = model.client().stream(&request) => match started {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Streaming generation failed to start: {}", e);
                let _ = tx.send(AnswerFragment::Error(GENERATION_FAILED_MESSAGE.to_string())).await;
                return;
            }
        },
    };

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("Answer consumer went away, stopping generation");
                return;
            }
            next = stream.next() => next,
        };

        match next {
            None => return,
            Some(Ok(chunk)) => {
                if !chunk.content.is_empty()
                    && tx.send(AnswerFragment::Text(chunk.content)).await.is_err()
                {
                    return;
                }
                if chunk.done {
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::error!("Streaming generation failed: {}", e);
                let _ = tx.send(AnswerFragment::Error(GENERATION_FAILED_MESSAGE.to_string())).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::{sample_results, ScriptedLlm};
    use std::sync::Arc;
    use tadabbur_prompt::{load_prompt, ANSWER_GROUNDED};

    fn generator(llm: Option<Arc<ScriptedLlm>>) -> AnswerGenerator {
        let prompt = load_prompt(None, ANSWER_GROUNDED).unwrap();
        AnswerGenerator::new(llm.map(|l| ModelHandle::new(l, "test-model")), prompt)
    }

    #[tokio::test]
    async fn test_unconfigured_batch_and_stream_agree() {
        let generator = generator(None);
        assert_eq!(generator.generate("q", &[]).await, NOT_CONFIGURED_MESSAGE);

        let fragments: Vec<_> = generator.generate_stream("q", &[]).collect().await;
        assert_eq!(
            fragments,
            vec![AnswerFragment::Text(NOT_CONFIGURED_MESSAGE.to_string())]
        );
    }

    #[tokio::test]
    async fn test_prompt_carries_contexts_and_question() {
        let llm = Arc::new(ScriptedLlm::answering("  La patience est une vertu.  "));
        let generator = generator(Some(llm.clone()));
        let contexts = sample_results();

        let answer = generator.generate("Que dit le Coran sur la patience ?", &contexts).await;
        assert_eq!(answer, "La patience est une vertu.");

        let request = llm.last_request().unwrap();
        assert!(request.prompt.contains("QUESTION : Que dit le Coran sur la patience ?"));
        for context in &contexts {
            assert!(request.prompt.contains(&context.reference));
            assert!(request.prompt.contains(&context.text_ar));
            assert!(request.prompt.contains(&context.text_fr));
        }
        assert!(request.system.is_some());
    }

    #[tokio::test]
    async fn test_model_error_is_a_generation_error() {
        let llm = Arc::new(ScriptedLlm::failing());
        let generator = generator(Some(llm.clone()));
        let model = ModelHandle::new(llm, "test-model");

        let err = generator.answer(&model, "q", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
        assert_eq!(err.code(), "generation_error");
    }

    #[tokio::test]
    async fn test_model_error_degrades_to_message() {
        let generator = generator(Some(Arc::new(ScriptedLlm::failing())));
        assert_eq!(generator.generate("q", &[]).await, GENERATION_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_stream_skips_empty_chunks() {
        let llm = Arc::new(ScriptedLlm::streaming(vec!["La ", "", "patience"]));
        let fragments: Vec<_> = generator(Some(llm)).generate_stream("q", &[]).collect().await;

        assert_eq!(
            fragments,
            vec![
                AnswerFragment::Text("La ".to_string()),
                AnswerFragment::Text("patience".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_error_is_terminal() {
        let llm = Arc::new(ScriptedLlm::streaming(vec!["Début"]).then_fail());
        let fragments: Vec<_> = generator(Some(llm)).generate_stream("q", &[]).collect().await;

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], AnswerFragment::Text("Début".to_string()));
        assert!(matches!(fragments[1], AnswerFragment::Error(_)));
    }

    #[tokio::test]
    async fn test_stream_start_failure_is_single_error() {
        let llm = Arc::new(ScriptedLlm::failing());
        let fragments: Vec<_> = generator(Some(llm)).generate_stream("q", &[]).collect().await;

        assert_eq!(
            fragments,
            vec![AnswerFragment::Error(GENERATION_FAILED_MESSAGE.to_string())]
        );
    }
}
