//! Request orchestration: search, batch ask and streamed ask.
//!
//! Every ask runs rewrite -> search -> generate. The rewritten query is
//! only used for retrieval; the model always answers the question the user
//! actually typed.

use crate::events::{EventStream, StreamEvent};
use crate::generate::{AnswerFragment, AnswerGenerator};
use crate::history::HistoryStore;
use crate::quota::{QuotaGate, QUOTA_EXCEEDED_MESSAGE};
use crate::retrieval::RetrievalService;
use crate::rewrite::QueryRewriter;
use crate::types::{AskRequest, AskResponse, HistoryEntry, SearchRequest, SearchResult};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tadabbur_core::{AppError, AppResult};
use tokio::sync::mpsc;
use tracing::Instrument;

/// Contexts retrieved for generation, whatever the caller's source limit.
pub const SEARCH_TOP_K: usize = 10;

/// Message sent to clients for unexpected failures. Details go to the log.
pub const INTERNAL_ERROR_MESSAGE: &str = "Erreur interne lors de la recherche vectorielle.";

const EVENT_BUFFER: usize = 32;

/// Entry point for every request. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    retrieval: Arc<RetrievalService>,
    rewriter: Arc<QueryRewriter>,
    generator: Arc<AnswerGenerator>,
    quota: Arc<dyn QuotaGate>,
    history: Arc<dyn HistoryStore>,
}

impl Orchestrator {
    pub fn new(
        retrieval: Arc<RetrievalService>,
        rewriter: Arc<QueryRewriter>,
        generator: Arc<AnswerGenerator>,
        quota: Arc<dyn QuotaGate>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            retrieval,
            rewriter,
            generator,
            quota,
            history,
        }
    }

    pub fn retrieval(&self) -> &Arc<RetrievalService> {
        &self.retrieval
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Plain semantic search.
    pub async fn search(&self, request: &SearchRequest) -> AppResult<Vec<SearchResult>> {
        if request.query.trim().is_empty() {
            return Err(AppError::Validation(
                "Le paramètre de requête 'q' est obligatoire.".to_string(),
            ));
        }

        let span = tracing::info_span!("search", request_id = %uuid::Uuid::new_v4());
        self.retrieval
            .search(&request.query, request.limit, request.source)
            .instrument(span)
            .await
    }

    /// Answer a question in one response.
    pub async fn ask(&self, user: &str, request: &AskRequest) -> AppResult<AskResponse> {
        validate_question(request)?;

        let span = tracing::info_span!("ask", request_id = %uuid::Uuid::new_v4(), user);
        let this = self.clone();
        let user = user.to_string();
        let request = request.clone();

        // Panics in collaborators surface as an internal error
        let task = tokio::spawn(async move { this.ask_inner(&user, &request).await }.instrument(span));

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                tracing::error!("Ask handler panicked: {}", e);
                Err(AppError::Other(INTERNAL_ERROR_MESSAGE.to_string()))
            }
            Err(e) => Err(AppError::Other(format!("Ask task failed: {}", e))),
        }
    }

    async fn ask_inner(&self, user: &str, request: &AskRequest) -> AppResult<AskResponse> {
        if !self.quota.can_proceed(user).await? {
            tracing::info!("Quota exceeded");
            return Err(AppError::QuotaExceeded {
                reset_time: self.quota.reset_time(),
            });
        }

        let query = self.rewriter.rewrite(&request.question).await;
        let contexts = self
            .retrieval
            .search(&query, SEARCH_TOP_K, request.source)
            .await?;

        let answer = self.generator.generate(&request.question, &contexts).await;
        let sources: Vec<SearchResult> = contexts.into_iter().take(request.limit).collect();

        let requests_today = match self.quota.commit(user).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Failed to commit quota: {}", e);
                None
            }
        };

        self.record_history(user, &request.question, &answer, &sources)
            .await;

        tracing::info!(sources = sources.len(), "Answered");

        Ok(AskResponse {
            question: request.question.clone(),
            answer,
            sources,
            requests_today,
        })
    }

    /// Answer a question as a stream of events.
    ///
    /// Only validation fails up front. Everything after that, including a
    /// quota refusal, is reported in-band as the last event of the stream.
    pub fn ask_stream(&self, user: &str, request: AskRequest) -> AppResult<EventStream> {
        validate_question(&request)?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let sink = EventSink {
            tx,
            terminal_sent: Arc::new(AtomicBool::new(false)),
        };

        let span = tracing::info_span!("ask_stream", request_id = %uuid::Uuid::new_v4(), user);
        let producer = tokio::spawn(
            self.clone()
                .produce_stream(user.to_string(), request, sink.clone())
                .instrument(span.clone()),
        );

        // Turns a panicking producer into a terminal error event
        tokio::spawn(
            async move {
                if let Err(e) = producer.await {
                    if e.is_panic() {
                        tracing::error!("Stream producer panicked: {}", e);
                        if !sink.terminal_sent() {
                            sink.send(StreamEvent::error(INTERNAL_ERROR_MESSAGE, "internal_error"))
                                .await;
                        }
                    }
                }
            }
            .instrument(span),
        );

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })))
    }

    async fn produce_stream(self, user: String, request: AskRequest, sink: EventSink) {
        match self.quota.can_proceed(&user).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("Quota exceeded");
                sink.send(StreamEvent::quota_exceeded(
                    QUOTA_EXCEEDED_MESSAGE,
                    self.quota.reset_time(),
                ))
                .await;
                return;
            }
            Err(e) => {
                tracing::error!("Quota check failed: {}", e);
                sink.send(StreamEvent::error(INTERNAL_ERROR_MESSAGE, e.code()))
                    .await;
                return;
            }
        }

        let query = self.rewriter.rewrite(&request.question).await;
        let contexts = match self
            .retrieval
            .search(&query, SEARCH_TOP_K, request.source)
            .await
        {
            Ok(contexts) => contexts,
            Err(e) => {
                tracing::error!("Retrieval failed: {}", e);
                sink.send(StreamEvent::error(INTERNAL_ERROR_MESSAGE, "internal_error"))
                    .await;
                return;
            }
        };

        let sources: Vec<SearchResult> = contexts.iter().take(request.limit).cloned().collect();
        if !sink
            .send(StreamEvent::Sources {
                data: sources.clone(),
            })
            .await
        {
            return;
        }

        let mut fragments = self.generator.generate_stream(&request.question, &contexts);
        let mut answer = String::new();

        loop {
            let fragment = tokio::select! {
                _ = sink.tx.closed() => {
                    tracing::info!("Client disconnected, abandoning answer");
                    return;
                }
                fragment = fragments.next() => fragment,
            };

            match fragment {
                None => break,
                Some(AnswerFragment::Text(text)) => {
                    answer.push_str(&text);
                    if !sink.send(StreamEvent::Token { data: text }).await {
                        tracing::info!("Client disconnected, abandoning answer");
                        return;
                    }
                }
                Some(AnswerFragment::Error(message)) => {
                    sink.send(StreamEvent::error(message, "generation_error"))
                        .await;
                    return;
                }
            }
        }

        if !sink.send(StreamEvent::Done).await {
            return;
        }

        if let Err(e) = self.quota.commit(&user).await {
            tracing::warn!("Failed to commit quota: {}", e);
        }
        self.record_history(&user, &request.question, &answer, &sources)
            .await;

        tracing::info!(sources = sources.len(), answer_len = answer.len(), "Streamed answer");
    }

    async fn record_history(&self, user: &str, question: &str, answer: &str, sources: &[SearchResult]) {
        let entry = HistoryEntry {
            user: user.to_string(),
            query: question.to_string(),
            response: answer.to_string(),
            sources: sources.to_vec(),
            created_at: chrono::Utc::now(),
        };

        if let Err(e) = self.history.record(entry).await {
            tracing::warn!("Failed to record history: {}", e);
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("retrieval", &self.retrieval)
            .field("rewriter", &self.rewriter)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

fn validate_question(request: &AskRequest) -> AppResult<()> {
    if request.question.trim().is_empty() {
        return Err(AppError::Validation(
            "La question 'q' est obligatoire.".to_string(),
        ));
    }
    Ok(())
}

/// Sending half of an event stream that remembers whether it has ended.
#[derive(Clone)]
struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    terminal_sent: Arc<AtomicBool>,
}

impl EventSink {
    /// Returns false once the consumer is gone.
    async fn send(&self, event: StreamEvent) -> bool {
        let terminal = event.is_terminal();
        if self.tx.send(event).await.is_err() {
            return false;
        }
        if terminal {
            self.terminal_sent.store(true, Ordering::SeqCst);
        }
        true
    }

    fn terminal_sent(&self) -> bool {
        self.terminal_sent.load(Ordering::SeqCst)
    }
}
