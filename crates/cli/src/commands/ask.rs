//! Ask command handler.
//!
//! Runs the full pipeline for one question. With `--stream` the answer is
//! written as NDJSON events, one per line, exactly as the HTTP stream
//! sends them.

use super::search::print_results;
use clap::Args;
use futures::StreamExt;
use std::io::Write;
use tadabbur_core::config::AppConfig;
use tadabbur_knowledge::{build_orchestrator, AskRequest, SourceFilter, StreamEvent};

/// Ask a question answered from the corpora
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Number of sources to show
    #[arg(short, long, default_value_t = tadabbur_knowledge::DEFAULT_SOURCE_LIMIT)]
    pub limit: usize,

    /// Corpora to search (quran, hadith, both)
    #[arg(short, long, default_value = "both")]
    pub source: String,

    /// User the question is counted against
    #[arg(short, long, default_value = "anonymous", env = "TADABBUR_USER")]
    pub user: String,

    /// Stream NDJSON events instead of waiting for the whole answer
    #[arg(long)]
    pub stream: bool,

    /// Output as JSON
    #[arg(long, conflicts_with = "stream")]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing ask command");

        let orchestrator = build_orchestrator(config)?;
        let request = AskRequest::new(self.question.clone())
            .with_limit(self.limit)
            .with_source(SourceFilter::parse(&self.source)?);

        if self.stream {
            return self.stream_answer(&orchestrator, request).await;
        }

        let response = orchestrator.ask(&self.user, &request).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
            return Ok(());
        }

        println!("{}", response.answer);
        if !response.sources.is_empty() {
            println!();
            println!("Sources:");
            print_results(&response.sources);
        }
        if let Some(count) = response.requests_today {
            tracing::debug!("Requests today: {}", count);
        }

        Ok(())
    }

    async fn stream_answer(
        &self,
        orchestrator: &tadabbur_knowledge::Orchestrator,
        request: AskRequest,
    ) -> anyhow::Result<()> {
        let mut events = orchestrator.ask_stream(&self.user, request)?;
        let mut stdout = std::io::stdout();
        let mut failed = None;

        while let Some(event) = events.next().await {
            stdout.write_all(event.to_ndjson_line()?.as_bytes())?;
            stdout.flush()?;

            if let StreamEvent::Error { data, .. } = &event {
                failed = Some(data.clone());
            }
        }

        match failed {
            Some(message) => anyhow::bail!("Answer stream ended with an error: {}", message),
            None => Ok(()),
        }
    }
}
