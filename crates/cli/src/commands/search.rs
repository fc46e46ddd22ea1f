//! Search command handler.

use clap::Args;
use tadabbur_core::config::AppConfig;
use tadabbur_knowledge::{build_orchestrator, SearchRequest, SearchResult, SourceFilter};

/// Semantic search over the corpora
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Search text
    pub query: String,

    /// Maximum number of results
    #[arg(short, long, default_value_t = tadabbur_knowledge::DEFAULT_SOURCE_LIMIT)]
    pub limit: usize,

    /// Corpora to search (quran, hadith, both)
    #[arg(short, long, default_value = "both")]
    pub source: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing search command");

        let orchestrator = build_orchestrator(config)?;
        let request = SearchRequest {
            query: self.query.clone(),
            limit: self.limit,
            source: SourceFilter::parse(&self.source)?,
        };

        let results = orchestrator.search(&request).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
        } else if results.is_empty() {
            println!("No results.");
        } else {
            print_results(&results);
        }

        Ok(())
    }
}

/// Human-readable listing shared by `search` and `ask`.
pub fn print_results(results: &[SearchResult]) {
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] {} (score {:.4})",
            i + 1,
            result.source_type.tag(),
            result.reference,
            result.score
        );
        println!("   {}", result.text_ar);
        println!("   {}", result.text_fr);
    }
}
