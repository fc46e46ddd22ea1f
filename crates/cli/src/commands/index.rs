//! Index command handler.
//!
//! Loads both corpora, building and persisting any missing or stale
//! index along the way.

use clap::Args;
use tadabbur_core::config::AppConfig;
use tadabbur_knowledge::bootstrap::build_store;

/// Load or build both corpus indices
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing index command");

        let store = build_store(config);
        let stats = store.warm_up().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Coran:  {} documents", stats.quran);
            println!("Hadith: {} documents", stats.hadith);
        }

        if stats.quran == 0 && stats.hadith == 0 {
            tracing::warn!(
                "No corpus data found. Expected {:?} and {:?}",
                config.resolve_path(&config.corpora.quran_data),
                config.resolve_path(&config.corpora.hadith_data)
            );
        }

        Ok(())
    }
}
