//! History command handler.

use clap::Args;
use tadabbur_core::config::AppConfig;
use tadabbur_knowledge::{HistoryStore, SqliteHistoryStore};

/// Show a user's past questions
#[derive(Args, Debug)]
pub struct HistoryCommand {
    /// User whose history to show
    #[arg(short, long, default_value = "anonymous", env = "TADABBUR_USER")]
    pub user: String,

    /// Maximum number of entries
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl HistoryCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing history command");

        let store = SqliteHistoryStore::open(&config.history_path())?;
        let entries = store.recent(&self.user, self.limit).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        if entries.is_empty() {
            println!("No history for '{}'.", self.user);
            return Ok(());
        }

        for entry in &entries {
            println!("[{}] {}", entry.created_at.format("%Y-%m-%d %H:%M"), entry.query);
            println!("{}", entry.response);
            let references: Vec<&str> = entry.sources.iter().map(|s| s.reference.as_str()).collect();
            if !references.is_empty() {
                println!("Sources: {}", references.join("; "));
            }
            println!();
        }

        Ok(())
    }
}
