//! Command handlers for the Tadabbur CLI.
//!
//! Each subcommand lives in its own module.

pub mod ask;
pub mod history;
pub mod index;
pub mod search;
pub mod serve;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use history::HistoryCommand;
pub use index::IndexCommand;
pub use search::SearchCommand;
pub use serve::ServeCommand;
