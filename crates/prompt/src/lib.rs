//! Prompt system for Tadabbur.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions, built in or overridden per workspace
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_prompt, render_template};
pub use loader::{list_prompts, load_prompt, ANSWER_GROUNDED, QUERY_REWRITE};
pub use types::{BuiltPrompt, PromptDefinition, PromptParameters};
