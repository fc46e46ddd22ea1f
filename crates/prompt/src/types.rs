//! Prompt types.

use serde::{Deserialize, Serialize};

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier (e.g., "answer.grounded")
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// What the prompt is for
    #[serde(default)]
    pub description: String,

    /// Sampling parameters forwarded to the model
    #[serde(default)]
    pub parameters: PromptParameters,

    /// System instruction template (Handlebars)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// User message template (Handlebars)
    pub template: String,
}

/// Sampling parameters attached to a prompt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// Rendered system instruction
    pub system: Option<String>,

    /// Rendered user message
    pub user: String,

    /// Parameters copied from the definition
    pub parameters: PromptParameters,

    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,
}
