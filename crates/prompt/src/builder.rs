//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use handlebars::Handlebars;
use serde::Serialize;
use tadabbur_core::{AppError, AppResult};

/// Build a prompt from a definition and template variables.
///
/// Both the system instruction and the user template are rendered with
/// the same variables.
///
/// # Example
/// ```no_run
/// use tadabbur_prompt::{build_prompt, load_prompt, QUERY_REWRITE};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = load_prompt(None, QUERY_REWRITE)?;
/// let vars = serde_json::json!({ "question": "Que dit le Coran sur la patience ?" });
///
/// let built = build_prompt(&def, &vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt<T: Serialize>(
    definition: &PromptDefinition,
    variables: &T,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, variables))
        .transpose()?;

    let user = render_template(&definition.template, variables)?;

    Ok(BuiltPrompt {
        system,
        user,
        parameters: definition.parameters,
        source_prompt_id: definition.id.clone(),
    })
}

/// Render a Handlebars template with variables.
pub fn render_template<T: Serialize>(template: &str, variables: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Prompts are plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
