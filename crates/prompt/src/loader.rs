//! Prompt loader for YAML prompt definitions.
//!
//! Built-in prompts are compiled into the binary. A file named
//! `<id>.yml` in the configured prompts directory replaces the built-in
//! prompt with the same id.

use crate::types::PromptDefinition;
use std::path::Path;
use tadabbur_core::{AppError, AppResult};

/// Prompt id used to turn a question into search keywords.
pub const QUERY_REWRITE: &str = "query.rewrite";

/// Prompt id used to answer from retrieved sources.
pub const ANSWER_GROUNDED: &str = "answer.grounded";

const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    (QUERY_REWRITE, include_str!("../prompts/query.rewrite.yml")),
    (ANSWER_GROUNDED, include_str!("../prompts/answer.grounded.yml")),
];

/// Load a prompt definition by ID.
///
/// # Arguments
/// * `prompts_dir` - Optional directory of overrides
/// * `prompt_id` - Prompt identifier (e.g., "answer.grounded")
///
/// # Example
/// ```no_run
/// use tadabbur_prompt::{load_prompt, ANSWER_GROUNDED};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(None, ANSWER_GROUNDED)?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(prompts_dir: Option<&Path>, prompt_id: &str) -> AppResult<PromptDefinition> {
    if let Some(dir) = prompts_dir {
        let prompt_file = dir.join(format!("{}.yml", prompt_id));

        if prompt_file.exists() {
            tracing::debug!("Loading prompt override from: {:?}", prompt_file);

            let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
                AppError::Prompt(format!(
                    "Failed to read prompt file {:?}: {}",
                    prompt_file, e
                ))
            })?;

            let definition = parse_prompt(&contents, &prompt_file.display().to_string())?;
            if definition.id != prompt_id {
                return Err(AppError::Prompt(format!(
                    "Prompt file {:?} declares id '{}', expected '{}'",
                    prompt_file, definition.id, prompt_id
                )));
            }

            tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);
            return Ok(definition);
        }
    }

    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
}

/// List all available prompt IDs: built-ins plus any overrides.
pub fn list_prompts(prompts_dir: Option<&Path>) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| id.to_string())
        .collect();

    if let Some(dir) = prompts_dir.filter(|d| d.exists()) {
        for entry in walkdir::WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !prompt_ids.iter().any(|id| id == stem) {
                        prompt_ids.push(stem.to_string());
                    }
                }
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
