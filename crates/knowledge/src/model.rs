//! A configured generative model: client plus model name.

use std::sync::Arc;
use tadabbur_llm::{LlmClient, LlmRequest};
use tadabbur_prompt::BuiltPrompt;

/// Handle shared by the rewriter and the generator.
#[derive(Clone)]
pub struct ModelHandle {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl ModelHandle {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Turn a rendered prompt into a request for this model.
    pub fn request(&self, prompt: BuiltPrompt) -> LlmRequest {
        let mut request = LlmRequest::new(prompt.user, self.model.clone());

        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }
        if let Some(temperature) = prompt.parameters.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = prompt.parameters.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        request
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("provider", &self.client.provider_name())
            .field("model", &self.model)
            .finish()
    }
}
