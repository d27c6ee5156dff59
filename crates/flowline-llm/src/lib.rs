pub mod providers;
pub mod streaming;

use std::sync::Arc;

use flowline_core::config::{LlmConfig, ProviderConfig};
use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::LlmProvider;

pub use providers::anthropic::ClaudeProvider;
pub use providers::gemini::GeminiProvider;
pub use providers::openai::OpenAiProvider;

/// Create a provider by the name flows use in `llm_provider`.
pub fn create_provider(name: &str, config: ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    match name.to_ascii_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config))),
        "claude" | "anthropic" => Ok(Arc::new(ClaudeProvider::new(config))),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config))),
        _ => Err(FlowlineError::UnsupportedProvider(name.to_string())),
    }
}

/// A configured provider and the model its steps default to.
pub struct RegisteredProvider {
    pub name: String,
    pub provider: Arc<dyn LlmProvider>,
    pub default_model: Option<String>,
}

/// The providers enabled in `[llm]`.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut registry = Self::default();
        let sections = [
            ("openai", &config.openai),
            ("claude", &config.claude),
            ("gemini", &config.gemini),
        ];
        for (name, section) in sections {
            let Some(section) = section else { continue };
            if let Ok(provider) = create_provider(name, section.clone()) {
                tracing::debug!(provider = name, model = ?section.model, "LLM provider configured");
                registry.providers.push(RegisteredProvider {
                    name: name.to_string(),
                    provider,
                    default_model: section.model.clone(),
                });
            }
        }
        registry
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProvider> {
        self.providers.iter()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredProvider> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
