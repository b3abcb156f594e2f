//! Generation backends, chosen once at startup from configuration.

pub mod ollama;
pub mod openai;
pub mod provider;

use std::sync::Arc;

use crate::core::config::settings::{GenerationBackendKind, GenerationSettings};
use crate::core::errors::RagError;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::LlmProvider;

/// System instruction sent alongside every prompt.
pub const SYSTEM_PROMPT: &str = "You are an assistant specialised in the maintenance of medical laboratory equipment. Answer precisely and professionally, relying only on the information provided in the context.";

/// Builds the configured backend. `None` means retrieval-only answers.
pub fn build_provider(
    settings: &GenerationSettings,
) -> Result<Option<Arc<dyn LlmProvider>>, RagError> {
    let provider: Arc<dyn LlmProvider> = match settings.backend {
        GenerationBackendKind::None => {
            tracing::info!("Generation backend disabled; answers will quote retrieved context");
            return Ok(None);
        }
        GenerationBackendKind::Ollama => Arc::new(OllamaProvider::new(
            &settings.ollama_base_url,
            &settings.ollama_model,
            settings.temperature,
            settings.max_tokens,
            settings.timeout(),
        )?),
        GenerationBackendKind::Openai => Arc::new(OpenAiProvider::new(
            &settings.openai_base_url,
            &settings.openai_model,
            settings.openai_api_key.as_deref().unwrap_or_default(),
            settings.temperature,
            settings.max_tokens,
            settings.timeout(),
        )?),
    };

    tracing::info!("Generation backend: {}", provider.name());
    Ok(Some(provider))
}
