use async_trait::async_trait;

use crate::core::errors::RagError;

/// A text-completion backend: prompt in, answer text out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "ollama", "openai")
    fn name(&self) -> &str;

    /// check if the provider is healthy/reachable
    async fn health_check(&self) -> Result<bool, RagError>;

    /// complete a fully rendered prompt (non-streaming)
    async fn complete(&self, prompt: &str) -> Result<String, RagError>;
}
