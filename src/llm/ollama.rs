use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::SYSTEM_PROMPT;
use crate::core::errors::RagError;

/// Local generation through an Ollama server.
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl OllamaProvider {
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build Ollama client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            max_tokens,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "system": SYSTEM_PROMPT,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::generation)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::GenerationBackend(format!(
                "Ollama generate error: {}",
                text
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::generation)?;
        payload["response"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                RagError::GenerationBackend("Ollama response has no text".to_string())
            })
    }
}
