//! Text embedding backends and the lazily loaded process-wide embedder.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::core::config::settings::{EmbeddingProviderKind, EmbeddingSettings};
use crate::core::errors::RagError;

/// Weight of a word bigram relative to a single word.
const BIGRAM_WEIGHT: f32 = 0.5;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// In-process embedder hashing words and word pairs into a fixed number of
/// buckets. Needs no model download and is deterministic.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return vector;
        }

        let mut weights: HashMap<String, f32> = HashMap::new();
        for word in &words {
            *weights.entry((*word).to_string()).or_default() += 1.0;
        }
        for pair in words.windows(2) {
            *weights.entry(format!("{} {}", pair[0], pair[1])).or_default() += BIGRAM_WEIGHT;
        }

        for (term, weight) in &weights {
            vector[djb2(term) % self.dimension] += weight;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn djb2(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        LOCAL_MODEL
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Client for any server exposing the OpenAI `/embeddings` route.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build embedding client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: settings
                .api_key
                .as_ref()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            dimension: settings.dimension,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(RagError::embedding)?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingBackend(format!(
                "embedding request failed ({}): {}",
                status, text
            )));
        }

        let mut parsed: EmbeddingResponse = res.json().await.map_err(RagError::embedding)?;
        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

/// Name of the hashing embedder, reported as the model in use.
pub const LOCAL_MODEL: &str = "local-hashing";

fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, RagError> {
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbeddingProviderKind::Local => {
            if !settings.model.trim().is_empty() && settings.model != LOCAL_MODEL {
                tracing::warn!(
                    "embedding.model '{}' is ignored by the local provider; using {}",
                    settings.model,
                    LOCAL_MODEL
                );
            }
            Arc::new(HashingEmbedder::new(settings.dimension))
        }
        EmbeddingProviderKind::Openai => Arc::new(OpenAiEmbedder::new(settings)?),
    };
    tracing::info!(
        "Embedding backend ready: {} ({} dimensions)",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

/// Owns the embedder for the lifetime of the process. The backend is
/// built on first use; concurrent first calls share one initialisation.
pub struct EmbeddingService {
    dimension: usize,
    batch_size: usize,
    settings: EmbeddingSettings,
    embedder: OnceCell<Arc<dyn Embedder>>,
}

impl EmbeddingService {
    pub fn new(settings: EmbeddingSettings) -> Self {
        Self {
            dimension: settings.dimension,
            batch_size: settings.batch_size.max(1),
            settings,
            embedder: OnceCell::new(),
        }
    }

    /// Uses `embedder` instead of building one from settings.
    pub fn with_embedder(settings: EmbeddingSettings, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            dimension: embedder.dimension(),
            batch_size: settings.batch_size.max(1),
            settings,
            embedder: OnceCell::from(embedder),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Model the vectors come from: the configured model for remote
    /// providers, the hashing embedder for `local`.
    pub fn model_name(&self) -> &str {
        match self.settings.provider {
            EmbeddingProviderKind::Local => LOCAL_MODEL,
            EmbeddingProviderKind::Openai => &self.settings.model,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.embedder.initialized()
    }

    async fn embedder(&self) -> Result<&Arc<dyn Embedder>, RagError> {
        self.embedder
            .get_or_try_init(|| async { build_embedder(&self.settings) })
            .await
    }

    /// Embeds `texts` in batches, checking every vector has the configured
    /// dimension.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let embedder = self.embedder().await?;
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embedded = embedder.embed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(RagError::EmbeddingBackend(format!(
                    "{} returned {} vectors for {} inputs",
                    embedder.name(),
                    embedded.len(),
                    batch.len()
                )));
            }
            if let Some(bad) = embedded.iter().find(|v| v.len() != self.dimension) {
                return Err(RagError::EmbeddingBackend(format!(
                    "{} returned a {}-dimensional vector, expected {}",
                    embedder.name(),
                    bad.len(),
                    self.dimension
                )));
            }
            vectors.extend(embedded);
        }

        tracing::debug!("Embedded {} texts", vectors.len());
        Ok(vectors)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::EmbeddingBackend("no vector returned for query".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn hashing_embedder_is_normalised_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_text("Centrifuge rotor balance");
        let b = embedder.embed_text("Centrifuge rotor balance");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
        assert!(embedder.embed_text("  ...  ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn local_provider_reports_the_hashing_model() {
        let settings = EmbeddingSettings::default();
        assert!(matches!(settings.provider, EmbeddingProviderKind::Local));
        assert_ne!(settings.model, LOCAL_MODEL);

        let service = EmbeddingService::new(settings.clone());
        assert_eq!(service.model_name(), LOCAL_MODEL);

        let remote = EmbeddingService::new(EmbeddingSettings {
            provider: EmbeddingProviderKind::Openai,
            ..settings
        });
        assert_eq!(remote.model_name(), "sentence-transformers/all-MiniLM-L6-v2");
    }

    #[test]
    fn related_texts_score_higher() {
        let embedder = HashingEmbedder::new(384);
        let query = embedder.embed_text("What is the GMDN code?");
        let hit = embedder.embed_text("| GMDN Code | 17489 |");
        let miss = embedder.embed_text("Wipe the chamber with ethanol after use.");

        assert!(cosine(&query, &hit) > cosine(&query, &miss));
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn name(&self) -> &str {
            "short"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn wrong_dimension_is_an_embedding_error() {
        let service =
            EmbeddingService::with_embedder(EmbeddingSettings::default(), Arc::new(ShortEmbedder));
        let err = service.embed_query("x").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingBackend(_)));
    }

    #[tokio::test]
    async fn service_loads_lazily_and_batches() {
        let settings = EmbeddingSettings {
            dimension: 16,
            batch_size: 2,
            ..EmbeddingSettings::default()
        };
        let service = EmbeddingService::new(settings);
        assert!(!service.is_loaded());

        let texts: Vec<String> = (0..5).map(|i| format!("text {}", i)).collect();
        let vectors = service.embed_documents(&texts).await.unwrap();

        assert!(service.is_loaded());
        assert_eq!(vectors.len(), 5);
        assert!(vectors.iter().all(|v| v.len() == 16));
    }
}
