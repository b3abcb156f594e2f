use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::history::QueryLogStore;
use crate::llm::{build_provider, LlmProvider};
use crate::rag::extractor::ExtractorConfig;
use crate::rag::store::{Distance, VectorStore};
use crate::rag::{
    AnswerGenerator, Chunker, DocumentExtractor, EmbeddingService, Retriever, SqliteVectorStore,
    VectorIndex,
};

pub mod error;

use error::InitializationError;

/// Application state shared by every route.
///
/// The vector index is opened exactly once here and handed to handlers by
/// reference; nothing in the crate opens a second handle on the same
/// directory.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<Settings>,
    pub config: ConfigService,
    pub index: Arc<VectorIndex>,
    pub generator: AnswerGenerator,
    pub extractor: DocumentExtractor,
    pub chunker: Chunker,
    pub history: QueryLogStore,
}

impl AppState {
    /// Loads configuration and builds every service from it, including the
    /// configured generation backend.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;
        tracing::info!("Configuration loaded from {}", config.config_path().display());

        let llm = build_provider(&settings.generation)
            .map_err(|e| InitializationError::Llm(e.into()))?;
        if let Some(llm) = &llm {
            match llm.health_check().await {
                Ok(true) => tracing::info!("Generation backend {} is reachable", llm.name()),
                _ => tracing::warn!(
                    "Generation backend {} is not reachable; queries will degrade to context-only answers",
                    llm.name()
                ),
            }
        }

        Self::build(paths, settings, llm).await
    }

    /// Builds the state from already validated settings and an explicit
    /// generation backend (`None` for retrieval-only answers).
    pub async fn build(
        paths: Arc<AppPaths>,
        settings: Settings,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());

        let history = QueryLogStore::new(&paths.db_path)
            .await
            .map_err(|e| InitializationError::History(e.into()))?;

        let distance = settings
            .index
            .distance
            .parse::<Distance>()
            .map_err(|e| InitializationError::Config(e.into()))?;
        let chunker = Chunker::from_settings(&settings.chunking)
            .map_err(|e| InitializationError::Config(e.into()))?;

        let persist_location = paths.collection_dir(&settings.index.collection_name);
        let store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::open(&persist_location)
                .await
                .map_err(|e| InitializationError::Index(e.into()))?,
        );
        let embeddings = Arc::new(EmbeddingService::new(settings.embedding.clone()));
        let index = Arc::new(
            VectorIndex::open(
                store,
                embeddings,
                &settings.index.collection_name,
                distance,
                &persist_location,
            )
            .await
            .map_err(|e| InitializationError::Index(e.into()))?,
        );

        let retriever = Retriever::new(index.clone(), &settings.retrieval);
        let generator = AnswerGenerator::new(retriever, llm, settings.generation.timeout());
        let extractor = DocumentExtractor::new(ExtractorConfig::from(&settings.documents));

        Ok(Arc::new(AppState {
            paths,
            settings: Arc::new(settings),
            config,
            index,
            generator,
            extractor,
            chunker,
            history,
        }))
    }

    /// Closes the database pools and releases the index directory lock.
    pub async fn shutdown(&self) {
        self.index.close().await;
        self.history.close().await;
        tracing::info!("Storage handles closed");
    }
}
