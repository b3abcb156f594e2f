use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to initialize query log store: {0}")]
    History(#[source] anyhow::Error),

    #[error("Failed to open vector index: {0}")]
    Index(#[source] anyhow::Error),

    #[error("Failed to initialize generation backend: {0}")]
    Llm(#[source] anyhow::Error),
}
