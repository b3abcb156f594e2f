//! Retrieval pipeline for equipment manuals.
//!
//! PDF → [`extractor`] → pages → [`chunker`] → chunks → [`index`], then
//! question → [`retriever`] → ranked chunks → [`generator`] → answer.

pub mod chunker;
pub mod embedding;
pub mod extractor;
pub mod generator;
pub mod index;
pub mod pipeline;
pub mod retriever;
pub mod splitter;
pub mod sqlite;
pub mod store;
pub mod types;

pub use chunker::Chunker;
pub use embedding::{EmbeddingService, HashingEmbedder};
pub use extractor::DocumentExtractor;
pub use generator::{AnswerGenerator, AnswerStatus, GeneratedAnswer, NOT_FOUND_ANSWER};
pub use index::{IndexInfo, VectorIndex};
pub use pipeline::{ingest_directory, IngestReport};
pub use retriever::Retriever;
pub use sqlite::SqliteVectorStore;
pub use store::{Distance, VectorStore};
pub use types::{ChunkRecord, ChunkStats, ChunkType, PageRecord, ScoredChunk};
