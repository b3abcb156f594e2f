//! Ingestion entrypoint: a directory of PDFs becomes the current index.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use super::chunker::{stats, Chunker};
use super::extractor::{DocumentExtractor, FileFailure};
use super::index::VectorIndex;
use super::types::ChunkStats;
use crate::core::errors::RagError;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub failures: Vec<FileFailure>,
    pub pages_extracted: usize,
    pub chunks_created: usize,
    pub entries_indexed: usize,
    pub stats: Option<ChunkStats>,
}

/// Extracts every PDF under `dir`, chunks the pages and rebuilds `index`
/// from scratch. Fails with `NoContent` when no page survives extraction;
/// the existing index is left untouched in that case.
pub async fn ingest_directory(
    dir: &Path,
    extractor: &DocumentExtractor,
    chunker: &Chunker,
    index: &VectorIndex,
) -> Result<IngestReport, RagError> {
    let report = extractor.load_all(dir).await?;

    if report.pages.is_empty() {
        let reason = if report.files_found == 0 {
            format!("no PDF documents found in {}", dir.display())
        } else {
            format!(
                "no extractable pages in {} PDF file(s) under {}",
                report.files_found,
                dir.display()
            )
        };
        warn!("{}", reason);
        return Err(RagError::NoContent(reason));
    }

    let chunks = chunker.chunk(&report.pages);
    let chunk_stats = stats(&chunks);
    let chunks_created = chunks.len();
    let entries_indexed = index.rebuild(chunks).await?;

    info!(
        "Ingested {} of {} file(s): {} pages, {} chunks",
        report.files_loaded,
        report.files_found,
        report.pages.len(),
        chunks_created
    );

    Ok(IngestReport {
        files_found: report.files_found,
        files_processed: report.files_loaded,
        files_failed: report.failures.len(),
        failures: report.failures,
        pages_extracted: report.pages.len(),
        chunks_created,
        entries_indexed,
        stats: chunk_stats,
    })
}
