//! Records passed between the extraction, chunking and indexing stages.

use serde::{Deserialize, Serialize};

/// Cleaned text of one PDF page plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub text: String,
    /// File name of the originating PDF.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    pub total_pages: u32,
    /// Most recent chapter heading seen at or before this page.
    pub chapter: Option<String>,
    /// First non-chapter heading found on this page.
    pub section: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Structured,
    Table,
}

/// A unit of text stored and retrieved as one index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    /// 1-based, sequential across the whole corpus.
    pub chunk_id: u64,
    /// Length of `text` in characters.
    pub char_count: usize,
    pub chunk_type: ChunkType,
    pub source: String,
    pub page: u32,
    pub chapter: Option<String>,
    pub section: Option<String>,
    /// Markdown heading path (levels 1-3) enclosing the chunk.
    #[serde(default)]
    pub headings: Vec<String>,
}

impl ChunkRecord {
    /// Citation label used in answers, e.g. `manual.pdf (Page 4)`.
    pub fn citation(&self) -> String {
        format!("{} (Page {})", self.source, self.page)
    }
}

/// A retrieved chunk with its similarity score (higher is better).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkStats {
    pub total_chunks: usize,
    pub table_chunks: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub avg_length: f64,
    pub total_chars: usize,
}

impl ChunkStats {
    /// Length statistics over `chunks`; `None` for an empty slice.
    pub fn from_chunks(chunks: &[ChunkRecord]) -> Option<Self> {
        if chunks.is_empty() {
            return None;
        }

        let lengths: Vec<usize> = chunks.iter().map(|c| c.char_count).collect();
        let total_chars: usize = lengths.iter().sum();

        Some(Self {
            total_chunks: chunks.len(),
            table_chunks: chunks
                .iter()
                .filter(|c| c.chunk_type == ChunkType::Table)
                .count(),
            min_length: lengths.iter().copied().min().unwrap_or(0),
            max_length: lengths.iter().copied().max().unwrap_or(0),
            avg_length: total_chars as f64 / chunks.len() as f64,
            total_chars,
        })
    }
}
