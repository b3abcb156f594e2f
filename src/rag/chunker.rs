//! Structure-aware chunking of page records.
//!
//! Each page is scanned line by line. Markdown tables are lifted out
//! whole, the remaining text is cut into sections at level 1-3 headings
//! and around tables, and sections longer than the size limit go through
//! the recursive splitter. Blocks keep their order on the page. Every
//! chunk starts with a bracketed breadcrumb of the chapter and headings
//! it belongs to.

use super::splitter::RecursiveSplitter;
use super::types::{ChunkRecord, ChunkStats, ChunkType, PageRecord};
use crate::core::config::settings::{default_separators, ChunkingSettings};
use crate::core::errors::RagError;

const MAX_HEADING_LEVEL: usize = 3;
/// Consecutive pipe-delimited lines needed to form a table.
const MIN_TABLE_ROWS: usize = 2;

#[derive(Debug, Clone)]
pub struct Chunker {
    max_size: usize,
    overlap: usize,
    separators: Vec<String>,
    splitter: RecursiveSplitter,
}

impl Chunker {
    pub fn new(max_size: usize, overlap: usize, separators: Vec<String>) -> Result<Self, RagError> {
        let splitter = RecursiveSplitter::new(max_size, overlap, separators.clone())?;
        Ok(Self {
            max_size,
            overlap,
            separators,
            splitter,
        })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self, RagError> {
        Self::new(
            settings.chunk_size,
            settings.chunk_overlap,
            settings.separators.clone(),
        )
    }

    /// Chunks every page and numbers the result from 1 in emission order.
    pub fn chunk(&self, pages: &[PageRecord]) -> Vec<ChunkRecord> {
        let mut chunks: Vec<ChunkRecord> = pages
            .iter()
            .flat_map(|page| self.chunk_page(page))
            .collect();

        for (index, chunk) in chunks.iter_mut().enumerate() {
            chunk.chunk_id = index as u64 + 1;
            chunk.char_count = chunk.text.chars().count();
        }

        tracing::info!("Created {} chunks from {} pages", chunks.len(), pages.len());
        chunks
    }

    fn chunk_page(&self, page: &PageRecord) -> Vec<ChunkRecord> {
        let mut chunks = Vec::new();
        for block in scan_page(&page.text) {
            let header = context_header(page, &block.headings);
            match block.kind {
                ChunkType::Table => {
                    chunks.push(record(page, &block, with_header(header.as_deref(), &block.text)));
                }
                ChunkType::Structured => {
                    for text in self.fit_section(header.as_deref(), &block.text) {
                        chunks.push(record(page, &block, text));
                    }
                }
            }
        }
        chunks
    }

    /// Emits a section whole when it fits, otherwise splits its body so
    /// every piece plus the header stays within `max_size`. A header that
    /// leaves less room than the configured overlap shrinks the overlap
    /// to half of the room. A header longer than `max_size` is still kept.
    fn fit_section(&self, header: Option<&str>, body: &str) -> Vec<String> {
        let header_len = header.map(|h| h.chars().count() + 1).unwrap_or(0);
        if header_len + body.chars().count() <= self.max_size {
            return vec![with_header(header, body)];
        }
        if header.is_none() {
            return self.splitter.split(body);
        }

        let budget = self.max_size.saturating_sub(header_len);
        let pieces = if budget == 0 {
            self.splitter.split(body)
        } else {
            let overlap = if budget > self.overlap {
                self.overlap
            } else {
                budget / 2
            };
            match RecursiveSplitter::new(budget, overlap, self.separators.clone()) {
                Ok(splitter) => splitter.split(body),
                Err(err) => {
                    tracing::warn!("Falling back to the default splitter: {}", err);
                    self.splitter.split(body)
                }
            }
        };

        pieces
            .iter()
            .map(|piece| with_header(header, piece))
            .collect()
    }
}

/// Chunks `pages` with the default separators.
pub fn chunk_pages(
    pages: &[PageRecord],
    max_size: usize,
    overlap: usize,
) -> Result<Vec<ChunkRecord>, RagError> {
    Ok(Chunker::new(max_size, overlap, default_separators())?.chunk(pages))
}

pub fn stats(chunks: &[ChunkRecord]) -> Option<ChunkStats> {
    ChunkStats::from_chunks(chunks)
}

#[derive(Debug)]
struct Block {
    kind: ChunkType,
    text: String,
    headings: Vec<String>,
}

fn record(page: &PageRecord, block: &Block, text: String) -> ChunkRecord {
    ChunkRecord {
        char_count: text.chars().count(),
        text,
        chunk_id: 0,
        chunk_type: block.kind,
        source: page.source.clone(),
        page: page.page,
        chapter: page.chapter.clone(),
        section: page.section.clone(),
        headings: block.headings.clone(),
    }
}

fn with_header(header: Option<&str>, body: &str) -> String {
    match header {
        Some(header) => format!("{}\n{}", header, body),
        None => body.to_string(),
    }
}

/// Splits page text into tables and sections delimited by headings or
/// tables, in page order. Heading-only sections are dropped.
fn scan_page(text: &str) -> Vec<Block> {
    let lines: Vec<&str> = text.lines().collect();
    let mut path: [Option<String>; MAX_HEADING_LEVEL] = Default::default();
    let mut blocks = Vec::new();
    let mut section: Vec<&str> = Vec::new();
    let mut section_headings: Vec<String> = Vec::new();

    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];

        let rows = lines[index..]
            .iter()
            .take_while(|l| is_table_row(l))
            .count();
        if rows >= MIN_TABLE_ROWS {
            flush_section(&mut blocks, &mut section, &section_headings);
            blocks.push(Block {
                kind: ChunkType::Table,
                text: lines[index..index + rows]
                    .iter()
                    .map(|l| l.trim())
                    .collect::<Vec<_>>()
                    .join("\n"),
                headings: current_path(&path),
            });
            index += rows;
            continue;
        }

        if let Some((level, title)) = heading(line) {
            flush_section(&mut blocks, &mut section, &section_headings);
            path[level - 1] = Some(title.to_string());
            for deeper in path.iter_mut().skip(level) {
                *deeper = None;
            }
            section_headings = current_path(&path);
        }
        section.push(line);
        index += 1;
    }
    flush_section(&mut blocks, &mut section, &section_headings);
    blocks
}

fn flush_section(blocks: &mut Vec<Block>, section: &mut Vec<&str>, headings: &[String]) {
    let has_body = section
        .iter()
        .any(|line| !line.trim().is_empty() && heading(line).is_none());
    if has_body {
        let text = section.join("\n").trim().to_string();
        blocks.push(Block {
            kind: ChunkType::Structured,
            text,
            headings: headings.to_vec(),
        });
    }
    section.clear();
}

fn current_path(path: &[Option<String>]) -> Vec<String> {
    path.iter().flatten().cloned().collect()
}

/// `(level, title)` for a Markdown heading of level 1-3.
fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > MAX_HEADING_LEVEL {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then_some((level, title))
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.contains('|') {
        return false;
    }
    let is_separator = trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '));
    if is_separator {
        return true;
    }
    trimmed
        .split('|')
        .filter(|cell| !cell.trim().is_empty())
        .count()
        >= 2
}

/// `[chapter > h1 > h2 > h3 > section]` without empty or repeated labels.
fn context_header(page: &PageRecord, headings: &[String]) -> Option<String> {
    let mut labels: Vec<&str> = Vec::new();
    let candidates = page
        .chapter
        .iter()
        .chain(headings.iter())
        .chain(page.section.iter())
        .map(|label| label.trim());

    for label in candidates {
        if !label.is_empty() && !labels.contains(&label) {
            labels.push(label);
        }
    }

    (!labels.is_empty()).then(|| format!("[{}]", labels.join(" > ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str, chapter: Option<&str>, section: Option<&str>) -> PageRecord {
        PageRecord {
            text: text.to_string(),
            source: "manual.pdf".to_string(),
            page: 3,
            total_pages: 10,
            chapter: chapter.map(String::from),
            section: section.map(String::from),
        }
    }

    #[test]
    fn overlap_not_smaller_than_size_is_a_config_error() {
        let err = chunk_pages(&[], 100, 150).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn tables_become_single_chunks() {
        let text = "# Specifications\nThe device is described below.\n| Field | Value |\n| --- | --- |\n| GMDN Code | 17489 |\nEnd of section text.";
        let chunks = chunk_pages(&[page(text, None, Some("Specifications"))], 1000, 100).unwrap();

        let kinds: Vec<ChunkType> = chunks.iter().map(|c| c.chunk_type).collect();
        assert_eq!(
            kinds,
            vec![ChunkType::Structured, ChunkType::Table, ChunkType::Structured]
        );
        assert_eq!(
            chunks[0].text,
            "[Specifications]\n# Specifications\nThe device is described below."
        );
        assert_eq!(
            chunks[1].text,
            "[Specifications]\n| Field | Value |\n| --- | --- |\n| GMDN Code | 17489 |"
        );
        assert_eq!(chunks[2].text, "[Specifications]\nEnd of section text.");
        assert!(chunks[0].chunk_id < chunks[1].chunk_id);
    }

    #[test]
    fn tables_are_never_split() {
        let rows: Vec<String> = (0..40).map(|i| format!("| Parameter {} | Value {} |", i, i)).collect();
        let chunks = chunk_pages(&[page(&rows.join("\n"), None, None)], 100, 10).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Table);
        assert!(chunks[0].char_count > 100);
    }

    #[test]
    fn sections_split_at_headings_with_breadcrumbs() {
        let text = "# Maintenance\n## Cleaning\nWipe the chamber.\n## Lubrication\nOil the hinge.\n### Schedule\nMonthly.";
        let chunks = chunk_pages(
            &[page(text, Some("Chapter 4 Care"), Some("Maintenance"))],
            1000,
            100,
        )
        .unwrap();

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "[Chapter 4 Care > Maintenance > Cleaning]\n## Cleaning\nWipe the chamber.",
                "[Chapter 4 Care > Maintenance > Lubrication]\n## Lubrication\nOil the hinge.",
                "[Chapter 4 Care > Maintenance > Lubrication > Schedule]\n### Schedule\nMonthly.",
            ]
        );
        assert_eq!(chunks[2].headings, vec!["Maintenance", "Lubrication", "Schedule"]);
    }

    #[test]
    fn long_sections_are_split_within_the_limit() {
        let body = "Check the seal before each run. ".repeat(30);
        let chunks = chunk_pages(&[page(&body, Some("Chapter 1"), None)], 200, 40).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_count <= 200);
            assert!(chunk.text.starts_with("[Chapter 1]\n"));
        }
    }

    #[test]
    fn long_breadcrumbs_shrink_the_overlap_instead_of_dropping() {
        let chapter = "Chapter 7 Preventive maintenance of the rotor";
        let body = "Check the seal before each run. ".repeat(10);
        let chunks = chunk_pages(&[page(&body, Some(chapter), None)], 100, 60).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.starts_with("[Chapter 7 Preventive maintenance of the rotor]\n"));
            assert!(chunk.char_count <= 100, "{} chars: {}", chunk.char_count, chunk.text);
        }
    }

    #[test]
    fn ids_are_sequential_and_counts_match() {
        let pages = vec![
            page(&"Alpha text. ".repeat(30), None, None),
            page("| a | b |\n| c | d |", None, None),
            page(&"Beta text. ".repeat(30), None, None),
        ];
        let chunks = chunk_pages(&pages, 150, 30).unwrap();

        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, index as u64 + 1);
            assert_eq!(chunk.char_count, chunk.text.chars().count());
        }
    }

    #[test]
    fn stats_summarise_chunks() {
        assert!(stats(&[]).is_none());

        let chunks = chunk_pages(
            &[page("Short body text.\n| a | b |\n| c | d |", None, None)],
            1000,
            100,
        )
        .unwrap();
        let summary = stats(&chunks).unwrap();
        assert_eq!(summary.total_chunks, 2);
        assert_eq!(summary.table_chunks, 1);
        assert_eq!(summary.total_chars, chunks.iter().map(|c| c.char_count).sum::<usize>());
    }
}
