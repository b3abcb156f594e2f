//! PDF to page records: layout reconstruction, cleanup and chapter
//! tracking.

pub mod fonts;
pub mod layout;
pub mod pdf;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use futures_util::stream::{self, StreamExt};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use self::layout::{is_readable, reconstruct, FontProfile};
use self::pdf::PdfDocument;
use super::types::PageRecord;
use crate::core::config::settings::DocumentSettings;
use crate::core::errors::RagError;

/// Longest line still considered as a chapter heading.
const MAX_HEADING_CHARS: usize = 120;

static CONTROL_CHARS: OnceLock<Regex> = OnceLock::new();
static HORIZONTAL_SPACE: OnceLock<Regex> = OnceLock::new();
static LINE_EDGE_SPACE: OnceLock<Regex> = OnceLock::new();
static BROKEN_WORD: OnceLock<Regex> = OnceLock::new();
static BLANK_LINES: OnceLock<Regex> = OnceLock::new();
static CHAPTER_LINE: OnceLock<Regex> = OnceLock::new();
static HEADING_LINE: OnceLock<Regex> = OnceLock::new();

fn control_chars() -> &'static Regex {
    CONTROL_CHARS
        .get_or_init(|| Regex::new(r"[\x00-\x08\x0B-\x1F\x7F]").expect("valid control pattern"))
}

fn horizontal_space() -> &'static Regex {
    HORIZONTAL_SPACE.get_or_init(|| Regex::new(r"[ \t]+").expect("valid space pattern"))
}

fn line_edge_space() -> &'static Regex {
    LINE_EDGE_SPACE.get_or_init(|| Regex::new(r" *\n *").expect("valid line edge pattern"))
}

fn broken_word() -> &'static Regex {
    BROKEN_WORD.get_or_init(|| Regex::new(r"(\w)-\n(\w)").expect("valid hyphenation pattern"))
}

fn blank_lines() -> &'static Regex {
    BLANK_LINES.get_or_init(|| Regex::new(r"\n{3,}").expect("valid blank line pattern"))
}

fn chapter_regex() -> &'static Regex {
    CHAPTER_LINE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:#{1,6}\s*)?((?:chapitre|chapter)\s+(?:\d+|[ivxlc]+)\b.*)$")
            .expect("valid chapter pattern")
    })
}

fn heading_regex() -> &'static Regex {
    HEADING_LINE.get_or_init(|| Regex::new(r"^#{1,3}\s+(.+)$").expect("valid heading pattern"))
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub min_page_chars: usize,
    pub parallel_files: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_page_chars: 50,
            parallel_files: 4,
        }
    }
}

impl From<&DocumentSettings> for ExtractorConfig {
    fn from(settings: &DocumentSettings) -> Self {
        Self {
            min_page_chars: settings.min_page_chars,
            parallel_files: settings.parallel_files.max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Outcome of loading a directory; per-file failures do not abort the batch.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub pages: Vec<PageRecord>,
    pub files_found: usize,
    pub files_loaded: usize,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub file_size_kb: f64,
    pub total_pages: u32,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub sha256: String,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentExtractor {
    config: ExtractorConfig,
}

impl DocumentExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extracts every page of `path` worth keeping, in page order.
    pub fn extract(&self, path: &Path) -> Result<Vec<PageRecord>, RagError> {
        let document = PdfDocument::open(path)?;
        let source = file_name(path);
        let total_pages = document.page_count();
        let texts = page_texts(&document);

        let pages = assemble_pages(&source, total_pages, texts, self.config.min_page_chars);
        tracing::debug!(
            "{}: kept {} of {} pages",
            source,
            pages.len(),
            total_pages
        );
        Ok(pages)
    }

    /// Extracts every `*.pdf` file under `dir` (not recursive), a few
    /// files at a time. A missing or empty directory yields an empty report.
    pub async fn load_all(&self, dir: &Path) -> Result<LoadReport, RagError> {
        let files = pdf_files(dir)?;
        let files_found = files.len();
        if files.is_empty() {
            tracing::warn!("No PDF files found in {}", dir.display());
            return Ok(LoadReport::default());
        }
        tracing::info!("Found {} PDF files in {}", files_found, dir.display());

        let results: Vec<(PathBuf, Result<Vec<PageRecord>, RagError>)> =
            stream::iter(files.into_iter().map(|path| {
                let extractor = self.clone();
                async move {
                    let target = path.clone();
                    let result = tokio::task::spawn_blocking(move || extractor.extract(&target))
                        .await
                        .unwrap_or_else(|e| Err(RagError::extraction(path.display(), e)));
                    (path, result)
                }
            }))
            .buffered(self.config.parallel_files.max(1))
            .collect()
            .await;

        let mut report = LoadReport {
            files_found,
            ..LoadReport::default()
        };
        for (path, result) in results {
            match result {
                Ok(pages) => {
                    tracing::info!("Loaded {} pages from {}", pages.len(), file_name(&path));
                    report.files_loaded += 1;
                    report.pages.extend(pages);
                }
                Err(err) => {
                    tracing::warn!("Skipping {}: {}", path.display(), err);
                    report.failures.push(FileFailure {
                        file: file_name(&path),
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Extracted {} pages from {}/{} files",
            report.pages.len(),
            report.files_loaded,
            report.files_found
        );
        Ok(report)
    }

    /// Cleaned text of one page (1-based).
    pub fn page_text(&self, path: &Path, page: u32) -> Result<String, RagError> {
        let document = PdfDocument::open(path)?;
        let total = document.page_count();
        if page == 0 || page > total {
            return Err(RagError::InvalidInput(format!(
                "page {} out of range (1-{})",
                page, total
            )));
        }

        let profile = FontProfile::from_pages(&document.pages());
        let text = document
            .page(page)
            .map(|raw| render_page(&document, &raw, &profile))
            .unwrap_or_default();
        Ok(clean_text(&text))
    }

    pub fn metadata(&self, path: &Path) -> Result<DocumentMetadata, RagError> {
        let document = PdfDocument::open(path)?;
        let bytes = fs::read(path).map_err(|e| RagError::extraction(path.display(), e))?;
        let info = document.info();

        let mut hasher = Sha256::new();
        hasher.update(&bytes);

        Ok(DocumentMetadata {
            file_name: file_name(path),
            file_size_kb: ((bytes.len() as f64 / 1024.0) * 100.0).round() / 100.0,
            total_pages: document.page_count(),
            title: info.title,
            author: info.author,
            subject: info.subject,
            creator: info.creator,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn pdf_files(dir: &Path) -> Result<Vec<PathBuf>, RagError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(RagError::storage)?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Raw (uncleaned) text of every page, numbered from 1.
fn page_texts(document: &PdfDocument) -> Vec<(u32, String)> {
    let pages = document.pages();
    let profile = FontProfile::from_pages(&pages);
    pages
        .iter()
        .map(|raw| (raw.number, render_page(document, raw, &profile)))
        .collect()
}

fn render_page(document: &PdfDocument, raw: &pdf::RawPage, profile: &FontProfile) -> String {
    let text = reconstruct(raw, profile);
    if is_readable(&text) {
        return text;
    }
    match document.flow_text(raw.number) {
        Some(flow) if !flow.trim().is_empty() => {
            tracing::debug!("page {}: using flow text", raw.number);
            flow
        }
        _ => text,
    }
}

/// Cleans each page, carries the current chapter forward and drops pages
/// shorter than `min_chars`. Chapter headings on dropped pages still count.
pub fn assemble_pages(
    source: &str,
    total_pages: u32,
    pages: Vec<(u32, String)>,
    min_chars: usize,
) -> Vec<PageRecord> {
    pages
        .into_iter()
        .scan(None::<String>, |current, (page, raw)| {
            let text = clean_text(&raw);
            let chapters = chapter_headings(&text);
            let chapter = chapters.first().cloned().or_else(|| current.clone());
            if let Some(last) = chapters.last() {
                *current = Some(last.clone());
            }
            Some((page, text, chapter))
        })
        .filter(|(_, text, _)| text.chars().count() >= min_chars)
        .map(|(page, text, chapter)| PageRecord {
            section: section_heading(&text),
            text,
            source: source.to_string(),
            page,
            total_pages,
            chapter,
        })
        .collect()
}

/// Normalises whitespace, joins words hyphenated across line breaks and
/// strips control characters.
pub fn clean_text(text: &str) -> String {
    let text = control_chars().replace_all(text, "");
    let text = horizontal_space().replace_all(&text, " ");
    let text = line_edge_space().replace_all(&text, "\n");
    let text = broken_word().replace_all(&text, "$1$2");
    let text = blank_lines().replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Chapter headings on a page, in order of appearance.
pub fn chapter_headings(text: &str) -> Vec<String> {
    let pattern = chapter_regex();
    text.lines()
        .filter(|line| line.chars().count() <= MAX_HEADING_CHARS)
        .filter_map(|line| pattern.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// First Markdown heading (levels 1-3) on a page that is not a chapter.
fn section_heading(text: &str) -> Option<String> {
    let heading = heading_regex();
    let chapter = chapter_regex();
    text.lines()
        .filter(|line| !chapter.is_match(line))
        .filter_map(|line| heading.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .find(|title| !title.is_empty())
}
