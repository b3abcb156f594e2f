//! Recursive separator splitting with overlap.
//!
//! Text is cut on the coarsest separator present; pieces still too long are
//! cut again on the next separator. Short neighbouring pieces are then
//! merged back into chunks of at most `chunk_size` characters, carrying up
//! to `chunk_overlap` characters of trailing context into the next chunk.
//! Separators stay attached to the end of the piece they close.

use std::collections::VecDeque;

use crate::core::errors::RagError;

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: Vec<String>,
    ) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Config("chunk size must be at least 1".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }

        let mut separators: Vec<String> = separators;
        // Character splitting always ends the list so no piece outlives it.
        if separators.last().map(|s| !s.is_empty()).unwrap_or(true) {
            separators.retain(|s| !s.is_empty());
            separators.push(String::new());
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into trimmed, non-empty pieces of at most
    /// `chunk_size` characters.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (index, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(sep.as_str()))
            .map(|(i, sep)| (i, sep.as_str()))
            .unwrap_or((separators.len(), ""));
        let finer = separators.get(index + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                chunks.extend(trimmed(&piece));
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                docs.extend(joined(&window));
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                }
            }
            window.push_back(piece);
            total += len;
        }
        docs.extend(joined(&window));
        docs
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn trimmed(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn joined(window: &VecDeque<&str>) -> Option<String> {
    trimmed(&window.iter().copied().collect::<String>())
}

/// Splits after every occurrence of `separator`, keeping it at the end of
/// the piece it closes. An empty separator splits into characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, matched) in text.match_indices(separator) {
        let end = index + matched.len();
        pieces.push(text[start..end].to_string());
        start = end;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::settings::default_separators;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(size, overlap, default_separators()).unwrap()
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = RecursiveSplitter::new(100, 150, default_separators()).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        assert!(RecursiveSplitter::new(100, 100, default_separators()).is_err());
    }

    #[test]
    fn short_text_is_a_single_piece() {
        let pieces = splitter(100, 10).split("  Calibrate the pipette weekly.  ");
        assert_eq!(pieces, vec!["Calibrate the pipette weekly."]);
    }

    #[test]
    fn separators_stay_with_the_preceding_piece() {
        assert_eq!(
            split_keeping_separator("a. b. c", ". "),
            vec!["a. ", "b. ", "c"]
        );
        assert_eq!(split_keeping_separator("ab", ""), vec!["a", "b"]);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let pieces = splitter(50, 0).split(&text);
        assert_eq!(pieces, vec!["a".repeat(40), "b".repeat(40)]);
    }

    #[test]
    fn long_text_respects_size_and_overlaps() {
        let sentence = "The sample rotor must be inspected before every run. ";
        let text = sentence.repeat(20);
        let pieces = splitter(120, 60).split(&text);

        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.chars().count() <= 120));
        for pair in pieces.windows(2) {
            let tail: String = pair[0].chars().rev().take(20).collect::<Vec<_>>().into_iter().rev().collect();
            assert!(pair[1].contains(tail.trim()), "no overlap between {:?} and {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(250);
        let pieces = splitter(100, 0).split(&text);
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.chars().count() <= 100));
    }

    #[test]
    fn custom_separators_still_end_with_characters() {
        let splitter = RecursiveSplitter::new(10, 0, vec!["\n".to_string()]).unwrap();
        let pieces = splitter.split(&"y".repeat(25));
        assert!(pieces.iter().all(|p| p.chars().count() <= 10));
    }
}
