//! Recursive separator text splitter.
//!
//! Splits page text into [`Chunk`]s of at most `chunk_size` characters with
//! `chunk_overlap` characters of context carried from one chunk into the next.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from the prioritized list that occurs in the
//!    text (the empty separator always matches and splits into characters).
//! 2. Split on it, keeping the separator at the start of each following piece.
//! 3. Pieces shorter than `chunk_size` are collected and greedily merged.
//!    When the next piece would overflow, the buffer is emitted and pieces are
//!    dropped from its front until at most `chunk_overlap` characters remain;
//!    that tail opens the next chunk.
//! 4. A piece that is itself too long is split again with the remaining,
//!    finer separators. With none left it is emitted as-is.
//!
//! Emitted chunks are whitespace-trimmed and empty ones are dropped. All
//! lengths are counted in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use docqa::chunk::RecursiveSplitter;
//!
//! let splitter = RecursiveSplitter::default();
//! let chunks = splitter.split_text("Hello world.\n\nSecond paragraph.");
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

use std::collections::VecDeque;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

/// Paragraph break, line break, space, then single characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize, separators: Vec<String>) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        if separators.is_empty() {
            bail!("at least one separator is required");
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(
            config.chunk_size,
            config.chunk_overlap,
            config.separators.clone(),
        )
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    /// Split every page of a document. Chunk indices are contiguous across
    /// the whole document, starting at 0.
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        let source = doc.source.display().to_string();
        let mut chunks = Vec::new();
        let mut chunk_index: i64 = 0;

        for page in &doc.pages {
            for text in self.split_text(&page.text) {
                chunks.push(make_chunk(&source, page.number, chunk_index, &text));
                chunk_index += 1;
            }
        }

        chunks
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);
        let mut final_chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                final_chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_with(piece, finer));
            }
        }

        if !fitting.is_empty() {
            final_chunks.extend(self.merge(&fitting));
        }

        final_chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if total > self.chunk_size {
                    tracing::warn!(
                        "created a chunk of {} chars, longer than the limit of {}",
                        total,
                        self.chunk_size
                    );
                }
                if let Some(text) = join_trimmed(&current) {
                    out.push(text);
                }
                // Keep a tail of at most `chunk_overlap` chars that still
                // leaves room for the incoming piece.
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(first);
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(text) = join_trimmed(&current) {
            out.push(text);
        }
        out
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return ("", &[]);
        }
        if text.contains(sep.as_str()) {
            return (sep, &separators[i + 1..]);
        }
    }
    (separators.last().map(String::as_str).unwrap_or(""), &[])
}

/// Split on `separator`, attaching each occurrence to the start of the piece
/// that follows it. Empty pieces are dropped.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_trimmed(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(source: &str, page: usize, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        page,
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Page;
    use std::path::PathBuf;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(
            size,
            overlap,
            DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("w{:04}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = RecursiveSplitter::default().split_text("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(RecursiveSplitter::default().split_text("").is_empty());
        assert!(RecursiveSplitter::default().split_text(" \n\n ").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let p1 = "alpha ".repeat(100).trim().to_string();
        let p2 = "bravo ".repeat(100).trim().to_string();
        let text = format!("{}\n\n{}", p1, p2);

        let chunks = splitter(1000, 200).split_text(&text);
        assert_eq!(chunks, vec![p1, p2]);
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let text = words(2000);
        let chunks = splitter(100, 20).split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 100, "chunk too long: {}", c.len());
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = words(200);
        let chunks = splitter(50, 20).split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].contains(first_word),
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_no_overlap_when_disabled() {
        let text = words(200);
        let chunks = splitter(50, 0).split_text(&text);
        let rejoined = chunks.join(" ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(25);
        let chunks = splitter(10, 0).split_text(&text);
        let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![10, 10, 5]);
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let text = "é".repeat(30);
        let chunks = splitter(10, 0).split_text(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() == 10));
    }

    #[test]
    fn test_deterministic() {
        let text = format!("{}\n\n{}\n{}", words(300), words(50), words(400));
        let s = splitter(200, 40);
        assert_eq!(s.split_text(&text), s.split_text(&text));
    }

    #[test]
    fn test_split_keeping_separator() {
        assert_eq!(
            split_keeping_separator("a\n\nb\n\n\n\nc", "\n\n"),
            vec!["a", "\n\nb", "\n\n", "\n\nc"]
        );
        assert_eq!(split_keeping_separator("\n\nx", "\n\n"), vec!["\n\nx"]);
    }

    #[test]
    fn test_split_document_indices_and_pages() {
        let doc = Document {
            source: PathBuf::from("report.pdf"),
            pages: vec![
                Page {
                    number: 1,
                    text: words(40),
                },
                Page {
                    number: 2,
                    text: String::new(),
                },
                Page {
                    number: 3,
                    text: words(40),
                },
            ],
        };
        let chunks = splitter(100, 20).split_document(&doc);
        assert!(chunks.len() >= 4);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.source, "report.pdf");
            assert_ne!(c.page, 2);
            assert_eq!(c.hash.len(), 64);
        }
        assert_eq!(chunks.first().unwrap().page, 1);
        assert_eq!(chunks.last().unwrap().page, 3);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(RecursiveSplitter::new(0, 0, vec!["".into()]).is_err());
        assert!(RecursiveSplitter::new(100, 100, vec!["".into()]).is_err());
        assert!(RecursiveSplitter::new(100, 10, vec![]).is_err());
    }
}
