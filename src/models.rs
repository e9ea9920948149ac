//! Core data models used throughout docqa.
//!
//! These types represent the document, its chunks, and the retrieval hits
//! that flow through the ingestion and query pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One page of extracted text. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub text: String,
}

/// A loaded source document. Lives only for the duration of an ingestion run.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: PathBuf,
    pub pages: Vec<Page>,
}

impl Document {
    /// Total number of characters across all pages.
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// A bounded slice of a page, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub page: usize,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned from the vector index together with its similarity.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}
