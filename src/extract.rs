//! Source document loading.
//!
//! PDFs are extracted page by page with `pdf-extract`. Anything else is read
//! as UTF-8 text, with form feeds (`\x0c`) treated as page breaks so that the
//! output of tools like `pdftotext` keeps its pagination.

use std::path::Path;

use thiserror::Error;

use crate::models::{Document, Page};

const PDF_MAGIC: &[u8] = b"%PDF";
const PAGE_BREAK: char = '\u{c}';

/// Extraction error. Any of these aborts an ingestion run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("{0} is not valid UTF-8 text")]
    NotUtf8(String),
    #[error("{0} contains no extractable text")]
    Empty(String),
}

/// Load a document from disk, one [`Page`] per source page.
pub fn load_document(path: &Path) -> Result<Document, ExtractError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: display.clone(),
        source,
    })?;

    let raw_pages = if is_pdf(path, &bytes) {
        extract_pdf_pages(&bytes)?
    } else {
        let text = String::from_utf8(bytes).map_err(|_| ExtractError::NotUtf8(display.clone()))?;
        text.split(PAGE_BREAK).map(str::to_string).collect()
    };

    let pages: Vec<Page> = raw_pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page { number: i + 1, text })
        .collect();

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(ExtractError::Empty(display));
    }

    Ok(Document {
        source: path.to_path_buf(),
        pages,
    })
}

fn is_pdf(path: &Path, bytes: &[u8]) -> bool {
    let by_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    by_ext || bytes.starts_with(PDF_MAGIC)
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract panics on some malformed files instead of returning Err.
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser aborted on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))
}
