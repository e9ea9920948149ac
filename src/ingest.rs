//! Ingestion pipeline: load → split → embed → save.
//!
//! One run indexes one document and replaces whatever index was at
//! `index.dir` before. Progress is reported on stdout as numbered stages.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::chunk::RecursiveSplitter;
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::extract::load_document;
use crate::index::VectorIndex;
use crate::models::Chunk;

/// What an ingestion run produced.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source: PathBuf,
    pub pages: usize,
    pub chunks: usize,
    pub model: String,
    pub dims: usize,
    pub index_dir: PathBuf,
}

/// A loaded and split document, ready for embedding.
#[derive(Debug)]
pub struct PreparedDocument {
    pub source: PathBuf,
    pub pages: usize,
    pub chunks: Vec<Chunk>,
}

/// Stages 1 and 2: read the document and split it into chunks.
pub fn prepare_document(config: &Config, source: &Path) -> Result<PreparedDocument> {
    println!("--- 1. Loading {}... ---", source.display());
    let document = load_document(source)?;
    tracing::debug!(pages = document.pages.len(), chars = document.char_count(), "document loaded");

    let splitter = RecursiveSplitter::from_config(&config.chunking)?;
    let chunks = splitter.split_document(&document);
    println!("--- 2. Split into {} chunks ---", chunks.len());

    if chunks.is_empty() {
        bail!("{} produced no chunks", source.display());
    }

    Ok(PreparedDocument {
        source: source.to_path_buf(),
        pages: document.pages.len(),
        chunks,
    })
}

/// Stage 3: embed every chunk and persist the index.
pub fn embed_and_save(
    config: &Config,
    prepared: PreparedDocument,
    provider: &dyn EmbeddingProvider,
) -> Result<IngestReport> {
    println!(
        "--- 3. Embedding with {} (this may take a minute)... ---",
        provider.model_name()
    );

    let vectors = embed_chunks(&prepared.chunks, provider, config.embedding.batch_size)?;
    let chunk_count = prepared.chunks.len();
    let index = VectorIndex::build(provider.model_name(), provider.dims(), prepared.chunks, vectors)?;

    let dir = &config.index.dir;
    index
        .save(dir)
        .with_context(|| format!("Failed to save index to {}", dir.display()))?;
    println!(
        "--- SUCCESS! Database saved to folder '{}' ---",
        dir.display()
    );

    Ok(IngestReport {
        source: prepared.source,
        pages: prepared.pages,
        chunks: chunk_count,
        model: provider.model_name().to_string(),
        dims: provider.dims(),
        index_dir: dir.clone(),
    })
}

/// Run the whole pipeline with an already-created provider.
pub fn ingest_document(
    config: &Config,
    source: &Path,
    provider: &dyn EmbeddingProvider,
) -> Result<IngestReport> {
    let prepared = prepare_document(config, source)?;
    embed_and_save(config, prepared, provider)
}

/// `docqa ingest`: the configured source (or `source_override`) into
/// `index.dir`. The embedding model is loaded only after the document has
/// been read and split.
pub fn run_ingest(config: &Config, source_override: Option<PathBuf>) -> Result<IngestReport> {
    let source = source_override.unwrap_or_else(|| config.source.path.clone());
    let prepared = prepare_document(config, &source)?;

    let provider = create_provider(&config.embedding)?;
    let report = embed_and_save(config, prepared, provider.as_ref())?;

    tracing::info!(
        source = %report.source.display(),
        pages = report.pages,
        chunks = report.chunks,
        model = %report.model,
        "ingest complete"
    );
    Ok(report)
}

fn embed_chunks(
    chunks: &[Chunk],
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(chunks.len());

    for (i, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = provider
            .embed(&texts)
            .with_context(|| format!("Embedding batch {} failed", i + 1))?;
        if embedded.len() != texts.len() {
            bail!(
                "Embedding batch {} returned {} vectors for {} chunks",
                i + 1,
                embedded.len(),
                texts.len()
            );
        }
        tracing::debug!(batch = i + 1, done = vectors.len() + embedded.len(), total = chunks.len());
        vectors.extend(embedded);
    }

    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Letter-frequency embedder that counts how often it is called.
    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn setup(text: &str) -> (TempDir, Config, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("report.txt");
        fs::write(&source, text).unwrap();
        let mut config = Config::default();
        config.index.dir = tmp.path().join("index");
        config.chunking.chunk_size = 50;
        config.chunking.chunk_overlap = 10;
        config.embedding.batch_size = 2;
        (tmp, config, source)
    }

    #[test]
    fn test_ingest_writes_loadable_index() {
        let text = "Apple reported revenue growth.\n\nServices hit a record.\n\nThe board approved a dividend increase.";
        let (_tmp, config, source) = setup(text);
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };

        let report = ingest_document(&config, &source, &provider).unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.dims, 26);
        // 3 chunks in batches of 2
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let index = VectorIndex::load(&config.index.dir, Some("letters")).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.chunks()[1].text, "Services hit a record.");
    }

    #[test]
    fn test_missing_source_fails_before_embedding() {
        let (tmp, config, _) = setup("x");
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };

        let missing = tmp.path().join("absent.pdf");
        assert!(ingest_document(&config, &missing, &provider).is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(!config.index.dir.exists());
    }

    #[test]
    fn test_reingest_replaces_index() {
        let (_tmp, config, source) = setup("first version of the report");
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        ingest_document(&config, &source, &provider).unwrap();

        fs::write(&source, "second\n\nversion").unwrap();
        ingest_document(&config, &source, &provider).unwrap();

        let index = VectorIndex::load(&config.index.dir, None).unwrap();
        let texts: Vec<&str> = index.chunks().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["second\n\nversion"]);
    }

    #[test]
    fn test_embed_chunks_rejects_short_batches() {
        struct Lossy;
        impl EmbeddingProvider for Lossy {
            fn model_name(&self) -> &str {
                "lossy"
            }
            fn dims(&self) -> usize {
                1
            }
            fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(vec![vec![1.0]])
            }
        }

        let (_tmp, config, source) = setup("one two three four five six seven eight nine ten eleven twelve");
        let prepared = prepare_document(&config, &source).unwrap();
        assert!(prepared.chunks.len() > 1);
        let err = embed_and_save(&config, prepared, &Lossy).unwrap_err();
        assert!(err.to_string().contains("returned 1 vectors"));
    }
}
