//! Persisted vector index.
//!
//! An ordered list of `(vector, chunk)` entries searched by exact cosine
//! similarity. On disk the index is a directory:
//!
//! ```text
//! faiss_index/
//! ├── index.json    manifest + chunk texts and metadata, in entry order
//! └── vectors.bin   entry vectors as little-endian f32, concatenated
//! ```
//!
//! [`VectorIndex::save`] writes a complete copy into a temporary sibling
//! directory and swaps it into place, so a run either replaces the previous
//! index entirely or leaves it untouched. Vectors are stored bit-exact, so a
//! reloaded index ranks identically to the one that was saved.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, SearchHit};

/// Bumped whenever the on-disk layout changes.
pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "index.json";
const VECTORS_FILE: &str = "vectors.bin";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index directory {0} not found (run `docqa ingest` first)")]
    NotFound(String),
    #[error("index I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("index manifest is corrupt: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("unsupported index format version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("index was built with embedding model '{found}', but '{expected}' is configured")]
    ModelMismatch { found: String, expected: String },
    #[error("vector data is corrupt: expected {expected} bytes, found {found}")]
    VectorSize { expected: usize, found: usize },
    #[error("index is corrupt: {0}")]
    Corrupt(String),
    #[error("{chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },
    #[error("vector {index} has {found} dimensions, expected {expected}")]
    Dimension {
        index: usize,
        found: usize,
        expected: usize,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> IndexError + '_ {
    move |source| IndexError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    model: String,
    dims: usize,
    created_at: String,
    chunks: Vec<Chunk>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    created_at: String,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Build an index from chunks and their vectors, in the same order.
    pub fn build(
        model: &str,
        dims: usize,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if let Some((index, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
            return Err(IndexError::Dimension {
                index,
                found: v.len(),
                expected: dims,
            });
        }
        Ok(Self {
            model: model.to_string(),
            dims,
            created_at: Utc::now().to_rfc3339(),
            chunks,
            vectors,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Return the `k` entries most similar to `query`, best first.
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }

    /// Persist to `dir`, replacing whatever index was there before.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        let parent = match dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(io_err(&parent))?;

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        let staging = parent.join(format!(".{}.tmp-{}", name, Uuid::new_v4()));

        if let Err(e) = self.write_files(&staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let retired = parent.join(format!(".{}.old-{}", name, Uuid::new_v4()));
        let had_previous = dir.exists();
        if had_previous {
            fs::rename(dir, &retired).map_err(io_err(dir))?;
        }
        if let Err(source) = fs::rename(&staging, dir) {
            if had_previous {
                let _ = fs::rename(&retired, dir);
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(IndexError::Io {
                path: dir.display().to_string(),
                source,
            });
        }
        if had_previous {
            if let Err(e) = fs::remove_dir_all(&retired) {
                tracing::warn!("could not remove old index {}: {}", retired.display(), e);
            }
        }

        tracing::info!(
            "saved index with {} chunks to {}",
            self.chunks.len(),
            dir.display()
        );
        Ok(())
    }

    fn write_files(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let manifest = Manifest {
            version: FORMAT_VERSION,
            model: self.model.clone(),
            dims: self.dims,
            created_at: self.created_at.clone(),
            chunks: self.chunks.clone(),
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(&manifest)?;
        fs::write(&manifest_path, json).map_err(io_err(&manifest_path))?;

        let mut blob = Vec::with_capacity(self.vectors.len() * self.dims * 4);
        for v in &self.vectors {
            blob.extend_from_slice(&vec_to_blob(v));
        }
        let vectors_path = dir.join(VECTORS_FILE);
        fs::write(&vectors_path, blob).map_err(io_err(&vectors_path))?;
        Ok(())
    }

    /// Load an index from `dir`.
    ///
    /// When `expected_model` is given, an index built by any other embedding
    /// model is rejected.
    pub fn load(dir: &Path, expected_model: Option<&str>) -> Result<Self, IndexError> {
        if !dir.is_dir() {
            return Err(IndexError::NotFound(dir.display().to_string()));
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = fs::read(&manifest_path).map_err(io_err(&manifest_path))?;
        let manifest: Manifest = serde_json::from_slice(&raw)?;

        if manifest.version != FORMAT_VERSION {
            return Err(IndexError::Version {
                found: manifest.version,
                expected: FORMAT_VERSION,
            });
        }
        if let Some(expected) = expected_model {
            if manifest.model != expected {
                return Err(IndexError::ModelMismatch {
                    found: manifest.model,
                    expected: expected.to_string(),
                });
            }
        }

        let vectors_path = dir.join(VECTORS_FILE);
        let blob = fs::read(&vectors_path).map_err(io_err(&vectors_path))?;
        let expected_len = manifest
            .chunks
            .len()
            .checked_mul(manifest.dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                IndexError::Corrupt(format!(
                    "{} chunks of {} dimensions exceed the addressable vector size",
                    manifest.chunks.len(),
                    manifest.dims
                ))
            })?;
        if blob.len() != expected_len {
            return Err(IndexError::VectorSize {
                expected: expected_len,
                found: blob.len(),
            });
        }

        // With at least one chunk, `dims * 4 <= expected_len` cannot overflow.
        let vectors = if manifest.chunks.is_empty() {
            Vec::new()
        } else if manifest.dims == 0 {
            vec![Vec::new(); manifest.chunks.len()]
        } else {
            blob.chunks_exact(manifest.dims * 4).map(blob_to_vec).collect()
        };

        tracing::debug!(
            "loaded index with {} chunks ({}, {} dims)",
            manifest.chunks.len(),
            manifest.model,
            manifest.dims
        );

        Ok(Self {
            model: manifest.model,
            dims: manifest.dims,
            created_at: manifest.created_at,
            chunks: manifest.chunks,
            vectors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(i: usize, text: &str) -> Chunk {
        Chunk {
            id: format!("c{}", i),
            source: "test.txt".to_string(),
            page: 1,
            chunk_index: i as i64,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    /// Five orthogonal-ish entries; entry `i` points mostly along axis `i`.
    fn five_entry_index() -> VectorIndex {
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk(i, &format!("chunk {}", i))).collect();
        let vectors: Vec<Vec<f32>> = (0..5)
            .map(|i| {
                let mut v = vec![0.1f32; 5];
                v[i] = 1.0;
                v
            })
            .collect();
        VectorIndex::build("test-model", 5, chunks, vectors).unwrap()
    }

    fn ranking(index: &VectorIndex, query: &[f32]) -> Vec<String> {
        index
            .search(query, 3)
            .into_iter()
            .map(|h| h.chunk.id)
            .collect()
    }

    #[test]
    fn test_search_ranks_best_first() {
        let index = five_entry_index();
        let hits = index.search(&[0.0, 0.0, 1.0, 0.0, 0.0], 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.text, "chunk 2");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = five_entry_index();
        assert_eq!(index.search(&[1.0; 5], 10).len(), 5);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let chunks = (0..3).map(|i| chunk(i, "same")).collect();
        let vectors = vec![vec![1.0, 0.0]; 3];
        let index = VectorIndex::build("m", 2, chunks, vectors).unwrap();
        let ids: Vec<String> = index
            .search(&[1.0, 0.0], 3)
            .into_iter()
            .map(|h| h.chunk.id)
            .collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn test_save_reload_preserves_ranking() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("faiss_index");
        let index = five_entry_index();
        let query = [0.05, 0.2, 0.9, 0.3, 0.0];
        let before = ranking(&index, &query);
        assert_eq!(before[0], "c2");

        index.save(&dir).unwrap();
        let reloaded = VectorIndex::load(&dir, Some("test-model")).unwrap();

        assert_eq!(reloaded.len(), 5);
        assert_eq!(reloaded.dims(), 5);
        assert_eq!(reloaded.created_at(), index.created_at());
        assert_eq!(ranking(&reloaded, &query), before);
        assert_eq!(reloaded.chunks(), index.chunks());
    }

    #[test]
    fn test_save_replaces_previous_index() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("faiss_index");
        five_entry_index().save(&dir).unwrap();

        let small = VectorIndex::build("test-model", 2, vec![chunk(0, "only")], vec![vec![1.0, 0.0]])
            .unwrap();
        small.save(&dir).unwrap();

        let reloaded = VectorIndex::load(&dir, None).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.chunks()[0].text, "only");

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "stale staging dirs: {:?}", leftovers);
    }

    #[test]
    fn test_load_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let err = VectorIndex::load(&tmp.path().join("nope"), None).unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_other_model() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        five_entry_index().save(&dir).unwrap();
        let err = VectorIndex::load(&dir, Some("all-minilm-l6-v2")).unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));
    }

    #[test]
    fn test_load_rejects_truncated_vectors() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        five_entry_index().save(&dir).unwrap();
        fs::write(dir.join(VECTORS_FILE), [0u8; 7]).unwrap();
        let err = VectorIndex::load(&dir, None).unwrap_err();
        assert!(matches!(err, IndexError::VectorSize { .. }));
    }

    fn rewrite_dims(dir: &Path, dims: u64, keep_chunks: bool) {
        let path = dir.join(MANIFEST_FILE);
        let mut manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        manifest["dims"] = serde_json::json!(dims);
        if !keep_chunks {
            manifest["chunks"] = serde_json::json!([]);
        }
        fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();
    }

    #[test]
    fn test_load_rejects_overflowing_dims() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        five_entry_index().save(&dir).unwrap();
        rewrite_dims(&dir, 1 << 62, true);
        fs::write(dir.join(VECTORS_FILE), [0u8; 0]).unwrap();

        let err = VectorIndex::load(&dir, None).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
        assert!(err.to_string().contains("index is corrupt"));
    }

    #[test]
    fn test_load_huge_dims_without_chunks_is_empty() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        five_entry_index().save(&dir).unwrap();
        rewrite_dims(&dir, 1 << 62, false);
        fs::write(dir.join(VECTORS_FILE), [0u8; 0]).unwrap();

        let index = VectorIndex::load(&dir, None).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0], 3).is_empty());
    }

    #[test]
    fn test_load_rejects_corrupt_manifest() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("idx");
        five_entry_index().save(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), "{ not json").unwrap();
        let err = VectorIndex::load(&dir, None).unwrap_err();
        assert!(matches!(err, IndexError::Manifest(_)));
    }

    #[test]
    fn test_build_checks_lengths_and_dims() {
        let err = VectorIndex::build("m", 2, vec![chunk(0, "a")], vec![]).unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { .. }));
        let err = VectorIndex::build("m", 2, vec![chunk(0, "a")], vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, IndexError::Dimension { .. }));
    }
}
