//! Embedding providers and vector helpers.
//!
//! [`LocalProvider`] runs a sentence-transformer model in-process through
//! fastembed. Model files are fetched from Hugging Face the first time and
//! cached, so ingestion and chat work offline afterwards.
//!
//! The index stores [`EmbeddingProvider::model_name`] next to the vectors.
//! Query vectors from a different model would score meaninglessly, so
//! loading checks that the names agree.

use anyhow::{anyhow, Result};

use crate::config::EmbeddingConfig;

/// Supported local models and their output dimensionality.
pub const LOCAL_MODELS: &[(&str, usize)] = &[
    ("all-minilm-l6-v2", 384),
    ("all-minilm-l12-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("nomic-embed-text-v1.5", 768),
];

/// Turns text into fixed-size vectors. Blocking; one instance is shared for
/// the life of the process.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier recorded in the index, e.g. `"all-minilm-l6-v2"`.
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// One vector per input, in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("{} returned no vector for the query", self.model_name()))
    }
}

/// Configured model name and its dimensionality (`embedding.dims` wins when
/// set).
pub fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let known = LOCAL_MODELS
        .iter()
        .find(|(name, _)| *name == config.model)
        .map(|(_, dims)| *dims);
    (config.model.clone(), config.dims.or(known).unwrap_or(384))
}

#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: std::sync::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    /// Load the configured model, downloading it on first use.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        let Some(which) = fastembed_model(&model_name) else {
            let supported: Vec<&str> = LOCAL_MODELS.iter().map(|(n, _)| *n).collect();
            anyhow::bail!(
                "Unknown embedding model '{}'. Supported: {}",
                model_name,
                supported.join(", ")
            );
        };

        tracing::info!(model = %model_name, "loading embedding model");
        let options =
            fastembed::InitOptions::new(which).with_show_download_progress(config.show_download_progress);
        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| anyhow!("Could not load embedding model '{}': {}", model_name, e))?;

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: std::sync::Mutex::new(model),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("embedding model lock poisoned"))?;
        model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| anyhow!("{} failed to embed: {}", self.model_name, e))
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Option<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel::*;
    Some(match name {
        "all-minilm-l6-v2" => AllMiniLML6V2,
        "all-minilm-l12-v2" => AllMiniLML12V2,
        "bge-small-en-v1.5" => BGESmallENV15,
        "bge-base-en-v1.5" => BGEBaseENV15,
        "nomic-embed-text-v1.5" => NomicEmbedTextV15,
        _ => return None,
    })
}

/// Build the provider named by `embedding.model`.
#[cfg(feature = "local-embeddings-fastembed")]
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    Ok(Box::new(LocalProvider::new(config)?))
}

#[cfg(not(feature = "local-embeddings-fastembed"))]
pub fn create_provider(_config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    anyhow::bail!("docqa was built without the `local-embeddings-fastembed` feature")
}

/// Little-endian `f32` bytes, as stored in `vectors.bin`.
///
/// ```rust
/// use docqa::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![0.5f32, -1.0];
/// assert_eq!(vec_to_blob(&v).len(), 8);
/// assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
/// ```
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_blob`]. Trailing bytes that do not fill an `f32` are
/// ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// `a·b / (|a| |b|)`. Zero when the lengths differ or either vector is
/// empty or all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });

    let norm = (aa * bb).sqrt();
    if norm < f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}
