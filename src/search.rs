//! `docqa search`: run the retriever directly, without the chat model.
//!
//! Useful for checking what the model will be shown for a question.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::embedding::{create_provider, resolve_local_model};
use crate::index::VectorIndex;
use crate::models::SearchHit;
use crate::tools::RetrieverTool;

/// Load the index and print the top hits for `query`.
pub fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let (model, _) = resolve_local_model(&config.embedding);
    let index = VectorIndex::load(&config.index.dir, Some(&model))?;
    let provider = create_provider(&config.embedding)?;

    let mut retrieval = config.retrieval.clone();
    if let Some(k) = k {
        retrieval.top_k = k.max(1);
    }
    let retriever = RetrieverTool::new(&config.tool, &retrieval, Arc::new(index), Arc::from(provider));

    let hits = retriever.search(query)?;
    print_hits(&hits);
    Ok(())
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} (page {}, chunk {})",
            i + 1,
            hit.score,
            hit.chunk.source,
            hit.chunk.page,
            hit.chunk.chunk_index
        );
        println!("    excerpt: \"{}\"", excerpt(&hit.chunk.text, 240));
        println!("    id: {}", hit.chunk.id);
        println!();
    }
}

/// First `max_chars` characters on one line.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat.to_string(),
    }
}
