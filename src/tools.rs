//! Tools the chat model can call, and the retrieval tool itself.
//!
//! A [`Tool`] is a named, described, callable capability. Its
//! [`parameters_schema`](Tool::parameters_schema) is declared to the model as
//! an OpenAI function-calling schema; when the model asks for it, the agent
//! loop calls [`execute`](Tool::execute) with the decoded JSON arguments and
//! hands the returned text back to the model.
//!
//! ```text
//!   model ──tool_call(query)──▶ RetrieverTool
//!                                  │ embed query
//!                                  │ VectorIndex::search(k)
//!   model ◀──chunk texts joined────┘
//! ```

use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{RetrievalConfig, ToolConfig};
use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::llm::ToolSpec;
use crate::models::SearchHit;

/// Separator placed between retrieved chunks in a tool result.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Where the per-call trace line goes. Stdout unless replaced.
pub type TraceSink = Arc<Mutex<dyn Write + Send>>;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Identifier the model uses to call the tool, e.g. `"search_docs"`.
    fn name(&self) -> &str;

    /// One-line description the model reads to decide whether to call it.
    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the call arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object.
    async fn execute(&self, params: Value) -> Result<String>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The set of tools offered to the model for a session.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Semantic search over the loaded index, exposed as a tool.
pub struct RetrieverTool {
    name: String,
    description: String,
    top_k: usize,
    index: Arc<VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    trace: TraceSink,
}

impl RetrieverTool {
    pub fn new(
        tool: &ToolConfig,
        retrieval: &RetrievalConfig,
        index: Arc<VectorIndex>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            top_k: retrieval.top_k,
            index,
            provider,
            trace: Arc::new(Mutex::new(std::io::stdout())),
        }
    }

    /// Send the trace line to `sink` instead of stdout.
    pub fn with_trace(mut self, sink: TraceSink) -> Self {
        self.trace = sink;
        self
    }

    /// Top-k hits for `query`, best first.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let query_vec = self.provider.embed_query(query)?;
        Ok(self.index.search(&query_vec, self.top_k))
    }

    /// Top-k chunk texts for `query`, joined in rank order.
    pub fn retrieve(&self, query: &str) -> Result<String> {
        if let Ok(mut out) = self.trace.lock() {
            // A broken trace sink must not fail the retrieval.
            let _ = writeln!(out, "   [Tool Called]: Searching PDF for '{}'...", query);
            let _ = out.flush();
        }
        let hits = self.search(query)?;
        tracing::info!(query, hits = hits.len(), "retrieval");

        Ok(hits
            .iter()
            .map(|h| h.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR))
    }
}

#[async_trait]
impl Tool for RetrieverTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to search the document for" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        // Models occasionally send the bare string instead of an object.
        let query = match &params {
            Value::String(s) => s.as_str(),
            other => other["query"].as_str().unwrap_or(""),
        };
        self.retrieve(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    /// Embeds by keyword presence: one axis per known word.
    struct KeywordProvider;

    const WORDS: [&str; 4] = ["revenue", "iphone", "services", "dividend"];

    impl EmbeddingProvider for KeywordProvider {
        fn model_name(&self) -> &str {
            "keywords"
        }
        fn dims(&self) -> usize {
            WORDS.len()
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    WORDS
                        .iter()
                        .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect())
        }
    }

    fn retriever(top_k: usize) -> RetrieverTool {
        let texts = [
            "Total revenue was $383 billion.",
            "iPhone net sales declined.",
            "Services revenue reached a record.",
            "The board declared a dividend.",
        ];
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(KeywordProvider);
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                id: i.to_string(),
                source: "10k.pdf".into(),
                page: i + 1,
                chunk_index: i as i64,
                text: t.to_string(),
                hash: String::new(),
            })
            .collect();
        let vectors = provider
            .embed(&texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
            .unwrap();
        let index = VectorIndex::build("keywords", WORDS.len(), chunks, vectors).unwrap();
        RetrieverTool::new(
            &ToolConfig::default(),
            &RetrievalConfig { top_k },
            Arc::new(index),
            provider,
        )
    }

    #[test]
    fn test_retrieve_joins_in_rank_order() {
        let out = retriever(2).retrieve("dividend").unwrap();
        let parts: Vec<&str> = out.split(CHUNK_SEPARATOR).collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "The board declared a dividend.");
    }

    #[test]
    fn test_retrieve_writes_trace_line() {
        let sink = Arc::new(Mutex::new(Vec::<u8>::new()));
        let tool = retriever(1).with_trace(sink.clone());

        tool.retrieve("iPhone sales").unwrap();
        tool.retrieve("").unwrap();

        let traced = String::from_utf8(sink.lock().unwrap().clone()).unwrap();
        assert_eq!(
            traced,
            "   [Tool Called]: Searching PDF for 'iPhone sales'...\n   [Tool Called]: Searching PDF for ''...\n"
        );
    }

    #[test]
    fn test_retrieve_limits_to_top_k() {
        let out = retriever(3).retrieve("services revenue").unwrap();
        assert_eq!(out.split(CHUNK_SEPARATOR).count(), 3);
        assert!(out.starts_with("Services revenue reached a record."));
    }

    #[tokio::test]
    async fn test_execute_reads_query_param() {
        let tool = retriever(1);
        let out = tool.execute(json!({ "query": "iphone" })).await.unwrap();
        assert_eq!(out, "iPhone net sales declined.");
        let out = tool.execute(json!("iphone")).await.unwrap();
        assert_eq!(out, "iPhone net sales declined.");
    }

    #[test]
    fn test_registry_lookup_and_specs() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Box::new(retriever(3)));

        assert_eq!(registry.len(), 1);
        assert!(registry.find("search_apple_financials").is_some());
        assert!(registry.find("shell").is_none());

        let specs = registry.specs();
        assert_eq!(specs[0].name, "search_apple_financials");
        assert_eq!(specs[0].parameters["required"][0], "query");
    }
}
