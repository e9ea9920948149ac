//! # docqa
//!
//! Ask questions about one document. `docqa ingest` splits the document
//! into overlapping chunks, embeds them with a local model and saves a
//! vector index; `docqa chat` loads that index and lets a remote chat model
//! search it through a tool while answering.
//!
//! ## Architecture
//!
//! ```text
//!  ingest:  PDF/text ──▶ extract ──▶ chunk ──▶ embedding ──▶ index (disk)
//!
//!  chat:    stdin ──▶ session ──▶ agent ◀──▶ llm (remote model)
//!                                   │
//!                                   ▼
//!                          tools::RetrieverTool ──▶ index + embedding
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa ingest apple_10k.pdf           # build ./faiss_index
//! docqa search "iPhone net sales"      # check retrieval
//! GOOGLE_API_KEY=... docqa chat        # ask questions
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF and text loading |
//! | [`chunk`] | Recursive separator splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persisted vector index |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Retrieval from the command line |
//! | [`tools`] | Tool trait and the retriever tool |
//! | [`llm`] | Chat model client and wire types |
//! | [`agent`] | Tool-calling turn loop |
//! | [`session`] | Interactive question loop |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod search;
pub mod session;
pub mod tools;
