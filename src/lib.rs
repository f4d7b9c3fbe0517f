//! Retrieval core for a personal note vault: markdown chunking,
//! incremental indexing, wikilink graph analysis, and hybrid
//! (vector + keyword + graph + optional LLM) retrieval.
//!
//! [`engine::RagEngine`] is the entry point the outer shell (CLI, agent
//! layer, HTTP graph viewer) is expected to construct and hold.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod eval;
pub mod graph;
pub mod indexing;
pub mod links;
pub mod llm_client;
pub mod query_expansion;
pub mod reranking;
pub mod retriever;
pub mod store;
pub mod types;
pub mod wikilink;

pub use config::VaultConfig;
pub use engine::{RagEngine, SearchResult};
pub use error::RagError;
pub use types::{Mode, RetrievalResult, SearchOptions};

pub use anyhow::{Error, Result};
