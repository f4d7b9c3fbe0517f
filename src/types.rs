//! Shared data-model types that don't belong to any single subsystem:
//! notes, persisted index metadata, retrieval results and options.
//!
//! `Chunk` lives in [`crate::chunker`] and `VectorDocument`/`StoreHit` live
//! in [`crate::store`] — both are reused here rather than duplicated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::chunker::Chunk;

/// A markdown file identified by its path relative to the vault root.
#[derive(Debug, Clone)]
pub struct Note {
    pub path: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
}

/// Scoring mixture selector for [`crate::retriever::Retriever::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Semantic,
    Keyword,
    #[default]
    Hybrid,
}

/// Recognized search options (spec §4.9).
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: Mode,
    pub top_k: usize,
    pub min_score: f32,
    pub use_graph_reranking: bool,
    pub use_llm_reranking: bool,
    pub use_query_expansion: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Hybrid,
            top_k: 10,
            min_score: 0.3,
            use_graph_reranking: false,
            use_llm_reranking: false,
            use_query_expansion: true,
        }
    }
}

/// Per-note aggregate produced by the retriever. `base_score` drives
/// answerability and must never move under graph/LLM rerank; `final_score`
/// drives ordering and may exceed 1.0.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub note_id: String,
    pub note_path: String,
    pub note_title: String,
    pub chunks: Vec<Chunk>,
    pub base_score: f32,
    pub final_score: f32,
    pub confidence: f32,
    pub graph_centrality: f32,
}

/// One note's entry in [`IndexMetadata`]. Keyed by `notePath`, not by
/// front-matter `id` — duplicate front-matter ids must not collide here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteIndexEntry {
    pub note_id: String,
    pub content_hash: String,
    pub mtime: i64,
    pub chunk_count: usize,
}

/// Persisted alongside the vector store as `index-meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub version: u32,
    pub notes: HashMap<String, NoteIndexEntry>,
}

pub const INDEX_METADATA_VERSION: u32 = 2;

impl Default for IndexMetadata {
    fn default() -> Self {
        Self {
            version: INDEX_METADATA_VERSION,
            notes: HashMap::new(),
        }
    }
}

/// Result of `loadMetadata()` (spec §4.8): whether a usable metadata file
/// was found, and why not if it wasn't.
#[derive(Debug, Clone)]
pub struct LoadMetadataResult {
    pub loaded: bool,
    pub reason: Option<String>,
    pub note_count: usize,
}

/// Summary of an `indexAll` or `indexIncremental` pass.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: Vec<String>,
}
