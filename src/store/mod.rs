pub mod lance_store;
pub mod memory_store;

pub use lance_store::LanceNoteStore;
pub use memory_store::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;

/// One embedded chunk, as written to and read from the vector store.
#[derive(Debug, Clone)]
pub struct VectorDocument {
    /// Deterministic from `(note_path, chunk_index)` so re-adding the same
    /// chunk overwrites rather than duplicates.
    pub id: String,
    pub note_path: String,
    pub chunk_index: u32,
    pub content: String,
    pub title: String,
    pub has_header: bool,
    pub vector: Vec<f32>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct StoreHit {
    pub id: String,
    pub note_path: String,
    pub chunk_index: u32,
    pub content: String,
    pub title: String,
    pub has_header: bool,
    pub score: f32,
}

/// Persistent or in-memory vector storage for note chunks. Both
/// implementations share this contract so the indexer and retriever never
/// need to know which backend is active.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert by `VectorDocument::id`: a doc sharing an id with an existing
    /// one replaces it rather than duplicating.
    async fn add(&self, docs: Vec<VectorDocument>) -> Result<()>;
    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<StoreHit>>;
    async fn delete(&self, ids: &[String]) -> Result<usize>;
    async fn delete_by_note_path(&self, note_path: &str) -> Result<usize>;
    async fn clear(&self) -> Result<()>;
    async fn count(&self) -> Result<usize>;
    async fn get_all_documents(&self) -> Result<Vec<StoreHit>>;
}

/// Deterministic chunk id: two calls for the same note path and chunk
/// index always agree, so `add` upserts rather than duplicates.
pub fn chunk_id(note_path: &str, chunk_index: u32) -> String {
    format!("{}::{}", note_path, chunk_index)
}
