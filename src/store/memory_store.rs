//! In-memory `VectorStore` with identical semantics to [`super::lance_store::LanceNoteStore`].
//!
//! Used for tests and as the cold-start fallback the spec requires: the
//! persistent backend is always backed by an in-memory equivalent that
//! speaks the same trait, so callers never special-case it.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{StoreHit, VectorDocument, VectorStore};

pub struct MemoryStore {
    docs: RwLock<HashMap<String, VectorDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= 1e-12 || norm_b <= 1e-12 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn to_hit(doc: &VectorDocument, score: f32) -> StoreHit {
    StoreHit {
        id: doc.id.clone(),
        note_path: doc.note_path.clone(),
        chunk_index: doc.chunk_index,
        content: doc.content.clone(),
        title: doc.title.clone(),
        has_header: doc.has_header,
        score,
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn add(&self, docs: Vec<VectorDocument>) -> Result<()> {
        let mut store = self.docs.write();
        for doc in docs {
            store.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<StoreHit>> {
        let store = self.docs.read();
        let mut scored: Vec<StoreHit> = store
            .values()
            .map(|doc| to_hit(doc, cosine_similarity(query_vector, &doc.vector)))
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut store = self.docs.write();
        let mut removed = 0;
        for id in ids {
            if store.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_by_note_path(&self, note_path: &str) -> Result<usize> {
        let mut store = self.docs.write();
        let before = store.len();
        store.retain(|_, doc| doc.note_path != note_path);
        Ok(before - store.len())
    }

    async fn clear(&self) -> Result<()> {
        self.docs.write().clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.docs.read().len())
    }

    async fn get_all_documents(&self) -> Result<Vec<StoreHit>> {
        let store = self.docs.read();
        Ok(store.values().map(|doc| to_hit(doc, 0.0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, note_path: &str, chunk_index: u32, vector: Vec<f32>) -> VectorDocument {
        VectorDocument {
            id: id.to_string(),
            note_path: note_path.to_string(),
            chunk_index,
            content: format!("content of {}", id),
            title: "Title".to_string(),
            has_header: false,
            vector,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn add_upserts_by_id() {
        let store = MemoryStore::new();
        store.add(vec![doc("a::0", "a.md", 0, vec![1.0, 0.0])]).await.unwrap();
        store.add(vec![doc("a::0", "a.md", 0, vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let hits = store.search(&[0.0, 1.0], 1).await.unwrap();
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn delete_by_note_path_removes_all_chunks() {
        let store = MemoryStore::new();
        store
            .add(vec![
                doc("a::0", "a.md", 0, vec![1.0, 0.0]),
                doc("a::1", "a.md", 1, vec![1.0, 0.0]),
                doc("b::0", "b.md", 0, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let removed = store.delete_by_note_path("a.md").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = MemoryStore::new();
        store
            .add(vec![
                doc("a::0", "a.md", 0, vec![1.0, 0.0]),
                doc("b::0", "b.md", 0, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].note_path, "a.md");
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = MemoryStore::new();
        store.add(vec![doc("a::0", "a.md", 0, vec![1.0])]).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
