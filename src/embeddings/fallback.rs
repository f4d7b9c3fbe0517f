//! Deterministic hashing-trick embedder: the cold-start path when no
//! transformer model has been downloaded into `model_dir` yet.
//!
//! Not a quality embedding — it exists so `RagEngine::initialize` can
//! stand up a vault (and this crate's own tests) without a multi-hundred
//! megabyte ONNX file on disk. Real deployments resolve
//! [`E5Config::auto_detect`](super::e5::E5Config::auto_detect) instead.

use super::EmbeddingModel;
use anyhow::Result;
use std::hash::{Hash, Hasher};

pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimension;
            vec[bucket] += 1.0;
        }
        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 1e-12 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl EmbeddingModel for HashEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_yields_identical_vector() {
        let embedder = HashEmbedder::new(32);
        assert_eq!(embedder.embed("hello world").unwrap(), embedder.embed("hello world").unwrap());
    }

    #[test]
    fn output_is_l2_normalized() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed("Tesla Robotaxi SF ride").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }
}
