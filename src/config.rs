use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub vault_path: PathBuf,
    pub data_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub graph: GraphConfig,
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model_dir: PathBuf,
    pub dimension: usize,
    pub use_e5: bool,
    pub cache_size: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_k: usize,
    pub candidate_multiplier: usize,
    pub min_score_threshold: f32,
    pub hybrid_alpha: f32,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub use_query_expansion: bool,
    pub max_query_variants: usize,
    pub use_graph_reranking: bool,
    pub graph_boost_factor: f32,
    pub use_llm_reranking: bool,
    pub llm_rerank_top_n: usize,
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub similarity_threshold: f32,
    pub min_cluster_size: usize,
    pub max_cluster_results: usize,
    pub pagerank_damping: f64,
    pub pagerank_tolerance: f64,
    pub pagerank_max_iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Gates the LLM reranking pass (`search.use_llm_reranking` still has to
    /// be set per-call; this is the process-wide kill switch when no LLM
    /// endpoint is configured at all).
    pub enable_reranking: bool,
}

impl VaultConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.chunking.chunk_size < 50 {
            return Err("chunking.chunk_size must be >= 50".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err("chunking.chunk_overlap must be < chunk_size".into());
        }
        if self.search.default_k == 0 {
            return Err("search.default_k must be > 0".into());
        }
        if self.search.candidate_multiplier == 0 {
            return Err("search.candidate_multiplier must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.min_score_threshold) {
            return Err("search.min_score_threshold must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.graph.similarity_threshold) {
            return Err("graph.similarity_threshold must be in [0.0, 1.0]".into());
        }
        if !(0.0..1.0).contains(&self.graph.pagerank_damping) {
            return Err("graph.pagerank_damping must be in [0.0, 1.0)".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, validating before returning.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Path to the persisted index metadata file, under `data_dir`.
    pub fn index_meta_path(&self) -> PathBuf {
        self.data_dir.join("index-meta.json")
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("note-rag");

        let model_dir = if Path::new("models").exists() {
            PathBuf::from("models")
        } else if let Ok(env_path) = std::env::var("MODEL_PATH") {
            PathBuf::from(env_path)
        } else {
            data_dir.join("models")
        };

        let e5_available = model_dir.join("multilingual-e5-base").exists();
        let dimension = if e5_available { 768 } else { 384 };

        Self {
            vault_path: PathBuf::from("."),
            data_dir,
            embedding: EmbeddingConfig {
                model_dir,
                dimension,
                use_e5: e5_available,
                cache_size: 100,
                batch_size: 32,
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
                min_chunk_size: 100,
            },
            search: SearchConfig {
                default_k: 10,
                candidate_multiplier: 3,
                min_score_threshold: 0.3,
                hybrid_alpha: 0.7,
                bm25_k1: 1.2,
                bm25_b: 0.75,
                use_query_expansion: true,
                max_query_variants: 3,
                use_graph_reranking: false,
                graph_boost_factor: 0.2,
                use_llm_reranking: false,
                llm_rerank_top_n: 10,
                query_timeout_secs: 30,
            },
            graph: GraphConfig {
                similarity_threshold: 0.7,
                min_cluster_size: 2,
                max_cluster_results: 50,
                pagerank_damping: 0.85,
                pagerank_tolerance: 1e-6,
                pagerank_max_iterations: 20,
            },
            features: FeatureFlags {
                enable_reranking: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(VaultConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_dimension() {
        let mut cfg = VaultConfig::default();
        cfg.embedding.dimension = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_overlap_ge_chunk_size() {
        let mut cfg = VaultConfig::default();
        cfg.chunking.chunk_overlap = cfg.chunking.chunk_size;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_damping() {
        let mut cfg = VaultConfig::default();
        cfg.graph.pagerank_damping = 1.0;
        assert!(cfg.validate().is_err());
    }
}
