//! `RAG` facade (spec §6): the single entry point the outer shell talks
//! to. Owns the process-wide singletons — embedder, vector store, graph
//! analyzer cache — and wires them into the indexer and retriever, which
//! stay ignorant of each other's lifecycle.
//!
//! Per §9's design note on singletons: there is no hidden mutable global
//! here. `RagEngine` is an explicit context value the caller constructs
//! once via [`RagEngine::initialize`] and threads through every
//! subsequent call.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::VaultConfig;
use crate::embeddings::e5::{E5Config, E5Embeddings};
use crate::embeddings::EmbeddingModel;
use crate::graph::analyzer::{AnalyzeOptions, GraphAnalyzer, NoteGraphStats, QuickStats};
use crate::indexing::NoteIndexer;
use crate::links::{LinkSuggester, LinkSuggestion, SuggestOptions};
use crate::llm_client::{LlmClient, LlmClientConfig};
use crate::reranking::LlmReranker;
use crate::retriever::Retriever;
use crate::store::{LanceNoteStore, MemoryStore, VectorStore};
use crate::types::{IndexReport, RetrievalResult, SearchOptions};

/// One ranked chunk surfaced to the caller, with the span of `content`
/// it was drawn from made explicit as a highlight.
#[derive(Debug, Clone)]
pub struct Highlight {
    pub chunk_index: usize,
    pub text: String,
}

/// `RAG.search`'s per-note result row (spec §6's table).
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub note_path: String,
    pub title: String,
    pub content: String,
    pub base_score: f32,
    pub final_score: f32,
    pub highlights: Vec<Highlight>,
}

impl From<RetrievalResult> for SearchResult {
    fn from(r: RetrievalResult) -> Self {
        let content = r
            .chunks
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default();
        let highlights = r
            .chunks
            .iter()
            .map(|c| Highlight {
                chunk_index: c.index,
                text: c.text.clone(),
            })
            .collect();
        Self {
            note_path: r.note_path,
            title: r.note_title,
            content,
            base_score: r.base_score,
            final_score: r.final_score,
            highlights,
        }
    }
}

/// Ready handle returned by [`RagEngine::initialize`]. Bundles the
/// process-wide singletons described in spec §5: one embedder, one
/// vector store, one graph-analyzer cache.
pub struct RagEngine {
    config: VaultConfig,
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
    graph: Arc<GraphAnalyzer>,
    indexer: NoteIndexer,
    retriever: Retriever,
}

impl RagEngine {
    /// `RAG.initialize(vault, options)`. Loads the embedding model named
    /// in `config.embedding`, opens (or creates) the persistent vector
    /// store under `config.data_dir`, and builds the process-wide graph
    /// analyzer cache. Falls back to an in-memory store when the
    /// persistent backend can't be opened, matching the "always available
    /// for tests and cold starts" guarantee in spec §4.7.
    pub async fn initialize(vault_path: impl Into<PathBuf>, mut config: VaultConfig) -> Result<Self> {
        config.vault_path = vault_path.into();
        config.validate().map_err(|e| anyhow::anyhow!(e))?;

        let embedder: Arc<dyn EmbeddingModel> = match E5Config::auto_detect_with(
            &config.embedding.model_dir,
            config.embedding.cache_size,
            config.embedding.batch_size,
        ) {
            Some(e5_config) => Arc::new(E5Embeddings::new(e5_config).context("failed to load E5 embedding model")?),
            None => Arc::new(crate::embeddings::fallback::HashEmbedder::new(config.embedding.dimension)),
        };

        let store_path = config.data_dir.join("vectors");
        let store: Arc<dyn VectorStore> = match LanceNoteStore::new(
            store_path.to_string_lossy().as_ref(),
            config.embedding.dimension,
        )
        .await
        {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "failed to open persistent vector store, falling back to in-memory");
                Arc::new(MemoryStore::new())
            }
        };

        let graph = Arc::new(GraphAnalyzer::new(config.vault_path.clone(), config.graph.clone()));

        let llm_reranker = if config.features.enable_reranking {
            LlmClient::new(LlmClientConfig::default())
                .ok()
                .map(|client| Arc::new(LlmReranker::new(client)))
        } else {
            None
        };

        let indexer = NoteIndexer::new(config.clone(), embedder.clone(), store.clone());
        let retriever = Retriever::new(
            embedder.clone(),
            store.clone(),
            Some(graph.clone()),
            llm_reranker,
            config.search.clone(),
        );

        Ok(Self {
            config,
            embedder,
            store,
            graph,
            indexer,
            retriever,
        })
    }

    /// `RAG.search(query, options)`.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let results = tokio::time::timeout(
            std::time::Duration::from_secs(self.config.search.query_timeout_secs),
            self.retriever.search(query, options),
        )
        .await
        .map_err(|_| anyhow::anyhow!("search timed out after {}s", self.config.search.query_timeout_secs))??;

        Ok(results.into_iter().map(SearchResult::from).collect())
    }

    /// `RAG.indexAll()`.
    pub async fn index_all(&self) -> Result<IndexReport> {
        let report = self.indexer.index_all().await?;
        self.graph.invalidate_cache();
        Ok(report)
    }

    /// `RAG.indexIncremental()`.
    pub async fn index_incremental(&self) -> Result<IndexReport> {
        let report = self.indexer.index_incremental().await?;
        self.graph.invalidate_cache();
        Ok(report)
    }

    /// `RAG.indexNote(path)`.
    pub async fn index_note(&self, relative_path: &str) -> Result<()> {
        self.indexer.index_note(relative_path).await?;
        self.graph.invalidate_cache();
        Ok(())
    }

    /// `Graph.analyze(vault, options)`.
    pub fn analyze_graph(&self, options: &AnalyzeOptions) -> Result<NoteGraphStats> {
        self.graph.analyze(options)
    }

    /// `Graph.quickStats(vault)`.
    pub fn quick_stats(&self) -> Result<QuickStats> {
        self.graph.quick_stats()
    }

    /// `Links.suggest(notePath, opts)`.
    pub fn suggest_links(&self, note_path: &str, opts: &SuggestOptions) -> Result<Vec<LinkSuggestion>> {
        let suggester = LinkSuggester::new(&self.graph, self.config.vault_path.clone());
        suggester.suggest(note_path, opts)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn vault_path(&self) -> &Path {
        &self.config.vault_path
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingModel> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn initialize_falls_back_to_hash_embedder_without_model_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# Tesla Robotaxi\nSF ride.").unwrap();

        let mut config = VaultConfig::default();
        config.data_dir = dir.path().join(".index-storage");
        config.embedding.model_dir = dir.path().join("no-such-models");
        config.embedding.dimension = 32;
        config.features.enable_reranking = false;

        let engine = RagEngine::initialize(dir.path(), config).await.unwrap();
        let report = engine.index_all().await.unwrap();
        assert_eq!(report.added, 1);

        let results = engine
            .search("Tesla Robotaxi", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results[0].note_path, "a.md");
    }

    #[tokio::test]
    async fn quick_stats_reports_orphan_note() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "no links here").unwrap();

        let mut config = VaultConfig::default();
        config.data_dir = dir.path().join(".index-storage");
        config.embedding.model_dir = dir.path().join("no-such-models");
        config.embedding.dimension = 16;
        config.features.enable_reranking = false;

        let engine = RagEngine::initialize(dir.path(), config).await.unwrap();
        let stats = engine.quick_stats().unwrap();
        assert_eq!(stats.note_count, 1);
        assert_eq!(stats.orphan, 1);
    }
}
