//! Hybrid Retriever (spec §4.9): combines dense vector similarity,
//! BM25-style keyword scoring, query expansion, optional graph-centrality
//! reranking, and optional LLM reranking. Exposes `baseScore` (drives
//! answerability) separately from `finalScore` (drives ordering).

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::embeddings::EmbeddingModel;
use crate::graph::analyzer::{AnalyzeOptions, GraphAnalyzer};
use crate::query_expansion::expand;
use crate::reranking::llm_reranker::{LlmReranker, RerankCandidate};
use crate::store::{StoreHit, VectorStore};
use crate::types::{Mode, RetrievalResult, SearchOptions};

const OVERSAMPLING_FACTOR: usize = 3;

pub struct Retriever {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
    graph: Option<Arc<GraphAnalyzer>>,
    llm_reranker: Option<Arc<LlmReranker>>,
    config: SearchConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<dyn VectorStore>,
        graph: Option<Arc<GraphAnalyzer>>,
        llm_reranker: Option<Arc<LlmReranker>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            graph,
            llm_reranker,
            config,
        }
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<RetrievalResult>> {
        // 1. Expand query.
        let expanded = expand(query, options.use_query_expansion, self.config.max_query_variants);

        // 2. Vector retrieval, oversampled so per-note aggregation has
        // enough distinct notes to work with.
        let query_vector = self.embedder.embed_query(query)?;
        let candidate_limit = options.top_k * OVERSAMPLING_FACTOR.max(self.config.candidate_multiplier);
        let candidates = self.store.search(&query_vector, candidate_limit).await?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // 3. Keyword retrieval: BM25 over the vector-retrieved candidates
        // only (see DESIGN.md for why no side inverted index is kept).
        let keyword_scores = bm25_scores(&candidates, &expanded.keywords, self.config.bm25_k1, self.config.bm25_b);

        // 4. Aggregate to notes.
        let mut aggregates: HashMap<String, NoteAggregate> = HashMap::new();
        for (hit, keyword_score) in candidates.iter().zip(keyword_scores.iter()) {
            let entry = aggregates.entry(hit.note_path.clone()).or_insert_with(|| NoteAggregate {
                note_path: hit.note_path.clone(),
                title: hit.title.clone(),
                chunk_scores: Vec::new(),
                vector_score: 0.0,
                keyword_score: 0.0,
            });
            entry.vector_score = entry.vector_score.max(hit.score);
            entry.keyword_score = entry.keyword_score.max(*keyword_score);
            entry.chunk_scores.push((hit.clone(), hit.score));
        }

        // 5. Hybrid score (baseScore) per note.
        let mut results: Vec<RetrievalResult> = aggregates
            .into_values()
            .map(|agg| self.to_retrieval_result(agg, options.mode))
            .collect();

        // 6. Graph reranking.
        if options.use_graph_reranking {
            self.apply_graph_rerank(&mut results);
        } else {
            for r in &mut results {
                r.final_score = r.base_score;
            }
        }

        // 7. LLM reranking.
        if options.use_llm_reranking {
            if let Some(reranker) = &self.llm_reranker {
                self.apply_llm_rerank(reranker, query, &mut results).await;
            }
        }

        // 8. Sort & truncate. Ties broken by notePath ascending for a
        // deterministic ordering at fixed index state.
        results.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.note_path.cmp(&b.note_path))
        });
        results.truncate(options.top_k);
        Ok(results)
    }

    fn to_retrieval_result(&self, mut agg: NoteAggregate, mode: Mode) -> RetrievalResult {
        agg.chunk_scores
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let base_score = match mode {
            Mode::Semantic => agg.vector_score,
            Mode::Keyword => agg.keyword_score,
            Mode::Hybrid => self.config.hybrid_alpha * agg.vector_score + (1.0 - self.config.hybrid_alpha) * agg.keyword_score,
        };

        let confidence = if agg.chunk_scores.len() >= 2 {
            (agg.chunk_scores[0].1 - agg.chunk_scores[1].1).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let chunks = agg
            .chunk_scores
            .iter()
            .map(|(hit, _)| store_hit_to_chunk(hit))
            .collect();

        RetrievalResult {
            note_id: agg.note_path.clone(),
            note_path: agg.note_path,
            note_title: agg.title,
            chunks,
            base_score,
            final_score: base_score,
            confidence,
            graph_centrality: 0.0,
        }
    }

    fn apply_graph_rerank(&self, results: &mut [RetrievalResult]) {
        let Some(graph) = &self.graph else {
            for r in results.iter_mut() {
                r.final_score = r.base_score;
            }
            return;
        };

        let centrality = match graph.analyze(&AnalyzeOptions::default()) {
            Ok(stats) => graph.pagerank(&stats),
            Err(e) => {
                tracing::warn!(error = %e, "graph analysis failed, skipping centrality rerank");
                for r in results.iter_mut() {
                    r.final_score = r.base_score;
                }
                return;
            }
        };

        let boost = self.config.graph_boost_factor;
        for r in results.iter_mut() {
            let c = centrality.get(&r.note_path).copied().unwrap_or(0.0) as f32;
            r.graph_centrality = c;
            r.final_score = r.base_score * (1.0 + boost * c);
        }
    }

    async fn apply_llm_rerank(&self, reranker: &LlmReranker, query: &str, results: &mut [RetrievalResult]) {
        let top_n = self.config.llm_rerank_top_n.min(results.len());
        if top_n == 0 {
            return;
        }

        // Results are already sorted by finalScore coming into this stage
        // (graph rerank, or baseScore if that stage was skipped), so the
        // first top_n are "top-N by finalScore" per spec.
        results.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));

        let candidates: Vec<RerankCandidate> = results[..top_n]
            .iter()
            .map(|r| RerankCandidate {
                title: r.note_title.clone(),
                content: r.chunks.first().map(|c| c.text.clone()).unwrap_or_default(),
            })
            .collect();

        let evaluations = reranker.rerank(query, &candidates).await;
        for eval in evaluations {
            if let Some(result) = results.get_mut(eval.index) {
                let llm_component = eval.score / 10.0;
                result.final_score = 0.7 * llm_component + 0.3 * result.final_score;
            }
        }
    }
}

struct NoteAggregate {
    note_path: String,
    title: String,
    chunk_scores: Vec<(StoreHit, f32)>,
    vector_score: f32,
    keyword_score: f32,
}

fn store_hit_to_chunk(hit: &StoreHit) -> crate::chunker::Chunk {
    crate::chunker::Chunk {
        id: uuid::Uuid::new_v4(),
        index: hit.chunk_index as usize,
        text: hit.content.clone(),
        start_offset: 0,
        end_offset: hit.content.len(),
        has_header: hit.has_header,
    }
}

/// BM25 (`k1`, `b`) over `candidates`' content against `keywords`, scoped
/// to exactly the vector-retrieved set — see DESIGN.md's recorded decision
/// on why no side full-text index backs this. Scores are normalized to
/// `[0, 1]` by dividing by the per-query max.
fn bm25_scores(candidates: &[StoreHit], keywords: &[String], k1: f32, b: f32) -> Vec<f32> {
    if candidates.is_empty() || keywords.is_empty() {
        return vec![0.0; candidates.len()];
    }

    let tokenized: Vec<Vec<String>> = candidates.iter().map(|c| tokenize_unicode(&c.content)).collect();
    let doc_lengths: Vec<f32> = tokenized.iter().map(|t| t.len() as f32).collect();
    let avg_len = doc_lengths.iter().sum::<f32>() / doc_lengths.len() as f32;
    let n = candidates.len() as f32;

    let mut doc_freq: HashMap<&str, f32> = HashMap::new();
    for term in keywords {
        let df = tokenized.iter().filter(|doc| doc.contains(term)).count() as f32;
        doc_freq.insert(term.as_str(), df);
    }

    let mut scores: Vec<f32> = tokenized
        .iter()
        .zip(doc_lengths.iter())
        .map(|(doc, &len)| {
            let mut term_freq: HashMap<&str, f32> = HashMap::new();
            for token in doc {
                *term_freq.entry(token.as_str()).or_insert(0.0) += 1.0;
            }

            keywords
                .iter()
                .map(|term| {
                    let df = doc_freq.get(term.as_str()).copied().unwrap_or(0.0);
                    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                    let tf = term_freq.get(term.as_str()).copied().unwrap_or(0.0);
                    let denom = tf + k1 * (1.0 - b + b * len / avg_len.max(1.0));
                    if denom == 0.0 {
                        0.0
                    } else {
                        idf * (tf * (k1 + 1.0)) / denom
                    }
                })
                .sum::<f32>()
        })
        .collect();

    let max_score = scores.iter().cloned().fold(0.0_f32, f32::max);
    if max_score > 0.0 {
        for s in &mut scores {
            *s /= max_score;
        }
    }
    scores
}

/// Unicode-aware tokenizer: ASCII alphanumeric runs become words; CJK
/// characters (no whitespace between words) are tokenized one character
/// at a time, matching how the keyword index treats them elsewhere.
fn tokenize_unicode(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.to_lowercase().chars() {
        if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3040..=0x30FF // Hiragana + Katakana
        | 0xAC00..=0xD7A3 // Hangul syllables
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct FakeEmbedder;
    impl EmbeddingModel for FakeEmbedder {
        fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            self.embed_document(text)
        }
        fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
            // Crude deterministic embedding: presence of "tesla" -> [1,0], else [0,1].
            if text.to_lowercase().contains("tesla") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    async fn store_with(docs: Vec<crate::store::VectorDocument>) -> Arc<dyn VectorStore> {
        let store = Arc::new(MemoryStore::new());
        store.add(docs).await.unwrap();
        store
    }

    fn doc(note_path: &str, content: &str, vector: Vec<f32>) -> crate::store::VectorDocument {
        crate::store::VectorDocument {
            id: format!("{}::0", note_path),
            note_path: note_path.to_string(),
            chunk_index: 0,
            content: content.to_string(),
            title: note_path.to_string(),
            has_header: false,
            vector,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn exact_title_match_ranks_first() {
        let store = store_with(vec![
            doc("a.md", "# Tesla Robotaxi\nSF ride.", vec![1.0, 0.0]),
            doc("b.md", "unrelated content", vec![0.0, 1.0]),
        ])
        .await;

        let retriever = Retriever::new(
            Arc::new(FakeEmbedder),
            store,
            None,
            None,
            crate::config::VaultConfig::default().search,
        );

        let options = SearchOptions {
            mode: Mode::Hybrid,
            ..Default::default()
        };
        let results = retriever.search("Tesla Robotaxi", &options).await.unwrap();
        assert_eq!(results[0].note_path, "a.md");
        assert!(results[0].base_score >= 0.3);
    }

    #[tokio::test]
    async fn graph_reranking_never_lowers_final_below_base_with_nonnegative_boost() {
        let store = store_with(vec![doc("a.md", "content", vec![1.0, 0.0])]).await;
        let retriever = Retriever::new(
            Arc::new(FakeEmbedder),
            store,
            None,
            None,
            crate::config::VaultConfig::default().search,
        );
        let options = SearchOptions {
            use_graph_reranking: true,
            ..Default::default()
        };
        let results = retriever.search("content", &options).await.unwrap();
        assert!(results[0].final_score >= results[0].base_score);
    }

    #[test]
    fn bm25_normalizes_to_unit_max() {
        let hits = vec![
            StoreHit { id: "1".into(), note_path: "a.md".into(), chunk_index: 0, content: "tesla tesla robotaxi".into(), title: "a".into(), has_header: false, score: 0.0 },
            StoreHit { id: "2".into(), note_path: "b.md".into(), chunk_index: 0, content: "unrelated text here".into(), title: "b".into(), has_header: false, score: 0.0 },
        ];
        let scores = bm25_scores(&hits, &["tesla".to_string()], 1.2, 0.75);
        assert!(scores[0] > scores[1]);
        assert!((scores[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tokenizer_splits_cjk_per_character() {
        let tokens = tokenize_unicode("웨이모");
        assert_eq!(tokens.len(), 3);
    }
}
