//! Retrieval evaluation (spec §6.1): standard IR metrics over a JSONL
//! dataset, plus answerability scoring per the §4.9 answerability rule.
//!
//! Additive benchmarking tooling consumed by the outer shell — it must
//! never alter `search`'s behavior, only observe it through the callback
//! passed to [`evaluate`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub query: String,
    pub answerable: bool,
    #[serde(default)]
    pub expected_notes: Vec<String>,
    #[serde(default)]
    pub expected_spans: Option<Vec<String>>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Minimal shape `evaluate` needs from a search result: enough to compute
/// recall/precision against `expected_notes` and to read `baseScore` for
/// the answerability rule.
pub struct ScoredNote {
    pub note_path: String,
    pub base_score: f32,
}

/// Parse a JSONL dataset, skipping blank and `#`-comment lines.
pub fn parse_dataset(content: &str) -> Result<Vec<DatasetRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("failed to parse dataset line {}", i + 1))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct QueryMetrics {
    pub id: String,
    pub recall_at_k: HashMap<usize, f64>,
    pub precision_at_k: HashMap<usize, f64>,
    pub mrr: f64,
    pub ndcg_at_k: HashMap<usize, f64>,
    pub hit_rate_at_k: HashMap<usize, f64>,
    /// For `answerable:false` records: whether the Top-1 baseScore fell
    /// below `minScore`, per the §4.9 answerability rule.
    pub answerability_correct: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    pub per_query: Vec<QueryMetrics>,
    pub mean_recall_at_k: HashMap<usize, f64>,
    pub mean_precision_at_k: HashMap<usize, f64>,
    pub mean_mrr: f64,
    pub mean_ndcg_at_k: HashMap<usize, f64>,
    pub mean_hit_rate_at_k: HashMap<usize, f64>,
    pub answerability_accuracy: Option<f64>,
}

/// Run a dataset against `search_fn`, computing Recall@K, Precision@K,
/// MRR, nDCG@K, and Hit-Rate@K for every K in `ks`, plus answerability
/// accuracy for records marked `answerable:false`.
pub fn evaluate<F>(dataset: &[DatasetRecord], ks: &[usize], min_score: f32, mut search_fn: F) -> EvalReport
where
    F: FnMut(&str) -> Vec<ScoredNote>,
{
    let mut per_query = Vec::with_capacity(dataset.len());

    for record in dataset {
        let results = search_fn(&record.query);
        let mut metrics = QueryMetrics {
            id: record.id.clone(),
            ..Default::default()
        };

        let relevant: std::collections::HashSet<&str> =
            record.expected_notes.iter().map(|s| s.as_str()).collect();

        for &k in ks {
            let top_k = &results[..results.len().min(k)];
            metrics.recall_at_k.insert(k, recall(top_k, &relevant));
            metrics.precision_at_k.insert(k, precision(top_k, &relevant));
            metrics.ndcg_at_k.insert(k, ndcg(top_k, &relevant, k));
            metrics.hit_rate_at_k.insert(k, if hits(top_k, &relevant) > 0 { 1.0 } else { 0.0 });
        }

        metrics.mrr = reciprocal_rank(&results, &relevant);

        if !record.answerable {
            let top1_base_score = results.first().map(|r| r.base_score).unwrap_or(0.0);
            metrics.answerability_correct = Some(top1_base_score < min_score);
        }

        per_query.push(metrics);
    }

    aggregate(per_query, ks)
}

fn hits(results: &[ScoredNote], relevant: &std::collections::HashSet<&str>) -> usize {
    results.iter().filter(|r| relevant.contains(r.note_path.as_str())).count()
}

fn recall(results: &[ScoredNote], relevant: &std::collections::HashSet<&str>) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits(results, relevant) as f64 / relevant.len() as f64
}

fn precision(results: &[ScoredNote], relevant: &std::collections::HashSet<&str>) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    hits(results, relevant) as f64 / results.len() as f64
}

fn reciprocal_rank(results: &[ScoredNote], relevant: &std::collections::HashSet<&str>) -> f64 {
    results
        .iter()
        .position(|r| relevant.contains(r.note_path.as_str()))
        .map(|pos| 1.0 / (pos + 1) as f64)
        .unwrap_or(0.0)
}

fn ndcg(results: &[ScoredNote], relevant: &std::collections::HashSet<&str>, k: usize) -> f64 {
    let dcg: f64 = results
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, r)| {
            let gain = if relevant.contains(r.note_path.as_str()) { 1.0 } else { 0.0 };
            gain / ((i as f64 + 2.0).log2())
        })
        .sum();

    let ideal_hits = relevant.len().min(k);
    let idcg: f64 = (0..ideal_hits).map(|i| 1.0 / ((i as f64 + 2.0).log2())).sum();

    if idcg == 0.0 {
        0.0
    } else {
        dcg / idcg
    }
}

fn aggregate(per_query: Vec<QueryMetrics>, ks: &[usize]) -> EvalReport {
    let n = per_query.len().max(1) as f64;

    let mut mean_recall_at_k = HashMap::new();
    let mut mean_precision_at_k = HashMap::new();
    let mut mean_ndcg_at_k = HashMap::new();
    let mut mean_hit_rate_at_k = HashMap::new();

    for &k in ks {
        mean_recall_at_k.insert(k, per_query.iter().filter_map(|m| m.recall_at_k.get(&k)).sum::<f64>() / n);
        mean_precision_at_k.insert(k, per_query.iter().filter_map(|m| m.precision_at_k.get(&k)).sum::<f64>() / n);
        mean_ndcg_at_k.insert(k, per_query.iter().filter_map(|m| m.ndcg_at_k.get(&k)).sum::<f64>() / n);
        mean_hit_rate_at_k.insert(k, per_query.iter().filter_map(|m| m.hit_rate_at_k.get(&k)).sum::<f64>() / n);
    }

    let mean_mrr = per_query.iter().map(|m| m.mrr).sum::<f64>() / n;

    let answerability_records: Vec<bool> = per_query.iter().filter_map(|m| m.answerability_correct).collect();
    let answerability_accuracy = if answerability_records.is_empty() {
        None
    } else {
        let correct = answerability_records.iter().filter(|&&b| b).count();
        Some(correct as f64 / answerability_records.len() as f64)
    };

    EvalReport {
        per_query,
        mean_recall_at_k,
        mean_precision_at_k,
        mean_mrr,
        mean_ndcg_at_k,
        mean_hit_rate_at_k,
        answerability_accuracy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dataset_skipping_blank_and_comment_lines() {
        let content = "\n# comment\n{\"id\":\"1\",\"query\":\"q\",\"answerable\":true,\"expected_notes\":[\"a.md\"]}\n";
        let dataset = parse_dataset(content).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset[0].query, "q");
    }

    #[test]
    fn recall_and_precision_for_exact_match() {
        let dataset = vec![DatasetRecord {
            id: "1".to_string(),
            query: "q".to_string(),
            answerable: true,
            expected_notes: vec!["a.md".to_string()],
            expected_spans: None,
            language: None,
            difficulty: None,
            tags: None,
        }];

        let report = evaluate(&dataset, &[1, 5], 0.3, |_| {
            vec![ScoredNote { note_path: "a.md".to_string(), base_score: 0.9 }]
        });

        assert_eq!(report.mean_recall_at_k[&1], 1.0);
        assert_eq!(report.mean_precision_at_k[&1], 1.0);
        assert_eq!(report.mean_mrr, 1.0);
    }

    #[test]
    fn answerability_uses_base_score_not_note_overlap() {
        let dataset = vec![DatasetRecord {
            id: "1".to_string(),
            query: "unrelated".to_string(),
            answerable: false,
            expected_notes: vec![],
            expected_spans: None,
            language: None,
            difficulty: None,
            tags: None,
        }];

        let report = evaluate(&dataset, &[1], 0.3, |_| {
            vec![ScoredNote { note_path: "z.md".to_string(), base_score: 0.1 }]
        });

        assert_eq!(report.answerability_accuracy, Some(1.0));
    }
}
