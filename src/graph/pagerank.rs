//! Damped-iteration PageRank over the note cross-reference graph.
//!
//! Operates on the normalized-title adjacency built by [`super::analyzer`]
//! rather than a `petgraph` graph: the spec calls for adjacency lists of
//! normalized titles, not pointer-based nodes, so a plain `HashMap` is a
//! closer fit than a general-purpose graph crate here.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct PageRankConfig {
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-6,
            max_iterations: 20,
        }
    }
}

/// Compute PageRank over a directed graph given as `node -> [outgoing neighbors]`.
/// Nodes that only appear as a target (never as a key) are included with an
/// empty outgoing list. Final scores are rescaled so the maximum is 1.0.
pub fn pagerank(
    forward_links: &HashMap<String, Vec<String>>,
    config: PageRankConfig,
) -> HashMap<String, f64> {
    let mut nodes: Vec<String> = forward_links.keys().cloned().collect();
    for targets in forward_links.values() {
        for t in targets {
            if !forward_links.contains_key(t) && !nodes.contains(t) {
                nodes.push(t.clone());
            }
        }
    }

    let n = nodes.len();
    if n == 0 {
        return HashMap::new();
    }
    if n == 1 {
        return HashMap::from([(nodes[0].clone(), 1.0)]);
    }

    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();

    // incoming[i] = list of node indices with an edge into i
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut out_degree: Vec<usize> = vec![0; n];
    for (src, targets) in forward_links {
        let src_idx = index[src.as_str()];
        for t in targets {
            if let Some(&dst_idx) = index.get(t.as_str()) {
                incoming[dst_idx].push(src_idx);
                out_degree[src_idx] += 1;
            }
        }
    }

    let mut scores = vec![1.0 / n as f64; n];
    let base = (1.0 - config.damping) / n as f64;

    for _ in 0..config.max_iterations {
        let mut next = vec![base; n];
        for i in 0..n {
            for &src in &incoming[i] {
                if out_degree[src] > 0 {
                    next[i] += config.damping * scores[src] / out_degree[src] as f64;
                }
            }
        }
        let delta = scores
            .iter()
            .zip(next.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max);
        scores = next;
        if delta < config.tolerance {
            break;
        }
    }

    let max_score = scores.iter().cloned().fold(0.0_f64, f64::max);
    if max_score > 0.0 {
        for s in &mut scores {
            *s /= max_score;
        }
    } else {
        let uniform = 1.0 / n as f64;
        scores = vec![uniform; n];
    }

    nodes.into_iter().zip(scores).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_returns_empty_map() {
        let forward: HashMap<String, Vec<String>> = HashMap::new();
        assert!(pagerank(&forward, PageRankConfig::default()).is_empty());
    }

    #[test]
    fn single_isolated_node_scores_one() {
        let mut forward = HashMap::new();
        forward.insert("a".to_string(), vec![]);
        let scores = pagerank(&forward, PageRankConfig::default());
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["a"], 1.0);
    }

    #[test]
    fn hub_node_scores_highest() {
        let mut forward = HashMap::new();
        forward.insert("a".to_string(), vec!["hub".to_string()]);
        forward.insert("b".to_string(), vec!["hub".to_string()]);
        forward.insert("c".to_string(), vec!["hub".to_string()]);
        forward.insert("hub".to_string(), vec!["a".to_string()]);
        let scores = pagerank(&forward, PageRankConfig::default());
        let hub_score = scores["hub"];
        assert!(hub_score >= scores["a"]);
        assert!(hub_score >= scores["b"]);
        assert!(hub_score >= scores["c"]);
        let max = scores.values().cloned().fold(0.0_f64, f64::max);
        assert!((max - 1.0).abs() < 1e-9);
    }

    #[test]
    fn converges_within_tolerance() {
        let mut forward = HashMap::new();
        forward.insert("a".to_string(), vec!["b".to_string()]);
        forward.insert("b".to_string(), vec!["a".to_string()]);
        let scores = pagerank(&forward, PageRankConfig::default());
        assert!((scores["a"] - scores["b"]).abs() < 1e-6);
    }
}
