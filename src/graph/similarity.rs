//! Composite string similarity used to cluster dangling-link targets that
//! likely refer to the same (missing) note under slightly different
//! spellings.

use std::collections::HashSet;

/// Jaro-Winkler similarity in [0, 1]. No crate in the dependency stack
/// provides this, so it's implemented directly from the standard
/// definition (Winkler's prefix boost on top of Jaro distance).
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let jaro = jaro_similarity(a, b);
    if jaro < 0.7 {
        return jaro;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let prefix_len = a_chars
        .iter()
        .zip(b_chars.iter())
        .take(4)
        .take_while(|(x, y)| x == y)
        .count();
    jaro + (prefix_len as f64 * 0.1 * (1.0 - jaro))
}

fn jaro_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let match_distance = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matches = vec![false; a.len()];
    let mut b_matches = vec![false; b.len()];
    let mut matches = 0usize;

    for i in 0..a.len() {
        let lo = i.saturating_sub(match_distance);
        let hi = (i + match_distance + 1).min(b.len());
        for j in lo..hi {
            if b_matches[j] || a[i] != b[j] {
                continue;
            }
            a_matches[i] = true;
            b_matches[j] = true;
            matches += 1;
            break;
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for i in 0..a.len() {
        if !a_matches[i] {
            continue;
        }
        while !b_matches[k] {
            k += 1;
        }
        if a[i] != b[k] {
            transpositions += 1;
        }
        k += 1;
    }
    let transpositions = transpositions / 2;

    let m = matches as f64;
    (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions as f64) / m) / 3.0
}

/// Dice coefficient over character bigrams.
pub fn bigram_dice(a: &str, b: &str) -> f64 {
    let a_bigrams = char_bigrams(a);
    let b_bigrams = char_bigrams(b);
    if a_bigrams.is_empty() && b_bigrams.is_empty() {
        return 1.0;
    }
    if a_bigrams.is_empty() || b_bigrams.is_empty() {
        return 0.0;
    }
    let intersection = a_bigrams.intersection(&b_bigrams).count();
    (2.0 * intersection as f64) / (a_bigrams.len() + b_bigrams.len()) as f64
}

fn char_bigrams(s: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = s.to_lowercase().chars().collect();
    if chars.len() < 2 {
        return HashSet::new();
    }
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Jaccard similarity over whitespace-separated tokens, with common
/// trailing Korean particles stripped heuristically so "웨이모는" and
/// "웨이모" tokenize to the same root.
pub fn jaccard_tokens(a: &str, b: &str) -> f64 {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);
    if a_tokens.is_empty() && b_tokens.is_empty() {
        return 1.0;
    }
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count();
    let union = a_tokens.union(&b_tokens).count();
    intersection as f64 / union as f64
}

const KOREAN_PARTICLES: &[&str] = &["은", "는", "이", "가", "을", "를", "의", "에", "와", "과"];

fn tokenize(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split_whitespace()
        .map(|tok| strip_particle(tok))
        .collect()
}

fn strip_particle(tok: &str) -> String {
    for particle in KOREAN_PARTICLES {
        if tok.len() > particle.len() {
            if let Some(stem) = tok.strip_suffix(particle) {
                return stem.to_string();
            }
        }
    }
    tok.to_string()
}

/// 1.0 if either string (case-insensitively) contains the other, else 0.0.
pub fn containment_ratio(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    if a_lower.contains(&b_lower) || b_lower.contains(&a_lower) {
        1.0
    } else {
        0.0
    }
}

/// Adaptive weighted blend of the four measures above.
pub fn composite_similarity(a: &str, b: &str) -> f64 {
    let containment = containment_ratio(a, b);
    let jw = jaro_winkler(a, b);
    let ngram = bigram_dice(a, b);
    let token = jaccard_tokens(a, b);

    if containment > 0.5 {
        0.3 * jw + 0.2 * ngram + 0.2 * token + 0.3 * containment
    } else {
        0.4 * jw + 0.3 * ngram + 0.3 * token
    }
}

/// A cluster of similar targets with a chosen representative.
#[derive(Debug, Clone)]
pub struct SimilarityCluster {
    pub representative: String,
    pub members: Vec<String>,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Cluster `targets` by pairwise composite similarity at or above
/// `threshold`, using `occurrence_count` to pick a representative and to
/// order clusters. Clusters smaller than `min_cluster_size` are dropped.
/// Result is capped at `max_results`, ordered by total occurrences desc.
pub fn cluster_similar_targets(
    targets: &[String],
    occurrence_count: impl Fn(&str) -> usize,
    threshold: f64,
    min_cluster_size: usize,
    max_results: usize,
) -> Vec<SimilarityCluster> {
    let n = targets.len();
    let mut uf = UnionFind::new(n);

    for i in 0..n {
        for j in (i + 1)..n {
            if composite_similarity(&targets[i], &targets[j]) >= threshold {
                uf.union(i, j);
            }
        }
    }

    let mut groups: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for i in 0..n {
        let root = uf.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut clusters: Vec<SimilarityCluster> = groups
        .into_values()
        .filter(|members| members.len() >= min_cluster_size)
        .map(|members| {
            let mut members: Vec<&String> = members.iter().map(|&i| &targets[i]).collect();
            members.sort_by(|a, b| {
                occurrence_count(b)
                    .cmp(&occurrence_count(a))
                    .then_with(|| a.cmp(b))
            });
            SimilarityCluster {
                representative: members[0].clone(),
                members: members.into_iter().cloned().collect(),
            }
        })
        .collect();

    clusters.sort_by(|a, b| {
        let total_a: usize = a.members.iter().map(|m| occurrence_count(m)).sum();
        let total_b: usize = b.members.iter().map(|m| occurrence_count(m)).sum();
        total_b.cmp(&total_a)
    });
    clusters.truncate(max_results);
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaro_winkler_identical_strings() {
        assert_eq!(jaro_winkler("waymo", "waymo"), 1.0);
    }

    #[test]
    fn jaro_winkler_prefix_boost() {
        let base = jaro_similarity("waymo", "waymoo");
        let winkler = jaro_winkler("waymo", "waymoo");
        assert!(winkler >= base);
    }

    #[test]
    fn containment_detects_substring() {
        assert_eq!(containment_ratio("Google Waymo", "Waymo"), 1.0);
        assert_eq!(containment_ratio("foo", "bar"), 0.0);
    }

    #[test]
    fn clusters_similar_variants() {
        let targets = vec![
            "Waymo".to_string(),
            "Google Waymo".to_string(),
            "Completely Unrelated".to_string(),
        ];
        let clusters = cluster_similar_targets(&targets, |_| 1, 0.7, 2, 50);
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].members.contains(&"Waymo".to_string()));
        assert!(clusters[0].members.contains(&"Google Waymo".to_string()));
    }

    #[test]
    fn representative_picks_highest_occurrence() {
        let targets = vec!["Waymo".to_string(), "Waymoo".to_string()];
        let counts = |s: &str| if s == "Waymoo" { 5 } else { 1 };
        let clusters = cluster_similar_targets(&targets, counts, 0.5, 2, 50);
        assert_eq!(clusters[0].representative, "Waymoo");
    }
}
