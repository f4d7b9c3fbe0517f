//! Link Suggester (spec §4.11). Owns no parsing or similarity logic of its
//! own — it reuses [`crate::wikilink`] and [`crate::graph::similarity`]
//! exactly as the GraphAnalyzer does.

use anyhow::{Context, Result};
use std::path::Path;

use crate::graph::analyzer::{GraphAnalyzer, NoteGraphStats};
use crate::graph::similarity::composite_similarity;
use crate::wikilink::{normalize, parse_wikilinks};

#[derive(Debug, Clone)]
pub struct SuggestOptions {
    pub max_suggestions: usize,
    pub min_confidence: f64,
    pub exclude_existing: bool,
    pub context_chars: usize,
}

impl Default for SuggestOptions {
    fn default() -> Self {
        Self {
            max_suggestions: 20,
            min_confidence: 0.75,
            exclude_existing: true,
            context_chars: 40,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkSuggestion {
    pub anchor_text: String,
    pub source_span: (usize, usize),
    pub suggested_target: String,
    pub confidence: f64,
}

pub struct LinkSuggester<'a> {
    analyzer: &'a GraphAnalyzer,
    vault_path: std::path::PathBuf,
}

impl<'a> LinkSuggester<'a> {
    pub fn new(analyzer: &'a GraphAnalyzer, vault_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            analyzer,
            vault_path: vault_path.into(),
        }
    }

    /// `Links.suggest(notePath, opts)`.
    pub fn suggest(&self, note_path: &str, opts: &SuggestOptions) -> Result<Vec<LinkSuggestion>> {
        let abs_path = self.vault_path.join(note_path);
        let content = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("failed to read note {}", note_path))?;

        let stats = self.analyzer.analyze(&Default::default())?;
        let existing_links = parse_wikilinks(&content);
        let existing_spans: Vec<(usize, usize)> =
            existing_links.iter().map(|l| (l.position.start, l.position.end)).collect();
        let existing_targets: std::collections::HashSet<String> =
            existing_links.iter().map(|l| normalize(&l.target)).collect();

        let anchors = candidate_anchors(&content, &existing_spans);

        let mut suggestions: Vec<LinkSuggestion> = anchors
            .into_iter()
            .filter_map(|(anchor, span)| {
                let normalized_anchor = normalize(&anchor);
                if opts.exclude_existing && existing_targets.contains(&normalized_anchor) {
                    return None;
                }
                let (target, confidence) = best_match(&anchor, &stats)?;
                if confidence < opts.min_confidence {
                    return None;
                }
                Some(LinkSuggestion {
                    anchor_text: anchor,
                    source_span: span,
                    suggested_target: target,
                    confidence,
                })
            })
            .collect();

        suggestions.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        suggestions.truncate(opts.max_suggestions);
        Ok(suggestions)
    }
}

/// Runs of 2-6 words, skipping spans already inside an existing wikilink.
fn candidate_anchors(content: &str, existing_spans: &[(usize, usize)]) -> Vec<(String, (usize, usize))> {
    let mut anchors = Vec::new();
    let words: Vec<(usize, usize)> = content
        .split_word_bound_indices_fallback()
        .collect();

    for window in 2..=6 {
        if window > words.len() {
            break;
        }
        for start_idx in 0..=(words.len() - window) {
            let (start, _) = words[start_idx];
            let (_, end) = words[start_idx + window - 1];
            if overlaps_any(start, end, existing_spans) {
                continue;
            }
            let phrase = &content[start..end];
            if phrase.trim().is_empty() {
                continue;
            }
            anchors.push((phrase.to_string(), (start, end)));
        }
    }
    anchors
}

fn overlaps_any(start: usize, end: usize, spans: &[(usize, usize)]) -> bool {
    spans.iter().any(|&(s, e)| start < e && s < end)
}

fn best_match(anchor: &str, stats: &NoteGraphStats) -> Option<(String, f64)> {
    stats
        .note_metadata
        .iter()
        .map(|note| (note.title.clone(), composite_similarity(anchor, &note.title)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// Minimal word-boundary tokenizer returning `(start, end)` byte spans for
/// each whitespace-delimited word, used only to build candidate anchor
/// phrases — not a general text-processing utility.
trait WordBoundaries {
    fn split_word_bound_indices_fallback(&self) -> Vec<(usize, usize)>;
}

impl WordBoundaries for str {
    fn split_word_bound_indices_fallback(&self) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut word_start: Option<usize> = None;
        for (i, c) in self.char_indices() {
            if c.is_alphanumeric() {
                if word_start.is_none() {
                    word_start = Some(i);
                }
            } else if let Some(start) = word_start.take() {
                spans.push((start, i));
            }
        }
        if let Some(start) = word_start {
            spans.push((start, self.len()));
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn suggests_link_for_matching_title() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target.md"), "---\ntitle: Waymo Robotaxi\n---\ncontent").unwrap();
        fs::write(dir.path().join("source.md"), "Discussion of Waymo Robotaxi today.").unwrap();

        let analyzer = GraphAnalyzer::new(dir.path(), crate::config::VaultConfig::default().graph);
        let suggester = LinkSuggester::new(&analyzer, dir.path());
        let suggestions = suggester.suggest("source.md", &SuggestOptions::default()).unwrap();

        assert!(suggestions.iter().any(|s| s.suggested_target == "Waymo Robotaxi"));
    }

    #[test]
    fn excludes_existing_links_by_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target.md"), "---\ntitle: Waymo\n---\ncontent").unwrap();
        fs::write(dir.path().join("source.md"), "See [[Waymo]] for details.").unwrap();

        let analyzer = GraphAnalyzer::new(dir.path(), crate::config::VaultConfig::default().graph);
        let suggester = LinkSuggester::new(&analyzer, dir.path());
        let suggestions = suggester.suggest("source.md", &SuggestOptions::default()).unwrap();

        assert!(suggestions.iter().all(|s| s.suggested_target != "Waymo"));
    }
}
