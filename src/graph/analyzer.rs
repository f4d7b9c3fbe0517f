//! Vault-wide graph analysis: forward/back link maps, orphan and dangling
//! link detection, and PageRank centrality, built from the wikilinks parsed
//! out of every note.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use walkdir::WalkDir;

use super::front_matter::split_front_matter;
use super::pagerank::{pagerank, PageRankConfig};
use super::similarity::{cluster_similar_targets, SimilarityCluster};
use crate::wikilink::{normalize, parse_wikilinks};

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub include_context: bool,
    pub context_length: usize,
    pub subdir: Option<PathBuf>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            include_context: false,
            context_length: 80,
            subdir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacklinkEntry {
    pub source_note_path: String,
    pub source_note_title: String,
    pub context: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DanglingLinkSource {
    pub note_path: String,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct DanglingLink {
    pub target: String,
    pub sources: Vec<DanglingLinkSource>,
}

#[derive(Debug, Clone)]
pub struct NoteMetadataEntry {
    pub path: String,
    pub title: String,
    pub normalized_title: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NoteGraphStats {
    pub note_count: usize,
    pub unique_connections: usize,
    pub total_mentions: usize,
    pub dangling_links: Vec<DanglingLink>,
    pub orphan_notes: Vec<String>,
    /// normalized title -> backlink sources
    pub backlinks: HashMap<String, Vec<BacklinkEntry>>,
    /// note path -> target titles it links out to
    pub forward_links: HashMap<String, Vec<String>>,
    pub note_metadata: Vec<NoteMetadataEntry>,
}

#[derive(Debug, Clone)]
pub struct QuickStats {
    pub note_count: usize,
    pub connection_count: usize,
    pub dangling: usize,
    pub orphan: usize,
}

struct ParsedNote {
    path: String,
    title: String,
    normalized_title: String,
    tags: Vec<String>,
    content_hash: u64,
    links: Vec<crate::wikilink::Wikilink>,
    body: String,
}

pub struct GraphAnalyzer {
    vault_path: PathBuf,
    config: crate::config::GraphConfig,
    cache: Mutex<Option<(u64, NoteGraphStats)>>,
}

const EXCLUDED_DIRS: &[&str] = &["node_modules", ".index-storage"];

impl GraphAnalyzer {
    pub fn new(vault_path: impl Into<PathBuf>, config: crate::config::GraphConfig) -> Self {
        Self {
            vault_path: vault_path.into(),
            config,
            cache: Mutex::new(None),
        }
    }

    /// Invalidate the memoized stats, forcing the next `analyze` to
    /// rescan. Callers that mutate the vault (write/delete a note) should
    /// call this.
    pub fn invalidate_cache(&self) {
        *self.cache.lock() = None;
    }

    pub fn analyze(&self, options: &AnalyzeOptions) -> Result<NoteGraphStats> {
        let notes = self.scan_notes(options)?;
        let fingerprint = vault_fingerprint(&notes);

        {
            let cache = self.cache.lock();
            if let Some((cached_fp, stats)) = cache.as_ref() {
                if *cached_fp == fingerprint {
                    return Ok(stats.clone());
                }
            }
        }

        let stats = build_stats(&notes, options);
        *self.cache.lock() = Some((fingerprint, stats.clone()));
        Ok(stats)
    }

    pub fn quick_stats(&self) -> Result<QuickStats> {
        let stats = self.analyze(&AnalyzeOptions::default())?;
        Ok(QuickStats {
            note_count: stats.note_count,
            connection_count: stats.unique_connections,
            dangling: stats.dangling_links.len(),
            orphan: stats.orphan_notes.len(),
        })
    }

    /// Cluster dangling-link targets that likely refer to the same
    /// (misspelled or differently-cased) missing note.
    pub fn cluster_dangling_links(&self, stats: &NoteGraphStats) -> Vec<SimilarityCluster> {
        let targets: Vec<String> = stats.dangling_links.iter().map(|d| d.target.clone()).collect();
        let counts: HashMap<&str, usize> = stats
            .dangling_links
            .iter()
            .map(|d| (d.target.as_str(), d.sources.iter().map(|s| s.count).sum()))
            .collect();
        cluster_similar_targets(
            &targets,
            |t| counts.get(t).copied().unwrap_or(0),
            self.config.similarity_threshold as f64,
            self.config.min_cluster_size,
            self.config.max_cluster_results,
        )
    }

    /// `stats.forward_links` is keyed and valued per the public data model
    /// (`notePath -> [targetTitle]`, spec §3), but PageRank needs a single
    /// consistent node namespace. Resolve every target title back to its
    /// note path via `note_metadata` before handing adjacency to
    /// `pagerank`, so the returned map is keyed by `notePath` — matching
    /// what callers like the retriever look centrality up by.
    pub fn pagerank(&self, stats: &NoteGraphStats) -> HashMap<String, f64> {
        let config = PageRankConfig {
            damping: self.config.pagerank_damping,
            tolerance: self.config.pagerank_tolerance,
            max_iterations: self.config.pagerank_max_iterations,
        };

        let title_to_path: HashMap<&str, &str> = stats
            .note_metadata
            .iter()
            .map(|n| (n.normalized_title.as_str(), n.path.as_str()))
            .collect();

        let path_adjacency: HashMap<String, Vec<String>> = stats
            .forward_links
            .iter()
            .map(|(path, targets)| {
                let resolved = targets
                    .iter()
                    .filter_map(|title| title_to_path.get(normalize(title).as_str()).map(|p| p.to_string()))
                    .collect();
                (path.clone(), resolved)
            })
            .collect();

        pagerank(&path_adjacency, config)
    }

    fn scan_notes(&self, options: &AnalyzeOptions) -> Result<Vec<ParsedNote>> {
        let root = match &options.subdir {
            Some(sub) => self.vault_path.join(sub),
            None => self.vault_path.clone(),
        };

        let mut notes = Vec::new();
        for entry in WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| !is_excluded(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read note {}", path.display()))?;
            let rel_path = path
                .strip_prefix(&self.vault_path)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            let (front_matter, body, _offset) = split_front_matter(&content);
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string();
            let title = front_matter.title.clone().unwrap_or_else(|| stem.clone());
            let links = parse_wikilinks(body);
            let content_hash = hash_str(&content);

            notes.push(ParsedNote {
                path: rel_path,
                title: title.clone(),
                normalized_title: normalize(&title),
                tags: front_matter.tags,
                content_hash,
                links,
                body: body.to_string(),
            });
        }
        notes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(notes)
    }
}

fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.starts_with('.') || EXCLUDED_DIRS.contains(&name))
        .unwrap_or(false)
}

fn vault_fingerprint(notes: &[ParsedNote]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for note in notes {
        note.path.hash(&mut hasher);
        note.content_hash.hash(&mut hasher);
    }
    hasher.finish()
}

fn hash_str(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn build_stats(notes: &[ParsedNote], options: &AnalyzeOptions) -> NoteGraphStats {
    // Resolve both normalized title and basename to a note path.
    let mut title_index: HashMap<String, &ParsedNote> = HashMap::new();
    for note in notes {
        title_index.insert(note.normalized_title.clone(), note);
        let basename_norm = normalize(note.path.rsplit('/').next().unwrap_or(&note.path));
        title_index.entry(basename_norm).or_insert(note);
    }

    let mut forward_links: HashMap<String, Vec<String>> = HashMap::new();
    let mut backlinks: HashMap<String, Vec<BacklinkEntry>> = HashMap::new();
    let mut dangling_counts: HashMap<String, HashMap<String, usize>> = HashMap::new();
    let mut unique_connections: HashSet<(String, String)> = HashSet::new();
    let mut total_mentions = 0usize;

    for note in notes {
        let mut targets_for_note = Vec::new();
        for link in &note.links {
            total_mentions += 1;
            let normalized_target = normalize(&link.target);

            if let Some(target_note) = title_index.get(&normalized_target) {
                targets_for_note.push(target_note.title.clone());
                unique_connections.insert((note.path.clone(), target_note.path.clone()));

                let context = if options.include_context {
                    Some(extract_context(&note.body, link.position.start, options.context_length))
                } else {
                    None
                };

                backlinks
                    .entry(target_note.normalized_title.clone())
                    .or_default()
                    .push(BacklinkEntry {
                        source_note_path: note.path.clone(),
                        source_note_title: note.title.clone(),
                        context,
                        alias: link.alias.clone(),
                    });
            } else {
                *dangling_counts
                    .entry(normalized_target)
                    .or_default()
                    .entry(note.path.clone())
                    .or_insert(0) += 1;
            }
        }
        forward_links.insert(note.path.clone(), targets_for_note);
    }

    // Preserve the original (non-normalized) target spelling for reporting,
    // using the first occurrence seen for each normalized key.
    let mut display_target: HashMap<String, String> = HashMap::new();
    for note in notes {
        for link in &note.links {
            let normalized_target = normalize(&link.target);
            display_target
                .entry(normalized_target)
                .or_insert_with(|| link.target.clone());
        }
    }

    let mut dangling_links: Vec<DanglingLink> = dangling_counts
        .into_iter()
        .map(|(normalized, sources)| DanglingLink {
            target: display_target
                .get(&normalized)
                .cloned()
                .unwrap_or(normalized),
            sources: sources
                .into_iter()
                .map(|(note_path, count)| DanglingLinkSource { note_path, count })
                .collect(),
        })
        .collect();
    dangling_links.sort_by(|a, b| a.target.cmp(&b.target));

    let orphan_notes: Vec<String> = notes
        .iter()
        .filter(|note| {
            let has_outgoing = !forward_links.get(&note.path).map(|v| v.is_empty()).unwrap_or(true);
            let has_incoming = backlinks.contains_key(&note.normalized_title);
            !has_outgoing && !has_incoming
        })
        .map(|note| note.path.clone())
        .collect();

    let note_metadata = notes
        .iter()
        .map(|note| NoteMetadataEntry {
            path: note.path.clone(),
            title: note.title.clone(),
            normalized_title: note.normalized_title.clone(),
            tags: note.tags.clone(),
        })
        .collect();

    NoteGraphStats {
        note_count: notes.len(),
        unique_connections: unique_connections.len(),
        total_mentions,
        dangling_links,
        orphan_notes,
        backlinks,
        forward_links,
        note_metadata,
    }
}

fn extract_context(body: &str, link_start: usize, context_length: usize) -> String {
    let start = body
        .char_indices()
        .rev()
        .find(|&(i, _)| i <= link_start.saturating_sub(context_length))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let end = (link_start + context_length).min(body.len());
    let end = body
        .char_indices()
        .find(|&(i, _)| i >= end)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    body.get(start..end).unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_vault(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, content) in files {
            fs::write(dir.path().join(name), content).expect("write note");
        }
        dir
    }

    #[test]
    fn detects_dangling_link() {
        let dir = write_vault(&[("a.md", "See [[MissingNote]].")]);
        let analyzer = GraphAnalyzer::new(dir.path(), crate::config::VaultConfig::default().graph);
        let stats = analyzer.analyze(&AnalyzeOptions::default()).unwrap();
        assert_eq!(stats.dangling_links.len(), 1);
        assert_eq!(stats.dangling_links[0].target, "MissingNote");
        assert_eq!(stats.orphan_notes.len(), 0);
    }

    #[test]
    fn detects_orphan_note() {
        let dir = write_vault(&[("a.md", "no links here")]);
        let analyzer = GraphAnalyzer::new(dir.path(), crate::config::VaultConfig::default().graph);
        let stats = analyzer.analyze(&AnalyzeOptions::default()).unwrap();
        assert_eq!(stats.orphan_notes, vec!["a.md".to_string()]);
    }

    #[test]
    fn resolves_link_by_title() {
        let dir = write_vault(&[
            ("a.md", "See [[My Target]]."),
            ("b.md", "---\ntitle: My Target\n---\ncontent"),
        ]);
        let analyzer = GraphAnalyzer::new(dir.path(), crate::config::VaultConfig::default().graph);
        let stats = analyzer.analyze(&AnalyzeOptions::default()).unwrap();
        assert!(stats.dangling_links.is_empty());
        assert!(stats.backlinks.contains_key("my target"));
    }

    #[test]
    fn cache_invalidation_picks_up_changes() {
        let dir = write_vault(&[("a.md", "no links")]);
        let analyzer = GraphAnalyzer::new(dir.path(), crate::config::VaultConfig::default().graph);
        let first = analyzer.analyze(&AnalyzeOptions::default()).unwrap();
        assert_eq!(first.orphan_notes.len(), 1);

        fs::write(dir.path().join("b.md"), "See [[a]]").unwrap();
        let second = analyzer.analyze(&AnalyzeOptions::default()).unwrap();
        assert_eq!(second.note_count, 2);
        assert_eq!(second.orphan_notes.len(), 0);
    }

    #[test]
    fn pagerank_is_keyed_by_note_path_and_ranks_hub_highest() {
        // b.md and c.md both link to a.md (by title, not path), so a.md
        // should come out on top keyed by its *path*, not by "A".
        let dir = write_vault(&[
            ("a.md", "---\ntitle: A\n---\nno outgoing links"),
            ("b.md", "See [[A]]."),
            ("c.md", "See [[A]]."),
        ]);
        let analyzer = GraphAnalyzer::new(dir.path(), crate::config::VaultConfig::default().graph);
        let stats = analyzer.analyze(&AnalyzeOptions::default()).unwrap();
        let scores = analyzer.pagerank(&stats);

        assert!(scores.contains_key("a.md"), "expected a path-keyed entry for a.md, got {:?}", scores.keys().collect::<Vec<_>>());
        assert!(!scores.contains_key("A"), "phantom title node leaked into pagerank output");
        assert!(scores["a.md"] >= scores["b.md"]);
        assert!(scores["a.md"] >= scores["c.md"]);
    }
}
