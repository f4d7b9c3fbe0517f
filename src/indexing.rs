//! Incremental indexer: reconciles the on-disk note set with the vector
//! store and [`IndexMetadata`], minimizing work (spec §4.8).

use anyhow::{Context, Result};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

use crate::chunker::NoteChunker;
use crate::config::VaultConfig;
use crate::embeddings::EmbeddingModel;
use crate::graph::front_matter::split_front_matter;
use crate::store::{chunk_id, VectorDocument, VectorStore};
use crate::types::{IndexMetadata, IndexReport, LoadMetadataResult, NoteIndexEntry, INDEX_METADATA_VERSION};

const EXCLUDED_DIRS: &[&str] = &["node_modules", ".index-storage"];

struct ScannedNote {
    path: String,
    content: String,
    content_hash: String,
    mtime: i64,
}

pub struct NoteIndexer {
    vault_path: PathBuf,
    meta_path: PathBuf,
    config: VaultConfig,
    chunker: NoteChunker,
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
}

impl NoteIndexer {
    pub fn new(config: VaultConfig, embedder: Arc<dyn EmbeddingModel>, store: Arc<dyn VectorStore>) -> Self {
        let meta_path = config.index_meta_path();
        let chunker = NoteChunker::new(&config.chunking);
        Self {
            vault_path: config.vault_path.clone(),
            meta_path,
            config,
            chunker,
            embedder,
            store,
        }
    }

    /// `loadMetadata()` — load and validate persisted metadata, without
    /// touching the vector store.
    pub fn load_metadata(&self) -> LoadMetadataResult {
        match self.read_metadata() {
            Ok(Some(meta)) => LoadMetadataResult {
                loaded: true,
                reason: None,
                note_count: meta.notes.len(),
            },
            Ok(None) => LoadMetadataResult {
                loaded: false,
                reason: Some("file_not_found".to_string()),
                note_count: 0,
            },
            Err(e) => LoadMetadataResult {
                loaded: false,
                reason: Some(e.to_string()),
                note_count: 0,
            },
        }
    }

    /// `indexAll()` — purge, scan, chunk, embed, add; write IndexMetadata.
    pub async fn index_all(&self) -> Result<IndexReport> {
        self.store.clear().await.context("Failed to clear vector store")?;

        let notes = self.scan_vault()?;
        let mut report = IndexReport::default();
        let mut metadata = IndexMetadata::default();

        for note in &notes {
            match self.index_one(note).await {
                Ok(chunk_count) => {
                    report.added += 1;
                    metadata.notes.insert(
                        note.path.clone(),
                        NoteIndexEntry {
                            note_id: note.path.clone(),
                            content_hash: note.content_hash.clone(),
                            mtime: note.mtime,
                            chunk_count,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(note = %note.path, error = %e, "Failed to index note");
                    report.failed.push(note.path.clone());
                }
            }
        }

        self.write_metadata(&metadata)?;
        Ok(report)
    }

    /// `indexIncremental()` — the heart of the subsystem. See spec §4.8.
    pub async fn index_incremental(&self) -> Result<IndexReport> {
        let mut metadata = match self.read_metadata()? {
            Some(meta) => meta,
            None => {
                let store_count = self.store.count().await.unwrap_or(0);
                if store_count > 0 {
                    anyhow::bail!("index metadata missing but vector store is non-empty (reason: file_not_found); call index_all instead");
                }
                IndexMetadata::default()
            }
        };

        let notes = self.scan_vault()?;
        let mut report = IndexReport::default();
        let mut seen_paths: std::collections::HashSet<String> = std::collections::HashSet::new();

        for note in &notes {
            seen_paths.insert(note.path.clone());
            match metadata.notes.get(&note.path) {
                None => match self.index_one(note).await {
                    Ok(chunk_count) => {
                        report.added += 1;
                        metadata.notes.insert(
                            note.path.clone(),
                            NoteIndexEntry {
                                note_id: note.path.clone(),
                                content_hash: note.content_hash.clone(),
                                mtime: note.mtime,
                                chunk_count,
                            },
                        );
                    }
                    Err(e) => {
                        tracing::warn!(note = %note.path, error = %e, "Failed to index new note");
                        report.failed.push(note.path.clone());
                    }
                },
                Some(entry) if entry.content_hash != note.content_hash => {
                    if let Err(e) = self.store.delete_by_note_path(&note.path).await {
                        tracing::warn!(note = %note.path, error = %e, "Failed to clear stale chunks");
                        report.failed.push(note.path.clone());
                        continue;
                    }
                    match self.index_one(note).await {
                        Ok(chunk_count) => {
                            report.updated += 1;
                            metadata.notes.insert(
                                note.path.clone(),
                                NoteIndexEntry {
                                    note_id: note.path.clone(),
                                    content_hash: note.content_hash.clone(),
                                    mtime: note.mtime,
                                    chunk_count,
                                },
                            );
                        }
                        Err(e) => {
                            tracing::warn!(note = %note.path, error = %e, "Failed to re-index updated note");
                            report.failed.push(note.path.clone());
                            metadata.notes.remove(&note.path);
                        }
                    }
                }
                Some(_) => {}
            }
        }

        let removed_paths: Vec<String> = metadata
            .notes
            .keys()
            .filter(|p| !seen_paths.contains(*p))
            .cloned()
            .collect();

        for path in removed_paths {
            self.store
                .delete_by_note_path(&path)
                .await
                .with_context(|| format!("Failed to delete chunks for removed note {}", path))?;
            metadata.notes.remove(&path);
            report.removed += 1;
        }

        self.write_metadata(&metadata)?;
        Ok(report)
    }

    /// `indexNote(path)` — refresh a single note after an external write.
    pub async fn index_note(&self, relative_path: &str) -> Result<()> {
        let abs_path = self.vault_path.join(relative_path);
        let content = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("failed to read note {}", relative_path))?;
        let mtime = mtime_of(&abs_path);
        let note = ScannedNote {
            path: relative_path.replace('\\', "/"),
            content_hash: content_hash(&content),
            content,
            mtime,
        };

        self.store.delete_by_note_path(&note.path).await?;
        let chunk_count = self.index_one(&note).await?;

        let mut metadata = self.read_metadata()?.unwrap_or_default();
        metadata.notes.insert(
            note.path.clone(),
            NoteIndexEntry {
                note_id: note.path.clone(),
                content_hash: note.content_hash.clone(),
                mtime: note.mtime,
                chunk_count,
            },
        );
        self.write_metadata(&metadata)?;
        Ok(())
    }

    async fn index_one(&self, note: &ScannedNote) -> Result<usize> {
        let chunks = self.chunker.chunk_note(&note.content);
        if chunks.is_empty() {
            return Ok(0);
        }

        let (front_matter, _, _) = split_front_matter(&note.content);
        let title = front_matter.title.unwrap_or_else(|| {
            Path::new(&note.path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string()
        });

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self
            .embedder
            .embed_documents(&texts)
            .with_context(|| format!("embedding failed for note {}", note.path))?;

        let created_at = note.mtime;
        let docs: Vec<VectorDocument> = chunks
            .iter()
            .zip(vectors.into_iter())
            .map(|(chunk, vector)| VectorDocument {
                id: chunk_id(&note.path, chunk.index as u32),
                note_path: note.path.clone(),
                chunk_index: chunk.index as u32,
                content: chunk.text.clone(),
                title: title.clone(),
                has_header: chunk.has_header,
                vector,
                created_at,
            })
            .collect();

        let chunk_count = docs.len();
        self.store.add(docs).await?;
        Ok(chunk_count)
    }

    fn scan_vault(&self) -> Result<Vec<ScannedNote>> {
        let mut notes = Vec::new();
        for entry in WalkDir::new(&self.vault_path)
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

            notes.push(ScannedNote {
                content_hash: content_hash(&content),
                path: rel_path,
                mtime: mtime_of(path),
                content,
            });
        }
        notes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(notes)
    }

    fn read_metadata(&self) -> Result<Option<IndexMetadata>> {
        if !self.meta_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.meta_path)
            .with_context(|| format!("failed to read {}", self.meta_path.display()))?;
        let metadata: IndexMetadata = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.meta_path.display()))?;
        if metadata.version != INDEX_METADATA_VERSION {
            tracing::warn!(
                found = metadata.version,
                expected = INDEX_METADATA_VERSION,
                "index metadata version mismatch, treating as absent"
            );
            return Ok(None);
        }
        Ok(Some(metadata))
    }

    fn write_metadata(&self, metadata: &IndexMetadata) -> Result<()> {
        if let Some(parent) = self.meta_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(metadata).context("failed to serialize index metadata")?;
        std::fs::write(&self.meta_path, raw)
            .with_context(|| format!("failed to write {}", self.meta_path.display()))?;
        Ok(())
    }
}

fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.starts_with('.') || EXCLUDED_DIRS.contains(&name))
        .unwrap_or(false)
}

fn mtime_of(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(UNIX_EPOCH)
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn content_hash(content: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::fs;

    struct FakeEmbedder;

    impl EmbeddingModel for FakeEmbedder {
        fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        fn embed_document(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    fn indexer_for(dir: &Path) -> NoteIndexer {
        let mut config = VaultConfig::default();
        config.vault_path = dir.to_path_buf();
        config.data_dir = dir.join(".index-storage");
        NoteIndexer::new(config, Arc::new(FakeEmbedder), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn index_all_then_incremental_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A\nhello world").unwrap();
        let indexer = indexer_for(dir.path());

        let first = indexer.index_all().await.unwrap();
        assert_eq!(first.added, 1);

        let second = indexer.index_incremental().await.unwrap();
        assert_eq!((second.added, second.updated, second.removed), (0, 0, 0));
    }

    #[tokio::test]
    async fn modifying_one_note_reports_single_update() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("n1.md"), "v1").unwrap();
        fs::write(dir.path().join("n2.md"), "v2").unwrap();
        let indexer = indexer_for(dir.path());
        indexer.index_all().await.unwrap();

        fs::write(dir.path().join("n1.md"), "v1-updated").unwrap();
        let report = indexer.index_incremental().await.unwrap();
        assert_eq!((report.added, report.updated, report.removed), (0, 1, 0));
    }

    #[tokio::test]
    async fn deleting_a_note_removes_its_chunks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "content a").unwrap();
        let indexer = indexer_for(dir.path());
        indexer.index_all().await.unwrap();

        fs::remove_file(dir.path().join("a.md")).unwrap();
        let report = indexer.index_incremental().await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(indexer.store.count().await.unwrap(), 0);
    }

    #[test]
    fn load_metadata_reports_file_not_found_before_any_index() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = indexer_for(dir.path());
        let result = indexer.load_metadata();
        assert!(!result.loaded);
        assert_eq!(result.reason.as_deref(), Some("file_not_found"));
    }
}
