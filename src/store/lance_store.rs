//! Persistent vector store backed by LanceDB, adapted from the chunk-record
//! schema in the document-RAG storage layer to the simpler note-chunk shape
//! this crate needs (no `doc_id`/`space_id`/citation columns — identity is
//! `note_path` + `chunk_index`).

use anyhow::{Context, Result};
use arrow_array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use super::{StoreHit, VectorDocument, VectorStore};

pub struct LanceNoteStore {
    db: lancedb::Connection,
    dimension: usize,
    table_name: String,
}

impl LanceNoteStore {
    pub async fn new(path: &str, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let store = Self {
            db,
            dimension,
            table_name: "chunks".to_string(),
        };
        store.ensure_table().await?;
        Ok(store)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("note_path", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("has_header", DataType::Boolean, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            ),
            Field::new("created_at", DataType::Int64, false),
        ]))
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.contains(&self.table_name) {
            return Ok(());
        }

        let schema = self.schema();
        let seed_vec = vec![0.0f32; self.dimension];
        let values = Float32Array::from(seed_vec);
        let vector_field = Field::new("item", DataType::Float32, true);
        let vector_array = FixedSizeListArray::new(
            Arc::new(vector_field),
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["__seed__"])) as Arc<dyn Array>,
                Arc::new(StringArray::from(vec!["__seed__"])),
                Arc::new(UInt32Array::from(vec![0u32])),
                Arc::new(StringArray::from(vec![""])),
                Arc::new(StringArray::from(vec![""])),
                Arc::new(BooleanArray::from(vec![false])),
                Arc::new(vector_array) as Arc<dyn Array>,
                Arc::new(Int64Array::from(vec![0i64])),
            ],
        )
        .context("Failed to create seed RecordBatch")?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.db
            .create_table(&self.table_name, Box::new(batches))
            .execute()
            .await
            .context("Failed to create chunks table")?;

        let table = self.db.open_table(&self.table_name).execute().await?;
        table.delete("id = '__seed__'").await.ok();
        Ok(())
    }

    pub async fn create_index_if_needed(&self) -> Result<()> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count = table.count_rows(None).await?;
        if count >= 1_000 {
            table
                .create_index(&["vector"], lancedb::index::Index::Auto)
                .execute()
                .await
                .context("Failed to create vector index")?;
            tracing::info!("Created IVF-PQ index on {} rows", count);
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LanceNoteStore {
    async fn add(&self, docs: Vec<VectorDocument>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        // LanceDB has no native upsert; delete any existing rows sharing an
        // id first so re-adding a chunk replaces rather than duplicates it.
        let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        self.delete(&ids).await?;

        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .context("Failed to open chunks table")?;

        let schema = self.schema();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        let note_paths: Vec<&str> = docs.iter().map(|d| d.note_path.as_str()).collect();
        let chunk_indices: Vec<u32> = docs.iter().map(|d| d.chunk_index).collect();
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        let has_headers: Vec<bool> = docs.iter().map(|d| d.has_header).collect();
        let created_ats: Vec<i64> = docs.iter().map(|d| d.created_at).collect();

        let flat_vectors: Vec<f32> = docs.iter().flat_map(|d| d.vector.iter().copied()).collect();
        let values = Float32Array::from(flat_vectors);
        let vector_field = Field::new("item", DataType::Float32, true);
        let vector_array = FixedSizeListArray::new(
            Arc::new(vector_field),
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(note_paths)),
                Arc::new(UInt32Array::from(chunk_indices)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(titles)),
                Arc::new(BooleanArray::from(has_headers)),
                Arc::new(vector_array) as Arc<dyn Array>,
                Arc::new(Int64Array::from(created_ats)),
            ],
        )
        .context("Failed to create RecordBatch")?;

        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .context("Failed to insert chunks")?;

        tracing::debug!("Inserted {} chunks into LanceDB", docs.len());
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<StoreHit>> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let results = table
            .query()
            .nearest_to(query_vector)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .context("LanceDB vector search failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_hits(&batches))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count_before = table.count_rows(None).await.unwrap_or(0);
        let quoted: Vec<String> = ids
            .iter()
            .map(|id| format!("'{}'", id.replace('\'', "''")))
            .collect();
        let predicate = format!("id IN ({})", quoted.join(", "));
        table.delete(&predicate).await?;
        let count_after = table.count_rows(None).await.unwrap_or(0);
        Ok(count_before.saturating_sub(count_after))
    }

    async fn delete_by_note_path(&self, note_path: &str) -> Result<usize> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count_before = table.count_rows(None).await.unwrap_or(0);
        let predicate = format!("note_path = '{}'", note_path.replace('\'', "''"));
        table.delete(&predicate).await?;
        let count_after = table.count_rows(None).await.unwrap_or(0);
        Ok(count_before.saturating_sub(count_after))
    }

    async fn clear(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.contains(&self.table_name) {
            self.db.drop_table(&self.table_name, &[]).await?;
        }
        self.ensure_table().await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        Ok(table.count_rows(None).await?)
    }

    async fn get_all_documents(&self) -> Result<Vec<StoreHit>> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let results = table
            .query()
            .execute()
            .await
            .context("LanceDB list query failed")?;
        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_hits(&batches))
    }
}

fn extract_hits(batches: &[RecordBatch]) -> Vec<StoreHit> {
    let mut hits = Vec::new();
    for batch in batches {
        let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let note_paths = batch.column_by_name("note_path").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let contents = batch.column_by_name("content").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let titles = batch.column_by_name("title").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let chunk_indices = batch.column_by_name("chunk_index").and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
        let has_headers = batch.column_by_name("has_header").and_then(|c| c.as_any().downcast_ref::<BooleanArray>());
        let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(ids), Some(note_paths), Some(contents), Some(titles)) = (ids, note_paths, contents, titles) else {
            continue;
        };

        for i in 0..batch.num_rows() {
            if ids.value(i) == "__seed__" {
                continue;
            }
            let score = distances.map(|d| (1.0 - d.value(i)).max(0.0)).unwrap_or(0.0);
            hits.push(StoreHit {
                id: ids.value(i).to_string(),
                note_path: note_paths.value(i).to_string(),
                chunk_index: chunk_indices.map(|c| c.value(i)).unwrap_or(0),
                content: contents.value(i).to_string(),
                title: titles.value(i).to_string(),
                has_header: has_headers.map(|h| h.value(i)).unwrap_or(false),
                score,
            });
        }
    }
    hits
}
