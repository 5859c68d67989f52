//! LanceDB-backed nearest-neighbor index over chunk embeddings.
//!
//! The store is the persisted artifact of ingestion and is append-mostly:
//! the only supported mutation path is rebuilding the table from scratch,
//! which ingestion does as a single bulk insert after every chunk has been
//! embedded. Queries return the k nearest chunks ordered by decreasing
//! similarity; ties fall to LanceDB's native order, which is deterministic
//! for a fixed table and k.

#[cfg(test)]
mod tests;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunking::Chunk;
use crate::metadata::{ContentType, DocumentMetadata};
use crate::QaError;

const TABLE_NAME: &str = "chunks";

/// A chunk paired with its embedding, ready for insertion.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Higher is better; derived as `1.0 - distance`.
    pub similarity: f32,
    pub distance: f32,
}

pub struct VectorStore {
    connection: Connection,
    vector_dimension: Option<usize>,
}

impl VectorStore {
    /// Open (or create) the store at `path`. When a table already exists its
    /// vector dimension is detected from the schema.
    #[inline]
    pub async fn open(path: &Path) -> Result<Self, QaError> {
        debug!("Opening vector store at {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| QaError::Store(format!("Failed to create store directory: {}", e)))?;
        }

        let uri = format!("file://{}", path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to connect to LanceDB: {}", e)))?;

        let mut store = Self {
            connection,
            vector_dimension: None,
        };

        if store.table_exists().await? {
            match store.detect_vector_dimension().await {
                Ok(dim) => {
                    store.vector_dimension = Some(dim);
                    debug!("Detected existing vector dimension: {}", dim);
                }
                Err(e) => {
                    warn!("Could not detect vector dimension from existing table: {}", e);
                }
            }
        }

        Ok(store)
    }

    /// Whether a persisted index is present at this location.
    #[inline]
    pub async fn is_initialized(&self) -> Result<bool, QaError> {
        self.table_exists().await
    }

    /// Replace the index with `records` in one bulk insert. The vector
    /// dimension is taken from the first record.
    #[inline]
    pub async fn rebuild(&mut self, records: Vec<EmbeddingRecord>) -> Result<(), QaError> {
        let Some(first) = records.first() else {
            return Err(QaError::Store(
                "Refusing to build an index from zero records".to_string(),
            ));
        };
        let vector_dim = first.vector.len();

        if records.iter().any(|r| r.vector.len() != vector_dim) {
            return Err(QaError::Store(
                "Embedding dimensions are inconsistent across records".to_string(),
            ));
        }

        info!(
            "Rebuilding index with {} records ({} dimensions)",
            records.len(),
            vector_dim
        );

        self.drop_table_if_exists().await?;
        let schema = create_schema(vector_dim);
        self.connection
            .create_empty_table(TABLE_NAME, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to create table: {}", e)))?;
        self.vector_dimension = Some(vector_dim);

        let record_batch = self.create_record_batch(&records)?;
        let table = self.open_table().await?;
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to insert records: {}", e)))?;

        // Compact after the bulk insert so queries don't pay for it later.
        if let Err(e) = table.optimize(lancedb::table::OptimizeAction::All).await {
            warn!("Failed to optimize table after rebuild: {}", e);
        }

        info!("Successfully stored {} records", records.len());
        Ok(())
    }

    /// Return the `k` nearest chunks to `query_vector`, best first.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, QaError> {
        debug!("Searching for {} nearest chunks", k);

        let table = self.open_table().await?;

        let query = table
            .vector_search(query_vector)
            .map_err(|e| QaError::Store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(k);

        let mut stream = query
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to execute search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| QaError::Store(format!("Failed to read result stream: {}", e)))?
        {
            results.extend(parse_search_batch(&batch)?);
        }

        debug!("Search returned {} chunks", results.len());
        Ok(results)
    }

    /// Total number of chunks stored.
    #[inline]
    pub async fn count(&self) -> Result<u64, QaError> {
        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Store(format!("Failed to count rows: {}", e)))?;
        Ok(count as u64)
    }

    async fn table_exists(&self) -> Result<bool, QaError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.iter().any(|name| name == TABLE_NAME))
    }

    async fn open_table(&self) -> Result<lancedb::Table, QaError> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| QaError::Store(format!("Failed to open table: {}", e)))
    }

    async fn drop_table_if_exists(&self) -> Result<(), QaError> {
        if self.table_exists().await? {
            info!("Dropping existing chunks table");
            self.connection
                .drop_table(TABLE_NAME)
                .await
                .map_err(|e| QaError::Store(format!("Failed to drop table: {}", e)))?;
        }
        Ok(())
    }

    async fn detect_vector_dimension(&self) -> Result<usize, QaError> {
        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| QaError::Store(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(QaError::Store(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch, QaError> {
        let len = records.len();
        let vector_dim = self
            .vector_dimension
            .ok_or_else(|| QaError::Store("Vector dimension not set".to_string()))?;

        let mut ids = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut source_files = Vec::with_capacity(len);
        let mut filenames = Vec::with_capacity(len);
        let mut content_types = Vec::with_capacity(len);
        let mut collections = Vec::with_capacity(len);
        let mut sequence_numbers = Vec::with_capacity(len);
        let mut titles = Vec::with_capacity(len);
        let mut source_urls = Vec::with_capacity(len);
        let mut dates = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut total_chunks = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        let created_at = chrono::Utc::now().to_rfc3339();
        for record in records {
            let metadata = &record.chunk.metadata;
            ids.push(record.id.as_str());
            contents.push(record.chunk.content.as_str());
            source_files.push(metadata.source_file.as_str());
            filenames.push(metadata.filename.as_str());
            content_types.push(metadata.content_type.as_str());
            collections.push(metadata.collection.as_str());
            sequence_numbers.push(metadata.sequence_number.as_deref());
            titles.push(metadata.title.as_deref());
            source_urls.push(metadata.source_url.as_deref());
            dates.push(metadata.date.as_deref());
            chunk_indices.push(record.chunk.chunk_index as u32);
            total_chunks.push(record.chunk.total_chunks as u32);
            created_ats.push(created_at.as_str());
        }

        let mut flat_values = Vec::with_capacity(len * vector_dim);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }
        let values_array = Float32Array::from(flat_values);
        let item_field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(item_field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| QaError::Store(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(source_files)),
            Arc::new(StringArray::from(filenames)),
            Arc::new(StringArray::from(content_types)),
            Arc::new(StringArray::from(collections)),
            Arc::new(StringArray::from(sequence_numbers)),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(source_urls)),
            Arc::new(StringArray::from(dates)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(UInt32Array::from(total_chunks)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(create_schema(vector_dim), arrays)
            .map_err(|e| QaError::Store(format!("Failed to create record batch: {}", e)))
    }
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("source_file", DataType::Utf8, false),
        Field::new("filename", DataType::Utf8, false),
        Field::new("content_type", DataType::Utf8, false),
        Field::new("collection", DataType::Utf8, false),
        Field::new("sequence_number", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("source_url", DataType::Utf8, true),
        Field::new("date", DataType::Utf8, true),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("total_chunks", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, QaError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| QaError::Store(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array, QaError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| QaError::Store(format!("Invalid {} column type", name)))
}

fn optional_value(array: &StringArray, row: usize) -> Option<String> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row).to_string())
    }
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>, QaError> {
    let num_rows = batch.num_rows();

    let contents = string_column(batch, "content")?;
    let source_files = string_column(batch, "source_file")?;
    let filenames = string_column(batch, "filename")?;
    let content_types = string_column(batch, "content_type")?;
    let collections = string_column(batch, "collection")?;
    let sequence_numbers = string_column(batch, "sequence_number")?;
    let titles = string_column(batch, "title")?;
    let source_urls = string_column(batch, "source_url")?;
    let dates = string_column(batch, "date")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;
    let total_chunks = u32_column(batch, "total_chunks")?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(num_rows);
    for row in 0..num_rows {
        let content_type_raw = content_types.value(row);
        let content_type = ContentType::parse(content_type_raw).ok_or_else(|| {
            QaError::Store(format!("Unknown content_type in index: {}", content_type_raw))
        })?;

        let chunk = Chunk {
            content: contents.value(row).to_string(),
            metadata: DocumentMetadata {
                source_file: source_files.value(row).to_string(),
                filename: filenames.value(row).to_string(),
                content_type,
                collection: collections.value(row).to_string(),
                sequence_number: optional_value(sequence_numbers, row),
                title: optional_value(titles, row),
                source_url: optional_value(source_urls, row),
                date: optional_value(dates, row),
            },
            chunk_index: chunk_indices.value(row) as usize,
            total_chunks: total_chunks.value(row) as usize,
        };

        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        results.push(ScoredChunk {
            chunk,
            similarity: 1.0 - distance,
            distance,
        });
    }

    Ok(results)
}
