#[cfg(test)]
mod tests;

use super::{ChunkMetadata, EmbeddingRecord};
use crate::config::Config;
use crate::embeddings::chunking::FileType;
use crate::{IndexError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Columns a replace is keyed on; (file path, chunk index) is unique in the table
const MERGE_KEYS: [&str; 2] = ["file_path", "chunk_index"];

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_metadata: ChunkMetadata,
    /// Cosine distance from the query vector; smaller is closer
    pub distance: f32,
}

impl VectorStore {
    /// Open (or create) the vector table at `db_path`.
    ///
    /// An existing empty table whose vector width differs from `vector_dimension` is recreated.
    /// A non-empty one is kept as it is, and writes of another width fail until it is reset.
    #[inline]
    pub async fn new(db_path: &Path, table_name: &str, vector_dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            IndexError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            error!("Failed to connect to LanceDB: {}", e);
            IndexError::Database(format!("Failed to connect to LanceDB: {}", e))
        })?;

        let mut store = Self {
            connection,
            table_name: table_name.to_string(),
            vector_dimension,
        };

        store.initialize_table().await?;

        debug!("Vector store initialized successfully");
        Ok(store)
    }

    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.vector_database_path(),
            &config.storage.table_name,
            config.ollama.embedding_dimension as usize,
        )
        .await
    }

    /// Width of the vectors the table stores
    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn initialize_table(&mut self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            let existing = self.detect_existing_vector_dimension().await?;
            if existing != self.vector_dimension {
                if self.count_embeddings().await? == 0 {
                    info!(
                        "Empty table '{}' has dimension {}, recreating with {}",
                        self.table_name, existing, self.vector_dimension
                    );
                    self.recreate_table_with_dimension(self.vector_dimension)
                        .await?;
                } else {
                    warn!(
                        "Table '{}' stores {}-dimensional vectors but {} are configured; \
                         run `semindex reset` before indexing with the new model",
                        self.table_name, existing, self.vector_dimension
                    );
                    self.vector_dimension = existing;
                }
            }
            return Ok(());
        }

        info!(
            "Creating table '{}' with {} dimensions",
            self.table_name, self.vector_dimension
        );

        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(self.vector_dimension))
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size).map_err(|_| {
                        IndexError::Database(format!("Invalid vector dimension: {}", size))
                    });
                }
            }
        }

        Err(IndexError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("file_path", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("file_hash", DataType::Utf8, false),
            Field::new("chunk_hash", DataType::Utf8, false),
            Field::new("file_type", DataType::Utf8, false),
            Field::new("language", DataType::Utf8, true),
            Field::new("section", DataType::Utf8, true),
            Field::new("content", DataType::Utf8, false),
            Field::new("token_count", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
            Field::new("updated_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to open table: {}", e)))
    }

    /// Accept vectors of `vector_dim` width, recreating the table if it is still empty
    async fn ensure_dimension(&mut self, vector_dim: usize) -> Result<()> {
        if vector_dim == self.vector_dimension {
            return Ok(());
        }

        if self.count_embeddings().await? > 0 {
            return Err(IndexError::Database(format!(
                "Embedding dimension mismatch: table '{}' stores {} dimensions but received {}; \
                 run `semindex reset` to rebuild the index",
                self.table_name, self.vector_dimension, vector_dim
            )));
        }

        info!(
            "Vector dimension changed from {} to {} on an empty table, recreating",
            self.vector_dimension, vector_dim
        );
        self.recreate_table_with_dimension(vector_dim).await?;
        self.vector_dimension = vector_dim;
        Ok(())
    }

    async fn recreate_table_with_dimension(&self, vector_dim: usize) -> Result<()> {
        self.drop_table_if_exists().await?;

        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| {
                IndexError::Database(format!("Failed to create table with new dimensions: {}", e))
            })?;

        info!("Table recreated successfully with {} dimensions", vector_dim);
        Ok(())
    }

    fn create_record_batch(records: &[EmbeddingRecord], vector_dim: usize) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut file_paths = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut file_hashes = Vec::with_capacity(len);
        let mut chunk_hashes = Vec::with_capacity(len);
        let mut file_types = Vec::with_capacity(len);
        let mut languages = Vec::with_capacity(len);
        let mut sections = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut token_counts = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut updated_ats = Vec::with_capacity(len);

        for record in records {
            if record.vector.len() != vector_dim {
                return Err(IndexError::Database(format!(
                    "Embedding dimension mismatch for {} chunk {}: expected {}, got {}",
                    record.metadata.file_path,
                    record.metadata.chunk_index,
                    vector_dim,
                    record.vector.len()
                )));
            }

            let metadata = &record.metadata;
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            file_paths.push(metadata.file_path.as_str());
            chunk_indices.push(metadata.chunk_index);
            file_hashes.push(metadata.file_hash.as_str());
            chunk_hashes.push(metadata.chunk_hash.as_str());
            file_types.push(metadata.file_type.as_str());
            languages.push(metadata.language.as_deref());
            sections.push(metadata.section.as_deref());
            contents.push(metadata.content.as_str());
            token_counts.push(metadata.token_count);
            created_ats.push(metadata.created_at.as_str());
            updated_ats.push(metadata.updated_at.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    IndexError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(file_paths)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(file_hashes)),
            Arc::new(StringArray::from(chunk_hashes)),
            Arc::new(StringArray::from(file_types)),
            Arc::new(StringArray::from(languages)),
            Arc::new(StringArray::from(sections)),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(token_counts)),
            Arc::new(StringArray::from(created_ats)),
            Arc::new(StringArray::from(updated_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| IndexError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Replace every record of `file_path` with `records` in a single table commit.
    ///
    /// Readers see either the previous records for the path or the new ones. An empty `records`
    /// removes the path from the table.
    #[inline]
    pub async fn replace_file(
        &mut self,
        file_path: &str,
        records: Vec<EmbeddingRecord>,
    ) -> Result<usize> {
        let predicate = format!("file_path = {}", sql_string(file_path));

        let Some(first) = records.first() else {
            debug!("Removing all records for {}", file_path);
            self.open_table()
                .await?
                .delete(&predicate)
                .await
                .map_err(|e| {
                    IndexError::Database(format!("Failed to delete records for file: {}", e))
                })?;
            return Ok(0);
        };

        if let Some(stray) = records
            .iter()
            .find(|record| record.metadata.file_path != file_path)
        {
            return Err(IndexError::Database(format!(
                "Record for {} cannot be written as part of {}",
                stray.metadata.file_path, file_path
            )));
        }

        self.ensure_dimension(first.vector.len()).await?;

        let count = records.len();
        let record_batch = Self::create_record_batch(&records, self.vector_dimension)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let table = self.open_table().await?;
        let mut merge = table.merge_insert(&MERGE_KEYS);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all()
            .when_not_matched_by_source_delete(Some(predicate));
        merge.execute(Box::new(reader)).await.map_err(|e| {
            IndexError::Database(format!("Failed to replace records for file: {}", e))
        })?;

        debug!("Replaced records for {} with {} chunks", file_path, count);
        Ok(count)
    }

    /// Remove every record of a file
    #[inline]
    pub async fn delete_file(&mut self, file_path: &str) -> Result<()> {
        self.replace_file(file_path, Vec::new()).await.map(|_| ())
    }

    /// Stored vectors of a file keyed by chunk hash
    #[inline]
    pub async fn vectors_for_file(&self, file_path: &str) -> Result<HashMap<String, Vec<f32>>> {
        let table = self.open_table().await?;
        let predicate = format!("file_path = {}", sql_string(file_path));

        let count = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| IndexError::Database(format!("Failed to count rows: {}", e)))?;
        if count == 0 {
            return Ok(HashMap::new());
        }

        let mut results = table
            .query()
            .only_if(predicate)
            .select(Select::Columns(vec![
                "chunk_hash".to_string(),
                "vector".to_string(),
            ]))
            .limit(count)
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to query stored vectors: {}", e)))?;

        let mut vectors = HashMap::with_capacity(count);
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to read result stream: {}", e)))?
        {
            let hashes = string_column(&batch, "chunk_hash")?;
            let vector_lists = batch
                .column_by_name("vector")
                .ok_or_else(|| IndexError::Database("Missing vector column".to_string()))?
                .as_any()
                .downcast_ref::<FixedSizeListArray>()
                .ok_or_else(|| IndexError::Database("Invalid vector column type".to_string()))?;

            for row in 0..batch.num_rows() {
                let values = vector_lists.value(row);
                let floats = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| IndexError::Database("Invalid vector item type".to_string()))?;
                vectors.insert(hashes.value(row).to_string(), floats.values().to_vec());
            }
        }

        debug!("Loaded {} stored vectors for {}", vectors.len(), file_path);
        Ok(vectors)
    }

    /// Search for the nearest chunks by cosine distance, closest first
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
        file_type: Option<FileType>,
    ) -> Result<Vec<SearchResult>> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.vector_dimension {
            return Err(IndexError::Database(format!(
                "Query vector has {} dimensions but table '{}' stores {}",
                query_vector.len(),
                self.table_name,
                self.vector_dimension
            )));
        }

        let table = self.open_table().await?;
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| IndexError::Database(format!("Failed to count rows: {}", e)))?;
        if total == 0 {
            debug!("Vector table is empty");
            return Ok(Vec::new());
        }

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| IndexError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(file_type) = file_type {
            query = query.only_if(format!("file_type = '{}'", file_type.as_str()));
        }

        let mut results = query
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to execute search: {}", e)))?;

        let mut search_results = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        search_results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        search_results.truncate(limit);

        debug!("Parsed {} search results", search_results.len());
        Ok(search_results)
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let file_paths = string_column(batch, "file_path")?;
        let chunk_indices = u32_column(batch, "chunk_index")?;
        let file_hashes = string_column(batch, "file_hash")?;
        let chunk_hashes = string_column(batch, "chunk_hash")?;
        let file_types = string_column(batch, "file_type")?;
        let languages = string_column(batch, "language")?;
        let sections = string_column(batch, "section")?;
        let contents = string_column(batch, "content")?;
        let token_counts = u32_column(batch, "token_count")?;
        let created_ats = string_column(batch, "created_at")?;
        let updated_ats = string_column(batch, "updated_at")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let file_type = file_types
                .value(row)
                .parse::<FileType>()
                .map_err(IndexError::Database)?;

            let chunk_metadata = ChunkMetadata {
                file_path: file_paths.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                file_hash: file_hashes.value(row).to_string(),
                chunk_hash: chunk_hashes.value(row).to_string(),
                file_type,
                language: optional_string(languages, row),
                section: optional_string(sections, row),
                content: contents.value(row).to_string(),
                token_count: token_counts.value(row),
                created_at: created_ats.value(row).to_string(),
                updated_at: updated_ats.value(row).to_string(),
            };

            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            search_results.push(SearchResult {
                chunk_metadata,
                distance,
            });
        }

        Ok(search_results)
    }

    /// Record count per file path, read from the table itself
    #[inline]
    pub async fn file_chunk_counts(&self) -> Result<HashMap<String, usize>> {
        let table = self.open_table().await?;
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| IndexError::Database(format!("Failed to count rows: {}", e)))?;

        let mut counts = HashMap::new();
        if total == 0 {
            return Ok(counts);
        }

        let mut results = table
            .query()
            .select(Select::Columns(vec!["file_path".to_string()]))
            .limit(total)
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to scan file paths: {}", e)))?;

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to read result stream: {}", e)))?
        {
            let file_paths = string_column(&batch, "file_path")?;
            for row in 0..batch.num_rows() {
                *counts.entry(file_paths.value(row).to_string()).or_insert(0) += 1;
            }
        }

        Ok(counts)
    }

    /// Get the total number of records stored
    #[inline]
    pub async fn count_embeddings(&self) -> Result<u64> {
        let table = self.open_table().await?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| IndexError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Compact data files and prune old table versions
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        debug!("Optimizing vector database");

        self.open_table()
            .await?
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| IndexError::Database(format!("Failed to optimize table: {}", e)))?;

        debug!("Vector database optimization completed");
        Ok(())
    }

    /// Drop every record and recreate the table with `vector_dim` columns
    #[inline]
    pub async fn reset(&mut self, vector_dim: usize) -> Result<()> {
        info!(
            "Resetting table '{}' with {} dimensions",
            self.table_name, vector_dim
        );
        self.recreate_table_with_dimension(vector_dim).await?;
        self.vector_dimension = vector_dim;
        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        let table_names =
            self.connection.table_names().execute().await.map_err(|e| {
                IndexError::Database(format!("Failed to list tables for drop: {}", e))
            })?;

        if table_names.contains(&self.table_name) {
            info!("Dropping table '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| IndexError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }

    /// Check that the table exists and can be read
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool> {
        debug!("Validating vector table integrity");

        let table_names = match self.connection.table_names().execute().await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list tables during integrity check: {}", e);
                return Ok(false);
            }
        };

        if !table_names.contains(&self.table_name) {
            warn!("Table '{}' missing during integrity check", self.table_name);
            return Ok(false);
        }

        match self.connection.open_table(&self.table_name).execute().await {
            Ok(table) => match table.count_rows(None).await {
                Ok(count) => {
                    debug!("Integrity check passed, {} rows found", count);
                    Ok(true)
                }
                Err(e) => {
                    error!("Failed to count rows during integrity check: {}", e);
                    Ok(false)
                }
            },
            Err(e) => {
                error!("Failed to open table during integrity check: {}", e);
                Ok(false)
            }
        }
    }
}

/// Quote a value as a SQL string literal for LanceDB filters
fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| IndexError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| IndexError::Database(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| IndexError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| IndexError::Database(format!("Invalid {} column type", name)))
}

fn optional_string(array: &StringArray, row: usize) -> Option<String> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row).to_string())
    }
}
