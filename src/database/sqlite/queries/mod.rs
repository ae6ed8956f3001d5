
use super::models::*;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::embeddings::chunking::FileType;

pub struct FileQueries;

impl FileQueries {
    #[inline]
    pub async fn get(pool: &SqlitePool, file_path: &str) -> Result<Option<IndexedFile>> {
        let result = sqlx::query_as::<_, IndexedFile>(
            r#"
            SELECT file_path,
                   file_hash,
                   file_type,
                   language,
                   chunk_count,
                   created_at,
                   updated_at
            FROM indexed_files WHERE file_path = ?
            "#,
        )
        .bind(file_path)
        .fetch_optional(pool)
        .await
        .context("Failed to get indexed file")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<IndexedFile>> {
        let files = sqlx::query_as::<_, IndexedFile>(
            r#"
            SELECT file_path,
                   file_hash,
                   file_type,
                   language,
                   chunk_count,
                   created_at,
                   updated_at
            FROM indexed_files ORDER BY file_path
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list indexed files")?;

        Ok(files)
    }

    /// Insert or replace the manifest row for a file, keeping its first-indexed time.
    /// Returns that first-indexed time.
    #[inline]
    pub async fn upsert(
        conn: &mut SqliteConnection,
        file: &NewIndexedFile,
        now: NaiveDateTime,
    ) -> Result<NaiveDateTime> {
        let created_at = sqlx::query_scalar::<_, NaiveDateTime>(
            r#"
            INSERT INTO indexed_files
                (file_path, file_hash, file_type, language, chunk_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_path) DO UPDATE SET
                file_hash = excluded.file_hash,
                file_type = excluded.file_type,
                language = excluded.language,
                chunk_count = excluded.chunk_count,
                updated_at = excluded.updated_at
            RETURNING created_at
            "#,
        )
        .bind(&file.file_path)
        .bind(&file.file_hash)
        .bind(file.file_type)
        .bind(&file.language)
        .bind(file.chunk_count)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("Failed to upsert indexed file {}", file.file_path))?;

        Ok(created_at)
    }

    /// Remove a file and, by cascade, its chunk ledger
    #[inline]
    pub async fn delete(conn: &mut SqliteConnection, file_path: &str) -> Result<bool> {
        let rows_affected = sqlx::query("DELETE FROM indexed_files WHERE file_path = ?")
            .bind(file_path)
            .execute(&mut *conn)
            .await
            .context("Failed to delete indexed file")?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    #[inline]
    pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64> {
        let rows_affected = sqlx::query("DELETE FROM indexed_files")
            .execute(&mut *conn)
            .await
            .context("Failed to clear indexed files")?
            .rows_affected();

        debug!("Removed {} indexed files", rows_affected);
        Ok(rows_affected)
    }

    #[inline]
    pub async fn get_statistics(pool: &SqlitePool) -> Result<IndexStatistics> {
        let stats = sqlx::query_as::<_, IndexStatistics>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM indexed_files) AS total_files,
                (SELECT COUNT(*) FROM indexed_chunks) AS total_chunks,
                (SELECT COALESCE(SUM(token_count), 0) FROM indexed_chunks) AS total_tokens,
                (SELECT MAX(updated_at) FROM indexed_files) AS last_updated
            "#,
        )
        .fetch_one(pool)
        .await
        .context("Failed to get index statistics")?;

        Ok(stats)
    }

    #[inline]
    pub async fn count_by_file_type(pool: &SqlitePool) -> Result<Vec<(FileType, i64)>> {
        let counts = sqlx::query_as::<_, (FileType, i64)>(
            "SELECT file_type, COUNT(*) FROM indexed_files GROUP BY file_type ORDER BY file_type",
        )
        .fetch_all(pool)
        .await
        .context("Failed to count files by type")?;

        Ok(counts)
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    /// Delete every ledger row for a file and insert the given rows in their place
    #[inline]
    pub async fn replace_for_file(
        conn: &mut SqliteConnection,
        file_path: &str,
        chunks: &[NewChunkRecord],
        now: NaiveDateTime,
    ) -> Result<usize> {
        let removed = sqlx::query("DELETE FROM indexed_chunks WHERE file_path = ?")
            .bind(file_path)
            .execute(&mut *conn)
            .await
            .context("Failed to delete previous chunk records")?
            .rows_affected();

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO indexed_chunks
                    (file_path, chunk_index, chunk_hash, section, token_count, content_length,
                     vector_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file_path)
            .bind(chunk.chunk_index)
            .bind(&chunk.chunk_hash)
            .bind(&chunk.section)
            .bind(chunk.token_count)
            .bind(chunk.content_length)
            .bind(&chunk.vector_id)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await
            .with_context(|| {
                format!(
                    "Failed to insert chunk record {} for {}",
                    chunk.chunk_index, file_path
                )
            })?;
        }

        debug!(
            "Replaced {} chunk records with {} for {}",
            removed,
            chunks.len(),
            file_path
        );
        Ok(chunks.len())
    }

    #[inline]
    pub async fn list_by_file(pool: &SqlitePool, file_path: &str) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            r#"
            SELECT id,
                   file_path,
                   chunk_index,
                   chunk_hash,
                   section,
                   token_count,
                   content_length,
                   vector_id,
                   created_at,
                   updated_at
            FROM indexed_chunks WHERE file_path = ? ORDER BY chunk_index
            "#,
        )
        .bind(file_path)
        .fetch_all(pool)
        .await
        .context("Failed to list chunk records")?;

        Ok(chunks)
    }

    /// Ledger chunk count for every indexed file, including files with no chunks
    #[inline]
    pub async fn count_by_file(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT f.file_path, COUNT(c.id)
            FROM indexed_files f
            LEFT JOIN indexed_chunks c ON c.file_path = f.file_path
            GROUP BY f.file_path
            ORDER BY f.file_path
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to count chunk records per file")?;

        Ok(counts)
    }
}
