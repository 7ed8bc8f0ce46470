use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::db::{DbError, FlowFile, FlowFileStatus};

#[derive(Clone)]
pub struct FlowFileRepository {
    pool: SqlitePool,
}

impl FlowFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Duplicate-import check: files are keyed by content hash, not name.
    #[instrument(skip(self, file_hash))]
    pub async fn find_by_hash(&self, file_hash: &str) -> Result<Option<FlowFile>, DbError> {
        let flow_file = sqlx::query_as::<_, FlowFile>(
            r#"
            SELECT id, filename, file_hash, imported_at, row_count, status, error_message
            FROM flow_files WHERE file_hash = ?1
            "#,
        )
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(flow_file)
    }

    /// Register a file as being imported. Re-importing a known hash
    /// resets the existing row to `processing` instead of duplicating it.
    #[instrument(skip(self, file_hash))]
    pub async fn begin_import(
        &self,
        file_hash: &str,
        filename: &str,
        row_count: i64,
    ) -> Result<FlowFile, DbError> {
        let flow_file = sqlx::query_as::<_, FlowFile>(
            r#"
            INSERT INTO flow_files (filename, file_hash, row_count, status, imported_at)
            VALUES (?1, ?2, ?3, 'processing', CURRENT_TIMESTAMP)
            ON CONFLICT (file_hash) DO UPDATE SET
                filename = excluded.filename,
                row_count = excluded.row_count,
                status = 'processing',
                error_message = NULL,
                imported_at = CURRENT_TIMESTAMP
            RETURNING id, filename, file_hash, imported_at, row_count, status, error_message
            "#,
        )
        .bind(filename)
        .bind(file_hash)
        .bind(row_count)
        .fetch_one(&self.pool)
        .await?;

        debug!("Flow file {} registered as processing", filename);
        Ok(flow_file)
    }

    #[instrument(skip(self))]
    pub async fn mark_completed(&self, id: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE flow_files SET status = ?1 WHERE id = ?2")
            .bind(FlowFileStatus::Completed.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self, error_message))]
    pub async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE flow_files SET status = ?1, error_message = ?2 WHERE id = ?3")
            .bind(FlowFileStatus::Failed.as_str())
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
