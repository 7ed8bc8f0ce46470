use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument};

use crate::db::{DbError, MeterPoint};

#[derive(Clone)]
pub struct MeterPointRepository {
    pool: SqlitePool,
}

impl MeterPointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up a meter point by MPAN, creating it on first encounter.
    ///
    /// Takes an explicit connection so the importer can run it inside
    /// its per-line transaction.
    #[instrument(skip(self, conn))]
    pub async fn find_or_create(
        &self,
        conn: &mut SqliteConnection,
        mpan: &str,
    ) -> Result<MeterPoint, DbError> {
        if let Some(meter_point) = sqlx::query_as::<_, MeterPoint>(
            "SELECT id, mpan, created_at, updated_at FROM meter_points WHERE mpan = ?1",
        )
        .bind(mpan)
        .fetch_optional(&mut *conn)
        .await?
        {
            debug!("Found existing meter point for MPAN {}", mpan);
            return Ok(meter_point);
        }

        let meter_point = sqlx::query_as::<_, MeterPoint>(
            r#"
            INSERT INTO meter_points (mpan)
            VALUES (?1)
            RETURNING id, mpan, created_at, updated_at
            "#,
        )
        .bind(mpan)
        .fetch_one(&mut *conn)
        .await?;

        info!("Created meter point for MPAN {}", mpan);
        Ok(meter_point)
    }

    #[instrument(skip(self))]
    pub async fn find_by_mpan(&self, mpan: &str) -> Result<Option<MeterPoint>, DbError> {
        let meter_point = sqlx::query_as::<_, MeterPoint>(
            "SELECT id, mpan, created_at, updated_at FROM meter_points WHERE mpan = ?1",
        )
        .bind(mpan)
        .fetch_optional(&self.pool)
        .await?;

        Ok(meter_point)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meter_points")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
