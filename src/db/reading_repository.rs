use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, instrument};

use crate::d0010::ParsedReading;
use crate::db::models::encode_reading_time;
use crate::db::{DbError, Meter, Reading, ReadingDetail};

/// Whether an upsert created a new reading or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Clone)]
pub struct ReadingRepository {
    pool: SqlitePool,
}

impl ReadingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert one reading for a meter. Re-imports are idempotent: an
    /// existing (meter, date, time, register) row has its value, type,
    /// and flow-file reference updated in place.
    ///
    /// Takes an explicit connection so the importer can run it inside
    /// its per-line transaction.
    #[instrument(skip(self, conn, meter, reading), fields(serial = %meter.serial_number, date = %reading.reading_date))]
    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        meter: &Meter,
        flow_file_id: i64,
        reading: &ParsedReading,
    ) -> Result<UpsertOutcome, DbError> {
        let reading_time = encode_reading_time(reading.reading_time);

        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM readings
            WHERE meter_id = ?1 AND reading_date = ?2
              AND reading_time = ?3 AND register_id = ?4
            "#,
        )
        .bind(meter.id)
        .bind(reading.reading_date)
        .bind(&reading_time)
        .bind(&reading.register_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(id) = existing {
            sqlx::query(
                r#"
                UPDATE readings
                SET reading_value = ?1, reading_type = ?2, flow_file_id = ?3
                WHERE id = ?4
                "#,
            )
            .bind(reading.reading_value.to_string())
            .bind(reading.reading_type.as_str())
            .bind(flow_file_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;

            debug!("Updated existing reading");
            return Ok(UpsertOutcome::Updated);
        }

        sqlx::query(
            r#"
            INSERT INTO readings
                (meter_id, flow_file_id, reading_date, reading_time,
                 register_id, reading_value, reading_type)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(meter.id)
        .bind(flow_file_id)
        .bind(reading.reading_date)
        .bind(&reading_time)
        .bind(&reading.register_id)
        .bind(reading.reading_value.to_string())
        .bind(reading.reading_type.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(UpsertOutcome::Inserted)
    }

    /// Search surface for the browsing consumer: all readings under one
    /// MPAN, newest first.
    #[instrument(skip(self))]
    pub async fn find_by_mpan(&self, mpan: &str) -> Result<Vec<ReadingDetail>, DbError> {
        let readings = sqlx::query_as::<_, ReadingDetail>(
            r#"
            SELECT mp.mpan, m.serial_number, r.reading_date, r.reading_time,
                   r.register_id, r.reading_value, r.reading_type, f.filename
            FROM readings r
            JOIN meters m ON m.id = r.meter_id
            JOIN meter_points mp ON mp.id = m.meter_point_id
            JOIN flow_files f ON f.id = r.flow_file_id
            WHERE mp.mpan = ?1
            ORDER BY r.reading_date DESC, r.reading_time DESC
            "#,
        )
        .bind(mpan)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} readings for MPAN", readings.len());
        Ok(readings)
    }

    /// Search surface for the browsing consumer: all readings taken by
    /// one meter, newest first.
    #[instrument(skip(self))]
    pub async fn find_by_serial(&self, serial_number: &str) -> Result<Vec<ReadingDetail>, DbError> {
        let readings = sqlx::query_as::<_, ReadingDetail>(
            r#"
            SELECT mp.mpan, m.serial_number, r.reading_date, r.reading_time,
                   r.register_id, r.reading_value, r.reading_type, f.filename
            FROM readings r
            JOIN meters m ON m.id = r.meter_id
            JOIN meter_points mp ON mp.id = m.meter_point_id
            JOIN flow_files f ON f.id = r.flow_file_id
            WHERE m.serial_number = ?1
            ORDER BY r.reading_date DESC, r.reading_time DESC
            "#,
        )
        .bind(serial_number)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} readings for serial", readings.len());
        Ok(readings)
    }

    #[instrument(skip(self))]
    pub async fn find_by_meter(&self, meter_id: i64) -> Result<Vec<Reading>, DbError> {
        let readings = sqlx::query_as::<_, Reading>(
            r#"
            SELECT id, meter_id, flow_file_id, reading_date, reading_time,
                   register_id, reading_value, reading_type, created_at
            FROM readings
            WHERE meter_id = ?1
            ORDER BY reading_date DESC, reading_time DESC
            "#,
        )
        .bind(meter_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(readings)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
