use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument, warn};

use crate::db::{DbError, Meter, MeterPoint};

#[derive(Clone)]
pub struct MeterRepository {
    pool: SqlitePool,
}

impl MeterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up a meter by serial number, creating it on first encounter
    /// and linking it to the given meter point.
    ///
    /// Serial-to-MPAN associations are assumed stable, but flow files
    /// occasionally show a known meter under a new MPAN; the meter is
    /// relinked with a warning rather than rejected.
    #[instrument(skip(self, conn, meter_point), fields(mpan = %meter_point.mpan))]
    pub async fn find_or_create(
        &self,
        conn: &mut SqliteConnection,
        serial_number: &str,
        meter_point: &MeterPoint,
    ) -> Result<Meter, DbError> {
        if let Some(meter) = sqlx::query_as::<_, Meter>(
            r#"
            SELECT id, serial_number, meter_point_id, created_at, updated_at
            FROM meters WHERE serial_number = ?1
            "#,
        )
        .bind(serial_number)
        .fetch_optional(&mut *conn)
        .await?
        {
            if meter.meter_point_id == meter_point.id {
                debug!("Found existing meter {}", serial_number);
                return Ok(meter);
            }

            warn!(
                "Meter {} moved to MPAN {}, relinking",
                serial_number, meter_point.mpan
            );
            let meter = sqlx::query_as::<_, Meter>(
                r#"
                UPDATE meters
                SET meter_point_id = ?1, updated_at = CURRENT_TIMESTAMP
                WHERE id = ?2
                RETURNING id, serial_number, meter_point_id, created_at, updated_at
                "#,
            )
            .bind(meter_point.id)
            .bind(meter.id)
            .fetch_one(&mut *conn)
            .await?;
            return Ok(meter);
        }

        let meter = sqlx::query_as::<_, Meter>(
            r#"
            INSERT INTO meters (serial_number, meter_point_id)
            VALUES (?1, ?2)
            RETURNING id, serial_number, meter_point_id, created_at, updated_at
            "#,
        )
        .bind(serial_number)
        .bind(meter_point.id)
        .fetch_one(&mut *conn)
        .await?;

        info!(
            "Created meter {} on MPAN {}",
            serial_number, meter_point.mpan
        );
        Ok(meter)
    }

    #[instrument(skip(self))]
    pub async fn find_by_serial(&self, serial_number: &str) -> Result<Option<Meter>, DbError> {
        let meter = sqlx::query_as::<_, Meter>(
            r#"
            SELECT id, serial_number, meter_point_id, created_at, updated_at
            FROM meters WHERE serial_number = ?1
            "#,
        )
        .bind(serial_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(meter)
    }

    /// All meters attached to one meter point, ordered by serial.
    #[instrument(skip(self))]
    pub async fn find_by_meter_point(&self, meter_point_id: i64) -> Result<Vec<Meter>, DbError> {
        let meters = sqlx::query_as::<_, Meter>(
            r#"
            SELECT id, serial_number, meter_point_id, created_at, updated_at
            FROM meters WHERE meter_point_id = ?1
            ORDER BY serial_number
            "#,
        )
        .bind(meter_point_id)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} meters", meters.len());
        Ok(meters)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meters")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
