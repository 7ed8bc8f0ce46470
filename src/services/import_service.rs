use std::path::Path;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use crate::d0010::{D0010Parser, D0010ParseError, ParsedReading, SkipReason, SkippedLine};
use crate::db::{
    DbError, FlowFileRepository, FlowFileStatus, MeterPointRepository, MeterRepository,
    ReadingRepository, UpsertOutcome,
};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Parse(#[from] D0010ParseError),

    #[error("File {filename} already imported at {imported_at}; use --force to re-import")]
    AlreadyImported {
        filename: String,
        imported_at: NaiveDateTime,
    },

    #[error(transparent)]
    Db(#[from] DbError),
}

/// End-of-run summary for one flow file.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub filename: String,
    /// Non-blank lines processed.
    pub total_lines: usize,
    /// New readings written.
    pub imported: usize,
    /// Existing readings refreshed in place.
    pub updated: usize,
    /// Lines rejected, with the reason for each.
    pub skipped: Vec<SkippedLine>,
    pub dry_run: bool,
}

impl ImportReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Orchestrates one-shot batch imports of D0010 flow files.
///
/// Each valid line is written in its own transaction: meter point,
/// meter, and reading land together or not at all, so a failed line
/// never leaves orphan entities behind.
#[derive(Clone)]
pub struct ImportService {
    pool: SqlitePool,
    flow_files: FlowFileRepository,
    meter_points: MeterPointRepository,
    meters: MeterRepository,
    readings: ReadingRepository,
}

impl ImportService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            flow_files: FlowFileRepository::new(pool.clone()),
            meter_points: MeterPointRepository::new(pool.clone()),
            meters: MeterRepository::new(pool.clone()),
            readings: ReadingRepository::new(pool.clone()),
            pool,
        }
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn import_file(
        &self,
        path: &Path,
        dry_run: bool,
        force: bool,
    ) -> Result<ImportReport, ImportError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let parsed = D0010Parser::new(path).parse()?;

        if !force {
            if let Some(existing) = self.flow_files.find_by_hash(&parsed.file_hash).await? {
                if existing.status == FlowFileStatus::Completed {
                    return Err(ImportError::AlreadyImported {
                        filename,
                        imported_at: existing.imported_at,
                    });
                }
            }
        }

        let mut report = ImportReport {
            filename: filename.clone(),
            total_lines: parsed.total_lines,
            imported: 0,
            updated: 0,
            skipped: parsed.skipped,
            dry_run,
        };

        if dry_run {
            info!(
                "Dry run: would import {} readings from {}",
                parsed.readings.len(),
                filename
            );
            return Ok(report);
        }

        let flow_file = self
            .flow_files
            .begin_import(&parsed.file_hash, &filename, parsed.readings.len() as i64)
            .await?;

        for reading in &parsed.readings {
            match self.persist_reading(flow_file.id, reading).await {
                Ok(UpsertOutcome::Inserted) => report.imported += 1,
                Ok(UpsertOutcome::Updated) => report.updated += 1,
                Err(e) if e.is_unavailable() => {
                    // The database itself is gone; give up on the file.
                    self.flow_files
                        .mark_failed(flow_file.id, &e.to_string())
                        .await
                        .ok();
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("Line {}: failed to persist reading: {}", reading.line_number, e);
                    report.skipped.push(SkippedLine {
                        line_number: reading.line_number,
                        reason: SkipReason::Persistence(e.to_string()),
                    });
                }
            }
        }

        // Persistence skips land after the parse-time ones; put the
        // itemized report back into file order.
        report.skipped.sort_by_key(|s| s.line_number);

        self.flow_files.mark_completed(flow_file.id).await?;

        info!(
            "Imported {} readings from {} ({} updated, {} skipped)",
            report.imported,
            filename,
            report.updated,
            report.skipped_count()
        );
        Ok(report)
    }

    /// Write all three entities for one line atomically.
    async fn persist_reading(
        &self,
        flow_file_id: i64,
        reading: &ParsedReading,
    ) -> Result<UpsertOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        let meter_point = self
            .meter_points
            .find_or_create(&mut tx, &reading.mpan)
            .await?;
        let meter = self
            .meters
            .find_or_create(&mut tx, &reading.meter_serial, &meter_point)
            .await?;
        let outcome = self
            .readings
            .upsert(&mut tx, &meter, flow_file_id, reading)
            .await?;

        tx.commit().await?;
        Ok(outcome)
    }
}
