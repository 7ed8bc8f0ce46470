use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::d0010::ReadingType;

// Database entity models

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowFileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl FlowFileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowFileStatus::Pending => "pending",
            FlowFileStatus::Processing => "processing",
            FlowFileStatus::Completed => "completed",
            FlowFileStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FlowFileStatus::Pending),
            "processing" => Some(FlowFileStatus::Processing),
            "completed" => Some(FlowFileStatus::Completed),
            "failed" => Some(FlowFileStatus::Failed),
            _ => None,
        }
    }
}

/// One imported flow file, keyed by content hash for duplicate detection.
#[derive(Debug, Clone, Serialize)]
pub struct FlowFile {
    pub id: i64,
    pub filename: String,
    pub file_hash: String,
    pub imported_at: NaiveDateTime,
    pub row_count: i64,
    pub status: FlowFileStatus,
    pub error_message: Option<String>,
}

impl FromRow<'_, SqliteRow> for FlowFile {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(FlowFile {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            file_hash: row.try_get("file_hash")?,
            imported_at: row.try_get("imported_at")?,
            row_count: row.try_get("row_count")?,
            status: FlowFileStatus::parse(&status)
                .ok_or_else(|| decode_error("status", &status))?,
            error_message: row.try_get("error_message")?,
        })
    }
}

/// A meter point identified by MPAN.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MeterPoint {
    pub id: i64,
    pub mpan: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A physical meter device, attached to one meter point.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Meter {
    pub id: i64,
    pub serial_number: String,
    pub meter_point_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A single meter reading taken from a flow file.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub id: i64,
    pub meter_id: i64,
    pub flow_file_id: i64,
    pub reading_date: NaiveDate,
    pub reading_time: Option<NaiveTime>,
    pub register_id: String,
    pub reading_value: Decimal,
    pub reading_type: ReadingType,
    pub created_at: NaiveDateTime,
}

impl FromRow<'_, SqliteRow> for Reading {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Reading {
            id: row.try_get("id")?,
            meter_id: row.try_get("meter_id")?,
            flow_file_id: row.try_get("flow_file_id")?,
            reading_date: row.try_get("reading_date")?,
            reading_time: decode_reading_time(row)?,
            register_id: row.try_get("register_id")?,
            reading_value: decode_reading_value(row)?,
            reading_type: decode_reading_type(row)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Joined view returned by the MPAN/serial search surface, carrying
/// everything a browsing consumer displays for one reading.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingDetail {
    pub mpan: String,
    pub serial_number: String,
    pub reading_date: NaiveDate,
    pub reading_time: Option<NaiveTime>,
    pub register_id: String,
    pub reading_value: Decimal,
    pub reading_type: ReadingType,
    /// Source flow file, kept for traceability.
    pub filename: String,
}

impl FromRow<'_, SqliteRow> for ReadingDetail {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(ReadingDetail {
            mpan: row.try_get("mpan")?,
            serial_number: row.try_get("serial_number")?,
            reading_date: row.try_get("reading_date")?,
            reading_time: decode_reading_time(row)?,
            register_id: row.try_get("register_id")?,
            reading_value: decode_reading_value(row)?,
            reading_type: decode_reading_type(row)?,
            filename: row.try_get("filename")?,
        })
    }
}

/// Encode an optional reading time for storage. The empty string stands
/// in for "no time" so the readings uniqueness constraint still bites
/// (SQLite treats NULLs as distinct).
pub fn encode_reading_time(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

fn decode_reading_time(row: &SqliteRow) -> Result<Option<NaiveTime>, sqlx::Error> {
    let raw: String = row.try_get("reading_time")?;
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveTime::parse_from_str(&raw, "%H:%M:%S")
        .map(Some)
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: "reading_time".into(),
            source: Box::new(e),
        })
}

fn decode_reading_value(row: &SqliteRow) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get("reading_value")?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: "reading_value".into(),
        source: Box::new(e),
    })
}

fn decode_reading_type(row: &SqliteRow) -> Result<ReadingType, sqlx::Error> {
    let raw: String = row.try_get("reading_type")?;
    ReadingType::parse(&raw).ok_or_else(|| decode_error("reading_type", &raw))
}

fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unexpected value '{value}' in column {column}").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_file_status_round_trip() {
        for status in [
            FlowFileStatus::Pending,
            FlowFileStatus::Processing,
            FlowFileStatus::Completed,
            FlowFileStatus::Failed,
        ] {
            assert_eq!(FlowFileStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FlowFileStatus::parse("bogus"), None);
    }

    #[test]
    fn test_encode_reading_time() {
        assert_eq!(encode_reading_time(None), "");
        assert_eq!(
            encode_reading_time(NaiveTime::from_hms_opt(9, 30, 0)),
            "09:30:00"
        );
    }
}
