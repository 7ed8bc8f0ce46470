/// D0010 Flow File Parser
///
/// Parses pipe-delimited D0010 flow files into meter reading records.
/// Malformed lines are skipped individually with a recorded reason;
/// only file-level problems (missing, unreadable, empty) are fatal.
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

// D0010 field positions (0-indexed)
const FIELD_MPAN: usize = 1;
const FIELD_METER_SERIAL: usize = 2;
const FIELD_READING_DATE: usize = 3;
const FIELD_READING_TIME: usize = 4;
const FIELD_REGISTER_ID: usize = 5;
const FIELD_READING_VALUE: usize = 6;
const FIELD_READING_TYPE: usize = 7;

const MIN_FIELDS: usize = 8;
const MPAN_LEN: usize = 13;
const MAX_SERIAL_LEN: usize = 50;
const DEFAULT_REGISTER_ID: &str = "01";

#[derive(Error, Debug)]
pub enum D0010ParseError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is empty: {0}")]
    EmptyFile(PathBuf),
}

/// Why a single line was rejected. The run always continues past these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("insufficient fields (expected {expected}, got {got})")]
    FieldCount { expected: usize, got: usize },

    #[error("invalid MPAN '{0}' (expected 13 digits)")]
    InvalidMpan(String),

    #[error("empty meter serial number")]
    EmptySerial,

    #[error("meter serial too long (max 50 chars)")]
    SerialTooLong,

    #[error("invalid reading value '{0}'")]
    InvalidValue(String),

    #[error("negative reading value '{0}'")]
    NegativeValue(String),

    #[error("invalid reading date '{0}' (expected YYYYMMDD)")]
    InvalidDate(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line_number: usize,
    pub reason: SkipReason,
}

/// Reading classification carried in the last D0010 field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingType {
    #[default]
    Actual,
    Estimated,
    Customer,
}

impl ReadingType {
    /// Map a D0010 type flag to a reading type. Unknown flags fall back
    /// to actual, matching how suppliers treat unflagged reads.
    pub fn from_flag(flag: &str) -> Self {
        match flag.trim().to_ascii_uppercase().as_str() {
            "E" => ReadingType::Estimated,
            "C" => ReadingType::Customer,
            _ => ReadingType::Actual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::Actual => "actual",
            ReadingType::Estimated => "estimated",
            ReadingType::Customer => "customer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "actual" => Some(ReadingType::Actual),
            "estimated" => Some(ReadingType::Estimated),
            "customer" => Some(ReadingType::Customer),
            _ => None,
        }
    }
}

/// One validated reading record extracted from a flow-file line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReading {
    pub line_number: usize,
    pub mpan: String,
    pub meter_serial: String,
    pub reading_date: NaiveDate,
    pub reading_time: Option<NaiveTime>,
    pub register_id: String,
    pub reading_value: Decimal,
    pub reading_type: ReadingType,
}

/// The full result of parsing one flow file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub readings: Vec<ParsedReading>,
    pub skipped: Vec<SkippedLine>,
    pub total_lines: usize,
    /// BLAKE3 hex digest of the raw file contents, used for
    /// duplicate-import detection.
    pub file_hash: String,
}

/// Parser for D0010 flow files
pub struct D0010Parser {
    path: PathBuf,
}

impl D0010Parser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse the whole file. Blank lines are ignored; each malformed
    /// line is recorded in `skipped` and parsing continues.
    pub fn parse(&self) -> Result<ParsedFile, D0010ParseError> {
        if !self.path.exists() {
            return Err(D0010ParseError::FileNotFound(self.path.clone()));
        }
        if !self.path.is_file() {
            return Err(D0010ParseError::NotAFile(self.path.clone()));
        }

        let bytes = fs::read(&self.path).map_err(|source| D0010ParseError::Read {
            path: self.path.clone(),
            source,
        })?;
        let file_hash = blake3::hash(&bytes).to_hex().to_string();
        let contents = decode_flow_file(bytes);

        if contents.trim().is_empty() {
            return Err(D0010ParseError::EmptyFile(self.path.clone()));
        }

        let mut readings = Vec::new();
        let mut skipped = Vec::new();
        let mut total_lines = 0;

        for (idx, line) in contents.lines().enumerate() {
            let line_number = idx + 1;
            if line.trim().is_empty() {
                debug!("Blank line {}, skipping", line_number);
                continue;
            }
            total_lines += 1;

            match Self::parse_line(line, line_number) {
                Ok(reading) => readings.push(reading),
                Err(reason) => {
                    warn!("Line {}: {}", line_number, reason);
                    skipped.push(SkippedLine {
                        line_number,
                        reason,
                    });
                }
            }
        }

        info!(
            "Parsed {} valid readings from {} ({} lines skipped)",
            readings.len(),
            self.path.display(),
            skipped.len()
        );

        Ok(ParsedFile {
            readings,
            skipped,
            total_lines,
            file_hash,
        })
    }

    /// Parse a single pipe-delimited line.
    fn parse_line(line: &str, line_number: usize) -> Result<ParsedReading, SkipReason> {
        let fields: Vec<&str> = line.split('|').collect();

        if fields.len() < MIN_FIELDS {
            return Err(SkipReason::FieldCount {
                expected: MIN_FIELDS,
                got: fields.len(),
            });
        }

        let mpan = Self::validate_mpan(fields[FIELD_MPAN])?;
        let meter_serial = Self::validate_serial(fields[FIELD_METER_SERIAL])?;
        let reading_date = Self::parse_date(fields[FIELD_READING_DATE])?;
        let reading_time = Self::parse_time(fields[FIELD_READING_TIME], line_number);

        let register_id = match fields[FIELD_REGISTER_ID].trim() {
            "" => DEFAULT_REGISTER_ID.to_string(),
            reg => reg.to_string(),
        };

        let reading_value = Self::parse_value(fields[FIELD_READING_VALUE])?;
        let reading_type = ReadingType::from_flag(fields[FIELD_READING_TYPE]);

        Ok(ParsedReading {
            line_number,
            mpan,
            meter_serial,
            reading_date,
            reading_time,
            register_id,
            reading_value,
            reading_type,
        })
    }

    /// MPANs are exactly 13 ASCII digits.
    fn validate_mpan(raw: &str) -> Result<String, SkipReason> {
        let mpan = raw.trim();
        if mpan.len() != MPAN_LEN || !mpan.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SkipReason::InvalidMpan(mpan.to_string()));
        }
        Ok(mpan.to_string())
    }

    fn validate_serial(raw: &str) -> Result<String, SkipReason> {
        let serial = raw.trim();
        if serial.is_empty() {
            return Err(SkipReason::EmptySerial);
        }
        if serial.len() > MAX_SERIAL_LEN {
            return Err(SkipReason::SerialTooLong);
        }
        Ok(serial.to_string())
    }

    /// D0010 dates use YYYYMMDD.
    fn parse_date(raw: &str) -> Result<NaiveDate, SkipReason> {
        let date = raw.trim();
        NaiveDate::parse_from_str(date, "%Y%m%d")
            .map_err(|_| SkipReason::InvalidDate(date.to_string()))
    }

    /// D0010 times use HHMM. The time is optional; an unparseable time
    /// degrades to none rather than rejecting the whole line.
    fn parse_time(raw: &str, line_number: usize) -> Option<NaiveTime> {
        let time = raw.trim();
        if time.is_empty() {
            return None;
        }
        match NaiveTime::parse_from_str(time, "%H%M") {
            Ok(t) => Some(t),
            Err(_) => {
                warn!(
                    "Line {}: invalid reading time '{}' (expected HHMM), ignoring",
                    line_number, time
                );
                None
            }
        }
    }

    fn parse_value(raw: &str) -> Result<Decimal, SkipReason> {
        let value = raw.trim();
        let parsed =
            Decimal::from_str(value).map_err(|_| SkipReason::InvalidValue(value.to_string()))?;
        if parsed.is_sign_negative() && !parsed.is_zero() {
            return Err(SkipReason::NegativeValue(value.to_string()));
        }
        Ok(parsed)
    }
}

/// Flow files are UTF-8 in practice, but legacy participants still send
/// Latin-1. Fall back to a byte-wise Latin-1 decode on invalid UTF-8.
fn decode_flow_file(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_line() -> &'static str {
        "026|1234567890123|S85551234|20240315|0930|01|12345.6|A"
    }

    #[test]
    fn test_parse_valid_line() {
        let reading = D0010Parser::parse_line(valid_line(), 1).unwrap();
        assert_eq!(reading.mpan, "1234567890123");
        assert_eq!(reading.meter_serial, "S85551234");
        assert_eq!(
            reading.reading_date,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
        assert_eq!(
            reading.reading_time,
            NaiveTime::from_hms_opt(9, 30, 0)
        );
        assert_eq!(reading.register_id, "01");
        assert_eq!(reading.reading_value, Decimal::from_str("12345.6").unwrap());
        assert_eq!(reading.reading_type, ReadingType::Actual);
    }

    #[test]
    fn test_too_few_fields() {
        let err = D0010Parser::parse_line("026|1234567890123|S85551234|20240315", 1).unwrap_err();
        assert_eq!(
            err,
            SkipReason::FieldCount {
                expected: 8,
                got: 4
            }
        );
    }

    #[test]
    fn test_invalid_mpan_rejected() {
        for mpan in ["12345", "123456789012A", "", "12345678901234"] {
            let line = format!("026|{mpan}|S85551234|20240315|0930|01|100.0|A");
            let err = D0010Parser::parse_line(&line, 1).unwrap_err();
            assert!(matches!(err, SkipReason::InvalidMpan(_)), "mpan: '{mpan}'");
        }
    }

    #[test]
    fn test_empty_serial_rejected() {
        let line = "026|1234567890123|   |20240315|0930|01|100.0|A";
        assert_eq!(
            D0010Parser::parse_line(line, 1).unwrap_err(),
            SkipReason::EmptySerial
        );
    }

    #[test]
    fn test_overlong_serial_rejected() {
        let serial = "X".repeat(51);
        let line = format!("026|1234567890123|{serial}|20240315|0930|01|100.0|A");
        assert_eq!(
            D0010Parser::parse_line(&line, 1).unwrap_err(),
            SkipReason::SerialTooLong
        );
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let line = "026|1234567890123|S85551234|20240315|0930|01|abc|A";
        assert!(matches!(
            D0010Parser::parse_line(line, 1).unwrap_err(),
            SkipReason::InvalidValue(_)
        ));
    }

    #[test]
    fn test_negative_value_rejected() {
        let line = "026|1234567890123|S85551234|20240315|0930|01|-5.0|A";
        assert!(matches!(
            D0010Parser::parse_line(line, 1).unwrap_err(),
            SkipReason::NegativeValue(_)
        ));
    }

    #[test]
    fn test_bad_date_rejected() {
        for date in ["2024-03-15", "20241315", "notadate", ""] {
            let line = format!("026|1234567890123|S85551234|{date}|0930|01|100.0|A");
            let err = D0010Parser::parse_line(&line, 1).unwrap_err();
            assert!(matches!(err, SkipReason::InvalidDate(_)), "date: '{date}'");
        }
    }

    #[test]
    fn test_missing_time_is_none() {
        let line = "026|1234567890123|S85551234|20240315||01|100.0|A";
        let reading = D0010Parser::parse_line(line, 1).unwrap();
        assert_eq!(reading.reading_time, None);
    }

    #[test]
    fn test_bad_time_degrades_to_none() {
        let line = "026|1234567890123|S85551234|20240315|9999|01|100.0|A";
        let reading = D0010Parser::parse_line(line, 1).unwrap();
        assert_eq!(reading.reading_time, None);
    }

    #[test]
    fn test_empty_register_defaults() {
        let line = "026|1234567890123|S85551234|20240315|0930||100.0|A";
        let reading = D0010Parser::parse_line(line, 1).unwrap();
        assert_eq!(reading.register_id, "01");
    }

    #[test]
    fn test_reading_type_flags() {
        assert_eq!(ReadingType::from_flag("A"), ReadingType::Actual);
        assert_eq!(ReadingType::from_flag("e"), ReadingType::Estimated);
        assert_eq!(ReadingType::from_flag("C"), ReadingType::Customer);
        // Unknown flags default to actual
        assert_eq!(ReadingType::from_flag("Z"), ReadingType::Actual);
        assert_eq!(ReadingType::from_flag(""), ReadingType::Actual);
    }

    #[test]
    fn test_reading_type_round_trip() {
        for rt in [
            ReadingType::Actual,
            ReadingType::Estimated,
            ReadingType::Customer,
        ] {
            assert_eq!(ReadingType::parse(rt.as_str()), Some(rt));
        }
        assert_eq!(ReadingType::parse("bogus"), None);
    }

    #[test]
    fn test_latin1_fallback() {
        // 0xE9 is 'é' in Latin-1 and invalid on its own in UTF-8
        let decoded = decode_flow_file(vec![0x61, 0xE9, 0x62]);
        assert_eq!(decoded, "a\u{e9}b");
    }
}
