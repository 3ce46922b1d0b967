use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{
    AttendanceStatus, ImportMode, NormalizedRecord, DEFAULT_SESSION_HOURS, MAX_SESSION_HOURS,
};
use crate::schema::{self, Field, FieldMap};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y", "%d/%m/%Y"];
const DEFAULT_SESSION_TYPE: &str = "Lecture";
const SUMMARY_HISTORY_DAYS: i64 = 90;
/// Upper bound on the sessions one summary row may expand into.
pub const MAX_SUMMARY_SESSIONS: u32 = 5_000;
const CRT_HOURS: f64 = 2.0;
const LAB_HOURS: f64 = 3.0;

static NUMBER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d*\.?\d+").expect("number pattern is valid"));

/// Why a CSV row was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowRejection {
    #[error("Missing Subject")]
    MissingSubject,
    #[error("Missing Date")]
    MissingDate,
    #[error("Invalid date format '{0}'")]
    InvalidDate(String),
    #[error("Invalid count '{0}'")]
    InvalidCount(String),
    #[error("Too many sessions ({0}); a summary row may expand to at most {MAX_SUMMARY_SESSIONS}")]
    TooManySessions(u64),
    #[error("Unreadable row: {0}")]
    Unreadable(String),
}

/// Result of running every data row through the normalizer.
#[derive(Debug, Clone)]
pub struct ParsedBatch {
    pub mode: ImportMode,
    pub records: Vec<NormalizedRecord>,
    pub failed: usize,
    pub warnings: Vec<String>,
}

impl ParsedBatch {
    fn reject(&mut self, row: usize, reason: RowRejection) {
        debug!(row, %reason, "row rejected");
        self.failed += 1;
        self.warnings.push(format!("Row {row}: {reason}"));
    }
}

/// Parses sanitized CSV text into normalized records.
///
/// Row numbers in warnings count data rows from 1. `today` anchors the synthetic
/// dates generated for summary rows.
pub fn normalize(text: &str, today: NaiveDate) -> Result<ParsedBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let headers = match records.next() {
        Some(headers) => headers?,
        None => return Err(Error::EmptyInput),
    };
    let header_cells: Vec<&str> = headers.iter().collect();
    let schema = schema::resolve(header_cells.as_slice());

    let mut batch = ParsedBatch {
        mode: schema.mode,
        records: Vec::new(),
        failed: 0,
        warnings: Vec::new(),
    };

    if schema.mode == ImportMode::Unknown {
        batch.warnings.push(
            "Could not detect a daily (date + status) or summary (present count) layout; no rows imported"
                .to_string(),
        );
        return Ok(batch);
    }

    let history_start = today - Duration::days(SUMMARY_HISTORY_DAYS);

    for (index, result) in records.enumerate() {
        let row_number = index + 1;
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                batch.reject(row_number, RowRejection::Unreadable(err.to_string()));
                continue;
            }
        };

        match normalize_row(&schema.fields, schema.mode, &row, row_number, history_start) {
            Ok(mut normalized) => batch.records.append(&mut normalized),
            Err(reason) => batch.reject(row_number, reason),
        }
    }

    Ok(batch)
}

fn normalize_row(
    fields: &FieldMap,
    mode: ImportMode,
    row: &csv::StringRecord,
    row_number: usize,
    history_start: NaiveDate,
) -> std::result::Result<Vec<NormalizedRecord>, RowRejection> {
    let code = fields.value(row, Field::SubjectCode);
    let subject = fields
        .value(row, Field::Subject)
        .or(code)
        .ok_or(RowRejection::MissingSubject)?;
    let session_type = fields
        .value(row, Field::SessionType)
        .unwrap_or(DEFAULT_SESSION_TYPE);
    let duration_hours = infer_duration(fields.value(row, Field::Duration), session_type, subject);

    let template = NormalizedRecord {
        row: row_number,
        subject: subject.to_string(),
        subject_code: code.map(str::to_string),
        session_type: session_type.to_string(),
        duration_hours,
        date: history_start,
        status: AttendanceStatus::Absent,
    };

    match mode {
        ImportMode::Daily => {
            let raw_date = fields
                .value(row, Field::Date)
                .ok_or(RowRejection::MissingDate)?;
            let date =
                parse_date(raw_date).ok_or_else(|| RowRejection::InvalidDate(raw_date.to_string()))?;

            Ok(vec![NormalizedRecord {
                date,
                status: normalize_status(fields.value(row, Field::Status)),
                ..template
            }])
        }
        ImportMode::Summary => {
            let present = parse_count(fields.value(row, Field::PresentCount))?;
            let absent = parse_count(fields.value(row, Field::AbsentCount))?;
            let sessions = u64::from(present) + u64::from(absent);
            if sessions > u64::from(MAX_SUMMARY_SESSIONS) {
                return Err(RowRejection::TooManySessions(sessions));
            }
            Ok(expand_summary(&template, present, absent))
        }
        ImportMode::Unknown => Ok(Vec::new()),
    }
}

/// Synthesizes one record per counted session: present first, absent continuing after.
fn expand_summary(template: &NormalizedRecord, present: u32, absent: u32) -> Vec<NormalizedRecord> {
    let start = template.date;
    let statuses = std::iter::repeat(AttendanceStatus::Present)
        .take(present as usize)
        .chain(std::iter::repeat(AttendanceStatus::Absent).take(absent as usize));

    statuses
        .enumerate()
        .map(|(offset, status)| NormalizedRecord {
            date: start + Duration::days(offset as i64),
            status,
            ..template.clone()
        })
        .collect()
}

fn parse_count(raw: Option<&str>) -> std::result::Result<u32, RowRejection> {
    match raw {
        None => Ok(0),
        Some(value) => value
            .parse::<u32>()
            .map_err(|_| RowRejection::InvalidCount(value.to_string())),
    }
}

/// Tries each accepted layout in order; the first that parses wins.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Maps the first letter of a status cell; anything unrecognised counts as absent.
pub fn normalize_status(raw: Option<&str>) -> AttendanceStatus {
    let first = raw
        .and_then(|value| value.trim().chars().next())
        .map(|c| c.to_ascii_uppercase());

    match first {
        Some('P') => AttendanceStatus::Present,
        Some('C') => AttendanceStatus::Cancelled,
        _ => AttendanceStatus::Absent,
    }
}

/// First number found in a duration cell, if it lies in (0, 8].
pub fn explicit_duration(raw: &str) -> Option<f64> {
    NUMBER_TOKEN
        .find(raw)
        .and_then(|token| token.as_str().parse::<f64>().ok())
        .filter(|hours| *hours > 0.0 && *hours <= MAX_SESSION_HOURS)
}

/// Explicit duration when usable, otherwise guessed from the session and subject names.
pub fn infer_duration(explicit: Option<&str>, session_type: &str, subject: &str) -> f64 {
    if let Some(hours) = explicit.and_then(explicit_duration) {
        return hours;
    }

    let names = format!("{} {}", session_type, subject).to_lowercase();
    if names.contains("crt") {
        CRT_HOURS
    } else if names.contains("lab") {
        LAB_HOURS
    } else {
        DEFAULT_SESSION_HOURS
    }
}
