use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DEFAULT_TARGET_PERCENTAGE: f64 = 75.0;
pub const DEFAULT_SESSION_HOURS: f64 = 1.0;
pub const MAX_SESSION_HOURS: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Cancelled,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PRESENT" => Some(AttendanceStatus::Present),
            "ABSENT" => Some(AttendanceStatus::Absent),
            "CANCELLED" => Some(AttendanceStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the session counts towards conducted hours.
    pub fn is_conducted(&self) -> bool {
        !matches!(self, AttendanceStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub code: Option<String>,
    pub target_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionType {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub name: String,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceLog {
    pub id: Uuid,
    pub session_type_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportMode {
    Daily,
    Summary,
    Unknown,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImportMode::Daily => "DAILY",
            ImportMode::Summary => "SUMMARY",
            ImportMode::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// One dated attendance event produced from a CSV row, ready for the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub row: usize,
    pub subject: String,
    pub subject_code: Option<String>,
    pub session_type: String,
    pub duration_hours: f64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub success_count: usize,
    pub failed_count: usize,
    pub warnings: Vec<String>,
    pub mode: ImportMode,
    pub subjects_touched: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum SkipAdvice {
    /// Hours that can still be skipped while staying at or above target.
    Safe { hours: i64 },
    /// Hours that must be attended to reach target; `None` when unreachable.
    Risk { hours: Option<i64> },
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectRow {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub type_label: String,
    pub attended_hours: f64,
    pub conducted_hours: f64,
    pub percentage: f64,
    pub target_percentage: f64,
    pub advice: SkipAdvice,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalRow {
    pub attended_hours: f64,
    pub conducted_hours: f64,
    pub percentage: f64,
    pub advice: SkipAdvice,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub global: GlobalRow,
    pub subjects: Vec<SubjectRow>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ForecastAction {
    Attend,
    #[default]
    Skip,
}

impl ForecastAction {
    /// Anything other than "attend" (any case) is treated as a skip.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("attend") {
            ForecastAction::Attend
        } else {
            ForecastAction::Skip
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationStep {
    /// Missing or malformed ids become nil, which never names a stored subject.
    #[serde(default, deserialize_with = "lenient_subject_id")]
    pub subject_id: Uuid,
    #[serde(default, deserialize_with = "lenient_action")]
    pub action: ForecastAction,
    #[serde(default = "default_weight", deserialize_with = "lenient_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    DEFAULT_SESSION_HOURS
}

fn lenient_subject_id<'de, D>(deserializer: D) -> Result<Uuid, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(raw
        .as_str()
        .and_then(|id| Uuid::parse_str(id.trim()).ok())
        .unwrap_or_else(Uuid::nil))
}

fn lenient_action<'de, D>(deserializer: D) -> Result<ForecastAction, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(ForecastAction::parse).unwrap_or_default())
}

fn lenient_weight<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.unwrap_or(DEFAULT_SESSION_HOURS))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub subject_id: Uuid,
    pub new_subject_percentage: f64,
    pub new_global_percentage: f64,
}
