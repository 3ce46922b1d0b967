use chrono::NaiveDate;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    AttendanceLog, AttendanceStatus, SessionType, Subject, DEFAULT_TARGET_PERCENTAGE,
    MAX_SESSION_HOURS,
};

/// Persistence operations the import, dashboard and forecast paths rely on.
///
/// Get-or-create and upsert must be atomic with respect to their unique keys:
/// subjects on `(owner, lowercase name)`, session types on
/// `(subject, lowercase name)`, logs on `(session type, date)`.
pub trait LedgerStore {
    async fn get_or_create_subject(
        &self,
        owner: &str,
        name: &str,
        code: Option<&str>,
    ) -> Result<Subject>;

    /// The duration only applies when the session type is created.
    async fn get_or_create_session_type(
        &self,
        subject: &Subject,
        name: &str,
        default_duration: f64,
    ) -> Result<SessionType>;

    async fn upsert_attendance_log(
        &self,
        session_type: &SessionType,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<()>;

    async fn list_subjects(&self, owner: &str) -> Result<Vec<Subject>>;

    async fn list_session_types(&self, subject: &Subject) -> Result<Vec<SessionType>>;

    async fn list_logs(&self, session_type: &SessionType) -> Result<Vec<AttendanceLog>>;

    async fn set_target_percentage(&self, subject: &Subject, target: f64) -> Result<Subject>;

    /// Removes a subject with its session types and logs.
    async fn delete_subject(&self, owner: &str, subject_id: Uuid) -> Result<()>;
}

pub fn validate_duration(hours: f64) -> Result<()> {
    if hours > 0.0 && hours <= MAX_SESSION_HOURS {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "session duration {hours}h is outside (0, {MAX_SESSION_HOURS}]"
        )))
    }
}

pub fn validate_target(target: f64) -> Result<()> {
    if target > 0.0 && target <= 100.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "target percentage {target} is outside (0, 100]"
        )))
    }
}

#[derive(Debug, Default)]
struct MemoryTables {
    subjects: Vec<Subject>,
    session_types: Vec<SessionType>,
    logs: Vec<AttendanceLog>,
}

/// In-process ledger used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    tables: Mutex<MemoryTables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn log_count(&self) -> usize {
        self.tables.lock().await.logs.len()
    }
}

impl LedgerStore for MemoryLedger {
    async fn get_or_create_subject(
        &self,
        owner: &str,
        name: &str,
        code: Option<&str>,
    ) -> Result<Subject> {
        let mut tables = self.tables.lock().await;
        let key = name.to_lowercase();

        if let Some(existing) = tables
            .subjects
            .iter_mut()
            .find(|s| s.owner == owner && s.name.to_lowercase() == key)
        {
            if existing.code.is_none() {
                existing.code = code.map(str::to_string);
            }
            return Ok(existing.clone());
        }

        let subject = Subject {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            name: name.to_string(),
            code: code.map(str::to_string),
            target_percentage: DEFAULT_TARGET_PERCENTAGE,
        };
        tables.subjects.push(subject.clone());
        Ok(subject)
    }

    async fn get_or_create_session_type(
        &self,
        subject: &Subject,
        name: &str,
        default_duration: f64,
    ) -> Result<SessionType> {
        let mut tables = self.tables.lock().await;
        let key = name.to_lowercase();

        if let Some(existing) = tables
            .session_types
            .iter()
            .find(|t| t.subject_id == subject.id && t.name.to_lowercase() == key)
        {
            return Ok(existing.clone());
        }

        if !tables.subjects.iter().any(|s| s.id == subject.id) {
            return Err(Error::NotFound(format!("subject {}", subject.id)));
        }
        validate_duration(default_duration)?;

        let session_type = SessionType {
            id: Uuid::new_v4(),
            subject_id: subject.id,
            name: name.to_string(),
            duration_hours: default_duration,
        };
        tables.session_types.push(session_type.clone());
        Ok(session_type)
    }

    async fn upsert_attendance_log(
        &self,
        session_type: &SessionType,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables
            .logs
            .iter_mut()
            .find(|log| log.session_type_id == session_type.id && log.date == date)
        {
            existing.status = status;
            return Ok(());
        }

        if !tables.session_types.iter().any(|t| t.id == session_type.id) {
            return Err(Error::NotFound(format!("session type {}", session_type.id)));
        }

        tables.logs.push(AttendanceLog {
            id: Uuid::new_v4(),
            session_type_id: session_type.id,
            date,
            status,
            remark: None,
        });
        Ok(())
    }

    async fn list_subjects(&self, owner: &str) -> Result<Vec<Subject>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subjects
            .iter()
            .filter(|s| s.owner == owner)
            .cloned()
            .collect())
    }

    async fn list_session_types(&self, subject: &Subject) -> Result<Vec<SessionType>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .session_types
            .iter()
            .filter(|t| t.subject_id == subject.id)
            .cloned()
            .collect())
    }

    async fn list_logs(&self, session_type: &SessionType) -> Result<Vec<AttendanceLog>> {
        let tables = self.tables.lock().await;
        let mut logs: Vec<AttendanceLog> = tables
            .logs
            .iter()
            .filter(|log| log.session_type_id == session_type.id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(logs)
    }

    async fn set_target_percentage(&self, subject: &Subject, target: f64) -> Result<Subject> {
        validate_target(target)?;
        let mut tables = self.tables.lock().await;
        let stored = tables
            .subjects
            .iter_mut()
            .find(|s| s.id == subject.id)
            .ok_or_else(|| Error::NotFound(format!("subject {}", subject.id)))?;
        stored.target_percentage = target;
        Ok(stored.clone())
    }

    async fn delete_subject(&self, owner: &str, subject_id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let before = tables.subjects.len();
        tables
            .subjects
            .retain(|s| !(s.id == subject_id && s.owner == owner));
        if tables.subjects.len() == before {
            return Err(Error::NotFound(format!("subject {subject_id}")));
        }

        let orphaned: Vec<Uuid> = tables
            .session_types
            .iter()
            .filter(|t| t.subject_id == subject_id)
            .map(|t| t.id)
            .collect();
        tables.session_types.retain(|t| t.subject_id != subject_id);
        tables
            .logs
            .retain(|log| !orphaned.contains(&log.session_type_id));
        Ok(())
    }
}
