use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{AttendanceLog, AttendanceStatus, SessionType, Subject};
use crate::store::{validate_duration, validate_target, LedgerStore};

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed ledger; uniqueness is enforced by the schema's unique indexes.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn subject_from_row(row: &PgRow) -> Result<Subject> {
    Ok(Subject {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        target_percentage: row.try_get("target_percentage")?,
    })
}

fn session_type_from_row(row: &PgRow) -> Result<SessionType> {
    Ok(SessionType {
        id: row.try_get("id")?,
        subject_id: row.try_get("subject_id")?,
        name: row.try_get("name")?,
        duration_hours: row.try_get("duration_hours")?,
    })
}

fn log_from_row(row: &PgRow) -> Result<AttendanceLog> {
    let status: String = row.try_get("status")?;
    Ok(AttendanceLog {
        id: row.try_get("id")?,
        session_type_id: row.try_get("session_type_id")?,
        date: row.try_get("log_date")?,
        status: AttendanceStatus::from_db(&status)
            .ok_or_else(|| Error::InvalidInput(format!("unknown attendance status '{status}'")))?,
        remark: row.try_get("remark")?,
    })
}

impl LedgerStore for PgLedger {
    async fn get_or_create_subject(
        &self,
        owner: &str,
        name: &str,
        code: Option<&str>,
    ) -> Result<Subject> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(
            r#"
            INSERT INTO attendance_ledger.subjects (id, owner, name, code)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (owner, lower(name)) DO UPDATE
            SET code = COALESCE(attendance_ledger.subjects.code, EXCLUDED.code)
            RETURNING id, owner, name, code, target_percentage
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(name)
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        subject_from_row(&row)
    }

    async fn get_or_create_session_type(
        &self,
        subject: &Subject,
        name: &str,
        default_duration: f64,
    ) -> Result<SessionType> {
        validate_duration(default_duration)?;

        let row = sqlx::query(
            r#"
            INSERT INTO attendance_ledger.session_types (id, subject_id, name, duration_hours)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (subject_id, lower(name)) DO UPDATE
            SET name = attendance_ledger.session_types.name
            RETURNING id, subject_id, name, duration_hours
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(subject.id)
        .bind(name)
        .bind(default_duration)
        .fetch_one(&self.pool)
        .await?;

        session_type_from_row(&row)
    }

    async fn upsert_attendance_log(
        &self,
        session_type: &SessionType,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_ledger.attendance_logs (id, session_type_id, log_date, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_type_id, log_date) DO UPDATE
            SET status = EXCLUDED.status, updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_type.id)
        .bind(date)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_subjects(&self, owner: &str) -> Result<Vec<Subject>> {
        let rows = sqlx::query(
            "SELECT id, owner, name, code, target_percentage \
             FROM attendance_ledger.subjects \
             WHERE owner = $1 \
             ORDER BY created_at, name",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subject_from_row).collect()
    }

    async fn list_session_types(&self, subject: &Subject) -> Result<Vec<SessionType>> {
        let rows = sqlx::query(
            "SELECT id, subject_id, name, duration_hours \
             FROM attendance_ledger.session_types \
             WHERE subject_id = $1 \
             ORDER BY created_at, name",
        )
        .bind(subject.id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_type_from_row).collect()
    }

    async fn list_logs(&self, session_type: &SessionType) -> Result<Vec<AttendanceLog>> {
        let rows = sqlx::query(
            "SELECT id, session_type_id, log_date, status, remark \
             FROM attendance_ledger.attendance_logs \
             WHERE session_type_id = $1 \
             ORDER BY log_date DESC",
        )
        .bind(session_type.id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }

    async fn set_target_percentage(&self, subject: &Subject, target: f64) -> Result<Subject> {
        validate_target(target)?;

        let row = sqlx::query(
            r#"
            UPDATE attendance_ledger.subjects
            SET target_percentage = $2
            WHERE id = $1
            RETURNING id, owner, name, code, target_percentage
            "#,
        )
        .bind(subject.id)
        .bind(target)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("subject {}", subject.id)))?;

        subject_from_row(&row)
    }

    async fn delete_subject(&self, owner: &str, subject_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM attendance_ledger.subjects WHERE id = $1 AND owner = $2",
        )
        .bind(subject_id)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("subject {subject_id}")));
        }
        Ok(())
    }
}
