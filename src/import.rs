use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{ImportMode, ImportSummary, NormalizedRecord, SessionType};
use crate::rows::{self, ParsedBatch};
use crate::sanitize;
use crate::store::LedgerStore;

/// Imports an uploaded file; non-UTF-8 bytes are rejected before any row is read.
pub async fn import_bytes<S: LedgerStore>(
    store: &S,
    owner: &str,
    bytes: &[u8],
    today: NaiveDate,
) -> Result<ImportSummary> {
    let text = sanitize::decode_upload(bytes)?;
    import_clean_text(store, owner, &text, today).await
}

pub async fn import_text<S: LedgerStore>(
    store: &S,
    owner: &str,
    raw: &str,
    today: NaiveDate,
) -> Result<ImportSummary> {
    let text = sanitize::sanitize(raw)?;
    import_clean_text(store, owner, &text, today).await
}

async fn import_clean_text<S: LedgerStore>(
    store: &S,
    owner: &str,
    text: &str,
    today: NaiveDate,
) -> Result<ImportSummary> {
    let batch = rows::normalize(text, today)?;
    info!(
        mode = %batch.mode,
        records = batch.records.len(),
        rejected = batch.failed,
        "parsed attendance upload"
    );
    Ok(record_batch(store, owner, batch).await)
}

/// Stored subject name and session type per lowercased (subject, session type).
type SessionCache = HashMap<(String, String), (String, SessionType)>;

/// Writes every normalized record; a failing record is reported and skipped.
async fn record_batch<S: LedgerStore>(store: &S, owner: &str, batch: ParsedBatch) -> ImportSummary {
    let ParsedBatch {
        mode,
        records,
        failed,
        warnings,
    } = batch;

    let mut summary = ImportSummary {
        success_count: 0,
        failed_count: failed,
        warnings,
        mode,
        subjects_touched: Vec::new(),
    };
    if mode == ImportMode::Unknown {
        return summary;
    }

    let mut session_types = SessionCache::new();

    for record in &records {
        match record_one(store, owner, record, &mut session_types).await {
            Ok(subject_name) => {
                summary.success_count += 1;
                if !summary.subjects_touched.contains(&subject_name) {
                    summary.subjects_touched.push(subject_name);
                }
            }
            Err(err) => {
                warn!(row = record.row, error = %err, "failed to record attendance");
                summary.failed_count += 1;
                summary.warnings.push(format!("Row {}: {}", record.row, err));
            }
        }
    }

    info!(
        succeeded = summary.success_count,
        failed = summary.failed_count,
        subjects = summary.subjects_touched.len(),
        "import finished"
    );
    summary
}

async fn record_one<S: LedgerStore>(
    store: &S,
    owner: &str,
    record: &NormalizedRecord,
    session_types: &mut SessionCache,
) -> Result<String> {
    let key = (
        record.subject.to_lowercase(),
        record.session_type.to_lowercase(),
    );

    let (subject_name, session_type) = match session_types.get(&key) {
        Some(cached) => cached.clone(),
        None => {
            let subject = store
                .get_or_create_subject(owner, &record.subject, record.subject_code.as_deref())
                .await?;
            let session_type = store
                .get_or_create_session_type(&subject, &record.session_type, record.duration_hours)
                .await?;
            session_types.insert(key, (subject.name.clone(), session_type.clone()));
            (subject.name, session_type)
        }
    };

    store
        .upsert_attendance_log(&session_type, record.date, record.status)
        .await?;

    Ok(subject_name)
}
