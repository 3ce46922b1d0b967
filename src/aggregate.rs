use crate::error::Result;
use crate::models::{
    AttendanceStatus, Dashboard, GlobalRow, SessionType, SkipAdvice, Subject, SubjectRow,
    DEFAULT_TARGET_PERCENTAGE,
};
use crate::store::LedgerStore;

const FALLBACK_TYPE_LABEL: &str = "Lecture";
const EPSILON: f64 = 1e-9;

/// Duration-weighted attended and conducted hours.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HourTotals {
    pub attended: f64,
    pub conducted: f64,
}

impl HourTotals {
    pub fn new(attended: f64, conducted: f64) -> Self {
        Self {
            attended,
            conducted,
        }
    }

    pub fn record(&mut self, duration_hours: f64, status: AttendanceStatus) {
        if status.is_conducted() {
            self.conducted += duration_hours;
        }
        if status == AttendanceStatus::Present {
            self.attended += duration_hours;
        }
    }

    pub fn absorb(&mut self, other: &HourTotals) {
        self.attended += other.attended;
        self.conducted += other.conducted;
    }

    /// Attended share of conducted hours; 100.0 while nothing has been conducted.
    pub fn percentage(&self) -> f64 {
        if self.conducted == 0.0 {
            100.0
        } else {
            self.attended / self.conducted * 100.0
        }
    }
}

/// Hours are compared in millionths so decimal midpoints stay exact.
const MICRO: i128 = 1_000_000;

fn to_micro(value: f64) -> i128 {
    (value * MICRO as f64).round() as i128
}

/// `num / den` rounded half away from zero, which is half-up for non-negative values.
/// `None` when the operands are too large to scale.
fn div_half_up(num: i128, den: i128) -> Option<i128> {
    let negative = (num < 0) != (den < 0);
    let num = num.checked_abs()?;
    let den = den.checked_abs()?;
    let quotient = num.checked_mul(2)?.checked_add(den)? / den.checked_mul(2)?;
    Some(if negative { -quotient } else { quotient })
}

/// Rounds an hour figure half-up to `places` decimals.
pub fn round_to(value: f64, places: u32) -> f64 {
    let scale = 10i128.pow(places);
    to_micro(value)
        .checked_mul(scale)
        .and_then(|num| div_half_up(num, MICRO))
        .map_or(value, |scaled| scaled as f64 / scale as f64)
}

/// Attended share of conducted hours rounded half-up to `places` decimals.
///
/// The ratio is rounded from the exact fraction, so 23/160 gives 14.38 rather
/// than the 14.37 a float product would round to.
pub fn rounded_percentage(totals: &HourTotals, places: u32) -> f64 {
    let scale = 10i128.pow(places);
    let conducted = to_micro(totals.conducted);
    if conducted == 0 {
        return round_to(totals.percentage(), places);
    }
    to_micro(totals.attended)
        .checked_mul(100 * scale)
        .and_then(|num| div_half_up(num, conducted))
        .map_or_else(
            || round_to(totals.percentage(), places),
            |scaled| scaled as f64 / scale as f64,
        )
}

/// How many hours can be skipped, or must be attended, relative to `target_percentage`.
pub fn skip_advice(totals: &HourTotals, target_percentage: f64) -> SkipAdvice {
    if totals.conducted == 0.0 {
        return SkipAdvice::Safe { hours: 0 };
    }

    let target = target_percentage / 100.0;
    let current = totals.attended / totals.conducted;

    if current + EPSILON >= target {
        let spare = (totals.attended / target - totals.conducted + EPSILON).floor();
        return SkipAdvice::Safe {
            hours: spare.max(0.0) as i64,
        };
    }

    if target >= 1.0 {
        return SkipAdvice::Risk { hours: None };
    }

    let needed = ((target * totals.conducted - totals.attended) / (1.0 - target) - EPSILON).ceil();
    SkipAdvice::Risk {
        hours: Some(needed.max(0.0) as i64),
    }
}

/// A subject with its weighted totals, as read from the ledger.
#[derive(Debug, Clone)]
pub struct SubjectStanding {
    pub subject: Subject,
    pub type_label: String,
    pub totals: HourTotals,
}

pub async fn subject_totals<S: LedgerStore>(
    store: &S,
    session_types: &[SessionType],
) -> Result<HourTotals> {
    let mut totals = HourTotals::default();
    for session_type in session_types {
        for log in store.list_logs(session_type).await? {
            totals.record(session_type.duration_hours, log.status);
        }
    }
    Ok(totals)
}

pub async fn standings<S: LedgerStore>(store: &S, owner: &str) -> Result<Vec<SubjectStanding>> {
    let mut standings = Vec::new();
    for subject in store.list_subjects(owner).await? {
        let session_types = store.list_session_types(&subject).await?;
        let totals = subject_totals(store, &session_types).await?;
        let type_label = session_types
            .first()
            .map(|t| t.name.clone())
            .unwrap_or_else(|| FALLBACK_TYPE_LABEL.to_string());

        standings.push(SubjectStanding {
            subject,
            type_label,
            totals,
        });
    }
    Ok(standings)
}

pub fn global_totals(standings: &[SubjectStanding]) -> HourTotals {
    standings.iter().fold(HourTotals::default(), |mut acc, standing| {
        acc.absorb(&standing.totals);
        acc
    })
}

/// Dashboard view: hours and percentages rounded to one decimal place.
pub fn dashboard(standings: &[SubjectStanding]) -> Dashboard {
    let subjects = standings
        .iter()
        .map(|standing| SubjectRow {
            id: standing.subject.id,
            name: standing.subject.name.clone(),
            code: standing.subject.code.clone().unwrap_or_default(),
            type_label: standing.type_label.clone(),
            attended_hours: round_to(standing.totals.attended, 1),
            conducted_hours: round_to(standing.totals.conducted, 1),
            percentage: rounded_percentage(&standing.totals, 1),
            target_percentage: standing.subject.target_percentage,
            advice: skip_advice(&standing.totals, standing.subject.target_percentage),
        })
        .collect();

    let global = global_totals(standings);
    Dashboard {
        global: GlobalRow {
            attended_hours: round_to(global.attended, 1),
            conducted_hours: round_to(global.conducted, 1),
            percentage: rounded_percentage(&global, 1),
            advice: skip_advice(&global, DEFAULT_TARGET_PERCENTAGE),
        },
        subjects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[tokio::test]
    async fn weights_hours_by_session_duration() {
        let ledger = MemoryLedger::new();
        let subject = ledger
            .get_or_create_subject("ana", "Data Structures", None)
            .await
            .unwrap();
        let lecture = ledger
            .get_or_create_session_type(&subject, "Lecture", 1.0)
            .await
            .unwrap();
        let lab = ledger
            .get_or_create_session_type(&subject, "Lab", 3.0)
            .await
            .unwrap();
        ledger
            .upsert_attendance_log(&lecture, day(2), AttendanceStatus::Present)
            .await
            .unwrap();
        ledger
            .upsert_attendance_log(&lab, day(3), AttendanceStatus::Absent)
            .await
            .unwrap();

        let standings = standings(&ledger, "ana").await.unwrap();
        let totals = standings[0].totals;
        assert_eq!(totals.conducted, 4.0);
        assert_eq!(totals.attended, 1.0);
        assert_eq!(totals.percentage(), 25.0);
        assert_eq!(standings[0].type_label, "Lecture");
    }

    #[test]
    fn cancelled_sessions_do_not_count() {
        let mut totals = HourTotals::default();
        totals.record(1.0, AttendanceStatus::Present);
        totals.record(3.0, AttendanceStatus::Cancelled);
        assert_eq!(totals, HourTotals::new(1.0, 1.0));
    }

    #[test]
    fn no_sessions_means_full_attendance() {
        assert_eq!(HourTotals::default().percentage(), 100.0);
        assert_eq!(
            skip_advice(&HourTotals::default(), 75.0),
            SkipAdvice::Safe { hours: 0 }
        );
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_to(66.666, 1), 66.7);
        assert_eq!(round_to(12.25, 1), 12.3);
        assert_eq!(round_to(0.1 + 0.2, 1), 0.3);
        assert_eq!(round_to(2.05, 1), 2.1);
        assert_eq!(rounded_percentage(&HourTotals::new(10.0, 11.0), 2), 90.91);
        assert_eq!(rounded_percentage(&HourTotals::new(10.0, 12.0), 2), 83.33);
    }

    #[test]
    fn percentage_midpoints_round_up() {
        assert_eq!(rounded_percentage(&HourTotals::new(23.0, 160.0), 2), 14.38);
        assert_eq!(rounded_percentage(&HourTotals::new(1.0, 16.0), 1), 6.3);
        assert_eq!(rounded_percentage(&HourTotals::new(3.0, 80.0), 1), 3.8);
        assert_eq!(rounded_percentage(&HourTotals::new(1.5, 4.0), 1), 37.5);
        assert_eq!(rounded_percentage(&HourTotals::default(), 2), 100.0);
    }

    #[test]
    fn advice_counts_spare_and_missing_hours() {
        assert_eq!(
            skip_advice(&HourTotals::new(10.0, 10.0), 75.0),
            SkipAdvice::Safe { hours: 3 }
        );
        assert_eq!(
            skip_advice(&HourTotals::new(3.0, 4.0), 75.0),
            SkipAdvice::Safe { hours: 0 }
        );
        assert_eq!(
            skip_advice(&HourTotals::new(1.0, 4.0), 75.0),
            SkipAdvice::Risk { hours: Some(8) }
        );
        assert_eq!(
            skip_advice(&HourTotals::new(9.0, 10.0), 100.0),
            SkipAdvice::Risk { hours: None }
        );
    }

    #[tokio::test]
    async fn dashboard_rolls_up_all_subjects() {
        let ledger = MemoryLedger::new();
        let os = ledger.get_or_create_subject("ana", "OS", Some("CS301")).await.unwrap();
        let empty = ledger.get_or_create_subject("ana", "Ethics", None).await.unwrap();
        let lab = ledger
            .get_or_create_session_type(&os, "Lab", 3.0)
            .await
            .unwrap();
        let lecture = ledger
            .get_or_create_session_type(&os, "Lecture", 1.0)
            .await
            .unwrap();
        ledger
            .upsert_attendance_log(&lab, day(5), AttendanceStatus::Present)
            .await
            .unwrap();
        for d in 6..9 {
            ledger
                .upsert_attendance_log(&lecture, day(d), AttendanceStatus::Absent)
                .await
                .unwrap();
        }

        let standings = standings(&ledger, "ana").await.unwrap();
        let view = dashboard(&standings);

        assert_eq!(view.subjects.len(), 2);
        let os_row = view.subjects.iter().find(|row| row.id == os.id).unwrap();
        assert_eq!(os_row.code, "CS301");
        assert_eq!(os_row.type_label, "Lab");
        assert_eq!(os_row.attended_hours, 3.0);
        assert_eq!(os_row.conducted_hours, 6.0);
        assert_eq!(os_row.percentage, 50.0);

        let empty_row = view.subjects.iter().find(|row| row.id == empty.id).unwrap();
        assert_eq!(empty_row.percentage, 100.0);
        assert_eq!(empty_row.type_label, "Lecture");
        assert_eq!(empty_row.code, "");

        assert_eq!(view.global.conducted_hours, 6.0);
        assert_eq!(view.global.percentage, 50.0);
    }

    #[tokio::test]
    async fn dashboard_rounds_midpoint_percentages_up() {
        let ledger = MemoryLedger::new();
        let os = ledger.get_or_create_subject("ana", "OS", None).await.unwrap();
        let lecture = ledger
            .get_or_create_session_type(&os, "Lecture", 1.0)
            .await
            .unwrap();
        ledger
            .upsert_attendance_log(&lecture, day(1), AttendanceStatus::Present)
            .await
            .unwrap();
        for d in 2..17 {
            ledger
                .upsert_attendance_log(&lecture, day(d), AttendanceStatus::Absent)
                .await
                .unwrap();
        }

        let view = dashboard(&standings(&ledger, "ana").await.unwrap());
        assert_eq!(view.subjects[0].percentage, 6.3);
        assert_eq!(view.global.percentage, 6.3);
        assert_eq!(view.global.conducted_hours, 16.0);
    }
}
