use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::aggregate::{self, rounded_percentage, HourTotals, SubjectStanding};
use crate::error::Result;
use crate::models::{ForecastAction, ForecastPoint, SimulationStep};
use crate::store::LedgerStore;

/// Running per-subject and global totals that simulation steps mutate in place.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    subjects: HashMap<Uuid, HourTotals>,
    global: HourTotals,
}

impl Snapshot {
    pub fn from_standings(standings: &[SubjectStanding]) -> Self {
        Self {
            subjects: standings
                .iter()
                .map(|standing| (standing.subject.id, standing.totals))
                .collect(),
            global: aggregate::global_totals(standings),
        }
    }

    /// Applies one step; `None` when the subject is not part of the snapshot.
    fn apply(&mut self, step: &SimulationStep) -> Option<ForecastPoint> {
        let subject = self.subjects.get_mut(&step.subject_id)?;

        subject.conducted += step.weight;
        self.global.conducted += step.weight;
        if step.action == ForecastAction::Attend {
            subject.attended += step.weight;
            self.global.attended += step.weight;
        }

        Some(ForecastPoint {
            subject_id: step.subject_id,
            new_subject_percentage: rounded_percentage(subject, 2),
            new_global_percentage: rounded_percentage(&self.global, 2),
        })
    }
}

/// Replays `steps` in order, each one building on the state left by the previous.
///
/// Steps naming an unknown subject produce no point.
pub fn run(mut snapshot: Snapshot, steps: &[SimulationStep]) -> Vec<ForecastPoint> {
    steps
        .iter()
        .filter_map(|step| {
            let point = snapshot.apply(step);
            if point.is_none() {
                debug!(subject_id = %step.subject_id, "skipping step for unknown subject");
            }
            point
        })
        .collect()
}

pub async fn forecast<S: LedgerStore>(
    store: &S,
    owner: &str,
    steps: &[SimulationStep],
) -> Result<Vec<ForecastPoint>> {
    let standings = aggregate::standings(store, owner).await?;
    Ok(run(Snapshot::from_standings(&standings), steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceStatus;
    use crate::store::MemoryLedger;
    use chrono::NaiveDate;

    fn step(subject_id: Uuid, action: ForecastAction, weight: f64) -> SimulationStep {
        SimulationStep {
            subject_id,
            action,
            weight,
        }
    }

    fn snapshot(entries: &[(Uuid, f64, f64)]) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for (id, attended, conducted) in entries {
            let totals = HourTotals::new(*attended, *conducted);
            snapshot.global.absorb(&totals);
            snapshot.subjects.insert(*id, totals);
        }
        snapshot
    }

    #[tokio::test]
    async fn skips_cascade_from_ledger_state() {
        let ledger = MemoryLedger::new();
        let math = ledger.get_or_create_subject("ana", "Math", None).await.unwrap();
        let lecture = ledger
            .get_or_create_session_type(&math, "Lecture", 1.0)
            .await
            .unwrap();
        for d in 10..20 {
            let date = NaiveDate::from_ymd_opt(2025, 1, d).unwrap();
            ledger
                .upsert_attendance_log(&lecture, date, AttendanceStatus::Present)
                .await
                .unwrap();
        }

        let steps = vec![
            step(math.id, ForecastAction::Skip, 1.0),
            step(math.id, ForecastAction::Skip, 1.0),
        ];
        let points = forecast(&ledger, "ana", &steps).await.unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].new_subject_percentage, 90.91);
        assert_eq!(points[1].new_subject_percentage, 83.33);
        assert_eq!(points[1].new_global_percentage, 83.33);
    }

    #[test]
    fn attend_moves_both_subject_and_global() {
        let os = Uuid::new_v4();
        let cn = Uuid::new_v4();
        let state = snapshot(&[(os, 1.0, 4.0), (cn, 4.0, 4.0)]);

        let points = run(
            state,
            &[
                step(os, ForecastAction::Attend, 2.0),
                step(cn, ForecastAction::Skip, 4.0),
            ],
        );

        assert_eq!(points[0].subject_id, os);
        assert_eq!(points[0].new_subject_percentage, 50.0);
        assert_eq!(points[0].new_global_percentage, 70.0);
        assert_eq!(points[1].new_subject_percentage, 50.0);
        assert_eq!(points[1].new_global_percentage, 50.0);
    }

    #[test]
    fn midpoint_percentages_round_up() {
        let dbms = Uuid::new_v4();
        let points = run(
            snapshot(&[(dbms, 22.0, 159.0)]),
            &[step(dbms, ForecastAction::Attend, 1.0)],
        );

        assert_eq!(points[0].new_subject_percentage, 14.38);
        assert_eq!(points[0].new_global_percentage, 14.38);
    }

    #[test]
    fn unknown_subjects_are_skipped_silently() {
        let os = Uuid::new_v4();
        let points = run(
            snapshot(&[(os, 1.0, 1.0)]),
            &[
                step(Uuid::new_v4(), ForecastAction::Skip, 1.0),
                step(os, ForecastAction::Skip, 1.0),
            ],
        );

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].new_subject_percentage, 50.0);
    }

    #[test]
    fn zero_weight_on_empty_subject_stays_at_full() {
        let fresh = Uuid::new_v4();
        let points = run(
            snapshot(&[(fresh, 0.0, 0.0)]),
            &[step(fresh, ForecastAction::Skip, 0.0)],
        );

        assert_eq!(points[0].new_subject_percentage, 100.0);
        assert_eq!(points[0].new_global_percentage, 100.0);
    }

    #[tokio::test]
    async fn malformed_step_ids_are_skipped() {
        let ledger = MemoryLedger::new();
        let math = ledger.get_or_create_subject("ana", "Math", None).await.unwrap();
        let json = format!(
            r#"[{{"subject_id":"not-a-uuid","action":"attend"}},{{"subject_id":"{}","action":"skip"}}]"#,
            math.id
        );
        let steps: Vec<SimulationStep> = serde_json::from_str(&json).unwrap();

        let points = forecast(&ledger, "ana", &steps).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].subject_id, math.id);
        assert_eq!(points[0].new_subject_percentage, 0.0);
    }

    #[tokio::test]
    async fn other_owners_subjects_are_unknown() {
        let ledger = MemoryLedger::new();
        let theirs = ledger.get_or_create_subject("ben", "Math", None).await.unwrap();

        let points = forecast(&ledger, "ana", &[step(theirs.id, ForecastAction::Attend, 1.0)])
            .await
            .unwrap();
        assert!(points.is_empty());
    }
}
