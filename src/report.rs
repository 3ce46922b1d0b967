use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{Dashboard, SkipAdvice, SubjectRow};

pub fn describe_advice(advice: &SkipAdvice) -> String {
    match advice {
        SkipAdvice::Safe { hours } => format!("safe, can skip {hours}h"),
        SkipAdvice::Risk { hours: Some(hours) } => format!("at risk, attend {hours}h to recover"),
        SkipAdvice::Risk { hours: None } => "at risk, target no longer reachable".to_string(),
    }
}

/// Subjects below their target first, lowest percentage leading.
fn ordered_rows(dashboard: &Dashboard) -> Vec<&SubjectRow> {
    let mut rows: Vec<&SubjectRow> = dashboard.subjects.iter().collect();
    rows.sort_by(|a, b| {
        let a_behind = a.percentage < a.target_percentage;
        let b_behind = b.percentage < b.target_percentage;
        b_behind
            .cmp(&a_behind)
            .then_with(|| {
                a.percentage
                    .partial_cmp(&b.percentage)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

pub fn build_report(owner: &str, generated_on: NaiveDate, dashboard: &Dashboard) -> String {
    let mut output = String::new();
    let global = &dashboard.global;

    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(output, "Generated for {} on {}", owner, generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");
    let _ = writeln!(
        output,
        "- {:.1}% attendance ({:.1}h attended of {:.1}h conducted)",
        global.percentage, global.attended_hours, global.conducted_hours
    );
    let _ = writeln!(output, "- {}", describe_advice(&global.advice));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    if dashboard.subjects.is_empty() {
        let _ = writeln!(output, "No subjects recorded yet.");
        return output;
    }

    let _ = writeln!(
        output,
        "| Subject | Code | Type | Attended | Conducted | % | Target | Advice |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
    for row in ordered_rows(dashboard) {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.1}h | {:.1}h | {:.1} | {:.0} | {} |",
            row.name,
            if row.code.is_empty() { "-" } else { row.code.as_str() },
            row.type_label,
            row.attended_hours,
            row.conducted_hours,
            row.percentage,
            row.target_percentage,
            describe_advice(&row.advice)
        );
    }

    let behind: Vec<&str> = dashboard
        .subjects
        .iter()
        .filter(|row| row.percentage < row.target_percentage)
        .map(|row| row.name.as_str())
        .collect();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Below Target");
    if behind.is_empty() {
        let _ = writeln!(output, "Every subject is at or above its target.");
    } else {
        for name in behind {
            let _ = writeln!(output, "- {}", name);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GlobalRow;
    use uuid::Uuid;

    fn row(name: &str, percentage: f64, advice: SkipAdvice) -> SubjectRow {
        SubjectRow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: String::new(),
            type_label: "Lecture".to_string(),
            attended_hours: percentage / 10.0,
            conducted_hours: 10.0,
            percentage,
            target_percentage: 75.0,
            advice,
        }
    }

    fn sample() -> Dashboard {
        Dashboard {
            global: GlobalRow {
                attended_hours: 14.0,
                conducted_hours: 20.0,
                percentage: 70.0,
                advice: SkipAdvice::Risk { hours: Some(4) },
            },
            subjects: vec![
                row("OS", 90.0, SkipAdvice::Safe { hours: 2 }),
                row("CN", 50.0, SkipAdvice::Risk { hours: Some(10) }),
            ],
        }
    }

    #[test]
    fn lists_subjects_behind_target_first() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let report = build_report("ana", date, &sample());

        assert!(report.contains("Generated for ana on 2026-02-01"));
        assert!(report.contains("- 70.0% attendance (14.0h attended of 20.0h conducted)"));
        let cn = report.find("| CN |").unwrap();
        let os = report.find("| OS |").unwrap();
        assert!(cn < os);
        assert!(report.contains("at risk, attend 10h to recover"));
        assert!(report.contains("## Below Target\n- CN"));
    }

    #[test]
    fn handles_empty_ledger() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let dashboard = Dashboard {
            global: GlobalRow {
                attended_hours: 0.0,
                conducted_hours: 0.0,
                percentage: 100.0,
                advice: SkipAdvice::Safe { hours: 0 },
            },
            subjects: Vec::new(),
        };
        let report = build_report("ana", date, &dashboard);
        assert!(report.contains("No subjects recorded yet."));
    }
}
