use std::collections::HashMap;

use crate::models::ImportMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Subject,
    SubjectCode,
    SessionType,
    Date,
    Status,
    PresentCount,
    AbsentCount,
    TotalCount,
    Duration,
}

/// Accepted header spellings per canonical field, compared after [`normalize_header`].
const SYNONYMS: &[(Field, &[&str])] = &[
    (
        Field::Subject,
        &[
            "subject",
            "subject name",
            "subject title",
            "course",
            "course title",
            "course name",
            "sub",
        ],
    ),
    (
        Field::SubjectCode,
        &["subject code", "code", "course code", "course id", "sub code"],
    ),
    (
        Field::SessionType,
        &[
            "type",
            "subject type",
            "session type",
            "class type",
            "session",
            "l/p",
            "category",
        ],
    ),
    (Field::Date, &["date", "session date", "class date", "time"]),
    (
        Field::Status,
        &["status", "attendance", "attendance status", "state", "att"],
    ),
    (
        Field::PresentCount,
        &["present", "present count", "attended", "classes attended", "p"],
    ),
    (
        Field::AbsentCount,
        &["absent", "absent count", "bunked", "missed", "a"],
    ),
    (
        Field::TotalCount,
        &["total", "total classes", "conducted", "classes held"],
    ),
    (
        Field::Duration,
        &["duration", "duration hours", "duration hrs", "hours", "hrs", "length"],
    ),
];

/// Lowercases, trims, drops dots and folds `_`/`-`/whitespace runs into single spaces.
pub fn normalize_header(header: &str) -> String {
    let folded: String = header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    columns: HashMap<Field, usize>,
}

impl FieldMap {
    pub fn column(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    /// Trimmed cell for `field`, `None` when unmapped, out of range or blank.
    pub fn value<'r>(&self, row: &'r csv::StringRecord, field: Field) -> Option<&'r str> {
        self.column(field)
            .and_then(|index| row.get(index))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub fields: FieldMap,
    pub mode: ImportMode,
}

/// Maps header cells to canonical fields and picks the ingestion mode.
///
/// The first column matching a field wins; later duplicates are ignored.
pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Schema {
    let normalized: Vec<String> = headers
        .iter()
        .map(|header| normalize_header(header.as_ref()))
        .collect();

    let mut fields = FieldMap::default();
    for (field, spellings) in SYNONYMS {
        if let Some(index) = normalized
            .iter()
            .position(|header| spellings.contains(&header.as_str()))
        {
            fields.columns.entry(*field).or_insert(index);
        }
    }

    let mode = detect_mode(&fields);
    Schema { fields, mode }
}

fn detect_mode(fields: &FieldMap) -> ImportMode {
    if fields.contains(Field::Date) && fields.contains(Field::Status) {
        ImportMode::Daily
    } else if fields.contains(Field::PresentCount) {
        ImportMode::Summary
    } else {
        ImportMode::Unknown
    }
}
