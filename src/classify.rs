//! Threshold tables mapping numeric scores to categorical labels and
//! presentation severity tiers. All lower bounds are inclusive.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Success,
    Info,
    Warning,
    Error,
}

/// Pass mark for grade totals on the 0-100 scale.
pub const PASS_MARK: f64 = 51.0;

/// Attendance and participation percentage tiers.
pub fn attendance_label(percentage: f64) -> (&'static str, Tier) {
    if percentage >= 85.0 {
        ("Excelente", Tier::Success)
    } else if percentage >= 70.0 {
        ("Regular", Tier::Warning)
    } else {
        ("Deficiente", Tier::Error)
    }
}

/// Grade total tiers on the 0-100 scale.
pub fn grade_label(total: f64) -> (&'static str, Tier) {
    if total >= 90.0 {
        ("Excelente", Tier::Success)
    } else if total >= 75.0 {
        ("Bueno", Tier::Info)
    } else if total >= PASS_MARK {
        ("Regular", Tier::Warning)
    } else {
        ("Insuficiente", Tier::Error)
    }
}

pub fn grade_approved(total: f64) -> bool {
    total >= PASS_MARK
}

/// Participation average level on the 1-3 rank scale.
pub fn participation_level_label(average_score: f64) -> (&'static str, Tier) {
    if average_score >= 2.5 {
        ("Alta", Tier::Success)
    } else if average_score >= 1.5 {
        ("Media", Tier::Warning)
    } else {
        ("Baja", Tier::Error)
    }
}

/// Rank used when sorting by the categorical average level.
pub fn level_label_rank(label: &str) -> i64 {
    match label {
        "Alta" => 3,
        "Media" => 2,
        "Baja" => 1,
        _ => 0,
    }
}
