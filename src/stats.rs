use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

use crate::classify::{self, Tier};
use crate::view::SortValue;
use crate::vocab::{AttendanceStatus, ParticipationLevel};

/// Half-up rounding to 1 decimal, applied to every figure the console shows.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StatsError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn db(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct StatsContext<'a> {
    pub conn: &'a Connection,
    pub class_id: &'a str,
    pub period_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRow {
    pub id: String,
    pub number: i64,
    pub year: i64,
    pub period_type: String,
    pub start_date: String,
    pub end_date: String,
}

pub fn class_name(conn: &Connection, class_id: &str) -> Result<String, StatsError> {
    conn.query_row("SELECT name FROM classes WHERE id = ?", [class_id], |r| {
        r.get(0)
    })
    .optional()
    .map_err(StatsError::db)?
    .ok_or_else(|| StatsError::new("not_found", "class not found"))
}

pub fn load_period(
    conn: &Connection,
    class_id: &str,
    period_id: &str,
) -> Result<PeriodRow, StatsError> {
    conn.query_row(
        "SELECT id, number, year, period_type, start_date, end_date
         FROM periods
         WHERE id = ? AND class_id = ?",
        (period_id, class_id),
        |r| {
            Ok(PeriodRow {
                id: r.get(0)?,
                number: r.get(1)?,
                year: r.get(2)?,
                period_type: r.get(3)?,
                start_date: r.get(4)?,
                end_date: r.get(5)?,
            })
        },
    )
    .optional()
    .map_err(StatsError::db)?
    .ok_or_else(|| StatsError::new("not_found", "period not found for class"))
}

#[derive(Debug, Clone)]
pub struct RosterStudent {
    pub id: String,
    pub display_name: String,
    pub ci: Option<String>,
    pub active: bool,
    pub sort_order: i64,
}

pub fn list_roster(conn: &Connection, class_id: &str) -> Result<Vec<RosterStudent>, StatsError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, first_name, last_name, ci, active, sort_order
             FROM students
             WHERE class_id = ?
             ORDER BY sort_order",
        )
        .map_err(StatsError::db)?;
    stmt.query_map([class_id], |r| {
        let first: String = r.get(1)?;
        let last: String = r.get(2)?;
        Ok(RosterStudent {
            id: r.get(0)?,
            display_name: format!("{} {}", first, last),
            ci: r.get(3)?,
            active: r.get::<_, i64>(4)? != 0,
            sort_order: r.get(5)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(StatsError::db)
}

// ---------------------------------------------------------------------------
// Attendance

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStat {
    pub student_id: String,
    pub student_name: String,
    pub present_count: i64,
    pub absent_count: i64,
    pub late_count: i64,
    pub total_days: i64,
    pub percentage: f64,
    pub label: &'static str,
    pub tier: Tier,
}

pub fn compute_attendance_stats(
    ctx: &StatsContext<'_>,
) -> Result<Vec<AttendanceStat>, StatsError> {
    class_name(ctx.conn, ctx.class_id)?;
    load_period(ctx.conn, ctx.class_id, ctx.period_id)?;
    let roster = list_roster(ctx.conn, ctx.class_id)?;

    let mut stmt = ctx
        .conn
        .prepare(
            "SELECT student_id, status
             FROM attendance_records
             WHERE class_id = ? AND period_id = ?",
        )
        .map_err(StatsError::db)?;
    let records = stmt
        .query_map((ctx.class_id, ctx.period_id), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StatsError::db)?;

    // (present, absent, late) per student; unknown stored labels collapse
    // to the default category on read.
    let mut counts: HashMap<String, (i64, i64, i64)> = HashMap::new();
    for (student_id, status) in records {
        let entry = counts.entry(student_id).or_insert((0, 0, 0));
        match AttendanceStatus::from_db_label(&status) {
            AttendanceStatus::Present => entry.0 += 1,
            AttendanceStatus::Absent => entry.1 += 1,
            AttendanceStatus::Late => entry.2 += 1,
        }
    }

    let mut out = Vec::new();
    for s in &roster {
        let Some(&(present, absent, late)) = counts.get(&s.id) else {
            continue;
        };
        let total = present + absent + late;
        let percentage = if total > 0 {
            round1(100.0 * present as f64 / total as f64)
        } else {
            0.0
        };
        let (label, tier) = classify::attendance_label(percentage);
        out.push(AttendanceStat {
            student_id: s.id.clone(),
            student_name: s.display_name.clone(),
            present_count: present,
            absent_count: absent,
            late_count: late,
            total_days: total,
            percentage,
            label,
            tier,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceSortKey {
    StudentName,
    PresentCount,
    AbsentCount,
    LateCount,
    TotalDays,
    Percentage,
}

impl AttendanceSortKey {
    pub const TOKENS: [&'static str; 6] = [
        "studentName",
        "presentCount",
        "absentCount",
        "lateCount",
        "totalDays",
        "percentage",
    ];

    pub fn parse(raw: Option<&str>) -> Option<AttendanceSortKey> {
        match raw {
            None | Some("studentName") => Some(AttendanceSortKey::StudentName),
            Some("presentCount") => Some(AttendanceSortKey::PresentCount),
            Some("absentCount") => Some(AttendanceSortKey::AbsentCount),
            Some("lateCount") => Some(AttendanceSortKey::LateCount),
            Some("totalDays") => Some(AttendanceSortKey::TotalDays),
            Some("percentage") => Some(AttendanceSortKey::Percentage),
            Some(_) => None,
        }
    }

    pub fn value(self, row: &AttendanceStat) -> SortValue {
        match self {
            AttendanceSortKey::StudentName => SortValue::Text(row.student_name.clone()),
            AttendanceSortKey::PresentCount => SortValue::Number(row.present_count as f64),
            AttendanceSortKey::AbsentCount => SortValue::Number(row.absent_count as f64),
            AttendanceSortKey::LateCount => SortValue::Number(row.late_count as f64),
            AttendanceSortKey::TotalDays => SortValue::Number(row.total_days as f64),
            AttendanceSortKey::Percentage => SortValue::Number(row.percentage),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub student_count: usize,
    pub average_percentage: f64,
    pub below_85: usize,
    pub below_70: usize,
}

pub fn attendance_summary(rows: &[AttendanceStat]) -> AttendanceSummary {
    let average_percentage = if rows.is_empty() {
        0.0
    } else {
        round1(rows.iter().map(|r| r.percentage).sum::<f64>() / rows.len() as f64)
    };
    AttendanceSummary {
        student_count: rows.len(),
        average_percentage,
        below_85: rows.iter().filter(|r| r.percentage < 85.0).count(),
        below_70: rows.iter().filter(|r| r.percentage < 70.0).count(),
    }
}

// ---------------------------------------------------------------------------
// Participation

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationStat {
    pub student_id: String,
    pub student_name: String,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub total_days: i64,
    pub average_score: f64,
    pub average_level: &'static str,
    pub tier: Tier,
}

pub fn compute_participation_stats(
    ctx: &StatsContext<'_>,
) -> Result<Vec<ParticipationStat>, StatsError> {
    class_name(ctx.conn, ctx.class_id)?;
    load_period(ctx.conn, ctx.class_id, ctx.period_id)?;
    let roster = list_roster(ctx.conn, ctx.class_id)?;

    let mut stmt = ctx
        .conn
        .prepare(
            "SELECT student_id, level
             FROM participation_records
             WHERE class_id = ? AND period_id = ?",
        )
        .map_err(StatsError::db)?;
    let records = stmt
        .query_map((ctx.class_id, ctx.period_id), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StatsError::db)?;

    let mut counts: HashMap<String, (i64, i64, i64)> = HashMap::new();
    for (student_id, level) in records {
        let entry = counts.entry(student_id).or_insert((0, 0, 0));
        match ParticipationLevel::from_db_label(&level) {
            ParticipationLevel::High => entry.0 += 1,
            ParticipationLevel::Medium => entry.1 += 1,
            ParticipationLevel::Low => entry.2 += 1,
        }
    }

    let mut out = Vec::new();
    for s in &roster {
        let Some(&(high, medium, low)) = counts.get(&s.id) else {
            continue;
        };
        let total = high + medium + low;
        let average_score = if total > 0 {
            round1((3 * high + 2 * medium + low) as f64 / total as f64)
        } else {
            0.0
        };
        let (average_level, tier) = classify::participation_level_label(average_score);
        out.push(ParticipationStat {
            student_id: s.id.clone(),
            student_name: s.display_name.clone(),
            high_count: high,
            medium_count: medium,
            low_count: low,
            total_days: total,
            average_score,
            average_level,
            tier,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipationSortKey {
    StudentName,
    HighCount,
    MediumCount,
    LowCount,
    TotalDays,
    AverageScore,
    AverageLevel,
}

impl ParticipationSortKey {
    pub const TOKENS: [&'static str; 7] = [
        "studentName",
        "highCount",
        "mediumCount",
        "lowCount",
        "totalDays",
        "averageScore",
        "averageLevel",
    ];

    pub fn parse(raw: Option<&str>) -> Option<ParticipationSortKey> {
        match raw {
            None | Some("studentName") => Some(ParticipationSortKey::StudentName),
            Some("highCount") => Some(ParticipationSortKey::HighCount),
            Some("mediumCount") => Some(ParticipationSortKey::MediumCount),
            Some("lowCount") => Some(ParticipationSortKey::LowCount),
            Some("totalDays") => Some(ParticipationSortKey::TotalDays),
            Some("averageScore") => Some(ParticipationSortKey::AverageScore),
            Some("averageLevel") => Some(ParticipationSortKey::AverageLevel),
            Some(_) => None,
        }
    }

    pub fn value(self, row: &ParticipationStat) -> SortValue {
        match self {
            ParticipationSortKey::StudentName => SortValue::Text(row.student_name.clone()),
            ParticipationSortKey::HighCount => SortValue::Number(row.high_count as f64),
            ParticipationSortKey::MediumCount => SortValue::Number(row.medium_count as f64),
            ParticipationSortKey::LowCount => SortValue::Number(row.low_count as f64),
            ParticipationSortKey::TotalDays => SortValue::Number(row.total_days as f64),
            ParticipationSortKey::AverageScore => SortValue::Number(row.average_score),
            // The categorical label sorts by its rank, not alphabetically.
            ParticipationSortKey::AverageLevel => {
                SortValue::Number(classify::level_label_rank(row.average_level) as f64)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationSummary {
    pub student_count: usize,
    pub average_score: f64,
    pub alta_count: usize,
    pub media_count: usize,
    pub baja_count: usize,
}

pub fn participation_summary(rows: &[ParticipationStat]) -> ParticipationSummary {
    let average_score = if rows.is_empty() {
        0.0
    } else {
        round1(rows.iter().map(|r| r.average_score).sum::<f64>() / rows.len() as f64)
    };
    ParticipationSummary {
        student_count: rows.len(),
        average_score,
        alta_count: rows.iter().filter(|r| r.average_level == "Alta").count(),
        media_count: rows.iter().filter(|r| r.average_level == "Media").count(),
        baja_count: rows.iter().filter(|r| r.average_level == "Baja").count(),
    }
}

// ---------------------------------------------------------------------------
// Period grades

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeStatus {
    Approved,
    Failed,
}

impl GradeStatus {
    pub fn of_total(total: f64) -> GradeStatus {
        if classify::grade_approved(total) {
            GradeStatus::Approved
        } else {
            GradeStatus::Failed
        }
    }

    pub fn export_label(self) -> &'static str {
        match self {
            GradeStatus::Approved => "APROBADO",
            GradeStatus::Failed => "REPROBADO",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GradeComponents {
    pub ser: f64,
    pub saber: f64,
    pub hacer: f64,
    pub decidir: f64,
    pub autoevaluacion: f64,
}

impl GradeComponents {
    /// The total is always the component sum; it is never stored.
    pub fn total(&self) -> f64 {
        round1(self.ser + self.saber + self.hacer + self.decidir + self.autoevaluacion)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeStat {
    pub student_id: String,
    pub student_name: String,
    pub ser: f64,
    pub saber: f64,
    pub hacer: f64,
    pub decidir: f64,
    pub autoevaluacion: f64,
    pub total: f64,
    pub status: GradeStatus,
    pub label: &'static str,
    pub tier: Tier,
}

pub fn compute_grade_stats(ctx: &StatsContext<'_>) -> Result<Vec<GradeStat>, StatsError> {
    class_name(ctx.conn, ctx.class_id)?;
    load_period(ctx.conn, ctx.class_id, ctx.period_id)?;
    let roster = list_roster(ctx.conn, ctx.class_id)?;

    let mut stmt = ctx
        .conn
        .prepare(
            "SELECT student_id, ser, saber, hacer, decidir, autoevaluacion
             FROM period_grades
             WHERE class_id = ? AND period_id = ?",
        )
        .map_err(StatsError::db)?;
    let records: Vec<(String, GradeComponents)> = stmt
        .query_map((ctx.class_id, ctx.period_id), |r| {
            Ok((
                r.get::<_, String>(0)?,
                GradeComponents {
                    ser: r.get(1)?,
                    saber: r.get(2)?,
                    hacer: r.get(3)?,
                    decidir: r.get(4)?,
                    autoevaluacion: r.get(5)?,
                },
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StatsError::db)?;

    let by_student: HashMap<String, GradeComponents> = records.into_iter().collect();

    let mut out = Vec::new();
    for s in &roster {
        let Some(c) = by_student.get(&s.id) else {
            continue;
        };
        let total = c.total();
        let (label, tier) = classify::grade_label(total);
        out.push(GradeStat {
            student_id: s.id.clone(),
            student_name: s.display_name.clone(),
            ser: c.ser,
            saber: c.saber,
            hacer: c.hacer,
            decidir: c.decidir,
            autoevaluacion: c.autoevaluacion,
            total,
            status: GradeStatus::of_total(total),
            label,
            tier,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeSortKey {
    StudentName,
    Ser,
    Saber,
    Hacer,
    Decidir,
    Autoevaluacion,
    Total,
}

impl GradeSortKey {
    pub const TOKENS: [&'static str; 7] = [
        "studentName",
        "ser",
        "saber",
        "hacer",
        "decidir",
        "autoevaluacion",
        "total",
    ];

    pub fn parse(raw: Option<&str>) -> Option<GradeSortKey> {
        match raw {
            None | Some("total") => Some(GradeSortKey::Total),
            Some("studentName") => Some(GradeSortKey::StudentName),
            Some("ser") => Some(GradeSortKey::Ser),
            Some("saber") => Some(GradeSortKey::Saber),
            Some("hacer") => Some(GradeSortKey::Hacer),
            Some("decidir") => Some(GradeSortKey::Decidir),
            Some("autoevaluacion") => Some(GradeSortKey::Autoevaluacion),
            Some(_) => None,
        }
    }

    pub fn value(self, row: &GradeStat) -> SortValue {
        match self {
            GradeSortKey::StudentName => SortValue::Text(row.student_name.clone()),
            GradeSortKey::Ser => SortValue::Number(row.ser),
            GradeSortKey::Saber => SortValue::Number(row.saber),
            GradeSortKey::Hacer => SortValue::Number(row.hacer),
            GradeSortKey::Decidir => SortValue::Number(row.decidir),
            GradeSortKey::Autoevaluacion => SortValue::Number(row.autoevaluacion),
            GradeSortKey::Total => SortValue::Number(row.total),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub student_count: usize,
    pub average_total: f64,
    pub approved_count: usize,
    pub failed_count: usize,
}

pub fn grade_summary(rows: &[GradeStat]) -> GradeSummary {
    let average_total = if rows.is_empty() {
        0.0
    } else {
        round1(rows.iter().map(|r| r.total).sum::<f64>() / rows.len() as f64)
    };
    GradeSummary {
        student_count: rows.len(),
        average_total,
        approved_count: rows
            .iter()
            .filter(|r| r.status == GradeStatus::Approved)
            .count(),
        failed_count: rows
            .iter()
            .filter(|r| r.status == GradeStatus::Failed)
            .count(),
    }
}

// ---------------------------------------------------------------------------
// Final grades

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodGradeLine {
    pub period_id: String,
    pub period_type: String,
    pub number: i64,
    pub year: i64,
    pub total: f64,
    pub status: GradeStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalGrade {
    pub student_id: String,
    pub student_name: String,
    pub final_score: f64,
    pub final_status: GradeStatus,
    pub label: &'static str,
    pub periods_count: usize,
    pub period_grades: Vec<PeriodGradeLine>,
}

/// Final grade per student: the mean of their period totals across the
/// class's periods, in (year, number) order. Students without any period
/// grade are omitted.
pub fn compute_final_grades(
    conn: &Connection,
    class_id: &str,
) -> Result<Vec<FinalGrade>, StatsError> {
    class_name(conn, class_id)?;
    let roster = list_roster(conn, class_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT g.student_id, g.period_id, p.period_type, p.number, p.year,
                    g.ser, g.saber, g.hacer, g.decidir, g.autoevaluacion
             FROM period_grades g
             JOIN periods p ON p.id = g.period_id
             WHERE g.class_id = ?
             ORDER BY p.year, p.number",
        )
        .map_err(StatsError::db)?;
    let rows = stmt
        .query_map([class_id], |r| {
            let components = GradeComponents {
                ser: r.get(5)?,
                saber: r.get(6)?,
                hacer: r.get(7)?,
                decidir: r.get(8)?,
                autoevaluacion: r.get(9)?,
            };
            Ok((
                r.get::<_, String>(0)?,
                PeriodGradeLine {
                    period_id: r.get(1)?,
                    period_type: r.get(2)?,
                    number: r.get(3)?,
                    year: r.get(4)?,
                    total: components.total(),
                    status: GradeStatus::of_total(components.total()),
                },
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StatsError::db)?;

    let mut by_student: HashMap<String, Vec<PeriodGradeLine>> = HashMap::new();
    for (student_id, line) in rows {
        by_student.entry(student_id).or_default().push(line);
    }

    let mut out = Vec::new();
    for s in &roster {
        let Some(lines) = by_student.remove(&s.id) else {
            continue;
        };
        let final_score =
            round1(lines.iter().map(|l| l.total).sum::<f64>() / lines.len() as f64);
        let (label, _) = classify::grade_label(final_score);
        out.push(FinalGrade {
            student_id: s.id.clone(),
            student_name: s.display_name.clone(),
            final_score,
            final_status: GradeStatus::of_total(final_score),
            label,
            periods_count: lines.len(),
            period_grades: lines,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalSortKey {
    StudentName,
    FinalScore,
    PeriodsCount,
}

impl FinalSortKey {
    pub const TOKENS: [&'static str; 3] = ["studentName", "finalScore", "periodsCount"];

    pub fn parse(raw: Option<&str>) -> Option<FinalSortKey> {
        match raw {
            None | Some("finalScore") => Some(FinalSortKey::FinalScore),
            Some("studentName") => Some(FinalSortKey::StudentName),
            Some("periodsCount") => Some(FinalSortKey::PeriodsCount),
            Some(_) => None,
        }
    }

    pub fn value(self, row: &FinalGrade) -> SortValue {
        match self {
            FinalSortKey::StudentName => SortValue::Text(row.student_name.clone()),
            FinalSortKey::FinalScore => SortValue::Number(row.final_score),
            FinalSortKey::PeriodsCount => SortValue::Number(row.periods_count as f64),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSummary {
    pub student_count: usize,
    pub approved_count: usize,
    pub failed_count: usize,
    pub average_score: f64,
}

pub fn final_summary(rows: &[FinalGrade]) -> FinalSummary {
    let average_score = if rows.is_empty() {
        0.0
    } else {
        round1(rows.iter().map(|r| r.final_score).sum::<f64>() / rows.len() as f64)
    };
    FinalSummary {
        student_count: rows.len(),
        approved_count: rows
            .iter()
            .filter(|r| r.final_status == GradeStatus::Approved)
            .count(),
        failed_count: rows
            .iter()
            .filter(|r| r.final_status == GradeStatus::Failed)
            .count(),
        average_score,
    }
}
