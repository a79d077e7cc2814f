use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{parse_dir, parse_search};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, AttendanceSortKey, StatsContext, StatsError};
use crate::view;
use crate::vocab::AttendanceStatus;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn bad(message: impl Into<String>, details: Option<serde_json::Value>) -> HandlerErr {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details,
        }
    }
}

impl From<StatsError> for HandlerErr {
    fn from(e: StatsError) -> HandlerErr {
        let code = match e.code.as_str() {
            "not_found" => "not_found",
            _ => "db_query_failed",
        };
        HandlerErr {
            code,
            message: e.message,
            details: e.details,
        }
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad(format!("missing {}", key), None))
}

fn parse_date_param(params: &serde_json::Value) -> Result<(String, NaiveDate), HandlerErr> {
    let raw = get_required_str(params, "date")?;
    let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
        HandlerErr::bad(
            "date must be an ISO date (YYYY-MM-DD)",
            Some(json!({ "date": raw })),
        )
    })?;
    Ok((raw, date))
}

fn period_bounds(period: &stats::PeriodRow) -> Result<(NaiveDate, NaiveDate), HandlerErr> {
    let start = NaiveDate::parse_from_str(&period.start_date, "%Y-%m-%d");
    let end = NaiveDate::parse_from_str(&period.end_date, "%Y-%m-%d");
    match (start, end) {
        (Ok(s), Ok(e)) => Ok((s, e)),
        _ => Err(HandlerErr {
            code: "server_error",
            message: "stored period dates are invalid".to_string(),
            details: None,
        }),
    }
}

/// Entry dates must fall inside the selected period's range.
fn ensure_date_in_period(
    date: NaiveDate,
    raw: &str,
    period: &stats::PeriodRow,
) -> Result<(), HandlerErr> {
    let (start, end) = period_bounds(period)?;
    if date < start || date > end {
        return Err(HandlerErr::bad(
            "date outside period range",
            Some(json!({
                "date": raw,
                "startDate": period.start_date,
                "endDate": period.end_date
            })),
        ));
    }
    Ok(())
}

fn attendance_day_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let period_id = get_required_str(params, "periodId")?;
    let (date_raw, _) = parse_date_param(params)?;

    stats::class_name(conn, &class_id)?;
    let period = stats::load_period(conn, &class_id, &period_id)?;
    let roster = stats::list_roster(conn, &class_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT student_id, status
             FROM attendance_records
             WHERE class_id = ? AND period_id = ? AND date = ?",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let recorded: Vec<(String, String)> = stmt
        .query_map((&class_id, &period_id, &date_raw), |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let by_student: HashMap<String, String> = recorded.into_iter().collect();

    let rows: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| {
            let has_record = by_student.contains_key(&s.id);
            let status = by_student
                .get(&s.id)
                .map(|label| AttendanceStatus::from_db_label(label))
                .unwrap_or(AttendanceStatus::DEFAULT);
            json!({
                "studentId": s.id,
                "displayName": s.display_name,
                "ci": s.ci,
                "status": status.token(),
                "hasRecord": has_record
            })
        })
        .collect();

    Ok(json!({
        "date": date_raw,
        "period": period,
        "rows": rows
    }))
}

fn attendance_bulk_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let period_id = get_required_str(params, "periodId")?;
    let (date_raw, date) = parse_date_param(params)?;

    stats::class_name(conn, &class_id)?;
    let period = stats::load_period(conn, &class_id, &period_id)?;
    ensure_date_in_period(date, &date_raw, &period)?;

    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad("missing entries", None));
    };

    // Validate the whole payload before touching the database; a rejected
    // save must leave stored state untouched.
    let mut parsed: Vec<(String, AttendanceStatus)> = Vec::with_capacity(entries.len());
    let mut problems: Vec<serde_json::Value> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let student_id = entry.get("studentId").and_then(|v| v.as_str());
        let status_raw = entry.get("status").and_then(|v| v.as_str());
        let Some(student_id) = student_id else {
            problems.push(json!({ "index": i, "field": "studentId", "message": "missing" }));
            continue;
        };
        let exists = conn
            .query_row(
                "SELECT 1 FROM students WHERE class_id = ? AND id = ?",
                (&class_id, student_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| HandlerErr {
                code: "db_query_failed",
                message: e.to_string(),
                details: None,
            })?
            .is_some();
        if !exists {
            problems.push(json!({
                "studentId": student_id,
                "field": "studentId",
                "message": "student not found in class"
            }));
            continue;
        }
        let Some(status_raw) = status_raw else {
            problems.push(json!({
                "studentId": student_id,
                "field": "status",
                "message": "missing"
            }));
            continue;
        };
        match AttendanceStatus::parse_token(status_raw) {
            Some(status) => parsed.push((student_id.to_string(), status)),
            None => problems.push(json!({
                "studentId": student_id,
                "field": "status",
                "message": format!("unknown status: {}", status_raw),
                "allowed": AttendanceStatus::TOKENS
            })),
        }
    }
    if !problems.is_empty() {
        return Err(HandlerErr::bad(
            "invalid attendance entries",
            Some(json!({ "errors": problems })),
        ));
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    for (student_id, status) in &parsed {
        tx.execute(
            "INSERT INTO attendance_records(class_id, period_id, student_id, date, status)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(class_id, period_id, student_id, date) DO UPDATE SET
               status = excluded.status",
            (&class_id, &period_id, student_id, &date_raw, status.db_label()),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "attendance_records" })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "saved": parsed.len(), "date": date_raw }))
}

fn attendance_stats_view(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let period_id = get_required_str(params, "periodId")?;
    let search = parse_search(params);
    let sort_key = AttendanceSortKey::parse(params.get("sortKey").and_then(|v| v.as_str()))
        .ok_or_else(|| {
            HandlerErr::bad(
                "unknown sortKey",
                Some(json!({ "allowed": AttendanceSortKey::TOKENS })),
            )
        })?;
    let dir = parse_dir(params).map_err(|d| HandlerErr::bad("sortDir must be asc or desc", Some(d)))?;

    let ctx = StatsContext {
        conn,
        class_id: &class_id,
        period_id: &period_id,
    };
    let period = stats::load_period(conn, &class_id, &period_id)?;
    let rows = stats::compute_attendance_stats(&ctx)?;
    let rows = view::apply(
        rows,
        &search,
        |r| (r.student_name.clone(), r.student_id.clone()),
        |r| sort_key.value(r),
        dir,
    );
    let summary = stats::attendance_summary(&rows);

    Ok(json!({
        "period": period,
        "rows": rows,
        "summary": summary
    }))
}

fn with_conn(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.dayOpen" => Some(with_conn(state, req, attendance_day_open)),
        "attendance.bulkUpsert" => Some(with_conn(state, req, attendance_bulk_upsert)),
        "attendance.stats" => Some(with_conn(state, req, attendance_stats_view)),
        _ => None,
    }
}
