use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{parse_dir, parse_search};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, GradeComponents, GradeSortKey, GradeStatus, StatsContext, StatsError};
use crate::view;
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

/// Component bounds for the five-part grade: ser/decidir/autoevaluacion 0-5,
/// saber 0-45, hacer 0-40.
const COMPONENT_BOUNDS: [(&str, f64); 5] = [
    ("ser", 5.0),
    ("saber", 45.0),
    ("hacer", 40.0),
    ("decidir", 5.0),
    ("autoevaluacion", 5.0),
];

fn parse_components(
    entry: &serde_json::Value,
    student_id: &str,
    problems: &mut Vec<serde_json::Value>,
) -> Option<GradeComponents> {
    let mut values = [0.0f64; 5];
    let mut valid = true;
    for (i, (field, max)) in COMPONENT_BOUNDS.iter().enumerate() {
        let value = entry.get(*field).and_then(|v| v.as_f64()).unwrap_or(0.0);
        if value < 0.0 || value > *max {
            problems.push(json!({
                "studentId": student_id,
                "field": field,
                "message": format!("{} must be between 0 and {}", field, max),
                "min": 0.0,
                "max": max,
                "value": value
            }));
            valid = false;
        }
        values[i] = value;
    }
    if !valid {
        return None;
    }
    Some(GradeComponents {
        ser: values[0],
        saber: values[1],
        hacer: values[2],
        decidir: values[3],
        autoevaluacion: values[4],
    })
}

fn grades_period_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let period_id = get_required_str(params, "periodId")?;

    stats::class_name(conn, &class_id)?;
    let period = stats::load_period(conn, &class_id, &period_id)?;
    let roster = stats::list_roster(conn, &class_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT student_id, ser, saber, hacer, decidir, autoevaluacion
             FROM period_grades
             WHERE class_id = ? AND period_id = ?",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let recorded: Vec<(String, GradeComponents)> = stmt
        .query_map((&class_id, &period_id), |r| {
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
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let by_student: HashMap<String, GradeComponents> = recorded.into_iter().collect();

    let zero = GradeComponents {
        ser: 0.0,
        saber: 0.0,
        hacer: 0.0,
        decidir: 0.0,
        autoevaluacion: 0.0,
    };
    let rows: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| {
            let has_record = by_student.contains_key(&s.id);
            let c = by_student.get(&s.id).copied().unwrap_or(zero);
            let total = c.total();
            json!({
                "studentId": s.id,
                "displayName": s.display_name,
                "ci": s.ci,
                "ser": c.ser,
                "saber": c.saber,
                "hacer": c.hacer,
                "decidir": c.decidir,
                "autoevaluacion": c.autoevaluacion,
                "total": total,
                "status": GradeStatus::of_total(total),
                "hasRecord": has_record
            })
        })
        .collect();

    Ok(json!({
        "period": period,
        "rows": rows
    }))
}

fn grades_bulk_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let period_id = get_required_str(params, "periodId")?;

    stats::class_name(conn, &class_id)?;
    stats::load_period(conn, &class_id, &period_id)?;

    let Some(entries) = params.get("grades").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad("missing grades", None));
    };

    // Validate every entry before writing anything.
    let mut parsed: Vec<(String, GradeComponents)> = Vec::with_capacity(entries.len());
    let mut problems: Vec<serde_json::Value> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let Some(student_id) = entry.get("studentId").and_then(|v| v.as_str()) else {
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
        if let Some(components) = parse_components(entry, student_id, &mut problems) {
            parsed.push((student_id.to_string(), components));
        }
    }
    if !problems.is_empty() {
        return Err(HandlerErr::bad(
            "invalid grade entries",
            Some(json!({ "errors": problems })),
        ));
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    for (student_id, c) in &parsed {
        tx.execute(
            "INSERT INTO period_grades(class_id, period_id, student_id,
                                       ser, saber, hacer, decidir, autoevaluacion)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(class_id, period_id, student_id) DO UPDATE SET
               ser = excluded.ser,
               saber = excluded.saber,
               hacer = excluded.hacer,
               decidir = excluded.decidir,
               autoevaluacion = excluded.autoevaluacion",
            (
                &class_id,
                &period_id,
                student_id,
                c.ser,
                c.saber,
                c.hacer,
                c.decidir,
                c.autoevaluacion,
            ),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "period_grades" })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "saved": parsed.len() }))
}

fn grades_stats_view(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let period_id = get_required_str(params, "periodId")?;
    let search = parse_search(params);
    let sort_key = GradeSortKey::parse(params.get("sortKey").and_then(|v| v.as_str()))
        .ok_or_else(|| {
            HandlerErr::bad(
                "unknown sortKey",
                Some(json!({ "allowed": GradeSortKey::TOKENS })),
            )
        })?;
    let dir =
        parse_dir(params).map_err(|d| HandlerErr::bad("sortDir must be asc or desc", Some(d)))?;

    let ctx = StatsContext {
        conn,
        class_id: &class_id,
        period_id: &period_id,
    };
    let period = stats::load_period(conn, &class_id, &period_id)?;
    let rows = stats::compute_grade_stats(&ctx)?;
    let rows = view::apply(
        rows,
        &search,
        |r| (r.student_name.clone(), r.student_id.clone()),
        |r| sort_key.value(r),
        dir,
    );
    let summary = stats::grade_summary(&rows);

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
        "grades.periodOpen" => Some(with_conn(state, req, grades_period_open)),
        "grades.bulkUpsert" => Some(with_conn(state, req, grades_bulk_upsert)),
        "grades.stats" => Some(with_conn(state, req, grades_stats_view)),
        _ => None,
    }
}
