use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

const PERIOD_TYPES: [&str; 2] = ["bimester", "trimester"];

fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn handle_periods_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let number = match req.params.get("number").and_then(|v| v.as_i64()) {
        Some(v) if v >= 1 => v,
        Some(_) => return err(&req.id, "bad_params", "number must be >= 1", None),
        None => return err(&req.id, "bad_params", "missing number", None),
    };
    let year = match req.params.get("year").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing year", None),
    };
    let period_type = match req.params.get("periodType").and_then(|v| v.as_str()) {
        Some(v) if PERIOD_TYPES.contains(&v) => v.to_string(),
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                "periodType must be one of: bimester, trimester",
                Some(json!({ "periodType": other, "allowed": PERIOD_TYPES })),
            )
        }
        None => return err(&req.id, "bad_params", "missing periodType", None),
    };
    let start_raw = match req.params.get("startDate").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing startDate", None),
    };
    let end_raw = match req.params.get("endDate").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing endDate", None),
    };
    let Some(start) = parse_iso_date(&start_raw) else {
        return err(
            &req.id,
            "bad_params",
            "startDate must be an ISO date (YYYY-MM-DD)",
            Some(json!({ "startDate": start_raw })),
        );
    };
    let Some(end) = parse_iso_date(&end_raw) else {
        return err(
            &req.id,
            "bad_params",
            "endDate must be an ISO date (YYYY-MM-DD)",
            Some(json!({ "endDate": end_raw })),
        );
    };
    if start > end {
        return err(
            &req.id,
            "bad_params",
            "startDate must not be after endDate",
            Some(json!({ "startDate": start_raw, "endDate": end_raw })),
        );
    }

    let class_known: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if class_known.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let period_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO periods(id, class_id, number, year, period_type, start_date, end_date)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &period_id,
            &class_id,
            number,
            year,
            &period_type,
            &start_raw,
            &end_raw,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "periods" })),
        );
    }

    ok(
        &req.id,
        json!({
            "periodId": period_id,
            "number": number,
            "year": year,
            "periodType": period_type,
            "startDate": start_raw,
            "endDate": end_raw
        }),
    )
}

fn handle_periods_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, number, year, period_type, start_date, end_date
         FROM periods
         WHERE class_id = ?
         ORDER BY year, number",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let periods = match stmt
        .query_map([&class_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "number": r.get::<_, i64>(1)?,
                "year": r.get::<_, i64>(2)?,
                "periodType": r.get::<_, String>(3)?,
                "startDate": r.get::<_, String>(4)?,
                "endDate": r.get::<_, String>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "periods": periods }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "periods.create" => Some(handle_periods_create(state, req)),
        "periods.list" => Some(handle_periods_list(state, req)),
        _ => None,
    }
}
