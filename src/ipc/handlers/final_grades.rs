use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{parse_dir, parse_search};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, FinalGrade, FinalSortKey, GradeStatus};
use crate::view::{self, SortDir};
use rusqlite::Connection;
use serde_json::json;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn parse_status_filter(
    params: &serde_json::Value,
) -> Result<Option<GradeStatus>, serde_json::Value> {
    match params.get("statusFilter").and_then(|v| v.as_str()) {
        None | Some("") => Ok(None),
        Some("approved") => Ok(Some(GradeStatus::Approved)),
        Some("failed") => Ok(Some(GradeStatus::Failed)),
        Some(other) => Err(json!({
            "statusFilter": other,
            "allowed": ["approved", "failed"]
        })),
    }
}

/// Status filter first, then the shared search/sort pipeline.
pub fn derive_final_view(
    rows: Vec<FinalGrade>,
    status_filter: Option<GradeStatus>,
    search: &str,
    sort_key: FinalSortKey,
    dir: SortDir,
) -> Vec<FinalGrade> {
    let rows: Vec<FinalGrade> = match status_filter {
        Some(status) => rows
            .into_iter()
            .filter(|r| r.final_status == status)
            .collect(),
        None => rows,
    };
    view::apply(
        rows,
        search,
        |r| (r.student_name.clone(), r.student_id.clone()),
        |r| sort_key.value(r),
        dir,
    )
}

fn handle_final_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let search = parse_search(&req.params);
    let sort_key = match FinalSortKey::parse(req.params.get("sortKey").and_then(|v| v.as_str())) {
        Some(v) => v,
        None => {
            return err(
                &req.id,
                "bad_params",
                "unknown sortKey",
                Some(json!({ "allowed": FinalSortKey::TOKENS })),
            )
        }
    };
    let dir = match parse_dir(&req.params) {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "sortDir must be asc or desc", Some(d)),
    };
    let status_filter = match parse_status_filter(&req.params) {
        Ok(v) => v,
        Err(d) => {
            return err(
                &req.id,
                "bad_params",
                "statusFilter must be approved or failed",
                Some(d),
            )
        }
    };

    let rows = match stats::compute_final_grades(conn, &class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let rows = derive_final_view(rows, status_filter, &search, sort_key, dir);
    let summary = stats::final_summary(&rows);

    ok(
        &req.id,
        json!({
            "rows": rows,
            "summary": summary
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "finalGrades.list" => Some(handle_final_grades_list(state, req)),
        _ => None,
    }
}
