use chrono::Local;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

use crate::export::pdf::PdfLayout;
use crate::export::{self, Cell, Column, ExportFormat, Sheet};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{parse_dir, parse_search};
use crate::ipc::types::{AppState, Request};
use crate::stats::{
    self, AttendanceSortKey, AttendanceStat, FinalGrade, FinalSortKey, FinalSummary,
    GradeSortKey, GradeStat, GradeSummary, ParticipationSortKey, ParticipationStat,
    StatsContext,
};

use super::final_grades;

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

fn parse_format(req: &Request) -> Result<ExportFormat, serde_json::Value> {
    let raw = required_str(req, "format")?;
    ExportFormat::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "format must be one of: xlsx, csv, pdf",
            Some(json!({ "format": raw, "allowed": ExportFormat::TOKENS })),
        )
    })
}

fn parse_layout(req: &Request) -> Result<PdfLayout, serde_json::Value> {
    PdfLayout::parse(req.params.get("layout").and_then(|v| v.as_str())).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "layout must be table or plain",
            Some(json!({ "allowed": PdfLayout::TOKENS })),
        )
    })
}

fn parse_out_dir(req: &Request) -> Result<PathBuf, serde_json::Value> {
    required_str(req, "outDir").map(PathBuf::from)
}

fn timestamp_line() -> String {
    Local::now().format("%d/%m/%Y %H:%M").to_string()
}

fn period_type_label(period_type: &str) -> &str {
    match period_type {
        "bimester" => "Bimestre",
        "trimester" => "Trimestre",
        other => other,
    }
}

fn period_scope(period: &stats::PeriodRow) -> String {
    format!("periodo_{}", period.number)
}

fn period_line(period: &stats::PeriodRow) -> String {
    format!(
        "Período: {} {} - {}",
        period_type_label(&period.period_type),
        period.number,
        period.year
    )
}

// Shared projections: each domain builds its export sheet exactly once, and
// every output format consumes the same sheet.

fn attendance_sheet(class_name: &str, period: &stats::PeriodRow, rows: &[AttendanceStat]) -> Sheet {
    let summary = stats::attendance_summary(rows);
    Sheet {
        name: "Estadísticas Asistencia".to_string(),
        title: "ESTADÍSTICAS DE ASISTENCIA".to_string(),
        meta: vec![
            format!("Clase: {}", class_name),
            period_line(period),
            format!("Generado: {}", timestamp_line()),
            format!("Total estudiantes: {}", summary.student_count),
            format!("Promedio asistencia: {:.1}%", summary.average_percentage),
        ],
        columns: vec![
            Column::new("Estudiante", 25.0),
            Column::new("Presente", 10.0),
            Column::new("Faltas", 10.0),
            Column::new("Tardanzas", 10.0),
            Column::new("Total Días", 10.0),
            Column::new("% Asistencia", 12.0),
            Column::new("Estado", 12.0),
        ],
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    Cell::Text(r.student_name.clone()),
                    Cell::Int(r.present_count),
                    Cell::Int(r.absent_count),
                    Cell::Int(r.late_count),
                    Cell::Int(r.total_days),
                    Cell::Text(format!("{:.1}%", r.percentage)),
                    Cell::Text(r.label.to_string()),
                ]
            })
            .collect(),
    }
}

fn participation_sheet(
    class_name: &str,
    period: &stats::PeriodRow,
    rows: &[ParticipationStat],
) -> Sheet {
    let summary = stats::participation_summary(rows);
    Sheet {
        name: "Estadísticas Participación".to_string(),
        title: "ESTADÍSTICAS DE PARTICIPACIÓN".to_string(),
        meta: vec![
            format!("Clase: {}", class_name),
            period_line(period),
            format!("Generado: {}", timestamp_line()),
            format!("Total estudiantes: {}", summary.student_count),
            format!("Promedio general: {:.1}", summary.average_score),
        ],
        columns: vec![
            Column::new("Estudiante", 25.0),
            Column::new("Alta", 10.0),
            Column::new("Media", 10.0),
            Column::new("Baja", 10.0),
            Column::new("Total Días", 10.0),
            Column::new("Promedio", 10.0),
            Column::new("Nivel Promedio", 14.0),
        ],
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    Cell::Text(r.student_name.clone()),
                    Cell::Int(r.high_count),
                    Cell::Int(r.medium_count),
                    Cell::Int(r.low_count),
                    Cell::Int(r.total_days),
                    Cell::Number(r.average_score),
                    Cell::Text(r.average_level.to_string()),
                ]
            })
            .collect(),
    }
}

fn grades_sheet(
    class_name: &str,
    period: &stats::PeriodRow,
    rows: &[GradeStat],
    summary: &GradeSummary,
) -> Sheet {
    Sheet {
        name: "Estadísticas".to_string(),
        title: "ESTADÍSTICAS DE NOTAS POR PERÍODO".to_string(),
        meta: vec![
            format!("Clase: {}", class_name),
            period_line(period),
            format!("Generado: {}", timestamp_line()),
            format!("Total estudiantes: {}", summary.student_count),
            format!(
                "Aprobados: {} | Reprobados: {}",
                summary.approved_count, summary.failed_count
            ),
        ],
        columns: vec![
            Column::new("Estudiante", 25.0),
            Column::new("Ser (5)", 10.0),
            Column::new("Saber (45)", 12.0),
            Column::new("Hacer (40)", 12.0),
            Column::new("Decidir (5)", 12.0),
            Column::new("Autoevaluación (5)", 16.0),
            Column::new("Nota Total (100)", 15.0),
            Column::new("Estado", 12.0),
            Column::new("Calificación", 14.0),
        ],
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    Cell::Text(r.student_name.clone()),
                    Cell::Number(r.ser),
                    Cell::Number(r.saber),
                    Cell::Number(r.hacer),
                    Cell::Number(r.decidir),
                    Cell::Number(r.autoevaluacion),
                    Cell::Number(r.total),
                    Cell::Text(r.status.export_label().to_string()),
                    Cell::Text(r.label.to_string()),
                ]
            })
            .collect(),
    }
}

fn final_summary_sheet(class_name: &str, rows: &[FinalGrade], summary: &FinalSummary) -> Sheet {
    Sheet {
        name: "Notas Finales".to_string(),
        title: "NOTAS FINALES DE LA CLASE".to_string(),
        meta: vec![
            format!("Clase: {}", class_name),
            format!("Generado: {}", timestamp_line()),
            format!("Total estudiantes: {}", summary.student_count),
            format!(
                "Aprobados: {} | Reprobados: {}",
                summary.approved_count, summary.failed_count
            ),
            format!("Promedio general: {:.1}", summary.average_score),
        ],
        columns: vec![
            Column::new("Estudiante", 30.0),
            Column::new("Nota Final", 15.0),
            Column::new("Estado Final", 15.0),
            Column::new("Períodos Evaluados", 20.0),
            Column::new("Calificación", 15.0),
        ],
        rows: rows
            .iter()
            .map(|r| {
                let periods = if r.periods_count == 1 {
                    "1 período".to_string()
                } else {
                    format!("{} períodos", r.periods_count)
                };
                vec![
                    Cell::Text(r.student_name.clone()),
                    Cell::Number(r.final_score),
                    Cell::Text(r.final_status.export_label().to_string()),
                    Cell::Text(periods),
                    Cell::Text(r.label.to_string()),
                ]
            })
            .collect(),
    }
}

/// One row per (student, contributing period grade).
fn final_detail_sheet(rows: &[FinalGrade]) -> Sheet {
    let mut detail_rows: Vec<Vec<Cell>> = Vec::new();
    for r in rows {
        for line in &r.period_grades {
            detail_rows.push(vec![
                Cell::Text(r.student_name.clone()),
                Cell::Number(r.final_score),
                Cell::Text(r.final_status.export_label().to_string()),
                Cell::Text(r.label.to_string()),
                Cell::Text(period_type_label(&line.period_type).to_string()),
                Cell::Int(line.number),
                Cell::Number(line.total),
                Cell::Text(line.status.export_label().to_string()),
            ]);
        }
    }
    Sheet {
        name: "Detalle por Períodos".to_string(),
        title: "DETALLE POR PERÍODOS".to_string(),
        meta: vec![format!("Generado: {}", timestamp_line())],
        columns: vec![
            Column::new("Estudiante", 25.0),
            Column::new("Nota Final", 12.0),
            Column::new("Estado Final", 15.0),
            Column::new("Calificación Final", 16.0),
            Column::new("Tipo Período", 15.0),
            Column::new("Número", 10.0),
            Column::new("Nota Período", 12.0),
            Column::new("Estado Período", 15.0),
        ],
        rows: detail_rows,
    }
}

fn write_and_respond(
    req: &Request,
    out_dir: &PathBuf,
    file_name: &str,
    format: ExportFormat,
    layout: PdfLayout,
    sheets: &[Sheet],
    row_count: usize,
) -> serde_json::Value {
    match export::write_file(out_dir, file_name, format, sheets, layout) {
        Ok(path) => ok(
            &req.id,
            json!({
                "path": path.to_string_lossy(),
                "fileName": file_name,
                "format": format.extension(),
                "rowCount": row_count
            }),
        ),
        Err(e) => err(&req.id, "export_failed", format!("{e:#}"), None),
    }
}

fn handle_export_attendance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match required_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let format = match parse_format(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let layout = match parse_layout(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match parse_out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let search = parse_search(&req.params);
    let sort_key =
        match AttendanceSortKey::parse(req.params.get("sortKey").and_then(|v| v.as_str())) {
            Some(v) => v,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "unknown sortKey",
                    Some(json!({ "allowed": AttendanceSortKey::TOKENS })),
                )
            }
        };
    let dir = match parse_dir(&req.params) {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "sortDir must be asc or desc", Some(d)),
    };

    let class_name = match stats::class_name(conn, &class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let period = match stats::load_period(conn, &class_id, &period_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let ctx = StatsContext {
        conn,
        class_id: &class_id,
        period_id: &period_id,
    };
    let rows = match stats::compute_attendance_stats(&ctx) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let rows = crate::view::apply(
        rows,
        &search,
        |r| (r.student_name.clone(), r.student_id.clone()),
        |r| sort_key.value(r),
        dir,
    );

    let sheet = attendance_sheet(&class_name, &period, &rows);
    let scope = period_scope(&period);
    let file_name = export::file_name(
        "asistencia",
        &[&class_name, &scope],
        Local::now().date_naive(),
        format.extension(),
    );
    write_and_respond(req, &out_dir, &file_name, format, layout, &[sheet], rows.len())
}

fn handle_export_participation(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match required_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let format = match parse_format(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let layout = match parse_layout(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match parse_out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let search = parse_search(&req.params);
    let sort_key =
        match ParticipationSortKey::parse(req.params.get("sortKey").and_then(|v| v.as_str())) {
            Some(v) => v,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "unknown sortKey",
                    Some(json!({ "allowed": ParticipationSortKey::TOKENS })),
                )
            }
        };
    let dir = match parse_dir(&req.params) {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "sortDir must be asc or desc", Some(d)),
    };

    let class_name = match stats::class_name(conn, &class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let period = match stats::load_period(conn, &class_id, &period_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let ctx = StatsContext {
        conn,
        class_id: &class_id,
        period_id: &period_id,
    };
    let rows = match stats::compute_participation_stats(&ctx) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let rows = crate::view::apply(
        rows,
        &search,
        |r| (r.student_name.clone(), r.student_id.clone()),
        |r| sort_key.value(r),
        dir,
    );

    let sheet = participation_sheet(&class_name, &period, &rows);
    let scope = period_scope(&period);
    let file_name = export::file_name(
        "participacion",
        &[&class_name, &scope],
        Local::now().date_naive(),
        format.extension(),
    );
    write_and_respond(req, &out_dir, &file_name, format, layout, &[sheet], rows.len())
}

fn handle_export_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match required_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let format = match parse_format(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let layout = match parse_layout(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match parse_out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let search = parse_search(&req.params);
    let sort_key = match GradeSortKey::parse(req.params.get("sortKey").and_then(|v| v.as_str())) {
        Some(v) => v,
        None => {
            return err(
                &req.id,
                "bad_params",
                "unknown sortKey",
                Some(json!({ "allowed": GradeSortKey::TOKENS })),
            )
        }
    };
    let dir = match parse_dir(&req.params) {
        Ok(v) => v,
        Err(d) => return err(&req.id, "bad_params", "sortDir must be asc or desc", Some(d)),
    };

    let class_name = match stats::class_name(conn, &class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let period = match stats::load_period(conn, &class_id, &period_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let ctx = StatsContext {
        conn,
        class_id: &class_id,
        period_id: &period_id,
    };
    let rows = match stats::compute_grade_stats(&ctx) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let rows = crate::view::apply(
        rows,
        &search,
        |r| (r.student_name.clone(), r.student_id.clone()),
        |r| sort_key.value(r),
        dir,
    );
    let summary = stats::grade_summary(&rows);

    let sheet = grades_sheet(&class_name, &period, &rows, &summary);
    let scope = period_scope(&period);
    let file_name = export::file_name(
        "notas",
        &[&class_name, &scope],
        Local::now().date_naive(),
        format.extension(),
    );
    write_and_respond(req, &out_dir, &file_name, format, layout, &[sheet], rows.len())
}

fn handle_export_final_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let format = match parse_format(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let layout = match parse_layout(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match parse_out_dir(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let detailed = match req.params.get("mode").and_then(|v| v.as_str()) {
        None | Some("summary") => false,
        Some("detailed") => true,
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                "mode must be summary or detailed",
                Some(json!({ "mode": other, "allowed": ["summary", "detailed"] })),
            )
        }
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
    let status_filter = match final_grades::parse_status_filter(&req.params) {
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

    let class_name = match stats::class_name(conn, &class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let rows = match stats::compute_final_grades(conn, &class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let rows = final_grades::derive_final_view(rows, status_filter, &search, sort_key, dir);
    let summary = stats::final_summary(&rows);

    let domain = if detailed {
        "notas_finales_detallado"
    } else {
        "notas_finales"
    };
    let file_name = export::file_name(
        domain,
        &[&class_name],
        Local::now().date_naive(),
        format.extension(),
    );

    // The detailed workbook carries both sheets; csv and pdf serialize one
    // sheet, so they get the per-period detail directly in detailed mode.
    let sheets: Vec<Sheet> = if detailed {
        match format {
            ExportFormat::Xlsx => vec![
                final_summary_sheet(&class_name, &rows, &summary),
                final_detail_sheet(&rows),
            ],
            ExportFormat::Csv | ExportFormat::Pdf => vec![final_detail_sheet(&rows)],
        }
    } else {
        vec![final_summary_sheet(&class_name, &rows, &summary)]
    };

    write_and_respond(req, &out_dir, &file_name, format, layout, &sheets, rows.len())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.exportAttendance" => Some(handle_export_attendance(state, req)),
        "reports.exportParticipation" => Some(handle_export_participation(state, req)),
        "reports.exportGrades" => Some(handle_export_grades(state, req)),
        "reports.exportFinalGrades" => Some(handle_export_final_grades(state, req)),
        _ => None,
    }
}
