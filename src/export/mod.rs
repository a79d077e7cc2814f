//! Report export model. Every domain builds its export exactly once as a
//! [`Sheet`] (or a pair of sheets for the detailed final-grades mode); the
//! xlsx, csv, and pdf writers all consume that same projection, so the
//! figures in the three formats cannot disagree.

pub mod csv;
pub mod pdf;
pub mod xlsx;

use anyhow::Context;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub const TOKENS: [&'static str; 3] = ["xlsx", "csv", "pdf"];

    pub fn parse(raw: &str) -> Option<ExportFormat> {
        match raw {
            "xlsx" => Some(ExportFormat::Xlsx),
            "csv" => Some(ExportFormat::Csv),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Cell {
    Text(String),
    Int(i64),
    /// Shown with one decimal everywhere, matching the console's number
    /// formatting.
    Number(f64),
}

impl Cell {
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Int(n) => n.to_string(),
            Cell::Number(x) => format!("{:.1}", x),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    /// Width hint in character units (spreadsheet `wch`); the pdf table
    /// divides its content width proportionally by the same hints.
    pub width: f64,
}

impl Column {
    pub fn new(header: &str, width: f64) -> Column {
        Column {
            header: header.to_string(),
            width,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    /// Title and meta lines render above the grid in xlsx and pdf; the csv
    /// format carries only the column set and rows.
    pub title: String,
    pub meta: Vec<String>,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

/// Deterministic export name: `<domain>_<scope parts>_<ISO date>.<ext>`.
/// Re-exporting on the same day overwrites; that is intentional.
pub fn file_name(domain: &str, scope: &[&str], date: NaiveDate, ext: &str) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(scope.len() + 2);
    parts.push(domain.to_string());
    for s in scope {
        let cleaned = sanitize_scope(s);
        if !cleaned.is_empty() {
            parts.push(cleaned);
        }
    }
    parts.push(date.format("%Y-%m-%d").to_string());
    format!("{}.{}", parts.join("_"), ext)
}

fn sanitize_scope(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Write the projection in the requested format. `sheets` must be non-empty;
/// csv and pdf serialize the first (primary) sheet, xlsx writes them all.
pub fn write_file(
    out_dir: &Path,
    name: &str,
    format: ExportFormat,
    sheets: &[Sheet],
    layout: pdf::PdfLayout,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create directory {}", out_dir.to_string_lossy()))?;
    let path = out_dir.join(name);
    match format {
        ExportFormat::Xlsx => xlsx::write_workbook(&path, sheets)?,
        ExportFormat::Csv => {
            let sheet = sheets.first().context("no sheet to export")?;
            csv::write_sheet(&path, sheet)?;
        }
        ExportFormat::Pdf => {
            let sheet = sheets.first().context("no sheet to export")?;
            let bytes = pdf::render_sheet(sheet, layout);
            std::fs::write(&path, bytes)
                .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_embeds_domain_scope_and_date() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        assert_eq!(
            file_name("asistencia", &["3A", "periodo_2"], date, "xlsx"),
            "asistencia_3A_periodo_2_2026-08-06.xlsx"
        );
    }

    #[test]
    fn file_name_sanitizes_scope_parts() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let name = file_name("notas", &["5to B/Mat"], date, "csv");
        assert_eq!(name, "notas_5to_B_Mat_2026-01-02.csv");
    }

    #[test]
    fn number_cells_display_one_decimal() {
        assert_eq!(Cell::Number(85.0).display(), "85.0");
        assert_eq!(Cell::Number(50.95).display(), "50.9");
        assert_eq!(Cell::Int(7).display(), "7");
    }
}
