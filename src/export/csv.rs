//! Delimited-text export: the primary sheet's column set, every field
//! quoted, comma-separated, newline-terminated rows, UTF-8.

use anyhow::Context;
use std::path::Path;

use super::Sheet;

pub fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Parse one quoted record; the inverse of the writer's row encoding.
/// Used by the round-trip tests and kept total for any input line.
pub fn parse_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    fields.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            }
        }
    }
    fields.push(current);
    fields
}

pub fn render_sheet(sheet: &Sheet) -> String {
    let mut out = String::new();
    let header: Vec<String> = sheet.columns.iter().map(|c| quote(&c.header)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &sheet.rows {
        let fields: Vec<String> = row.iter().map(|c| quote(&c.display())).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

pub fn write_sheet(path: &Path, sheet: &Sheet) -> anyhow::Result<()> {
    std::fs::write(path, render_sheet(sheet))
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))
}
