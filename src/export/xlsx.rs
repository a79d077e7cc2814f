//! Spreadsheet export: a minimal OOXML workbook assembled directly into a
//! zip container. Inline strings only, one style for the bold title row and
//! one for the shaded header row, column widths from the projection hints.

use anyhow::Context;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{Cell, Sheet};

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";
const STYLE_DEFAULT: u32 = 0;
const STYLE_TITLE: u32 = 1;
const STYLE_HEADER: u32 = 2;

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// 0-based column index to spreadsheet letters (0 -> A, 26 -> AA).
fn col_letter(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn cell_ref(col: usize, row: usize) -> String {
    format!("{}{}", col_letter(col), row)
}

fn text_cell(col: usize, row: usize, style: u32, text: &str) -> String {
    format!(
        "<c r=\"{}\" s=\"{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
        cell_ref(col, row),
        style,
        escape_xml(text)
    )
}

fn number_cell(col: usize, row: usize, value: f64) -> String {
    format!("<c r=\"{}\" s=\"0\"><v>{}</v></c>", cell_ref(col, row), value)
}

fn content_types(sheet_count: usize) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str(
        "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
    );
    out.push_str(
        "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
    );
    out.push_str("<Default Extension=\"xml\" ContentType=\"application/xml\"/>");
    out.push_str(
        "<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    );
    for i in 1..=sheet_count {
        out.push_str(&format!(
            "<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
            i
        ));
    }
    out.push_str(
        "<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>",
    );
    out.push_str("</Types>");
    out
}

fn root_rels() -> String {
    let mut out = String::from(XML_DECL);
    out.push_str(
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    out.push_str(
        "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>",
    );
    out.push_str("</Relationships>");
    out
}

fn workbook_xml(sheets: &[Sheet]) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str(
        "<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
    );
    out.push_str("<sheets>");
    for (i, sheet) in sheets.iter().enumerate() {
        out.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
            escape_xml(&sheet.name),
            i + 1,
            i + 1
        ));
    }
    out.push_str("</sheets></workbook>");
    out
}

fn workbook_rels(sheet_count: usize) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str(
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for i in 1..=sheet_count {
        out.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{}.xml\"/>",
            i, i
        ));
    }
    out.push_str(&format!(
        "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>",
        sheet_count + 1
    ));
    out.push_str("</Relationships>");
    out
}

fn styles_xml() -> String {
    let mut out = String::from(XML_DECL);
    out.push_str(
        "<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
    );
    out.push_str(
        "<fonts count=\"2\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font><font><b/><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>",
    );
    out.push_str(
        "<fills count=\"3\"><fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill><fill><patternFill patternType=\"solid\"><fgColor rgb=\"FFEEEEEE\"/><bgColor indexed=\"64\"/></patternFill></fill></fills>",
    );
    out.push_str(
        "<borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>",
    );
    out.push_str(
        "<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>",
    );
    out.push_str("<cellXfs count=\"3\">");
    out.push_str("<xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>");
    out.push_str(
        "<xf numFmtId=\"0\" fontId=\"1\" fillId=\"0\" borderId=\"0\" xfId=\"0\" applyFont=\"1\"/>",
    );
    out.push_str(
        "<xf numFmtId=\"0\" fontId=\"1\" fillId=\"2\" borderId=\"0\" xfId=\"0\" applyFont=\"1\" applyFill=\"1\"/>",
    );
    out.push_str("</cellXfs></styleSheet>");
    out
}

fn worksheet_xml(sheet: &Sheet) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str(
        "<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
    );

    if !sheet.columns.is_empty() {
        out.push_str("<cols>");
        for (i, col) in sheet.columns.iter().enumerate() {
            out.push_str(&format!(
                "<col min=\"{}\" max=\"{}\" width=\"{}\" customWidth=\"1\"/>",
                i + 1,
                i + 1,
                col.width
            ));
        }
        out.push_str("</cols>");
    }

    out.push_str("<sheetData>");
    let mut row_idx = 1usize;

    if !sheet.title.is_empty() {
        out.push_str(&format!("<row r=\"{}\">", row_idx));
        out.push_str(&text_cell(0, row_idx, STYLE_TITLE, &sheet.title));
        out.push_str("</row>");
        row_idx += 1;
        for line in &sheet.meta {
            out.push_str(&format!("<row r=\"{}\">", row_idx));
            out.push_str(&text_cell(0, row_idx, STYLE_DEFAULT, line));
            out.push_str("</row>");
            row_idx += 1;
        }
        // Blank spacer row between the header block and the grid.
        row_idx += 1;
    }

    out.push_str(&format!("<row r=\"{}\">", row_idx));
    for (c, col) in sheet.columns.iter().enumerate() {
        out.push_str(&text_cell(c, row_idx, STYLE_HEADER, &col.header));
    }
    out.push_str("</row>");
    row_idx += 1;

    for row in &sheet.rows {
        out.push_str(&format!("<row r=\"{}\">", row_idx));
        for (c, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(s) => out.push_str(&text_cell(c, row_idx, STYLE_DEFAULT, s)),
                Cell::Int(n) => out.push_str(&number_cell(c, row_idx, *n as f64)),
                Cell::Number(x) => out.push_str(&number_cell(c, row_idx, *x)),
            }
        }
        out.push_str("</row>");
        row_idx += 1;
    }

    out.push_str("</sheetData></worksheet>");
    out
}

pub fn write_workbook(path: &Path, sheets: &[Sheet]) -> anyhow::Result<()> {
    let out_file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opts)
        .context("failed to start content types entry")?;
    zip.write_all(content_types(sheets.len()).as_bytes())
        .context("failed to write content types")?;

    zip.start_file("_rels/.rels", opts)
        .context("failed to start root relationships entry")?;
    zip.write_all(root_rels().as_bytes())
        .context("failed to write root relationships")?;

    zip.start_file("xl/workbook.xml", opts)
        .context("failed to start workbook entry")?;
    zip.write_all(workbook_xml(sheets).as_bytes())
        .context("failed to write workbook")?;

    zip.start_file("xl/_rels/workbook.xml.rels", opts)
        .context("failed to start workbook relationships entry")?;
    zip.write_all(workbook_rels(sheets.len()).as_bytes())
        .context("failed to write workbook relationships")?;

    zip.start_file("xl/styles.xml", opts)
        .context("failed to start styles entry")?;
    zip.write_all(styles_xml().as_bytes())
        .context("failed to write styles")?;

    for (i, sheet) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), opts)
            .context("failed to start worksheet entry")?;
        zip.write_all(worksheet_xml(sheet).as_bytes())
            .context("failed to write worksheet")?;
    }

    zip.finish().context("failed to finalize workbook")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::Column;

    #[test]
    fn column_letters() {
        assert_eq!(col_letter(0), "A");
        assert_eq!(col_letter(25), "Z");
        assert_eq!(col_letter(26), "AA");
        assert_eq!(col_letter(27), "AB");
        assert_eq!(cell_ref(1, 5), "B5");
    }

    #[test]
    fn worksheet_places_header_after_title_block() {
        let sheet = Sheet {
            name: "Resumen".to_string(),
            title: "NOTAS FINALES".to_string(),
            meta: vec!["Generado: hoy".to_string(), "Total: 2".to_string()],
            columns: vec![Column::new("Estudiante", 30.0), Column::new("Nota", 12.0)],
            rows: vec![vec![
                Cell::Text("Ana Lopez".to_string()),
                Cell::Number(87.5),
            ]],
        };
        let xml = worksheet_xml(&sheet);
        // Title row 1, meta rows 2-3, spacer 4, header row 5, data row 6.
        assert!(xml.contains("<row r=\"5\"><c r=\"A5\" s=\"2\""));
        assert!(xml.contains("<c r=\"B6\" s=\"0\"><v>87.5</v></c>"));
        assert!(xml.contains("width=\"30\""));
    }

    #[test]
    fn xml_text_is_escaped() {
        assert_eq!(escape_xml("a<b&\"c\""), "a&lt;b&amp;&quot;c&quot;");
    }
}
