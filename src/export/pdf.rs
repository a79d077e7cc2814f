//! Paginated-document export: a hand-assembled PDF (landscape A4) with a
//! structured table path (grid, shaded header band) and a plain fallback
//! path (fixed column positions, explicit page breaks). Text uses the
//! built-in Helvetica fonts with WinAnsi-compatible byte escapes, which
//! covers the Spanish labels the console produces.

use super::{Cell, Sheet};

const PAGE_W: f64 = 841.89; // A4 landscape, points
const PAGE_H: f64 = 595.28;
const MM: f64 = 72.0 / 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfLayout {
    Table,
    Plain,
}

impl PdfLayout {
    pub const TOKENS: [&'static str; 2] = ["table", "plain"];

    pub fn parse(raw: Option<&str>) -> Option<PdfLayout> {
        match raw {
            None | Some("table") => Some(PdfLayout::Table),
            Some("plain") => Some(PdfLayout::Plain),
            Some(_) => None,
        }
    }
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let code = c as u32;
        let byte = if code <= 0xFF { code as u8 } else { b'?' };
        match byte {
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7E => out.push(byte as char),
            _ => out.push_str(&format!("\\{:03o}", byte)),
        }
    }
    out
}

/// Content-stream builder. Coordinates are given in millimetres from the
/// top-left corner and converted to the PDF's bottom-left point space.
struct Doc {
    pages: Vec<String>,
    current: String,
}

impl Doc {
    fn new() -> Doc {
        Doc {
            pages: Vec::new(),
            current: String::new(),
        }
    }

    fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
    }

    fn text(&mut self, x_mm: f64, y_mm: f64, size: f64, bold: bool, s: &str) {
        let font = if bold { "F2" } else { "F1" };
        let x = x_mm * MM;
        let y = PAGE_H - y_mm * MM;
        self.current.push_str(&format!(
            "BT /{} {:.1} Tf {:.2} {:.2} Td ({}) Tj ET\n",
            font,
            size,
            x,
            y,
            escape_text(s)
        ));
    }

    fn text_rgb(&mut self, x_mm: f64, y_mm: f64, size: f64, bold: bool, rgb: (f64, f64, f64), s: &str) {
        self.current
            .push_str(&format!("{:.2} {:.2} {:.2} rg\n", rgb.0, rgb.1, rgb.2));
        self.text(x_mm, y_mm, size, bold, s);
        self.current.push_str("0 0 0 rg\n");
    }

    fn fill_rect(&mut self, x_mm: f64, y_mm: f64, w_mm: f64, h_mm: f64, rgb: (f64, f64, f64)) {
        let x = x_mm * MM;
        let y = PAGE_H - (y_mm + h_mm) * MM;
        self.current.push_str(&format!(
            "q {:.2} {:.2} {:.2} rg {:.2} {:.2} {:.2} {:.2} re f Q\n",
            rgb.0,
            rgb.1,
            rgb.2,
            x,
            y,
            w_mm * MM,
            h_mm * MM
        ));
    }

    fn stroke_rect(&mut self, x_mm: f64, y_mm: f64, w_mm: f64, h_mm: f64) {
        let x = x_mm * MM;
        let y = PAGE_H - (y_mm + h_mm) * MM;
        self.current.push_str(&format!(
            "q 0.5 w 0.6 G {:.2} {:.2} {:.2} {:.2} re S Q\n",
            x,
            y,
            w_mm * MM,
            h_mm * MM
        ));
    }

    fn finish(mut self) -> Vec<u8> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        let page_count = self.pages.len();

        let mut objects: Vec<String> = Vec::new();
        let kids: Vec<String> = (0..page_count)
            .map(|i| format!("{} 0 R", 5 + 2 * i))
            .collect();
        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        objects.push(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        ));
        objects.push(
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        );
        objects.push(
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
                .to_string(),
        );
        for content in &self.pages {
            let contents_num = objects.len() + 2;
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                PAGE_W,
                PAGE_H,
                contents_num
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}endstream",
                content.len(),
                content
            ));
        }

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets: Vec<usize> = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
        }
        let xref_offset = out.len();
        out.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
        out.push_str("0000000000 65535 f \n");
        for off in &offsets {
            out.push_str(&format!("{:010} 00000 n \n", off));
        }
        out.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        ));
        out.into_bytes()
    }
}

fn truncated(text: &str, width_mm: f64, size: f64) -> String {
    // Rough Helvetica advance: half the font size per character.
    let max_chars = ((width_mm * MM) / (0.5 * size)).max(1.0) as usize;
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

struct TableGeometry {
    col_x: Vec<f64>,
    col_w: Vec<f64>,
}

fn table_geometry(sheet: &Sheet, left: f64, right: f64) -> TableGeometry {
    let content_w = right - left;
    let total_hint: f64 = sheet.columns.iter().map(|c| c.width).sum();
    let total_hint = if total_hint > 0.0 {
        total_hint
    } else {
        sheet.columns.len().max(1) as f64
    };
    let mut col_x = Vec::with_capacity(sheet.columns.len());
    let mut col_w = Vec::with_capacity(sheet.columns.len());
    let mut x = left;
    for col in &sheet.columns {
        let w = content_w * col.width / total_hint;
        col_x.push(x);
        col_w.push(w);
        x += w;
    }
    TableGeometry { col_x, col_w }
}

fn page_header(doc: &mut Doc, sheet: &Sheet) -> f64 {
    let mut y = 20.0;
    if !sheet.title.is_empty() {
        let est_w = 0.5 * 18.0 * sheet.title.chars().count() as f64 / MM;
        let x = ((PAGE_W / MM) - est_w) / 2.0;
        doc.text(x.max(20.0), y, 18.0, true, &sheet.title);
        y = 35.0;
    }
    for line in &sheet.meta {
        doc.text(20.0, y, 11.0, false, line);
        y += 7.0;
    }
    y + 4.0
}

fn render_table(doc: &mut Doc, sheet: &Sheet) {
    const LEFT: f64 = 20.0;
    const RIGHT: f64 = 277.0;
    const ROW_H: f64 = 7.0;
    const BOTTOM: f64 = 195.0;
    const FONT: f64 = 8.0;

    let geo = table_geometry(sheet, LEFT, RIGHT);
    let mut y = page_header(doc, sheet);

    let draw_header = |doc: &mut Doc, y: f64| {
        doc.fill_rect(LEFT, y, RIGHT - LEFT, ROW_H, (0.16, 0.50, 0.73));
        for (c, col) in sheet.columns.iter().enumerate() {
            doc.text_rgb(
                geo.col_x[c] + 1.5,
                y + ROW_H - 2.0,
                FONT,
                true,
                (1.0, 1.0, 1.0),
                &truncated(&col.header, geo.col_w[c] - 2.0, FONT),
            );
            doc.stroke_rect(geo.col_x[c], y, geo.col_w[c], ROW_H);
        }
    };

    draw_header(doc, y);
    y += ROW_H;

    for (i, row) in sheet.rows.iter().enumerate() {
        if y + ROW_H > BOTTOM {
            doc.new_page();
            y = 20.0;
            draw_header(doc, y);
            y += ROW_H;
        }
        if i % 2 == 1 {
            doc.fill_rect(LEFT, y, RIGHT - LEFT, ROW_H, (0.96, 0.96, 0.96));
        }
        for (c, cell) in row.iter().enumerate() {
            if c >= geo.col_x.len() {
                break;
            }
            doc.text(
                geo.col_x[c] + 1.5,
                y + ROW_H - 2.0,
                FONT,
                false,
                &truncated(&cell.display(), geo.col_w[c] - 2.0, FONT),
            );
            doc.stroke_rect(geo.col_x[c], y, geo.col_w[c], ROW_H);
        }
        y += ROW_H;
    }
}

fn render_plain(doc: &mut Doc, sheet: &Sheet) {
    const LEFT: f64 = 20.0;
    const RIGHT: f64 = 277.0;
    const ROW_H: f64 = 6.0;
    const BOTTOM: f64 = 190.0;
    const FONT: f64 = 8.0;

    let geo = table_geometry(sheet, LEFT, RIGHT);
    let mut y = page_header(doc, sheet);

    for (c, col) in sheet.columns.iter().enumerate() {
        doc.text(
            geo.col_x[c],
            y,
            FONT,
            true,
            &truncated(&col.header.to_uppercase(), geo.col_w[c] - 2.0, FONT),
        );
    }
    y += ROW_H + 2.0;

    for row in &sheet.rows {
        for (c, cell) in row.iter().enumerate() {
            if c >= geo.col_x.len() {
                break;
            }
            doc.text(
                geo.col_x[c],
                y,
                FONT,
                false,
                &truncated(&cell.display(), geo.col_w[c] - 2.0, FONT),
            );
        }
        y += ROW_H;
        if y > BOTTOM {
            doc.new_page();
            y = 20.0;
        }
    }
}

pub fn render_sheet(sheet: &Sheet, layout: PdfLayout) -> Vec<u8> {
    let mut doc = Doc::new();
    match layout {
        PdfLayout::Table => render_table(&mut doc, sheet),
        PdfLayout::Plain => render_plain(&mut doc, sheet),
    }
    doc.finish()
}
