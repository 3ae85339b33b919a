//! A small PDF 1.4 writer for the report: A4 pages with a repeated header,
//! wrapped paragraphs, grid tables and category line charts, all set in the
//! standard Helvetica font.

use crate::error::{MeterReportError, Result};
use crate::render::{LineChart, ReportRenderer};
use log::{debug, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const MM: f64 = 72.0 / 25.4;

const PAGE_WIDTH: f64 = 210.0 * MM;
const PAGE_HEIGHT: f64 = 297.0 * MM;

const FRAME_X: f64 = 20.0 * MM;
const FRAME_Y: f64 = 20.0 * MM;
const FRAME_WIDTH: f64 = 170.0 * MM;
const FRAME_HEIGHT: f64 = 227.0 * MM;

const HEADER_X: f64 = 20.0 * MM;
const HEADER_Y: f64 = 277.0 * MM;
const HEADER_FONT_SIZE: f64 = 12.0;
const HEADER_LEADING: f64 = 14.4;

const PARAGRAPH_FONT_SIZE: f64 = 12.0;
const PARAGRAPH_LEADING: f64 = 13.0;

const TABLE_SPACER: f64 = 3.0 * MM;
const TABLE_FONT_SIZE: f64 = 10.0;
const TABLE_ROW_HEIGHT: f64 = 18.0;
const TABLE_PADDING: f64 = 6.0;
const TABLE_GRID_WIDTH: f64 = 0.8;
const TABLE_HEADER_BACKGROUND: (f64, f64, f64) = (0.8471, 0.8941, 0.7373);

const CHART_FONT_SIZE: f64 = 7.0;
const CHART_TICKS: usize = 5;
const SERIES_COLORS: &[(f64, f64, f64)] = &[
    (0.80, 0.13, 0.13),
    (0.13, 0.40, 0.80),
    (0.13, 0.60, 0.27),
    (0.55, 0.55, 0.55),
    (0.90, 0.55, 0.10),
    (0.50, 0.20, 0.65),
];

/// Helvetica advance widths (1/1000 em) for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722,
    667, 611, 722, 667, 944, 667, 667, 611, // A-Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333,
    500, 278, 556, 500, 722, 500, 500, 500, // a-z
    334, 260, 334, 584, // {..~
];

fn text_width(text: &str, size: f64) -> f64 {
    let units: u32 = text
        .chars()
        .map(|c| match c as u32 {
            code @ 32..=126 => u32::from(HELVETICA_WIDTHS[(code - 32) as usize]),
            _ => 556,
        })
        .sum();
    f64::from(units) * size / 1000.0
}

/// Maps a character to its WinAnsiEncoding byte. Characters outside the
/// encoding fall back to their unaccented letter or `?`.
fn win_ansi_byte(c: char) -> u8 {
    match c {
        ' '..='~' => c as u8,
        '\u{a0}'..='\u{ff}' => c as u32 as u8,
        '€' => 0x80,
        '‚' => 0x82,
        '„' => 0x84,
        '…' => 0x85,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '–' => 0x96,
        '—' => 0x97,
        'š' => 0x9A,
        '›' => 0x9B,
        'ž' => 0x9E,
        'Č' | 'Ć' => b'C',
        'č' | 'ć' => b'c',
        'Đ' => b'D',
        'đ' => b'd',
        _ => b'?',
    }
}

fn pdf_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('(');
    for c in text.chars() {
        match win_ansi_byte(c) {
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\\' => out.push_str("\\\\"),
            byte @ 0x20..=0x7e => out.push(byte as char),
            byte => {
                let _ = write!(out, "\\{:03o}", byte);
            }
        }
    }
    out.push(')');
    out
}

/// Drawing operations of one page, in PDF user space (points, origin at the
/// bottom left).
#[derive(Debug, Default)]
struct PageCanvas {
    ops: String,
    has_content: bool,
}

impl PageCanvas {
    fn text(&mut self, x: f64, y: f64, size: f64, text: &str) {
        let _ = writeln!(
            self.ops,
            "BT /F1 {:.1} Tf {:.2} {:.2} Td {} Tj ET",
            size,
            x,
            y,
            pdf_string(text)
        );
    }

    fn text_right(&mut self, right: f64, y: f64, size: f64, text: &str) {
        self.text(right - text_width(text, size), y, size, text);
    }

    fn text_centered(&mut self, center: f64, y: f64, size: f64, text: &str) {
        self.text(center - text_width(text, size) / 2.0, y, size, text);
    }

    fn stroke_style(&mut self, color: (f64, f64, f64), width: f64, dashed: bool) {
        let dash = if dashed { "[2 2] 0 d" } else { "[] 0 d" };
        let _ = writeln!(
            self.ops,
            "{:.4} {:.4} {:.4} RG {:.2} w {}",
            color.0, color.1, color.2, width, dash
        );
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        let _ = writeln!(self.ops, "{:.2} {:.2} m {:.2} {:.2} l S", x1, y1, x2, y2);
    }

    fn polyline(&mut self, points: &[(f64, f64)]) {
        let Some(((x0, y0), rest)) = points.split_first() else {
            return;
        };
        let _ = write!(self.ops, "{:.2} {:.2} m", x0, y0);
        for (x, y) in rest {
            let _ = write!(self.ops, " {:.2} {:.2} l", x, y);
        }
        self.ops.push_str(" S\n");
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: (f64, f64, f64)) {
        let _ = writeln!(
            self.ops,
            "q {:.4} {:.4} {:.4} rg {:.2} {:.2} {:.2} {:.2} re f Q",
            color.0, color.1, color.2, x, y, width, height
        );
    }
}

#[derive(Debug, Clone)]
enum Flowable {
    Paragraph(String),
    Spacer(f64),
    Table {
        rows: Vec<Vec<String>>,
        column_widths: Vec<f64>,
    },
    Chart(LineChart),
    PageBreak,
}

/// Flows the story top to bottom through the frame of consecutive pages.
struct Layout<'a> {
    header: &'a [String],
    pages: Vec<PageCanvas>,
    cursor: f64,
}

impl<'a> Layout<'a> {
    fn new(header: &'a [String]) -> Self {
        let mut layout = Self {
            header,
            pages: Vec::new(),
            cursor: 0.0,
        };
        layout.start_page();
        layout
    }

    fn start_page(&mut self) {
        let mut page = PageCanvas::default();
        for (i, line) in self.header.iter().enumerate() {
            page.text(
                HEADER_X,
                HEADER_Y - i as f64 * HEADER_LEADING,
                HEADER_FONT_SIZE,
                line,
            );
        }
        self.pages.push(page);
        self.cursor = FRAME_Y + FRAME_HEIGHT;
    }

    fn page(&mut self) -> &mut PageCanvas {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn remaining(&self) -> f64 {
        self.cursor - FRAME_Y
    }

    fn page_is_empty(&self) -> bool {
        self.pages.last().map_or(true, |p| !p.has_content)
    }

    /// Starts a new page unless `height` fits below the cursor or the page is
    /// still empty.
    fn reserve(&mut self, height: f64) {
        if height > self.remaining() && !self.page_is_empty() {
            self.start_page();
        }
        if height > self.remaining() {
            warn!(
                "Block of {:.0}pt does not fit an empty page and will overflow",
                height
            );
        }
        self.page().has_content = true;
    }

    fn place(&mut self, flowable: &Flowable) {
        match flowable {
            Flowable::Paragraph(text) => self.place_paragraph(text),
            Flowable::Spacer(height) => {
                // Spacers vanish at page breaks
                self.cursor = (self.cursor - height).max(FRAME_Y);
            }
            Flowable::Table {
                rows,
                column_widths,
            } => self.place_table(rows, column_widths),
            Flowable::Chart(chart) => self.place_chart(chart),
            Flowable::PageBreak => {
                if !self.page_is_empty() {
                    self.start_page();
                }
            }
        }
    }

    fn place_paragraph(&mut self, text: &str) {
        let lines = wrap_text(text, PARAGRAPH_FONT_SIZE, FRAME_WIDTH);
        let height = lines.len() as f64 * PARAGRAPH_LEADING;
        self.reserve(height);

        let mut baseline = self.cursor - PARAGRAPH_FONT_SIZE;
        for line in &lines {
            self.page()
                .text(FRAME_X, baseline, PARAGRAPH_FONT_SIZE, line);
            baseline -= PARAGRAPH_LEADING;
        }
        self.cursor -= height;
    }

    /// Draws the table, splitting it across pages with the header row
    /// repeated on each part.
    fn place_table(&mut self, rows: &[Vec<String>], column_widths_mm: &[f64]) {
        let Some((header, body)) = rows.split_first() else {
            return;
        };
        let widths: Vec<f64> = column_widths_mm.iter().map(|w| w * MM).collect();

        let mut body = body;
        loop {
            let fitting = ((self.remaining() / TABLE_ROW_HEIGHT).floor() as usize).saturating_sub(1);
            if fitting == 0 && !body.is_empty() && !self.page_is_empty() {
                self.start_page();
                continue;
            }

            let take = fitting.max(1).min(body.len());
            let (chunk, rest) = body.split_at(take);
            self.reserve((chunk.len() + 1) as f64 * TABLE_ROW_HEIGHT);
            self.draw_table_part(header, chunk, &widths);

            if rest.is_empty() {
                break;
            }
            body = rest;
            self.start_page();
        }
    }

    fn draw_table_part(&mut self, header: &[String], body: &[Vec<String>], widths: &[f64]) {
        let top = self.cursor;
        let total_width: f64 = widths.iter().sum();
        let row_count = body.len() + 1;
        let bottom = top - row_count as f64 * TABLE_ROW_HEIGHT;
        let page = self.page();

        page.fill_rect(
            FRAME_X,
            top - TABLE_ROW_HEIGHT,
            total_width,
            TABLE_ROW_HEIGHT,
            TABLE_HEADER_BACKGROUND,
        );

        for (r, row) in std::iter::once(header).chain(body.iter().map(Vec::as_slice)).enumerate() {
            let baseline = top - r as f64 * TABLE_ROW_HEIGHT - TABLE_ROW_HEIGHT + 5.5;
            let mut x = FRAME_X;
            for (cell, width) in row.iter().zip(widths) {
                page.text(x + TABLE_PADDING, baseline, TABLE_FONT_SIZE, cell);
                x += width;
            }
        }

        page.stroke_style((0.0, 0.0, 0.0), TABLE_GRID_WIDTH, false);
        for r in 0..=row_count {
            let y = top - r as f64 * TABLE_ROW_HEIGHT;
            page.line(FRAME_X, y, FRAME_X + total_width, y);
        }
        let mut x = FRAME_X;
        page.line(x, top, x, bottom);
        for width in widths {
            x += width;
            page.line(x, top, x, bottom);
        }

        self.cursor = bottom;
    }

    fn place_chart(&mut self, chart: &LineChart) {
        let width = chart.width * MM;
        let height = chart.height * MM;
        self.reserve(height);

        let top = self.cursor;
        let bottom = top - height;
        draw_chart(self.page(), chart, FRAME_X, bottom, width, height);
        self.cursor = bottom;
    }
}

fn wrap_text(text: &str, size: f64, max_width: f64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if text_width(&candidate, size) > max_width && !current.is_empty() {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn draw_chart(page: &mut PageCanvas, chart: &LineChart, x: f64, y: f64, width: f64, height: f64) {
    let plot_left = x + 18.0 * MM;
    let plot_right = x + width - 4.0 * MM;
    let plot_bottom = y + 20.0 * MM;
    let plot_top = y + height - 4.0 * MM;
    let plot_width = plot_right - plot_left;
    let plot_height = plot_top - plot_bottom;

    let axis = chart.value_axis(CHART_TICKS);
    let span = axis.max - axis.min;
    let to_y = |value: f64| {
        let clamped = value.clamp(axis.min, axis.max);
        plot_bottom + (clamped - axis.min) / span * plot_height
    };

    // value grid and labels
    for tick in axis.ticks() {
        let ty = to_y(tick);
        page.stroke_style((0.8, 0.8, 0.8), 0.4, true);
        page.line(plot_left, ty, plot_right, ty);
        page.text_right(
            plot_left - 2.0,
            ty - CHART_FONT_SIZE / 3.0,
            CHART_FONT_SIZE,
            &axis.label(tick),
        );
    }

    page.stroke_style((0.0, 0.0, 0.0), 0.6, false);
    page.line(plot_left, plot_bottom, plot_left, plot_top);
    page.line(plot_left, plot_bottom, plot_right, plot_bottom);

    let categories = chart
        .labels
        .len()
        .max(chart.series.iter().map(Vec::len).max().unwrap_or(0));
    if categories > 0 {
        let slot = plot_width / categories as f64;
        let to_x = |i: usize| plot_left + (i as f64 + 0.5) * slot;

        for (i, label) in chart.labels.iter().enumerate() {
            page.text_centered(
                to_x(i),
                plot_bottom - CHART_FONT_SIZE - 3.0,
                CHART_FONT_SIZE,
                label,
            );
        }

        for (s, values) in chart.series.iter().enumerate() {
            let color = SERIES_COLORS[s % SERIES_COLORS.len()];
            let points: Vec<(f64, f64)> = values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(i, v)| (to_x(i), to_y(*v)))
                .collect();
            page.stroke_style(color, 1.2, false);
            page.polyline(&points);
        }
    }

    // legend below the category labels
    let legend_y = y + 6.0 * MM;
    let mut legend_x = plot_left;
    for (s, name) in chart.series_names.iter().enumerate() {
        let color = SERIES_COLORS[s % SERIES_COLORS.len()];
        page.stroke_style(color, 2.0, false);
        page.line(
            legend_x,
            legend_y + CHART_FONT_SIZE / 3.0,
            legend_x + 6.0 * MM,
            legend_y + CHART_FONT_SIZE / 3.0,
        );
        page.text(legend_x + 8.0 * MM, legend_y, CHART_FONT_SIZE, name);
        legend_x += 8.0 * MM + text_width(name, CHART_FONT_SIZE) + 6.0 * MM;
    }
}

/// Collects report blocks and writes them as a PDF on [`ReportRenderer::save`].
pub struct PdfRenderer {
    path: PathBuf,
    header: Option<Vec<String>>,
    story: Vec<Flowable>,
}

impl PdfRenderer {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            header: None,
            story: Vec::new(),
        }
    }

    /// Lays out the story and serializes the document.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = self.header.as_deref().ok_or(MeterReportError::MissingHeader)?;

        let mut layout = Layout::new(header);
        for flowable in &self.story {
            layout.place(flowable);
        }

        let title = header.first().map(String::as_str).unwrap_or("");
        Ok(serialize_document(&layout.pages, title))
    }
}

impl ReportRenderer for PdfRenderer {
    fn set_header(&mut self, lines: &[String]) {
        self.header = Some(lines.to_vec());
    }

    fn add_paragraph(&mut self, text: &str) {
        self.story.push(Flowable::Paragraph(text.to_string()));
    }

    fn add_table(&mut self, rows: &[Vec<String>], column_widths: &[f64]) {
        self.story.push(Flowable::Spacer(TABLE_SPACER));
        self.story.push(Flowable::Table {
            rows: rows.to_vec(),
            column_widths: column_widths.to_vec(),
        });
        self.story.push(Flowable::Spacer(TABLE_SPACER));
    }

    fn add_line_chart(&mut self, chart: &LineChart) {
        self.story.push(Flowable::Chart(chart.clone()));
    }

    fn new_page(&mut self) {
        self.story.push(Flowable::PageBreak);
    }

    fn save(&mut self) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(&self.path, &bytes)?;
        debug!("Wrote {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

fn serialize_document(pages: &[PageCanvas], title: &str) -> Vec<u8> {
    const CATALOG: usize = 1;
    const PAGES: usize = 2;
    const FONT: usize = 3;
    const INFO: usize = 4;
    let first_page = 5;

    let mut objects: Vec<String> = Vec::with_capacity(4 + pages.len() * 2);
    objects.push(format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES));

    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", first_page + i * 2))
        .collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );
    objects.push(format!(
        "<< /Producer (meter-report) /Title {} >>",
        pdf_string(title)
    ));

    for (i, page) in pages.iter().enumerate() {
        let contents = first_page + i * 2 + 1;
        objects.push(format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {:.2} {:.2}] \
             /Resources << /Font << /F1 {} 0 R >> >> /Contents {} 0 R >>",
            PAGES, PAGE_WIDTH, PAGE_HEIGHT, FONT, contents
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            page.ops.len(),
            page.ops
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, object);
    }

    let xref = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(out, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        CATALOG,
        INFO,
        xref
    );

    out.into_bytes()
}
