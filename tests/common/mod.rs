#![allow(dead_code)]

use chrono::{Months, NaiveDate};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn serial(d: NaiveDate) -> i64 {
    (d - date(1899, 12, 30)).num_days()
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Sheet rows as `(row, [(cell ref column, cell xml body)])`.
pub struct Fixture {
    pub sheet_name: String,
    pub date1904: bool,
    pub shared_strings: Vec<String>,
    pub rows: Vec<(u32, Vec<String>)>,
}

impl Fixture {
    pub fn new(sheet_name: &str) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            date1904: false,
            shared_strings: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, row: u32) -> &mut Vec<String> {
        if !self.rows.iter().any(|(r, _)| *r == row) {
            self.rows.push((row, Vec::new()));
            self.rows.sort_by_key(|(r, _)| *r);
        }
        let idx = self.rows.iter().position(|(r, _)| *r == row).unwrap();
        &mut self.rows[idx].1
    }

    pub fn number(&mut self, col: &str, row: u32, value: f64) -> &mut Self {
        let cell = format!(r#"<c r="{}{}"><v>{}</v></c>"#, col, row, value);
        self.row(row).push(cell);
        self
    }

    pub fn shared(&mut self, col: &str, row: u32, text: &str) -> &mut Self {
        self.shared_strings.push(text.to_string());
        let idx = self.shared_strings.len() - 1;
        let cell = format!(r#"<c r="{}{}" t="s"><v>{}</v></c>"#, col, row, idx);
        self.row(row).push(cell);
        self
    }

    pub fn inline(&mut self, col: &str, row: u32, text: &str) -> &mut Self {
        let cell = format!(
            r#"<c r="{}{}" t="inlineStr"><is><t>{}</t></is></c>"#,
            col,
            row,
            xml_escape(text)
        );
        self.row(row).push(cell);
        self
    }

    pub fn write(&self, path: &Path) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();

        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(CONTENT_TYPES.as_bytes()).unwrap();

        zip.start_file("xl/workbook.xml", options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<workbookPr date1904="{}"/>
<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#,
            if self.date1904 { "1" } else { "0" },
            xml_escape(&self.sheet_name)
        )
        .unwrap();

        zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
        zip.write_all(RELS.as_bytes()).unwrap();

        zip.start_file("xl/sharedStrings.xml", options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
            self.shared_strings.len()
        )
        .unwrap();
        for s in &self.shared_strings {
            write!(zip, "<si><t>{}</t></si>", xml_escape(s)).unwrap();
        }
        zip.write_all(b"</sst>").unwrap();

        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        )
        .unwrap();
        for (row, cells) in &self.rows {
            write!(zip, r#"<row r="{}">{}</row>"#, row, cells.concat()).unwrap();
        }
        zip.write_all(b"</sheetData></worksheet>").unwrap();

        zip.finish().unwrap();
    }
}

/// Two metering points read monthly on the 1st from January 2021 to July
/// 2023. Point A's VT meter is replaced on 2021-11-01: that day has two rows,
/// the old meter's last reading followed by the new meter's first.
pub fn meter_fixture() -> Fixture {
    let mut fixture = Fixture::new("Vnos meritev");
    fixture
        .inline("A", 1, "Skupni prostori")
        .shared("B", 5, "Datum")
        .shared("C", 5, "42A VT")
        .shared("F", 5, "42A MT")
        .shared("I", 5, "42B VT")
        .shared("L", 5, "42B MT");

    let start = date(2021, 1, 1);
    let mut row = 6;
    for i in 0..=30u32 {
        let day = start + Months::new(i);
        let m = f64::from(i);

        let a_mt = 500.0 + 50.0 * m;
        let b_vt = 2_000.0 + 120.0 * m;
        let b_mt = 800.0 + 40.0 * m;

        if i == 10 {
            // old meter's last reading
            fixture
                .number("B", row, serial(day) as f64)
                .number("C", row, 1_000.0 + 100.0 * m)
                .number("F", row, a_mt)
                .number("I", row, b_vt)
                .number("L", row, b_mt);
            row += 1;
        }

        let a_vt = if i < 10 {
            1_000.0 + 100.0 * m
        } else {
            5.0 + 100.0 * (m - 10.0)
        };

        fixture
            .number("B", row, serial(day) as f64)
            .number("C", row, a_vt)
            .number("F", row, a_mt)
            .number("I", row, b_vt)
            .number("L", row, b_mt);
        row += 1;
    }

    fixture
}

pub fn write_fixture(dir: &TempDir, fixture: &Fixture) -> PathBuf {
    let path = dir.path().join("meritve.xlsx");
    fixture.write(&path);
    path
}
