//! Minimal XLSX reader: enough of the package to pull row-aligned columns of
//! dates and numbers out of one worksheet.

use crate::error::{MeterReportError, Result};
use crate::utils::serial_to_datetime;
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d. %m. %Y", "%d.%m.%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

static EMPTY_CELL: Cell = Cell::Empty;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Date(NaiveDateTime),
    Error(String),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Numeric value of the cell; numeric text accepts `.` or `,` as decimal
    /// separator and spaces as digit grouping.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// Date of the cell. Plain numbers are read as spreadsheet serial dates.
    pub fn as_date(&self, date1904: bool) -> Option<NaiveDate> {
        match self {
            Cell::Date(dt) => Some(dt.date()),
            Cell::Number(n) => serial_to_datetime(*n, date1904).map(|dt| dt.date()),
            Cell::Text(s) => parse_date_text(s).map(|dt| dt.date()),
            _ => None,
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if compact.is_empty() {
        return None;
    }

    compact
        .parse::<f64>()
        .ok()
        .or_else(|| compact.replace(',', ".").parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Converts a column reference such as `B` or `AA` to its 1-based index.
pub fn column_index(letters: &str) -> Result<u32> {
    let trimmed = letters.trim();
    if trimmed.is_empty() || trimmed.len() > 3 {
        return Err(MeterReportError::InvalidColumn(letters.to_string()));
    }

    let mut index: u32 = 0;
    for ch in trimmed.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(MeterReportError::InvalidColumn(letters.to_string()));
        }
        index = index * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }

    // XFD is the last column of a worksheet
    if index > 16_384 {
        return Err(MeterReportError::InvalidColumn(letters.to_string()));
    }

    Ok(index)
}

/// Splits a cell reference such as `B12` into 1-based `(row, column)`.
fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let col = column_index(letters).ok()?;
    let row = digits.parse::<u32>().ok().filter(|r| *r > 0)?;
    Some((row, col))
}

/// A worksheet's cell values, addressed by 1-based row and column.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    cells: HashMap<(u32, u32), Cell>,
    max_row: u32,
    date1904: bool,
}

impl Sheet {
    pub fn new(name: &str, date1904: bool) -> Self {
        Self {
            name: name.to_string(),
            date1904,
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_row(&self) -> u32 {
        self.max_row
    }

    pub fn set_cell(&mut self, row: u32, col: u32, cell: Cell) {
        self.max_row = self.max_row.max(row);
        if !cell.is_empty() {
            self.cells.insert((row, col), cell);
        }
    }

    pub fn cell(&self, row: u32, col: u32) -> &Cell {
        self.cells.get(&(row, col)).unwrap_or(&EMPTY_CELL)
    }

    /// Cells of `column` from `start_row` through the last used row of the
    /// sheet. Columns of the same sheet always have the same length.
    pub fn column(&self, column: &str, start_row: u32) -> Result<Vec<Cell>> {
        let col = column_index(column)?;
        let start_row = start_row.max(1);

        Ok((start_row..=self.max_row)
            .map(|row| self.cell(row, col).clone())
            .collect())
    }

    pub fn date_column(&self, column: &str, start_row: u32) -> Result<Vec<Option<NaiveDate>>> {
        Ok(self
            .column(column, start_row)?
            .iter()
            .map(|cell| cell.as_date(self.date1904))
            .collect())
    }

    pub fn number_column(&self, column: &str, start_row: u32) -> Result<Vec<Option<f64>>> {
        let cells = self.column(column, start_row)?;
        let values = cells
            .iter()
            .enumerate()
            .map(|(offset, cell)| {
                let value = cell.as_number();
                if value.is_none() && !cell.is_empty() {
                    warn!(
                        "{}!{}{}: ignoring non-numeric reading {:?}",
                        self.name,
                        column,
                        start_row.max(1) as usize + offset,
                        cell
                    );
                }
                value
            })
            .collect();
        Ok(values)
    }
}

/// An opened XLSX package. Worksheets are parsed on demand.
pub struct Workbook<R> {
    archive: zip::ZipArchive<R>,
    shared_strings: Vec<String>,
    sheets: Vec<(String, String)>,
    date1904: bool,
}

impl Workbook<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> Workbook<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;

        if archive.by_name("[Content_Types].xml").is_err() {
            return Err(MeterReportError::InvalidFormat(
                "Missing [Content_Types].xml".into(),
            ));
        }

        let shared_strings = read_shared_strings(&mut archive)?;
        let (sheet_ids, date1904) = read_workbook_xml(&mut archive)?;
        let sheet_paths = read_workbook_rels(&mut archive)?;

        let sheets = sheet_ids
            .into_iter()
            .filter_map(|(name, r_id)| sheet_paths.get(&r_id).map(|path| (name, path.clone())))
            .collect::<Vec<_>>();

        debug!(
            "Workbook has {} sheets, {} shared strings, date1904={}",
            sheets.len(),
            shared_strings.len(),
            date1904
        );

        Ok(Self {
            archive,
            shared_strings,
            sheets,
            date1904,
        })
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn sheet(&mut self, name: &str) -> Result<Sheet> {
        let path = self
            .sheets
            .iter()
            .find(|(sheet_name, _)| sheet_name == name)
            .map(|(_, path)| path.clone())
            .ok_or_else(|| MeterReportError::SheetNotFound(name.to_string()))?;

        let mut sheet = Sheet::new(name, self.date1904);
        read_worksheet(&mut self.archive, &path, &self.shared_strings, &mut sheet)?;

        debug!("Read sheet '{}' with {} rows", name, sheet.max_row());
        Ok(sheet)
    }
}

fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|s| s.to_string()))
}

fn read_shared_strings<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<Vec<String>> {
    let mut strings = Vec::new();

    let file = match archive.by_name("xl/sharedStrings.xml") {
        Ok(f) => f,
        Err(_) => return Ok(strings),
    };

    let mut xml_reader = Reader::from_reader(BufReader::new(file));
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_t => current.push_str(&e.unescape()?),
            Ok(Event::Eof) => break,
            Err(e) => return Err(MeterReportError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

fn read_workbook_xml<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<(Vec<(String, String)>, bool)> {
    let file = archive
        .by_name("xl/workbook.xml")
        .map_err(|_| MeterReportError::MissingPart("xl/workbook.xml".into()))?;

    let mut xml_reader = Reader::from_reader(BufReader::new(file));
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut date1904 = false;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) => match e.name().as_ref() {
                b"sheet" => {
                    if let (Some(name), Some(r_id)) = (attribute(&e, b"name"), attribute(&e, b"r:id"))
                    {
                        sheets.push((name, r_id));
                    }
                }
                b"workbookPr" => {
                    date1904 = attribute(&e, b"date1904")
                        .map_or(false, |v| v == "1" || v.eq_ignore_ascii_case("true"));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(MeterReportError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, date1904))
}

fn read_workbook_rels<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<HashMap<String, String>> {
    let file = archive
        .by_name("xl/_rels/workbook.xml.rels")
        .map_err(|_| MeterReportError::MissingPart("xl/_rels/workbook.xml.rels".into()))?;

    let mut xml_reader = Reader::from_reader(BufReader::new(file));
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut rels = HashMap::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"Relationship" => {
                let id = attribute(&e, b"Id");
                let target = attribute(&e, b"Target");
                let rel_type = attribute(&e, b"Type");

                if let (Some(id), Some(target), Some(rel_type)) = (id, target, rel_type) {
                    if rel_type.ends_with("/worksheet") {
                        // Targets are relative to xl/ unless absolute
                        let full_path = match target.strip_prefix('/') {
                            Some(absolute) => absolute.to_string(),
                            None => format!("xl/{}", target),
                        };
                        rels.insert(id, full_path);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(MeterReportError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Position of a `<c>` element. Cells may omit `r`, in which case they follow
/// the previous cell of the row.
fn locate(e: &BytesStart, current_row: u32, last_col: &mut u32) -> (u32, u32) {
    let position = attribute(e, b"r")
        .and_then(|r| parse_cell_ref(&r))
        .unwrap_or((current_row.max(1), *last_col + 1));
    *last_col = position.1;
    position
}

#[derive(Default)]
struct PendingCell {
    position: Option<(u32, u32)>,
    cell_type: Option<String>,
    value: String,
    has_value: bool,
}

impl PendingCell {
    fn resolve(self, shared_strings: &[String]) -> Result<Cell> {
        if !self.has_value {
            return Ok(Cell::Empty);
        }

        let value = self.value;
        let cell = match self.cell_type.as_deref() {
            Some("s") => {
                let idx: usize = value.trim().parse().map_err(|_| {
                    MeterReportError::InvalidFormat(format!("bad shared string index '{}'", value))
                })?;
                let text = shared_strings.get(idx).ok_or_else(|| {
                    MeterReportError::InvalidFormat(format!(
                        "shared string index {} out of range",
                        idx
                    ))
                })?;
                Cell::Text(text.clone())
            }
            Some("inlineStr") | Some("str") => Cell::Text(value),
            Some("b") => Cell::Bool(value.trim() == "1"),
            Some("e") => Cell::Error(value),
            Some("d") => match parse_date_text(&value) {
                Some(dt) => Cell::Date(dt),
                None => Cell::Text(value),
            },
            _ => match value.trim().parse::<f64>() {
                Ok(n) => Cell::Number(n),
                Err(_) => Cell::Text(value),
            },
        };

        Ok(cell)
    }
}

fn read_worksheet<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    path: &str,
    shared_strings: &[String],
    sheet: &mut Sheet,
) -> Result<()> {
    let file = archive
        .by_name(path)
        .map_err(|_| MeterReportError::MissingPart(path.to_string()))?;

    let mut xml_reader = Reader::from_reader(BufReader::new(file));
    xml_reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current_row: u32 = 0;
    let mut last_col: u32 = 0;
    let mut pending: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_inline_text = false;

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"row" => {
                    current_row = attribute(&e, b"r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(current_row + 1);
                    last_col = 0;
                }
                b"c" => {
                    let position = locate(&e, current_row, &mut last_col);
                    pending = Some(PendingCell {
                        position: Some(position),
                        cell_type: attribute(&e, b"t"),
                        ..Default::default()
                    });
                }
                b"v" if pending.is_some() => in_value = true,
                b"t" if pending.is_some() => in_inline_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"row" => {
                    current_row = attribute(&e, b"r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(current_row + 1);
                    last_col = 0;
                }
                b"c" => {
                    let (row, col) = locate(&e, current_row, &mut last_col);
                    sheet.set_cell(row, col, Cell::Empty);
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_value || in_inline_text => {
                if let Some(cell) = pending.as_mut() {
                    cell.value.push_str(&e.unescape()?);
                    cell.has_value = true;
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"c" => {
                    if let Some(cell) = pending.take() {
                        if let Some((row, col)) = cell.position {
                            let value = cell.resolve(shared_strings)?;
                            sheet.set_cell(row, col, value);
                        }
                    }
                    in_value = false;
                    in_inline_text = false;
                }
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(MeterReportError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A").unwrap(), 1);
        assert_eq!(column_index("b").unwrap(), 2);
        assert_eq!(column_index("Z").unwrap(), 26);
        assert_eq!(column_index("AA").unwrap(), 27);
        assert_eq!(column_index("XFD").unwrap(), 16_384);
        assert!(column_index("").is_err());
        assert!(column_index("B2").is_err());
        assert!(column_index("XFE").is_err());
    }

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("B12"), Some((12, 2)));
        assert_eq!(parse_cell_ref("AB3"), Some((3, 28)));
        assert_eq!(parse_cell_ref("12"), None);
        assert_eq!(parse_cell_ref("C0"), None);
    }

    #[test]
    fn test_cell_as_number() {
        assert_eq!(Cell::Number(12.5).as_number(), Some(12.5));
        assert_eq!(Cell::Text("1 234,5".into()).as_number(), Some(1234.5));
        assert_eq!(Cell::Text(" 17.25 ".into()).as_number(), Some(17.25));
        assert_eq!(Cell::Text("n/a".into()).as_number(), None);
        assert_eq!(Cell::Bool(true).as_number(), None);
        assert_eq!(Cell::Empty.as_number(), None);
    }

    #[test]
    fn test_cell_as_date() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 1);
        assert_eq!(Cell::Number(44927.0).as_date(false), expected);
        assert_eq!(Cell::Number(43465.0).as_date(true), expected);
        assert_eq!(Cell::Text("2023-01-01".into()).as_date(false), expected);
        assert_eq!(Cell::Text("01. 01. 2023".into()).as_date(false), expected);
        assert_eq!(Cell::Text("1.1.2023".into()).as_date(false), expected);
        assert_eq!(
            Cell::Text("2023-01-01T08:30:00".into()).as_date(false),
            expected
        );
        assert_eq!(Cell::Text("soon".into()).as_date(false), None);
        assert_eq!(Cell::Empty.as_date(false), None);
    }

    #[test]
    fn test_sheet_columns_are_row_aligned() {
        let mut sheet = Sheet::new("Data", false);
        sheet.set_cell(2, 2, Cell::Number(44927.0));
        sheet.set_cell(3, 2, Cell::Number(44928.0));
        sheet.set_cell(2, 3, Cell::Number(10.0));
        sheet.set_cell(4, 3, Cell::Text("x".into()));

        let dates = sheet.date_column("B", 2).unwrap();
        let values = sheet.number_column("C", 2).unwrap();

        assert_eq!(dates.len(), 3);
        assert_eq!(values, vec![Some(10.0), None, None]);
        assert_eq!(dates[2], None);
        assert_eq!(sheet.cell(9, 9), &Cell::Empty);
    }

    #[test]
    fn test_pending_cell_resolution() {
        let strings = vec!["hello".to_string()];

        let cell = PendingCell {
            position: Some((1, 1)),
            cell_type: Some("s".into()),
            value: "0".into(),
            has_value: true,
        };
        assert_eq!(cell.resolve(&strings).unwrap(), Cell::Text("hello".into()));

        let cell = PendingCell {
            position: Some((1, 1)),
            cell_type: Some("s".into()),
            value: "3".into(),
            has_value: true,
        };
        assert!(cell.resolve(&strings).is_err());

        let cell = PendingCell {
            position: Some((1, 1)),
            cell_type: None,
            value: "42.5".into(),
            has_value: true,
        };
        assert_eq!(cell.resolve(&strings).unwrap(), Cell::Number(42.5));

        let cell = PendingCell {
            position: Some((1, 1)),
            cell_type: Some("b".into()),
            value: "1".into(),
            has_value: true,
        };
        assert_eq!(cell.resolve(&strings).unwrap(), Cell::Bool(true));

        let cell = PendingCell::default();
        assert_eq!(cell.resolve(&strings).unwrap(), Cell::Empty);
    }
}
