use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeterReportError {
    #[error("Column length mismatch: date column has {dates} rows, value column has {values}")]
    InputShape { dates: usize, values: usize },

    #[error("No readings to reconstruct a series from")]
    EmptySeries,

    #[error("Sheet '{sheet}' has no rows at or below data_start_row {start_row}")]
    NoReadings { sheet: String, start_row: u32 },

    #[error("No usable date in the first data row of the date column")]
    MissingSeedDate,

    #[error("VT series spans {vt_start}..{vt_end} but MT series spans {mt_start}..{mt_end}")]
    DomainMismatch {
        vt_start: NaiveDate,
        vt_end: NaiveDate,
        mt_start: NaiveDate,
        mt_end: NaiveDate,
    },

    #[error("Interpolation error: {0}")]
    Interpolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid column reference '{0}'")]
    InvalidColumn(String),

    #[error("Sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error("Invalid XLSX format: {0}")]
    InvalidFormat(String),

    #[error("Missing required part: {0}")]
    MissingPart(String),

    #[error("Report header was never set; call set_header before saving")]
    MissingHeader,

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MeterReportError>;
