//! # Meter Report
//!
//! Turns cumulative electricity meter readings kept in a spreadsheet into a
//! monthly consumption report rendered as PDF.
//!
//! ## Pipeline
//!
//! - **Seam removal**: raw readings of one meter column are rebased to zero and
//!   summed increment by increment, so a meter replacement (two rows with the
//!   same date) does not show up as a jump
//! - **Resampling**: the high (VT) and low (MT) tariff series are linearly
//!   interpolated at every month start inside their observed range
//! - **Differencing**: consecutive month starts give the consumption per month
//! - **Report**: the last twelve months of every metering point next to the
//!   year before, and the difference between the first two metering points
//!
//! ## Example
//!
//! ```rust,ignore
//! use meter_report::*;
//! use chrono::NaiveDate;
//!
//! let config = ReportConfig::default();
//! let today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
//! generate_report(&config, "meritve.xlsx", "report.pdf", today)?;
//! ```

pub mod engine;
pub mod error;
pub mod formatting;
pub mod ingestion;
pub mod pdf;
pub mod render;
pub mod report;
pub mod schema;
pub mod seams;
pub mod utils;

pub use engine::{get_energy_diff, interpolate_month_starts};
pub use error::{MeterReportError, Result};
pub use formatting::pretty_float;
pub use ingestion::{Cell, Sheet, Workbook};
pub use pdf::PdfRenderer;
pub use render::{LineChart, ReportRenderer};
pub use report::{
    dataset_difference_rows, year_over_year_rows, DatasetDifferenceRow, DatasetSeries, Report,
    ReportBlock, ReportBuilder, TableData, YearOverYearRow,
};
pub use schema::*;
pub use seams::{pair_columns, remove_seams};

use chrono::NaiveDate;
use log::{debug, info};
use std::path::Path;

/// Reads the configured sheet of `input` and builds the report document.
pub fn build_report<P: AsRef<Path>>(
    config: &ReportConfig,
    input: P,
    generated_on: NaiveDate,
) -> Result<Report> {
    config.validate()?;

    let input = input.as_ref();
    info!("Reading meter readings from {}", input.display());

    let mut workbook = Workbook::open(input)?;
    debug!("Workbook sheets: {:?}", workbook.sheet_names());

    let sheet = workbook.sheet(&config.sheet_name)?;
    debug!(
        "Sheet '{}' has {} rows, readings start at row {}",
        sheet.name(),
        sheet.max_row(),
        config.data_start_row
    );

    ReportBuilder::new(config).build(&sheet, generated_on)
}

/// Full run: spreadsheet in, PDF out. Nothing is written if any stage fails.
pub fn generate_report<P: AsRef<Path>, Q: AsRef<Path>>(
    config: &ReportConfig,
    input: P,
    output: Q,
    generated_on: NaiveDate,
) -> Result<()> {
    let report = build_report(config, input, generated_on)?;

    let output = output.as_ref();
    let mut renderer = PdfRenderer::new(output);
    report.render(&mut renderer);
    renderer.save()?;

    info!(
        "Report with {} blocks written to {}",
        report.blocks.len(),
        output.display()
    );
    Ok(())
}
