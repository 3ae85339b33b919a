use crate::engine::{get_energy_diff, interpolate_month_starts};
use crate::error::{MeterReportError, Result};
use crate::formatting::{consumption_month_label, date_to_string, pretty_float};
use crate::ingestion::Sheet;
use crate::render::{LineChart, ReportRenderer};
use crate::schema::{DatasetConfig, MonthlyDelta, MonthlyPoint, RawReading, ReportConfig, TimePoint};
use crate::seams::{pair_columns, remove_seams};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

const CHART_WIDTH_MM: f64 = 170.0;
const CHART_HEIGHT_MM: f64 = 120.0;
const MONTHS_PER_YEAR: usize = 12;

const DIFFERENCE_HEADER: [&str; 4] = [
    "Datum meritve",
    "razlika VT [kWh]",
    "razlika MT [kWh]",
    "razlika skupno [kWh]",
];

/// Everything the pipeline derives for one metering point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSeries {
    pub title: String,
    pub vt: Vec<TimePoint>,
    pub mt: Vec<TimePoint>,
    pub months: Vec<MonthlyPoint>,
    pub deltas: Vec<MonthlyDelta>,
}

impl DatasetSeries {
    pub fn from_readings(title: &str, vt: &[RawReading], mt: &[RawReading]) -> Result<Self> {
        debug!("{}: reconstructing VT series from {} rows", title, vt.len());
        let vt = remove_seams(vt)?;
        debug!("{}: reconstructing MT series from {} rows", title, mt.len());
        let mt = remove_seams(mt)?;

        let months = interpolate_month_starts(&vt, &mt)?;
        let deltas = get_energy_diff(&months);

        Ok(Self {
            title: title.to_string(),
            vt,
            mt,
            months,
            deltas,
        })
    }

    pub fn from_sheet(sheet: &Sheet, config: &ReportConfig, dataset: &DatasetConfig) -> Result<Self> {
        let start_row = config.data_start_row;
        let dates = sheet.date_column(&config.date_column, start_row)?;
        let vt_values = sheet.number_column(&dataset.vt_column, start_row)?;
        let mt_values = sheet.number_column(&dataset.mt_column, start_row)?;

        if dates.is_empty() {
            return Err(MeterReportError::NoReadings {
                sheet: sheet.name().to_string(),
                start_row,
            });
        }

        if let (Some(date), Some(vt), Some(mt)) = (dates.first(), vt_values.first(), mt_values.first())
        {
            debug!("{} - {:?}: vt {:?}, mt {:?}", dataset.title, date, vt, mt);
        }

        let vt = pair_columns(&dates, &vt_values)?;
        let mt = pair_columns(&dates, &mt_values)?;
        Self::from_readings(&dataset.title, &vt, &mt)
    }
}

/// A month of the current year next to the same position one year earlier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearOverYearRow {
    pub date: NaiveDate,
    pub vt: f64,
    pub mt: f64,
    pub total: f64,
    pub total_last_year: f64,
    pub total_change: f64,
}

/// Difference B - A of two metering points for one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatasetDifferenceRow {
    pub date: NaiveDate,
    pub vt_diff: f64,
    pub mt_diff: f64,
    pub total_diff: f64,
}

fn last_year(deltas: &[MonthlyDelta]) -> &[MonthlyDelta] {
    &deltas[deltas.len().saturating_sub(MONTHS_PER_YEAR)..]
}

/// Pairs the last 12 deltas with the up to 12 deltas preceding them.
///
/// Pairing is positional and stops at the shorter slice, so with fewer than
/// 13 deltas there is nothing to compare against and no rows are returned.
pub fn year_over_year_rows(deltas: &[MonthlyDelta]) -> Vec<YearOverYearRow> {
    let n = deltas.len();
    let current = last_year(deltas);
    let previous = &deltas[n.saturating_sub(2 * MONTHS_PER_YEAR)..n.saturating_sub(MONTHS_PER_YEAR)];

    current
        .iter()
        .zip(previous)
        .map(|(now, before)| YearOverYearRow {
            date: now.date,
            vt: now.vt_delta,
            mt: now.mt_delta,
            total: now.total(),
            total_last_year: before.total(),
            total_change: now.total() - before.total(),
        })
        .collect()
}

pub fn dataset_difference_rows(a: &[MonthlyDelta], b: &[MonthlyDelta]) -> Vec<DatasetDifferenceRow> {
    last_year(a)
        .iter()
        .zip(last_year(b))
        .map(|(a, b)| DatasetDifferenceRow {
            date: a.date,
            vt_diff: b.vt_delta - a.vt_delta,
            mt_diff: b.mt_delta - a.mt_delta,
            total_diff: b.total() - a.total(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    /// The first row is the header.
    pub rows: Vec<Vec<String>>,
    pub column_widths_mm: Vec<f64>,
}

fn header_row(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

pub fn last_12_entries_table(rows: &[YearOverYearRow]) -> TableData {
    let mut table = vec![header_row(&[
        "Datum meritve",
        "visoka tarifa [kWh]",
        "nizka tarifa [kWh]",
        "skupaj [kWh]",
        "glede na lani [kWh]",
    ])];
    table.extend(rows.iter().map(|r| {
        vec![
            date_to_string(r.date),
            pretty_float(r.vt),
            pretty_float(r.mt),
            pretty_float(r.total),
            pretty_float(r.total_change),
        ]
    }));

    TableData {
        rows: table,
        column_widths_mm: vec![30.0, 35.0, 35.0, 35.0, 35.0],
    }
}

pub fn last_12_entries_chart(rows: &[YearOverYearRow]) -> LineChart {
    LineChart {
        width: CHART_WIDTH_MM,
        height: CHART_HEIGHT_MM,
        labels: rows.iter().map(|r| consumption_month_label(r.date)).collect(),
        series: vec![
            rows.iter().map(|r| r.vt).collect(),
            rows.iter().map(|r| r.mt).collect(),
            rows.iter().map(|r| r.total).collect(),
            rows.iter().map(|r| r.total_last_year).collect(),
        ],
        series_names: header_row(&["poraba VT", "poraba MT", "poraba skupaj", "poraba lani"]),
        min_value: Some(0.0),
        max_value: None,
    }
}

pub fn difference_table(rows: &[DatasetDifferenceRow]) -> TableData {
    let mut table = vec![header_row(&DIFFERENCE_HEADER)];
    table.extend(rows.iter().map(|r| {
        vec![
            date_to_string(r.date),
            pretty_float(r.vt_diff),
            pretty_float(r.mt_diff),
            pretty_float(r.total_diff),
        ]
    }));

    TableData {
        rows: table,
        column_widths_mm: vec![30.0, 35.0, 35.0, 35.0],
    }
}

pub fn difference_chart(rows: &[DatasetDifferenceRow]) -> LineChart {
    LineChart {
        width: CHART_WIDTH_MM,
        height: CHART_HEIGHT_MM,
        labels: rows.iter().map(|r| consumption_month_label(r.date)).collect(),
        series: vec![
            rows.iter().map(|r| r.vt_diff).collect(),
            rows.iter().map(|r| r.mt_diff).collect(),
            rows.iter().map(|r| r.total_diff).collect(),
        ],
        // series are named after the table's value columns
        series_names: header_row(&DIFFERENCE_HEADER[1..]),
        min_value: None,
        max_value: None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportBlock {
    Paragraph(String),
    Table(TableData),
    LineChart(LineChart),
    PageBreak,
}

/// Renderer-independent description of the whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub header: Vec<String>,
    pub blocks: Vec<ReportBlock>,
}

impl Report {
    /// Replays the document into `renderer`. Saving is left to the caller.
    pub fn render<R: ReportRenderer + ?Sized>(&self, renderer: &mut R) {
        renderer.set_header(&self.header);
        for block in &self.blocks {
            match block {
                ReportBlock::Paragraph(text) => renderer.add_paragraph(text),
                ReportBlock::Table(table) => {
                    renderer.add_table(&table.rows, &table.column_widths_mm)
                }
                ReportBlock::LineChart(chart) => renderer.add_line_chart(chart),
                ReportBlock::PageBreak => renderer.new_page(),
            }
        }
    }
}

pub struct ReportBuilder<'a> {
    config: &'a ReportConfig,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(config: &'a ReportConfig) -> Self {
        Self { config }
    }

    /// Runs the pipeline for every configured dataset of `sheet`.
    pub fn build(&self, sheet: &Sheet, generated_on: NaiveDate) -> Result<Report> {
        let series = self
            .config
            .datasets
            .iter()
            .map(|dataset| DatasetSeries::from_sheet(sheet, self.config, dataset))
            .collect::<Result<Vec<_>>>()?;

        Ok(self.build_from_series(&series, generated_on))
    }

    pub fn build_from_series(&self, series: &[DatasetSeries], generated_on: NaiveDate) -> Report {
        let header = vec![
            self.config.header_title.clone(),
            format!("izdelano {}", date_to_string(generated_on)),
        ];
        let mut blocks = Vec::new();

        for dataset in series {
            let rows = year_over_year_rows(&dataset.deltas);
            info!(
                "{}: {} monthly deltas, {} year-over-year rows",
                dataset.title,
                dataset.deltas.len(),
                rows.len()
            );
            if rows.is_empty() {
                warn!(
                    "{} has fewer than 13 months of consumption; its table is empty",
                    dataset.title
                );
            }

            blocks.push(ReportBlock::Paragraph(dataset.title.clone()));
            blocks.push(ReportBlock::Paragraph("Zadnjih 12 meritev:".to_string()));
            blocks.push(ReportBlock::Table(last_12_entries_table(&rows)));
            blocks.push(ReportBlock::LineChart(last_12_entries_chart(&rows)));
            blocks.push(ReportBlock::PageBreak);
        }

        match series {
            [a, b, ..] => {
                let rows = dataset_difference_rows(&a.deltas, &b.deltas);
                debug!("{} rows comparing {} and {}", rows.len(), a.title, b.title);

                blocks.push(ReportBlock::Paragraph("Razlike med B in A".to_string()));
                blocks.push(ReportBlock::Table(difference_table(&rows)));
                blocks.push(ReportBlock::LineChart(difference_chart(&rows)));
            }
            _ => warn!("Fewer than two datasets; skipping the difference section"),
        }

        Report { header, blocks }
    }
}
