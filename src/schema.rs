use crate::error::{MeterReportError, Result};
use crate::ingestion::column_index;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One raw spreadsheet row of a (date column, value column) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub date: Option<NaiveDate>,
    pub value: Option<f64>,
}

/// A point of a reconstructed cumulative series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub date: NaiveDate,
    pub cumulative_value: f64,
}

/// Both tariff counters of one dataset interpolated at a month start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    pub month_start_date: NaiveDate,
    pub vt_cumulative: f64,
    pub mt_cumulative: f64,
}

/// Energy consumed during the month that ends at `date`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyDelta {
    pub date: NaiveDate,
    pub vt_delta: f64,
    pub mt_delta: f64,
}

impl MonthlyDelta {
    pub fn total(&self) -> f64 {
        self.vt_delta + self.mt_delta
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct DatasetConfig {
    #[schemars(description = "Display title of the metering point, printed above its tables")]
    pub title: String,

    #[schemars(description = "Column letter holding the cumulative high-tariff (VT) readings")]
    pub vt_column: String,

    #[schemars(description = "Column letter holding the cumulative low-tariff (MT) readings")]
    pub mt_column: String,
}

impl DatasetConfig {
    pub fn new(title: &str, vt_column: &str, mt_column: &str) -> Self {
        Self {
            title: title.to_string(),
            vt_column: vt_column.to_string(),
            mt_column: mt_column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(default)]
pub struct ReportConfig {
    #[schemars(description = "Name of the worksheet holding the readings")]
    pub sheet_name: String,

    #[schemars(description = "Column letter of the reading dates, shared by all datasets")]
    pub date_column: String,

    #[schemars(
        description = "Spreadsheet row number (1-based) of the first reading; rows above it are headers"
    )]
    pub data_start_row: u32,

    #[schemars(
        description = "Metering points to report on. The first two are also compared against each other."
    )]
    pub datasets: Vec<DatasetConfig>,

    #[schemars(description = "First header line printed on every report page")]
    pub header_title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sheet_name: "Vnos meritev".to_string(),
            date_column: "B".to_string(),
            data_start_row: 6,
            datasets: vec![
                DatasetConfig::new("MERILNO MESTO 42A", "C", "F"),
                DatasetConfig::new("MERILNO MESTO 42B", "I", "L"),
            ],
            header_title: "Skupni prostori stavbe 42a in 42b".to_string(),
        }
    }
}

impl ReportConfig {
    /// Loads a JSON config file; fields it leaves out keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: ReportConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sheet_name.trim().is_empty() {
            return Err(MeterReportError::InvalidConfig(
                "sheet_name must not be empty".to_string(),
            ));
        }

        if self.data_start_row == 0 {
            return Err(MeterReportError::InvalidConfig(
                "data_start_row is 1-based and must be at least 1".to_string(),
            ));
        }

        if self.datasets.is_empty() {
            return Err(MeterReportError::InvalidConfig(
                "at least one dataset must be configured".to_string(),
            ));
        }

        column_index(&self.date_column)?;
        for dataset in &self.datasets {
            column_index(&dataset.vt_column)?;
            column_index(&dataset.mt_column)?;
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ReportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.datasets.len(), 2);
        assert_eq!(config.data_start_row, 6);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ReportConfig =
            serde_json::from_str(r#"{ "sheet_name": "Readings", "data_start_row": 2 }"#).unwrap();
        assert_eq!(config.sheet_name, "Readings");
        assert_eq!(config.data_start_row, 2);
        assert_eq!(config.date_column, "B");
        assert_eq!(config.datasets[1].vt_column, "I");
    }

    #[test]
    fn test_validation_rejects_bad_columns_and_rows() {
        let mut config = ReportConfig::default();
        config.datasets[0].mt_column = "4F".to_string();
        assert!(matches!(
            config.validate(),
            Err(MeterReportError::InvalidColumn(_))
        ));

        let config = ReportConfig {
            data_start_row: 0,
            ..ReportConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MeterReportError::InvalidConfig(_))
        ));

        let config = ReportConfig {
            datasets: vec![],
            ..ReportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = ReportConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("sheet_name"));
        assert!(schema_json.contains("data_start_row"));
        assert!(schema_json.contains("vt_column"));
    }

    #[test]
    fn test_monthly_delta_total() {
        let delta = MonthlyDelta {
            date: NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
            vt_delta: 30.5,
            mt_delta: 19.5,
        };
        assert_eq!(delta.total(), 50.0);
    }
}
