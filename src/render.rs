use crate::error::Result;
use crate::formatting::pretty_float;
use log::warn;

/// A category line chart: one polyline per series over shared x labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LineChart {
    /// Drawing width in millimetres.
    pub width: f64,
    /// Drawing height in millimetres.
    pub height: f64,
    pub labels: Vec<String>,
    pub series: Vec<Vec<f64>>,
    pub series_names: Vec<String>,
    /// Fixed lower bound of the value axis; values below it are clipped.
    pub min_value: Option<f64>,
    /// Fixed upper bound of the value axis; values above it are clipped.
    pub max_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueAxis {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ValueAxis {
    pub fn ticks(&self) -> Vec<f64> {
        let mut ticks = Vec::new();
        let mut value = self.min;
        while value <= self.max + self.step * 1e-6 {
            ticks.push(value);
            value += self.step;
        }
        ticks
    }

    pub fn label(&self, value: f64) -> String {
        let text = pretty_float(value);
        if self.step >= 1.0 {
            text.trim_end_matches(",00").to_string()
        } else {
            text
        }
    }
}

impl LineChart {
    /// Chooses a value axis with roughly `ticks` intervals over the data,
    /// honouring the optional clamps.
    ///
    /// The returned axis always has `max > min`. A fixed maximum that does not
    /// lie above the lower bound is ignored.
    pub fn value_axis(&self, ticks: usize) -> ValueAxis {
        let (data_min, data_max) = self
            .series
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                None => Some((v, v)),
            })
            .unwrap_or((0.0, 1.0));

        let min_clamp = self.min_value.filter(|v| v.is_finite());
        let lo = min_clamp.unwrap_or(data_min);
        let max_clamp = self.max_value.filter(|v| v.is_finite() && *v > lo);
        if self.max_value.is_some() && max_clamp.is_none() {
            warn!(
                "Ignoring chart maximum {:?}; it does not lie above the minimum {}",
                self.max_value, lo
            );
        }

        let mut hi = max_clamp.unwrap_or(data_max);
        if hi <= lo {
            hi = lo + 1.0;
        }

        let step = nice_step((hi - lo) / ticks.max(1) as f64);
        let min = min_clamp.unwrap_or((lo / step).floor() * step);
        let mut max = max_clamp.unwrap_or((hi / step).ceil() * step);
        if max <= min {
            max = min + step;
        }

        ValueAxis { min, max, step }
    }
}

fn nice_step(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= 0.0 {
        return 1.0;
    }

    let base = 10f64.powf(raw.log10().floor());
    let fraction = raw / base;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };

    nice * base
}

/// Receives an assembled report block by block and produces the document.
pub trait ReportRenderer {
    fn set_header(&mut self, lines: &[String]);

    fn add_paragraph(&mut self, text: &str);

    /// `rows[0]` is the header row; widths are in millimetres.
    fn add_table(&mut self, rows: &[Vec<String>], column_widths: &[f64]);

    fn add_line_chart(&mut self, chart: &LineChart);

    fn new_page(&mut self);

    /// Writes the document. Fails if no header was set.
    fn save(&mut self) -> Result<()>;
}
