//! Reconstruction of a continuous cumulative series from raw meter readings.
//!
//! When a meter is swapped, the sheet holds two rows with the same date: the
//! last reading of the old meter followed by the first reading of the new one.
//! Only increments between adjacent rows of the same meter are summed, so the
//! jump between the two absolute scales never enters the series.

use crate::error::{MeterReportError, Result};
use crate::schema::{RawReading, TimePoint};
use chrono::NaiveDate;
use log::{debug, warn};

/// Aligns a date column with a value column row by row.
pub fn pair_columns(dates: &[Option<NaiveDate>], values: &[Option<f64>]) -> Result<Vec<RawReading>> {
    if dates.len() != values.len() {
        return Err(MeterReportError::InputShape {
            dates: dates.len(),
            values: values.len(),
        });
    }

    Ok(dates
        .iter()
        .zip(values)
        .map(|(&date, &value)| RawReading { date, value })
        .collect())
}

/// Removes meter-swap seams and rebases the series to start at zero.
///
/// Consecutive readings `(e1, e2)` contribute `e2 - e1` to the running total
/// at `e2`'s date. A pair is skipped when either value is missing, when its
/// date is missing or earlier than the last emitted date, or when its date
/// equals the last emitted date (the swap pair). Any number of same-date rows
/// therefore collapses into a single point.
pub fn remove_seams(readings: &[RawReading]) -> Result<Vec<TimePoint>> {
    let seed_date = readings
        .first()
        .ok_or(MeterReportError::EmptySeries)?
        .date
        .ok_or(MeterReportError::MissingSeedDate)?;

    let mut series = vec![TimePoint {
        date: seed_date,
        cumulative_value: 0.0,
    }];
    let mut same_date_run = 1usize;

    for pair in readings.windows(2) {
        let (e1, e2) = (&pair[0], &pair[1]);

        let (Some(v1), Some(v2)) = (e1.value, e2.value) else {
            continue;
        };
        let Some(date) = e2.date else {
            debug!("  skipping reading {} without a date", v2);
            continue;
        };

        let tail = series[series.len() - 1];

        if date == tail.date {
            same_date_run += 1;
            if same_date_run == 3 {
                warn!(
                    "{} has three or more readings; keeping only the first increment of that day",
                    date
                );
            }
            continue;
        }

        if date < tail.date {
            warn!(
                "Reading dated {} follows {}; skipping out-of-order row",
                date, tail.date
            );
            continue;
        }

        let row_diff = v2 - v1;
        if row_diff < 0.0 {
            warn!("Meter reading decreased on {}: {} -> {}", date, v1, v2);
        }

        let row_val = tail.cumulative_value + row_diff;
        debug!("  {}: {} -> {} ({}): {}", date, v1, v2, row_diff, row_val);

        series.push(TimePoint {
            date,
            cumulative_value: row_val,
        });
        same_date_run = 1;
    }

    Ok(series)
}
