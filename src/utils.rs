use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

/// Largest spreadsheet serial number that still maps to a valid date (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

/// Returns the 1st of the month following `date`.
pub fn next_month_start(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Builds the first-of-month grid covering `[start, end]`.
///
/// The grid starts at `start` when it already falls on a 1st, otherwise at the
/// 1st of the following month, and never goes past `end`.
pub fn month_start_grid(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();

    let mut current = if start.day() > 1 {
        next_month_start(start)
    } else {
        Some(start)
    };

    while let Some(date) = current {
        if date > end {
            break;
        }
        dates.push(date);
        current = next_month_start(date);
    }

    dates
}

/// Seconds since the Unix epoch at midnight UTC of `date`.
pub fn date_timestamp(date: NaiveDate) -> f64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp() as f64
}

/// Converts a spreadsheet serial number to a date-time.
///
/// The 1900 system counts days from 1899-12-30 (which absorbs the phantom
/// 1900-02-29 for every serial after February 1900); the 1904 system counts
/// from 1904-01-01.
pub fn serial_to_datetime(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..=MAX_SERIAL).contains(&serial) {
        return None;
    }

    let epoch = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };

    let millis = (serial * 86_400_000.0).round() as i64;
    epoch
        .and_time(NaiveTime::MIN)
        .checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}
