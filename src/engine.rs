use crate::error::{MeterReportError, Result};
use crate::schema::{MonthlyDelta, MonthlyPoint, TimePoint};
use crate::utils::{date_timestamp, month_start_grid};
use chrono::NaiveDate;
use log::debug;
use splines::{Interpolation, Key, Spline};

/// Piecewise-linear fit of one cumulative series over its own dates.
struct CumulativeCurve {
    spline: Spline<f64, f64>,
    start: NaiveDate,
    end: NaiveDate,
}

impl CumulativeCurve {
    fn new(series: &[TimePoint]) -> Result<Self> {
        let (first, last) = match (series.first(), series.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(MeterReportError::Interpolation(
                    "cannot interpolate an empty series".to_string(),
                ))
            }
        };

        let keys: Vec<Key<f64, f64>> = series
            .iter()
            .map(|p| Key::new(date_timestamp(p.date), p.cumulative_value, Interpolation::Linear))
            .collect();

        Ok(Self {
            spline: Spline::from_vec(keys),
            start: first.date,
            end: last.date,
        })
    }

    fn sample(&self, date: NaiveDate) -> Result<f64> {
        if date < self.start || date > self.end {
            return Err(MeterReportError::Interpolation(format!(
                "{} lies outside the observed range {}..{}",
                date, self.start, self.end
            )));
        }

        // `sample` has no segment for the last key, so the clamped variant
        // covers the closing endpoint.
        self.spline
            .clamped_sample(date_timestamp(date))
            .ok_or_else(|| MeterReportError::Interpolation(format!("no value at {}", date)))
    }
}

/// Interpolates both tariff series at every month start within their span.
///
/// Both series must begin and end on the same dates; interior dates may
/// differ because each series is interpolated over its own points.
pub fn interpolate_month_starts(
    vt_data: &[TimePoint],
    mt_data: &[TimePoint],
) -> Result<Vec<MonthlyPoint>> {
    let vt_curve = CumulativeCurve::new(vt_data)?;
    let mt_curve = CumulativeCurve::new(mt_data)?;

    if vt_curve.start != mt_curve.start || vt_curve.end != mt_curve.end {
        return Err(MeterReportError::DomainMismatch {
            vt_start: vt_curve.start,
            vt_end: vt_curve.end,
            mt_start: mt_curve.start,
            mt_end: mt_curve.end,
        });
    }

    let dates = month_start_grid(vt_curve.start, vt_curve.end);
    debug!(
        "Interpolating {} month starts from {} to {}",
        dates.len(),
        vt_curve.start,
        vt_curve.end
    );

    let mut months = Vec::with_capacity(dates.len());
    for date in dates {
        months.push(MonthlyPoint {
            month_start_date: date,
            vt_cumulative: vt_curve.sample(date)?,
            mt_cumulative: mt_curve.sample(date)?,
        });
    }

    debug!(
        "Interpolation result:\n{:?}",
        months
            .iter()
            .map(|m| (m.vt_cumulative, m.mt_cumulative))
            .collect::<Vec<_>>()
    );

    Ok(months)
}

/// Consumption between consecutive month starts, dated at the later one.
pub fn get_energy_diff(data: &[MonthlyPoint]) -> Vec<MonthlyDelta> {
    data.windows(2)
        .map(|pair| MonthlyDelta {
            date: pair[1].month_start_date,
            vt_delta: pair[1].vt_cumulative - pair[0].vt_cumulative,
            mt_delta: pair[1].mt_cumulative - pair[0].mt_cumulative,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series(points: &[(NaiveDate, f64)]) -> Vec<TimePoint> {
        points
            .iter()
            .map(|&(date, cumulative_value)| TimePoint {
                date,
                cumulative_value,
            })
            .collect()
    }

    fn month(d: NaiveDate, vt: f64, mt: f64) -> MonthlyPoint {
        MonthlyPoint {
            month_start_date: d,
            vt_cumulative: vt,
            mt_cumulative: mt,
        }
    }

    #[test]
    fn test_linear_interpolation_between_readings() {
        // 31 days from Jan 15 to Feb 15, Feb 1 is 17 days in
        let vt = series(&[(date(2023, 1, 15), 0.0), (date(2023, 2, 15), 310.0)]);
        let mt = series(&[(date(2023, 1, 15), 0.0), (date(2023, 2, 15), 62.0)]);

        let months = interpolate_month_starts(&vt, &mt).unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].month_start_date, date(2023, 2, 1));
        assert!((months[0].vt_cumulative - 170.0).abs() < 1e-9);
        assert!((months[0].mt_cumulative - 34.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_match_returns_reading() {
        let vt = series(&[
            (date(2023, 1, 1), 0.0),
            (date(2023, 1, 20), 80.0),
            (date(2023, 2, 1), 123.25),
            (date(2023, 3, 1), 400.5),
        ]);
        let mt = series(&[
            (date(2023, 1, 1), 0.0),
            (date(2023, 2, 1), 11.0),
            (date(2023, 3, 1), 29.0),
        ]);

        let months = interpolate_month_starts(&vt, &mt).unwrap();
        assert_eq!(
            months,
            vec![
                month(date(2023, 1, 1), 0.0, 0.0),
                month(date(2023, 2, 1), 123.25, 11.0),
                month(date(2023, 3, 1), 400.5, 29.0),
            ]
        );
    }

    #[test]
    fn test_targets_stay_inside_domain() {
        let start = date(2021, 6, 17);
        let end = date(2023, 9, 3);
        let vt = series(&[(start, 0.0), (date(2022, 2, 1), 500.0), (end, 2_000.0)]);
        let mt = series(&[(start, 0.0), (end, 900.0)]);

        let months = interpolate_month_starts(&vt, &mt).unwrap();
        assert_eq!(months.first().unwrap().month_start_date, date(2021, 7, 1));
        assert_eq!(months.last().unwrap().month_start_date, date(2023, 9, 1));
        for m in &months {
            assert!(m.month_start_date >= start && m.month_start_date <= end);
        }
    }

    #[test]
    fn test_mismatched_domains_are_rejected() {
        let vt = series(&[(date(2023, 1, 1), 0.0), (date(2023, 3, 1), 10.0)]);
        let mt = series(&[(date(2023, 1, 1), 0.0), (date(2023, 2, 20), 10.0)]);

        assert!(matches!(
            interpolate_month_starts(&vt, &mt),
            Err(MeterReportError::DomainMismatch { .. })
        ));
    }

    #[test]
    fn test_single_point_series() {
        let on_first = series(&[(date(2023, 4, 1), 0.0)]);
        let months = interpolate_month_starts(&on_first, &on_first).unwrap();
        assert_eq!(months, vec![month(date(2023, 4, 1), 0.0, 0.0)]);

        let mid_month = series(&[(date(2023, 4, 9), 0.0)]);
        assert!(interpolate_month_starts(&mid_month, &mid_month)
            .unwrap()
            .is_empty());

        assert!(interpolate_month_starts(&[], &on_first).is_err());
    }

    #[test]
    fn test_sample_outside_domain_is_an_error() {
        let curve =
            CumulativeCurve::new(&series(&[(date(2023, 1, 1), 0.0), (date(2023, 2, 1), 5.0)]))
                .unwrap();
        assert!(curve.sample(date(2022, 12, 31)).is_err());
        assert!(curve.sample(date(2023, 2, 2)).is_err());
        assert_eq!(curve.sample(date(2023, 2, 1)).unwrap(), 5.0);
    }

    #[test]
    fn test_energy_diff() {
        let months = vec![
            month(date(2023, 1, 1), 0.0, 0.0),
            month(date(2023, 2, 1), 50.0, 20.0),
            month(date(2023, 3, 1), 130.0, 25.0),
        ];

        let deltas = get_energy_diff(&months);
        assert_eq!(
            deltas,
            vec![
                MonthlyDelta {
                    date: date(2023, 2, 1),
                    vt_delta: 50.0,
                    mt_delta: 20.0
                },
                MonthlyDelta {
                    date: date(2023, 3, 1),
                    vt_delta: 80.0,
                    mt_delta: 5.0
                },
            ]
        );
    }

    #[test]
    fn test_energy_diff_length() {
        assert!(get_energy_diff(&[]).is_empty());
        assert!(get_energy_diff(&[month(date(2023, 1, 1), 1.0, 1.0)]).is_empty());

        let months: Vec<MonthlyPoint> = (1..=12)
            .map(|m| month(date(2023, m, 1), m as f64, 0.0))
            .collect();
        assert_eq!(get_energy_diff(&months).len(), 11);
    }
}
