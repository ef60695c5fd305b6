//! Time-axis construction and optional pre-aggregation.
//!
//! Sensors log at their own cadences; before gridding, a record can be binned
//! onto a coarser cadence with a chosen aggregation method (hourly means are
//! the usual case for noisy loggers). Binning is separate from the
//! interpolator's linear time resampling: aggregation reduces data, the
//! interpolator only aligns it.

use std::collections::HashMap;
use std::str::FromStr;

use hifitime::{Duration, Epoch};
use vec1::Vec1;

use crate::{Series, SeriesError};

/// How values falling into one resampling window are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleMethod {
    Mean,
    Median,
    Min,
    Max,
    First,
    Last,
}

impl FromStr for ResampleMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<ResampleMethod, String> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(ResampleMethod::Mean),
            "median" => Ok(ResampleMethod::Median),
            "min" => Ok(ResampleMethod::Min),
            "max" => Ok(ResampleMethod::Max),
            "first" => Ok(ResampleMethod::First),
            "last" => Ok(ResampleMethod::Last),
            _ => Err(format!(
                "unknown resample method `{s}` (expected mean, median, min, max, first or last)"
            )),
        }
    }
}

impl ResampleMethod {
    /// Combine one window's values. NaN cells have already been dropped;
    /// `values` is non-empty and in record order.
    fn apply(self, values: &mut Vec<f64>) -> f64 {
        match self {
            ResampleMethod::Mean => values.iter().sum::<f64>() / values.len() as f64,
            ResampleMethod::Median => {
                values.sort_unstable_by(f64::total_cmp);
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                }
            }
            ResampleMethod::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            ResampleMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ResampleMethod::First => values[0],
            ResampleMethod::Last => values[values.len() - 1],
        }
    }
}

/// The regular timestamps `start + i * interval` up to and including `end`.
/// Strictly increasing for any positive interval.
pub fn regular_times(start: Epoch, end: Epoch, interval: Duration) -> Vec1<Epoch> {
    let mut times = vec![start];
    let interval_ns = interval.total_nanoseconds();
    for i in 1.. {
        let t = start + Duration::from_total_nanoseconds(i * interval_ns);
        if t > end {
            break;
        }
        times.push(t);
    }
    // `start` is always present.
    Vec1::try_from_vec(times).unwrap()
}

/// Bin a series onto windows `[t0 + k*interval, t0 + (k+1)*interval)`
/// anchored at its first timestamp, applying `method` per variable per
/// window. Output rows are stamped at the window start; windows with no
/// samples are dropped, so the result stays strictly increasing but may be
/// gappy. NaN cells are ignored; a window whose every cell is NaN yields NaN
/// for that variable, keeping the columns aligned.
pub fn resample_series(
    series: &Series,
    interval: Duration,
    method: ResampleMethod,
) -> Result<Series, SeriesError> {
    let interval_ns = interval.total_nanoseconds();
    let first = *series.timestamps().first();
    let variable_names = series.variable_names();

    let mut out_timestamps = Vec::new();
    let mut out_columns: HashMap<String, Vec<f64>> = variable_names
        .iter()
        .map(|&name| (name.to_string(), Vec::new()))
        .collect();

    let mut window_index: i128 = 0;
    let mut row = 0usize;
    let n = series.len();
    while row < n {
        let window_start = first + Duration::from_total_nanoseconds(window_index * interval_ns);
        let window_end = first + Duration::from_total_nanoseconds((window_index + 1) * interval_ns);
        window_index += 1;

        let window_rows_start = row;
        while row < n && series.timestamps()[row] < window_end {
            row += 1;
        }
        if row == window_rows_start {
            continue;
        }

        out_timestamps.push(window_start);
        for &name in &variable_names {
            let column = series.values(name).unwrap();
            let mut window_values: Vec<f64> = column[window_rows_start..row]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            let aggregated = if window_values.is_empty() {
                f64::NAN
            } else {
                method.apply(&mut window_values)
            };
            out_columns.get_mut(name).unwrap().push(aggregated);
        }
    }

    // The first window always receives the first row.
    let out_timestamps = Vec1::try_from_vec(out_timestamps).unwrap();
    Series::new(
        series.name.clone(),
        series.depth,
        out_timestamps,
        out_columns,
    )
}
