//! Gridding of water-column sensor time series.
//!
//! A deployment is a set of fixed-depth sensors logging variables (e.g.
//! temperature, salinity) at irregular times. This crate turns those sparse
//! (time, depth, value) records into dense regular grids over time and depth,
//! suitable for contour plotting or export: delimited-text ingestion in
//! [`read`], optional pre-aggregation in [`resample`], the interpolation core
//! in [`interp`], and matrix export in [`write`].

pub mod interp;
pub mod read;
pub mod resample;
pub mod write;

use std::collections::{BTreeSet, HashMap};

use hifitime::Epoch;
use thiserror::Error;
use vec1::Vec1;

pub use interp::{Grid, GridError, GridInterpolator, GridParams};

#[derive(Debug, Error)]
pub enum SeriesError {
    /// Timestamps must be unique and sorted ascending.
    #[error("timestamps are not strictly increasing at index {0}")]
    NonMonotonicTimestamps(usize),

    /// Every variable column must be aligned with the timestamp axis.
    #[error("variable `{variable}` has {got} values but the series has {expected} timestamps")]
    ColumnLengthMismatch {
        variable: String,
        expected: usize,
        got: usize,
    },

    /// A series carries at least one variable.
    #[error("series `{0}` has no variable columns")]
    NoVariables(String),
}

/// One fixed-depth sensor's record across a deployment.
#[derive(Debug, Clone)]
pub struct Series {
    /// Label for the sensor, usually the source file stem.
    pub name: String,

    /// The sensor's deployment depth \[metres, positive down\]. Fixed for the
    /// whole record; sensors do not move mid-deployment.
    pub depth: f64,

    /// The unique timestamps of the record, strictly increasing. These are
    /// stored as `hifitime` [Epoch] structs to help keep the code flexible.
    /// The spacing is not necessarily regular; loggers drop samples and
    /// operators restart them.
    timestamps: Vec1<Epoch>,

    /// Value columns keyed by variable name, each aligned with `timestamps`.
    /// A raw cell that failed numeric parsing is carried as NaN and treated
    /// as absent by the resampling stages.
    variables: HashMap<String, Vec<f64>>,
}

impl Series {
    /// Build a series, validating the timestamp and column invariants.
    pub fn new(
        name: String,
        depth: f64,
        timestamps: Vec1<Epoch>,
        variables: HashMap<String, Vec<f64>>,
    ) -> Result<Series, SeriesError> {
        for (i, pair) in timestamps.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SeriesError::NonMonotonicTimestamps(i + 1));
            }
        }
        if variables.is_empty() {
            return Err(SeriesError::NoVariables(name));
        }
        for (variable, column) in &variables {
            if column.len() != timestamps.len() {
                return Err(SeriesError::ColumnLengthMismatch {
                    variable: variable.clone(),
                    expected: timestamps.len(),
                    got: column.len(),
                });
            }
        }
        Ok(Series {
            name,
            depth,
            timestamps,
            variables,
        })
    }

    pub fn timestamps(&self) -> &Vec1<Epoch> {
        &self.timestamps
    }

    /// The observed time range of this sensor (first and last timestamp).
    pub fn time_range(&self) -> (Epoch, Epoch) {
        (*self.timestamps.first(), *self.timestamps.last())
    }

    /// The number of samples, always at least 1 (the timestamp axis is a
    /// `Vec1`).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// The variable names this sensor measured, sorted.
    pub fn variable_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.variables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn has_variable(&self, variable: &str) -> bool {
        self.variables.contains_key(variable)
    }

    /// The value column for `variable`, aligned with [Series::timestamps].
    pub fn values(&self, variable: &str) -> Option<&[f64]> {
        self.variables.get(variable).map(Vec::as_slice)
    }
}

/// A collection of [Series], one per physical sensor, sharing an overlapping
/// time range. Construction is owned by the ingestion workflow; the
/// interpolator only borrows it.
#[derive(Debug, Clone)]
pub struct Dataset {
    series: Vec1<Series>,
}

impl Dataset {
    pub fn new(series: Vec1<Series>) -> Dataset {
        Dataset { series }
    }

    pub fn series(&self) -> &Vec1<Series> {
        &self.series
    }

    /// The distinct sensor depths, sorted ascending. Two sensors at exactly
    /// the same depth count once.
    pub fn depths(&self) -> Vec<f64> {
        let mut depths: Vec<f64> = self.series.iter().map(|s| s.depth).collect();
        depths.sort_unstable_by(f64::total_cmp);
        depths.dedup();
        depths
    }

    /// The union of variable names across all sensors, sorted.
    pub fn variable_names(&self) -> Vec<&str> {
        let names: BTreeSet<&str> = self
            .series
            .iter()
            .flat_map(|s| s.variables.keys().map(String::as_str))
            .collect();
        names.into_iter().collect()
    }

    pub fn has_variable(&self, variable: &str) -> bool {
        self.series.iter().any(|s| s.has_variable(variable))
    }

    /// The union time range across all sensors: the earliest first timestamp
    /// to the latest last timestamp.
    pub fn time_range(&self) -> (Epoch, Epoch) {
        let mut start = *self.series.first().timestamps.first();
        let mut end = *self.series.first().timestamps.last();
        for s in self.series.iter().skip(1) {
            if *s.timestamps.first() < start {
                start = *s.timestamps.first();
            }
            if *s.timestamps.last() > end {
                end = *s.timestamps.last();
            }
        }
        (start, end)
    }
}
