//! The depth/time gridding core.
//!
//! Two-stage transform: each sensor's record is first resampled onto a shared
//! regular time axis (linear in time, no extrapolation past a sensor's
//! deployment window), then each regular timestamp's vertical profile is
//! interpolated onto regular depth levels (linear between sensors, flat
//! extension outside the observed envelope).

use std::collections::HashMap;

use hifitime::{Duration, Epoch};
use log::debug;
use ndarray::Array2;
use thiserror::Error;
use vec1::Vec1;

use crate::{resample::regular_times, Dataset};

#[derive(Debug, Error)]
pub enum GridError {
    /// Fewer than 2 distinct sensor depths: no vertical profile exists.
    #[error("2D interpolation needs at least 2 distinct sensor depths, got {0}")]
    InsufficientData(usize),

    /// A requested variable is carried by no sensor in the dataset.
    #[error("variable `{0}` is not present in any series")]
    UnknownVariable(String),

    /// A configuration value is outside its domain.
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Interpolation parameters. Validated by [GridInterpolator::new].
#[derive(Debug, Clone, Copy)]
pub struct GridParams {
    /// Spacing between adjacent output depth levels \[metres\].
    pub depth_resolution: f64,

    /// Lower bound of the output depth axis \[metres\]. May exceed the
    /// deepest sensor; levels below it take that sensor's value.
    pub max_depth: f64,

    /// Spacing between adjacent output timestamps.
    pub resample_interval: Duration,

    /// Upper bound of the output depth axis \[metres\], normally 0 (the
    /// surface).
    pub surface_reference: f64,
}

impl GridParams {
    pub fn new(depth_resolution: f64, max_depth: f64, resample_interval: Duration) -> GridParams {
        GridParams {
            depth_resolution,
            max_depth,
            resample_interval,
            surface_reference: 0.0,
        }
    }

    pub fn with_surface_reference(mut self, surface_reference: f64) -> GridParams {
        self.surface_reference = surface_reference;
        self
    }

    fn validate(&self) -> Result<(), GridError> {
        if !(self.depth_resolution > 0.0) || !self.depth_resolution.is_finite() {
            return Err(GridError::InvalidParameter {
                name: "depth_resolution",
                value: self.depth_resolution,
                reason: "must be positive and finite",
            });
        }
        if !(self.max_depth > 0.0) || !self.max_depth.is_finite() {
            return Err(GridError::InvalidParameter {
                name: "max_depth",
                value: self.max_depth,
                reason: "must be positive and finite",
            });
        }
        if self.resample_interval.total_nanoseconds() <= 0 {
            return Err(GridError::InvalidParameter {
                name: "resample_interval",
                value: self.resample_interval.to_seconds(),
                reason: "must be positive",
            });
        }
        if !(self.surface_reference >= 0.0) || !self.surface_reference.is_finite() {
            return Err(GridError::InvalidParameter {
                name: "surface_reference",
                value: self.surface_reference,
                reason: "must be non-negative and finite",
            });
        }
        if self.surface_reference >= self.max_depth {
            return Err(GridError::InvalidParameter {
                name: "surface_reference",
                value: self.surface_reference,
                reason: "must be less than max_depth",
            });
        }
        Ok(())
    }

    /// The output depth levels: `surface_reference + i * depth_resolution`
    /// for every level at or above `max_depth` (a hair of float tolerance so
    /// an exactly-divisible axis keeps its bottom level).
    fn depth_levels(&self) -> Vec1<f64> {
        let mut levels = Vec::new();
        let tolerance = self.depth_resolution * 1e-9;
        for i in 0.. {
            let z = self.surface_reference + i as f64 * self.depth_resolution;
            if z > self.max_depth + tolerance {
                break;
            }
            levels.push(z);
        }
        // validate() guarantees surface_reference < max_depth, so the surface
        // level always exists.
        Vec1::try_from_vec(levels).unwrap()
    }
}

/// One variable's gridded output. Read-only once returned; the rendering or
/// export stage must leave `None` cells as gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// The variable this grid holds.
    pub variable: String,

    /// The regular time axis (column index), strictly increasing, spaced by
    /// the configured resample interval.
    pub times: Vec1<Epoch>,

    /// The regular depth axis (row index) \[metres\], strictly increasing,
    /// spaced by the configured depth resolution.
    pub depths: Vec1<f64>,

    /// Shape (depths, times). `None` is the missing marker, distinct from
    /// any valid reading (a legitimate 0.0 stays `Some(0.0)`).
    pub values: Array2<Option<f64>>,
}

impl Grid {
    /// The fraction of cells with no valid interpolated value.
    pub fn missing_fraction(&self) -> f64 {
        let missing = self.values.iter().filter(|v| v.is_none()).count();
        missing as f64 / self.values.len() as f64
    }
}

/// Converts a sparse set of fixed-depth sensor records into dense regular
/// grids, one per requested variable. Stateless; a single instance may be
/// shared across threads and invoked concurrently.
#[derive(Debug, Clone, Copy)]
pub struct GridInterpolator {
    params: GridParams,
}

impl GridInterpolator {
    pub fn new(params: GridParams) -> Result<GridInterpolator, GridError> {
        params.validate()?;
        Ok(GridInterpolator { params })
    }

    pub fn params(&self) -> &GridParams {
        &self.params
    }

    /// Produce one [Grid] per requested variable.
    ///
    /// # Errors
    ///
    /// - [GridError::InsufficientData] if the dataset has fewer than 2
    ///   distinct sensor depths.
    /// - [GridError::UnknownVariable] if a requested variable is present in
    ///   no series. A variable carried by only a subset of sensors is fine;
    ///   it interpolates over that subset.
    pub fn interpolate<S: AsRef<str>>(
        &self,
        dataset: &Dataset,
        variables: &[S],
    ) -> Result<HashMap<String, Grid>, GridError> {
        let num_depths = dataset.depths().len();
        if num_depths < 2 {
            return Err(GridError::InsufficientData(num_depths));
        }
        for variable in variables {
            if !dataset.has_variable(variable.as_ref()) {
                return Err(GridError::UnknownVariable(variable.as_ref().to_string()));
            }
        }

        let (start, end) = dataset.time_range();
        let times = regular_times(start, end, self.params.resample_interval);
        let depths = self.params.depth_levels();

        let mut grids = HashMap::with_capacity(variables.len());
        for variable in variables {
            let variable = variable.as_ref();
            let grid = self.interpolate_variable(dataset, variable, &times, &depths);
            grids.insert(variable.to_string(), grid);
        }
        Ok(grids)
    }

    /// Grid a single variable. `variables` membership has already been
    /// checked, so at least one series contributes.
    fn interpolate_variable(
        &self,
        dataset: &Dataset,
        variable: &str,
        times: &Vec1<Epoch>,
        depths: &Vec1<f64>,
    ) -> Grid {
        // Stage 1: each contributing sensor onto the regular time axis.
        let mut profiles: Vec<(f64, Vec<Option<f64>>)> = dataset
            .series()
            .iter()
            .filter_map(|s| {
                s.values(variable)
                    .map(|column| (s.depth, sample_at(s.timestamps(), column, times)))
            })
            .collect();
        profiles.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Stage 2: vertical profile per regular timestamp.
        let mut values = Array2::from_elem((depths.len(), times.len()), None);
        let mut missing_columns = 0usize;
        for t_idx in 0..times.len() {
            let mut samples: Vec<(f64, f64)> = profiles
                .iter()
                .filter_map(|(depth, resampled)| resampled[t_idx].map(|v| (*depth, v)))
                .collect();
            // Two sensors at exactly the same depth: the first (by input
            // order) wins.
            samples.dedup_by(|a, b| a.0 == b.0);

            if samples.len() < 2 {
                // No single-point profiles: the whole column stays missing.
                missing_columns += 1;
                continue;
            }

            for (z_idx, &z) in depths.iter().enumerate() {
                values[(z_idx, t_idx)] = Some(profile_value(&samples, z));
            }
        }
        if missing_columns > 0 {
            debug!(
                "{variable}: {missing_columns}/{} timestamps had fewer than 2 depth samples",
                times.len()
            );
        }

        Grid {
            variable: variable.to_string(),
            times: times.clone(),
            depths: depths.clone(),
            values,
        }
    }
}

/// Linearly sample one sensor's column at each regular timestamp. Targets
/// outside the sensor's observed range stay missing, as does any target whose
/// bracketing raw values include a NaN cell.
fn sample_at(timestamps: &Vec1<Epoch>, column: &[f64], targets: &Vec1<Epoch>) -> Vec<Option<f64>> {
    let first = *timestamps.first();
    let last = *timestamps.last();
    targets
        .iter()
        .map(|&t| {
            if t < first || t > last {
                return None;
            }
            // First index with timestamp >= t; in range because t <= last.
            let idx = timestamps.partition_point(|&ts| ts < t);
            if timestamps[idx] == t {
                let v = column[idx];
                return v.is_finite().then_some(v);
            }
            let (t0, v0) = (timestamps[idx - 1], column[idx - 1]);
            let (t1, v1) = (timestamps[idx], column[idx]);
            if !v0.is_finite() || !v1.is_finite() {
                return None;
            }
            let alpha = (t - t0).to_seconds() / (t1 - t0).to_seconds();
            Some(v0 + alpha * (v1 - v0))
        })
        .collect()
}

/// Value of a vertical profile at depth `z`. `samples` is (depth, value),
/// sorted by depth with at least 2 entries. Outside the envelope the nearest
/// sensor's value is extended flat; linear extrapolation of sparse profiles
/// overshoots.
fn profile_value(samples: &[(f64, f64)], z: f64) -> f64 {
    let (shallowest, top_value) = samples[0];
    let (deepest, bottom_value) = samples[samples.len() - 1];
    if z <= shallowest {
        return top_value;
    }
    if z >= deepest {
        return bottom_value;
    }
    let idx = samples.partition_point(|&(depth, _)| depth < z);
    let (d0, v0) = samples[idx - 1];
    let (d1, v1) = samples[idx];
    if d1 == z {
        return v1;
    }
    let alpha = (z - d0) / (d1 - d0);
    v0 + alpha * (v1 - v0)
}
