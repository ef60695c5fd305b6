//! Readers that turn raw sensor files into [Series] records.
//!
//! One file corresponds to one physical sensor at one fixed depth. The depth
//! is never inferred from the data itself; it is resolved up front by a
//! [DepthAssignment] (file-name pattern or explicit list) before a reader
//! runs.

pub mod delimited;

use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::Series;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed content, reported with its line number.
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Auto-detection found no line containing the delimiter.
    #[error("{path}: no header row found")]
    NoHeader { path: PathBuf },

    #[error("{path}: time column `{column}` not found in header")]
    MissingTimeColumn { path: PathBuf, column: String },

    /// Two rows share a timestamp; a sensor cannot report twice at once.
    #[error("{path}:{line}: duplicate timestamp")]
    DuplicateTimestamp { path: PathBuf, line: usize },

    #[error("{path}: no data rows")]
    NoData { path: PathBuf },

    /// The file-name depth pattern did not match or captured a non-number.
    #[error("could not extract a depth from file name `{0}`")]
    DepthPattern(String),

    #[error(transparent)]
    Series(#[from] crate::SeriesError),
}

/// How each sensor file gets its deployment depth.
#[derive(Debug, Clone)]
pub enum DepthAssignment {
    /// A regex with one capture group, applied to the file name
    /// (e.g. `_(\d+(?:\.\d+)?)m` for `buoy_05.5m.csv`).
    FilenamePattern(Regex),

    /// Explicit depths, one per file in reading order.
    Explicit(Vec<f64>),
}

impl DepthAssignment {
    /// The depth for the `index`-th file at `path`.
    pub fn depth_for(&self, path: &Path, index: usize) -> Result<f64, ReadError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        match self {
            DepthAssignment::FilenamePattern(pattern) => pattern
                .captures(file_name)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .ok_or_else(|| ReadError::DepthPattern(file_name.to_string())),
            DepthAssignment::Explicit(depths) => depths
                .get(index)
                .copied()
                .ok_or_else(|| ReadError::DepthPattern(file_name.to_string())),
        }
    }
}

pub trait SeriesRead: Sync + Send {
    /// Parse one sensor file into a [Series] at the given deployment depth.
    fn read_series(&self, path: &Path, depth: f64) -> Result<Series, ReadError>;
}
