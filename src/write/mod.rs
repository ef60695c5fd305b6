//! Export of gridded output.
//!
//! A [Grid] is written as a depth-by-time matrix: a header of ISO timestamps,
//! one row per depth level, and an empty cell wherever the grid has no valid
//! value. Consumers (spreadsheets, plotting scripts) must see a gap there,
//! never a fabricated number.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hifitime::Epoch;
use log::info;
use thiserror::Error;

use crate::Grid;

/// All write-supported grid formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridOutputType {
    Csv,
    Tsv,
}

impl FromStr for GridOutputType {
    type Err = String;

    fn from_str(s: &str) -> Result<GridOutputType, String> {
        match s {
            "csv" => Ok(GridOutputType::Csv),
            "tsv" => Ok(GridOutputType::Tsv),
            other => Err(format!("unknown output format `{other}` (expected csv or tsv)")),
        }
    }
}

impl GridOutputType {
    /// The file extension this format is written with.
    pub fn extension(self) -> &'static str {
        match self {
            GridOutputType::Csv => "csv",
            GridOutputType::Tsv => "tsv",
        }
    }

    fn delimiter(self) -> char {
        match self {
            GridOutputType::Csv => ',',
            GridOutputType::Tsv => '\t',
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error writing {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Write one grid to `path`.
///
/// The first column is `depth_m`; remaining columns are the resampled
/// timestamps. Missing cells are left empty.
pub fn write_grid(path: &Path, grid: &Grid, output_type: GridOutputType) -> Result<(), WriteError> {
    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    let delimiter = output_type.delimiter();

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    write!(writer, "depth_m").map_err(io_err)?;
    for &t in grid.times.iter() {
        write!(writer, "{delimiter}{}", format_timestamp(t)).map_err(io_err)?;
    }
    writeln!(writer).map_err(io_err)?;

    for (z_idx, &z) in grid.depths.iter().enumerate() {
        write!(writer, "{z}").map_err(io_err)?;
        for t_idx in 0..grid.times.len() {
            match grid.values[(z_idx, t_idx)] {
                Some(v) => write!(writer, "{delimiter}{v}").map_err(io_err)?,
                None => write!(writer, "{delimiter}").map_err(io_err)?,
            }
        }
        writeln!(writer).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;

    info!(
        "Wrote {} ({} depths x {} times, {:.1}% missing)",
        path.display(),
        grid.depths.len(),
        grid.times.len(),
        grid.missing_fraction() * 100.0
    );
    Ok(())
}

/// `YYYY-MM-DDTHH:MM:SS` (UTC), with fractional seconds only when present.
fn format_timestamp(t: Epoch) -> String {
    let (year, month, day, hour, minute, second, nanos) = t.to_gregorian_utc();
    if nanos == 0 {
        format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}")
    } else {
        format!(
            "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{:09}",
            nanos
        )
    }
}
