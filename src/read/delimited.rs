//! Delimited-text sensor files (CSV/TSV logger exports).
//!
//! # File format
//!
//! ```text
//! Logger: RBR duet, serial 204411
//! Time,Temperature,Salinity
//! UTC,degC,PSU
//! 2023-06-01 00:00:00,10.2,30.1
//! 2023-06-01 00:10:00,10.3,30.0
//! ```
//!
//! Logger exports routinely carry free-form preamble lines before the header
//! and a units row directly under it. In auto mode the header is the first
//! line containing the delimiter; a fixed skip count can override that.
//! Unparsable numeric cells become NaN (they are dropped downstream), but a
//! bad timestamp fails the file.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use hifitime::Epoch;
use log::debug;
use vec1::Vec1;

use super::{ReadError, SeriesRead};
use crate::Series;

/// Where the header row sits.
#[derive(Debug, Clone, Copy)]
pub enum HeaderRow {
    /// The first line containing the delimiter.
    Auto,
    /// The header is at this 0-based line index.
    SkipLines(usize),
}

/// Configurable reader for one-sensor-per-file delimited text.
#[derive(Debug, Clone)]
pub struct DelimitedReader {
    delimiter: char,
    header: HeaderRow,
    units_row: bool,
    time_column: String,
    select: Option<Vec<String>>,
    rename: HashMap<String, String>,
}

impl DelimitedReader {
    pub fn new(time_column: impl Into<String>) -> DelimitedReader {
        DelimitedReader {
            delimiter: ',',
            header: HeaderRow::Auto,
            units_row: false,
            time_column: time_column.into(),
            select: None,
            rename: HashMap::new(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> DelimitedReader {
        self.delimiter = delimiter;
        self
    }

    pub fn with_header(mut self, header: HeaderRow) -> DelimitedReader {
        self.header = header;
        self
    }

    /// Skip a units row directly under the header.
    pub fn with_units_row(mut self, units_row: bool) -> DelimitedReader {
        self.units_row = units_row;
        self
    }

    /// Keep only these variable columns (by their header names, before any
    /// renaming). Columns absent from a given file are skipped with a debug
    /// log, not an error; not every sensor carries every variable.
    pub fn select_variables(mut self, variables: Vec<String>) -> DelimitedReader {
        self.select = Some(variables);
        self
    }

    /// Rename a header column in the resulting series.
    pub fn rename_variable(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> DelimitedReader {
        self.rename.insert(from.into(), to.into());
        self
    }
}

impl SeriesRead for DelimitedReader {
    fn read_series(&self, path: &Path, depth: f64) -> Result<Series, ReadError> {
        let io_err = |source| ReadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let parse_err = |line, message: String| ReadError::Parse {
            path: path.to_path_buf(),
            line,
            message,
        };

        let file = File::open(path).map_err(io_err)?;
        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            lines.push(line.map_err(io_err)?);
        }

        let header_idx = match self.header {
            HeaderRow::Auto => lines
                .iter()
                .position(|l| l.contains(self.delimiter))
                .ok_or_else(|| ReadError::NoHeader {
                    path: path.to_path_buf(),
                })?,
            HeaderRow::SkipLines(n) => {
                if n >= lines.len() {
                    return Err(ReadError::NoHeader {
                        path: path.to_path_buf(),
                    });
                }
                n
            }
        };
        let header: Vec<String> = lines[header_idx]
            .split(self.delimiter)
            .map(|c| c.trim().to_string())
            .collect();
        let time_idx = header
            .iter()
            .position(|c| *c == self.time_column)
            .ok_or_else(|| ReadError::MissingTimeColumn {
                path: path.to_path_buf(),
                column: self.time_column.clone(),
            })?;

        // The kept variable columns: (cell index, output name).
        let mut columns: Vec<(usize, String)> = Vec::new();
        for (i, name) in header.iter().enumerate() {
            if i == time_idx || name.is_empty() {
                continue;
            }
            if let Some(select) = &self.select {
                if !select.iter().any(|s| s == name) {
                    debug!("{}: skipping unselected column `{name}`", path.display());
                    continue;
                }
            }
            let out_name = self.rename.get(name).cloned().unwrap_or_else(|| name.clone());
            columns.push((i, out_name));
        }
        for (k, (_, name)) in columns.iter().enumerate() {
            if columns[..k].iter().any(|(_, prior)| prior == name) {
                return Err(parse_err(
                    header_idx + 1,
                    format!("duplicate column name `{name}` after renaming"),
                ));
            }
        }

        let data_start = header_idx + 1 + usize::from(self.units_row);
        let mut rows: Vec<(Epoch, usize, Vec<f64>)> = Vec::new();
        for (offset, line) in lines.iter().enumerate().skip(data_start) {
            let line_no = offset + 1;
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split(self.delimiter).map(str::trim).collect();
            if cells.len() > header.len() {
                return Err(parse_err(
                    line_no,
                    format!("expected {} fields, got {}", header.len(), cells.len()),
                ));
            }
            let time_cell = cells.get(time_idx).copied().unwrap_or_default();
            let timestamp = parse_timestamp(time_cell).ok_or_else(|| {
                parse_err(line_no, format!("unrecognised timestamp `{time_cell}`"))
            })?;
            let values = columns
                .iter()
                .map(|&(i, _)| cells.get(i).map_or(f64::NAN, |cell| parse_number(cell)))
                .collect();
            rows.push((timestamp, line_no, values));
        }
        if rows.is_empty() {
            return Err(ReadError::NoData {
                path: path.to_path_buf(),
            });
        }

        // Loggers sometimes dump records out of order; sort, then refuse
        // duplicates.
        rows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));
        for pair in rows.windows(2) {
            if pair[1].0 == pair[0].0 {
                return Err(ReadError::DuplicateTimestamp {
                    path: path.to_path_buf(),
                    line: pair[1].1,
                });
            }
        }

        let timestamps =
            Vec1::try_from_vec(rows.iter().map(|r| r.0).collect()).expect("rows is non-empty");
        let mut variables = HashMap::with_capacity(columns.len());
        for (k, (_, name)) in columns.iter().enumerate() {
            let column: Vec<f64> = rows.iter().map(|r| r.2[k]).collect();
            variables.insert(name.clone(), column);
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sensor")
            .to_string();
        debug!(
            "{}: {} rows, {} variable columns, depth {depth} m",
            path.display(),
            rows.len(),
            columns.len()
        );
        Ok(Series::new(name, depth, timestamps, variables)?)
    }
}

/// Parse a numeric cell. Thousands separators are stripped; anything that
/// still fails to parse (including an empty cell) becomes NaN rather than
/// failing the file.
fn parse_number(cell: &str) -> f64 {
    let cleaned = cell.replace(',', "");
    cleaned.parse().unwrap_or(f64::NAN)
}

/// Parse a timestamp cell into a UTC [Epoch]. Accepted formats, tried in
/// order: `YYYY-MM-DD HH:MM:SS[.fff]` (space or `T` separator) and
/// `MM/DD/YYYY HH:MM:SS[.fff]`.
fn parse_timestamp(cell: &str) -> Option<Epoch> {
    let cell = cell.trim();
    let (date, time) = cell.split_once(|c: char| c == ' ' || c == 'T')?;

    let (year, month, day) = if date.contains('-') {
        let mut parts = date.splitn(3, '-');
        let year = parts.next()?.parse::<i32>().ok()?;
        let month = parts.next()?.parse::<u8>().ok()?;
        let day = parts.next()?.parse::<u8>().ok()?;
        (year, month, day)
    } else if date.contains('/') {
        let mut parts = date.splitn(3, '/');
        let month = parts.next()?.parse::<u8>().ok()?;
        let day = parts.next()?.parse::<u8>().ok()?;
        let year = parts.next()?.parse::<i32>().ok()?;
        (year, month, day)
    } else {
        return None;
    };

    let mut parts = time.splitn(3, ':');
    let hour = parts.next()?.parse::<u8>().ok()?;
    let minute = parts.next()?.parse::<u8>().ok()?;
    let second_cell = parts.next()?;
    let (second, nanos) = match second_cell.split_once('.') {
        Some((whole, frac)) => {
            let second = whole.parse::<u8>().ok()?;
            // Right-pad the fraction to nanoseconds.
            let digits: String = frac.chars().take(9).collect();
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let nanos = digits.parse::<u32>().ok()? * 10u32.pow(9 - digits.len() as u32);
            (second, nanos)
        }
        None => (second_cell.parse::<u8>().ok()?, 0),
    };

    Epoch::maybe_from_gregorian_utc(year, month, day, hour, minute, second, nanos).ok()
}
