//! End-to-end pipeline test: delimited sensor files -> pre-aggregation ->
//! depth/time gridding -> matrix export.

use std::io::Write;

use hifitime::{Duration, Epoch};
use tempfile::NamedTempFile;
use vec1::Vec1;

use wc_grid::{
    read::{delimited::DelimitedReader, DepthAssignment, ReadError, SeriesRead},
    resample::{resample_series, ResampleMethod},
    write::{write_grid, GridOutputType},
    Dataset, GridError, GridInterpolator, GridParams,
};

const TOL: f64 = 1e-12;

fn sensor_file(rows: &[(&str, f64)]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Time,Temperature").unwrap();
    for (time, temp) in rows {
        writeln!(file, "{time},{temp}").unwrap();
    }
    file
}

#[test]
fn files_to_grid_to_csv() {
    // Two sensors with offset, irregular cadences over the same hour.
    let shallow = sensor_file(&[
        ("2023-06-01 00:00:00", 10.0),
        ("2023-06-01 00:07:00", 10.1),
        ("2023-06-01 00:22:00", 10.3),
        ("2023-06-01 00:41:00", 10.2),
        ("2023-06-01 01:00:00", 10.4),
    ]);
    let deep = sensor_file(&[
        ("2023-06-01 00:00:00", 8.0),
        ("2023-06-01 00:13:00", 8.1),
        ("2023-06-01 00:34:00", 8.0),
        ("2023-06-01 01:00:00", 8.2),
    ]);

    let reader = DelimitedReader::new("Time");
    let depths = DepthAssignment::Explicit(vec![1.0, 5.0]);
    let interval = Duration::from_seconds(600.0);

    let mut all_series = Vec::new();
    for (index, file) in [&shallow, &deep].into_iter().enumerate() {
        let depth = depths.depth_for(file.path(), index).unwrap();
        let series = reader.read_series(file.path(), depth).unwrap();
        let series = resample_series(&series, interval, ResampleMethod::Mean).unwrap();
        all_series.push(series);
    }
    let dataset = Dataset::new(Vec1::try_from_vec(all_series).unwrap());

    let params = GridParams::new(0.5, 6.0, interval);
    let interpolator = GridInterpolator::new(params).unwrap();
    let grids = interpolator.interpolate(&dataset, &["Temperature"]).unwrap();
    let grid = &grids["Temperature"];

    // Axes are regular and span the configured ranges.
    assert_eq!(grid.depths.len(), 13);
    for pair in grid.depths.windows(2) {
        assert!((pair[1] - pair[0] - 0.5).abs() < TOL);
    }
    for pair in grid.times.windows(2) {
        assert_eq!(pair[1] - pair[0], interval);
    }
    assert_eq!(
        *grid.times.first(),
        Epoch::from_gregorian_utc(2023, 6, 1, 0, 0, 0, 0)
    );

    // Both sensors cover the whole hour, so no cell is missing.
    assert!((grid.missing_fraction() - 0.0).abs() < TOL);

    // Values sit inside the observed envelope.
    for value in grid.values.iter().flatten() {
        assert!((8.0..=10.4).contains(value));
    }

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("Temperature.csv");
    write_grid(&out, grid, GridOutputType::Csv).unwrap();
    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.starts_with("depth_m,2023-06-01T00:00:00,"));
    assert_eq!(content.lines().count(), 1 + grid.depths.len());
}

#[test]
fn worked_example_column() {
    // Sensors at 1 m and 5 m reading 10.0 and 8.0 at t=0, depth resolution
    // 1 m, max depth 6 m: flat above 1 m, linear between, flat below 5 m.
    let shallow = sensor_file(&[("2023-06-01 00:00:00", 10.0), ("2023-06-01 00:10:00", 10.0)]);
    let deep = sensor_file(&[("2023-06-01 00:00:00", 8.0), ("2023-06-01 00:10:00", 8.0)]);

    let reader = DelimitedReader::new("Time");
    let dataset = Dataset::new(Vec1::try_from_vec(vec![
        reader.read_series(shallow.path(), 1.0).unwrap(),
        reader.read_series(deep.path(), 5.0).unwrap(),
    ])
    .unwrap());

    let params = GridParams::new(1.0, 6.0, Duration::from_seconds(600.0));
    let interpolator = GridInterpolator::new(params).unwrap();
    let grids = interpolator.interpolate(&dataset, &["Temperature"]).unwrap();
    let grid = &grids["Temperature"];

    let expected = [10.0, 10.0, 9.5, 9.0, 8.5, 8.0, 8.0];
    for (z_idx, want) in expected.into_iter().enumerate() {
        let got = grid.values[(z_idx, 0)].unwrap();
        assert!((got - want).abs() < TOL, "depth {z_idx} m: got {got}");
    }
}

#[test]
fn short_sensor_leaves_missing_columns() {
    // The deep sensor's record ends half way through; later columns only
    // have one depth sample and must be entirely missing, and the export
    // must leave them as gaps.
    let shallow = sensor_file(&[
        ("2023-06-01 00:00:00", 10.0),
        ("2023-06-01 01:00:00", 10.0),
    ]);
    let deep = sensor_file(&[
        ("2023-06-01 00:00:00", 8.0),
        ("2023-06-01 00:30:00", 8.0),
    ]);

    let reader = DelimitedReader::new("Time");
    let dataset = Dataset::new(Vec1::try_from_vec(vec![
        reader.read_series(shallow.path(), 1.0).unwrap(),
        reader.read_series(deep.path(), 5.0).unwrap(),
    ])
    .unwrap());

    let params = GridParams::new(1.0, 6.0, Duration::from_seconds(1200.0));
    let interpolator = GridInterpolator::new(params).unwrap();
    let grids = interpolator.interpolate(&dataset, &["Temperature"]).unwrap();
    let grid = &grids["Temperature"];

    // t = 0, 20, 40, 60 minutes; the deep sensor stops at 30.
    assert_eq!(grid.times.len(), 4);
    for z_idx in 0..grid.depths.len() {
        assert!(grid.values[(z_idx, 0)].is_some());
        assert!(grid.values[(z_idx, 1)].is_some());
        assert!(grid.values[(z_idx, 2)].is_none());
        assert!(grid.values[(z_idx, 3)].is_none());
    }

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("Temperature.csv");
    write_grid(&out, grid, GridOutputType::Csv).unwrap();
    let content = std::fs::read_to_string(&out).unwrap();
    for line in content.lines().skip(1) {
        assert!(line.ends_with(",,"), "missing columns must export empty: {line}");
    }
}

#[test]
fn unknown_variable_is_rejected() {
    let shallow = sensor_file(&[("2023-06-01 00:00:00", 10.0), ("2023-06-01 00:10:00", 10.0)]);
    let deep = sensor_file(&[("2023-06-01 00:00:00", 8.0), ("2023-06-01 00:10:00", 8.0)]);

    let reader = DelimitedReader::new("Time");
    let dataset = Dataset::new(Vec1::try_from_vec(vec![
        reader.read_series(shallow.path(), 1.0).unwrap(),
        reader.read_series(deep.path(), 5.0).unwrap(),
    ])
    .unwrap());

    let interpolator =
        GridInterpolator::new(GridParams::new(1.0, 6.0, Duration::from_seconds(600.0))).unwrap();
    let result = interpolator.interpolate(&dataset, &["Oxygen"]);
    assert!(matches!(result, Err(GridError::UnknownVariable(_))));
}

#[test]
fn single_depth_is_rejected() {
    let only = sensor_file(&[("2023-06-01 00:00:00", 10.0), ("2023-06-01 00:10:00", 10.0)]);
    let reader = DelimitedReader::new("Time");
    let dataset = Dataset::new(Vec1::try_from_vec(vec![
        reader.read_series(only.path(), 2.0).unwrap(),
    ])
    .unwrap());

    let interpolator =
        GridInterpolator::new(GridParams::new(1.0, 6.0, Duration::from_seconds(600.0))).unwrap();
    let result = interpolator.interpolate(&dataset, &["Temperature"]);
    assert!(matches!(result, Err(GridError::InsufficientData(1))));
}

#[test]
fn corrupt_file_reports_line() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Time,Temperature").unwrap();
    writeln!(file, "2023-06-01 00:00:00,10.0").unwrap();
    writeln!(file, "not a time,10.1").unwrap();

    let reader = DelimitedReader::new("Time");
    let result = reader.read_series(file.path(), 1.0);
    assert!(matches!(result, Err(ReadError::Parse { line: 3, .. })));
}
