use std::{collections::HashMap, error::Error, path::PathBuf};

use clap::{AppSettings, Parser};
use hifitime::Duration;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;
use regex::Regex;
use vec1::Vec1;

use wc_grid::{
    read::{
        delimited::{DelimitedReader, HeaderRow},
        DepthAssignment, SeriesRead,
    },
    resample::{resample_series, ResampleMethod},
    write::{write_grid, GridOutputType},
    Dataset, GridInterpolator, GridParams,
};

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
struct Args {
    /// The sensor files to be gridded, one file per fixed-depth sensor.
    data: Vec<PathBuf>,

    /// The directory the per-variable grid files are written into.
    #[clap(short, long)]
    output: PathBuf,

    /// The output format (csv or tsv).
    #[clap(long, default_value = "csv")]
    format: GridOutputType,

    /// Explicit sensor depths [metres], one per data file in order.
    #[clap(short, long, multiple_values(true))]
    depths: Option<Vec<f64>>,

    /// A regex with one capture group extracting the depth [metres] from each
    /// file name, e.g. '_(\d+(?:\.\d+)?)m'.
    #[clap(long, conflicts_with = "depths")]
    depth_pattern: Option<String>,

    /// The variables to grid. The default is every variable found in the
    /// input files.
    #[clap(long, multiple_values(true))]
    variables: Option<Vec<String>>,

    /// Rename a variable column, formatted old=new. May be given multiple
    /// times.
    #[clap(long, multiple_occurrences(true))]
    rename: Vec<String>,

    /// Spacing between output depth levels [metres].
    #[clap(long, default_value = "0.5")]
    depth_resolution: f64,

    /// Bottom of the output depth axis [metres].
    #[clap(long)]
    max_depth: f64,

    /// Spacing between output timestamps [seconds].
    #[clap(long, default_value = "3600")]
    resample_interval: f64,

    /// Pre-aggregate each sensor onto the resample interval with this method
    /// (mean, median, min, max, first or last) before gridding.
    #[clap(long)]
    resample_method: Option<ResampleMethod>,

    /// The name of the timestamp column in the input files.
    #[clap(long, default_value = "Time")]
    time_column: String,

    /// The field delimiter of the input files.
    #[clap(long, default_value = ",")]
    delimiter: char,

    /// The header is at this 0-based line index. The default is
    /// auto-detection (first line containing the delimiter).
    #[clap(long)]
    skip_lines: Option<usize>,

    /// The line under the header is a units row; skip it.
    #[clap(long)]
    units_row: bool,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long)]
    no_progress_bars: bool,
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbosity);
    if let Err(e) = try_main(args) {
        eprintln!("Error: {e}");
        let mut source = e.source();
        while let Some(s) = source {
            eprintln!("  caused by: {s}");
            source = s.source();
        }
        std::process::exit(1);
    }
}

fn try_main(args: Args) -> Result<(), Box<dyn Error>> {
    if args.data.is_empty() {
        return Err("no input files given".into());
    }
    let output_type = args.format;

    let depth_assignment = match (&args.depths, &args.depth_pattern) {
        (Some(depths), _) => {
            if depths.len() != args.data.len() {
                return Err(format!(
                    "got {} depths for {} data files",
                    depths.len(),
                    args.data.len()
                )
                .into());
            }
            DepthAssignment::Explicit(depths.clone())
        }
        (None, Some(pattern)) => DepthAssignment::FilenamePattern(Regex::new(pattern)?),
        (None, None) => return Err("either --depths or --depth-pattern is required".into()),
    };

    let renames: HashMap<String, String> = args
        .rename
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .ok_or_else(|| format!("bad --rename `{pair}`, expected old=new"))
        })
        .collect::<Result<_, _>>()?;

    let mut reader = DelimitedReader::new(&args.time_column)
        .with_delimiter(args.delimiter)
        .with_units_row(args.units_row);
    if let Some(n) = args.skip_lines {
        reader = reader.with_header(HeaderRow::SkipLines(n));
    }
    if let Some(variables) = &args.variables {
        reader = reader.select_variables(variables.clone());
    }
    for (from, to) in &renames {
        reader = reader.rename_variable(from, to);
    }

    let interval = Duration::from_seconds(args.resample_interval);

    let mut all_series = Vec::with_capacity(args.data.len());
    for (index, file) in args.data.iter().enumerate() {
        let depth = depth_assignment.depth_for(file, index)?;
        debug!("Reading {}", file.display());
        let mut series = reader.read_series(file, depth)?;
        if let Some(method) = args.resample_method {
            series = resample_series(&series, interval, method)?;
        }
        info!("{}: {} samples at {} m", series.name, series.len(), depth);
        all_series.push(series);
    }
    let dataset = Dataset::new(Vec1::try_from_vec(all_series).expect("data is non-empty"));

    // Requested variables are named post-rename.
    let variables: Vec<String> = match &args.variables {
        Some(variables) => variables
            .iter()
            .map(|v| renames.get(v).cloned().unwrap_or_else(|| v.clone()))
            .collect(),
        None => dataset
            .variable_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };
    info!("Gridding {}", variables.iter().join(", "));

    let params = GridParams::new(args.depth_resolution, args.max_depth, interval);
    let interpolator = GridInterpolator::new(params)?;

    std::fs::create_dir_all(&args.output)?;

    let draw_target = if args.no_progress_bars {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stdout()
    };
    let progress = ProgressBar::with_draw_target(Some(variables.len() as u64), draw_target)
        .with_style(
            ProgressStyle::default_bar()
                .template("{msg:10}: [{wide_bar:.blue}] {pos:2}/{len:2} variables ({elapsed_precise}<{eta_precise})")
                .unwrap()
                .progress_chars("=> "),
        )
        .with_message("Gridding");
    progress.tick();

    // Grids are disjoint per variable, so each one can be interpolated and
    // written on its own worker.
    variables
        .par_iter()
        .progress_with(progress)
        .try_for_each(|variable| -> Result<(), String> {
            let mut grids = interpolator
                .interpolate(&dataset, std::slice::from_ref(variable))
                .map_err(|e| e.to_string())?;
            let grid = grids
                .remove(variable.as_str())
                .ok_or_else(|| format!("no grid produced for `{variable}`"))?;
            let path = args.output.join(variable_file_name(variable, output_type));
            write_grid(&path, &grid, output_type).map_err(|e| e.to_string())
        })?;

    Ok(())
}

/// One output file per variable, with anything awkward for a file name
/// replaced by underscores.
fn variable_file_name(variable: &str, output_type: GridOutputType) -> String {
    let stem: String = variable
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}.{}", output_type.extension())
}

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        _ => builder.filter_level(log::LevelFilter::Trace),
    };
    builder.init();
}
