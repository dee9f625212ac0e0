//! Command-line entry point.
//!
//! ```sh
//! trip-filter yellow_tripdata_2019-01.parquet --percentile 95
//! trip-filter https://d37ci6vzurychx.cloudfront.net/trip-data/yellow_tripdata_2019-01.parquet
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use trip_percentile_filter::prelude::*;

/// Read an input parquet file from the NYC "Yellow Taxi" Trips Data and generate an output
/// parquet file from the input file selecting all the rows with trip distances (column
/// trip_distance) greater than or equal to a given percentile.
#[derive(Debug, Parser)]
#[command(name = "trip-filter", version, about)]
struct Args {
    /// Path to a parquet file from the NYC "Yellow Taxi" Trips Data. This can be either a local
    /// file ('path/to/file.parquet') or a URL ('https://path/to/file.parquet') ending with .parquet.
    #[arg(value_parser = DatasetRef::parse)]
    input_file: DatasetRef,

    /// Integer value of the Nth percentile.
    #[arg(long, default_value_t = Percentile::DEFAULT.value(), value_name = "[1-100]",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    percentile: u8,

    /// Directory the output file is written to.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// How the percentile is computed: linear, nearest-rank or approximate.
    #[arg(long, default_value_t = InterpolationMethod::Linear, value_parser = str::parse::<InterpolationMethod>)]
    method: InterpolationMethod,

    /// Column holding the trip distance.
    #[arg(long, default_value = DEFAULT_DISTANCE_COLUMN)]
    column: String,

    /// Memory limit of the query engine in bytes; larger sorts spill to disk.
    #[arg(long)]
    memory_limit: Option<usize>,

    /// Print per-step timing.
    #[arg(short, long)]
    verbose: bool,
}

async fn run(args: Args) -> TripFilterResult<FilterReport> {
    let percentile = Percentile::new(args.percentile)?;
    let settings = FilterSettings::default()
        .with_method(args.method)
        .with_distance_column(args.column)
        .with_memory_limit(args.memory_limit)
        .with_verbose(args.verbose);
    let output = output_path_for(&args.input_file, &settings.output_prefix, &args.output_dir)?;

    PercentileFilter::new(percentile, settings)
        .run(&args.input_file, &output)
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(report) => {
            if report.rows_written == 0 {
                eprintln!("Warning: no rows were selected.");
            }
            println!("Done!\n");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
