// Run `make testdata` before running this example to download the data
// Run `cargo run --example filter_trips` to execute this example

use std::error::Error;
use std::path::Path;
use trip_percentile_filter::prelude::*;
mod shared;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Construct the full path to the dataset
    let path = format!("{}/{}", shared::DATA_DIR, "yellow_tripdata_2019-01.parquet");
    let input = DatasetRef::parse(&path)?;
    let output = output_path_for(&input, DEFAULT_OUTPUT_PREFIX, Path::new(shared::DATA_DIR))?;

    // Keep the longest 10% of trips
    let settings = FilterSettings::default().with_verbose(true);
    let report = PercentileFilter::new(Percentile::new(90)?, settings)
        .run(&input, &output)
        .await?;
    println!(
        "Kept {} of {} trips with trip_distance >= {:.2}",
        report.rows_written, report.observations, report.threshold
    );

    // Show the first 5 rows of the output
    shared::load_data(&output.to_string_lossy())
        .await?
        .limit(0, Some(5))?
        .show()
        .await?;

    Ok(())
}
