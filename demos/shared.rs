#![allow(dead_code)]

use datafusion::dataframe::DataFrame;
use datafusion::prelude::{ParquetReadOptions, SessionContext};

// Path to the directory containing the datasets
pub const DATA_DIR: &str = "tests/testdata";

/// Loads a Parquet file into a DataFrame.
pub async fn load_data(path: &str) -> Result<DataFrame, datafusion::error::DataFusionError> {
    let ctx = SessionContext::new();
    ctx.read_parquet(path, ParquetReadOptions::default()).await
}
