//! ## Row selection and materialization
//!
//! The selector keeps every input row whose distance is greater than or equal to the
//! threshold and streams the survivors into a new Parquet file.
//!
//! The output is committed atomically: batches are written to a hidden temporary file next to
//! the destination, which is synced and then renamed over the final name. If anything fails
//! before the rename, the temporary file is deleted and the destination is left untouched.
//!
//! Each output batch is rebuilt against the input file's own Arrow schema, so column names,
//! order, types and schema metadata carry over unchanged.

use crate::exceptions::{TripFilterError, TripFilterResult};
use crate::threshold::{distance_column_type, distance_expr, valid_distance};
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use datafusion::prelude::DataFrame;
use datafusion_expr::lit;
use futures::StreamExt;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Checks that the engine's view of the input matches the file schema column for column.
fn check_schema_fidelity(expected: &Schema, actual: &Schema) -> TripFilterResult<()> {
    if expected.fields().len() != actual.fields().len() {
        return Err(TripFilterError::SchemaError(format!(
            "expected {} columns, the scan produced {}",
            expected.fields().len(),
            actual.fields().len()
        )));
    }
    for (want, got) in expected.fields().iter().zip(actual.fields().iter()) {
        if want.name() != got.name() || want.data_type() != got.data_type() {
            return Err(TripFilterError::SchemaError(format!(
                "column '{}' ({}) was read back as '{}' ({})",
                want.name(),
                want.data_type(),
                got.name(),
                got.data_type()
            )));
        }
    }
    Ok(())
}

/// Writes the rows of `df` with `column >= threshold` to `output` and returns how many were written.
///
/// `schema` is the Arrow schema of the input file; the output carries exactly this schema.
/// Rows with a null or NaN distance are never selected.
pub async fn select_and_write(
    df: DataFrame,
    schema: SchemaRef,
    column: &str,
    threshold: f64,
    output: &Path,
    compression: Compression,
) -> TripFilterResult<u64> {
    let data_type = distance_column_type(&df, column)?;
    check_schema_fidelity(&schema, df.schema().as_arrow())?;

    let predicate =
        valid_distance(column, &data_type).and(distance_expr(column).gt_eq(lit(threshold)));
    let selected = df.filter(predicate)?;

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staging = tempfile::Builder::new()
        .prefix(".trip-filter-")
        .suffix(".parquet.tmp")
        .tempfile_in(dir)
        .map_err(|e| TripFilterError::write_failed(output, e))?;
    debug!(
        staging = %staging.path().display(),
        output = %output.display(),
        "writing selected rows"
    );

    let rows = write_batches(selected, &schema, &staging, compression, output).await?;
    commit(staging, output)?;

    info!(output = %output.display(), rows, threshold, "wrote filtered dataset");
    Ok(rows)
}

/// Streams the selected rows into the staging file.
async fn write_batches(
    selected: DataFrame,
    schema: &SchemaRef,
    staging: &NamedTempFile,
    compression: Compression,
    output: &Path,
) -> TripFilterResult<u64> {
    let file = staging
        .as_file()
        .try_clone()
        .map_err(|e| TripFilterError::write_failed(output, e))?;
    let props = WriterProperties::builder()
        .set_compression(compression)
        .build();
    let mut writer = ArrowWriter::try_new(file, SchemaRef::clone(schema), Some(props))?;

    let mut rows: u64 = 0;
    let mut stream = selected.execute_stream().await?;
    while let Some(batch) = stream.next().await {
        let batch = batch?;
        if batch.num_rows() == 0 {
            continue;
        }
        let batch = RecordBatch::try_new(SchemaRef::clone(schema), batch.columns().to_vec())?;
        rows += batch.num_rows() as u64;
        writer.write(&batch).map_err(|e| write_error(e, output))?;
    }
    writer.close().map_err(|e| write_error(e, output))?;
    Ok(rows)
}

/// Syncs the staging file and renames it over `output`.
fn commit(staging: NamedTempFile, output: &Path) -> TripFilterResult<()> {
    staging
        .as_file()
        .sync_all()
        .map_err(|e| TripFilterError::write_failed(output, e))?;
    staging
        .persist(output)
        .map_err(|e| TripFilterError::write_failed(output, e.error))?;
    Ok(())
}

/// Parquet reports failed writes of the underlying file as `ParquetError::External`.
fn write_error(err: parquet::errors::ParquetError, output: &Path) -> TripFilterError {
    match err {
        parquet::errors::ParquetError::External(inner) => {
            match inner.downcast::<std::io::Error>() {
                Ok(io_err) => TripFilterError::write_failed(output, *io_err),
                Err(other) => {
                    TripFilterError::ParquetError(parquet::errors::ParquetError::External(other))
                }
            }
        }
        other => TripFilterError::ParquetError(other),
    }
}
