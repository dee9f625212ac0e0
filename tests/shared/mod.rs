#![allow(dead_code)]

use arrow::array::{
    Array, ArrayRef, Float64Array, Int32Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// A subset of the NYC yellow taxi schema: `VendorID` holds the row position so tests can check order.
pub fn trip_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("VendorID", DataType::Int64, false),
        Field::new(
            "tpep_pickup_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new("passenger_count", DataType::Int32, true),
        Field::new("trip_distance", DataType::Float64, true),
        Field::new("store_and_fwd_flag", DataType::Utf8, true),
    ]))
}

/// Builds one batch of trips with the given distances.
pub fn trip_batch(offset: usize, distances: &[Option<f64>]) -> RecordBatch {
    let ids: Vec<i64> = (offset..offset + distances.len()).map(|i| i as i64).collect();
    let pickups: Vec<Option<i64>> = ids
        .iter()
        .map(|i| Some(1_546_300_800_000_000 + i * 60_000_000))
        .collect();
    let passengers: Vec<Option<i32>> = ids
        .iter()
        .map(|i| if i % 7 == 3 { None } else { Some((i % 4 + 1) as i32) })
        .collect();
    let flags: Vec<Option<&str>> = ids
        .iter()
        .map(|i| if i % 5 == 0 { Some("Y") } else { Some("N") })
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(ids)),
        Arc::new(TimestampMicrosecondArray::from(pickups)),
        Arc::new(Int32Array::from(passengers)),
        Arc::new(Float64Array::from(distances.to_vec())),
        Arc::new(StringArray::from(flags)),
    ];
    RecordBatch::try_new(trip_schema(), columns).expect("valid trip batch")
}

/// Writes a trips Parquet file with small row groups, so reads span several batches.
pub fn write_trips(path: &Path, distances: &[Option<f64>]) {
    let file = File::create(path).expect("create fixture");
    let props = WriterProperties::builder()
        .set_max_row_group_size(4)
        .build();
    let mut writer = ArrowWriter::try_new(file, trip_schema(), Some(props)).expect("writer");
    for (i, chunk) in distances.chunks(3).enumerate() {
        writer.write(&trip_batch(i * 3, chunk)).expect("write batch");
    }
    writer.close().expect("close writer");
}

/// Same as [`write_trips`] for inputs without missing distances.
pub fn write_distances(path: &Path, distances: &[f64]) {
    let values: Vec<Option<f64>> = distances.iter().copied().map(Some).collect();
    write_trips(path, &values);
}

/// Writes a single-column Parquet file.
pub fn write_single_column(path: &Path, field: Field, array: ArrayRef) {
    let schema = Arc::new(Schema::new(vec![field]));
    let batch = RecordBatch::try_new(schema.clone(), vec![array]).expect("valid batch");
    let file = File::create(path).expect("create fixture");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("writer");
    writer.write(&batch).expect("write batch");
    writer.close().expect("close writer");
}

/// Reads a Parquet file back into its schema and batches.
pub fn read_parquet(path: &Path) -> (SchemaRef, Vec<RecordBatch>) {
    let file = File::open(path).expect("open parquet");
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).expect("parquet reader");
    let schema = builder.schema().clone();
    let batches = builder
        .build()
        .expect("build reader")
        .collect::<Result<Vec<_>, _>>()
        .expect("read batches");
    (schema, batches)
}

/// Extracts `(VendorID, trip_distance)` pairs from trip batches.
pub fn ids_and_distances(batches: &[RecordBatch]) -> Vec<(i64, Option<f64>)> {
    let mut rows = Vec::new();
    for batch in batches {
        let ids = batch
            .column(batch.schema().index_of("VendorID").unwrap())
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("Expected Int64Array");
        let distances = batch
            .column(batch.schema().index_of("trip_distance").unwrap())
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("Expected Float64Array");
        for i in 0..batch.num_rows() {
            let distance = if distances.is_null(i) {
                None
            } else {
                Some(distances.value(i))
            };
            rows.push((ids.value(i), distance));
        }
    }
    rows
}

/// Asserts two schemas have the same column names and types, in order.
pub fn assert_same_columns(expected: &Schema, actual: &Schema) {
    let expected: Vec<(&String, &DataType)> = expected
        .fields()
        .iter()
        .map(|f| (f.name(), f.data_type()))
        .collect();
    let actual: Vec<(&String, &DataType)> = actual
        .fields()
        .iter()
        .map(|f| (f.name(), f.data_type()))
        .collect();
    assert_eq!(expected, actual, "output columns differ from input columns");
}
