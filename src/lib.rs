//! # Trip Percentile Filter
//!
//! Keeps the rows of an NYC taxi trip Parquet file whose `trip_distance` is greater than or equal
//! to a given percentile of that column, and writes them to a new Parquet file with the same
//! schema and row order.
//!
//! The work is done by [Apache DataFusion](https://datafusion.apache.org): the percentile is
//! resolved by streaming an external sort of the distances (or a t-digest, see [`threshold::InterpolationMethod`]),
//! and the matching rows are streamed straight into the output file, which is committed with an
//! atomic rename.
//!
//! ## Modules
//!
//! - [`source`]: input references (local paths and `https://` URLs) and staging.
//! - [`threshold`]: percentile threshold resolution.
//! - [`selector`]: row selection and atomic materialization.
//! - [`pipeline`]: the combined run and its report.
//! - [`settings`]: run and engine settings.
//! - [`exceptions`]: error types.
//!
//! Set `DEBUG_TRIP_FILTER=true` to get debug logs of every stage (see [`logging`]).

pub mod exceptions;
pub mod logging;
pub mod pipeline;
pub mod selector;
pub mod settings;
pub mod source;
pub mod threshold;

/// Re-exports of the types most callers need.
pub mod prelude {
    pub use crate::exceptions::{ErrorKind, TripFilterError, TripFilterResult};
    pub use crate::pipeline::{FilterReport, PercentileFilter};
    pub use crate::selector::select_and_write;
    pub use crate::settings::{FilterSettings, DEFAULT_DISTANCE_COLUMN, DEFAULT_OUTPUT_PREFIX};
    pub use crate::source::{output_path_for, DatasetRef, StagedDataset};
    pub use crate::threshold::{resolve_threshold, InterpolationMethod, Percentile, Threshold};
}
