//! ## Filter Settings
//!
//! [`FilterSettings`] gathers every knob of a run: the distance column and output prefix,
//! the percentile method, and the execution settings of the embedded DataFusion engine.
//!
//! Settings are built with `Default` and then adjusted with the `with_*` methods:
//!
//! ```rust
//! use trip_percentile_filter::settings::FilterSettings;
//! use trip_percentile_filter::threshold::InterpolationMethod;
//!
//! let settings = FilterSettings::default()
//!     .with_method(InterpolationMethod::NearestRank)
//!     .with_memory_limit(Some(512 * 1024 * 1024));
//! assert_eq!(settings.distance_column, "trip_distance");
//! ```

use crate::exceptions::TripFilterResult;
use crate::threshold::InterpolationMethod;
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use datafusion::prelude::{SessionConfig, SessionContext};
use parquet::basic::Compression;
use std::time::Duration;

/// Name of the column the percentile is computed over.
pub const DEFAULT_DISTANCE_COLUMN: &str = "trip_distance";

/// Prefix prepended to the input file name to build the output file name.
pub const DEFAULT_OUTPUT_PREFIX: &str = "output_";

/// Default batch size used by the engine when scanning the input.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Default timeout for fetching a remote input.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// DataFusion's default memory reserved for merging spilled sort runs.
const DEFAULT_SORT_SPILL_RESERVATION: usize = 10 * 1024 * 1024;

/// Settings for a single filter run.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    /// Column whose percentile is computed and compared against.
    pub distance_column: String,
    /// How the percentile value is derived from the sorted distances.
    pub method: InterpolationMethod,
    /// Prefix used by [`crate::source::output_path_for`].
    pub output_prefix: String,
    /// Rows per record batch produced by the scan.
    pub batch_size: usize,
    /// Parallelism of the engine for aggregations and sorts.
    pub target_partitions: usize,
    /// Memory cap for the engine in bytes. Sorts spill to disk once it is reached.
    pub memory_limit: Option<usize>,
    /// Compression codec of the output file.
    pub compression: Compression,
    /// Total time allowed for downloading a remote input.
    pub fetch_timeout: Duration,
    /// If true, prints per-stage timing to stdout.
    pub verbose: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            distance_column: DEFAULT_DISTANCE_COLUMN.to_string(),
            method: InterpolationMethod::default(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            target_partitions: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            memory_limit: None,
            compression: Compression::SNAPPY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            verbose: false,
        }
    }
}

impl FilterSettings {
    pub fn with_distance_column(mut self, column: impl Into<String>) -> Self {
        self.distance_column = column.into();
        self
    }

    pub fn with_method(mut self, method: InterpolationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_target_partitions(mut self, partitions: usize) -> Self {
        self.target_partitions = partitions.max(1);
        self
    }

    pub fn with_memory_limit(mut self, limit: Option<usize>) -> Self {
        self.memory_limit = limit;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builds the DataFusion session used for both stages of a run.
    ///
    /// File scans are never split or round-robin repartitioned, so a single input file is
    /// read as one ordered stream and the selector sees rows in file order.
    /// Parquet string columns are read with their file types instead of view types, so the
    /// output schema matches the input schema.
    /// Under a memory limit, sorts reserve at most a quarter of it for merging spilled runs.
    pub fn session_context(&self) -> TripFilterResult<SessionContext> {
        let mut config = SessionConfig::new()
            .with_batch_size(self.batch_size)
            .with_target_partitions(self.target_partitions)
            .with_repartition_file_scans(false)
            .with_round_robin_repartition(false)
            .set_bool("datafusion.execution.parquet.schema_force_view_types", false);
        if let Some(limit) = self.memory_limit {
            let reservation = (limit / 4).min(DEFAULT_SORT_SPILL_RESERVATION);
            config = config.with_sort_spill_reservation_bytes(reservation);
        }

        let mut runtime = RuntimeEnvBuilder::new();
        if let Some(limit) = self.memory_limit {
            runtime = runtime.with_memory_limit(limit, 1.0);
        }
        let runtime = runtime.build_arc()?;

        Ok(SessionContext::new_with_config_rt(config, runtime))
    }
}
