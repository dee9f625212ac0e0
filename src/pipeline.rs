//! ## Percentile Filter Pipeline
//!
//! This module ties the stages of a run together.
//!
//! ### Overview
//!
//! - [`PercentileFilter`] stages the input, resolves the percentile threshold and materializes
//!   the selected rows, in that order, over one DataFusion session.
//! - [`FilterReport`] describes a completed run.
//!
//! A remote input is downloaded exactly once, so the threshold and the selection are computed
//! over the same bytes. Nothing is written before the threshold is known, and the output only
//! appears under its final name once it is complete.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use trip_percentile_filter::prelude::*;
//!
//! # async fn run() -> TripFilterResult<()> {
//! let input = DatasetRef::parse("yellow_tripdata_2019-01.parquet")?;
//! let output = output_path_for(&input, DEFAULT_OUTPUT_PREFIX, Path::new("."))?;
//! let filter = PercentileFilter::new(Percentile::new(95)?, FilterSettings::default());
//! let report = filter.run(&input, &output).await?;
//! println!("{} rows at or above {}", report.rows_written, report.threshold);
//! # Ok(())
//! # }
//! ```

use crate::exceptions::TripFilterResult;
use crate::selector::select_and_write;
use crate::settings::FilterSettings;
use crate::source::{DatasetRef, StagedDataset};
use crate::threshold::{resolve_threshold, InterpolationMethod, Percentile};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterReport {
    pub input: String,
    pub output: PathBuf,
    pub percentile: Percentile,
    pub method: InterpolationMethod,
    /// The resolved distance threshold.
    pub threshold: f64,
    /// Valid distances the threshold was computed from.
    pub observations: usize,
    pub rows_written: u64,
}

/// Keeps the rows of a trip dataset whose distance is at or above a percentile.
#[derive(Debug, Clone)]
pub struct PercentileFilter {
    percentile: Percentile,
    settings: FilterSettings,
}

impl PercentileFilter {
    /// Creates a new filter.
    ///
    /// # Arguments
    ///
    /// * `percentile` - The percentile of the distance column rows must reach.
    /// * `settings` - Column name, interpolation method and engine settings.
    pub fn new(percentile: Percentile, settings: FilterSettings) -> Self {
        Self {
            percentile,
            settings,
        }
    }

    pub fn percentile(&self) -> Percentile {
        self.percentile
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// Runs the filter on `input` and writes the selected rows to `output`.
    pub async fn run(&self, input: &DatasetRef, output: &Path) -> TripFilterResult<FilterReport> {
        let start = Instant::now();
        self.step_started("staging input");
        let staged = StagedDataset::stage(input, self.settings.fetch_timeout).await?;
        self.step_finished("staging input", start);

        self.run_staged(&staged, output).await
    }

    /// Runs the filter on an already staged input.
    pub async fn run_staged(
        &self,
        staged: &StagedDataset,
        output: &Path,
    ) -> TripFilterResult<FilterReport> {
        let ctx = self.settings.session_context()?;
        let reference = staged.reference().to_string();
        let column = self.settings.distance_column.as_str();

        let start = Instant::now();
        self.step_started("resolving threshold");
        let df = staged.read(&ctx).await?;
        let threshold = resolve_threshold(
            &df,
            &reference,
            column,
            self.percentile,
            self.settings.method,
        )
        .await?;
        self.step_finished("resolving threshold", start);

        let start = Instant::now();
        self.step_started("writing output");
        let rows_written = select_and_write(
            df,
            staged.schema(),
            column,
            threshold.value,
            output,
            self.settings.compression,
        )
        .await?;
        self.step_finished("writing output", start);

        let report = FilterReport {
            input: reference,
            output: output.to_path_buf(),
            percentile: self.percentile,
            method: self.settings.method,
            threshold: threshold.value,
            observations: threshold.observations,
            rows_written,
        };
        info!(
            input = %report.input,
            output = %report.output.display(),
            percentile = %report.percentile,
            threshold = report.threshold,
            rows_written = report.rows_written,
            "filter completed"
        );
        Ok(report)
    }

    fn step_started(&self, name: &str) {
        if self.settings.verbose {
            println!("Running step: {}", name);
        }
    }

    fn step_finished(&self, name: &str, start: Instant) {
        if self.settings.verbose {
            println!("Step '{}' completed in {:?}", name, start.elapsed());
        }
    }
}
