//! ## Logging Configuration
//!
//! This module sets up logging automatically at program startup using the `ctor` crate.
//! Logging behavior is controlled by the `DEBUG_TRIP_FILTER` environment variable:
//!
//! - **Disabled** (default): If the variable is unset, empty, or explicitly set to `"0"` or `"false"`,
//!   no logging will be initialized.
//! - **Enabled**: Any other value enables logging with a maximum log level of `DEBUG`.
//!
//! Every stage of a run emits `tracing` events (staging, row counts, the resolved threshold,
//! rows written, the final commit), so enabling the variable is enough to follow a run.
//!
//! ### Usage Example
//!
//! ```sh
//! DEBUG_TRIP_FILTER=true trip-filter yellow_tripdata_2019-01.parquet --percentile 95
//! ```

use ctor::ctor;
use tracing::Level;

/// Name of the environment variable that switches debug logging on.
pub const DEBUG_ENV_VAR: &str = "DEBUG_TRIP_FILTER";

fn logging_enabled(value: Option<&str>) -> bool {
    value.is_some_and(|v| !(v == "0" || v == "false" || v.is_empty()))
}

#[ctor]
fn set_debug_level() {
    if logging_enabled(std::env::var(DEBUG_ENV_VAR).ok().as_deref()) {
        // Another subscriber may already be installed by the host application.
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .try_init();
    }
}
