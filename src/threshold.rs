//! ## Percentile threshold resolution
//!
//! This module computes the trip distance value at a given percentile of the input.
//!
//! Three methods are available through [`InterpolationMethod`]:
//!
//! - **Linear** (default): exact linear interpolation between the two closest order
//!   statistics. With `n` valid values sorted ascending as `x[0..n]` and a percentile `p`,
//!   `h = (n - 1) * p / 100` and the threshold is `x[floor(h)] + (h - floor(h)) * (x[ceil(h)] - x[floor(h)])`.
//! - **NearestRank**: the smallest observed value with at least `p`% of the values at or below it,
//!   `x[ceil(n * p / 100) - 1]`.
//! - **Approximate**: DataFusion's t-digest `approx_percentile_cont`. Fast and bounded in memory,
//!   but not exact.
//!
//! Null and NaN distances are not part of the distribution. The exact methods never collect the
//! column: they count the valid values, then stream a sorted scan and keep only the one or two
//! order statistics they need, sorting from whichever end of the distribution is closer.
//! The sort is an external sort, so under a memory limit it spills to disk instead of failing.
//!
//! Column names are matched exactly, including case (`VendorID`, `Trip_Distance`).

use crate::exceptions::{TripFilterError, TripFilterResult};
use arrow::datatypes::DataType;
use datafusion::common::{exec_datafusion_err, plan_datafusion_err};
use datafusion::functions_aggregate::expr_fn::approx_percentile_cont;
use datafusion::prelude::DataFrame;
use datafusion::scalar::ScalarValue;
use datafusion_expr::{cast, ident, lit, not, Expr};
use futures::StreamExt;
use datafusion_functions::math::expr_fn::isnan;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Alias of the single column the resolver projects the distances into.
const VALUE_ALIAS: &str = "__trip_distance_value";

/// An integer percentile in `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Percentile(u8);

impl Percentile {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;
    pub const DEFAULT: Percentile = Percentile(90);

    /// Creates a percentile, rejecting values outside `1..=100`.
    pub fn new(value: u8) -> TripFilterResult<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TripFilterError::InvalidParameter(format!(
                "percentile {} must be between {} and {}",
                value,
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The percentile as a fraction in `(0, 1]`.
    pub fn fraction(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl Default for Percentile {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Percentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Percentile {
    type Err = TripFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u8 = s.trim().parse().map_err(|_| {
            TripFilterError::InvalidParameter(format!(
                "percentile '{}' must be an integer between 1 and 100",
                s
            ))
        })?;
        Self::new(value)
    }
}

/// How the percentile value is derived from the distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMethod {
    #[default]
    Linear,
    NearestRank,
    Approximate,
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterpolationMethod::Linear => "linear",
            InterpolationMethod::NearestRank => "nearest-rank",
            InterpolationMethod::Approximate => "approximate",
        };
        f.write_str(name)
    }
}

impl FromStr for InterpolationMethod {
    type Err = TripFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(InterpolationMethod::Linear),
            "nearest-rank" | "nearest_rank" => Ok(InterpolationMethod::NearestRank),
            "approximate" | "approx" => Ok(InterpolationMethod::Approximate),
            other => Err(TripFilterError::InvalidParameter(format!(
                "unknown interpolation method '{}'",
                other
            ))),
        }
    }
}

/// The resolved percentile boundary of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    /// The distance value rows are compared against.
    pub value: f64,
    /// Number of valid (non-null, non-NaN) distances the value was computed from.
    pub observations: usize,
}

/// Positions in the ascending order of `n` values that an exact method needs.
///
/// `lower` and `upper` are zero-based ranks, `weight` is the share of `upper` in the result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RankWindow {
    pub lower: usize,
    pub upper: usize,
    pub weight: f64,
}

impl RankWindow {
    /// Ranks for linear interpolation. Integer arithmetic keeps `p = 100` exactly on the maximum.
    pub fn linear(n: usize, percentile: Percentile) -> Self {
        debug_assert!(n > 0);
        let scaled = (n as u128 - 1) * u128::from(percentile.value());
        let lower = (scaled / 100) as usize;
        let remainder = (scaled % 100) as u32;
        if remainder == 0 {
            Self {
                lower,
                upper: lower,
                weight: 0.0,
            }
        } else {
            Self {
                lower,
                upper: lower + 1,
                weight: f64::from(remainder) / 100.0,
            }
        }
    }

    /// Rank of the nearest-rank percentile.
    pub fn nearest_rank(n: usize, percentile: Percentile) -> Self {
        debug_assert!(n > 0);
        let rank = (n as u128 * u128::from(percentile.value())).div_ceil(100) as usize;
        let index = rank.saturating_sub(1).min(n - 1);
        Self {
            lower: index,
            upper: index,
            weight: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.upper - self.lower + 1
    }

    /// Combines the values found at `lower` and `upper`.
    pub fn interpolate(&self, lower_value: f64, upper_value: f64) -> f64 {
        if self.weight == 0.0 || lower_value == upper_value {
            return lower_value;
        }
        let value = lower_value + self.weight * (upper_value - lower_value);
        value.clamp(lower_value, upper_value)
    }
}

/// Returns the expression reading the distance column as `Float64`.
pub(crate) fn distance_expr(column: &str) -> Expr {
    cast(ident(column), DataType::Float64)
}

/// Returns the predicate selecting rows with a usable distance value.
///
/// Integer and decimal columns cannot hold NaN, so only float columns get the NaN check.
pub(crate) fn valid_distance(column: &str, data_type: &DataType) -> Expr {
    let present = ident(column).is_not_null();
    if data_type.is_floating() {
        present.and(not(isnan(distance_expr(column))))
    } else {
        present
    }
}

/// Checks that `column` exists in `df` and is numeric, returning its type.
pub(crate) fn distance_column_type(df: &DataFrame, column: &str) -> TripFilterResult<DataType> {
    let field = df
        .schema()
        .field_with_unqualified_name(column)
        .map_err(|_| {
            TripFilterError::SchemaError(format!("column '{}' not found in input", column))
        })?;
    let data_type = field.data_type().clone();
    if data_type.is_numeric() {
        Ok(data_type)
    } else {
        Err(TripFilterError::SchemaError(format!(
            "column '{}' must be numeric, found {}",
            column, data_type
        )))
    }
}

/// Computes the `percentile` threshold of `column` in `df`.
///
/// `reference` only names the input in error messages.
pub async fn resolve_threshold(
    df: &DataFrame,
    reference: &str,
    column: &str,
    percentile: Percentile,
    method: InterpolationMethod,
) -> TripFilterResult<Threshold> {
    let data_type = distance_column_type(df, column)?;

    let values = df
        .clone()
        .filter(valid_distance(column, &data_type))?
        .select(vec![distance_expr(column).alias(VALUE_ALIAS)])?;

    let observations = values.clone().count().await?;
    if observations == 0 {
        return Err(TripFilterError::EmptyDataset(reference.to_string()));
    }

    let value = match method {
        InterpolationMethod::Linear => {
            order_statistics(values, observations, RankWindow::linear(observations, percentile))
                .await?
        }
        InterpolationMethod::NearestRank => {
            order_statistics(
                values,
                observations,
                RankWindow::nearest_rank(observations, percentile),
            )
            .await?
        }
        InterpolationMethod::Approximate => approximate(values, percentile).await?,
    };

    debug!(
        input = reference,
        column,
        %percentile,
        %method,
        observations,
        threshold = value,
        "resolved threshold"
    );
    Ok(Threshold {
        value,
        observations,
    })
}

/// Fetches the values at the ranks of `window` and interpolates between them.
///
/// Ranks in the upper half are read from a descending sort, so fewer rows are skipped.
/// The sorted stream is dropped as soon as the window is complete.
async fn order_statistics(
    values: DataFrame,
    n: usize,
    window: RankWindow,
) -> TripFilterResult<f64> {
    let descending = window.lower >= n / 2;
    let mut skip = if descending {
        n - 1 - window.upper
    } else {
        window.lower
    };

    // No limit here: a sort with a fetch becomes a TopK, which holds `skip` rows in memory.
    let mut stream = values
        .sort(vec![ident(VALUE_ALIAS).sort(!descending, false)])?
        .execute_stream()
        .await?;

    let mut found = Vec::with_capacity(window.len());
    while let Some(batch) = stream.next().await {
        let batch = batch?;
        let rows = batch.num_rows();
        if skip >= rows {
            skip -= rows;
            continue;
        }
        for row in skip..rows {
            match ScalarValue::try_from_array(batch.column(0), row)? {
                ScalarValue::Float64(Some(v)) => found.push(v),
                other => {
                    return Err(TripFilterError::SchemaError(format!(
                        "unexpected distance value {:?} while resolving threshold",
                        other
                    )))
                }
            }
            if found.len() == window.len() {
                break;
            }
        }
        skip = 0;
        if found.len() == window.len() {
            break;
        }
    }
    if found.len() != window.len() {
        return Err(exec_datafusion_err!(
            "expected {} order statistics, found {}",
            window.len(),
            found.len()
        )
        .into());
    }
    if descending {
        found.reverse();
    }
    Ok(window.interpolate(found[0], found[found.len() - 1]))
}

/// Computes the threshold with the engine's t-digest approximation.
async fn approximate(values: DataFrame, percentile: Percentile) -> TripFilterResult<f64> {
    let batches = values
        .aggregate(
            vec![],
            vec![
                approx_percentile_cont(ident(VALUE_ALIAS), lit(percentile.fraction()), None)
                    .alias("threshold"),
            ],
        )?
        .collect()
        .await?;
    let batch = batches.first().ok_or_else(|| {
        plan_datafusion_err!("No data found when computing the approximate percentile")
    })?;
    match ScalarValue::try_from_array(batch.column(0), 0)? {
        ScalarValue::Float64(Some(v)) => Ok(v),
        other => Err(plan_datafusion_err!(
            "Failed to compute approximate percentile, got {:?}",
            other
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p(value: u8) -> Percentile {
        Percentile::new(value).unwrap()
    }

    /// Linear percentile over an in-memory slice, for checking the rank arithmetic.
    fn linear_over(sorted: &[f64], percentile: Percentile) -> f64 {
        let window = RankWindow::linear(sorted.len(), percentile);
        window.interpolate(sorted[window.lower], sorted[window.upper])
    }

    #[test]
    fn test_percentile_bounds() {
        assert!(Percentile::new(0).is_err());
        assert!(Percentile::new(101).is_err());
        assert_eq!(Percentile::new(1).unwrap().value(), 1);
        assert_eq!(Percentile::new(100).unwrap().value(), 100);
        assert_eq!(Percentile::default().value(), 90);
    }

    #[test]
    fn test_percentile_from_str() {
        assert_eq!("75".parse::<Percentile>().unwrap(), p(75));
        assert!("abc".parse::<Percentile>().is_err());
        assert!("0".parse::<Percentile>().is_err());
        assert!("250".parse::<Percentile>().is_err());
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!(
            "linear".parse::<InterpolationMethod>().unwrap(),
            InterpolationMethod::Linear
        );
        assert_eq!(
            "Nearest-Rank".parse::<InterpolationMethod>().unwrap(),
            InterpolationMethod::NearestRank
        );
        assert_eq!(
            "approx".parse::<InterpolationMethod>().unwrap(),
            InterpolationMethod::Approximate
        );
        assert!("cubic".parse::<InterpolationMethod>().is_err());
    }

    #[test]
    fn test_linear_window() {
        // h = 4 * 0.9 = 3.6
        let window = RankWindow::linear(5, p(90));
        assert_eq!((window.lower, window.upper), (3, 4));
        assert_relative_eq!(window.weight, 0.6);

        let window = RankWindow::linear(5, p(100));
        assert_eq!((window.lower, window.upper), (4, 4));
        assert_eq!(window.len(), 1);

        let window = RankWindow::linear(1, p(37));
        assert_eq!((window.lower, window.upper), (0, 0));
    }

    #[test]
    fn test_linear_values() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert_relative_eq!(linear_over(&sorted, p(90)), 61.6, epsilon = 1e-9);
        assert_relative_eq!(linear_over(&sorted, p(50)), 3.0);
        assert_relative_eq!(linear_over(&sorted, p(100)), 100.0);
        assert_relative_eq!(linear_over(&sorted, p(1)), 1.04, epsilon = 1e-9);

        let ties = [10.0, 10.0, 10.0, 10.0];
        assert_eq!(linear_over(&ties, p(50)), 10.0);
    }

    #[test]
    fn test_nearest_rank_window() {
        assert_eq!(RankWindow::nearest_rank(5, p(90)).lower, 4);
        assert_eq!(RankWindow::nearest_rank(5, p(40)).lower, 1);
        assert_eq!(RankWindow::nearest_rank(5, p(1)).lower, 0);
        assert_eq!(RankWindow::nearest_rank(5, p(100)).lower, 4);
        assert_eq!(RankWindow::nearest_rank(10, p(50)).lower, 4);
    }

    #[test]
    fn test_interpolate_never_leaves_window() {
        let window = RankWindow {
            lower: 0,
            upper: 1,
            weight: 0.99,
        };
        let value = window.interpolate(0.1, 0.30000000000000004);
        assert!(value >= 0.1 && value <= 0.30000000000000004);
    }
}
