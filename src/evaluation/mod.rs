//! # Evaluation
//!
//! Regression metrics and the two-model comparator.

mod comparison;
mod metrics;

pub use comparison::{compare, ComparisonReport, Metric, MetricComparison, Winner};
pub use metrics::{mae, mse, r2_score, rmse, MetricSet};
