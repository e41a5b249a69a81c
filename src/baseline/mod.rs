//! # Statistical baseline
//!
//! Classical ARIMA benchmark for the sequence regressors:
//!
//! - ADF stationarity test with AIC lag selection
//! - ARIMA(p, d, q) fitted by conditional least squares
//! - AIC order search over a small grid with a fixed fallback order

mod arima;
mod ols;
mod search;
mod stationarity;

pub use arima::{difference, ArimaError, ArimaModel, ArimaOrder};
pub use search::{
    fit_baseline, search_order, BaselineFit, Candidate, CandidateOutcome, OrderGrid, OrderSearch,
};
pub use stationarity::{
    adf_test, adf_test_with_lag, mackinnon_p_value, CriticalValues, StationarityReport,
    SIGNIFICANCE,
};
