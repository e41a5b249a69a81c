//! # Input data
//!
//! The enriched daily table (OHLCV plus externally computed indicators),
//! CSV loading and the trading-day calendar used to label forecasts.

pub mod calendar;
mod io;
mod table;

pub use calendar::{business_days, next_trading_days};
pub use io::{load_table, read_table, save_forecast};
pub use table::TimeSeriesTable;
