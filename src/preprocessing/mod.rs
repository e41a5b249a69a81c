//! # Data preprocessing
//!
//! Preparing data for the recurrent regressor:
//! - Chronological train/test split
//! - Scaling fitted on the train rows only
//! - Sliding windows
//!
//! ## Example
//!
//! ```rust,no_run
//! use index_forecast::data::load_table;
//! use index_forecast::preprocessing::{DataPreparer, ScalerKind};
//!
//! # fn main() -> index_forecast::Result<()> {
//! let table = load_table("data/index.csv")?;
//! let preparer = DataPreparer::new(vec!["Close".into(), "Volume".into()], "Close", 50)
//!     .with_scaler(ScalerKind::MinMax)
//!     .with_train_ratio(0.8);
//! let dataset = preparer.prepare(&table)?;
//! println!("train windows: {:?}", dataset.x_train.shape());
//! # Ok(())
//! # }
//! ```

mod dataset;
mod scaler;

pub use dataset::{create_windows, DataPreparer, ScaledDataset};
pub use scaler::{MinMaxScaler, Scaler, ScalerKind, StandardScaler};
