//! Date-indexed numeric table handed over by the indicator collaborator

use crate::error::{Error, Result};
use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Daily rows ordered by date, one `f64` column per feature.
///
/// Missing cells are stored as `NaN` and rejected by [`TimeSeriesTable::select`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesTable {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    /// [rows, columns]
    values: Array2<f64>,
}

impl TimeSeriesTable {
    /// Creates a table, checking shapes and the strictly increasing date index
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if dates.len() != values.nrows() {
            return Err(Error::validation(format!(
                "{} dates for {} rows",
                dates.len(),
                values.nrows()
            )));
        }
        if columns.len() != values.ncols() {
            return Err(Error::validation(format!(
                "{} column names for {} columns",
                columns.len(),
                values.ncols()
            )));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(Error::validation(format!("duplicate column '{}'", name)));
            }
        }

        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(Error::validation(format!(
                    "dates must be strictly increasing: {} is followed by {}",
                    pair[0], pair[1]
                )));
            }
        }

        Ok(Self {
            dates,
            columns,
            values,
        })
    }

    /// Builds a table from named column vectors of equal length
    pub fn from_columns(dates: Vec<NaiveDate>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n_rows = dates.len();
        let n_cols = columns.len();
        let mut values = Array2::zeros((n_rows, n_cols));
        let mut names = Vec::with_capacity(n_cols);

        for (j, (name, column)) in columns.into_iter().enumerate() {
            if column.len() != n_rows {
                return Err(Error::validation(format!(
                    "column '{}' has {} values, expected {}",
                    name,
                    column.len(),
                    n_rows
                )));
            }
            for (i, value) in column.into_iter().enumerate() {
                values[[i, j]] = value;
            }
            names.push(name);
        }

        Self::new(dates, names, values)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// View of one column, if present
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name).map(|j| self.values.column(j))
    }

    /// Copies the named columns, in the given order, into a `[rows, features]` matrix.
    ///
    /// Fails if a column is absent or contains a missing value.
    pub fn select(&self, features: &[String]) -> Result<Array2<f64>> {
        let mut indices = Vec::with_capacity(features.len());
        for name in features {
            let j = self
                .column_index(name)
                .ok_or_else(|| Error::validation(format!("column '{}' not found", name)))?;
            indices.push(j);
        }

        let selected = self.values.select(Axis(1), &indices);

        if let Some(((row, col), _)) = selected.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::validation(format!(
                "missing value in column '{}' at {}",
                features[col], self.dates[row]
            )));
        }

        Ok(selected)
    }

    /// Drops every row that has a missing value in any column
    pub fn drop_missing(&self) -> Self {
        self.drop_missing_in(&self.columns)
    }

    /// Drops every row with a missing value in one of `columns`.
    ///
    /// Indicator columns start with warm-up gaps; unknown names are ignored.
    pub fn drop_missing_in(&self, columns: &[String]) -> Self {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        let keep: Vec<usize> = self
            .values
            .outer_iter()
            .enumerate()
            .filter(|(_, row)| indices.iter().all(|&j| row[j].is_finite()))
            .map(|(i, _)| i)
            .collect();

        Self {
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), &keep),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::calendar::business_days;

    fn sample_table() -> TimeSeriesTable {
        let dates = business_days(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 4);
        TimeSeriesTable::from_columns(
            dates,
            vec![
                ("Close".to_string(), vec![1.0, 2.0, 3.0, 4.0]),
                ("Volume".to_string(), vec![10.0, f64::NAN, 30.0, 40.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_select_preserves_order() {
        let table = sample_table().drop_missing();
        let m = table
            .select(&["Volume".to_string(), "Close".to_string()])
            .unwrap();

        assert_eq!(m.shape(), &[3, 2]);
        assert_eq!(m[[0, 0]], 10.0);
        assert_eq!(m[[0, 1]], 1.0);
        assert_eq!(m[[2, 1]], 4.0);
    }

    #[test]
    fn test_select_rejects_missing_values() {
        let table = sample_table();
        let err = table.select(&["Volume".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(table.select(&["Close".to_string()]).is_ok());
    }

    #[test]
    fn test_drop_missing_in_selected_columns() {
        let table = sample_table();

        let close_only = table.drop_missing_in(&["Close".to_string()]);
        assert_eq!(close_only.len(), 4);

        let with_volume = table.drop_missing_in(&["Close".to_string(), "Volume".to_string()]);
        assert_eq!(with_volume.len(), 3);
        assert_eq!(with_volume.dates()[1], table.dates()[2]);

        // Unknown names are left for `select` to report
        assert_eq!(table.drop_missing_in(&["RSI".to_string()]).len(), 4);
    }

    #[test]
    fn test_unknown_column() {
        let table = sample_table();
        assert!(table.select(&["RSI".to_string()]).is_err());
    }

    #[test]
    fn test_rejects_unsorted_dates() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let result = TimeSeriesTable::from_columns(
            vec![d(2), d(2), d(3)],
            vec![("Close".to_string(), vec![1.0, 2.0, 3.0])],
        );
        assert!(result.is_err());
    }
}
