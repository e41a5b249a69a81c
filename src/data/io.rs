//! CSV storage for tables and forecasts

use super::table::TimeSeriesTable;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use csv::{Reader, Writer};
use ndarray::Array2;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Loads a `Date`-indexed CSV file. Rows are sorted by date; empty cells become `NaN`.
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<TimeSeriesTable> {
    let file = File::open(path.as_ref())?;
    let table = read_table(file)?;
    info!(
        "Loaded {} rows x {} columns from {}",
        table.len(),
        table.columns().len(),
        path.as_ref().display()
    );
    Ok(table)
}

/// Reads a table from any CSV source with a header row
pub fn read_table<R: Read>(source: R) -> Result<TimeSeriesTable> {
    let mut reader = Reader::from_reader(source);
    let headers = reader.headers()?.clone();

    let date_col = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("date"))
        .ok_or_else(|| Error::validation("CSV has no 'Date' column"))?;

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != date_col)
        .map(|(_, h)| h.trim().to_string())
        .collect();

    let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();

    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let date = parse_date(&record[date_col]).ok_or_else(|| {
            Error::validation(format!(
                "row {}: cannot parse date '{}'",
                line + 1,
                &record[date_col]
            ))
        })?;

        let mut values = Vec::with_capacity(columns.len());
        for (j, field) in record.iter().enumerate() {
            if j == date_col {
                continue;
            }
            values.push(parse_value(field).ok_or_else(|| {
                Error::validation(format!("row {}: cannot parse number '{}'", line + 1, field))
            })?);
        }
        rows.push((date, values));
    }

    rows.sort_by_key(|(date, _)| *date);

    let n_rows = rows.len();
    let n_cols = columns.len();
    let mut dates = Vec::with_capacity(n_rows);
    let mut values = Array2::from_elem((n_rows, n_cols), f64::NAN);

    for (i, (date, row)) in rows.into_iter().enumerate() {
        dates.push(date);
        for (j, v) in row.into_iter().enumerate().take(n_cols) {
            values[[i, j]] = v;
        }
    }

    TimeSeriesTable::new(dates, columns, values)
}

/// Saves dated predictions as `Date,Predicted_<target>`
pub fn save_forecast<P: AsRef<Path>>(
    path: P,
    target: &str,
    points: &[(NaiveDate, f64)],
) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(["Date".to_string(), format!("Predicted_{}", target)])?;
    for (date, value) in points {
        writer.write_record([date.format(DATE_FORMAT).to_string(), value.to_string()])?;
    }

    writer.flush()?;
    Ok(())
}

fn parse_date(field: &str) -> Option<NaiveDate> {
    let field = field.trim();
    // Accept full timestamps by keeping the date part
    let date_part = field.get(..10).unwrap_or(field);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

fn parse_value(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    field.replace(',', "").parse().ok()
}
