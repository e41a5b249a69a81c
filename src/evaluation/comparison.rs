//! Side-by-side comparison of two metric sets

use super::metrics::MetricSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Mae,
    Mse,
    Rmse,
    R2,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Mae, Metric::Mse, Metric::Rmse, Metric::R2];

    /// R² is the only metric where larger is better
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Metric::R2)
    }

    pub fn value(&self, metrics: &MetricSet) -> f64 {
        match self {
            Metric::Mae => metrics.mae,
            Metric::Mse => metrics.mse,
            Metric::Rmse => metrics.rmse,
            Metric::R2 => metrics.r2,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Mae => write!(f, "MAE"),
            Metric::Mse => write!(f, "MSE"),
            Metric::Rmse => write!(f, "RMSE"),
            Metric::R2 => write!(f, "R²"),
        }
    }
}

/// Which side of the comparison did better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: Metric,
    pub value_a: f64,
    pub value_b: f64,
    pub winner: Winner,
    /// Percent of the larger value for error metrics, absolute difference for R²
    pub improvement: f64,
}

impl MetricComparison {
    fn new(metric: Metric, value_a: f64, value_b: f64) -> Self {
        // Ties go to B
        let a_wins = if metric.higher_is_better() {
            value_a > value_b
        } else {
            value_a < value_b
        };

        let diff = (value_a - value_b).abs();
        let improvement = if metric.higher_is_better() {
            diff
        } else {
            let denom = value_a.max(value_b);
            if denom == 0.0 {
                0.0
            } else {
                diff / denom * 100.0
            }
        };

        Self {
            metric,
            value_a,
            value_b,
            winner: if a_wins { Winner::A } else { Winner::B },
            improvement,
        }
    }
}

/// Result of [`compare`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub label_a: String,
    pub label_b: String,
    /// One entry per metric, in MAE, MSE, RMSE, R² order
    pub rows: Vec<MetricComparison>,
}

impl ComparisonReport {
    pub fn get(&self, metric: Metric) -> Option<&MetricComparison> {
        self.rows.iter().find(|r| r.metric == metric)
    }

    pub fn winner_label(&self, metric: Metric) -> Option<&str> {
        self.get(metric).map(|row| match row.winner {
            Winner::A => self.label_a.as_str(),
            Winner::B => self.label_b.as_str(),
        })
    }

    /// Number of metrics won by A and by B
    pub fn tally(&self) -> (usize, usize) {
        let a = self.rows.iter().filter(|r| r.winner == Winner::A).count();
        (a, self.rows.len() - a)
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<6} {:>14} {:>14} {:>12} {:>12}",
            "Metric", self.label_a, self.label_b, "Better", "Improvement"
        )?;
        for row in &self.rows {
            let winner = match row.winner {
                Winner::A => &self.label_a,
                Winner::B => &self.label_b,
            };
            let improvement = if row.metric.higher_is_better() {
                format!("{:.4}", row.improvement)
            } else {
                format!("{:.2}%", row.improvement)
            };
            writeln!(
                f,
                "{:<6} {:>14.4} {:>14.4} {:>12} {:>12}",
                row.metric.to_string(),
                row.value_a,
                row.value_b,
                winner,
                improvement
            )?;
        }
        Ok(())
    }
}

/// Compares two metric sets: smaller error wins, larger R² wins
pub fn compare(label_a: &str, a: &MetricSet, label_b: &str, b: &MetricSet) -> ComparisonReport {
    let rows = Metric::ALL
        .iter()
        .map(|&metric| MetricComparison::new(metric, metric.value(a), metric.value(b)))
        .collect();

    ComparisonReport {
        label_a: label_a.to_string(),
        label_b: label_b.to_string(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn metrics(mae: f64, r2: f64) -> MetricSet {
        MetricSet {
            mae,
            mse: mae * mae,
            rmse: mae,
            r2,
        }
    }

    #[test]
    fn test_smaller_error_wins() {
        let report = compare("LSTM", &metrics(2.0, 0.5), "ARIMA", &metrics(1.5, 0.5));
        let mae = report.get(Metric::Mae).unwrap();

        assert_eq!(mae.winner, Winner::B);
        assert_relative_eq!(mae.improvement, 25.0);
        assert_eq!(report.winner_label(Metric::Mae), Some("ARIMA"));
    }

    #[test]
    fn test_larger_r2_wins() {
        let report = compare("LSTM", &metrics(1.0, 0.8), "ARIMA", &metrics(1.0, 0.6));
        let r2 = report.get(Metric::R2).unwrap();

        assert_eq!(r2.winner, Winner::A);
        assert_relative_eq!(r2.improvement, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_ties_go_to_b() {
        let report = compare("LSTM", &metrics(1.0, 0.7), "ARIMA", &metrics(1.0, 0.7));
        assert!(report.rows.iter().all(|r| r.winner == Winner::B));
        assert_eq!(report.tally(), (0, 4));
    }

    #[test]
    fn test_zero_errors() {
        let report = compare("A", &metrics(0.0, 1.0), "B", &metrics(0.0, 1.0));
        assert_eq!(report.get(Metric::Mae).unwrap().improvement, 0.0);
    }

    #[test]
    fn test_report_display() {
        let report = compare("LSTM", &metrics(2.0, 0.8), "ARIMA", &metrics(1.5, 0.6));
        let text = report.to_string();
        assert!(text.contains("MAE"));
        assert!(text.contains("ARIMA"));
        assert_eq!(text.lines().count(), 5);
    }
}
