//! AIC order search and the top-level baseline fit

use super::arima::{ArimaModel, ArimaOrder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Inclusive bounds of the order grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderGrid {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
}

impl Default for OrderGrid {
    fn default() -> Self {
        Self {
            max_p: 3,
            max_d: 2,
            max_q: 3,
        }
    }
}

impl OrderGrid {
    /// Candidates with p outermost, then d, then q, all ascending
    pub fn candidates(&self) -> Vec<ArimaOrder> {
        let mut orders = Vec::with_capacity((self.max_p + 1) * (self.max_d + 1) * (self.max_q + 1));
        for p in 0..=self.max_p {
            for d in 0..=self.max_d {
                for q in 0..=self.max_q {
                    orders.push(ArimaOrder::new(p, d, q));
                }
            }
        }
        orders
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CandidateOutcome {
    Fitted { aic: f64 },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub order: ArimaOrder,
    pub outcome: CandidateOutcome,
}

/// Every candidate's outcome plus the selected order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSearch {
    pub candidates: Vec<Candidate>,
    pub best: ArimaOrder,
    /// No candidate fitted and `best` is [`ArimaOrder::FALLBACK`]
    pub used_fallback: bool,
}

impl OrderSearch {
    pub fn best_aic(&self) -> Option<f64> {
        self.candidates
            .iter()
            .find(|c| c.order == self.best)
            .and_then(|c| match c.outcome {
                CandidateOutcome::Fitted { aic } => Some(aic),
                CandidateOutcome::Skipped { .. } => None,
            })
    }

    pub fn fitted_count(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| matches!(c.outcome, CandidateOutcome::Fitted { .. }))
            .count()
    }
}

/// Fits every grid candidate (in parallel) and keeps the lowest AIC
pub fn search_order(series: &[f64], grid: &OrderGrid) -> OrderSearch {
    let candidates: Vec<Candidate> = grid
        .candidates()
        .into_par_iter()
        .map(|order| {
            let outcome = match ArimaModel::fit(series, order) {
                Ok(model) => CandidateOutcome::Fitted { aic: model.aic() },
                Err(err) => CandidateOutcome::Skipped {
                    reason: err.to_string(),
                },
            };
            Candidate { order, outcome }
        })
        .collect();

    for c in &candidates {
        match &c.outcome {
            CandidateOutcome::Fitted { aic } => debug!("{}: AIC {:.3}", c.order, aic),
            CandidateOutcome::Skipped { reason } => debug!("{} skipped: {}", c.order, reason),
        }
    }

    let selected = select_best(&candidates);
    let best = selected.unwrap_or(ArimaOrder::FALLBACK);
    if selected.is_none() {
        warn!("No ARIMA candidate could be fitted, falling back to {}", best);
    } else {
        info!("Selected {} by AIC", best);
    }

    OrderSearch {
        candidates,
        best,
        used_fallback: selected.is_none(),
    }
}

/// Lowest AIC in enumeration order; an equal AIC never displaces an earlier one
fn select_best(candidates: &[Candidate]) -> Option<ArimaOrder> {
    let mut best: Option<(ArimaOrder, f64)> = None;
    for c in candidates {
        if let CandidateOutcome::Fitted { aic } = c.outcome {
            if best.map_or(true, |(_, b)| aic < b) {
                best = Some((c.order, aic));
            }
        }
    }
    best.map(|(order, _)| order)
}

/// Result of [`fit_baseline`]
#[derive(Debug, Clone)]
pub enum BaselineFit {
    Fitted { model: ArimaModel, order: ArimaOrder },
    /// Neither the chosen order nor the fallback could be fitted
    NoModel,
}

impl BaselineFit {
    pub fn is_fitted(&self) -> bool {
        matches!(self, BaselineFit::Fitted { .. })
    }

    pub fn model(&self) -> Option<&ArimaModel> {
        match self {
            BaselineFit::Fitted { model, .. } => Some(model),
            BaselineFit::NoModel => None,
        }
    }

    pub fn order(&self) -> Option<ArimaOrder> {
        match self {
            BaselineFit::Fitted { order, .. } => Some(*order),
            BaselineFit::NoModel => None,
        }
    }

    /// Model and order, both absent when nothing could be fitted
    pub fn into_parts(self) -> (Option<ArimaModel>, Option<ArimaOrder>) {
        match self {
            BaselineFit::Fitted { model, order } => (Some(model), Some(order)),
            BaselineFit::NoModel => (None, None),
        }
    }
}

/// Fits the baseline, searching the default grid when `order` is `None`.
///
/// A failed fit retries with [`ArimaOrder::FALLBACK`]; if that fails too the
/// result is [`BaselineFit::NoModel`].
pub fn fit_baseline(series: &[f64], order: Option<ArimaOrder>) -> BaselineFit {
    let order = order.unwrap_or_else(|| search_order(series, &OrderGrid::default()).best);

    match ArimaModel::fit(series, order) {
        Ok(model) => {
            info!("Fitted {}: AIC {:.3}", order, model.aic());
            return BaselineFit::Fitted { model, order };
        }
        Err(err) => warn!("{} failed ({}), trying {}", order, err, ArimaOrder::FALLBACK),
    }

    match ArimaModel::fit(series, ArimaOrder::FALLBACK) {
        Ok(model) => BaselineFit::Fitted {
            model,
            order: ArimaOrder::FALLBACK,
        },
        Err(err) => {
            warn!("Fallback {} failed: {}", ArimaOrder::FALLBACK, err);
            BaselineFit::NoModel
        }
    }
}
