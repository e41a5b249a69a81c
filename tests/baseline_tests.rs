//! ADF test, order search and baseline fit through the public API

use index_forecast::baseline::{
    adf_test, fit_baseline, search_order, BaselineFit, CandidateOutcome, OrderGrid,
};
use index_forecast::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

fn shocks(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect()
}

fn price_path(n: usize, seed: u64) -> Vec<f64> {
    let mut level = 3000.0;
    shocks(n, seed)
        .into_iter()
        .map(|e| {
            level += 5.0 + 10.0 * e;
            level
        })
        .collect()
}

#[test]
fn test_adf_separates_walk_from_noise() {
    let walk = adf_test(&price_path(300, 5)).unwrap();
    assert!(!walk.is_stationary);

    let noise = adf_test(&shocks(300, 6)).unwrap();
    assert!(noise.is_stationary);
    assert!(noise.statistic < walk.statistic);
}

#[test]
fn test_search_enumerates_full_grid_in_order() {
    let series = price_path(120, 8);
    let search = search_order(&series, &OrderGrid::default());

    assert_eq!(search.candidates.len(), 48);
    let orders: Vec<_> = search.candidates.iter().map(|c| c.order).collect();
    assert_eq!(orders, OrderGrid::default().candidates());

    // The selected order has the lowest AIC and comes first among equals
    let best_aic = search.best_aic().unwrap();
    let first_at_best = search
        .candidates
        .iter()
        .find(|c| matches!(c.outcome, CandidateOutcome::Fitted { aic } if aic == best_aic))
        .unwrap();
    assert_eq!(first_at_best.order, search.best);
}

#[test]
fn test_search_is_repeatable() {
    let series = price_path(100, 13);
    let grid = OrderGrid {
        max_p: 2,
        max_d: 1,
        max_q: 2,
    };
    let first = search_order(&series, &grid);
    for _ in 0..3 {
        assert_eq!(search_order(&series, &grid), first);
    }
}

#[test]
fn test_fit_baseline_forecasts_in_price_units() {
    let series = price_path(200, 21);
    let (train, test) = series.split_at(180);

    let fit = fit_baseline(train, None);
    let model = fit.model().unwrap();
    let forecast = model.forecast(test.len());

    assert_eq!(forecast.len(), 20);
    // Re-integrated forecasts stay near the last observed level
    let last = train[train.len() - 1];
    assert!(forecast.iter().all(|v| (v - last).abs() < 500.0));
    assert!(model.evaluate(test).unwrap().mae.is_finite());
}

#[test]
fn test_fit_baseline_without_any_model() {
    let fit = fit_baseline(&[1.0, 2.0], Some(ArimaOrder::new(0, 0, 0)));
    assert!(matches!(fit, BaselineFit::NoModel));
    assert_eq!(fit.into_parts().1, None);
}
