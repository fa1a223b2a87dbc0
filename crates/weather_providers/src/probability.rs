//! Probability engine: confidence scoring, fair-probability estimation,
//! Bayesian blending against the market, and fractional-Kelly sizing.

use common::{EnsembleResult, StrikeType};
use statrs::distribution::{ContinuousCDF, Normal};

/// Ensembles below this provider count carry zero confidence.
const MIN_PROVIDER_COUNT: usize = 1;

/// Standard normal CDF, Φ(x).
fn normal_cdf(x: f64) -> f64 {
    Normal::new(0.0, 1.0)
        .expect("standard normal is always valid")
        .cdf(x)
}

/// Logit (log-odds) of a probability already clamped into (0,1).
fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Inverse logit (logistic sigmoid).
fn inv_logit(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Confidence score in [0,1] from ensemble agreement and breadth.
///
/// Zero providers -> 0. Exactly one -> a fixed 0.7 baseline (too few points
/// to measure agreement). Two or more -> blend of inter-provider agreement
/// and provider-count coverage.
pub fn calculate_confidence_score(ensemble: &EnsembleResult) -> f64 {
    if ensemble.provider_count < MIN_PROVIDER_COUNT {
        return 0.0;
    }
    if ensemble.provider_count < 2 {
        return 0.7;
    }

    let temps: Vec<f64> = ensemble.per_provider.values().copied().collect();
    let n = temps.len() as f64;
    let mean = temps.iter().sum::<f64>() / n;
    let variance = temps.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let agreement = (1.0 - std_dev / 5.0).max(0.5);
    let provider_share = (ensemble.provider_count as f64 / 3.0).min(1.0);
    let raw = agreement * 0.7 + provider_share * 0.3;
    raw.clamp(0.0, 1.0)
}

/// Lead-time accuracy factor: same-day forecasts are markedly more
/// reliable than multi-day-out ones.
fn lead_time_factor(days_ahead: i64) -> f64 {
    match days_ahead {
        0 => 0.5,
        1 => 0.75,
        d => 1.0 + 0.35 * (d - 1) as f64,
    }
}

/// Model-implied probability that a binary daily-high contract settles YES,
/// given a forecast `forecast_f`, the contract's strikes, a city-and-season
/// base dispersion `city_std_dev_f`, the ensemble `confidence`, and how many
/// days out the target date is.
pub fn fair_probability(
    forecast_f: f64,
    strike_type: StrikeType,
    floor_strike: Option<i64>,
    cap_strike: Option<i64>,
    city_std_dev_f: f64,
    confidence: f64,
    days_ahead: i64,
) -> f64 {
    let confidence_mult = 1.2 - 0.2 * confidence;
    let lead_factor = lead_time_factor(days_ahead);
    let raw_std = city_std_dev_f * confidence_mult * lead_factor;
    let adjusted_std = if raw_std <= 0.0 { 1.0 } else { raw_std };

    match strike_type {
        StrikeType::Less => {
            let cap = cap_strike.unwrap_or(0) as f64;
            normal_cdf((cap - forecast_f) / adjusted_std)
        }
        StrikeType::Greater => {
            let floor = floor_strike.unwrap_or(0) as f64;
            1.0 - normal_cdf((floor - forecast_f) / adjusted_std)
        }
        StrikeType::Between => {
            let floor = floor_strike.unwrap_or(0) as f64;
            let cap = cap_strike.unwrap_or(0) as f64;
            let z_cap = normal_cdf((cap - forecast_f) / adjusted_std);
            let z_floor = normal_cdf((floor - forecast_f) / adjusted_std);
            (z_cap - z_floor).max(0.0)
        }
    }
}

/// Bayesian log-odds blend of the model and market probabilities.
/// `model_weight` of ~0.3 means the market dominates the posterior, and the
/// model nudges it. Both inputs are clamped into `[0.02, 0.98]` first so
/// logit never sees 0 or 1.
pub fn market_adjusted_fair(model_p: f64, market_p: f64, model_weight: f64) -> f64 {
    let p_m = model_p.clamp(0.02, 0.98);
    let p_k = market_p.clamp(0.02, 0.98);
    inv_logit(model_weight * logit(p_m) + (1.0 - model_weight) * logit(p_k))
}

/// Fractional-Kelly contract count for a contract costing `price_cents`
/// with a 100¢ payout, sized from the model's own (unblended) fair
/// probability so position size reflects model conviction.
pub fn kelly_size(fair_p: f64, price_cents: i64, bankroll_cents: i64, kelly_fraction: f64, max_contracts: i64) -> i64 {
    if !(0.0..1.0).contains(&fair_p) || price_cents <= 0 {
        return 0;
    }
    let cost = price_cents as f64;
    let payout = (100 - price_cents) as f64;
    let b = payout / cost;
    let q = 1.0 - fair_p;
    let f_star = (fair_p * b - q) / b;
    let f_safe = (f_star * kelly_fraction).max(0.0);
    let raw_count = (bankroll_cents as f64 * f_safe / cost).floor() as i64;
    raw_count.clamp(0, max_contracts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ensemble_with(temps: &[(&str, f64)]) -> EnsembleResult {
        let mut per_provider = HashMap::new();
        let mut per_provider_weight = HashMap::new();
        for (name, t) in temps {
            per_provider.insert(name.to_string(), *t);
            per_provider_weight.insert(name.to_string(), 1.0);
        }
        EnsembleResult {
            mean_f: temps.iter().map(|(_, t)| t).sum::<f64>() / temps.len() as f64,
            per_provider,
            per_provider_weight,
            provider_count: temps.len(),
            noaa_age_hours: None,
            noaa_stale: false,
        }
    }

    #[test]
    fn test_confidence_zero_providers() {
        let e = ensemble_with(&[]);
        assert_eq!(calculate_confidence_score(&e), 0.0);
    }

    #[test]
    fn test_confidence_single_provider_baseline() {
        let e = ensemble_with(&[("NOAA", 90.0)]);
        assert_eq!(calculate_confidence_score(&e), 0.7);
    }

    #[test]
    fn test_confidence_tight_agreement_near_one() {
        let e = ensemble_with(&[("NOAA", 90.0), ("OpenMeteo_GFS", 90.2), ("OpenMeteo_ICON", 89.9)]);
        let c = calculate_confidence_score(&e);
        assert!(c > 0.9, "expected high confidence for tight agreement, got {c}");
    }

    #[test]
    fn test_normal_cdf_round_trip_sigmoid_logit() {
        let p = 0.73;
        assert!((inv_logit(logit(p)) - p).abs() < 1e-9);
    }

    #[test]
    fn test_market_blend_full_model_weight_returns_model() {
        let blended = market_adjusted_fair(0.8, 0.3, 1.0);
        assert!((blended - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_market_blend_zero_model_weight_returns_market() {
        let blended = market_adjusted_fair(0.8, 0.3, 0.0);
        assert!((blended - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_fair_probability_in_unit_interval() {
        let p = fair_probability(88.0, StrikeType::Less, None, Some(95), 0.8, 0.9, 1);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_fair_probability_between_nonnegative() {
        let p = fair_probability(70.0, StrikeType::Between, Some(65), Some(75), 1.3, 0.8, 2);
        assert!(p >= 0.0);
    }

    #[test]
    fn test_kelly_size_zero_when_no_edge() {
        // fair_p exactly at break-even (price/100) should not produce a position.
        assert_eq!(kelly_size(0.40, 40, 100_000, 0.25, 8), 0);
    }

    #[test]
    fn test_kelly_size_clamped_to_max_contracts() {
        // bankroll=100000, p=0.60, price=40 -> raw count 208, clamp to 8.
        let count = kelly_size(0.60, 40, 100_000, 0.25, 8);
        assert_eq!(count, 8);
    }

    #[test]
    fn test_kelly_size_zero_below_min_price() {
        assert_eq!(kelly_size(0.9, 0, 100_000, 0.25, 8), 0);
    }
}
