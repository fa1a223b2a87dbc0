//! Weighted ensemble over registered providers, with accuracy-weighted
//! reweighting and NOAA staleness handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use common::config::CityConfig;
use common::{tables, AccuracyHistory, AccuracySample, EnsembleResult};
use futures_util::future::join_all;
use tracing::debug;

use crate::provider::{NoaaProvider, WeatherProvider};

/// Per-provider error samples kept longer than this are ignored when
/// computing the accuracy multiplier.
const ACCURACY_WINDOW_DAYS: i64 = 30;
/// Minimum recent-sample count before reweighting kicks in.
const MIN_ACCURACY_SAMPLES: usize = 5;
/// Bounded history length per provider (mirrors the reference implementation).
const MAX_ACCURACY_SAMPLES: usize = 100;

/// Ensemble over a fixed provider roster. Owns the accuracy-history store;
/// the only writer is the Settlement component via `record_accuracy`.
pub struct Ensemble {
    providers: Vec<Arc<dyn WeatherProvider>>,
    base_weights: HashMap<&'static str, f64>,
    /// Kept separately (in addition to `providers`) so staleness can be
    /// queried without downcasting a trait object.
    noaa: Arc<NoaaProvider>,
    accuracy: Mutex<AccuracyHistory>,
    noaa_stale_hours: f64,
    noaa_stale_penalty: f64,
}

impl Ensemble {
    pub fn new(
        noaa: Arc<NoaaProvider>,
        others: Vec<Arc<dyn WeatherProvider>>,
        base_weights: HashMap<&'static str, f64>,
        noaa_stale_hours: f64,
        noaa_stale_penalty: f64,
    ) -> Self {
        let mut providers: Vec<Arc<dyn WeatherProvider>> = vec![noaa.clone() as Arc<dyn WeatherProvider>];
        providers.extend(others);
        Self {
            providers,
            base_weights,
            noaa,
            accuracy: Mutex::new(AccuracyHistory::default()),
            noaa_stale_hours,
            noaa_stale_penalty,
        }
    }

    /// Hours since NOAA's cached `updateTime`, or `None` before the first
    /// successful NOAA fetch.
    pub fn noaa_age_hours(&self) -> Option<f64> {
        self.noaa.age_hours()
    }

    pub fn accuracy_snapshot(&self) -> AccuracyHistory {
        self.accuracy.lock().unwrap().clone()
    }

    pub fn load_accuracy(&self, history: AccuracyHistory) {
        *self.accuracy.lock().unwrap() = history;
    }

    /// Record one forecast-vs-actual error sample for `provider_name`,
    /// bounded to the most recent `MAX_ACCURACY_SAMPLES`.
    pub fn record_accuracy(&self, provider_name: &str, predicted_f: f64, actual_f: f64) {
        let mut guard = self.accuracy.lock().unwrap();
        let samples = guard.providers.entry(provider_name.to_string()).or_default();
        samples.push(AccuracySample {
            abs_error_f: (predicted_f - actual_f).abs(),
            timestamp: Utc::now(),
        });
        if samples.len() > MAX_ACCURACY_SAMPLES {
            let excess = samples.len() - MAX_ACCURACY_SAMPLES;
            samples.drain(0..excess);
        }
    }

    /// `clamp(1 / max(avg_recent_error, 0.5), 0.25, 2.0)`, or `1.0` if fewer
    /// than `MIN_ACCURACY_SAMPLES` samples fall within the rolling window.
    fn accuracy_multiplier(&self, provider_name: &str) -> f64 {
        let guard = self.accuracy.lock().unwrap();
        let Some(samples) = guard.providers.get(provider_name) else {
            return 1.0;
        };
        let cutoff = Utc::now() - chrono::Duration::days(ACCURACY_WINDOW_DAYS);
        let recent: Vec<f64> = samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .map(|s| s.abs_error_f)
            .collect();
        if recent.len() < MIN_ACCURACY_SAMPLES {
            return 1.0;
        }
        let avg_error = recent.iter().sum::<f64>() / recent.len() as f64;
        (1.0 / avg_error.max(0.5)).clamp(0.25, 2.0)
    }

    /// Run the ensemble once. `weight_overrides` multiplies a provider's
    /// effective weight (used to penalize a stale NOAA) without touching
    /// `base_weights`.
    pub async fn run(
        &self,
        city: &CityConfig,
        target_date: NaiveDate,
        weight_overrides: &HashMap<&str, f64>,
    ) -> Option<(f64, EnsembleResult)> {
        let fetches = self.providers.iter().map(|p| p.fetch_high(city, target_date));
        let results = join_all(fetches).await;

        let mut per_provider = HashMap::new();
        let mut per_provider_weight = HashMap::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for (provider, raw) in self.providers.iter().zip(results) {
            let Some(raw_temp) = raw else { continue };
            let name = provider.name();

            let bias = tables::model_bias(name, &city.code);
            let adjusted_temp = raw_temp - bias;

            let base_weight = *self.base_weights.get(name).unwrap_or(&1.0);
            let accuracy_mult = self.accuracy_multiplier(name);
            let override_mult = weight_overrides.get(name).copied().unwrap_or(1.0);
            let weight = base_weight * accuracy_mult * override_mult;

            per_provider.insert(name.to_string(), adjusted_temp);
            per_provider_weight.insert(name.to_string(), weight);
            weighted_sum += adjusted_temp * weight;
            weight_total += weight;
        }

        if weight_total <= 0.0 || per_provider.is_empty() {
            debug!("ensemble: no providers succeeded for {} {}", city.code, target_date);
            return None;
        }

        let mean_f = weighted_sum / weight_total;
        let provider_count = per_provider.len();

        Some((
            mean_f,
            EnsembleResult {
                mean_f,
                per_provider,
                per_provider_weight,
                provider_count,
                noaa_age_hours: self.noaa_age_hours(),
                noaa_stale: false,
            },
        ))
    }

    /// Run once; if NOAA's cached `updateTime` is older than the configured
    /// threshold, rerun with NOAA's weight penalized. Never mutates
    /// `base_weights`.
    pub async fn run_with_staleness_check(
        &self,
        city: &CityConfig,
        target_date: NaiveDate,
    ) -> Option<(f64, EnsembleResult)> {
        let first = self.run(city, target_date, &HashMap::new()).await?;

        let age = self.noaa_age_hours();
        let stale = age.map(|h| h >= self.noaa_stale_hours).unwrap_or(false);
        if !stale {
            return Some(first);
        }

        let mut overrides = HashMap::new();
        overrides.insert("NOAA", self.noaa_stale_penalty);
        let (mean_f, mut details) = self.run(city, target_date, &overrides).await?;
        details.noaa_stale = true;
        Some((mean_f, details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn city() -> CityConfig {
        CityConfig {
            code: "PHX".into(),
            name: "Phoenix".into(),
            lat: 33.4484,
            lon: -112.0740,
            wfo: "PSR".into(),
            grid_x: 162,
            grid_y: 57,
            station: "KPHX".into(),
            timezone: "America/Phoenix".into(),
            series_prefix: "KXHIGHTPHX".into(),
        }
    }

    fn noaa() -> Arc<NoaaProvider> {
        Arc::new(NoaaProvider::new(Duration::from_millis(1), Duration::from_secs(1)))
    }

    #[test]
    fn test_accuracy_multiplier_defaults_to_one_below_sample_floor() {
        let ens = Ensemble::new(noaa(), vec![], HashMap::new(), 6.0, 0.5);
        ens.record_accuracy("OpenMeteo_GFS", 90.0, 91.0);
        assert_eq!(ens.accuracy_multiplier("OpenMeteo_GFS"), 1.0);
    }

    #[test]
    fn test_accuracy_multiplier_clamped_both_directions() {
        let ens = Ensemble::new(noaa(), vec![], HashMap::new(), 6.0, 0.5);
        // Five near-perfect samples -> multiplier should hit the 2.0 ceiling.
        for _ in 0..5 {
            ens.record_accuracy("OpenMeteo_GFS", 90.0, 90.0);
        }
        assert_eq!(ens.accuracy_multiplier("OpenMeteo_GFS"), 2.0);

        let ens2 = Ensemble::new(noaa(), vec![], HashMap::new(), 6.0, 0.5);
        for _ in 0..5 {
            ens2.record_accuracy("OpenMeteo_ICON", 90.0, 100.0);
        }
        assert_eq!(ens2.accuracy_multiplier("OpenMeteo_ICON"), 0.25);
    }

    #[test]
    fn test_record_accuracy_bounded_to_100_samples() {
        let ens = Ensemble::new(noaa(), vec![], HashMap::new(), 6.0, 0.5);
        for i in 0..150 {
            ens.record_accuracy("NOAA", 90.0, 90.0 + i as f64 * 0.01);
        }
        let snap = ens.accuracy_snapshot();
        assert_eq!(snap.providers.get("NOAA").unwrap().len(), 100);
    }

    #[test]
    fn test_noaa_age_hours_none_before_first_fetch() {
        let p = NoaaProvider::new(Duration::from_millis(1), Duration::from_secs(1));
        assert!(p.age_hours().is_none());
    }

    struct FixedProvider {
        name: &'static str,
        temp: f64,
    }

    #[async_trait::async_trait]
    impl WeatherProvider for FixedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch_high(&self, _city: &CityConfig, _target_date: NaiveDate) -> Option<f64> {
            Some(self.temp)
        }
    }

    #[tokio::test]
    async fn test_ensemble_mean_within_individual_range() {
        let others: Vec<Arc<dyn WeatherProvider>> = vec![
            Arc::new(FixedProvider { name: "OpenMeteo_GFS", temp: 88.0 }),
            Arc::new(FixedProvider { name: "OpenMeteo_ICON", temp: 92.0 }),
        ];
        // NOAA itself will fail to fetch (no network in tests) and drop out,
        // so the mean is driven entirely by the two fixed providers.
        let ens = Ensemble::new(noaa(), others, HashMap::new(), 6.0, 0.5);
        let date = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let (mean, details) = ens.run(&city(), date, &HashMap::new()).await.unwrap();
        assert!(mean >= 88.0 && mean <= 92.0, "mean {mean} out of individual range");
        assert_eq!(details.provider_count, 2);
    }
}
