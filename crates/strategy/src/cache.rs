//! Per-cycle forecast cache, keyed by `(city_code, target_date)` so the
//! scanner fetches each city/date ensemble at most once per scan.
//!
//! Must be constructed fresh each scan (see DESIGN.md): entries never
//! outlive one cycle.

use std::sync::Arc;

use chrono::NaiveDate;
use common::EnsembleResult;
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct ForecastEntry {
    pub mean_f: f64,
    pub details: EnsembleResult,
}

pub type ForecastCache = Arc<DashMap<(String, NaiveDate), ForecastEntry>>;

/// Create a new empty ForecastCache. Call once per scan cycle.
pub fn new_forecast_cache() -> ForecastCache {
    Arc::new(DashMap::new())
}
