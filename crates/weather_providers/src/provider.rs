//! Weather forecast providers: NOAA plus four numerical-model sources.
//!
//! Every provider implements the same capability — a daily-high forecast
//! for one city on one date — behind a trait object so the ensemble never
//! matches on provider identity except to look up its bias/weight.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use common::config::CityConfig;
use serde::Deserialize;
use tracing::{debug, warn};

/// A single forecast source. Implementations must never return partial or
/// best-effort data on failure — absent (`None`) only.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Stable identifier used in bias tables, weight config, and accuracy
    /// history (e.g. `"NOAA"`, `"OpenMeteo_GFS"`).
    fn name(&self) -> &'static str;

    /// Fetch the forecast daily high (°F) for `city` on `target_date`.
    async fn fetch_high(&self, city: &CityConfig, target_date: NaiveDate) -> Option<f64>;
}

/// Shared minimum-interval throttle so a provider never exceeds roughly
/// 1 request / 300ms regardless of how many tasks call it concurrently.
struct RateGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let sleep_for = {
            let mut last = self.last_call.lock().unwrap();
            let now = Instant::now();
            let wait = match *last {
                Some(prev) if now.duration_since(prev) < self.min_interval => {
                    self.min_interval - now.duration_since(prev)
                }
                _ => Duration::ZERO,
            };
            *last = Some(now + wait);
            wait
        };
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("weather-bot/0.1 (trading bot; contact@example.com)")
        .pool_max_idle_per_host(4)
        .timeout(timeout)
        .build()
        .expect("failed to build provider HTTP client")
}

// ── NOAA ──────────────────────────────────────────────────────────────

/// `api.weather.gov` gridpoint forecast — the daily (not hourly) periods
/// endpoint, walked for the first daytime period matching `target_date`.
///
/// Caches the response's `updateTime` so the ensemble can query staleness
/// without an extra round trip.
pub struct NoaaProvider {
    client: reqwest::Client,
    gate: RateGate,
    last_update_time: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Deserialize)]
struct NoaaForecastResponse {
    properties: NoaaForecastProperties,
}

#[derive(Debug, Deserialize)]
struct NoaaForecastProperties {
    #[serde(rename = "updateTime", default)]
    update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    periods: Vec<NoaaPeriod>,
}

#[derive(Debug, Deserialize)]
struct NoaaPeriod {
    #[serde(rename = "startTime")]
    start_time: DateTime<Utc>,
    #[serde(rename = "isDaytime")]
    is_daytime: bool,
    temperature: serde_json::Value,
    #[serde(rename = "temperatureUnit", default)]
    temperature_unit: Option<String>,
}

impl NoaaProvider {
    pub fn new(min_interval: Duration, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            gate: RateGate::new(min_interval),
            last_update_time: Mutex::new(None),
        }
    }

    /// Hours since the most recent successfully cached `updateTime`, or
    /// `None` if NOAA has never been fetched successfully.
    pub fn age_hours(&self) -> Option<f64> {
        let cached = *self.last_update_time.lock().unwrap();
        cached.map(|t| (Utc::now() - t).num_milliseconds() as f64 / 3_600_000.0)
    }
}

#[async_trait]
impl WeatherProvider for NoaaProvider {
    fn name(&self) -> &'static str {
        "NOAA"
    }

    async fn fetch_high(&self, city: &CityConfig, target_date: NaiveDate) -> Option<f64> {
        self.gate.wait().await;

        let url = format!(
            "https://api.weather.gov/gridpoints/{}/{},{}/forecast",
            city.wfo, city.grid_x, city.grid_y
        );

        let resp = match self.client.get(&url).header("Accept", "application/geo+json").send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("NOAA fetch failed for {}: {}", city.name, e);
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("NOAA returned {} for {}", resp.status(), city.name);
            return None;
        }

        let parsed: NoaaForecastResponse = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("NOAA JSON parse failed for {}: {}", city.name, e);
                return None;
            }
        };

        if let Some(update_time) = parsed.properties.update_time {
            *self.last_update_time.lock().unwrap() = Some(update_time);
        }

        let tz: chrono_tz::Tz = city.timezone.parse().unwrap_or(chrono_tz::UTC);

        for period in &parsed.properties.periods {
            if !period.is_daytime {
                continue;
            }
            let local_date = period.start_time.with_timezone(&tz).date_naive();
            if local_date != target_date {
                continue;
            }

            let raw = match &period.temperature {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::Object(obj) => obj.get("value").and_then(|v| v.as_f64()),
                _ => None,
            }?;

            return Some(match period.temperature_unit.as_deref() {
                Some("C") => raw * 9.0 / 5.0 + 32.0,
                _ => raw,
            });
        }

        debug!(
            "NOAA: no daytime period for {} matched {}",
            city.name, target_date
        );
        None
    }
}

// ── Open-Meteo family (GFS, ICON, ECMWF, GEM) ────────────────────────

/// Open-Meteo-shaped numerical model: same query shape, different base
/// path and provider identity.
pub struct OpenMeteoProvider {
    provider_name: &'static str,
    base_url: &'static str,
    client: reqwest::Client,
    gate: RateGate,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    daily: OpenMeteoDaily,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoDaily {
    #[serde(default)]
    temperature_2m_max: Vec<f64>,
}

impl OpenMeteoProvider {
    fn new(provider_name: &'static str, base_url: &'static str, min_interval: Duration, timeout: Duration) -> Self {
        Self {
            provider_name,
            base_url,
            client: build_client(timeout),
            gate: RateGate::new(min_interval),
        }
    }

    pub fn gfs(min_interval: Duration, timeout: Duration) -> Self {
        Self::new("OpenMeteo_GFS", "https://api.open-meteo.com/v1/gfs", min_interval, timeout)
    }

    pub fn icon(min_interval: Duration, timeout: Duration) -> Self {
        Self::new("OpenMeteo_ICON", "https://api.open-meteo.com/v1/dwd-icon", min_interval, timeout)
    }

    pub fn ecmwf(min_interval: Duration, timeout: Duration) -> Self {
        Self::new("OpenMeteo_ECMWF", "https://api.open-meteo.com/v1/ecmwf", min_interval, timeout)
    }

    pub fn gem(min_interval: Duration, timeout: Duration) -> Self {
        Self::new("OpenMeteo_GEM", "https://api.open-meteo.com/v1/gem", min_interval, timeout)
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn name(&self) -> &'static str {
        self.provider_name
    }

    async fn fetch_high(&self, city: &CityConfig, target_date: NaiveDate) -> Option<f64> {
        self.gate.wait().await;

        let date_str = format!(
            "{:04}-{:02}-{:02}",
            target_date.year(),
            target_date.month(),
            target_date.day()
        );

        let resp = match self
            .client
            .get(self.base_url)
            .query(&[
                ("latitude", city.lat.to_string()),
                ("longitude", city.lon.to_string()),
                ("daily", "temperature_2m_max".into()),
                ("temperature_unit", "fahrenheit".into()),
                ("start_date", date_str.clone()),
                ("end_date", date_str),
                ("timezone", "auto".into()),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("{} fetch failed for {}: {}", self.provider_name, city.name, e);
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("{} returned {} for {}", self.provider_name, resp.status(), city.name);
            return None;
        }

        let parsed: OpenMeteoResponse = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("{} JSON parse failed for {}: {}", self.provider_name, city.name, e);
                return None;
            }
        };

        parsed.daily.temperature_2m_max.first().copied()
    }
}
