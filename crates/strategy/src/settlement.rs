//! Resolves open positions against the venue's settlement result, updates
//! P&L, and feeds observed-vs-forecast error back into the ensemble's
//! accuracy history.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use common::config::CityConfig;
use common::{DaemonState, Error, PnLLedger, Position};
use kalshi_client::KalshiRestClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use weather_providers::Ensemble;

use crate::dates::parse_settlement_date;
use crate::notifications::Notifier;
use crate::persistence::{record_pnl, Persistence};

/// One resolved position, logged to `settlements.jsonl`.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementEntry {
    pub ticker: String,
    pub city: String,
    pub won: bool,
    pub pnl_cents: i64,
    pub actual_f: Option<f64>,
    pub timestamp: chrono::DateTime<Utc>,
    pub paper: bool,
}

/// Outcome of running settlement once over the held positions.
#[derive(Debug, Default)]
pub struct SettlementSummary {
    pub resolved: usize,
    pub still_open: usize,
    pub total_pnl_delta_cents: i64,
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("weather-bot/0.1 (trading bot; contact@example.com)")
        .timeout(Duration::from_secs(15))
        .build()
        .expect("failed to build observations HTTP client")
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    features: Vec<ObservationFeature>,
}

#[derive(Debug, Deserialize)]
struct ObservationFeature {
    properties: ObservationProperties,
}

#[derive(Debug, Deserialize)]
struct ObservationProperties {
    temperature: ObservationValue,
}

#[derive(Debug, Deserialize)]
struct ObservationValue {
    value: Option<f64>,
}

/// Maximum observed high (°F) for `station` over the UTC calendar day
/// `date`, or `None` if the request fails or no readings have a value.
async fn fetch_observed_high(client: &reqwest::Client, station: &str, date: NaiveDate) -> Option<f64> {
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    let end = (date + chrono::Duration::days(1)).and_hms_opt(0, 0, 0)?.and_utc();

    let url = format!(
        "https://api.weather.gov/stations/{station}/observations?start={}&end={}",
        start.to_rfc3339(),
        end.to_rfc3339()
    );

    let resp = client.get(&url).send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let body: ObservationsResponse = resp.json().await.ok()?;

    body.features
        .iter()
        .filter_map(|f| f.properties.temperature.value)
        .map(|celsius| celsius * 9.0 / 5.0 + 32.0)
        .fold(None, |acc: Option<f64>, f| Some(acc.map_or(f, |m| m.max(f))))
}

/// Resolve every open position: query the venue for a result, update P&L,
/// fetch the actual observed high, and feed per-provider accuracy.
/// A single position's failure is logged and does not block the rest.
pub async fn run_settlement(
    rest: &KalshiRestClient,
    ensemble: &Ensemble,
    persistence: &Persistence,
    notifier: &Notifier,
    cities: &[CityConfig],
    state: &mut DaemonState,
    pnl: &mut PnLLedger,
) -> SettlementSummary {
    let client = build_client();
    let mut summary = SettlementSummary::default();
    let mut still_open = Vec::new();

    for position in std::mem::take(&mut state.positions) {
        match resolve_one(&client, rest, ensemble, persistence, notifier, cities, pnl, &position).await {
            Ok(Some(pnl_delta)) => {
                summary.resolved += 1;
                summary.total_pnl_delta_cents += pnl_delta;
                state.total_pnl_cents += pnl_delta;
            }
            Ok(None) => {
                summary.still_open += 1;
                still_open.push(position);
            }
            Err(e) => {
                warn!("settlement: failed to resolve {}: {}", position.opportunity.ticker, e);
                still_open.push(position);
            }
        }
    }

    state.positions = still_open;
    summary
}

/// Returns `Ok(Some(pnl_delta))` if the position settled, `Ok(None)` if
/// still open, `Err` on a transient failure (position is retained).
async fn resolve_one(
    client: &reqwest::Client,
    rest: &KalshiRestClient,
    ensemble: &Ensemble,
    persistence: &Persistence,
    notifier: &Notifier,
    cities: &[CityConfig],
    pnl: &mut PnLLedger,
    position: &Position,
) -> Result<Option<i64>, Error> {
    let market = rest.get_market(&position.opportunity.ticker).await?;

    let Some(result) = market.result.as_ref() else {
        return Ok(None);
    };

    let won = result.eq_ignore_ascii_case(position.opportunity.side.as_str());
    let pnl_cents = if won {
        (100 - position.opportunity.price_cents) * position.count
    } else {
        -(position.opportunity.price_cents * position.count)
    };

    let settlement_date = parse_settlement_date(&position.opportunity.ticker, position.opportunity.target_date);
    record_pnl(pnl, settlement_date, pnl_cents, won);
    if let Err(e) = persistence.save_pnl(pnl) {
        warn!("settlement: failed to persist pnl.json: {}", e);
    }

    let city_cfg = cities.iter().find(|c| c.code == position.opportunity.city);
    let mut actual_f = None;
    if let Some(city) = city_cfg {
        actual_f = fetch_observed_high(client, &city.station, settlement_date).await;
        if let Some(actual) = actual_f {
            for (provider, predicted) in &position.opportunity.ensemble_details.per_provider {
                ensemble.record_accuracy(provider, *predicted, actual);
            }
            let history = ensemble.accuracy_snapshot();
            if let Err(e) = persistence.save_accuracy(&history) {
                warn!("settlement: failed to persist accuracy.json: {}", e);
            }
        } else {
            debug!(
                "settlement: no observation available for {} on {}",
                city.station, settlement_date
            );
        }
    }

    let entry = SettlementEntry {
        ticker: position.opportunity.ticker.clone(),
        city: position.opportunity.city.clone(),
        won,
        pnl_cents,
        actual_f,
        timestamp: Utc::now(),
        paper: position.paper,
    };
    if let Err(e) = persistence.append_settlement(&entry) {
        warn!("settlement: failed to append settlement log: {}", e);
    }
    if position.paper {
        if let Err(e) = persistence.append_paper_trade(&entry) {
            warn!("settlement: failed to append paper trade log: {}", e);
        }
    }

    notifier
        .notify_settlement(
            &position.opportunity.ticker,
            won,
            pnl_cents,
            Some(position.opportunity.forecast_f),
            actual_f,
            pnl_cents,
            position.paper,
        )
        .await;

    Ok(Some(pnl_cents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_observed_high_picks_max() {
        let features = vec![
            ObservationFeature { properties: ObservationProperties { temperature: ObservationValue { value: Some(30.0) } } },
            ObservationFeature { properties: ObservationProperties { temperature: ObservationValue { value: Some(32.0) } } },
            ObservationFeature { properties: ObservationProperties { temperature: ObservationValue { value: None } } },
        ];
        let max_c = features
            .iter()
            .filter_map(|f| f.properties.temperature.value)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m: f64| m.max(v))));
        assert_eq!(max_c, Some(32.0));
    }

    #[test]
    fn test_won_matches_side_case_insensitive() {
        assert!("yes".eq_ignore_ascii_case("yes"));
        assert!(!"no".eq_ignore_ascii_case("yes"));
    }
}
