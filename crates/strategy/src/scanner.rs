//! Scans every configured city's open events for mispriced daily-high
//! contracts, in the filter-cascade order described in the design doc:
//! market validity -> liquidity -> strike proximity -> provider spread ->
//! confidence floor -> per-side Bayesian edge evaluation.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use common::config::{BotConfig, CityConfig, StrategyConfig};
use common::{ContractMarket, EnsembleResult, EventInfo, MarketInfo, Opportunity, Side, StrikeType};
use kalshi_client::KalshiRestClient;
use serde::Serialize;
use tracing::{debug, warn};
use weather_providers::probability::{calculate_confidence_score, fair_probability, market_adjusted_fair};
use weather_providers::Ensemble;

use crate::cache::ForecastCache;
use crate::dates::parse_event_date;

/// Provider forecasts spreading further than this (°F) across an event
/// disqualify the whole event — the model itself is too uncertain.
const MAX_PROVIDER_SPREAD_F: f64 = 6.0;

/// One scanner decision, kept for the backtest JSONL log regardless of
/// whether it produced a trade.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestEntry {
    pub ticker: String,
    pub event_ticker: String,
    pub city: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

fn bt(ticker: &str, event_ticker: &str, city: &str, reason: &str) -> BacktestEntry {
    BacktestEntry {
        ticker: ticker.to_string(),
        event_ticker: event_ticker.to_string(),
        city: city.to_string(),
        reason: reason.to_string(),
        timestamp: Utc::now(),
    }
}

enum SideOutcome {
    Opportunity(Box<Opportunity>),
    /// No opportunity on this side; does not affect the other side.
    Skip(&'static str),
    /// The model/market disagreement was too large to trust either side.
    SkipContract(&'static str),
}

/// Forecast and confidence shared by every market within one event.
struct EventContext<'a> {
    city: &'a str,
    forecast_f: f64,
    confidence: f64,
    city_std_dev_f: f64,
    days_ahead: i64,
    ensemble_details: &'a EnsembleResult,
}

/// Run the full scan across every configured city. Returns ranked
/// opportunities (descending `adjusted_edge_cents`) plus a flat backtest
/// log of every skip/emit decision along the way.
pub async fn scan(
    rest: &KalshiRestClient,
    ensemble: &Ensemble,
    cfg: &BotConfig,
    cache: &ForecastCache,
) -> (Vec<Opportunity>, Vec<BacktestEntry>) {
    let mut opportunities = Vec::new();
    let mut backtest = Vec::new();

    for city in &cfg.cities {
        let events = match rest
            .get_events(Some(&city.series_prefix), Some("open"), true, Some(5), None)
            .await
        {
            Ok((events, _cursor)) => events,
            Err(e) => {
                warn!("scanner: failed to fetch events for {}: {}", city.name, e);
                continue;
            }
        };

        for event in &events {
            scan_event(event, city, ensemble, &cfg.strategy, cache, &mut opportunities, &mut backtest).await;
        }
    }

    opportunities.sort_by(|a, b| {
        b.adjusted_edge_cents
            .partial_cmp(&a.adjusted_edge_cents)
            .unwrap_or(Ordering::Equal)
    });

    (opportunities, backtest)
}

async fn scan_event(
    event: &EventInfo,
    city: &CityConfig,
    ensemble: &Ensemble,
    cfg: &StrategyConfig,
    cache: &ForecastCache,
    opportunities: &mut Vec<Opportunity>,
    backtest: &mut Vec<BacktestEntry>,
) {
    let Some(target_date) = parse_event_date(&event.title) else {
        debug!("scanner: could not parse target date from title '{}'", event.title);
        backtest.push(bt("", &event.event_ticker, &city.code, "unparseable_event_date"));
        return;
    };

    let today = Utc::now().date_naive();
    let days_ahead = (target_date - today).num_days().max(0);
    let city_std_dev_f = common::tables::city_std_dev(&city.code, target_date);

    let key = (city.code.clone(), target_date);
    let entry = if let Some(cached) = cache.get(&key) {
        Some((cached.mean_f, cached.details.clone()))
    } else {
        match ensemble.run_with_staleness_check(city, target_date).await {
            Some((mean_f, details)) => {
                cache.insert(key, crate::cache::ForecastEntry { mean_f, details: details.clone() });
                Some((mean_f, details))
            }
            None => None,
        }
    };

    let Some((forecast_f, details)) = entry else {
        backtest.push(bt("", &event.event_ticker, &city.code, "no_forecast"));
        return;
    };

    if details.provider_count >= 2 {
        let temps: Vec<f64> = details.per_provider.values().copied().collect();
        let spread = temps.iter().cloned().fold(f64::MIN, f64::max) - temps.iter().cloned().fold(f64::MAX, f64::min);
        if spread > MAX_PROVIDER_SPREAD_F {
            backtest.push(bt("", &event.event_ticker, &city.code, "provider_spread_too_wide"));
            return;
        }
    }

    let confidence = calculate_confidence_score(&details);
    if confidence < cfg.min_confidence_score {
        backtest.push(bt("", &event.event_ticker, &city.code, "confidence_below_floor"));
        return;
    }

    let ctx = EventContext {
        city: &city.code,
        forecast_f,
        confidence,
        city_std_dev_f,
        days_ahead,
        ensemble_details: &details,
    };

    for market in &event.markets {
        let Some(contract) = contract_from_market(market, &event.event_ticker, &city.code, target_date) else {
            continue;
        };
        let (mut opps, mut entries) = scan_market(&contract, &ctx, cfg);
        opportunities.append(&mut opps);
        backtest.append(&mut entries);
    }
}

fn contract_from_market(
    market: &MarketInfo,
    event_ticker: &str,
    city: &str,
    target_date: NaiveDate,
) -> Option<ContractMarket> {
    let strike_type = StrikeType::from_str(market.strike_type.as_deref().unwrap_or(""))?;
    if market.floor_strike.is_none() && market.cap_strike.is_none() {
        return None;
    }
    Some(ContractMarket {
        ticker: market.ticker.clone(),
        event_ticker: event_ticker.to_string(),
        city: city.to_string(),
        target_date,
        strike_type,
        floor_strike: market.floor_strike,
        cap_strike: market.cap_strike,
        yes_ask_cents: market.yes_ask,
        yes_bid_cents: market.yes_bid,
        volume: market.volume_24h,
    })
}

fn scan_market(
    market: &ContractMarket,
    ctx: &EventContext,
    cfg: &StrategyConfig,
) -> (Vec<Opportunity>, Vec<BacktestEntry>) {
    let mut opportunities = Vec::new();
    let mut backtest = Vec::new();

    if market.yes_ask_cents == 0 && market.yes_bid_cents == 0 {
        backtest.push(bt(&market.ticker, &market.event_ticker, &market.city, "no_market"));
        return (opportunities, backtest);
    }
    if market.volume < cfg.min_volume {
        backtest.push(bt(&market.ticker, &market.event_ticker, &market.city, "low_volume"));
        return (opportunities, backtest);
    }
    if market.yes_ask_cents - market.yes_bid_cents > cfg.max_spread_cents {
        backtest.push(bt(&market.ticker, &market.event_ticker, &market.city, "illiquid_spread"));
        return (opportunities, backtest);
    }

    let nearest_strike_distance = [market.floor_strike, market.cap_strike]
        .into_iter()
        .flatten()
        .map(|strike| (ctx.forecast_f - strike as f64).abs())
        .fold(f64::INFINITY, f64::min);
    if nearest_strike_distance <= cfg.strike_proximity_threshold_f {
        backtest.push(bt(&market.ticker, &market.event_ticker, &market.city, "strike_too_close"));
        return (opportunities, backtest);
    }

    let model_fair_p = fair_probability(
        ctx.forecast_f,
        market.strike_type,
        market.floor_strike,
        market.cap_strike,
        ctx.city_std_dev_f,
        ctx.confidence,
        ctx.days_ahead,
    );
    let model_fair_cents = (model_fair_p * 100.0).round().clamp(0.0, 100.0) as i64;
    let half_spread = (market.yes_ask_cents - market.yes_bid_cents) as f64 / 2.0;

    match evaluate_yes_side(market, ctx, model_fair_cents, half_spread, cfg) {
        SideOutcome::Opportunity(opp) => opportunities.push(*opp),
        SideOutcome::Skip(reason) => {
            backtest.push(bt(&market.ticker, &market.event_ticker, &market.city, reason));
        }
        SideOutcome::SkipContract(reason) => {
            backtest.push(bt(&market.ticker, &market.event_ticker, &market.city, reason));
            return (opportunities, backtest);
        }
    }

    match evaluate_no_side(market, ctx, model_fair_cents, half_spread, cfg) {
        SideOutcome::Opportunity(opp) => opportunities.push(*opp),
        SideOutcome::Skip(reason) => {
            backtest.push(bt(&market.ticker, &market.event_ticker, &market.city, reason));
        }
        SideOutcome::SkipContract(reason) => {
            backtest.push(bt(&market.ticker, &market.event_ticker, &market.city, reason));
        }
    }

    (opportunities, backtest)
}

fn evaluate_yes_side(
    market: &ContractMarket,
    ctx: &EventContext,
    model_fair_cents: i64,
    half_spread: f64,
    cfg: &StrategyConfig,
) -> SideOutcome {
    let yes_ask = market.yes_ask_cents;
    if yes_ask <= 0 || yes_ask >= 95 {
        return SideOutcome::Skip("yes_ask_out_of_range");
    }
    if yes_ask < cfg.min_yes_price_cents {
        // Falls through to the NO side rather than killing the contract.
        return SideOutcome::Skip("yes_below_min_price");
    }
    if (model_fair_cents - yes_ask).abs() > cfg.max_disagreement_cents {
        return SideOutcome::SkipContract("model_disagreement_yes");
    }

    let blended_p = market_adjusted_fair(model_fair_cents as f64 / 100.0, yes_ask as f64 / 100.0, cfg.model_weight);
    let blended_fair_cents = (blended_p * 100.0).round() as i64;
    if (blended_fair_cents - yes_ask).abs() > cfg.max_disagreement_cents {
        return SideOutcome::SkipContract("blended_disagreement_yes");
    }
    if blended_fair_cents as f64 / yes_ask as f64 > cfg.max_fair_market_ratio {
        return SideOutcome::SkipContract("fair_ratio_yes");
    }

    let raw_edge = blended_fair_cents as f64 - yes_ask as f64 - half_spread;
    let adjusted_edge = raw_edge * ctx.confidence;
    if adjusted_edge < cfg.min_edge_cents as f64 {
        return SideOutcome::Skip("edge_below_min_yes");
    }
    if adjusted_edge > cfg.max_edge_cents as f64 {
        return SideOutcome::Skip("edge_above_max_yes_stale");
    }

    SideOutcome::Opportunity(Box::new(Opportunity {
        ticker: market.ticker.clone(),
        event_ticker: market.event_ticker.clone(),
        city: ctx.city.to_string(),
        target_date: market.target_date,
        side: Side::Yes,
        price_cents: yes_ask,
        model_fair_cents,
        blended_fair_cents,
        raw_edge_cents: raw_edge,
        adjusted_edge_cents: adjusted_edge,
        confidence: ctx.confidence,
        forecast_f: ctx.forecast_f,
        ensemble_details: ctx.ensemble_details.clone(),
        floor_strike: market.floor_strike,
        cap_strike: market.cap_strike,
        volume: market.volume,
    }))
}

fn evaluate_no_side(
    market: &ContractMarket,
    ctx: &EventContext,
    model_fair_cents: i64,
    half_spread: f64,
    cfg: &StrategyConfig,
) -> SideOutcome {
    let yes_bid = market.yes_bid_cents;
    let no_price = 100 - yes_bid;
    if yes_bid <= 0 || yes_bid <= 5 {
        return SideOutcome::Skip("yes_bid_out_of_range");
    }
    if no_price < cfg.min_no_price_cents {
        return SideOutcome::Skip("no_below_min_price");
    }

    let model_fair_no_cents = 100 - model_fair_cents;
    if (model_fair_no_cents - no_price).abs() > cfg.max_disagreement_cents {
        return SideOutcome::SkipContract("model_disagreement_no");
    }

    // Buying NO is selling YES at the bid, so the market-implied YES
    // probability for blending purposes comes from `yes_bid`.
    let blended_yes_p = market_adjusted_fair(model_fair_cents as f64 / 100.0, yes_bid as f64 / 100.0, cfg.model_weight);
    let blended_fair_no_cents = 100 - (blended_yes_p * 100.0).round() as i64;
    if (blended_fair_no_cents - no_price).abs() > cfg.max_disagreement_cents {
        return SideOutcome::SkipContract("blended_disagreement_no");
    }
    if blended_fair_no_cents as f64 / no_price as f64 > cfg.max_fair_market_ratio {
        return SideOutcome::SkipContract("fair_ratio_no");
    }

    let raw_edge = blended_fair_no_cents as f64 - no_price as f64 - half_spread;
    let adjusted_edge = raw_edge * ctx.confidence;
    if adjusted_edge < cfg.min_edge_cents as f64 {
        return SideOutcome::Skip("edge_below_min_no");
    }
    if adjusted_edge > cfg.max_edge_cents as f64 {
        return SideOutcome::Skip("edge_above_max_no_stale");
    }

    SideOutcome::Opportunity(Box::new(Opportunity {
        ticker: market.ticker.clone(),
        event_ticker: market.event_ticker.clone(),
        city: ctx.city.to_string(),
        target_date: market.target_date,
        side: Side::No,
        price_cents: no_price,
        model_fair_cents: model_fair_no_cents,
        blended_fair_cents: blended_fair_no_cents,
        raw_edge_cents: raw_edge,
        adjusted_edge_cents: adjusted_edge,
        confidence: ctx.confidence,
        forecast_f: ctx.forecast_f,
        ensemble_details: ctx.ensemble_details.clone(),
        floor_strike: market.floor_strike,
        cap_strike: market.cap_strike,
        volume: market.volume,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::EnsembleResult;
    use std::collections::HashMap;

    fn ctx(forecast_f: f64) -> EnsembleResult {
        EnsembleResult {
            mean_f: forecast_f,
            per_provider: HashMap::new(),
            per_provider_weight: HashMap::new(),
            provider_count: 4,
            noaa_age_hours: Some(1.0),
            noaa_stale: false,
        }
    }

    fn make_market(ticker: &str, yes_ask: i64, yes_bid: i64, cap: Option<i64>, floor: Option<i64>, strike_type: StrikeType) -> ContractMarket {
        ContractMarket {
            ticker: ticker.into(),
            event_ticker: "EVT".into(),
            city: "PHX".into(),
            target_date: NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            strike_type,
            floor_strike: floor,
            cap_strike: cap,
            yes_ask_cents: yes_ask,
            yes_bid_cents: yes_bid,
            volume: 100,
        }
    }

    #[test]
    fn test_scan_market_kills_both_sides_on_pre_blend_disagreement() {
        let details = ctx(88.0);
        let event_ctx = EventContext {
            city: "PHX",
            forecast_f: 88.0,
            confidence: 0.93,
            city_std_dev_f: 0.8,
            days_ahead: 1,
            ensemble_details: &details,
        };
        let market = make_market("KXHIGHTPHX-T95", 40, 38, Some(95), None, StrikeType::Less);
        let cfg = StrategyConfig::for_mode(false);
        let (opps, entries) = scan_market(&market, &event_ctx, &cfg);
        assert!(opps.is_empty(), "disagreement should block both sides");
        assert!(entries.iter().any(|e| e.reason.contains("disagreement")));
    }

    #[test]
    fn test_scan_market_low_volume_skips() {
        let details = ctx(88.0);
        let event_ctx = EventContext {
            city: "PHX",
            forecast_f: 88.0,
            confidence: 0.93,
            city_std_dev_f: 0.8,
            days_ahead: 1,
            ensemble_details: &details,
        };
        let mut market = make_market("KXHIGHTPHX-T95", 40, 38, Some(95), None, StrikeType::Less);
        market.volume = 1;
        let cfg = StrategyConfig::for_mode(false);
        let (opps, entries) = scan_market(&market, &event_ctx, &cfg);
        assert!(opps.is_empty());
        assert_eq!(entries[0].reason, "low_volume");
    }

    #[test]
    fn test_scan_market_strike_too_close_skips() {
        let details = ctx(95.0);
        let event_ctx = EventContext {
            city: "PHX",
            forecast_f: 95.0,
            confidence: 0.93,
            city_std_dev_f: 0.8,
            days_ahead: 1,
            ensemble_details: &details,
        };
        let market = make_market("KXHIGHTPHX-T95", 50, 48, Some(95), None, StrikeType::Less);
        let cfg = StrategyConfig::for_mode(false);
        let (opps, entries) = scan_market(&market, &event_ctx, &cfg);
        assert!(opps.is_empty());
        assert_eq!(entries[0].reason, "strike_too_close");
    }

    #[test]
    fn test_yes_price_floor_falls_through_to_no() {
        let details = ctx(62.0);
        let event_ctx = EventContext {
            city: "DC",
            forecast_f: 62.0,
            confidence: 0.85,
            city_std_dev_f: 1.3,
            days_ahead: 1,
            ensemble_details: &details,
        };
        // yes_ask below min (paper min=5) triggers a skip but NO must still run.
        let market = make_market("KXHIGHTDC-T60", 3, 2, None, Some(60), StrikeType::Greater);
        let cfg = StrategyConfig::for_mode(true);
        let (_opps, entries) = scan_market(&market, &event_ctx, &cfg);
        // Both a yes-side skip and a no-side decision should be recorded.
        assert!(entries.len() >= 2);
    }
}
