//! Turns ranked opportunities into orders: circuit breaker, gate cascade,
//! Kelly sizing, paper/live dispatch.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;
use common::config::{BotConfig, RiskConfig};
use common::{Action, DaemonState, FeeSchedule, OrderIntent, Opportunity, PnLLedger, Position, Side};
use kalshi_client::KalshiRestClient;
use tracing::{info, warn};
use weather_providers::probability::kelly_size;

use crate::notifications::{AlertLevel, Notifier};
use crate::persistence::{today_keys, week_key};

/// Outcome of one executor pass over a ranked opportunity list.
#[derive(Debug, Default)]
pub struct ExecutionSummary {
    pub opened: Vec<Position>,
    pub skipped: usize,
}

pub struct Executor {
    rest: KalshiRestClient,
    notifier: Notifier,
    fees: FeeSchedule,
    last_breaker_alert: Mutex<Option<Instant>>,
}

impl Executor {
    pub fn new(rest: KalshiRestClient, notifier: Notifier) -> Self {
        Self {
            rest,
            notifier,
            fees: FeeSchedule::weather(),
            last_breaker_alert: Mutex::new(None),
        }
    }

    /// `true` if either loss cap has been breached; emits at most one
    /// operator alert per rolling hour while tripped.
    pub async fn circuit_breaker_tripped(
        &self,
        pnl: &PnLLedger,
        state: &DaemonState,
        risk: &RiskConfig,
    ) -> bool {
        let (daily_headroom, weekly_headroom) = breaker_headroom(pnl, state);
        let tripped = daily_headroom <= -risk.max_daily_loss_cents
            || weekly_headroom <= -risk.max_weekly_loss_cents;

        if tripped {
            let should_alert = {
                let mut guard = self.last_breaker_alert.lock().unwrap();
                let now = Instant::now();
                let due = guard
                    .map(|last| now.duration_since(last).as_secs() >= risk.circuit_breaker_alert_interval_secs)
                    .unwrap_or(true);
                if due {
                    *guard = Some(now);
                }
                due
            };
            if should_alert {
                warn!(
                    "executor: circuit breaker tripped, daily_headroom={}c weekly_headroom={}c",
                    daily_headroom, weekly_headroom
                );
                self.notifier
                    .notify_system_alert(
                        AlertLevel::Critical,
                        "Circuit breaker tripped — trading paused",
                        Some(&format!(
                            "daily headroom {}c, weekly headroom {}c",
                            daily_headroom, weekly_headroom
                        )),
                    )
                    .await;
            }
        }
        tripped
    }

    /// Reset `daily_trades` on a new calendar day.
    pub fn roll_day(&self, state: &mut DaemonState) {
        let (local_today, _) = today_keys();
        if state.last_trade_date != local_today {
            state.daily_trades = 0;
            state.last_trade_date = local_today;
        }
    }

    pub async fn run_cycle(
        &self,
        cfg: &BotConfig,
        state: &mut DaemonState,
        pnl: &PnLLedger,
        opportunities: Vec<Opportunity>,
    ) -> ExecutionSummary {
        self.roll_day(state);

        let risk = &cfg.risk;
        let mut summary = ExecutionSummary {
            skipped: opportunities.len(),
            ..ExecutionSummary::default()
        };

        if self.circuit_breaker_tripped(pnl, state, risk).await {
            info!("executor: circuit breaker open, skipping order placement this cycle");
            return summary;
        }
        summary.skipped = 0;

        let (venue_positions, venue_event_positions) = match self.rest.get_positions().await {
            Ok(p) => p,
            Err(e) => {
                warn!("executor: failed to fetch venue positions, proceeding with local state only: {}", e);
                (Vec::new(), Vec::new())
            }
        };

        let mut balance = match self.rest.get_balance().await {
            Ok(b) => b,
            Err(e) => {
                warn!("executor: failed to fetch balance, using local state: {}", e);
                state.balance
            }
        };

        let mut held_tickers: HashSet<String> = venue_positions.iter().map(|p| p.ticker.clone()).collect();
        held_tickers.extend(state.positions.iter().map(|p| p.opportunity.ticker.clone()));

        let mut held_events: HashSet<String> = venue_event_positions
            .iter()
            .map(|p| p.event_ticker.clone())
            .collect();
        held_events.extend(state.positions.iter().map(|p| p.opportunity.event_ticker.clone()));

        let mut group_counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        for p in &state.positions {
            *group_counts
                .entry(common::tables::correlation_group(&p.opportunity.city).to_string())
                .or_insert(0) += 1;
        }

        let mut city_date_taken: HashSet<(String, chrono::NaiveDate)> = state
            .positions
            .iter()
            .map(|p| (p.opportunity.city.clone(), p.opportunity.target_date))
            .collect();

        let mut trades_made = 0i64;
        let open_positions = state.positions.len() as i64;

        for opp in opportunities {
            if state.daily_trades + trades_made >= risk.max_daily_trades {
                info!("executor: MAX_DAILY_TRADES reached, stopping");
                break;
            }
            if open_positions + trades_made >= risk.max_open_positions {
                info!("executor: MAX_OPEN_POSITIONS reached, stopping");
                break;
            }

            if held_tickers.contains(&opp.ticker)
                || held_events.contains(&opp.event_ticker)
                || held_events.iter().any(|e| opp.ticker.starts_with(e.as_str()))
            {
                summary.skipped += 1;
                continue;
            }

            let group = common::tables::correlation_group(&opp.city).to_string();
            if *group_counts.get(&group).unwrap_or(&0) >= risk.max_per_group {
                summary.skipped += 1;
                continue;
            }

            let city_date_key = (opp.city.clone(), opp.target_date);
            if city_date_taken.contains(&city_date_key) {
                summary.skipped += 1;
                continue;
            }

            let model_fair_p = opp.model_fair_cents as f64 / 100.0;
            let mut count = kelly_size(
                model_fair_p,
                opp.price_cents,
                balance,
                risk.kelly_fraction,
                risk.max_contracts,
            );
            if count < 1 {
                summary.skipped += 1;
                continue;
            }

            let mut cost_cents = count * opp.price_cents;
            if cost_cents > risk.max_cost_per_trade_cents {
                count = risk.max_cost_per_trade_cents / opp.price_cents;
                if count < 1 {
                    summary.skipped += 1;
                    continue;
                }
                cost_cents = count * opp.price_cents;
            }

            if balance - cost_cents < risk.affordability_buffer_cents {
                summary.skipped += 1;
                continue;
            }

            let intent = OrderIntent {
                ticker: opp.ticker.clone(),
                side: opp.side,
                action: Action::Buy,
                price_cents: opp.price_cents,
                count,
                reason: format!(
                    "edge={:.1}c confidence={:.2} forecast={:.1}F",
                    opp.adjusted_edge_cents, opp.confidence, opp.forecast_f
                ),
                estimated_fee_cents: self.fees.taker_fee_cents(count, opp.price_cents),
                confidence: opp.confidence,
            };

            if !cfg.paper_trading {
                if let Err(e) = self.rest.create_order(&intent).await {
                    warn!("executor: order placement failed for {}: {}", opp.ticker, e);
                    summary.skipped += 1;
                    continue;
                }
            }

            balance -= cost_cents;
            trades_made += 1;
            *group_counts.entry(group).or_insert(0) += 1;
            city_date_taken.insert(city_date_key);
            held_tickers.insert(opp.ticker.clone());
            held_events.insert(opp.event_ticker.clone());

            let description = format!("{} {:?} {}", opp.city, opp.side, opp.target_date);
            self.notifier
                .notify_trade_opened(
                    &opp.ticker,
                    &description,
                    opp.side.as_str(),
                    count,
                    opp.price_cents,
                    opp.forecast_f,
                    opp.ensemble_details.provider_count,
                    opp.confidence,
                    opp.adjusted_edge_cents,
                    cost_cents,
                    cfg.paper_trading,
                )
                .await;

            let position = Position {
                opportunity: opp,
                count,
                cost_cents,
                trade_time: Utc::now(),
                paper: cfg.paper_trading,
            };
            summary.opened.push(position.clone());
            state.positions.push(position);
        }

        state.daily_trades += trades_made;
        state.balance = balance;
        summary
    }
}

fn opened_today(p: &Position) -> bool {
    let now_utc = Utc::now().date_naive();
    let now_local = chrono::Local::now().date_naive();
    let trade_utc = p.trade_time.date_naive();
    let trade_local = p.trade_time.with_timezone(&chrono::Local).date_naive();
    trade_utc == now_utc || trade_local == now_local
}

/// Today's realized P&L minus today's at-risk exposure, and the same for
/// the week, per §4.5.1. Returns `(daily_headroom, weekly_headroom)`.
fn breaker_headroom(pnl: &PnLLedger, state: &DaemonState) -> (i64, i64) {
    let today = Utc::now().date_naive();
    let (day_key, _) = today_keys();
    let week = week_key(today);

    let daily_pnl = pnl.daily.get(&day_key).map(|b| b.pnl_cents).unwrap_or(0);
    let weekly_pnl = pnl.weekly.get(&week).map(|b| b.pnl_cents).unwrap_or(0);

    let today_exposure: i64 = state
        .positions
        .iter()
        .filter(|p| opened_today(p))
        .map(|p| p.count * p.opportunity.price_cents)
        .sum();

    (daily_pnl - today_exposure, weekly_pnl - today_exposure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{EnsembleResult, PnLBucket};
    use std::collections::HashMap;

    fn fake_opportunity(ticker: &str, city: &str, price: i64, fair_cents: i64) -> Opportunity {
        Opportunity {
            ticker: ticker.into(),
            event_ticker: format!("{ticker}-EVT"),
            city: city.into(),
            target_date: chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            side: Side::Yes,
            price_cents: price,
            model_fair_cents: fair_cents,
            blended_fair_cents: fair_cents,
            raw_edge_cents: 10.0,
            adjusted_edge_cents: 10.0,
            confidence: 0.9,
            forecast_f: 90.0,
            ensemble_details: EnsembleResult {
                mean_f: 90.0,
                per_provider: HashMap::new(),
                per_provider_weight: HashMap::new(),
                provider_count: 4,
                noaa_age_hours: Some(1.0),
                noaa_stale: false,
            },
            floor_strike: None,
            cap_strike: Some(95),
            volume: 100,
        }
    }

    #[test]
    fn test_breaker_headroom_accounts_for_todays_exposure() {
        let mut pnl = PnLLedger::default();
        let (day_key, _) = today_keys();
        pnl.daily.insert(day_key, PnLBucket { pnl_cents: -100, trades: 2, wins: 0, losses: 2 });

        let mut state = DaemonState::default();
        state.positions.push(Position {
            opportunity: fake_opportunity("T1", "PHX", 40, 55),
            count: 5,
            cost_cents: 200,
            trade_time: Utc::now(),
            paper: true,
        });

        let (daily_headroom, _weekly) = breaker_headroom(&pnl, &state);
        assert_eq!(daily_headroom, -100 - 200);
    }

    #[test]
    fn test_breaker_headroom_ignores_stale_positions() {
        let pnl = PnLLedger::default();
        let mut state = DaemonState::default();
        state.positions.push(Position {
            opportunity: fake_opportunity("T1", "PHX", 40, 55),
            count: 5,
            cost_cents: 200,
            trade_time: Utc::now() - chrono::Duration::days(3),
            paper: true,
        });

        let (daily_headroom, weekly_headroom) = breaker_headroom(&pnl, &state);
        assert_eq!(daily_headroom, 0);
        assert_eq!(weekly_headroom, 0);
    }
}
