//! Domain types shared across the daemon.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Kalshi Market Types ───────────────────────────────────────────────

/// A Kalshi market as returned by GET /trade-api/v2/markets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub ticker: String,
    pub event_ticker: String,
    #[serde(default)]
    pub market_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub yes_bid: i64,
    #[serde(default)]
    pub yes_ask: i64,
    #[serde(default)]
    pub no_bid: i64,
    #[serde(default)]
    pub no_ask: i64,
    #[serde(default)]
    pub last_price: i64,
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub volume_24h: i64,
    #[serde(default)]
    pub open_interest: i64,
    #[serde(default)]
    pub rules_primary: String,
    #[serde(default)]
    pub rules_secondary: String,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiration_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub strike_type: Option<String>,
    #[serde(default)]
    pub floor_strike: Option<i64>,
    #[serde(default)]
    pub cap_strike: Option<i64>,
    #[serde(default)]
    pub functional_strike: Option<String>,
    #[serde(default)]
    pub tick_size: Option<i64>,
    #[serde(default)]
    pub response_price_units: Option<String>,
}

/// Paginated response from GET /trade-api/v2/markets.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    pub markets: Vec<MarketInfo>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// A Kalshi event, optionally carrying its nested markets.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInfo {
    pub event_ticker: String,
    #[serde(default)]
    pub series_ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub markets: Vec<MarketInfo>,
}

/// Paginated response from GET /trade-api/v2/events.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsResponse {
    #[serde(default)]
    pub events: Vec<EventInfo>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// An order to be placed.
#[derive(Debug, Clone, Serialize)]
pub struct OrderIntent {
    /// Market ticker.
    pub ticker: String,
    /// "yes" or "no".
    pub side: Side,
    /// "buy" or "sell".
    pub action: Action,
    /// Limit price in cents (1-99).
    pub price_cents: i64,
    /// Number of contracts.
    pub count: i64,
    /// Reason for the trade (for logging).
    pub reason: String,
    /// Estimated fee in cents for this order.
    #[serde(skip_serializing)]
    pub estimated_fee_cents: i64,
    /// Forecast confidence (0.0-1.0) at time of signal generation.
    #[serde(skip_serializing)]
    pub confidence: f64,
}

// ── Kalshi Fee Schedule ───────────────────────────────────────────────

/// Kalshi fee calculator (weather-markets schedule).
///
/// Taker formula: `ceil_to_cent(coeff × C × P × (1 − P))`
/// where P is price in dollars and C is contract count.
///
/// Maker formula: same but with a quarter the coefficient.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    /// Taker coefficient (0.07 for weather markets).
    pub taker_coeff: f64,
    /// Maker coefficient (0.0175 for weather markets).
    pub maker_coeff: f64,
}

impl FeeSchedule {
    /// Standard fee schedule for weather markets.
    pub fn weather() -> Self {
        Self {
            taker_coeff: 0.07,
            maker_coeff: 0.0175,
        }
    }

    /// Compute taker fee in cents (rounded up to next cent).
    pub fn taker_fee_cents(&self, count: i64, price_cents: i64) -> i64 {
        self.fee_cents(self.taker_coeff, count, price_cents)
    }

    /// Compute maker fee in cents (rounded up to next cent).
    pub fn maker_fee_cents(&self, count: i64, price_cents: i64) -> i64 {
        self.fee_cents(self.maker_coeff, count, price_cents)
    }

    /// Estimate round-trip cost in cents (taker entry + taker exit).
    ///
    /// Conservative: assumes taker on both legs.
    pub fn round_trip_fee_cents(&self, count: i64, entry_cents: i64, exit_cents: i64) -> i64 {
        self.taker_fee_cents(count, entry_cents) + self.taker_fee_cents(count, exit_cents)
    }

    /// Per-contract taker fee in fractional cents (for edge calculations).
    pub fn per_contract_taker_fee(&self, price_cents: i64) -> f64 {
        let p = price_cents as f64 / 100.0;
        self.taker_coeff * p * (1.0 - p) * 100.0
    }

    fn fee_cents(&self, coeff: f64, count: i64, price_cents: i64) -> i64 {
        let p = price_cents as f64 / 100.0;
        let fee_dollars = coeff * (count as f64) * p * (1.0 - p);
        let fee_cents = fee_dollars * 100.0;
        (fee_cents - 1e-9).ceil().max(0.0) as i64
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::weather()
    }
}

/// Order request body for the Kalshi API.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub ticker: String,
    pub side: Side,
    pub action: Action,
    pub client_order_id: String,
    pub count: i64,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yes_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
}

/// Response from POST /trade-api/v2/portfolio/orders.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponse {
    pub order: OrderInfo,
}

/// Request body for POST /trade-api/v2/portfolio/orders/batched.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOrderRequest {
    pub orders: Vec<CreateOrderRequest>,
}

/// Response from POST /trade-api/v2/portfolio/orders/batched.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchOrderResponse {
    #[serde(default)]
    pub orders: Vec<BatchOrderResult>,
}

/// One entry of a batch order response; either a placed order or an error.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchOrderResult {
    #[serde(default)]
    pub order: Option<OrderInfo>,
    #[serde(default)]
    pub error: Option<String>,
}

/// An order as returned by the Kalshi API.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderInfo {
    pub order_id: String,
    #[serde(default)]
    pub client_order_id: String,
    pub ticker: String,
    pub side: Side,
    pub action: Action,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub status: String,
    #[serde(default)]
    pub yes_price: i64,
    #[serde(default)]
    pub no_price: i64,
    #[serde(default)]
    pub fill_count: i64,
    #[serde(default)]
    pub remaining_count: i64,
    #[serde(default)]
    pub initial_count: i64,
    #[serde(default)]
    pub taker_fees: i64,
    #[serde(default)]
    pub maker_fees: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// The textual form used in the venue's `result` field and tickers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
}

/// The three strike shapes a daily-high contract can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeType {
    Less,
    Greater,
    Between,
}

impl StrikeType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "less" | "less_or_equal" => Some(StrikeType::Less),
            "greater" | "greater_or_equal" => Some(StrikeType::Greater),
            "between" => Some(StrikeType::Between),
            _ => None,
        }
    }
}

// ── Position / Portfolio Types ───────────────────────────────────────

/// A Kalshi portfolio position (market-level).
#[derive(Debug, Clone, Deserialize)]
pub struct MarketPosition {
    pub ticker: String,
    #[serde(default)]
    pub yes_count: i64,
    #[serde(default)]
    pub no_count: i64,
    #[serde(default)]
    pub market_exposure: i64,
    #[serde(default)]
    pub realized_pnl: i64,
}

/// Portfolio positions response.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionsResponse {
    #[serde(default)]
    pub market_positions: Vec<MarketPosition>,
    #[serde(default)]
    pub event_positions: Vec<EventPosition>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// A Kalshi portfolio position (event-level); used to detect already-held events.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPosition {
    #[serde(default)]
    pub event_ticker: String,
    #[serde(default)]
    pub event_exposure: i64,
}

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Balance in cents.
    pub balance: i64,
}

// ── Forecast / Ensemble Types ─────────────────────────────────────────

/// A single provider's forecast for one city/date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderForecast {
    pub provider_name: String,
    pub temperature_f: f64,
    pub timestamp: DateTime<Utc>,
}

/// The combined output of running the ensemble for one city/date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub mean_f: f64,
    pub per_provider: HashMap<String, f64>,
    pub per_provider_weight: HashMap<String, f64>,
    pub provider_count: usize,
    #[serde(default)]
    pub noaa_age_hours: Option<f64>,
    #[serde(default)]
    pub noaa_stale: bool,
}

// ── Scanner / Opportunity Types ───────────────────────────────────────

/// A contract the scanner can evaluate, distilled from a `MarketInfo`.
#[derive(Debug, Clone)]
pub struct ContractMarket {
    pub ticker: String,
    pub event_ticker: String,
    pub city: String,
    pub target_date: NaiveDate,
    pub strike_type: StrikeType,
    pub floor_strike: Option<i64>,
    pub cap_strike: Option<i64>,
    pub yes_ask_cents: i64,
    pub yes_bid_cents: i64,
    pub volume: i64,
}

/// A ranked trading opportunity emitted by the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub ticker: String,
    pub event_ticker: String,
    pub city: String,
    pub target_date: NaiveDate,
    pub side: Side,
    pub price_cents: i64,
    pub model_fair_cents: i64,
    pub blended_fair_cents: i64,
    pub raw_edge_cents: f64,
    pub adjusted_edge_cents: f64,
    pub confidence: f64,
    pub forecast_f: f64,
    pub ensemble_details: EnsembleResult,
    #[serde(default)]
    pub floor_strike: Option<i64>,
    #[serde(default)]
    pub cap_strike: Option<i64>,
    pub volume: i64,
}

/// An Opportunity snapshot the executor has acted on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    #[serde(flatten)]
    pub opportunity: Opportunity,
    pub count: i64,
    pub cost_cents: i64,
    pub trade_time: DateTime<Utc>,
    pub paper: bool,
}

// ── P&L / Accuracy Types ──────────────────────────────────────────────

/// One bucket of realized trading results (a day or an ISO week).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PnLBucket {
    pub pnl_cents: i64,
    pub trades: i64,
    pub wins: i64,
    pub losses: i64,
}

/// Realized P&L, bucketed by day and by ISO week.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PnLLedger {
    #[serde(default)]
    pub daily: HashMap<String, PnLBucket>,
    #[serde(default)]
    pub weekly: HashMap<String, PnLBucket>,
}

/// One recorded forecast error sample for a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracySample {
    pub abs_error_f: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-provider bounded history of forecast errors, used for reweighting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccuracyHistory {
    #[serde(default)]
    pub providers: HashMap<String, Vec<AccuracySample>>,
}

/// The state the supervising loop owns and mutates between cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonState {
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub daily_trades: i64,
    #[serde(default)]
    pub last_trade_date: String,
    #[serde(default)]
    pub total_pnl_cents: i64,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub paper_balance: Option<i64>,
}

// ── WebSocket Types (advisory ticker cache only) ─────────────────────

/// A WebSocket subscribe command.
#[derive(Debug, Serialize)]
pub struct WsSubscribeCmd {
    pub id: u64,
    pub cmd: String,
    pub params: WsSubscribeParams,
}

#[derive(Debug, Serialize)]
pub struct WsSubscribeParams {
    pub channels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_tickers: Option<Vec<String>>,
}

/// A ticker update message from the WebSocket.
#[derive(Debug, Clone, Deserialize)]
pub struct WsTickerMessage {
    #[serde(default)]
    pub market_ticker: String,
    #[serde(default)]
    pub yes_bid: i64,
    #[serde(default)]
    pub yes_ask: i64,
    #[serde(default)]
    pub last_price: i64,
    #[serde(default)]
    pub volume: i64,
}

/// Generic WebSocket message envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub msg: Option<serde_json::Value>,
    pub id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taker_fee_50c_100_contracts() {
        let fs = FeeSchedule::weather();
        let fee = fs.taker_fee_cents(100, 50);
        assert_eq!(fee, 175, "100 contracts @ 50c should be 175c ($1.75)");
    }

    #[test]
    fn test_taker_fee_1c_100_contracts() {
        let fs = FeeSchedule::weather();
        let fee = fs.taker_fee_cents(100, 1);
        assert_eq!(fee, 7, "100 contracts @ 1c should be 7c ($0.07)");
    }

    #[test]
    fn test_taker_fee_99c_symmetric() {
        let fs = FeeSchedule::weather();
        let fee_1 = fs.taker_fee_cents(100, 1);
        let fee_99 = fs.taker_fee_cents(100, 99);
        assert_eq!(fee_1, fee_99, "fee should be symmetric around 50c");
    }

    #[test]
    fn test_maker_fee_quarter_of_taker() {
        let fs = FeeSchedule::weather();
        assert!((fs.maker_coeff - fs.taker_coeff / 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_round_trip_fee() {
        let fs = FeeSchedule::weather();
        let rt = fs.round_trip_fee_cents(10, 20, 45);
        let entry = fs.taker_fee_cents(10, 20);
        let exit = fs.taker_fee_cents(10, 45);
        assert_eq!(rt, entry + exit);
    }

    #[test]
    fn test_fee_ceil_rounding() {
        let fs = FeeSchedule::weather();
        let fee = fs.taker_fee_cents(1, 50);
        assert_eq!(fee, 2, "fractional cents should round up");
    }

    #[test]
    fn test_strike_type_from_str() {
        assert_eq!(StrikeType::from_str("less"), Some(StrikeType::Less));
        assert_eq!(StrikeType::from_str("greater"), Some(StrikeType::Greater));
        assert_eq!(StrikeType::from_str("between"), Some(StrikeType::Between));
        assert_eq!(StrikeType::from_str("bogus"), None);
    }
}
