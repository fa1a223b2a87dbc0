//! Daemon configuration types.

use serde::{Deserialize, Serialize};

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Kalshi API key ID.
    #[serde(default)]
    pub api_key: String,

    /// RSA private key PEM (with literal \n for newlines), or a path — see
    /// `KALSHI_PRIVATE_KEY_PATH`.
    #[serde(default)]
    pub secret_key: String,

    /// Use the Kalshi demo environment (true) or production (false).
    #[serde(default = "default_true")]
    pub use_demo: bool,

    /// Simulate order placement locally instead of calling the venue.
    /// Independent of `use_demo`: paper mode also loosens strategy
    /// thresholds (see `StrategyConfig::for_mode`).
    #[serde(default = "default_true")]
    pub paper_trading: bool,

    /// Cities to monitor.
    #[serde(default = "default_cities")]
    pub cities: Vec<CityConfig>,

    /// Per-provider base weights for the forecast ensemble.
    #[serde(default)]
    pub provider_weights: ProviderWeightsConfig,

    /// Strategy thresholds (mode-dependent; see `for_mode`).
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Risk management parameters.
    #[serde(default)]
    pub risk: RiskConfig,

    /// Timing parameters (seconds).
    #[serde(default)]
    pub timing: TimingConfig,

    /// Operator notification settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// On-disk persistence paths.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Configuration for a single monitored city.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityConfig {
    /// Short city code used as a key into the static correlation/dispersion
    /// tables (e.g. "PHX").
    pub code: String,
    /// Human-readable name.
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// NWS Weather Forecast Office ID (e.g. "PSR" for Phoenix).
    pub wfo: String,
    pub grid_x: u32,
    pub grid_y: u32,
    /// NWS observation station id, used to fetch actual settlement temps.
    pub station: String,
    /// IANA timezone, used by the numerical-model providers.
    pub timezone: String,
    /// Kalshi series ticker prefix (e.g. "KXHIGHTPHX").
    pub series_prefix: String,
}

/// Base ensemble weights per provider, before accuracy reweighting/bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderWeightsConfig {
    #[serde(default = "default_noaa_weight")]
    pub noaa: f64,
    #[serde(default = "default_gfs_weight")]
    pub gfs: f64,
    #[serde(default = "default_icon_weight")]
    pub icon: f64,
    #[serde(default = "default_ecmwf_weight")]
    pub ecmwf: f64,
    #[serde(default = "default_gem_weight")]
    pub gem: f64,
}

/// Strategy thresholds and limits, mode-dependent (paper vs live).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Minimum adjusted edge in cents to emit an opportunity.
    pub min_edge_cents: i64,
    /// Edge sanity cap — above this the signal is treated as likely stale.
    pub max_edge_cents: i64,
    /// Minimum YES ask price in cents to consider the YES side.
    pub min_yes_price_cents: i64,
    /// Minimum NO price in cents to consider the NO side.
    pub min_no_price_cents: i64,
    /// Minimum ensemble confidence to proceed past the scanner's gate.
    pub min_confidence_score: f64,
    /// Bayesian blend weight given to the model (vs. the market).
    pub model_weight: f64,
    /// Max |model_fair - market_price| before skipping the entire contract.
    pub max_disagreement_cents: i64,
    /// Max blended_fair / market_price ratio before skipping.
    pub max_fair_market_ratio: f64,
    /// Max yes_ask - yes_bid spread before a market is illiquid.
    pub max_spread_cents: i64,
    /// Minimum 24h volume to consider a market.
    pub min_volume: i64,
    /// Minimum distance (F) from forecast to the nearer strike.
    pub strike_proximity_threshold_f: f64,
}

impl StrategyConfig {
    /// Paper and live modes loosen/tighten the same knobs; paper trades more
    /// to generate useful backtest volume, live is conservative.
    pub fn for_mode(paper_trading: bool) -> Self {
        if paper_trading {
            Self {
                min_edge_cents: 10,
                max_edge_cents: 60,
                min_yes_price_cents: 5,
                min_no_price_cents: 5,
                min_confidence_score: 0.5,
                model_weight: 0.3,
                max_disagreement_cents: 40,
                max_fair_market_ratio: 3.5,
                max_spread_cents: 30,
                min_volume: 10,
                strike_proximity_threshold_f: 0.2,
            }
        } else {
            Self {
                min_edge_cents: 15,
                max_edge_cents: 60,
                min_yes_price_cents: 15,
                min_no_price_cents: 15,
                min_confidence_score: 0.6,
                model_weight: 0.3,
                max_disagreement_cents: 25,
                max_fair_market_ratio: 3.0,
                max_spread_cents: 30,
                min_volume: 10,
                strike_proximity_threshold_f: 1.5,
            }
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::for_mode(true)
    }
}

/// Risk management thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Max contracts per single trade, after Kelly sizing.
    #[serde(default = "default_max_contracts")]
    pub max_contracts: i64,
    /// Max cost per single trade in cents.
    #[serde(default = "default_max_cost_per_trade")]
    pub max_cost_per_trade_cents: i64,
    /// Max simultaneously open positions.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: i64,
    /// Max trades placed in a single calendar day.
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: i64,
    /// Max open positions per correlation group.
    #[serde(default = "default_max_per_group")]
    pub max_per_group: i64,
    /// Max open positions per (city, target_date).
    #[serde(default = "default_max_per_city_date")]
    pub max_per_city_date: i64,
    /// Circuit breaker: daily realized+at-risk loss cap in cents.
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss_cents: i64,
    /// Circuit breaker: weekly realized+at-risk loss cap in cents.
    #[serde(default = "default_max_weekly_loss")]
    pub max_weekly_loss_cents: i64,
    /// Minimum seconds between circuit-breaker operator alerts.
    #[serde(default = "default_circuit_breaker_alert_interval")]
    pub circuit_breaker_alert_interval_secs: u64,
    /// Fractional-Kelly prudence factor.
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    /// Minimum account balance to maintain (cents).
    #[serde(default = "default_min_balance")]
    pub min_balance_cents: i64,
    /// Affordability buffer kept below balance on every trade (cents).
    #[serde(default = "default_affordability_buffer")]
    pub affordability_buffer_cents: i64,
}

/// Timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Minimum delay between requests to a single provider (milliseconds).
    #[serde(default = "default_provider_min_interval_ms")]
    pub provider_min_interval_ms: u64,
    /// Per-request timeout (milliseconds) for any outbound HTTP call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Hours since NOAA's cached updateTime before it is considered stale.
    #[serde(default = "default_noaa_stale_hours")]
    pub noaa_stale_hours: f64,
    /// Weight multiplier applied to NOAA when stale.
    #[serde(default = "default_noaa_stale_penalty")]
    pub noaa_stale_penalty: f64,
    /// Rolling-window size (days) for accuracy-weighted reweighting.
    #[serde(default = "default_accuracy_window_days")]
    pub accuracy_window_days: i64,
}

/// Operator notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
    /// Whether trade-opened/settlement notifications fire in paper mode.
    #[serde(default)]
    pub paper_trading_notifications: bool,
}

/// On-disk persistence paths, all relative to `base_dir` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_pnl_file")]
    pub pnl_file: String,
    #[serde(default = "default_accuracy_file")]
    pub accuracy_file: String,
    #[serde(default = "default_paper_trades_file")]
    pub paper_trades_file: String,
    #[serde(default = "default_settlements_file")]
    pub settlements_file: String,
    #[serde(default = "default_backtest_file")]
    pub backtest_file: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_noaa_weight() -> f64 {
    1.2
}
fn default_gfs_weight() -> f64 {
    1.0
}
fn default_icon_weight() -> f64 {
    0.9
}
fn default_ecmwf_weight() -> f64 {
    1.0
}
fn default_gem_weight() -> f64 {
    0.8
}

fn default_max_contracts() -> i64 {
    8
}
fn default_max_cost_per_trade() -> i64 {
    500
}
fn default_max_open_positions() -> i64 {
    20
}
fn default_max_daily_trades() -> i64 {
    40
}
fn default_max_per_group() -> i64 {
    2
}
fn default_max_per_city_date() -> i64 {
    1
}
fn default_max_daily_loss() -> i64 {
    500
}
fn default_max_weekly_loss() -> i64 {
    1000
}
fn default_circuit_breaker_alert_interval() -> u64 {
    3600
}
fn default_kelly_fraction() -> f64 {
    0.25
}
fn default_min_balance() -> i64 {
    100
}
fn default_affordability_buffer() -> i64 {
    500
}

fn default_provider_min_interval_ms() -> u64 {
    300
}
fn default_request_timeout_ms() -> u64 {
    15_000
}
fn default_noaa_stale_hours() -> f64 {
    6.0
}
fn default_noaa_stale_penalty() -> f64 {
    0.5
}
fn default_accuracy_window_days() -> i64 {
    30
}

fn default_base_dir() -> String {
    ".".into()
}
fn default_state_file() -> String {
    "state.json".into()
}
fn default_pnl_file() -> String {
    "pnl.json".into()
}
fn default_accuracy_file() -> String {
    "accuracy.json".into()
}
fn default_paper_trades_file() -> String {
    "paper_trades.jsonl".into()
}
fn default_settlements_file() -> String {
    "settlements.jsonl".into()
}
fn default_backtest_file() -> String {
    "backtest.jsonl".into()
}
fn default_log_file() -> String {
    "daemon.log".into()
}
fn default_max_log_lines() -> usize {
    200
}

/// The eleven-city roster the daemon monitors by default.
fn default_cities() -> Vec<CityConfig> {
    vec![
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
        },
        CityConfig {
            code: "SFO".into(),
            name: "San Francisco".into(),
            lat: 37.7749,
            lon: -122.4194,
            wfo: "MTR".into(),
            grid_x: 85,
            grid_y: 105,
            station: "KSFO".into(),
            timezone: "America/Los_Angeles".into(),
            series_prefix: "KXHIGHTSFO".into(),
        },
        CityConfig {
            code: "SEA".into(),
            name: "Seattle".into(),
            lat: 47.6062,
            lon: -122.3321,
            wfo: "SEW".into(),
            grid_x: 124,
            grid_y: 67,
            station: "KSEA".into(),
            timezone: "America/Los_Angeles".into(),
            series_prefix: "KXHIGHTSEA".into(),
        },
        CityConfig {
            code: "DC".into(),
            name: "Washington DC".into(),
            lat: 38.9072,
            lon: -77.0369,
            wfo: "LWX".into(),
            grid_x: 96,
            grid_y: 70,
            station: "KDCA".into(),
            timezone: "America/New_York".into(),
            series_prefix: "KXHIGHTDC".into(),
        },
        CityConfig {
            code: "HOU".into(),
            name: "Houston".into(),
            lat: 29.7604,
            lon: -95.3698,
            wfo: "HGX".into(),
            grid_x: 65,
            grid_y: 97,
            station: "KIAH".into(),
            timezone: "America/Chicago".into(),
            series_prefix: "KXHIGHTHOU".into(),
        },
        CityConfig {
            code: "NOLA".into(),
            name: "New Orleans".into(),
            lat: 29.9511,
            lon: -90.0715,
            wfo: "LIX".into(),
            grid_x: 76,
            grid_y: 72,
            station: "KMSY".into(),
            timezone: "America/Chicago".into(),
            series_prefix: "KXHIGHTNOLA".into(),
        },
        CityConfig {
            code: "DAL".into(),
            name: "Dallas".into(),
            lat: 32.7767,
            lon: -96.7970,
            wfo: "FWD".into(),
            grid_x: 80,
            grid_y: 108,
            station: "KDFW".into(),
            timezone: "America/Chicago".into(),
            series_prefix: "KXHIGHTDAL".into(),
        },
        CityConfig {
            code: "BOS".into(),
            name: "Boston".into(),
            lat: 42.3601,
            lon: -71.0589,
            wfo: "BOX".into(),
            grid_x: 70,
            grid_y: 76,
            station: "KBOS".into(),
            timezone: "America/New_York".into(),
            series_prefix: "KXHIGHTBOS".into(),
        },
        CityConfig {
            code: "OKC".into(),
            name: "Oklahoma City".into(),
            lat: 35.4676,
            lon: -97.5164,
            wfo: "OUN".into(),
            grid_x: 41,
            grid_y: 48,
            station: "KOKC".into(),
            timezone: "America/Chicago".into(),
            series_prefix: "KXHIGHTOKC".into(),
        },
        CityConfig {
            code: "ATL".into(),
            name: "Atlanta".into(),
            lat: 33.7490,
            lon: -84.3880,
            wfo: "FFC".into(),
            grid_x: 52,
            grid_y: 88,
            station: "KATL".into(),
            timezone: "America/New_York".into(),
            series_prefix: "KXHIGHTATL".into(),
        },
        CityConfig {
            code: "MIN".into(),
            name: "Minneapolis".into(),
            lat: 44.9778,
            lon: -93.2650,
            wfo: "MPX".into(),
            grid_x: 107,
            grid_y: 71,
            station: "KMSP".into(),
            timezone: "America/Chicago".into(),
            series_prefix: "KXHIGHTMIN".into(),
        },
    ]
}

impl Default for ProviderWeightsConfig {
    fn default() -> Self {
        Self {
            noaa: default_noaa_weight(),
            gfs: default_gfs_weight(),
            icon: default_icon_weight(),
            ecmwf: default_ecmwf_weight(),
            gem: default_gem_weight(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_contracts: default_max_contracts(),
            max_cost_per_trade_cents: default_max_cost_per_trade(),
            max_open_positions: default_max_open_positions(),
            max_daily_trades: default_max_daily_trades(),
            max_per_group: default_max_per_group(),
            max_per_city_date: default_max_per_city_date(),
            max_daily_loss_cents: default_max_daily_loss(),
            max_weekly_loss_cents: default_max_weekly_loss(),
            circuit_breaker_alert_interval_secs: default_circuit_breaker_alert_interval(),
            kelly_fraction: default_kelly_fraction(),
            min_balance_cents: default_min_balance(),
            affordability_buffer_cents: default_affordability_buffer(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            provider_min_interval_ms: default_provider_min_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            noaa_stale_hours: default_noaa_stale_hours(),
            noaa_stale_penalty: default_noaa_stale_penalty(),
            accuracy_window_days: default_accuracy_window_days(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
            paper_trading_notifications: false,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            state_file: default_state_file(),
            pnl_file: default_pnl_file(),
            accuracy_file: default_accuracy_file(),
            paper_trades_file: default_paper_trades_file(),
            settlements_file: default_settlements_file(),
            backtest_file: default_backtest_file(),
            log_file: default_log_file(),
            max_log_lines: default_max_log_lines(),
        }
    }
}

impl PersistenceConfig {
    pub fn path(&self, file_name: &str) -> std::path::PathBuf {
        std::path::Path::new(&self.base_dir).join(file_name)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        let paper_trading = true;
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            use_demo: true,
            paper_trading,
            cities: default_cities(),
            provider_weights: ProviderWeightsConfig::default(),
            strategy: StrategyConfig::for_mode(paper_trading),
            risk: RiskConfig::default(),
            timing: TimingConfig::default(),
            notifications: NotificationConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_eleven_cities() {
        assert_eq!(BotConfig::default().cities.len(), 11);
    }

    #[test]
    fn test_paper_mode_is_looser_than_live() {
        let paper = StrategyConfig::for_mode(true);
        let live = StrategyConfig::for_mode(false);
        assert!(paper.min_edge_cents < live.min_edge_cents);
        assert!(paper.min_confidence_score < live.min_confidence_score);
        assert!(paper.strike_proximity_threshold_f < live.strike_proximity_threshold_f);
    }
}
