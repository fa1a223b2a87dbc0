//! Weather-bot: Kalshi weather mispricing bot.
//!
//! Single-binary Tokio application that each cycle:
//! 1. Settles positions the venue has resolved since the last cycle
//! 2. Scans every configured city's open events for mispriced contracts
//! 3. Executes the best-ranked opportunities under the risk gate cascade

mod config;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use clap::Parser;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::MakeWriter;

use common::config::BotConfig;
use kalshi_client::{new_price_cache, KalshiAuth, KalshiRestClient, KalshiWsClient, PriceCache};
use strategy::{new_forecast_cache, Executor, Notifier, Persistence};
use weather_providers::{Ensemble, NoaaProvider, OpenMeteoProvider};

/// Kalshi weather mispricing bot.
#[derive(Parser)]
#[command(name = "weather-bot", about = "Kalshi weather mispricing bot")]
struct Cli {
    /// Just test authentication and print balance, then exit.
    #[arg(long)]
    check_auth: bool,

    /// Run a single settlement+scan+execute cycle and exit.
    #[arg(long)]
    dry_run: bool,
}

/// Writer that appends formatted lines to `daemon.log`, then trims the file
/// to its last `max_lines` lines. Runs alongside stdout, never instead of it.
#[derive(Clone)]
struct RollingFileWriter {
    path: std::path::PathBuf,
    max_lines: usize,
}

impl Write for RollingFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        f.write_all(buf)?;
        drop(f);

        if let Ok(contents) = std::fs::read_to_string(&self.path) {
            let lines: Vec<&str> = contents.lines().collect();
            if lines.len() > self.max_lines {
                let trimmed = lines[lines.len() - self.max_lines..].join("\n") + "\n";
                let _ = std::fs::write(&self.path, trimmed);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for RollingFileWriter {
    type Writer = RollingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn build_ensemble(cfg: &BotConfig) -> Ensemble {
    let min_interval = Duration::from_millis(cfg.timing.provider_min_interval_ms);
    let timeout = Duration::from_millis(cfg.timing.request_timeout_ms);

    let noaa = Arc::new(NoaaProvider::new(min_interval, timeout));
    let others: Vec<Arc<dyn weather_providers::WeatherProvider>> = vec![
        Arc::new(OpenMeteoProvider::gfs(min_interval, timeout)),
        Arc::new(OpenMeteoProvider::icon(min_interval, timeout)),
        Arc::new(OpenMeteoProvider::ecmwf(min_interval, timeout)),
        Arc::new(OpenMeteoProvider::gem(min_interval, timeout)),
    ];

    let mut base_weights = std::collections::HashMap::new();
    base_weights.insert("NOAA", cfg.provider_weights.noaa);
    base_weights.insert("OpenMeteo_GFS", cfg.provider_weights.gfs);
    base_weights.insert("OpenMeteo_ICON", cfg.provider_weights.icon);
    base_weights.insert("OpenMeteo_ECMWF", cfg.provider_weights.ecmwf);
    base_weights.insert("OpenMeteo_GEM", cfg.provider_weights.gem);

    Ensemble::new(noaa, others, base_weights, cfg.timing.noaa_stale_hours, cfg.timing.noaa_stale_penalty)
}

/// Time-of-day-dependent poll interval per §6: 300s around model-update
/// hours, 600s shortly after, 1800s otherwise.
fn next_sleep_duration() -> Duration {
    let hour = chrono::Local::now().hour();
    let secs = match hour {
        4 | 5 | 10 | 11 | 16 | 17 | 22 | 23 => 300,
        6 | 7 | 12 | 13 | 18 | 19 => 600,
        _ => 1800,
    };
    Duration::from_secs(secs)
}

async fn run_cycle(
    rest: &KalshiRestClient,
    ensemble: &Ensemble,
    executor: &Executor,
    persistence: &Persistence,
    notifier: &Notifier,
    cfg: &BotConfig,
    tracked_tickers: &Arc<RwLock<Vec<String>>>,
    price_cache: &PriceCache,
) {
    let mut state = persistence.load_state();
    let mut pnl = persistence.load_pnl();
    ensemble.load_accuracy(persistence.load_accuracy());

    // 1. Settlement — resolve positions before the new scan's caps apply.
    // Always runs, even if the circuit breaker is tripped: realized P&L is
    // the only thing that can clear a trip, and it only updates here.
    let settlement_summary = strategy::run_settlement(rest, ensemble, persistence, notifier, &cfg.cities, &mut state, &mut pnl).await;
    info!(
        "settlement: resolved={} still_open={} pnl_delta={}c",
        settlement_summary.resolved, settlement_summary.still_open, settlement_summary.total_pnl_delta_cents
    );
    if let Err(e) = persistence.save_pnl(&pnl) {
        warn!("main: failed to persist pnl.json: {}", e);
    }

    // 2. Scanner — rank opportunities across every configured city.
    let cache = new_forecast_cache();
    let (opportunities, backtest) = strategy::scan(rest, ensemble, cfg, &cache).await;
    info!("scanner: {} opportunities, {} backtest entries", opportunities.len(), backtest.len());
    for entry in &backtest {
        if let Err(e) = persistence.append_backtest(entry) {
            warn!("main: failed to append backtest.jsonl: {}", e);
            break;
        }
    }

    // Hand the scanned tickers to the advisory WS feed so it subscribes to
    // whatever is in play this cycle. Read-only display data, never used
    // for a trading decision — the executor prices off the REST snapshot.
    *tracked_tickers.write().await = opportunities.iter().map(|o| o.ticker.clone()).collect();
    debug!("ws: advisory price cache holds {} tickers", price_cache.read().await.len());

    // 3. Executor — gated by its own circuit-breaker check; only order
    // placement is skipped when tripped, never settlement or scanning.
    let exec_summary = executor.run_cycle(cfg, &mut state, &pnl, opportunities).await;
    info!("executor: opened={} skipped={}", exec_summary.opened.len(), exec_summary.skipped);

    if let Err(e) = persistence.save_state(&state) {
        warn!("main: failed to persist state.json: {}", e);
    }

    let (wins, losses): (i64, i64) = pnl
        .daily
        .values()
        .fold((0, 0), |(w, l), b| (w + b.wins, l + b.losses));
    notifier
        .notify_daily_summary(
            state.daily_trades,
            wins,
            losses,
            state.total_pnl_cents,
            state.positions.len() as i64,
            state.balance,
        )
        .await;
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let log_path = cfg.persistence.path(&cfg.persistence.log_file);
    let file_writer = RollingFileWriter { path: log_path, max_lines: cfg.persistence.max_log_lines };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_bot=info,kalshi_client=info,weather_providers=info,strategy=info".into()),
        )
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(file_writer)
        .init();

    info!("Weather Bot starting up...");

    let env_label = if cfg.use_demo { "DEMO" } else { "PRODUCTION" };
    let mode_label = if cfg.paper_trading { "PAPER" } else { "LIVE" };
    info!("Environment: {} ({})", env_label, mode_label);
    info!("Cities: {:?}", cfg.cities.iter().map(|c| &c.name).collect::<Vec<_>>());
    info!(
        "Strategy: min_edge={}c max_edge={}c min_confidence={:.2}",
        cfg.strategy.min_edge_cents, cfg.strategy.max_edge_cents, cfg.strategy.min_confidence_score,
    );

    let auth = match KalshiAuth::new(&cfg.api_key, &cfg.secret_key) {
        Ok(a) => a,
        Err(e) => {
            error!("Auth initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let rest_client = KalshiRestClient::new(auth.clone(), cfg.use_demo);

    if cli.check_auth {
        info!("Running auth check...");
        match rest_client.get_balance().await {
            Ok(balance) => info!("Auth successful. Balance: {}c (${:.2})", balance, balance as f64 / 100.0),
            Err(e) => {
                error!("Auth check failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let ensemble = build_ensemble(&cfg);
    let notifier = Notifier::new(cfg.notifications.clone());
    let persistence = Persistence::new(cfg.persistence.clone());
    let executor = Executor::new(rest_client.clone(), Notifier::new(cfg.notifications.clone()));

    let tracked_tickers: Arc<RwLock<Vec<String>>> = Arc::new(RwLock::new(Vec::new()));
    let price_cache = new_price_cache();

    if cli.dry_run {
        info!("Running single dry-run cycle...");
        run_cycle(&rest_client, &ensemble, &executor, &persistence, &notifier, &cfg, &tracked_tickers, &price_cache).await;
        return;
    }

    // Advisory WebSocket ticker feed: maintains a read-only price cache for
    // display, reconnecting with exponential backoff forever. Never consulted
    // for a trading decision — the scanner and executor price off REST.
    let ws_client = KalshiWsClient::new(auth, cfg.use_demo, price_cache.clone());
    let ws_tickers = tracked_tickers.clone();
    tokio::spawn(async move {
        ws_client.run(ws_tickers).await;
    });

    info!("Weather Bot is running. Press Ctrl+C to stop.");

    loop {
        run_cycle(&rest_client, &ensemble, &executor, &persistence, &notifier, &cfg, &tracked_tickers, &price_cache).await;

        let sleep_for = next_sleep_duration();
        info!("main: sleeping {}s until next cycle", sleep_for.as_secs());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }

    info!("Weather Bot shut down.");
}
