//! Operator notifications via the Telegram Bot API, mirroring the
//! reference implementation's `notifications.py`. Every send is
//! fire-and-forget: failures are logged, never retried or propagated.

use common::config::NotificationConfig;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    fn emoji(self) -> &'static str {
        match self {
            AlertLevel::Info => "ℹ️",
            AlertLevel::Warning => "⚠️",
            AlertLevel::Error => "❌",
            AlertLevel::Critical => "🚨",
        }
    }
}

pub struct Notifier {
    client: reqwest::Client,
    cfg: NotificationConfig,
}

impl Notifier {
    pub fn new(cfg: NotificationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cfg,
        }
    }

    fn configured(&self) -> bool {
        !self.cfg.telegram_bot_token.is_empty() && !self.cfg.telegram_chat_id.is_empty()
    }

    async fn send(&self, text: String) {
        if !self.configured() {
            debug!("notifications: no Telegram credentials configured, skipping send");
            return;
        }

        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.cfg.telegram_bot_token
        );
        let body = serde_json::json!({
            "chat_id": self.cfg.telegram_chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        let result = self
            .client
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await;

        if let Err(e) = result {
            warn!("notifications: Telegram send failed: {}", e);
        }
    }

    /// A new trade was opened, live or simulated.
    pub async fn notify_trade_opened(
        &self,
        ticker: &str,
        description: &str,
        side: &str,
        count: i64,
        price_cents: i64,
        forecast_f: f64,
        provider_count: usize,
        confidence: f64,
        edge_cents: f64,
        cost_cents: i64,
        is_paper: bool,
    ) {
        if is_paper && !self.cfg.paper_trading_notifications {
            return;
        }
        let (emoji, label) = if is_paper { ("📝", "PAPER") } else { ("💰", "LIVE") };
        let text = format!(
            "{emoji} <b>{label} Trade Opened</b>\n\
             {ticker} — {description}\n\
             Side: {side} × {count} @ {price_cents}¢\n\
             Forecast: {forecast_f:.1}°F ({provider_count} providers)\n\
             Confidence: {confidence:.2} | Edge: {edge_cents:.1}¢\n\
             Cost: {cost_cents}¢"
        );
        self.send(text).await;
    }

    /// A position settled, win or loss.
    #[allow(clippy::too_many_arguments)]
    pub async fn notify_settlement(
        &self,
        ticker: &str,
        won: bool,
        pnl_cents: i64,
        forecast_f: Option<f64>,
        actual_f: Option<f64>,
        total_pnl_cents: i64,
        is_paper: bool,
    ) {
        if is_paper && !self.cfg.paper_trading_notifications {
            return;
        }
        let (emoji, label) = if won { ("✅", "WIN") } else { ("❌", "LOSS") };
        let mut text = format!("{emoji} <b>{label}</b> — {ticker}\nP&L: {pnl_cents}¢\n");
        if let (Some(f), Some(a)) = (forecast_f, actual_f) {
            text.push_str(&format!("Forecast: {f:.1}°F vs actual {a:.1}°F (err {:.1}°F)\n", (f - a).abs()));
        }
        text.push_str(&format!("Total P&L: {total_pnl_cents}¢"));
        self.send(text).await;
    }

    /// End-of-cycle daily summary; always sent regardless of paper mode.
    pub async fn notify_daily_summary(
        &self,
        trades: i64,
        wins: i64,
        losses: i64,
        pnl_cents: i64,
        open_positions: i64,
        balance_cents: i64,
    ) {
        let win_rate = if trades > 0 { wins as f64 / trades as f64 * 100.0 } else { 0.0 };
        let text = format!(
            "📊 <b>Daily Summary</b>\n\
             Trades: {trades} | Wins: {wins} | Losses: {losses} ({win_rate:.0}%)\n\
             P&L: {pnl_cents}¢\n\
             Open positions: {open_positions}\n\
             Balance: {balance_cents}¢"
        );
        self.send(text).await;
    }

    /// A system-level alert (circuit breaker trips, startup failures, etc).
    pub async fn notify_system_alert(&self, level: AlertLevel, message: &str, details: Option<&str>) {
        let mut text = format!("{} <b>{message}</b>", level.emoji());
        if let Some(d) = details {
            text.push('\n');
            text.push_str(d);
        }
        self.send(text).await;
    }
}
