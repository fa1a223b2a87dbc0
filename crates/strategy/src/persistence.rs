//! On-disk persistence: read-modify-write-whole JSON documents plus
//! append-only JSONL logs, mirroring the reference implementation's
//! `state.py`/`logger.py` habits.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, Utc};
use common::config::PersistenceConfig;
use common::{AccuracyHistory, DaemonState, Error, PnLBucket, PnLLedger};
use serde::Serialize;
use tracing::warn;

pub struct Persistence {
    cfg: PersistenceConfig,
}

impl Persistence {
    pub fn new(cfg: PersistenceConfig) -> Self {
        Self { cfg }
    }

    fn path(&self, file_name: &str) -> PathBuf {
        self.cfg.path(file_name)
    }

    fn load_json<T: Default + serde::de::DeserializeOwned>(&self, file_name: &str) -> T {
        let path = self.path(file_name);
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("{}: failed to parse, starting fresh: {}", path.display(), e);
                T::default()
            }),
            Err(_) => T::default(),
        }
    }

    fn save_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<(), Error> {
        let path = self.path(file_name);
        let contents = serde_json::to_string_pretty(value)?;
        fs::write(&path, contents)?;
        Ok(())
    }

    fn append_jsonl<T: Serialize>(&self, file_name: &str, value: &T) -> Result<(), Error> {
        let path = self.path(file_name);
        let line = serde_json::to_string(value)?;
        let mut f = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{}", line)?;
        Ok(())
    }

    pub fn load_state(&self) -> DaemonState {
        self.load_json(&self.cfg.state_file.clone())
    }

    pub fn save_state(&self, state: &DaemonState) -> Result<(), Error> {
        self.save_json(&self.cfg.state_file.clone(), state)
    }

    pub fn load_pnl(&self) -> PnLLedger {
        self.load_json(&self.cfg.pnl_file.clone())
    }

    pub fn save_pnl(&self, pnl: &PnLLedger) -> Result<(), Error> {
        self.save_json(&self.cfg.pnl_file.clone(), pnl)
    }

    pub fn load_accuracy(&self) -> AccuracyHistory {
        self.load_json(&self.cfg.accuracy_file.clone())
    }

    pub fn save_accuracy(&self, history: &AccuracyHistory) -> Result<(), Error> {
        self.save_json(&self.cfg.accuracy_file.clone(), history)
    }

    pub fn append_paper_trade<T: Serialize>(&self, entry: &T) -> Result<(), Error> {
        self.append_jsonl(&self.cfg.paper_trades_file.clone(), entry)
    }

    pub fn append_settlement<T: Serialize>(&self, entry: &T) -> Result<(), Error> {
        self.append_jsonl(&self.cfg.settlements_file.clone(), entry)
    }

    pub fn append_backtest<T: Serialize>(&self, entry: &T) -> Result<(), Error> {
        self.append_jsonl(&self.cfg.backtest_file.clone(), entry)
    }
}

/// Python's `strftime("%Y-%W-%U")`-style Sunday-anchored week-of-year key
/// (NOT ISO-8601 week numbering, which is Monday-anchored) — kept bit-for-bit
/// compatible with the reference implementation's bucket keys.
pub fn week_key(date: NaiveDate) -> String {
    let year = date.year();
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    let yday = date.ordinal0() as i64;
    let jan1_dow_from_sunday = jan1.weekday().num_days_from_sunday() as i64;
    let week = (yday + 7 - jan1_dow_from_sunday) / 7;
    format!("{year}-W{week:02}")
}

/// Record one settlement's P&L into both the daily and weekly buckets.
pub fn record_pnl(ledger: &mut PnLLedger, trade_date: NaiveDate, pnl_cents: i64, won: bool) {
    let day_key = trade_date.format("%Y-%m-%d").to_string();
    let wk_key = week_key(trade_date);

    for (map, key) in [(&mut ledger.daily, day_key), (&mut ledger.weekly, wk_key)] {
        let bucket = map.entry(key).or_insert_with(PnLBucket::default);
        bucket.pnl_cents += pnl_cents;
        bucket.trades += 1;
        if won {
            bucket.wins += 1;
        } else {
            bucket.losses += 1;
        }
    }
}

/// Today's key in both forms the circuit breaker needs to match against.
pub fn today_keys() -> (String, String) {
    let local = chrono::Local::now().format("%Y-%m-%d").to_string();
    let utc = Utc::now().format("%Y-%m-%d").to_string();
    (local, utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_key_format() {
        let d = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let k = week_key(d);
        assert!(k.starts_with("2026-W"));
    }

    #[test]
    fn test_record_pnl_updates_both_buckets() {
        let mut ledger = PnLLedger::default();
        let d = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        record_pnl(&mut ledger, d, 300, true);
        let day = ledger.daily.get("2026-07-27").unwrap();
        assert_eq!(day.pnl_cents, 300);
        assert_eq!(day.wins, 1);
        assert_eq!(day.trades, 1);
        let week = ledger.weekly.get(&week_key(d)).unwrap();
        assert_eq!(week.pnl_cents, 300);
    }

    #[test]
    fn test_record_pnl_loss_increments_losses() {
        let mut ledger = PnLLedger::default();
        let d = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        record_pnl(&mut ledger, d, -150, false);
        assert_eq!(ledger.daily.get("2026-07-27").unwrap().losses, 1);
    }
}
