//! Ticker/title date parsing shared by the scanner and settlement.

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;

const MONTHS: &[(&str, u32)] = &[
    ("jan", 1), ("feb", 2), ("mar", 3), ("apr", 4), ("may", 5), ("jun", 6),
    ("jul", 7), ("aug", 8), ("sep", 9), ("oct", 10), ("nov", 11), ("dec", 12),
];

fn month_from_abbrev(s: &str) -> Option<u32> {
    let lower = s.to_lowercase();
    MONTHS.iter().find(|(abbrev, _)| lower.starts_with(abbrev)).map(|(_, m)| *m)
}

/// Extract a target date from an event title such as "Highest Temperature
/// in Phoenix on July 27" or "... tomorrow". Falls back to `None` if no
/// month+day pattern is found. Dates that would land more than a few days
/// in the past are rolled forward a year, since event titles never refer
/// to settled history.
pub fn parse_event_date(title: &str) -> Option<NaiveDate> {
    let lower = title.to_lowercase();
    let today = Utc::now().date_naive();
    if lower.contains("today") {
        return Some(today);
    }
    if lower.contains("tomorrow") {
        return Some(today + chrono::Duration::days(1));
    }

    let re = Regex::new(r"(?i)(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})").unwrap();
    let caps = re.captures(title)?;
    let month = month_from_abbrev(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;

    let mut year = today.year();
    let mut candidate = NaiveDate::from_ymd_opt(year, month, day)?;
    if candidate < today - chrono::Duration::days(3) {
        year += 1;
        candidate = NaiveDate::from_ymd_opt(year, month, day)?;
    }
    Some(candidate)
}

/// Parse a settlement date from a ticker's `-DDMMMYY-` segment (e.g.
/// `KXHIGHTPHX-26FEB14-T95` -> 2014-02-26), falling back to the caller's
/// stored `target_date` when the ticker doesn't match.
pub fn parse_settlement_date(ticker: &str, stored_target_date: NaiveDate) -> NaiveDate {
    let re = Regex::new(r"-(\d{2})([A-Za-z]{3})(\d{2})-").unwrap();
    re.captures(ticker)
        .and_then(|caps| {
            let day: u32 = caps[1].parse().ok()?;
            let month = month_from_abbrev(&caps[2])?;
            let yy: i32 = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(2000 + yy, month, day)
        })
        .unwrap_or(stored_target_date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_date_month_day() {
        let today = Utc::now().date_naive();
        let title = format!("Highest temperature in Phoenix on {} {}", month_name(today.month()), today.day());
        let parsed = parse_event_date(&title).unwrap();
        assert_eq!(parsed, today);
    }

    #[test]
    fn test_parse_event_date_today_tomorrow() {
        let today = Utc::now().date_naive();
        assert_eq!(parse_event_date("High temp today in DC"), Some(today));
        assert_eq!(
            parse_event_date("High temp tomorrow in DC"),
            Some(today + chrono::Duration::days(1))
        );
    }

    #[test]
    fn test_parse_settlement_date_from_ticker() {
        let d = parse_settlement_date(
            "KXHIGHTPHX-26FEB14-T95",
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        );
        assert_eq!(d, NaiveDate::from_ymd_opt(2014, 2, 26).unwrap());
    }

    #[test]
    fn test_parse_settlement_date_falls_back() {
        let fallback = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let d = parse_settlement_date("KXHIGHTPHX-NOPATTERN-T95", fallback);
        assert_eq!(d, fallback);
    }

    fn month_name(m: u32) -> &'static str {
        MONTHS.iter().find(|(_, n)| *n == m).map(|(name, _)| *name).unwrap()
    }
}
