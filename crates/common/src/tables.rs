//! Static domain tables: city dispersion, known model biases, and
//! correlation groups. These are measured constants, not user-tunable
//! configuration, so they live as code rather than in `BotConfig`.

use chrono::{Datelike, NaiveDate};

/// Baseline forecast RMSE (°F) used when a city/season has no specific entry.
pub const FORECAST_STD_DEV: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

/// Meteorological season for a date (winter = Dec-Feb).
pub fn season_for(date: NaiveDate) -> Season {
    match date.month() {
        12 | 1 | 2 => Season::Winter,
        3 | 4 | 5 => Season::Spring,
        6 | 7 | 8 => Season::Summer,
        _ => Season::Fall,
    }
}

/// City x season standard deviation (°F), falling back to `FORECAST_STD_DEV`.
pub fn city_std_dev(city_code: &str, target_date: NaiveDate) -> f64 {
    let season = season_for(target_date);
    let row = CITY_STD_DEV.iter().find(|(code, _)| *code == city_code);
    match row {
        Some((_, winter, spring, summer, fall)) => match season {
            Season::Winter => *winter,
            Season::Spring => *spring,
            Season::Summer => *summer,
            Season::Fall => *fall,
        },
        None => FORECAST_STD_DEV,
    }
}

/// `(city_code, winter, spring, summer, fall)`.
const CITY_STD_DEV: &[(&str, f64, f64, f64, f64)] = &[
    ("PHX", 0.9, 1.1, 0.8, 0.9),
    ("SFO", 1.3, 1.5, 1.1, 1.3),
    ("SEA", 1.6, 1.5, 0.9, 1.5),
    ("DC", 1.5, 1.3, 1.1, 1.3),
    ("HOU", 1.3, 1.1, 0.9, 1.1),
    ("NOLA", 1.3, 1.1, 0.9, 1.1),
    ("DAL", 1.5, 1.3, 0.9, 1.3),
    ("BOS", 1.5, 1.3, 1.1, 1.3),
    ("OKC", 1.6, 1.5, 1.1, 1.5),
    ("ATL", 1.3, 1.1, 0.9, 1.1),
    ("MIN", 2.0, 1.6, 1.1, 1.5),
];

/// Known per-(provider, city) additive bias in °F; positive means the model
/// runs warm. Subtracted from that provider's raw forecast.
const MODEL_BIAS: &[(&str, &str, f64)] = &[
    ("NOAA", "PHX", 0.0),
    ("OpenMeteo_GFS", "PHX", 0.5),
    ("OpenMeteo_GFS", "BOS", 1.0),
    ("OpenMeteo_ICON", "HOU", -0.8),
];

/// Measured bias for a (provider, city) pair, or 0.0 if unknown.
pub fn model_bias(provider_name: &str, city_code: &str) -> f64 {
    MODEL_BIAS
        .iter()
        .find(|(p, c, _)| *p == provider_name && *c == city_code)
        .map(|(_, _, bias)| *bias)
        .unwrap_or(0.0)
}

/// Cities whose daily-high outcomes are believed correlated (shared weather
/// systems), capped together by the risk gate.
const CORRELATION_GROUPS: &[(&str, &[&str])] = &[
    ("gulf_south", &["HOU", "NOLA", "DAL", "OKC"]),
    ("northeast", &["BOS", "DC"]),
    ("pacific", &["SEA", "SFO"]),
    ("southeast", &["ATL"]),
    ("desert", &["PHX"]),
    ("north_central", &["MIN"]),
];

/// The correlation group a city belongs to, or the city code itself if it
/// belongs to no named group (each city is a member of exactly one group).
pub fn correlation_group(city_code: &str) -> &str {
    for (group, cities) in CORRELATION_GROUPS {
        if cities.contains(&city_code) {
            return group;
        }
    }
    city_code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_std_dev_known_city() {
        let d = NaiveDate::from_ymd_opt(2026, 7, 15).unwrap();
        assert_eq!(city_std_dev("PHX", d), 0.8); // summer
    }

    #[test]
    fn test_city_std_dev_unknown_city_falls_back() {
        let d = NaiveDate::from_ymd_opt(2026, 7, 15).unwrap();
        assert_eq!(city_std_dev("ZZZ", d), FORECAST_STD_DEV);
    }

    #[test]
    fn test_correlation_group_membership() {
        assert_eq!(correlation_group("HOU"), "gulf_south");
        assert_eq!(correlation_group("DC"), "northeast");
        assert_eq!(correlation_group("PHX"), "desert");
    }

    #[test]
    fn test_correlation_group_singleton_fallback() {
        assert_eq!(correlation_group("XYZ"), "XYZ");
    }

    #[test]
    fn test_model_bias_known_and_unknown() {
        assert_eq!(model_bias("OpenMeteo_GFS", "PHX"), 0.5);
        assert_eq!(model_bias("OpenMeteo_GFS", "DC"), 0.0);
    }
}
