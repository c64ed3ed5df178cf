use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{AppError, Result};

pub const MIN_LOOKBACK_DAYS: u32 = 1;
pub const MAX_LOOKBACK_DAYS: u32 = 365;

/// One trading day of OHLCV data for a symbol
#[derive(Clone, Debug, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub symbol: String,
}

/// Which slice of history to request
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PeriodSpec {
    /// Trailing calendar days ending now
    Lookback(u32),
    /// Explicit dates, end exclusive
    Range { start: NaiveDate, end: NaiveDate },
}

impl PeriodSpec {
    /// Unix-second window `(period1, period2)` for this period relative to `now`
    pub fn window(&self, now: DateTime<Utc>) -> (i64, i64) {
        match *self {
            PeriodSpec::Lookback(days) => {
                let days = days.clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS);
                let start = now - Duration::days(i64::from(days));
                (start.timestamp(), now.timestamp())
            }
            PeriodSpec::Range { start, end } => (midnight_utc(start), midnight_utc(end)),
        }
    }
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Validated user query. Only lives for the duration of one action.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryParameters {
    pub symbol: String,
    pub period: PeriodSpec,
}

impl QueryParameters {
    pub fn new(symbol: &str, period: PeriodSpec) -> Result<Self> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(AppError::Input("Enter a stock symbol first".to_string()));
        }
        Ok(Self {
            symbol: symbol.to_uppercase(),
            period,
        })
    }
}

/// Parse a `YYYY-MM-DD` date typed into one of the date inputs
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Input(format!("'{}' is not a date (use YYYY-MM-DD)", input.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_blank_symbol_rejected() {
        let err = QueryParameters::new("   ", PeriodSpec::Lookback(30)).unwrap_err();
        assert!(matches!(err, AppError::Input(_)));
    }

    #[test]
    fn test_symbol_trimmed_and_uppercased() {
        let q = QueryParameters::new("  aapl ", PeriodSpec::Lookback(30)).unwrap();
        assert_eq!(q.symbol, "AAPL");
    }

    #[test]
    fn test_lookback_window_ends_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let (p1, p2) = PeriodSpec::Lookback(30).window(now);
        assert_eq!(p2, now.timestamp());
        assert_eq!(p2 - p1, 30 * 86_400);
    }

    #[test]
    fn test_lookback_clamped_to_a_year() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let (p1, p2) = PeriodSpec::Lookback(5000).window(now);
        assert_eq!(p2 - p1, 365 * 86_400);
        let (p1, p2) = PeriodSpec::Lookback(0).window(now);
        assert_eq!(p2 - p1, 86_400);
    }

    #[test]
    fn test_range_window_uses_midnights() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let (p1, p2) = PeriodSpec::Range { start, end }.window(Utc::now());
        assert_eq!(p1, 1_704_153_600);
        assert_eq!(p2 - p1, 3 * 86_400);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date(" 2024-02-29 ").unwrap(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(parse_date("29/02/2024").is_err());
    }
}
