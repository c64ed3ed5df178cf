//! Historical price fetching from Yahoo Finance
//!
//! Every call goes to the network; nothing is cached between actions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::FetchError;
use crate::model::{PeriodSpec, PriceRecord};

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Anything that can produce daily history for a symbol.
///
/// An empty vector means the provider has no rows for the window; that is
/// not an error.
pub trait PriceSource: Send + Sync {
    fn fetch(&self, symbol: &str, period: &PeriodSpec) -> Result<Vec<PriceRecord>, FetchError>;
}

/// Blocking client for the v8 chart API
pub struct YahooSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooSource {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: CHART_URL.to_string(),
        })
    }

    fn url(&self, symbol: &str, period: &PeriodSpec, now: DateTime<Utc>) -> String {
        let (period1, period2) = period.window(now);
        format!(
            "{}/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url, symbol, period1, period2
        )
    }
}

impl PriceSource for YahooSource {
    fn fetch(&self, symbol: &str, period: &PeriodSpec) -> Result<Vec<PriceRecord>, FetchError> {
        let url = self.url(symbol, period, Utc::now());
        tracing::debug!(%url, "requesting chart");

        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()?;
        let status = response.status();
        let body = response.text()?;

        match parse_chart(symbol, &body) {
            // A 404 still carries a chart.error payload, which parse_chart reports
            Err(FetchError::Decode(_)) if !status.is_success() => Err(FetchError::Provider {
                symbol: symbol.to_string(),
                message: format!("HTTP {}", status),
            }),
            other => other,
        }
    }
}

#[derive(Deserialize, Debug)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Deserialize, Debug)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartFault>,
}

#[derive(Deserialize, Debug)]
struct ChartFault {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Deserialize, Debug, Default)]
struct ChartMeta {
    #[serde(rename = "gmtoffset", default)]
    gmt_offset: i64,
}

#[derive(Deserialize, Debug, Default)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

// Yahoo leaves nulls in the arrays on days without trades
#[derive(Deserialize, Debug, Default)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Turn a chart API body into ascending daily records
pub fn parse_chart(symbol: &str, body: &str) -> Result<Vec<PriceRecord>, FetchError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)?;

    if let Some(fault) = envelope.chart.error {
        return Err(FetchError::Provider {
            symbol: symbol.to_string(),
            message: fault
                .description
                .or(fault.code)
                .unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };

    let symbol = symbol.to_uppercase();
    let offset = result.meta.gmt_offset;
    let mut records: Vec<PriceRecord> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let date = DateTime::from_timestamp(ts.checked_add(offset)?, 0)?.date_naive();
            Some(PriceRecord {
                date,
                open: cell(&quote.open, i)?,
                high: cell(&quote.high, i)?,
                low: cell(&quote.low, i)?,
                close: cell(&quote.close, i)?,
                volume: cell(&quote.volume, i).unwrap_or(0.0) as i64,
                symbol: symbol.clone(),
            })
        })
        .collect();

    records.sort_by_key(|r| r.date);
    Ok(records)
}

fn cell(column: &[Option<f64>], i: usize) -> Option<f64> {
    column.get(i).copied().flatten()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned provider used by the shell and store tests
    pub struct MockSource {
        pub records: Vec<PriceRecord>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl MockSource {
        pub fn with_days(symbol: &str, days: usize) -> Self {
            let first = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let records = (0..days)
                .map(|i| {
                    let close = 100.0 + i as f64;
                    PriceRecord {
                        date: first + chrono::Duration::days(i as i64),
                        open: close - 0.5,
                        high: close + 1.0,
                        low: close - 1.0,
                        close,
                        volume: 1_000 + i as i64,
                        symbol: symbol.to_string(),
                    }
                })
                .collect();
            Self {
                records,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                records: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PriceSource for MockSource {
        fn fetch(&self, symbol: &str, _period: &PeriodSpec) -> Result<Vec<PriceRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FetchError::Provider {
                    symbol: symbol.to_string(),
                    message: "No data found, symbol may be delisted".to_string(),
                });
            }
            Ok(self.records.clone())
        }
    }

    const AAPL_BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL", "gmtoffset": -14400},
                "timestamp": [1704378600, 1704205800, 1704292200],
                "indicators": {"quote": [{
                    "open":   [181.99, 187.15, 184.22],
                    "high":   [182.76, 188.44, 185.88],
                    "low":    [180.17, 183.89, 183.43],
                    "close":  [181.91, 185.64, 184.25],
                    "volume": [71983600, 82488700, 58414500]
                }]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_sorts_by_date() {
        let records = parse_chart("aapl", AAPL_BODY).unwrap();
        assert_eq!(records.len(), 3);

        let dates: Vec<_> = records.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-02", "2024-01-03", "2024-01-04"]);
        assert_eq!(records[0].close, 185.64);
        assert_eq!(records[2].close, 181.91);
        assert_eq!(records[2].volume, 71_983_600);
        assert!(records.iter().all(|r| r.symbol == "AAPL"));
    }

    #[test]
    fn test_parse_chart_skips_null_rows() {
        let body = r#"{"chart":{"result":[{"meta":{},"timestamp":[1704205800,1704292200],
            "indicators":{"quote":[{"open":[1.0,null],"high":[2.0,null],"low":[0.5,null],
            "close":[1.5,null],"volume":[10,null]}]}}],"error":null}}"#;
        let records = parse_chart("X", body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].close, 1.5);
    }

    #[test]
    fn test_no_timestamps_is_empty_not_error() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"AAPL"},"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse_chart("AAPL", body).unwrap().is_empty());

        let body = r#"{"chart":{"result":null,"error":null}}"#;
        assert!(parse_chart("AAPL", body).unwrap().is_empty());
    }

    #[test]
    fn test_provider_error_is_fetch_failure() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("NOPE", body).unwrap_err();
        match err {
            FetchError::Provider { symbol, message } => {
                assert_eq!(symbol, "NOPE");
                assert!(message.contains("delisted"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_timestamp_skipped() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":3600},
            "timestamp":[9223372036854775807,1704205800],
            "indicators":{"quote":[{"open":[1.0,2.0],"high":[1.0,2.0],"low":[1.0,2.0],
            "close":[1.0,2.0],"volume":[1,2]}]}}],"error":null}}"#;
        let records = parse_chart("X", body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].close, 2.0);
    }

    #[test]
    fn test_garbage_body_is_decode_error() {
        assert!(matches!(parse_chart("AAPL", "<html>"), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_url_carries_window() {
        let source = YahooSource::new().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let url = source.url("MSFT", &PeriodSpec::Lookback(1), now);
        assert!(url.starts_with("https://query2.finance.yahoo.com/v8/finance/chart/MSFT?"));
        assert!(url.contains(&format!("period1={}", now.timestamp() - 86_400)));
        assert!(url.contains(&format!("period2={}", now.timestamp())));
        assert!(url.contains("interval=1d"));
    }
}
