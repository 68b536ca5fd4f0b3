//! Market-data boundary and local summary statistics.
//!
//! The [`MarketDataProvider`] trait is the only place the process talks to
//! a market-data service; everything derived from a fetched series
//! (percent change, range, volatility, trend) is computed locally by
//! [`summarize`]. The live implementation calls the Yahoo Finance chart
//! endpoint with a bounded timeout and retry count; [`StaticProvider`]
//! serves canned series for tests and offline use.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::models::{PriceBar, StockSummary, Trend};

/// Moving-average window for trend detection.
const TREND_WINDOW: usize = 5;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch a daily time series for `symbol` over `period` (e.g. `1mo`).
    async fn fetch(&self, symbol: &str, period: &str) -> Result<Vec<PriceBar>, MarketError>;
}

/// Derive summary statistics from a fetched series.
///
/// Returns `None` for an empty series. Volatility is the standard
/// deviation of daily percent returns; trend compares the latest close
/// against short and long moving averages.
pub fn summarize(symbol: &str, period: &str, bars: &[PriceBar]) -> Option<StockSummary> {
    let first = bars.first()?;
    let last = bars.last()?;

    let change = last.close - first.close;
    let change_pct = if first.close.abs() > f64::EPSILON {
        change / first.close * 100.0
    } else {
        0.0
    };

    let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let avg_volume = (bars.iter().map(|b| b.volume as f64).sum::<f64>() / bars.len() as f64) as u64;

    Some(StockSummary {
        symbol: symbol.to_string(),
        period: period.to_string(),
        latest_close: last.close,
        change,
        change_pct,
        high,
        low,
        avg_volume,
        volatility_pct: daily_return_stddev(bars) * 100.0,
        trend: detect_trend(bars, TREND_WINDOW),
        trading_days: bars.len(),
    })
}

fn daily_return_stddev(bars: &[PriceBar]) -> f64 {
    let returns: Vec<f64> = bars
        .windows(2)
        .filter(|w| w[0].close.abs() > f64::EPSILON)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

/// Judge trend from short and long moving averages of the close.
pub fn detect_trend(bars: &[PriceBar], window: usize) -> Trend {
    if bars.len() < window * 2 {
        return Trend::InsufficientData;
    }
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let short_ma = closes[closes.len() - window..].iter().sum::<f64>() / window as f64;
    let long_ma =
        closes[closes.len() - window * 2..].iter().sum::<f64>() / (window * 2) as f64;
    let current = *closes.last().unwrap_or(&0.0);

    if current > short_ma && short_ma > long_ma {
        Trend::Up
    } else if current < short_ma && short_ma < long_ma {
        Trend::Down
    } else {
        Trend::Sideways
    }
}

/// Create the live provider from configuration.
pub fn create_provider(config: &MarketConfig) -> anyhow::Result<Box<dyn MarketDataProvider>> {
    Ok(Box::new(YahooProvider::new(config)?))
}

// ============ Yahoo Provider ============

/// Live provider calling the Yahoo Finance chart endpoint
/// (`GET /v8/finance/chart/{symbol}?range={period}&interval=1d`).
pub struct YahooProvider {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl YahooProvider {
    pub fn new(config: &MarketConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            timeout,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    async fn fetch(&self, symbol: &str, period: &str) -> Result<Vec<PriceBar>, MarketError> {
        let url = format!(
            "https://query1.finance.yahoo.com/v8/finance/chart/{}?range={}&interval=1d",
            symbol, period
        );

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.get(&url).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| MarketError::Http(e.to_string()))?;
                        return parse_chart_response(symbol, &json);
                    }
                    if status.as_u16() == 429 {
                        last_err = Some(MarketError::RateLimited);
                        continue;
                    }
                    if status.is_server_error() {
                        last_err = Some(MarketError::Http(format!("server error {}", status)));
                        continue;
                    }
                    return Err(MarketError::Http(format!(
                        "chart request for {} failed: {}",
                        symbol, status
                    )));
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(MarketError::Timeout(self.timeout));
                    continue;
                }
                Err(e) => {
                    last_err = Some(MarketError::Http(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| MarketError::Http("request failed".to_string())))
    }
}

fn parse_chart_response(symbol: &str, json: &serde_json::Value) -> Result<Vec<PriceBar>, MarketError> {
    let result = json
        .pointer("/chart/result/0")
        .ok_or_else(|| MarketError::NoData(symbol.to_string()))?;

    let timestamps = result
        .pointer("/timestamp")
        .and_then(|t| t.as_array())
        .ok_or_else(|| MarketError::NoData(symbol.to_string()))?;
    let quote = result
        .pointer("/indicators/quote/0")
        .ok_or_else(|| MarketError::NoData(symbol.to_string()))?;

    let series = |field: &str| -> Vec<Option<f64>> {
        quote
            .get(field)
            .and_then(|v| v.as_array())
            .map(|a| a.iter().map(|x| x.as_f64()).collect())
            .unwrap_or_default()
    };

    let opens = series("open");
    let highs = series("high");
    let lows = series("low");
    let closes = series("close");
    let volumes = series("volume");

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let date = ts
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        // Days without a quote come back as nulls; skip them.
        match (
            date,
            opens.get(i).copied().flatten(),
            highs.get(i).copied().flatten(),
            lows.get(i).copied().flatten(),
            closes.get(i).copied().flatten(),
        ) {
            (Some(date), Some(open), Some(high), Some(low), Some(close)) => {
                let volume = volumes.get(i).copied().flatten().unwrap_or(0.0) as u64;
                bars.push(PriceBar {
                    date,
                    open,
                    high,
                    low,
                    close,
                    volume,
                });
            }
            _ => continue,
        }
    }

    if bars.is_empty() {
        return Err(MarketError::NoData(symbol.to_string()));
    }
    Ok(bars)
}

// ============ Static Provider ============

/// Canned series keyed by symbol, for tests and offline runs.
#[derive(Default)]
pub struct StaticProvider {
    series: HashMap<String, Vec<PriceBar>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.series.insert(symbol.to_string(), bars);
        self
    }
}

#[async_trait]
impl MarketDataProvider for StaticProvider {
    async fn fetch(&self, symbol: &str, _period: &str) -> Result<Vec<PriceBar>, MarketError> {
        self.series
            .get(symbol)
            .cloned()
            .ok_or_else(|| MarketError::NoData(symbol.to_string()))
    }
}

/// Build a smooth synthetic daily series, convenient for tests.
pub fn synthetic_series(start_close: f64, daily_step: f64, days: usize) -> Vec<PriceBar> {
    let t0 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("valid timestamp");
    (0..days)
        .map(|i| {
            let close = start_close + daily_step * i as f64;
            PriceBar {
                date: t0 + chrono::Duration::days(i as i64),
                open: close - daily_step / 2.0,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000 + (i as u64) * 10_000,
            }
        })
        .collect()
}
