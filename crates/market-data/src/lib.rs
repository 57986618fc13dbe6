pub mod acquisition;
pub mod symbols;

pub use acquisition::{acquire, AcquiredData, AcquisitionConfig, AcquisitionStrategy};
pub use symbols::{SymbolRegistry, TARGET_SERIES};

use chrono::{NaiveDate, TimeZone, Utc};
use pipeline_core::PipelineError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Thin client for the Yahoo Finance chart API: daily close series per
/// ticker, nothing else. A slow or dead endpoint is equivalent to the
/// symbol being unavailable, so every request carries a timeout.
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
}

impl YahooClient {
    pub fn new() -> Self {
        let timeout_secs: u64 = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("bist-insight/0.1")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    /// Fetch the daily close series for one ticker over `[start, end]`
    /// inclusive. Rows without a close value are skipped.
    pub async fn get_daily_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, PipelineError> {
        let period1 = Utc
            .from_utc_datetime(&start.and_hms_opt(0, 0, 0).unwrap_or_default())
            .timestamp();
        let period2 = Utc
            .from_utc_datetime(
                &end.succ_opt()
                    .unwrap_or(end)
                    .and_hms_opt(0, 0, 0)
                    .unwrap_or_default(),
            )
            .timestamp();

        let url = format!("{}/v8/finance/chart/{}", BASE_URL, ticker);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::ProviderError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::ProviderError(format!(
                "{}: HTTP {}",
                ticker,
                response.status()
            )));
        }

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ProviderError(e.to_string()))?;

        if let Some(err) = chart.chart.error {
            return Err(PipelineError::ProviderError(format!("{}: {}", ticker, err)));
        }

        let result = chart
            .chart
            .result
            .and_then(|mut results| {
                if results.is_empty() {
                    None
                } else {
                    Some(results.remove(0))
                }
            })
            .ok_or_else(|| {
                PipelineError::ProviderError(format!("{}: empty chart result", ticker))
            })?;

        let timestamps = result.timestamp.unwrap_or_default();
        let closes = result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default();

        let points: Vec<(NaiveDate, f64)> = timestamps
            .iter()
            .zip(closes.iter())
            .filter_map(|(ts, close)| {
                let close = (*close)?;
                let date = chrono::DateTime::from_timestamp(*ts, 0)?.date_naive();
                Some((date, close))
            })
            .collect();

        Ok(points)
    }
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Deserialize)]
struct Indicators {
    quote: Vec<QuoteBlock>,
}

#[derive(Deserialize)]
struct QuoteBlock {
    close: Vec<Option<f64>>,
}
