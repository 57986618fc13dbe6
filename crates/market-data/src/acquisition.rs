//! Three-tier acquisition chain: cached file, then orchestrated bulk
//! collection, then raw per-symbol downloads.
//!
//! Each strategy is an explicit step returning success or failure; the
//! caller only moves on to the next step when the previous one failed.
//! One unavailable symbol never fails the whole acquisition; only zero
//! retrievable symbols does.

use crate::symbols::SymbolRegistry;
use crate::YahooClient;
use chrono::{Duration, NaiveDate};
use pipeline_core::{PipelineError, PriceTable};
use std::path::PathBuf;

/// Minimum lookback window for bulk collection, in days.
const MIN_LOOKBACK_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Location of the wholesale price-table CSV cache.
    pub cache_path: PathBuf,
}

impl AcquisitionConfig {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
        }
    }
}

/// Which step of the fallback chain produced the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStrategy {
    CachedFile,
    BulkCollect,
    PerSymbol,
}

impl AcquisitionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionStrategy::CachedFile => "cached_file",
            AcquisitionStrategy::BulkCollect => "bulk_collect",
            AcquisitionStrategy::PerSymbol => "per_symbol",
        }
    }
}

/// Acquisition result: the table, the strategy that produced it, and the
/// registry symbols it is missing. A partial table is a success; the missing
/// list keeps the shortfall observable.
#[derive(Debug, Clone)]
pub struct AcquiredData {
    pub table: PriceTable,
    pub strategy: AcquisitionStrategy,
    pub missing_symbols: Vec<String>,
}

/// Acquire closing prices for `[start, end]` inclusive, falling through the
/// strategy chain. The returned table covers the intersection of the
/// requested range and available provider history.
pub async fn acquire(
    client: &YahooClient,
    registry: &SymbolRegistry,
    start: NaiveDate,
    end: NaiveDate,
    config: &AcquisitionConfig,
) -> Result<AcquiredData, PipelineError> {
    // (a) a previously saved full-history file, filtered to the range
    if config.cache_path.exists() {
        match PriceTable::read_csv(&config.cache_path) {
            Ok(full) => {
                let table = full.filter_range(start, end);
                if !table.is_empty() {
                    let missing = missing_from(registry, &table);
                    tracing::debug!(
                        "acquisition: served {} rows from cache {}",
                        table.len(),
                        config.cache_path.display()
                    );
                    return Ok(AcquiredData {
                        table,
                        strategy: AcquisitionStrategy::CachedFile,
                        missing_symbols: missing,
                    });
                }
                tracing::warn!(
                    "acquisition: cache covers none of {}..{}, refetching",
                    start,
                    end
                );
            }
            Err(e) => {
                tracing::warn!("acquisition: unreadable cache, refetching: {}", e);
            }
        }
    }

    // (b) orchestrated bulk collection over an at-least-one-year window
    match bulk_collect(client, registry, start, end, config).await {
        Ok(data) => return Ok(data),
        Err(e) => {
            tracing::warn!(
                "acquisition: bulk collection failed, trying per-symbol downloads: {}",
                e
            );
        }
    }

    // (c) raw per-symbol downloads for exactly the requested range
    per_symbol(client, registry, start, end, config).await
}

/// Download every registry symbol over a lookback window of at least one
/// year ending at `end`, persist the full history, and filter to the
/// requested range.
pub async fn bulk_collect(
    client: &YahooClient,
    registry: &SymbolRegistry,
    start: NaiveDate,
    end: NaiveDate,
    config: &AcquisitionConfig,
) -> Result<AcquiredData, PipelineError> {
    let requested_days = (end - start).num_days();
    let lookback = Duration::days(requested_days.max(MIN_LOOKBACK_DAYS));
    let fetch_start = end - lookback;

    let (series, missing) = download_all(client, registry, fetch_start, end).await;
    let full = PriceTable::from_series(&series)?;
    full.write_csv(&config.cache_path)?;

    Ok(AcquiredData {
        table: full.filter_range(start, end),
        strategy: AcquisitionStrategy::BulkCollect,
        missing_symbols: missing,
    })
}

/// Download each symbol independently for exactly the requested range,
/// keeping whatever subset succeeded, then merge, fill, and persist.
pub async fn per_symbol(
    client: &YahooClient,
    registry: &SymbolRegistry,
    start: NaiveDate,
    end: NaiveDate,
    config: &AcquisitionConfig,
) -> Result<AcquiredData, PipelineError> {
    let (series, missing) = download_all(client, registry, start, end).await;
    let table = PriceTable::from_series(&series)?;
    table.write_csv(&config.cache_path)?;

    Ok(AcquiredData {
        table,
        strategy: AcquisitionStrategy::PerSymbol,
        missing_symbols: missing,
    })
}

/// Sequential per-symbol downloads with independent failure domains: a
/// failed or empty symbol is logged and skipped, never aborting the rest.
async fn download_all(
    client: &YahooClient,
    registry: &SymbolRegistry,
    start: NaiveDate,
    end: NaiveDate,
) -> (Vec<(String, Vec<(NaiveDate, f64)>)>, Vec<String>) {
    let mut series = Vec::with_capacity(registry.len());
    let mut missing = Vec::new();

    for (name, ticker) in registry.iter() {
        match client.get_daily_closes(ticker, start, end).await {
            Ok(points) if !points.is_empty() => {
                tracing::debug!("downloaded {} points for {} ({})", points.len(), name, ticker);
                series.push((name.to_string(), points));
            }
            Ok(_) => {
                tracing::warn!("no data for {} ({}), skipping", name, ticker);
                missing.push(name.to_string());
            }
            Err(e) => {
                tracing::warn!("download failed for {} ({}): {}, skipping", name, ticker, e);
                missing.push(name.to_string());
            }
        }
    }

    (series, missing)
}

fn missing_from(registry: &SymbolRegistry, table: &PriceTable) -> Vec<String> {
    registry
        .names()
        .into_iter()
        .filter(|name| !table.has_column(name))
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn temp_cache(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "acquisition_{}_{}_{}.csv",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn cached_table() -> PriceTable {
        let dates: Vec<NaiveDate> = (1..=10).map(|d| date(2024, 3, d)).collect();
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![9000.0 + i as f64, 2000.0]).collect();
        PriceTable::new(dates, vec!["BIST100".into(), "Gold".into()], rows).unwrap()
    }

    #[tokio::test]
    async fn test_cached_file_strategy_serves_filtered_range() {
        let cache = temp_cache("hit");
        cached_table().write_csv(&cache).unwrap();

        let client = YahooClient::new();
        let registry = SymbolRegistry::new();
        let config = AcquisitionConfig::new(&cache);

        let acquired = acquire(&client, &registry, date(2024, 3, 3), date(2024, 3, 6), &config)
            .await
            .unwrap();
        std::fs::remove_file(&cache).ok();

        assert_eq!(acquired.strategy, AcquisitionStrategy::CachedFile);
        assert_eq!(acquired.table.len(), 4);
        // Cache only holds two of the seven registry series.
        assert_eq!(acquired.missing_symbols.len(), 5);
        assert!(acquired.missing_symbols.contains(&"Oil".to_string()));
        assert!(!acquired.missing_symbols.contains(&"BIST100".to_string()));
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(AcquisitionStrategy::CachedFile.name(), "cached_file");
        assert_eq!(AcquisitionStrategy::BulkCollect.name(), "bulk_collect");
        assert_eq!(AcquisitionStrategy::PerSymbol.name(), "per_symbol");
    }
}
