use chrono::NaiveDate;
use pipeline_core::{LagCorrelation, LagCorrelationPivot, PipelineError, PriceTable};
use rayon::prelude::*;
use statrs::statistics::Statistics;

/// Largest lag horizon swept by the analyzer, in trading days.
pub const MAX_LAG_DAYS: usize = 30;

/// Pearson correlation coefficient. NaN for fewer than two points or a
/// zero-variance input, mirroring how a skipped or degenerate overlap is
/// reported rather than failed.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return f64::NAN;
    }
    let mean_x = x.mean();
    let mean_y = y.mean();

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        f64::NAN
    } else {
        cov / denom
    }
}

/// Sweep every non-target series over lags `1..=MAX_LAG_DAYS`, correlating
/// the target's daily change against the series' change shifted back by the
/// lag. A (variable, lag) pair with no overlapping observations is omitted
/// entirely; an overlap of one point yields a NaN record.
///
/// Output order: variables in table column order, lags ascending. The sweep
/// per variable is independent, so variables run in parallel.
pub fn analyze_lag_correlations(
    prices: &PriceTable,
    target: &str,
) -> Result<(Vec<LagCorrelation>, LagCorrelationPivot), PipelineError> {
    let target_changes = column_changes(prices, target).ok_or_else(|| {
        PipelineError::InvalidData(format!("missing target column {}", target))
    })?;

    let others: Vec<&String> = prices
        .columns()
        .iter()
        .filter(|col| col.as_str() != target)
        .collect();

    let grouped: Vec<Vec<LagCorrelation>> = others
        .par_iter()
        .map(|col| {
            let series = match column_changes(prices, col.as_str()) {
                Some(series) => series,
                None => return Vec::new(),
            };
            let mut records = Vec::new();
            for lag in 1..=MAX_LAG_DAYS {
                // Shared date index means the overlap is empty iff the
                // series is shorter than the lag.
                if series.len() <= lag {
                    continue;
                }
                let lagged = &series[..series.len() - lag];
                let aligned_target = &target_changes[lag..];
                records.push(LagCorrelation {
                    variable: col.to_string(),
                    lag_days: lag,
                    correlation: pearson(aligned_target, lagged),
                });
            }
            records
        })
        .collect();

    let records: Vec<LagCorrelation> = grouped.into_iter().flatten().collect();
    let pivot = LagCorrelationPivot::from_records(&records)?;
    Ok((records, pivot))
}

/// Windowed Pearson correlation between the target's and one variable's daily
/// changes, one value per trailing window. Feeds the dashboard's correlation-
/// over-time view.
pub fn rolling_correlation(
    prices: &PriceTable,
    target: &str,
    variable: &str,
    window: usize,
) -> Result<Vec<(NaiveDate, f64)>, PipelineError> {
    if window < 2 {
        return Err(PipelineError::InvalidData(format!(
            "rolling window {} is below the 2-point minimum",
            window
        )));
    }
    let target_changes = column_changes(prices, target).ok_or_else(|| {
        PipelineError::InvalidData(format!("missing target column {}", target))
    })?;
    let variable_changes = column_changes(prices, variable).ok_or_else(|| {
        PipelineError::InvalidData(format!("missing column {}", variable))
    })?;
    if target_changes.len() < window {
        return Err(PipelineError::InsufficientData(format!(
            "{} change rows for a window of {}",
            target_changes.len(),
            window
        )));
    }

    let dates = &prices.dates()[1..];
    let series = (window - 1..target_changes.len())
        .map(|i| {
            let lo = i + 1 - window;
            (
                dates[i],
                pearson(&target_changes[lo..=i], &variable_changes[lo..=i]),
            )
        })
        .collect();
    Ok(series)
}

fn column_changes(prices: &PriceTable, name: &str) -> Option<Vec<f64>> {
    let values = prices.column_values(name)?;
    Some(values.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect())
}
