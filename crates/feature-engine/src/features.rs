use chrono::{DateTime, NaiveDate, Utc};
use pipeline_core::{ChangeTable, LabelSeries, PipelineError, PriceTable, Scaler};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default lag horizons, in trading days.
pub const DEFAULT_LAG_DAYS: [usize; 3] = [1, 10, 30];

/// Knobs for [`prepare_features`].
#[derive(Debug, Clone)]
pub struct FeatureOptions {
    pub use_lags: bool,
    pub lag_days: Vec<usize>,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            use_lags: true,
            lag_days: DEFAULT_LAG_DAYS.to_vec(),
        }
    }
}

/// Model-ready dataset: standardized feature matrix, aligned labels, and the
/// fitted scaler. `feature_names` order is part of the model's identity and
/// rides along into the persisted metadata.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub features: ChangeTable,
    pub labels: LabelSeries,
    pub scaler: Scaler,
    pub feature_names: Vec<String>,
}

/// Append lagged copies of every change column except the target's.
///
/// For each non-target column and each lag `n`, a new column `{col}_lag{n}`
/// holds the value from `n` rows earlier. Rows without enough history are
/// dropped, so the output shrinks by the largest lag. The target's own change
/// column stays but is never lagged.
pub fn add_lag_features(
    changes: &ChangeTable,
    target: &str,
    lag_days: &[usize],
) -> Result<ChangeTable, PipelineError> {
    if lag_days.is_empty() {
        return Ok(changes.clone());
    }
    let max_lag = lag_days.iter().copied().max().unwrap_or(0);
    if changes.len() <= max_lag {
        return Err(PipelineError::InsufficientData(format!(
            "{} change rows cannot support lag {}",
            changes.len(),
            max_lag
        )));
    }

    let external: Vec<usize> = changes
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, col)| !col.starts_with(target))
        .map(|(idx, _)| idx)
        .collect();

    let mut columns = changes.columns().to_vec();
    for &idx in &external {
        for &lag in lag_days {
            columns.push(format!("{}_lag{}", changes.columns()[idx], lag));
        }
    }

    let rows: Vec<Vec<f64>> = (max_lag..changes.len())
        .map(|i| {
            let mut row = changes.rows()[i].clone();
            for &idx in &external {
                for &lag in lag_days {
                    row.push(changes.rows()[i - lag][idx]);
                }
            }
            row
        })
        .collect();
    let dates = changes.dates()[max_lag..].to_vec();

    ChangeTable::new(dates, columns, rows)
}

/// Next-day direction labels from raw prices: 1 iff the target closes higher
/// the following day. The last date has no tomorrow and gets no label.
pub fn derive_labels(prices: &PriceTable, target: &str) -> Result<LabelSeries, PipelineError> {
    let values = prices.column_values(target).ok_or_else(|| {
        PipelineError::InvalidData(format!("missing target column {}", target))
    })?;
    if values.len() < 2 {
        return Err(PipelineError::InsufficientData(format!(
            "{} rows cannot be labeled with next-day direction",
            values.len()
        )));
    }

    let labels: Vec<u8> = values.windows(2).map(|w| u8::from(w[1] > w[0])).collect();
    let dates = prices.dates()[..prices.len() - 1].to_vec();
    LabelSeries::new(dates, labels)
}

/// Turn raw closing prices into a model-ready dataset.
///
/// Pipeline: percentage changes, optional lag augmentation, next-day labels,
/// then alignment of features and labels on the intersection of their date
/// indices. The scaler is fit on the aligned matrix and applied in place;
/// its parameters are retained for persistence, never refit downstream.
pub fn prepare_features(
    prices: &PriceTable,
    target: &str,
    options: &FeatureOptions,
) -> Result<PreparedData, PipelineError> {
    let mut changes = prices.pct_change();
    if options.use_lags {
        changes = add_lag_features(&changes, target, &options.lag_days)?;
    }
    let labels = derive_labels(prices, target)?;

    let mut dates: Vec<NaiveDate> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut values: Vec<u8> = Vec::new();
    let mut label_idx = 0;
    for (date, row) in changes.dates().iter().zip(changes.rows().iter()) {
        while label_idx < labels.len() && labels.dates()[label_idx] < *date {
            label_idx += 1;
        }
        if label_idx < labels.len() && labels.dates()[label_idx] == *date {
            dates.push(*date);
            rows.push(row.clone());
            values.push(labels.values()[label_idx]);
        }
    }

    if dates.is_empty() {
        return Err(PipelineError::InsufficientData(
            "no overlapping dates between features and labels".to_string(),
        ));
    }

    let scaler = Scaler::fit(changes.columns(), &rows);
    let mut scaled = rows;
    scaler.transform(&mut scaled);

    let feature_names = changes.columns().to_vec();
    tracing::debug!(
        "prepared {} samples over {} features",
        dates.len(),
        feature_names.len()
    );

    Ok(PreparedData {
        features: ChangeTable::new(dates.clone(), feature_names.clone(), scaled)?,
        labels: LabelSeries::new(dates, values)?,
        scaler,
        feature_names,
    })
}

/// Persist the prepared dataset as CSV: `date, feature columns…, target`.
/// Same temp-then-rename discipline as the raw price cache.
pub fn write_prepared_csv(prepared: &PreparedData, path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::CacheError(e.to_string()))?;
        }
    }

    let tmp = path.with_extension("tmp");
    {
        let mut writer =
            csv::Writer::from_path(&tmp).map_err(|e| PipelineError::CacheError(e.to_string()))?;

        let mut header = vec!["date".to_string()];
        header.extend(prepared.feature_names.iter().cloned());
        header.push("target".to_string());
        writer
            .write_record(&header)
            .map_err(|e| PipelineError::CacheError(e.to_string()))?;

        for ((date, row), label) in prepared
            .features
            .dates()
            .iter()
            .zip(prepared.features.rows().iter())
            .zip(prepared.labels.values().iter())
        {
            let mut record = vec![date.format("%Y-%m-%d").to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            record.push(label.to_string());
            writer
                .write_record(&record)
                .map_err(|e| PipelineError::CacheError(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| PipelineError::CacheError(e.to_string()))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| PipelineError::CacheError(e.to_string()))
}

/// Read a prepared dataset back from [`write_prepared_csv`] output.
pub fn read_prepared_csv(path: &Path) -> Result<(ChangeTable, LabelSeries), PipelineError> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| PipelineError::CacheError(e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::CacheError(e.to_string()))?
        .clone();
    if headers.len() < 2 {
        return Err(PipelineError::CacheError(format!(
            "{}: expected date, features and target columns",
            path.display()
        )));
    }
    let feature_names: Vec<String> = headers
        .iter()
        .skip(1)
        .take(headers.len() - 2)
        .map(|h| h.to_string())
        .collect();

    let mut dates = Vec::new();
    let mut rows = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| PipelineError::CacheError(e.to_string()))?;
        let date_field = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(date_field, "%Y-%m-%d")
            .map_err(|e| PipelineError::CacheError(format!("bad date '{date_field}': {e}")))?;

        let mut row = Vec::with_capacity(feature_names.len());
        for field in record.iter().skip(1).take(feature_names.len()) {
            row.push(
                field
                    .parse::<f64>()
                    .map_err(|e| PipelineError::CacheError(format!("bad value in CSV: {e}")))?,
            );
        }
        let label_field = record.get(record.len() - 1).unwrap_or_default();
        let label = label_field
            .parse::<u8>()
            .map_err(|e| PipelineError::CacheError(format!("bad label '{label_field}': {e}")))?;

        dates.push(date);
        rows.push(row);
        values.push(label);
    }

    Ok((
        ChangeTable::new(dates.clone(), feature_names, rows)?,
        LabelSeries::new(dates, values)?,
    ))
}

/// Snapshot of a collection run, persisted as JSON next to the prepared CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub collected_at: DateTime<Utc>,
    pub raw_rows: usize,
    pub raw_columns: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub sample_count: usize,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
    pub positive_ratio: f64,
}

impl DatasetMetadata {
    pub fn describe(raw: &PriceTable, prepared: &PreparedData) -> Result<Self, PipelineError> {
        let (first, last) = match (raw.dates().first(), raw.dates().last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(PipelineError::InvalidData(
                    "cannot describe an empty price table".to_string(),
                ))
            }
        };
        Ok(Self {
            collected_at: Utc::now(),
            raw_rows: raw.len(),
            raw_columns: raw.columns().to_vec(),
            start_date: first,
            end_date: last,
            sample_count: prepared.features.len(),
            feature_count: prepared.feature_names.len(),
            feature_names: prepared.feature_names.clone(),
            positive_ratio: prepared.labels.positive_ratio(),
        })
    }

    pub fn save_json(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::CacheError(e.to_string()))?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::CacheError(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| PipelineError::CacheError(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| PipelineError::CacheError(e.to_string()))
    }

    pub fn load_json(path: &Path) -> Result<Self, PipelineError> {
        let json =
            std::fs::read_to_string(path).map_err(|e| PipelineError::CacheError(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| PipelineError::CacheError(e.to_string()))
    }
}
