use chrono::NaiveDate;
use direction_model::{GradientBoostedClassifier, ModelMetadata};
use pipeline_core::{Direction, LabelSeries, PipelineError, PriceTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One served prediction: the call for the trading day after `as_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub direction: Direction,
    pub probability: f64,
    pub as_of: NaiveDate,
}

/// Predict tomorrow's direction from the latest raw rows.
///
/// The last two rows become a per-series percentage-change map; the feature
/// vector follows the model's stored name order, zero-filled for any name
/// with no serving-time value (lag columns and absent series alike). Values
/// are the raw changes. Model-level failures surface as `PredictionFailed`,
/// never a panic.
pub fn predict_latest(
    prices: &PriceTable,
    model: &GradientBoostedClassifier,
    metadata: &ModelMetadata,
) -> Result<Prediction, PipelineError> {
    if prices.len() < 2 {
        return Err(PipelineError::InsufficientData(format!(
            "{} rows cannot produce a latest change",
            prices.len()
        )));
    }

    let latest = prices.tail(2);
    let mut changes: HashMap<String, f64> = HashMap::with_capacity(latest.columns().len());
    for (idx, column) in latest.columns().iter().enumerate() {
        let prev = latest.rows()[0][idx];
        let curr = latest.rows()[1][idx];
        changes.insert(format!("{}_change", column), (curr - prev) / prev);
    }

    let row: Vec<f64> = metadata
        .feature_names
        .iter()
        .map(|name| changes.get(name).copied().unwrap_or(0.0))
        .collect();

    let probability = model
        .predict_probability(&row)
        .map_err(|e| PipelineError::PredictionFailed(e.to_string()))?;
    let direction = Direction::from_label(u8::from(probability > 0.5));
    let as_of = latest.dates()[1];

    tracing::debug!(
        "prediction as of {}: {} (p_up={:.4})",
        as_of,
        direction.name(),
        probability
    );
    Ok(Prediction {
        direction,
        probability,
        as_of,
    })
}

/// Up/down day counts over the trailing `n` labels.
pub fn recent_direction_counts(labels: &LabelSeries, n: usize) -> (usize, usize) {
    let values = labels.values();
    let skip = values.len().saturating_sub(n);
    let up = values[skip..].iter().filter(|&&v| v == 1).count();
    let down = values.len() - skip - up;
    (up, down)
}

#[cfg(test)]
mod tests {
    use super::*;
    use direction_model::{train_with_grid, GbmParams};
    use pipeline_core::Scaler;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Model over two named change features, trained so that a positive
    /// first feature means an up call.
    fn fitted_artifacts() -> (GradientBoostedClassifier, ModelMetadata) {
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let x = (i as f64 / 60.0) * 0.04 - 0.02;
                vec![x, (i as f64 * 0.51).sin() * 0.01]
            })
            .collect();
        let labels: Vec<u8> = rows.iter().map(|row| u8::from(row[0] > 0.0)).collect();
        let names = vec!["Gold_change".to_string(), "Oil_change".to_string()];
        let scaler = Scaler {
            columns: names.clone(),
            means: vec![0.0, 0.0],
            stds: vec![1.0, 1.0],
        };

        let outcome = train_with_grid(&rows, &labels, &names, &scaler).unwrap();
        (outcome.model, outcome.metadata)
    }

    #[test]
    fn test_missing_features_are_zero_filled() {
        let (model, metadata) = fitted_artifacts();

        // Raw table carries Gold but no Oil: the Oil slot must read 0.0.
        let dates = vec![date(2024, 5, 1), date(2024, 5, 2)];
        let rows = vec![vec![100.0], vec![101.0]];
        let prices = PriceTable::new(dates, vec!["Gold".into()], rows).unwrap();

        let prediction = predict_latest(&prices, &model, &metadata).unwrap();
        assert_eq!(prediction.as_of, date(2024, 5, 2));

        // Gold rose 1%, which the model learned as an up signal; the direct
        // probe with the same zero-filled vector must agree exactly.
        let expected = model.predict_probability(&[0.01, 0.0]).unwrap();
        assert!((prediction.probability - expected).abs() < 1e-12);
        assert_eq!(prediction.direction, Direction::Up);
    }

    #[test]
    fn test_prediction_needs_two_rows() {
        let (model, metadata) = fitted_artifacts();
        let prices = PriceTable::new(
            vec![date(2024, 5, 1)],
            vec!["Gold".into()],
            vec![vec![100.0]],
        )
        .unwrap();

        assert!(matches!(
            predict_latest(&prices, &model, &metadata),
            Err(PipelineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_model_failure_is_caught_at_the_boundary() {
        let (model, mut metadata) = fitted_artifacts();
        // A stale metadata file listing an extra feature makes the vector
        // wider than the model; that must surface as PredictionFailed.
        metadata.feature_names.push("VIX_change".to_string());

        let dates = vec![date(2024, 5, 1), date(2024, 5, 2)];
        let rows = vec![vec![100.0], vec![101.0]];
        let prices = PriceTable::new(dates, vec!["Gold".into()], rows).unwrap();

        assert!(matches!(
            predict_latest(&prices, &model, &metadata),
            Err(PipelineError::PredictionFailed(_))
        ));
    }

    #[test]
    fn test_recent_direction_counts() {
        let dates: Vec<NaiveDate> = (1..=6).map(|d| date(2024, 5, d)).collect();
        let labels = LabelSeries::new(dates, vec![1, 1, 0, 1, 0, 0]).unwrap();

        assert_eq!(recent_direction_counts(&labels, 3), (1, 2));
        assert_eq!(recent_direction_counts(&labels, 100), (3, 3));
        assert_eq!(recent_direction_counts(&labels, 0), (0, 0));
    }

    #[test]
    fn test_grid_params_match_fitted_model() {
        let (model, metadata) = fitted_artifacts();
        let params: GbmParams = metadata.params;
        assert_eq!(model.params(), params);
    }
}
