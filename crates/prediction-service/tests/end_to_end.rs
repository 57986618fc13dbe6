//! Full pipeline run on synthetic data: prices to prepared features to a
//! trained model to a served prediction, with every artifact persisted and
//! read back through the dashboard path.

use chrono::NaiveDate;
use feature_engine::{prepare_features, write_prepared_csv, FeatureOptions};
use pipeline_core::{Direction, PriceTable};
use prediction_service::{
    load_dashboard_data, predict_latest, recent_direction_counts, ArtifactPaths, DashboardCaches,
};

const TARGET: &str = "BIST100";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Forty days of a strictly rising index alongside two wiggling series.
fn rising_market(days: u64) -> PriceTable {
    let start = date(2024, 1, 1);
    let dates: Vec<NaiveDate> = (0..days).map(|i| start + chrono::Days::new(i)).collect();
    let rows: Vec<Vec<f64>> = (0..days)
        .map(|i| {
            vec![
                9000.0 + 15.0 * i as f64,
                2000.0 + (i as f64 * 0.8).sin() * 40.0,
                75.0 + (i as f64 * 1.1).cos() * 6.0,
            ]
        })
        .collect();
    PriceTable::new(
        dates,
        vec![TARGET.into(), "Gold".into(), "Oil".into()],
        rows,
    )
    .unwrap()
}

#[test]
fn rising_market_trains_and_serves_an_up_call() {
    let prices = rising_market(40);
    let prepared = prepare_features(&prices, TARGET, &FeatureOptions::default()).unwrap();

    // 40 raw days leave 8 aligned samples once changes, the 30-day lag and
    // the final unlabeled day are accounted for; all of them are up days.
    assert_eq!(prepared.features.len(), 8);
    assert!(prepared.labels.values().iter().all(|&v| v == 1));

    let outcome = direction_model::train_with_grid(
        prepared.features.rows(),
        prepared.labels.values(),
        &prepared.feature_names,
        &prepared.scaler,
    )
    .unwrap();

    // A market that only rises is called perfectly.
    assert!((outcome.evaluation.accuracy - 1.0).abs() < 1e-12);
    assert!(outcome.metadata.meets_criterion);

    let dir = std::env::temp_dir().join(format!(
        "pipeline_e2e_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let paths = ArtifactPaths {
        raw_csv: dir.join("data/bist_prices.csv"),
        prepared_csv: dir.join("data/bist_prepared.csv"),
        model: dir.join("models/current_model.json"),
        metadata: dir.join("models/model_metadata.json"),
    };

    prices.write_csv(&paths.raw_csv).unwrap();
    write_prepared_csv(&prepared, &paths.prepared_csv).unwrap();
    direction_model::save_model(&outcome.model, &paths.model).unwrap();
    direction_model::save_metadata(&outcome.metadata, &paths.metadata).unwrap();

    let mut caches = DashboardCaches::new();
    let dashboard = load_dashboard_data(&paths, &mut caches, TARGET).unwrap();
    std::fs::remove_dir_all(&dir).ok();

    assert_eq!(dashboard.raw.len(), 40);
    assert_eq!(dashboard.prepared_features.len(), 8);
    assert_eq!(dashboard.metadata.feature_names, prepared.feature_names);
    // 39 change rows: every lag in 1..=30 overlaps for both variables.
    assert_eq!(dashboard.lag_records.len(), 60);
    assert!(dashboard.lag_pivot.variables().contains(&"Gold".to_string()));

    let prediction = predict_latest(&dashboard.raw, &dashboard.model, &dashboard.metadata).unwrap();
    assert_eq!(prediction.direction, Direction::Up);
    assert!(prediction.probability > 0.5);
    assert_eq!(prediction.as_of, *prices.dates().last().unwrap());

    assert_eq!(recent_direction_counts(&dashboard.prepared_labels, 5), (5, 0));
}
