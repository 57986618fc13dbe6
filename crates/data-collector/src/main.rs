//! data-collector: fetch BIST 100 and macro indicator closes, build the
//! prepared feature set, train the direction model, and report tomorrow's
//! call.
//!
//! Usage:
//!   cargo run -p data-collector
//!   cargo run -p data-collector -- --start 2023-01-01 --end 2024-01-01
//!   cargo run -p data-collector -- --data-dir data --models-dir models
//!   cargo run -p data-collector -- --no-lags

use chrono::{Duration, NaiveDate, Utc};
use feature_engine::{prepare_features, write_prepared_csv, DatasetMetadata, FeatureOptions};
use market_data::{acquire, AcquisitionConfig, SymbolRegistry, YahooClient, TARGET_SERIES};
use prediction_service::{predict_latest, ArtifactPaths};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "data_collector=info,market_data=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let end: NaiveDate = args
        .iter()
        .position(|a| a == "--end")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
        .unwrap_or_else(|| Utc::now().date_naive());

    let start: NaiveDate = args
        .iter()
        .position(|a| a == "--start")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
        .unwrap_or(end - Duration::days(365));

    let data_dir: PathBuf = args
        .iter()
        .position(|a| a == "--data-dir")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"));

    let models_dir: PathBuf = args
        .iter()
        .position(|a| a == "--models-dir")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("models"));

    let use_lags = !args.iter().any(|a| a == "--no-lags");

    let paths = ArtifactPaths {
        raw_csv: data_dir.join("bist_prices.csv"),
        prepared_csv: data_dir.join("bist_prepared.csv"),
        model: models_dir.join("current_model.json"),
        metadata: models_dir.join("model_metadata.json"),
    };

    tracing::info!("collecting closes for {} symbols, {} to {}", SymbolRegistry::new().len(), start, end);

    let client = YahooClient::new();
    let registry = SymbolRegistry::new();
    let config = AcquisitionConfig::new(&paths.raw_csv);
    let acquired = acquire(&client, &registry, start, end, &config).await?;

    tracing::info!(
        "acquired {} rows via {} strategy",
        acquired.table.len(),
        acquired.strategy.name()
    );
    if !acquired.missing_symbols.is_empty() {
        tracing::warn!("missing symbols: {}", acquired.missing_symbols.join(", "));
    }

    let options = FeatureOptions {
        use_lags,
        ..FeatureOptions::default()
    };
    let prepared = prepare_features(&acquired.table, TARGET_SERIES, &options)?;
    write_prepared_csv(&prepared, &paths.prepared_csv)?;

    let dataset_metadata = DatasetMetadata::describe(&acquired.table, &prepared)?;
    dataset_metadata.save_json(&data_dir.join("dataset_metadata.json"))?;
    tracing::info!(
        "prepared {} samples over {} features ({}% up days)",
        dataset_metadata.sample_count,
        dataset_metadata.feature_count,
        (dataset_metadata.positive_ratio * 100.0).round()
    );

    let outcome = direction_model::train_with_grid(
        prepared.features.rows(),
        prepared.labels.values(),
        &prepared.feature_names,
        &prepared.scaler,
    )?;
    direction_model::save_model(&outcome.model, &paths.model)?;
    direction_model::save_metadata(&outcome.metadata, &paths.metadata)?;

    tracing::info!(
        "best model: n_estimators={} learning_rate={} max_depth={} accuracy={:.4}",
        outcome.metadata.params.n_estimators,
        outcome.metadata.params.learning_rate,
        outcome.metadata.params.max_depth,
        outcome.evaluation.accuracy
    );
    tracing::info!(
        "cross-validation accuracy: {:.4} (+/- {:.4})",
        outcome.cv.mean,
        outcome.cv.std
    );
    for (name, importance) in outcome.evaluation.feature_importance.iter().take(10) {
        tracing::info!("  {}: {:.4}", name, importance);
    }
    if !outcome.metadata.meets_criterion {
        tracing::warn!("model saved but misses the accuracy criterion");
    }

    let prediction = predict_latest(&acquired.table, &outcome.model, &outcome.metadata)?;
    tracing::info!(
        "next-day call as of {}: {} (p_up={:.4})",
        prediction.as_of,
        prediction.direction.name(),
        prediction.probability
    );

    Ok(())
}
