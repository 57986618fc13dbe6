use direction_model::{GradientBoostedClassifier, ModelMetadata};
use feature_engine::analyze_lag_correlations;
use pipeline_core::{
    ChangeTable, LabelSeries, LagCorrelation, LagCorrelationPivot, PipelineError, PriceTable,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::FileCache;

/// Where a pipeline run leaves its artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub raw_csv: PathBuf,
    pub prepared_csv: PathBuf,
    pub model: PathBuf,
    pub metadata: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            raw_csv: PathBuf::from("data/bist_prices.csv"),
            prepared_csv: PathBuf::from("data/bist_prepared.csv"),
            model: PathBuf::from("models/current_model.json"),
            metadata: PathBuf::from("models/model_metadata.json"),
        }
    }
}

/// Everything the presentation layer reads, as plain data. Rendering is out
/// of scope here; this is the boundary it pulls from.
pub struct DashboardData {
    pub raw: Arc<PriceTable>,
    pub prepared_features: ChangeTable,
    pub prepared_labels: LabelSeries,
    pub lag_records: Vec<LagCorrelation>,
    pub lag_pivot: LagCorrelationPivot,
    pub model: Arc<GradientBoostedClassifier>,
    pub metadata: Arc<ModelMetadata>,
}

/// Caches for each artifact kind, reused across dashboard refreshes.
pub struct DashboardCaches {
    pub raw: FileCache<PriceTable>,
    pub model: FileCache<GradientBoostedClassifier>,
    pub metadata: FileCache<ModelMetadata>,
}

impl DashboardCaches {
    pub fn new() -> Self {
        Self {
            raw: FileCache::new(|path| PriceTable::read_csv(path)),
            model: FileCache::new(|path| direction_model::load_model(path)),
            metadata: FileCache::new(|path| direction_model::load_metadata(path)),
        }
    }
}

impl Default for DashboardCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble the dashboard's inputs from disk, recomputing the lag tables
/// from the cached raw prices.
pub fn load_dashboard_data(
    paths: &ArtifactPaths,
    caches: &mut DashboardCaches,
    target: &str,
) -> Result<DashboardData, PipelineError> {
    let raw = caches.raw.get(&paths.raw_csv)?;
    let (prepared_features, prepared_labels) = feature_engine::read_prepared_csv(&paths.prepared_csv)?;
    let (lag_records, lag_pivot) = analyze_lag_correlations(&raw, target)?;
    let model = caches.model.get(&paths.model)?;
    let metadata = caches.metadata.get(&paths.metadata)?;

    Ok(DashboardData {
        raw,
        prepared_features,
        prepared_labels,
        lag_records,
        lag_pivot,
        model,
        metadata,
    })
}
