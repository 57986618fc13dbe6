//! Feature engineering for the direction pipeline: percentage-change
//! features with lag augmentation, next-day direction labels, fit-time
//! standardization, and the lag-correlation analyzer.

pub mod features;
pub mod lag_correlation;

pub use features::{
    add_lag_features, derive_labels, prepare_features, read_prepared_csv, write_prepared_csv,
    DatasetMetadata, FeatureOptions, PreparedData, DEFAULT_LAG_DAYS,
};
pub use lag_correlation::{analyze_lag_correlations, pearson, rolling_correlation, MAX_LAG_DAYS};
