use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Duplicate pivot entry for variable '{variable}' at lag {lag_days}")]
    DuplicatePivotEntry { variable: String, lag_days: usize },

    #[error("Training failed: {0}")]
    TrainingFailed(String),

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),
}
