//! Gradient-boosted binary direction classifier: depth-limited regression
//! trees over logistic loss, a fixed hyperparameter grid, and JSON model
//! persistence. Training is fully deterministic under the fixed split seed.

pub mod gbm;
pub mod training;
pub mod tree;

pub use gbm::{GbmParams, GradientBoostedClassifier, PARAM_GRID};
pub use training::{
    cross_validate, evaluate_model, load_metadata, load_model, save_metadata, save_model,
    train_test_split, train_with_grid, ClassMetrics, CvResults, ModelEvaluation, ModelMetadata,
    SplitData, TrainingOutcome, CV_FOLDS, SPLIT_SEED, SUCCESS_THRESHOLD, TEST_FRACTION,
};
pub use tree::RegressionTree;
