use crate::tree::RegressionTree;
use pipeline_core::{Direction, PipelineError};
use serde::{Deserialize, Serialize};

/// Probability clamp keeping log-odds and Newton denominators finite.
const PROB_EPS: f64 = 1e-6;

/// Hyperparameters for one boosting run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
}

/// The candidate grid swept by the trainer, in evaluation order.
pub const PARAM_GRID: [GbmParams; 5] = [
    GbmParams {
        n_estimators: 100,
        learning_rate: 0.1,
        max_depth: 3,
    },
    GbmParams {
        n_estimators: 200,
        learning_rate: 0.05,
        max_depth: 5,
    },
    GbmParams {
        n_estimators: 100,
        learning_rate: 0.1,
        max_depth: 6,
    },
    GbmParams {
        n_estimators: 150,
        learning_rate: 0.05,
        max_depth: 4,
    },
    GbmParams {
        n_estimators: 100,
        learning_rate: 0.01,
        max_depth: 7,
    },
];

/// Gradient-boosted binary classifier over logistic loss.
///
/// Boosting state is a per-sample log-odds score, seeded with the base rate
/// and pushed by one depth-limited regression tree per round, each fit to
/// the current residuals with Newton leaf values. No row or feature
/// subsampling, so a fit is a pure function of its inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    params: GbmParams,
    init_score: f64,
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
    n_features: usize,
}

impl GradientBoostedClassifier {
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], params: GbmParams) -> Result<Self, PipelineError> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(PipelineError::TrainingFailed(format!(
                "{} rows against {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let n_features = rows[0].len();
        if n_features == 0 || rows.iter().any(|row| row.len() != n_features) {
            return Err(PipelineError::TrainingFailed(
                "feature matrix is ragged or empty".to_string(),
            ));
        }

        let targets: Vec<f64> = labels.iter().map(|&y| y as f64).collect();
        let base_rate = (targets.iter().sum::<f64>() / targets.len() as f64)
            .clamp(PROB_EPS, 1.0 - PROB_EPS);
        let init_score = (base_rate / (1.0 - base_rate)).ln();

        let mut scores = vec![init_score; rows.len()];
        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let mut residuals = Vec::with_capacity(rows.len());
            let mut hessians = Vec::with_capacity(rows.len());
            for (score, target) in scores.iter().zip(targets.iter()) {
                let p = sigmoid(*score).clamp(PROB_EPS, 1.0 - PROB_EPS);
                residuals.push(target - p);
                hessians.push(p * (1.0 - p));
            }

            let tree = RegressionTree::fit(
                rows,
                &residuals,
                &hessians,
                params.max_depth,
                &mut importances,
            );
            for (score, row) in scores.iter_mut().zip(rows.iter()) {
                *score += params.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for value in importances.iter_mut() {
                *value /= total;
            }
        }

        Ok(Self {
            params,
            init_score,
            trees,
            importances,
            n_features,
        })
    }

    /// Probability that the next day is an up day.
    pub fn predict_probability(&self, row: &[f64]) -> Result<f64, PipelineError> {
        if row.len() != self.n_features {
            return Err(PipelineError::PredictionFailed(format!(
                "expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let mut score = self.init_score;
        for tree in &self.trees {
            score += self.params.learning_rate * tree.predict_row(row);
        }
        Ok(sigmoid(score))
    }

    pub fn predict(&self, row: &[f64]) -> Result<Direction, PipelineError> {
        let probability = self.predict_probability(row)?;
        Ok(Direction::from_label(u8::from(probability > 0.5)))
    }

    pub fn predict_labels(&self, rows: &[Vec<f64>]) -> Result<Vec<u8>, PipelineError> {
        rows.iter()
            .map(|row| Ok(self.predict(row)?.to_label()))
            .collect()
    }

    /// Normalized split-gain importance, aligned to the training column
    /// order. Sums to 1 unless no tree ever split.
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn params(&self) -> GbmParams {
        self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Labels follow the sign of feature 0; feature 1 is a decoy.
    fn separable_data(n: usize) -> (Vec<Vec<f64>>, Vec<u8>) {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let x = (i as f64 / n as f64) * 4.0 - 2.0;
                vec![x, (i as f64 * 0.37).sin()]
            })
            .collect();
        let labels = rows.iter().map(|row| u8::from(row[0] > 0.0)).collect();
        (rows, labels)
    }

    fn small_params() -> GbmParams {
        GbmParams {
            n_estimators: 20,
            learning_rate: 0.3,
            max_depth: 3,
        }
    }

    #[test]
    fn test_learns_separable_rule() {
        let (rows, labels) = separable_data(60);
        let model = GradientBoostedClassifier::fit(&rows, &labels, small_params()).unwrap();

        let predicted = model.predict_labels(&rows).unwrap();
        assert_eq!(predicted, labels);

        assert!(model.predict_probability(&[1.5, 0.0]).unwrap() > 0.9);
        assert!(model.predict_probability(&[-1.5, 0.0]).unwrap() < 0.1);
        assert_eq!(model.predict(&[1.5, 0.0]).unwrap(), Direction::Up);
    }

    #[test]
    fn test_importance_concentrates_on_informative_feature() {
        let (rows, labels) = separable_data(60);
        let model = GradientBoostedClassifier::fit(&rows, &labels, small_params()).unwrap();

        let importances = model.feature_importances();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
        assert!(importances[0] > 0.9);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (rows, labels) = separable_data(40);
        let a = GradientBoostedClassifier::fit(&rows, &labels, small_params()).unwrap();
        let b = GradientBoostedClassifier::fit(&rows, &labels, small_params()).unwrap();

        for row in &rows {
            let pa = a.predict_probability(row).unwrap();
            let pb = b.predict_probability(row).unwrap();
            assert_eq!(pa, pb);
        }
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_one_sided_labels_predict_up() {
        let (rows, _) = separable_data(40);
        let labels = vec![1u8; rows.len()];
        let model = GradientBoostedClassifier::fit(&rows, &labels, small_params()).unwrap();

        for row in &rows {
            assert_eq!(model.predict(row).unwrap(), Direction::Up);
            assert!(model.predict_probability(row).unwrap() > 0.99);
        }
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(matches!(
            GradientBoostedClassifier::fit(&[], &[], small_params()),
            Err(PipelineError::TrainingFailed(_))
        ));

        let (rows, labels) = separable_data(20);
        let model = GradientBoostedClassifier::fit(&rows, &labels, small_params()).unwrap();
        assert!(matches!(
            model.predict_probability(&[1.0]),
            Err(PipelineError::PredictionFailed(_))
        ));
    }
}
