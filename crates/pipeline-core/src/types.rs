use crate::PipelineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Predicted direction of the next trading day's close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn from_label(label: u8) -> Self {
        if label == 1 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    pub fn to_label(self) -> u8 {
        match self {
            Direction::Up => 1,
            Direction::Down => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Direction::Up => "Up",
            Direction::Down => "Down",
        }
    }
}

/// Binary next-day-direction labels aligned by date: 1 iff the target series
/// closes higher the following trading day. Undefined for the last date of
/// the source price table, which has no tomorrow.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSeries {
    dates: Vec<NaiveDate>,
    values: Vec<u8>,
}

impl LabelSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<u8>) -> Result<Self, PipelineError> {
        if dates.len() != values.len() {
            return Err(PipelineError::InvalidData(format!(
                "{} labels for {} dates",
                values.len(),
                dates.len()
            )));
        }
        Ok(Self { dates, values })
    }

    pub fn value_on(&self, date: NaiveDate) -> Option<u8> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|idx| self.values[idx])
    }

    /// Fraction of up days.
    pub fn positive_ratio(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().map(|&v| v as f64).sum::<f64>() / self.values.len() as f64
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One long-form lag-correlation observation: Pearson correlation between the
/// target's daily change and `variable`'s daily change shifted by `lag_days`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagCorrelation {
    pub variable: String,
    pub lag_days: usize,
    pub correlation: f64,
}

/// Variable x lag matrix reshaped from long-form lag-correlation records,
/// ready for heatmap rendering. Cells with no record stay NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct LagCorrelationPivot {
    variables: Vec<String>,
    lags: Vec<usize>,
    matrix: Vec<Vec<f64>>,
}

impl LagCorrelationPivot {
    /// Pivot long-form records into a matrix. Variables keep first-appearance
    /// order, lags are sorted ascending. A second record for the same
    /// (variable, lag) pair is a hard error naming the colliding cell.
    pub fn from_records(records: &[LagCorrelation]) -> Result<Self, PipelineError> {
        let mut variables: Vec<String> = Vec::new();
        for record in records {
            if !variables.contains(&record.variable) {
                variables.push(record.variable.clone());
            }
        }
        let mut lags: Vec<usize> = records.iter().map(|r| r.lag_days).collect();
        lags.sort_unstable();
        lags.dedup();

        let mut matrix = vec![vec![f64::NAN; lags.len()]; variables.len()];
        let mut filled = vec![vec![false; lags.len()]; variables.len()];
        for record in records {
            let var_idx = variables
                .iter()
                .position(|v| v == &record.variable)
                .unwrap_or(0);
            let lag_idx = lags.iter().position(|&l| l == record.lag_days).unwrap_or(0);
            if filled[var_idx][lag_idx] {
                return Err(PipelineError::DuplicatePivotEntry {
                    variable: record.variable.clone(),
                    lag_days: record.lag_days,
                });
            }
            matrix[var_idx][lag_idx] = record.correlation;
            filled[var_idx][lag_idx] = true;
        }

        Ok(Self {
            variables,
            lags,
            matrix,
        })
    }

    pub fn get(&self, variable: &str, lag_days: usize) -> Option<f64> {
        let var_idx = self.variables.iter().position(|v| v == variable)?;
        let lag_idx = self.lags.iter().position(|&l| l == lag_days)?;
        let value = self.matrix[var_idx][lag_idx];
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn lags(&self) -> &[usize] {
        &self.lags
    }

    pub fn matrix(&self) -> &[Vec<f64>] {
        &self.matrix
    }
}

/// Per-column standardization parameters fit once at preparation time.
///
/// The fitted means and standard deviations are part of a trained model's
/// identity: they ride along in the persisted metadata and are reused
/// verbatim, never recomputed on serving-time rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub columns: Vec<String>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Scaler {
    /// Fit column-wise mean and standard deviation over a row-major matrix.
    /// Zero-variance columns get a divisor of 1.0 so transform stays defined.
    pub fn fit(columns: &[String], rows: &[Vec<f64>]) -> Self {
        let n = rows.len().max(1) as f64;
        let width = columns.len();

        let mut means = vec![0.0; width];
        for row in rows {
            for (acc, v) in means.iter_mut().zip(row.iter()) {
                *acc += v;
            }
        }
        for mean in means.iter_mut() {
            *mean /= n;
        }

        let mut stds = vec![0.0; width];
        for row in rows {
            for ((acc, v), mean) in stds.iter_mut().zip(row.iter()).zip(means.iter()) {
                *acc += (v - mean).powi(2);
            }
        }
        for std in stds.iter_mut() {
            *std = (*std / n).sqrt();
            if *std == 0.0 {
                *std = 1.0;
            }
        }

        Self {
            columns: columns.to_vec(),
            means,
            stds,
        }
    }

    /// Apply the fitted parameters to a row-major matrix in place.
    pub fn transform(&self, rows: &mut [Vec<f64>]) {
        for row in rows.iter_mut() {
            for ((v, mean), std) in row.iter_mut().zip(self.means.iter()).zip(self.stds.iter()) {
                *v = (*v - mean) / std;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pivot_preserves_order_and_detects_duplicates() {
        let records = vec![
            LagCorrelation {
                variable: "Gold_change".into(),
                lag_days: 2,
                correlation: 0.3,
            },
            LagCorrelation {
                variable: "Gold_change".into(),
                lag_days: 1,
                correlation: 0.1,
            },
            LagCorrelation {
                variable: "Oil_change".into(),
                lag_days: 1,
                correlation: -0.2,
            },
        ];
        let pivot = LagCorrelationPivot::from_records(&records).unwrap();
        assert_eq!(pivot.variables(), &["Gold_change", "Oil_change"]);
        assert_eq!(pivot.lags(), &[1, 2]);
        assert_eq!(pivot.get("Gold_change", 1), Some(0.1));
        assert_eq!(pivot.get("Oil_change", 2), None);

        let mut bad = records;
        bad.push(LagCorrelation {
            variable: "Gold_change".into(),
            lag_days: 1,
            correlation: 0.9,
        });
        match LagCorrelationPivot::from_records(&bad) {
            Err(PipelineError::DuplicatePivotEntry { variable, lag_days }) => {
                assert_eq!(variable, "Gold_change");
                assert_eq!(lag_days, 1);
            }
            other => panic!("expected duplicate pivot error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_scaler_zero_mean_unit_variance() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let mut rows = vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0]];
        let scaler = Scaler::fit(&columns, &rows);
        scaler.transform(&mut rows);

        let mean_a: f64 = rows.iter().map(|r| r[0]).sum::<f64>() / 3.0;
        assert!(mean_a.abs() < 1e-12);
        let var_a: f64 = rows.iter().map(|r| r[0] * r[0]).sum::<f64>() / 3.0;
        assert!((var_a - 1.0).abs() < 1e-12);

        // Constant column scales by 1.0 and just centers.
        for row in &rows {
            assert!(row[1].abs() < 1e-12);
        }
    }

    #[test]
    fn test_label_series_lookup() {
        let dates: Vec<NaiveDate> = (1..=3)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let labels = LabelSeries::new(dates.clone(), vec![1, 0, 1]).unwrap();
        assert_eq!(labels.value_on(dates[1]), Some(0));
        assert_eq!(
            labels.value_on(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
            None
        );
        assert!((labels.positive_ratio() - 2.0 / 3.0).abs() < 1e-12);
    }
}
