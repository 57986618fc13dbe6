use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// L2 regularizer on leaf weights, keeps divisions defined.
const LAMBDA: f64 = 1e-6;
/// Splits below this gain are noise, not structure.
const MIN_GAIN: f64 = 1e-12;

/// One node in a flattened tree. `feature` is -1 for leaves; internal nodes
/// route `row[feature] <= threshold` left, otherwise right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature: i32,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    pub value: f64,
}

/// Depth-limited regression tree fit to per-sample gradients with Newton
/// leaf values. Stored as a flat node vector, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Greedy top-down fit. Split gains are accumulated into `importances`
    /// by feature index; callers normalize once boosting finishes.
    pub fn fit(
        rows: &[Vec<f64>],
        gradients: &[f64],
        hessians: &[f64],
        max_depth: usize,
        importances: &mut [f64],
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        if rows.is_empty() {
            tree.nodes.push(TreeNode {
                feature: -1,
                threshold: 0.0,
                left: 0,
                right: 0,
                value: 0.0,
            });
            return tree;
        }
        let indices: Vec<usize> = (0..rows.len()).collect();
        tree.build(rows, gradients, hessians, indices, 0, max_depth, importances);
        tree
    }

    fn build(
        &mut self,
        rows: &[Vec<f64>],
        gradients: &[f64],
        hessians: &[f64],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        importances: &mut [f64],
    ) -> usize {
        let g: f64 = indices.iter().map(|&i| gradients[i]).sum();
        let h: f64 = indices.iter().map(|&i| hessians[i]).sum();
        let leaf_value = g / (h + LAMBDA);

        let split = if depth < max_depth && indices.len() >= 2 {
            best_split(rows, gradients, hessians, &indices)
        } else {
            None
        };

        match split {
            None => {
                let idx = self.nodes.len();
                self.nodes.push(TreeNode {
                    feature: -1,
                    threshold: 0.0,
                    left: 0,
                    right: 0,
                    value: leaf_value,
                });
                idx
            }
            Some((feature, threshold, gain)) => {
                importances[feature] += gain;

                let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                    .into_iter()
                    .partition(|&i| rows[i][feature] <= threshold);

                let idx = self.nodes.len();
                self.nodes.push(TreeNode {
                    feature: feature as i32,
                    threshold,
                    left: 0,
                    right: 0,
                    value: 0.0,
                });
                let left = self.build(
                    rows,
                    gradients,
                    hessians,
                    left_indices,
                    depth + 1,
                    max_depth,
                    importances,
                );
                let right = self.build(
                    rows,
                    gradients,
                    hessians,
                    right_indices,
                    depth + 1,
                    max_depth,
                    importances,
                );
                self.nodes[idx].left = left;
                self.nodes[idx].right = right;
                idx
            }
        }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            let node = match self.nodes.get(idx) {
                Some(node) => node,
                None => return 0.0,
            };
            if node.feature < 0 {
                return node.value;
            }
            let value = row.get(node.feature as usize).copied().unwrap_or(0.0);
            idx = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Scan each feature in order for the split maximizing the Newton gain.
/// Strictly greater gain wins, so ties keep the lowest feature index and
/// the result is deterministic.
fn best_split(
    rows: &[Vec<f64>],
    gradients: &[f64],
    hessians: &[f64],
    indices: &[usize],
) -> Option<(usize, f64, f64)> {
    let total_g: f64 = indices.iter().map(|&i| gradients[i]).sum();
    let total_h: f64 = indices.iter().map(|&i| hessians[i]).sum();
    let parent_score = total_g * total_g / (total_h + LAMBDA);

    let width = rows[indices[0]].len();
    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..width {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| {
            rows[a][feature]
                .partial_cmp(&rows[b][feature])
                .unwrap_or(Ordering::Equal)
        });

        let mut g_left = 0.0;
        let mut h_left = 0.0;
        for pair in 0..order.len() - 1 {
            g_left += gradients[order[pair]];
            h_left += hessians[order[pair]];

            let here = rows[order[pair]][feature];
            let next = rows[order[pair + 1]][feature];
            // No decision boundary between equal values.
            if next <= here {
                continue;
            }

            let g_right = total_g - g_left;
            let h_right = total_h - h_left;
            let gain = g_left * g_left / (h_left + LAMBDA)
                + g_right * g_right / (h_right + LAMBDA)
                - parent_score;

            let beats_best = match best {
                Some((_, _, best_gain)) => gain > best_gain,
                None => gain > MIN_GAIN,
            };
            if beats_best {
                best = Some((feature, (here + next) / 2.0, gain));
            }
        }
    }

    best
}
