//! 回帰木とその構築（欠損方向を学習する疎行列向けの厳密分割探索）。
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, CsVecView};

use super::params::BoosterParams;

/// これ以下の損失減少は分割とみなさない。
const MIN_SPLIT_GAIN: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    /// `value < threshold` なら左。行に値がなければ `default_left` に従う。
    Split {
        feature: usize,
        threshold: f64,
        default_left: bool,
        left: usize,
        right: usize,
    },
}

/// 根は常に `nodes[0]`。子のインデックスは親より大きい。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

pub(crate) fn lookup(row: &CsVecView<'_, f64>, feature: usize) -> Option<f64> {
    row.indices()
        .binary_search(&feature)
        .ok()
        .map(|position| row.data()[position])
}

impl RegressionTree {
    #[must_use]
    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    /// 1行分のマージン寄与を返す。
    #[must_use]
    pub fn predict_row(&self, row: &CsVecView<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            let Some(node) = self.nodes.get(index) else {
                return 0.0;
            };
            match *node {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                } => {
                    let go_left = match lookup(row, feature) {
                        Some(value) => value < threshold,
                        None => default_left,
                    };
                    index = if go_left { left } else { right };
                }
            }
        }
    }

    /// 読み込んだ木の構造を検証する。
    ///
    /// # Errors
    /// 子の参照が不正、特徴量番号が範囲外、または値が有限でない場合。
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len();
        for (index, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {index} has a non-finite value"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if feature >= n_features {
                        return Err(format!(
                            "node {index} splits on feature {feature} but the model has {n_features}"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {index} has a non-finite threshold"));
                    }
                    for child in [left, right] {
                        if child <= index || child >= len {
                            return Err(format!("node {index} has invalid child {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    default_left: bool,
    gain: f64,
}

impl SplitCandidate {
    /// 損失減少が大きい方、同点なら特徴量番号が小さい方。
    fn better(self, other: Self) -> Self {
        if other.gain > self.gain || (other.gain == self.gain && other.feature < self.feature) {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Stats {
    grad: f64,
    hess: f64,
}

/// 1本の木を勾配・ヘッセ行列から貪欲に構築する。
pub(crate) struct TreeBuilder<'a> {
    x: &'a CsMat<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    feature_mask: Option<&'a [bool]>,
    params: &'a BoosterParams,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(
        x: &'a CsMat<f64>,
        grad: &'a [f64],
        hess: &'a [f64],
        feature_mask: Option<&'a [bool]>,
        params: &'a BoosterParams,
    ) -> Self {
        Self {
            x,
            grad,
            hess,
            feature_mask,
            params,
            nodes: Vec::new(),
        }
    }

    pub(crate) fn build(mut self, rows: Vec<usize>) -> RegressionTree {
        self.grow(rows, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn leaf_value(&self, totals: Stats) -> f64 {
        -totals.grad / (totals.hess + self.params.reg_lambda) * self.params.learning_rate
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let totals = rows.iter().fold(
            Stats {
                grad: 0.0,
                hess: 0.0,
            },
            |acc, &row| Stats {
                grad: acc.grad + self.grad[row],
                hess: acc.hess + self.hess[row],
            },
        );
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(totals),
        });

        if depth >= self.params.max_depth
            || rows.len() < 2
            || totals.hess < 2.0 * self.params.min_child_weight
        {
            return index;
        }
        let Some(split) = self.find_split(&rows, totals) else {
            return index;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&row| {
                match self.x.outer_view(row).and_then(|view| lookup(&view, split.feature)) {
                    Some(value) => value < split.threshold,
                    None => split.default_left,
                }
            });
        if left_rows.is_empty() || right_rows.is_empty() {
            return index;
        }

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            default_left: split.default_left,
            left,
            right,
        };
        index
    }

    fn feature_allowed(&self, feature: usize) -> bool {
        self.feature_mask
            .is_none_or(|mask| mask.get(feature).copied().unwrap_or(false))
    }

    fn find_split(&self, rows: &[usize], totals: Stats) -> Option<SplitCandidate> {
        // (feature, value, row)
        let mut entries: Vec<(usize, f64, usize)> = Vec::new();
        for &row in rows {
            if let Some(view) = self.x.outer_view(row) {
                for (feature, &value) in view.iter() {
                    if self.feature_allowed(feature) {
                        entries.push((feature, value, row));
                    }
                }
            }
        }
        if entries.is_empty() {
            return None;
        }
        entries.par_sort_unstable_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.total_cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let groups: Vec<&[(usize, f64, usize)]> = entries.chunk_by(|a, b| a.0 == b.0).collect();
        groups
            .par_iter()
            .filter_map(|group| self.best_split_for_feature(group, rows.len(), totals))
            .reduce_with(SplitCandidate::better)
    }

    fn gain(&self, left: Stats, right: Stats, totals: Stats) -> Option<f64> {
        let min_weight = self.params.min_child_weight;
        if left.hess < min_weight || right.hess < min_weight {
            return None;
        }
        let lambda = self.params.reg_lambda;
        let score = |stats: Stats| stats.grad * stats.grad / (stats.hess + lambda);
        let gain = 0.5 * (score(left) + score(right) - score(totals)) - self.params.gamma;
        (gain > MIN_SPLIT_GAIN).then_some(gain)
    }

    /// 値の昇順に走査し、欠損を右に送る場合と左に送る場合の両方を評価する。
    fn best_split_for_feature(
        &self,
        group: &[(usize, f64, usize)],
        node_rows: usize,
        totals: Stats,
    ) -> Option<SplitCandidate> {
        let feature = group.first()?.0;
        let present = group.iter().fold(
            Stats {
                grad: 0.0,
                hess: 0.0,
            },
            |acc, &(_, _, row)| Stats {
                grad: acc.grad + self.grad[row],
                hess: acc.hess + self.hess[row],
            },
        );
        let missing = Stats {
            grad: totals.grad - present.grad,
            hess: totals.hess - present.hess,
        };
        let has_missing = group.len() < node_rows;

        let mut best: Option<SplitCandidate> = None;
        let mut offer = |threshold: f64, default_left: bool, gain: Option<f64>| {
            if let Some(gain) = gain {
                let candidate = SplitCandidate {
                    feature,
                    threshold,
                    default_left,
                    gain,
                };
                best = Some(match best {
                    Some(current) if current.gain >= gain => current,
                    _ => candidate,
                });
            }
        };

        if has_missing {
            // 欠損だけを左に送る分割
            offer(group[0].1, true, self.gain(missing, present, totals));
        }

        let mut left = Stats {
            grad: 0.0,
            hess: 0.0,
        };
        for window in group.windows(2) {
            let (_, value, row) = window[0];
            let next_value = window[1].1;
            left.grad += self.grad[row];
            left.hess += self.hess[row];
            if value >= next_value {
                continue;
            }
            let mut threshold = value + (next_value - value) / 2.0;
            if threshold <= value {
                threshold = next_value;
            }

            let right_with_missing = Stats {
                grad: totals.grad - left.grad,
                hess: totals.hess - left.hess,
            };
            offer(threshold, false, self.gain(left, right_with_missing, totals));

            if has_missing {
                let left_with_missing = Stats {
                    grad: left.grad + missing.grad,
                    hess: left.hess + missing.hess,
                };
                let right_present = Stats {
                    grad: present.grad - left.grad,
                    hess: present.hess - left.hess,
                };
                offer(threshold, true, self.gain(left_with_missing, right_present, totals));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[(usize, f64)]], cols: usize) -> CsMat<f64> {
        let mut indptr = vec![0];
        let mut indices = Vec::new();
        let mut data = Vec::new();
        for row in rows {
            for &(col, value) in *row {
                indices.push(col);
                data.push(value);
            }
            indptr.push(indices.len());
        }
        CsMat::new((rows.len(), cols), indptr, indices, data)
    }

    fn gradients(labels: &[f64]) -> (Vec<f64>, Vec<f64>) {
        // p = 0.5 for every row
        let grad = labels.iter().map(|y| 0.5 - y).collect();
        let hess = vec![0.25; labels.len()];
        (grad, hess)
    }

    fn loose_params() -> BoosterParams {
        BoosterParams {
            min_child_weight: 0.0,
            ..BoosterParams::default()
        }
    }

    #[test]
    fn separable_feature_produces_root_split() {
        let x = matrix(
            &[&[(0, 1.0)], &[(0, 2.0)], &[(0, 10.0)], &[(0, 11.0)]],
            2,
        );
        let (grad, hess) = gradients(&[0.0, 0.0, 1.0, 1.0]);
        let params = loose_params();
        let tree = TreeBuilder::new(&x, &grad, &hess, None, &params).build((0..4).collect());

        match tree.nodes()[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(feature, 0);
                assert!((threshold - 6.0).abs() < 1e-12);
            }
            Node::Leaf { .. } => panic!("root should split"),
        }
        let low = x.outer_view(0).expect("row");
        let high = x.outer_view(3).expect("row");
        assert!(tree.predict_row(&low) < 0.0);
        assert!(tree.predict_row(&high) > 0.0);
        assert!(tree.validate(2).is_ok());
    }

    #[test]
    fn missing_values_learn_a_default_direction() {
        // positives carry feature 1, negatives have nothing stored
        let x = matrix(&[&[], &[], &[(1, 0.3)], &[(1, 0.7)]], 2);
        let (grad, hess) = gradients(&[0.0, 0.0, 1.0, 1.0]);
        let params = loose_params();
        let tree = TreeBuilder::new(&x, &grad, &hess, None, &params).build((0..4).collect());

        let Node::Split {
            feature,
            default_left,
            ..
        } = tree.nodes()[0]
        else {
            panic!("root should split");
        };
        assert_eq!(feature, 1);
        assert!(default_left);
        let empty = x.outer_view(0).expect("row");
        assert!(tree.predict_row(&empty) < 0.0);
    }

    #[test]
    fn min_child_weight_blocks_small_children() {
        let x = matrix(&[&[(0, 1.0)], &[(0, 2.0)]], 1);
        let (grad, hess) = gradients(&[0.0, 1.0]);
        let params = BoosterParams::default();
        let tree = TreeBuilder::new(&x, &grad, &hess, None, &params).build(vec![0, 1]);
        assert_eq!(tree.nodes().len(), 1);
        // symmetric gradients -> zero leaf
        let row = x.outer_view(0).expect("row");
        assert!(tree.predict_row(&row).abs() < 1e-12);
    }

    #[test]
    fn feature_mask_excludes_columns() {
        let x = matrix(
            &[&[(0, 1.0)], &[(0, 2.0)], &[(0, 10.0)], &[(0, 11.0)]],
            1,
        );
        let (grad, hess) = gradients(&[0.0, 0.0, 1.0, 1.0]);
        let params = loose_params();
        let mask = [false];
        let tree =
            TreeBuilder::new(&x, &grad, &hess, Some(&mask), &params).build((0..4).collect());
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn validate_rejects_out_of_range_feature_and_bad_children() {
        let tree = RegressionTree {
            nodes: vec![
                Node::Split {
                    feature: 5,
                    threshold: 0.5,
                    default_left: false,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { value: 0.1 },
                Node::Leaf { value: -0.1 },
            ],
        };
        assert!(tree.validate(6).is_ok());
        assert!(tree.validate(5).unwrap_err().contains("feature 5"));

        let cyclic = RegressionTree {
            nodes: vec![Node::Split {
                feature: 0,
                threshold: 0.5,
                default_left: false,
                left: 0,
                right: 0,
            }],
        };
        assert!(cyclic.validate(1).is_err());
    }
}
