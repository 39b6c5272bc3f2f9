//! ロジスティック損失の勾配ブースティング分類器。
use std::borrow::Cow;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use super::params::BoosterParams;
use super::tree::{RegressionTree, TreeBuilder};
use crate::error::{DetectorError, Result};
use crate::schema::Label;

const HESSIAN_FLOOR: f64 = 1e-16;
const LOGLOSS_EPS: f64 = 1e-15;

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

fn logit(probability: f64) -> f64 {
    (probability / (1.0 - probability)).ln()
}

fn as_csr(x: &CsMat<f64>) -> Cow<'_, CsMat<f64>> {
    if x.is_csr() {
        Cow::Borrowed(x)
    } else {
        Cow::Owned(x.to_csr())
    }
}

/// `fit` 1回分の結果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    pub rounds_added: usize,
    pub total_trees: usize,
    pub train_logloss: f64,
}

/// 木のアンサンブル。再学習では既存の木を残したまま木を追加する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    params: BoosterParams,
    n_features: usize,
    base_margin: f64,
    trees: Vec<RegressionTree>,
}

impl Booster {
    /// 木を持たない未学習モデル。
    #[must_use]
    pub fn new(params: BoosterParams, n_features: usize) -> Self {
        Self {
            base_margin: logit(params.base_score),
            params,
            n_features,
            trees: Vec::new(),
        }
    }

    /// 常に `probability` を返す定数モデル。確率は (0, 1) に収める。
    #[must_use]
    pub fn constant(n_features: usize, probability: f64) -> Self {
        let clamped = probability.clamp(LOGLOSS_EPS, 1.0 - LOGLOSS_EPS);
        Self {
            params: BoosterParams::default(),
            n_features,
            base_margin: logit(clamped),
            trees: Vec::new(),
        }
    }

    #[must_use]
    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    /// 次回以降の `fit` で使うパラメータを差し替える。既存の木はそのまま。
    pub fn set_params(&mut self, params: BoosterParams) {
        self.params = params;
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[must_use]
    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// 読み込んだモデルの整合性を検証する。
    ///
    /// # Errors
    /// パラメータや木構造が不正な場合。
    pub fn validate(&self) -> Result<(), String> {
        self.params.validate()?;
        if !self.base_margin.is_finite() {
            return Err("base_margin must be finite".to_string());
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|reason| format!("tree {index}: {reason}"))?;
        }
        Ok(())
    }

    fn ensure_columns(&self, x: &CsMat<f64>) -> Result<()> {
        if x.cols() == self.n_features {
            Ok(())
        } else {
            Err(DetectorError::DimensionMismatch {
                expected: self.n_features,
                actual: x.cols(),
            })
        }
    }

    fn margins(&self, x: &CsMat<f64>) -> Vec<f64> {
        (0..x.rows())
            .into_par_iter()
            .map(|row| {
                x.outer_view(row).map_or(self.base_margin, |view| {
                    self.base_margin + self.trees.iter().map(|tree| tree.predict_row(&view)).sum::<f64>()
                })
            })
            .collect()
    }

    /// 生のマージン（対数オッズ）。
    ///
    /// # Errors
    /// 列数がモデルの入力次元と異なる場合は [`DetectorError::DimensionMismatch`]。
    pub fn predict_margin(&self, x: &CsMat<f64>) -> Result<Vec<f64>> {
        self.ensure_columns(x)?;
        Ok(self.margins(&as_csr(x)))
    }

    /// Fake である確率。
    ///
    /// # Errors
    /// 列数がモデルの入力次元と異なる場合。
    pub fn predict_proba(&self, x: &CsMat<f64>) -> Result<Vec<f64>> {
        Ok(self
            .predict_margin(x)?
            .into_iter()
            .map(sigmoid)
            .collect())
    }

    /// `predict_proba` に閾値を適用したラベル。
    ///
    /// # Errors
    /// 列数がモデルの入力次元と異なる場合。
    pub fn predict(&self, x: &CsMat<f64>) -> Result<Vec<Label>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(Label::from_probability)
            .collect())
    }

    /// 現在のアンサンブルのマージンから続けて `n_estimators` 本の木を追加する。
    ///
    /// # Errors
    /// 列数の不一致、行数とラベル数の不一致、空の入力、不正なパラメータの場合。
    pub fn fit(&mut self, x: &CsMat<f64>, labels: &[Label]) -> Result<FitSummary> {
        self.ensure_columns(x)?;
        if x.rows() != labels.len() {
            return Err(DetectorError::validation(format!(
                "feature matrix has {} rows but {} labels were given",
                x.rows(),
                labels.len()
            )));
        }
        if labels.is_empty() {
            return Err(DetectorError::validation("cannot fit on an empty batch"));
        }
        self.params
            .validate()
            .map_err(|reason| DetectorError::validation(format!("invalid booster params: {reason}")))?;

        let x = as_csr(x);
        let targets: Vec<f64> = labels.iter().map(|label| label.as_target()).collect();
        let mut margins = self.margins(&x);
        let params = self.params;
        let n_rows = x.rows();
        // 継続学習でも同じ乱数列を繰り返さないよう、既存の木の数を混ぜる
        let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(self.trees.len() as u64));

        let mut grad = vec![0.0; n_rows];
        let mut hess = vec![0.0; n_rows];
        for round in 0..params.n_estimators {
            grad.par_iter_mut()
                .zip(hess.par_iter_mut())
                .zip(margins.par_iter().zip(targets.par_iter()))
                .for_each(|((g, h), (&margin, &target))| {
                    let p = sigmoid(margin);
                    *g = p - target;
                    *h = (p * (1.0 - p)).max(HESSIAN_FLOOR);
                });

            let rows = sample_rows(&mut rng, n_rows, params.subsample);
            let mask = sample_features(&mut rng, self.n_features, params.colsample_bytree);
            let tree =
                TreeBuilder::new(&x, &grad, &hess, mask.as_deref(), &params).build(rows);

            margins
                .par_iter_mut()
                .enumerate()
                .for_each(|(row, margin)| {
                    if let Some(view) = x.outer_view(row) {
                        *margin += tree.predict_row(&view);
                    }
                });
            self.trees.push(tree);

            if (round + 1) % 50 == 0 {
                tracing::debug!(
                    round = round + 1,
                    logloss = logloss(&margins, &targets),
                    "boosting progress"
                );
            }
        }

        let summary = FitSummary {
            rounds_added: params.n_estimators,
            total_trees: self.trees.len(),
            train_logloss: logloss(&margins, &targets),
        };
        tracing::info!(
            rounds_added = summary.rounds_added,
            total_trees = summary.total_trees,
            train_logloss = summary.train_logloss,
            rows = n_rows,
            "booster fit completed"
        );
        Ok(summary)
    }
}

fn sample_rows(rng: &mut StdRng, n_rows: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n_rows).collect();
    }
    let mut rows: Vec<usize> = (0..n_rows).filter(|_| rng.random::<f64>() < ratio).collect();
    if rows.is_empty() && n_rows > 0 {
        rows.push(rng.random_range(0..n_rows));
    }
    rows
}

fn sample_features(rng: &mut StdRng, n_features: usize, ratio: f64) -> Option<Vec<bool>> {
    if ratio >= 1.0 || n_features == 0 {
        return None;
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let amount = ((n_features as f64 * ratio).ceil() as usize).clamp(1, n_features);
    let mut mask = vec![false; n_features];
    for feature in sample(rng, n_features, amount) {
        mask[feature] = true;
    }
    Some(mask)
}

#[allow(clippy::cast_precision_loss)]
fn logloss(margins: &[f64], targets: &[f64]) -> f64 {
    if margins.is_empty() {
        return 0.0;
    }
    let total: f64 = margins
        .iter()
        .zip(targets)
        .map(|(&margin, &target)| {
            let p = sigmoid(margin).clamp(LOGLOSS_EPS, 1.0 - LOGLOSS_EPS);
            -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
        })
        .sum();
    total / margins.len() as f64
}
