use serde::{Deserialize, Serialize};

/// 勾配ブースティングのハイパーパラメータ。既定値は本番モデルと同じ構成。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    /// 1回の `fit` で追加する木の本数
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// 木ごとの行サンプリング率
    pub subsample: f64,
    /// 木ごとの列サンプリング率
    pub colsample_bytree: f64,
    pub reg_lambda: f64,
    pub min_child_weight: f64,
    /// 分割に必要な最小損失減少量
    pub gamma: f64,
    /// 木がない状態での陽性確率
    pub base_score: f64,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 10,
            learning_rate: 0.1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            gamma: 0.0,
            base_score: 0.5,
            seed: 42,
        }
    }
}

impl BoosterParams {
    /// 値の範囲を検証する。
    ///
    /// # Errors
    /// 範囲外の値があればその説明を返す。
    pub fn validate(&self) -> Result<(), String> {
        if self.n_estimators == 0 {
            return Err("n_estimators must be positive".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            ));
        }
        for (name, value) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if !(self.base_score > 0.0 && self.base_score < 1.0) {
            return Err(format!(
                "base_score must be in (0, 1), got {}",
                self.base_score
            ));
        }
        for (name, value) in [
            ("reg_lambda", self.reg_lambda),
            ("min_child_weight", self.min_child_weight),
            ("gamma", self.gamma),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(format!("{name} must be a non-negative number, got {value}"));
            }
        }
        Ok(())
    }
}
