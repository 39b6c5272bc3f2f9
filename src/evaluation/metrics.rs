use crate::schema::Label;

/// 二値分類のメトリクス。陽性クラスは `Fake`。
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BinaryMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    pub support: usize,
}

impl BinaryMetrics {
    /// 各値を小数第4位で丸めたコピー。
    #[must_use]
    pub fn rounded(self) -> Self {
        Self {
            precision: round4(self.precision),
            recall: round4(self.recall),
            f1: round4(self.f1),
            accuracy: round4(self.accuracy),
            support: self.support,
        }
    }
}

/// 正解ラベルと予測ラベルの混同行列を積み上げる。
#[derive(Debug, Default, Clone)]
pub struct MetricsCalculator {
    true_positive: usize,
    false_positive: usize,
    false_negative: usize,
    true_negative: usize,
}

impl MetricsCalculator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expected: Label, predicted: Label) {
        match (expected.is_fake(), predicted.is_fake()) {
            (true, true) => self.true_positive += 1,
            (false, true) => self.false_positive += 1,
            (true, false) => self.false_negative += 1,
            (false, false) => self.true_negative += 1,
        }
    }

    /// 2つのラベル列からまとめて集計する。長さが違う場合は短い方に合わせる。
    #[must_use]
    pub fn from_pairs(expected: &[Label], predicted: &[Label]) -> Self {
        let mut calculator = Self::new();
        for (&truth, &guess) in expected.iter().zip(predicted) {
            calculator.push(truth, guess);
        }
        calculator
    }

    /// 分母が 0 になる値は 0 とする。
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finalize(&self) -> BinaryMetrics {
        let tp = self.true_positive as f64;
        let fp = self.false_positive as f64;
        let fn_ = self.false_negative as f64;
        let total = self.true_positive + self.false_positive + self.false_negative + self.true_negative;

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let accuracy = if total > 0 {
            (self.true_positive + self.true_negative) as f64 / total as f64
        } else {
            0.0
        };

        BinaryMetrics {
            precision,
            recall,
            f1,
            accuracy,
            support: total,
        }
    }
}

/// 小数第4位への丸め（0.123456 -> 0.1235）。
///
/// 2進値そのものを10進に展開して丸める（ちょうど中間なら偶数側）。
/// `value * 1e4` を経由すると 1/32 が 0.0313 になってしまう。
#[must_use]
pub fn round4(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{value:.4}").parse().unwrap_or(value)
}
