use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{DetectorError, Result};

/// 学習用と評価用の行番号。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// シード付きでシャッフルし、先頭 `ceil(n * test_ratio)` 行を評価用にする。
///
/// # Errors
/// 比率が (0, 1) の外、またはどちらかの側が空になる場合。
pub fn train_test_split(n_rows: usize, test_ratio: f64, seed: u64) -> Result<Split> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(DetectorError::validation(format!(
            "test ratio must be in (0, 1), got {test_ratio}"
        )));
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let n_test = (n_rows as f64 * test_ratio).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return Err(DetectorError::validation(format!(
            "cannot split {n_rows} rows with test ratio {test_ratio}"
        )));
    }

    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let train = order.split_off(n_test);
    Ok(Split { train, test: order })
}
