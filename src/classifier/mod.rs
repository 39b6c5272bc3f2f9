//! 特徴量行列から Fake / Real を判定する分類器。
mod booster;
mod params;
mod tree;

pub use booster::{Booster, FitSummary};
pub use params::BoosterParams;
pub use tree::{Node, RegressionTree};

/// この確率以上を Fake とする。
pub const FAKE_THRESHOLD: f64 = 0.5;
