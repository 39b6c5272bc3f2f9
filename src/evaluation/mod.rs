//! 分類結果の評価。
mod metrics;

pub use metrics::{round4, BinaryMetrics, MetricsCalculator};
