/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, HistogramOpts, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub predict_requests: Counter,
    pub predict_items: Counter,
    pub predict_failures: Counter,
    pub fake_verdicts: Counter,
    pub retrain_successes: Counter,
    pub retrain_failures: Counter,
    pub retrain_not_durable: Counter,

    // ヒストグラム
    pub predict_duration: Histogram,
    pub retrain_duration: Histogram,

    // ゲージ
    pub ensemble_trees: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名のメトリクスがすでに登録されている場合。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            predict_requests: register_counter_with_registry!(
                "veraz_predict_requests_total",
                "Total number of prediction batches received",
                registry
            )?,
            predict_items: register_counter_with_registry!(
                "veraz_predict_items_total",
                "Total number of news items classified",
                registry
            )?,
            predict_failures: register_counter_with_registry!(
                "veraz_predict_failures_total",
                "Total number of prediction batches that failed",
                registry
            )?,
            fake_verdicts: register_counter_with_registry!(
                "veraz_fake_verdicts_total",
                "Total number of items classified as Fake",
                registry
            )?,
            retrain_successes: register_counter_with_registry!(
                "veraz_retrain_success_total",
                "Total number of retrains that were applied and persisted",
                registry
            )?,
            retrain_failures: register_counter_with_registry!(
                "veraz_retrain_failures_total",
                "Total number of rejected or failed retrain requests",
                registry
            )?,
            retrain_not_durable: register_counter_with_registry!(
                "veraz_retrain_not_durable_total",
                "Total number of retrains applied in memory but not persisted",
                registry
            )?,
            predict_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "veraz_predict_duration_seconds",
                    "Time spent featurizing and scoring a prediction batch"
                )
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
                registry
            )?,
            retrain_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "veraz_retrain_duration_seconds",
                    "Time spent retraining and persisting the classifier"
                )
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
                registry
            )?,
            ensemble_trees: register_gauge_with_registry!(
                "veraz_ensemble_trees",
                "Number of trees in the active classifier",
                registry
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_once_per_registry() {
        let registry = Arc::new(Registry::new());
        let metrics = Metrics::new(Arc::clone(&registry)).expect("first registration");
        metrics.predict_requests.inc();
        assert!(Metrics::new(registry).is_err());
    }
}
