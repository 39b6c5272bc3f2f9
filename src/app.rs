use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::{api, config::Config, observability::Telemetry, service::DetectorService};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

/// HTTP ハンドラが共有するコンポーネント。
pub struct ComponentRegistry {
    telemetry: Telemetry,
    service: Arc<DetectorService>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn service(&self) -> Arc<DetectorService> {
        Arc::clone(&self.registry.service)
    }
}

impl ComponentRegistry {
    /// 成果物を読み込み、サービスとテレメトリを初期化する。
    ///
    /// # Errors
    /// 成果物の読み込みに失敗した場合、または組み合わせが不整合な場合。
    pub fn build(config: &Config) -> Result<Self> {
        let normalizer = config
            .normalizer()
            .context("failed to build text normalizer")?;
        let paths = config.artifact_paths();
        let service = DetectorService::load(&paths, normalizer, config.retrain_min_examples())
            .with_context(|| {
                format!(
                    "failed to load artifacts ({} + {})",
                    paths.text_pipeline.display(),
                    paths.classifier.display()
                )
            })?;
        let telemetry = Telemetry::new().context("failed to register metrics")?;
        Ok(Self::from_parts(Arc::new(service), telemetry))
    }

    #[must_use]
    pub fn from_parts(service: Arc<DetectorService>, telemetry: Telemetry) -> Self {
        #[allow(clippy::cast_precision_loss)]
        telemetry
            .metrics()
            .ensemble_trees
            .set(service.snapshot().trees as f64);
        Self { telemetry, service }
    }

    #[must_use]
    pub fn service(&self) -> &Arc<DetectorService> {
        &self.service
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state).layer(TraceLayer::new_for_http())
}
