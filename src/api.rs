pub(crate) mod error;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod predict;
pub(crate) mod retrain;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::app::AppState;

pub(crate) const ROOT_MESSAGE: &str = "API de Detección de Noticias Falsas activa";

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/predict", post(predict::predict))
        .route("/predict/", post(predict::predict))
        .route("/retrain", post(retrain::retrain))
        .route("/retrain/", post(retrain::retrain))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "mensaje": ROOT_MESSAGE }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::ROOT_MESSAGE;
    use crate::app::{ComponentRegistry, build_router};
    use crate::classification::{SpanishNormalizer, TextFeaturizer};
    use crate::classifier::Booster;
    use crate::observability::Telemetry;
    use crate::schema::NewsItem;
    use crate::service::DetectorService;

    fn registry(dir: &std::path::Path) -> ComponentRegistry {
        let normalizer = SpanishNormalizer::with_embedded_table().expect("embedded table");
        let mut featurizer = TextFeaturizer::new(normalizer, 100);
        featurizer
            .fit(&[
                NewsItem::new("Gobierno anuncia medidas", "Plan económico", ""),
                NewsItem::new("Ciudad secreta en la Luna", "Fuentes anónimas", ""),
            ])
            .expect("fit");
        let model = Booster::constant(featurizer.dimension().expect("fitted"), 0.3);
        let service = DetectorService::new(featurizer, model, dir.join("classifier.json"), 10)
            .expect("service");
        ComponentRegistry::from_parts(Arc::new(service), Telemetry::new().expect("telemetry"))
    }

    #[tokio::test]
    async fn root_returns_banner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = build_router(registry(dir.path()))
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["mensaje"], ROOT_MESSAGE);
    }

    #[tokio::test]
    async fn malformed_predict_body_is_rejected_by_extractor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = build_router(registry(dir.path()))
            .oneshot(
                Request::post("/predict")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"Titulo": "sin lista"}"#))
                    .expect("request"),
            )
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = build_router(registry(dir.path()))
            .oneshot(Request::get("/nope").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
