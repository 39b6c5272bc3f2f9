mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use veraz::DetectorService;
use veraz::app::{ComponentRegistry, build_router};
use veraz::observability::Telemetry;

fn server(service: DetectorService) -> TestServer {
    let telemetry = Telemetry::new().expect("metrics registry");
    let registry = ComponentRegistry::from_parts(Arc::new(service), telemetry);
    TestServer::new(build_router(registry)).expect("test server")
}

#[tokio::test]
async fn root_reports_the_api_is_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = server(common::constant_service(&dir.path().join("model.json"), 0.1));

    let response = server.get("/").await;

    response.assert_status_ok();
    response.assert_json(&json!({ "mensaje": "API de Detección de Noticias Falsas activa" }));
}

#[tokio::test]
async fn predict_returns_one_record_per_item() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = server(common::constant_service(&dir.path().join("model.json"), 0.9));

    let response = server
        .post("/predict")
        .json(&json!([
            { "Titulo": "Titular", "Descripcion": "Texto del artículo", "Fecha": "01/01/2024" },
            { "Titulo": "", "Descripcion": "", "Fecha": "" }
        ]))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let predictions = body["predictions"].as_array().expect("predictions array");
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0]["Titulo"], "Titular");
    assert_eq!(predictions[0]["Fecha"], "01/01/2024");
    assert_eq!(predictions[0]["Prediccion"], "Fake");
    assert_eq!(predictions[0]["Probabilidad"], 0.9);
}

#[tokio::test]
async fn predict_accepts_trailing_slash() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = server(common::constant_service(&dir.path().join("model.json"), 0.1));

    let response = server
        .post("/predict/")
        .json(&json!([{ "Titulo": "a", "Descripcion": "b", "Fecha": "c" }]))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["predictions"][0]["Prediccion"], "Real");
}

#[tokio::test]
async fn empty_predict_is_a_bad_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = server(common::constant_service(&dir.path().join("model.json"), 0.1));

    let response = server.post("/predict").json(&json!([])).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({ "detail": "No se proporcionaron datos para la predicción" }));
}

#[tokio::test]
async fn small_retrain_batch_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = server(common::constant_service(&dir.path().join("model.json"), 0.1));
    let mut request = common::separable_batch();
    request.data.truncate(9);
    request.labels.truncate(9);

    let response = server.post("/retrain").json(&request).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({ "detail": "Se requieren al menos 10 ejemplos para reentrenar" }));
}

#[tokio::test]
async fn retrain_reports_training_metrics() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = server(common::constant_service(&dir.path().join("model.json"), 0.1));

    let response = server
        .post("/retrain/")
        .json(&common::separable_batch())
        .await;

    response.assert_status_ok();
    response.assert_json(&json!({
        "message": "Modelo reentrenado exitosamente",
        "precision": 1.0,
        "recall": 1.0,
        "f1_score": 1.0,
    }));

    let ready: Value = server.get("/health/ready").await.json();
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["model"]["status"], "persisted");
    assert_eq!(ready["model"]["retrain_count"], 1);
    assert_eq!(ready["model"]["trees"], 300);
}

#[tokio::test]
async fn unpersisted_retrain_is_reported_with_metrics() {
    let dir = tempfile::tempdir().expect("tempdir");
    let classifier_path = dir.path().join("model.json");
    let service = common::constant_service(&classifier_path, 0.1);
    // 保存先をディレクトリにして書き込みを失敗させる
    std::fs::remove_file(&classifier_path).expect("remove artifact");
    std::fs::create_dir(&classifier_path).expect("block path");
    let server = server(service);

    let response = server
        .post("/retrain")
        .json(&common::separable_batch())
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["durable"], false);
    assert_eq!(body["precision"], 1.0);
    assert!(
        body["detail"]
            .as_str()
            .expect("detail")
            .starts_with("Error en el reentrenamiento: ")
    );

    let ready: Value = server.get("/health/ready").await.json();
    assert_eq!(ready["status"], "degraded");
    assert_eq!(ready["model"]["status"], "dirty");
}

#[tokio::test]
async fn liveness_and_metrics_are_exposed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = server(common::constant_service(&dir.path().join("model.json"), 0.1));

    let live: Value = server.get("/health/live").await.json();
    assert_eq!(live["status"], "live");

    server
        .post("/predict")
        .json(&json!([{ "Titulo": "a", "Descripcion": "b", "Fecha": "c" }]))
        .await
        .assert_status_ok();

    let metrics = server.get("/metrics").await;
    metrics.assert_status_ok();
    assert!(
        metrics
            .header("content-type")
            .to_str()
            .expect("ascii header")
            .starts_with("text/plain")
    );
    let text = metrics.text();
    assert!(text.contains("veraz_predict_requests_total 1"));
    assert!(text.contains("veraz_predict_items_total 1"));
    assert!(text.contains("veraz_ensemble_trees 0"));
}
