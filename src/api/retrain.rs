use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::error::{ApiError, join_failure};
use crate::app::AppState;
use crate::error::DetectorError;
use crate::schema::RetrainRequest;

const ERROR_PREFIX: &str = "Error en el reentrenamiento";

pub(crate) async fn retrain(
    State(state): State<AppState>,
    Json(request): Json<RetrainRequest>,
) -> Response {
    let metrics = state.telemetry().metrics().clone();
    let timer = metrics.retrain_duration.start_timer();

    let service = state.service();
    let worker = state.service();
    let result = tokio::task::spawn_blocking(move || worker.retrain(&request))
        .await
        .map_err(|error| join_failure("retrain", &error))
        .and_then(std::convert::identity);
    timer.observe_duration();

    #[allow(clippy::cast_precision_loss)]
    metrics
        .ensemble_trees
        .set(service.snapshot().trees as f64);

    match result {
        Ok(report) => {
            metrics.retrain_successes.inc();
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(DetectorError::NotDurable { report, source }) => {
            metrics.retrain_not_durable.inc();
            let body = json!({
                "detail": format!("{ERROR_PREFIX}: {source}"),
                "message": report.message,
                "precision": report.precision,
                "recall": report.recall,
                "f1_score": report.f1_score,
                "durable": false,
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
        Err(error) => {
            metrics.retrain_failures.inc();
            if error.is_validation() {
                tracing::info!(error = %error, "retrain request rejected");
            } else {
                tracing::error!(error = %error, "retrain failed");
            }
            ApiError::from_detector(&error, ERROR_PREFIX).into_response()
        }
    }
}
