use axum::{Json, extract::State};

use super::error::{ApiError, join_failure};
use crate::app::AppState;
use crate::schema::{NewsItem, PredictionResponse};

const ERROR_PREFIX: &str = "Error en la predicción";

pub(crate) async fn predict(
    State(state): State<AppState>,
    Json(items): Json<Vec<NewsItem>>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let metrics = state.telemetry().metrics().clone();
    metrics.predict_requests.inc();
    let timer = metrics.predict_duration.start_timer();

    let service = state.service();
    let result = tokio::task::spawn_blocking(move || service.predict(&items))
        .await
        .map_err(|error| join_failure("prediction", &error))
        .and_then(std::convert::identity);
    timer.observe_duration();

    match result {
        Ok(predictions) => {
            #[allow(clippy::cast_precision_loss)]
            {
                metrics.predict_items.inc_by(predictions.len() as f64);
                let fakes = predictions
                    .iter()
                    .filter(|record| record.verdict == "Fake")
                    .count();
                metrics.fake_verdicts.inc_by(fakes as f64);
            }
            Ok(Json(PredictionResponse { predictions }))
        }
        Err(error) => {
            metrics.predict_failures.inc();
            if error.is_validation() {
                tracing::info!(error = %error, "prediction request rejected");
            } else {
                tracing::error!(error = %error, "prediction failed");
            }
            Err(ApiError::from_detector(&error, ERROR_PREFIX))
        }
    }
}
