use axum::{Json, extract::State};
use serde::Serialize;

use crate::app::AppState;
use crate::service::{ModelSnapshot, ModelStatus};

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<ModelSnapshot>,
}

pub(crate) async fn ready(State(state): State<AppState>) -> Json<HealthReport> {
    let snapshot = state.service().snapshot();
    let (status, detail) = match snapshot.status {
        ModelStatus::Dirty => (
            "degraded",
            Some("classifier changes are not persisted".to_string()),
        ),
        ModelStatus::Loaded | ModelStatus::Retrained | ModelStatus::Persisted => ("ready", None),
    };
    Json(HealthReport {
        status,
        detail,
        model: Some(snapshot),
    })
}

pub(crate) async fn live(State(state): State<AppState>) -> Json<HealthReport> {
    state.telemetry().record_live_probe();
    Json(HealthReport {
        status: "live",
        detail: None,
        model: None,
    })
}
