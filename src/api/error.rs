use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tokio::task::JoinError;

use crate::error::{DetectorError, ErrorKind};

/// `{"detail": ...}` 形式のエラーレスポンス。
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    /// 検証エラーは 400 でそのまま、それ以外は 500 で `prefix` を付けて返す。
    pub(crate) fn from_detector(error: &DetectorError, prefix: &str) -> Self {
        match error.kind() {
            ErrorKind::Validation => Self {
                status: StatusCode::BAD_REQUEST,
                detail: error.to_string(),
            },
            ErrorKind::Fatal | ErrorKind::Transient => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: format!("{prefix}: {error}"),
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// ブロッキングタスクの失敗（panic を含む）を計算エラーに変換する。
pub(crate) fn join_failure(task: &str, error: &JoinError) -> DetectorError {
    tracing::error!(task, error = %error, "blocking task failed");
    DetectorError::Compute(format!("{task} worker failed: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request_without_prefix() {
        let error = DetectorError::validation("No se proporcionaron datos para la predicción");
        let api = ApiError::from_detector(&error, "Error en la predicción");
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert_eq!(api.detail, "No se proporcionaron datos para la predicción");
    }

    #[test]
    fn compute_maps_to_internal_error_with_prefix() {
        let error = DetectorError::Compute("boom".to_string());
        let api = ApiError::from_detector(&error, "Error en la predicción");
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.detail, "Error en la predicción: computation failed: boom");
    }
}
