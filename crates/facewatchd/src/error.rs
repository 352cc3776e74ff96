use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facewatch_core::{AnalyzeError, DECODE_ERROR_MESSAGE};
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", DECODE_ERROR_MESSAGE)]
    Decode,
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("analysis engine unavailable")]
    Unavailable,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            // Application-level signal, kept at 200 for existing clients.
            ApiError::Decode => StatusCode::OK,
            ApiError::Detection(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Analyze(AnalyzeError::Decode(_)) => ApiError::Decode,
            EngineError::Analyze(AnalyzeError::Detector(e)) => ApiError::Detection(e.to_string()),
            EngineError::ChannelClosed | EngineError::NoDetector => ApiError::Unavailable,
            EngineError::Spawn(e) => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::Decode => tracing::info!("rejected undecodable image"),
            other => tracing::error!(error = %other, "analyze request failed"),
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
