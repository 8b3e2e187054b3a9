use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{BoxError, Json};
use rollcall_ledger::LedgerError;

use crate::engine::EngineError;
use crate::models::ErrorResponse;

pub(crate) const NO_IMAGE_MESSAGE: &str = "No image data provided";
pub(crate) const INVALID_IMAGE_MESSAGE: &str = "Invalid image data";

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub(crate) fn payload_too_large() -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "Request body too large".to_string(),
        }
    }

    pub(crate) fn storage_unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Attendance storage unavailable".to_string(),
        }
    }

    fn request_timeout() -> Self {
        Self {
            status: StatusCode::REQUEST_TIMEOUT,
            message: "Request timed out".to_string(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(error: LedgerError) -> Self {
        tracing::error!(%error, "attendance ledger failure");
        ApiError::storage_unavailable()
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Decode(e) => {
                tracing::info!(error = %e, "rejecting undecodable image");
                ApiError::invalid_input(INVALID_IMAGE_MESSAGE)
            }
            other => {
                tracing::error!(error = %other, "face extraction failed");
                ApiError::internal("Face extraction failed")
            }
        }
    }
}

pub(crate) fn map_json_rejection(rejection: JsonRejection) -> ApiError {
    let status = rejection.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large();
    }
    if status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
        return ApiError::invalid_input("Content-Type must be application/json");
    }
    ApiError::invalid_input("Invalid JSON payload")
}

pub(crate) async fn handle_middleware_error(error: BoxError) -> Response {
    if error.is::<tower::timeout::error::Elapsed>() {
        return ApiError::request_timeout().into_response();
    }

    tracing::error!(%error, "middleware error");
    ApiError::internal("Internal middleware error").into_response()
}
