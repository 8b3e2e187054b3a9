use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;

use crate::errors::{map_json_rejection, ApiError, INVALID_IMAGE_MESSAGE, NO_IMAGE_MESSAGE};
use crate::models::{
    AttendanceEntry, AttendanceResponse, LiveResponse, ProcessImageRequest, ProcessImageResponse,
    RecognizedFace,
};
use crate::state::AppState;

const CSV_CONTENT_TYPE: &str = "text/csv";
const CSV_DISPOSITION: &str = "attachment; filename=attendance.csv";

pub(crate) async fn live(State(state): State<AppState>) -> Json<LiveResponse> {
    Json(LiveResponse {
        status: "live",
        uptime_ms: state.started_at.elapsed().as_millis() as u64,
        gallery_entries: state.processor.gallery().len(),
    })
}

/// Decode the payload of a `data:<mime>;base64,<payload>` URL. A string
/// without a comma is taken as the payload itself.
pub(crate) fn decode_data_url(data: &str) -> Result<Vec<u8>, ApiError> {
    let payload = data.split_once(',').map_or(data, |(_, payload)| payload);
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| ApiError::invalid_input(INVALID_IMAGE_MESSAGE))?;
    if bytes.is_empty() {
        return Err(ApiError::invalid_input(INVALID_IMAGE_MESSAGE));
    }
    Ok(bytes)
}

pub(crate) async fn process_image(
    State(state): State<AppState>,
    payload: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> Result<Json<ProcessImageResponse>, ApiError> {
    let Json(payload) = payload.map_err(map_json_rejection)?;
    let image = payload
        .image
        .filter(|image| !image.is_empty())
        .ok_or_else(|| ApiError::invalid_input(NO_IMAGE_MESSAGE))?;
    let bytes = decode_data_url(&image)?;

    let now = Utc::now();
    let extraction = state.engine.extract(bytes).await?;
    let outcome = state
        .processor
        .process(&extraction.faces, &state.ledger, now)
        .await?;

    tracing::info!(
        width = extraction.width,
        height = extraction.height,
        faces = outcome.results.len(),
        new_attendance = outcome.any_new_attendance,
        "frame processed"
    );

    Ok(Json(ProcessImageResponse {
        recognized_faces: outcome
            .results
            .into_iter()
            .map(RecognizedFace::from)
            .collect(),
        new_attendance: outcome.any_new_attendance,
    }))
}

pub(crate) async fn get_attendance(
    State(state): State<AppState>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    let records = state.ledger.list_all().await?;
    Ok(Json(AttendanceResponse {
        attendance: records.into_iter().map(AttendanceEntry::from).collect(),
    }))
}

pub(crate) async fn export_attendance(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let csv = state.ledger.export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, CSV_DISPOSITION),
        ],
        csv,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_decode_data_url_strips_prefix() {
        let bytes = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_decode_bare_base64() {
        assert_eq!(decode_data_url("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let err = decode_data_url("data:image/png;base64,!!!").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        assert!(decode_data_url("data:image/png;base64,").is_err());
    }
}
