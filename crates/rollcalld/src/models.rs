use rollcall_ledger::{AttendanceRecord, TIMESTAMP_FORMAT};
use serde::{Deserialize, Serialize};

use crate::processor::FaceResult;

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessImageRequest {
    /// Data URL (`data:image/jpeg;base64,...`) or bare base64.
    pub(crate) image: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RecognizedFace {
    pub(crate) top: i32,
    pub(crate) right: i32,
    pub(crate) bottom: i32,
    pub(crate) left: i32,
    pub(crate) name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl From<FaceResult> for RecognizedFace {
    fn from(result: FaceResult) -> Self {
        Self {
            top: result.face_box.top,
            right: result.face_box.right,
            bottom: result.face_box.bottom,
            left: result.face_box.left,
            name: result.label,
            error: result.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ProcessImageResponse {
    pub(crate) recognized_faces: Vec<RecognizedFace>,
    pub(crate) new_attendance: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttendanceEntry {
    pub(crate) name: String,
    pub(crate) time: String,
}

impl From<AttendanceRecord> for AttendanceEntry {
    fn from(record: AttendanceRecord) -> Self {
        Self {
            time: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            name: record.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttendanceResponse {
    pub(crate) attendance: Vec<AttendanceEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LiveResponse {
    pub(crate) status: &'static str,
    pub(crate) uptime_ms: u64,
    pub(crate) gallery_entries: usize,
}
