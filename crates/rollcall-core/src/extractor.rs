//! Face extraction boundary: frame in, located embeddings out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, EMBEDDING_DIM};
use crate::types::{FaceBox, ProbeFace};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// Detects faces in a frame and computes one embedding per face.
///
/// Output order is stable within a call. Implementations own mutable model
/// state, so callers drive them from a single thread.
pub trait FaceExtractor: Send {
    fn extract(&mut self, frame: &RgbImage) -> Result<Vec<ProbeFace>, ExtractError>;

    /// Dimension of the embeddings produced, when fixed and known up front.
    fn embedding_dim(&self) -> Option<usize> {
        None
    }
}

/// SCRFD + ArcFace extraction pipeline.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceExtractor for OnnxExtractor {
    fn extract(&mut self, frame: &RgbImage) -> Result<Vec<ProbeFace>, ExtractError> {
        let detections = self.detector.detect(frame)?;
        tracing::debug!(faces = detections.len(), "detector pass complete");

        detections
            .iter()
            .map(|det| -> Result<ProbeFace, ExtractError> {
                let embedding = self.recognizer.embed(frame, det)?;
                Ok(ProbeFace {
                    face_box: FaceBox::from_rect(
                        det.x,
                        det.y,
                        det.width,
                        det.height,
                        frame.width(),
                        frame.height(),
                    ),
                    embedding,
                })
            })
            .collect()
    }

    fn embedding_dim(&self) -> Option<usize> {
        Some(EMBEDDING_DIM)
    }
}
