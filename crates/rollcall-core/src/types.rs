use serde::{Deserialize, Serialize};

/// Label reported for faces that do not match any gallery entry.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Face location in frame pixel coordinates.
///
/// Edges follow the `top, right, bottom, left` convention used by the
/// attendance clients when drawing overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl FaceBox {
    /// Build a box from a float `x, y, width, height` rectangle, rounding and
    /// clamping every edge to `[0, width) x [0, height)` of the frame.
    pub fn from_rect(x: f32, y: f32, w: f32, h: f32, frame_width: u32, frame_height: u32) -> Self {
        let max_x = frame_width.saturating_sub(1) as f32;
        let max_y = frame_height.saturating_sub(1) as f32;
        Self {
            top: y.round().clamp(0.0, max_y) as i32,
            right: (x + w).round().clamp(0.0, max_x) as i32,
            bottom: (y + h).round().clamp(0.0, max_y) as i32,
            left: x.round().clamp(0.0, max_x) as i32,
        }
    }
}

/// Face embedding vector.
///
/// The dimension is fixed per gallery (128 for dlib-style caches, 512 for
/// the bundled ArcFace recognizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings of equal dimension.
    ///
    /// Callers must check dimensions first; extra trailing values on the
    /// longer vector are ignored.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One known identity sample in the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub label: String,
    pub embedding: Embedding,
}

/// A face found in one submitted frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeFace {
    pub face_box: FaceBox,
    pub embedding: Embedding,
}
