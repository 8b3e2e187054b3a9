//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the RGB frame into a 640×640 input, decodes the three
//! anchor-free stride heads (8/16/32) and suppresses overlaps with NMS.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const MEAN: f32 = 127.5;
const STD: f32 = 128.0;
const CONFIDENCE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0}")]
    ModelNotFound(String),
    #[error("detector inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Raw detection in frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Left eye, right eye, nose, left mouth corner, right mouth corner.
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Mapping from letterboxed input space back to the frame.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn for_frame(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((INPUT_SIZE as f32 - new_w) / 2.0).floor(),
            pad_y: ((INPUT_SIZE as f32 - new_h) / 2.0).floor(),
        }
    }

    fn to_frame(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Per-stride output tensor positions: (score, bbox, kps).
type HeadIndices = (usize, usize, usize);

pub struct FaceDetector {
    session: Session,
    heads: [HeadIndices; 3],
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD needs 9 outputs (score/bbox/kps per stride), model has {}",
                names.len()
            )));
        }
        let heads = head_indices(&names);

        tracing::info!(path = %model_path.display(), outputs = ?names, ?heads, "loaded SCRFD model");
        Ok(Self { session, heads })
    }

    /// Detect faces, highest confidence first.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let letterbox = Letterbox::for_frame(frame.width(), frame.height());
        let input = preprocess(frame, &letterbox);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.heads[pos];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(score_idx, "scores")?;
            let boxes = extract(bbox_idx, "boxes")?;
            let kps = extract(kps_idx, "landmarks")?;
            candidates.extend(decode_head(scores, boxes, kps, stride, &letterbox));
        }

        Ok(nms(candidates, NMS_IOU_THRESHOLD))
    }
}

/// Resize into the letterbox and normalize to an NCHW RGB tensor.
/// Padding uses the mean so it normalizes to zero.
fn preprocess(frame: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let new_w = ((frame.width() as f32 * letterbox.scale).round() as u32).clamp(1, INPUT_SIZE);
    let new_h = ((frame.height() as f32 * letterbox.scale).round() as u32).clamp(1, INPUT_SIZE);
    let resized = imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let (off_x, off_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + off_x, y as usize + off_y);
        if tx >= size || ty >= size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - MEAN) / STD;
        }
    }
    tensor
}

/// Locate output heads by `score_8`-style names, else assume the standard
/// positional export: scores 0-2, boxes 3-5, landmarks 6-8.
fn head_indices(names: &[String]) -> [HeadIndices; 3] {
    let find = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named: Option<Vec<HeadIndices>> = STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?, find("kps", s)?)))
        .collect();

    match named {
        Some(v) => [v[0], v[1], v[2]],
        None => [(0, 3, 6), (1, 4, 7), (2, 5, 8)],
    }
}

/// Decode one stride head into frame-space detections above threshold.
fn decode_head(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<Detection> {
    let cells_x = INPUT_SIZE as usize / stride;
    let cells_y = INPUT_SIZE as usize / stride;
    let step = stride as f32;

    (0..cells_x * cells_y * ANCHORS_PER_CELL)
        .filter_map(|i| {
            let score = *scores.get(i)?;
            if score <= CONFIDENCE_THRESHOLD {
                return None;
            }
            let cell = i / ANCHORS_PER_CELL;
            let cx = (cell % cells_x) as f32 * step;
            let cy = (cell / cells_x) as f32 * step;

            let d = boxes.get(i * 4..i * 4 + 4)?;
            let (x1, y1) = letterbox.to_frame((cx - d[0] * step, cy - d[1] * step));
            let (x2, y2) = letterbox.to_frame((cx + d[2] * step, cy + d[3] * step));

            let landmarks = kps.get(i * 10..i * 10 + 10).map(|k| {
                std::array::from_fn(|p| {
                    letterbox.to_frame((cx + k[p * 2] * step, cy + k[p * 2 + 1] * step))
                })
            });

            Some(Detection {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let iy = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = ix * iy;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Greedy non-maximum suppression, output sorted by confidence.
fn nms(mut candidates: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for det in candidates {
        if kept.iter().all(|k| iou(k, &det) <= threshold) {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn det(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Detection {
        Detection { x, y, width: w, height: h, confidence, landmarks: None }
    }

    #[test]
    fn test_iou_cases() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &det(20.0, 20.0, 5.0, 5.0, 1.0)), 0.0);
        let half = det(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_of_overlap() {
        let out = nms(
            vec![
                det(5.0, 5.0, 100.0, 100.0, 0.8),
                det(300.0, 300.0, 40.0, 40.0, 0.6),
                det(0.0, 0.0, 100.0, 100.0, 0.9),
            ],
            0.4,
        );
        let conf: Vec<f32> = out.iter().map(|d| d.confidence).collect();
        assert_eq!(conf, [0.9, 0.6]);
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox::for_frame(320, 240);
        assert_eq!(lb.scale, 2.0);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);
        let (x, y) = lb.to_frame((100.0 * 2.0, 50.0 * 2.0 + 80.0));
        assert!((x - 100.0).abs() < 1e-4 && (y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_head_indices_named_and_positional() {
        let shuffled: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(head_indices(&shuffled), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);

        let numeric: Vec<String> = (0..9).map(|i| format!("{}", 400 + i)).collect();
        assert_eq!(head_indices(&numeric), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_decode_head_single_anchor() {
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let stride = 32;
        let anchors = (640 / stride) * (640 / stride) * ANCHORS_PER_CELL;
        let mut scores = vec![0.0; anchors];
        let boxes = vec![1.0; anchors * 4];
        let kps = vec![0.0; anchors * 10];
        // Cell (x=1, y=2), second anchor.
        let idx = (2 * 20 + 1) * ANCHORS_PER_CELL + 1;
        scores[idx] = 0.9;

        let out = decode_head(&scores, &boxes, &kps, stride, &lb);
        assert_eq!(out.len(), 1);
        let d = &out[0];
        assert_eq!((d.x, d.y, d.width, d.height), (0.0, 32.0, 64.0, 64.0));
        assert_eq!(d.landmarks.unwrap()[0], (32.0, 64.0));
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let frame = RgbImage::from_pixel(320, 240, Rgb([255, 255, 255]));
        let lb = Letterbox::for_frame(320, 240);
        let t = preprocess(&frame, &lb);
        assert_eq!(t.shape(), &[1, 3, 640, 640]);
        assert_eq!(t[[0, 0, 0, 0]], 0.0);
        let inside = (255.0 - MEAN) / STD;
        assert!((t[[0, 2, 320, 320]] - inside).abs() < 1e-6);
    }
}
