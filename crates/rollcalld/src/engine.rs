use rollcall_core::{ExtractError, FaceExtractor, ProbeFace};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending frames allowed to queue behind the one being extracted.
const QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("face extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Faces found in one decoded frame.
#[derive(Debug)]
pub struct Extraction {
    pub faces: Vec<ProbeFace>,
    pub width: u32,
    pub height: u32,
}

struct ExtractRequest {
    image: Vec<u8>,
    reply: oneshot::Sender<Result<Extraction, EngineError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<ExtractRequest>,
}

impl EngineHandle {
    /// Decode an encoded image (PNG, JPEG, ...) and extract its faces.
    pub async fn extract(&self, image: Vec<u8>) -> Result<Extraction, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ExtractRequest {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread that owns the extractor.
///
/// Model sessions need exclusive access, so frames are decoded and extracted
/// one at a time in arrival order.
pub fn spawn_engine(extractor: Box<dyn FaceExtractor>) -> std::io::Result<EngineHandle> {
    let (tx, mut rx) = mpsc::channel::<ExtractRequest>(QUEUE_DEPTH);
    let mut extractor = extractor;

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                // A caller that gave up has dropped its receiver; skip the work.
                if req.reply.is_closed() {
                    tracing::debug!("dropping frame for abandoned request");
                    continue;
                }
                let result = run_extract(extractor.as_mut(), &req.image);
                let _ = req.reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn run_extract(extractor: &mut dyn FaceExtractor, bytes: &[u8]) -> Result<Extraction, EngineError> {
    let frame = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = frame.dimensions();
    let faces = extractor.extract(&frame)?;
    tracing::debug!(width, height, faces = faces.len(), "frame extracted");
    Ok(Extraction {
        faces,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use rollcall_core::recognizer::RecognizerError;
    use rollcall_core::{Embedding, FaceBox};
    use std::io::Cursor;

    /// Reports one face per 100 pixels of frame width.
    struct WidthExtractor;

    impl FaceExtractor for WidthExtractor {
        fn extract(&mut self, frame: &RgbImage) -> Result<Vec<ProbeFace>, ExtractError> {
            Ok((0..frame.width() / 100)
                .map(|i| ProbeFace {
                    face_box: FaceBox { top: 0, right: 10, bottom: 10, left: i as i32 },
                    embedding: Embedding::new(vec![i as f32]),
                })
                .collect())
        }
    }

    struct FailingExtractor;

    impl FaceExtractor for FailingExtractor {
        fn extract(&mut self, _: &RgbImage) -> Result<Vec<ProbeFace>, ExtractError> {
            Err(RecognizerError::NoLandmarks.into())
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_extract_decodes_and_runs_extractor() {
        let engine = spawn_engine(Box::new(WidthExtractor)).unwrap();
        let extraction = engine.extract(png(300, 40)).await.unwrap();
        assert_eq!((extraction.width, extraction.height), (300, 40));
        assert_eq!(extraction.faces.len(), 3);
        assert_eq!(extraction.faces[2].face_box.left, 2);
    }

    #[tokio::test]
    async fn test_extract_rejects_undecodable_bytes() {
        let engine = spawn_engine(Box::new(WidthExtractor)).unwrap();
        let err = engine.extract(b"definitely not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[tokio::test]
    async fn test_extractor_failure_is_reported() {
        let engine = spawn_engine(Box::new(FailingExtractor)).unwrap();
        let err = engine.extract(png(10, 10)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Extract(ExtractError::Recognizer(RecognizerError::NoLandmarks))
        ));
    }

    #[tokio::test]
    async fn test_handle_clones_share_engine() {
        let engine = spawn_engine(Box::new(WidthExtractor)).unwrap();
        let other = engine.clone();
        let (a, b) = tokio::join!(engine.extract(png(100, 10)), other.extract(png(200, 10)));
        assert_eq!(a.unwrap().faces.len(), 1);
        assert_eq!(b.unwrap().faces.len(), 2);
    }
}
