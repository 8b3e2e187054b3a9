use chrono::{DateTime, Utc};
use rollcall_core::{FaceBox, Gallery, Matcher, ProbeFace, UNKNOWN_LABEL};
use rollcall_ledger::{Ledger, LedgerError};
use std::sync::Arc;

/// Annotated outcome for one detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceResult {
    pub face_box: FaceBox,
    pub label: String,
    /// Why the face could not be resolved, if it could not.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    /// One entry per input face, in input order.
    pub results: Vec<FaceResult>,
    pub any_new_attendance: bool,
}

/// Turns the faces of one frame into identity decisions and attendance marks.
///
/// Faces are handled sequentially, so two faces of the same person in one
/// frame produce a single mark. Holds no per-request state.
pub struct FrameProcessor<M> {
    gallery: Arc<Gallery>,
    matcher: M,
    tolerance: f32,
}

impl<M: Matcher> FrameProcessor<M> {
    pub fn new(gallery: Arc<Gallery>, matcher: M, tolerance: f32) -> Self {
        Self {
            gallery,
            matcher,
            tolerance,
        }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Resolve every face and mark recognized identities present at `now`.
    ///
    /// A face whose embedding cannot be compared is reported as unknown with
    /// its error and does not affect its siblings. A storage failure aborts
    /// the frame; marks committed for earlier faces stay recorded.
    pub async fn process(
        &self,
        faces: &[ProbeFace],
        ledger: &Ledger,
        now: DateTime<Utc>,
    ) -> Result<FrameOutcome, LedgerError> {
        let mut results = Vec::with_capacity(faces.len());
        let mut any_new_attendance = false;

        for (index, face) in faces.iter().enumerate() {
            let resolved = self
                .matcher
                .resolve(&face.embedding, &self.gallery, self.tolerance);

            let (label, error) = match resolved {
                Ok(m) => {
                    tracing::debug!(
                        face = index,
                        label = m.display_label(),
                        distance = ?m.distance,
                        "face resolved"
                    );
                    (m.label, None)
                }
                Err(err) => {
                    tracing::warn!(face = index, error = %err, "face could not be matched");
                    (None, Some(err.to_string()))
                }
            };

            if let Some(name) = &label {
                let outcome = ledger.mark_present_if_absent(name, now).await?;
                any_new_attendance |= outcome.inserted;
            }

            results.push(FaceResult {
                face_box: face.face_box,
                label: label.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                error,
            });
        }

        Ok(FrameOutcome {
            results,
            any_new_attendance,
        })
    }
}
