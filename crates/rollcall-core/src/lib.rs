//! rollcall-core — Face identity resolution for attendance logging.
//!
//! Holds the embedding gallery and the open-set matcher, plus the
//! extraction boundary with its SCRFD/ArcFace ONNX backend.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod gallery;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use extractor::{ExtractError, FaceExtractor, OnnxExtractor};
pub use gallery::{Gallery, GalleryError};
pub use matcher::{EuclideanMatcher, MatchError, MatchResult, Matcher, DEFAULT_TOLERANCE};
pub use types::{Embedding, FaceBox, GalleryEntry, ProbeFace, UNKNOWN_LABEL};
