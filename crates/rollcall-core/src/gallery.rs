//! Embedding gallery: the known identities, loaded once at startup.
//!
//! The cache file is JSON with two parallel arrays:
//!
//! ```json
//! { "encodings": [[0.12, -0.03, ...], ...], "names": ["alice", ...] }
//! ```
//!
//! A missing file yields an empty gallery, in which case every face
//! resolves to unknown.

use crate::types::{Embedding, GalleryEntry};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read gallery cache {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed gallery cache: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("gallery cache has {encodings} encodings but {names} names")]
    LengthMismatch { encodings: usize, names: usize },
    #[error("gallery entry {index} ({label}) has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("gallery entry {index} ({label}) has an empty embedding")]
    EmptyEmbedding { index: usize, label: String },
    #[error("gallery entry {index} ({label}) contains non-finite values")]
    NonFinite { index: usize, label: String },
}

#[derive(Deserialize)]
struct CacheFile {
    encodings: Vec<Vec<f32>>,
    names: Vec<String>,
}

/// Read-only, ordered set of known (label, embedding) pairs.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    dimension: Option<usize>,
}

impl Gallery {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a gallery, checking every entry shares one non-zero dimension.
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Result<Self, GalleryError> {
        let mut dimension = None;
        for (index, entry) in entries.iter().enumerate() {
            let actual = entry.embedding.dimension();
            if actual == 0 {
                return Err(GalleryError::EmptyEmbedding {
                    index,
                    label: entry.label.clone(),
                });
            }
            if !entry.embedding.values.iter().all(|v| v.is_finite()) {
                return Err(GalleryError::NonFinite {
                    index,
                    label: entry.label.clone(),
                });
            }
            match dimension {
                None => dimension = Some(actual),
                Some(expected) if expected != actual => {
                    return Err(GalleryError::DimensionMismatch {
                        index,
                        label: entry.label.clone(),
                        expected,
                        actual,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(Self { entries, dimension })
    }

    /// Parse a JSON cache blob.
    pub fn from_json(bytes: &[u8]) -> Result<Self, GalleryError> {
        let cache: CacheFile = serde_json::from_slice(bytes)?;
        if cache.encodings.len() != cache.names.len() {
            return Err(GalleryError::LengthMismatch {
                encodings: cache.encodings.len(),
                names: cache.names.len(),
            });
        }
        let entries = cache
            .names
            .into_iter()
            .zip(cache.encodings)
            .map(|(label, values)| GalleryEntry {
                label,
                embedding: Embedding::new(values),
            })
            .collect();
        Self::from_entries(entries)
    }

    /// Load the cache file at `path`; a missing file gives an empty gallery.
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "gallery cache not found; every face will resolve as unknown"
                );
                return Ok(Self::empty());
            }
            Err(source) => {
                return Err(GalleryError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let gallery = Self::from_json(&bytes)?;
        tracing::info!(
            path = %path.display(),
            entries = gallery.len(),
            identities = gallery.distinct_labels().len(),
            dimension = ?gallery.dimension(),
            "loaded embedding gallery"
        );
        Ok(gallery)
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension shared by all entries, `None` when empty.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn distinct_labels(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_json_preserves_order() {
        let json = br#"{"encodings": [[0.0, 1.0], [1.0, 0.0], [0.5, 0.5]], "names": ["bob", "alice", "bob"]}"#;
        let g = Gallery::from_json(json).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.dimension(), Some(2));
        let labels: Vec<_> = g.entries().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["bob", "alice", "bob"]);
        assert_eq!(g.distinct_labels().len(), 2);
    }

    #[test]
    fn test_from_json_length_mismatch() {
        let json = br#"{"encodings": [[0.0, 1.0]], "names": ["a", "b"]}"#;
        let err = Gallery::from_json(json).unwrap_err();
        assert!(matches!(err, GalleryError::LengthMismatch { encodings: 1, names: 2 }));
    }

    #[test]
    fn test_from_json_dimension_mismatch() {
        let json = br#"{"encodings": [[0.0, 1.0], [1.0]], "names": ["a", "b"]}"#;
        let err = Gallery::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            GalleryError::DimensionMismatch { index: 1, expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_from_json_empty_embedding() {
        let json = br#"{"encodings": [[]], "names": ["a"]}"#;
        assert!(matches!(
            Gallery::from_json(json).unwrap_err(),
            GalleryError::EmptyEmbedding { index: 0, .. }
        ));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            Gallery::from_json(b"not json").unwrap_err(),
            GalleryError::Parse(_)
        ));
    }

    #[test]
    fn test_from_entries_rejects_nan() {
        let entries = vec![GalleryEntry {
            label: "x".into(),
            embedding: Embedding::new(vec![0.0, f32::NAN]),
        }];
        assert!(matches!(
            Gallery::from_entries(entries).unwrap_err(),
            GalleryError::NonFinite { index: 0, .. }
        ));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let g = Gallery::load(&dir.path().join("absent.json")).unwrap();
        assert!(g.is_empty());
        assert_eq!(g.dimension(), None);
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"encodings": [[0.1, 0.2, 0.3]], "names": ["carol"]}"#)
            .unwrap();
        let g = Gallery::load(file.path()).unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.entries()[0].label, "carol");
        assert_eq!(g.dimension(), Some(3));
    }
}
