//! Open-set identity matching against the embedding gallery.
//!
//! A probe is accepted only when its nearest gallery entry lies within the
//! tolerance; otherwise the face is reported as unknown even though some
//! entry is technically closest.

use crate::gallery::Gallery;
use crate::types::{Embedding, UNKNOWN_LABEL};
use thiserror::Error;

/// Default maximum Euclidean distance for a genuine match.
pub const DEFAULT_TOLERANCE: f32 = 0.4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("probe embedding has {probe} dimensions, gallery expects {gallery}")]
    DimensionMismatch { probe: usize, gallery: usize },
}

/// Outcome of resolving one probe against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Label of the accepted entry, `None` when the face is unknown.
    pub label: Option<String>,
    /// Distance to the nearest entry (`None` for an empty gallery).
    pub distance: Option<f32>,
    /// Gallery index of the nearest entry, accepted or not.
    pub nearest_index: Option<usize>,
}

impl MatchResult {
    fn unknown() -> Self {
        Self {
            label: None,
            distance: None,
            nearest_index: None,
        }
    }

    /// Label to report to clients: the matched identity or `"Unknown"`.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Strategy for deciding the identity of a probe embedding.
pub trait Matcher {
    fn resolve(
        &self,
        probe: &Embedding,
        gallery: &Gallery,
        tolerance: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Nearest-neighbour matcher with distance rejection.
///
/// Scans every entry; on equal minimal distance the earliest entry in
/// gallery order wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn resolve(
        &self,
        probe: &Embedding,
        gallery: &Gallery,
        tolerance: f32,
    ) -> Result<MatchResult, MatchError> {
        let Some(dimension) = gallery.dimension() else {
            return Ok(MatchResult::unknown());
        };
        if probe.dimension() != dimension {
            return Err(MatchError::DimensionMismatch {
                probe: probe.dimension(),
                gallery: dimension,
            });
        }

        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.entries().iter().enumerate() {
            let dist = probe.euclidean_distance(&entry.embedding);
            // Strict comparison keeps the first entry on ties.
            if best_idx.is_none() || dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        let Some(idx) = best_idx else {
            return Ok(MatchResult::unknown());
        };

        let label = (best_dist <= tolerance).then(|| gallery.entries()[idx].label.clone());
        Ok(MatchResult {
            label,
            distance: Some(best_dist),
            nearest_index: Some(idx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GalleryEntry;

    fn entry(label: &str, values: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            label: label.into(),
            embedding: Embedding::new(values),
        }
    }

    fn gallery(entries: Vec<GalleryEntry>) -> Gallery {
        Gallery::from_entries(entries).unwrap()
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher
            .resolve(&probe, &Gallery::empty(), DEFAULT_TOLERANCE)
            .unwrap();
        assert_eq!(result.label, None);
        assert_eq!(result.display_label(), "Unknown");
        assert_eq!(result.distance, None);
    }

    #[test]
    fn test_all_distances_above_tolerance_is_unknown() {
        // The nearest entry is "near" at 0.5, still outside 0.4.
        let g = gallery(vec![
            entry("far", vec![0.9, 0.0]),
            entry("near", vec![0.5, 0.0]),
            entry("farther", vec![0.0, 2.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.resolve(&probe, &g, 0.4).unwrap();
        assert_eq!(result.label, None);
        assert_eq!(result.nearest_index, Some(1));
        assert!((result.distance.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_single_entry_within_tolerance_matches() {
        let g = gallery(vec![
            entry("bob", vec![1.0, 1.0]),
            entry("alice", vec![0.2, 0.0]),
            entry("carol", vec![-1.0, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.resolve(&probe, &g, 0.4).unwrap();
        assert_eq!(result.label.as_deref(), Some("alice"));
    }

    #[test]
    fn test_nearest_wins_when_several_within_tolerance() {
        let g = gallery(vec![
            entry("second", vec![0.3, 0.0]),
            entry("first", vec![0.1, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.resolve(&probe, &g, 0.4).unwrap();
        assert_eq!(result.label.as_deref(), Some("first"));
    }

    #[test]
    fn test_distance_equal_to_tolerance_matches() {
        let g = gallery(vec![entry("edge", vec![0.5, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.resolve(&probe, &g, 0.5).unwrap();
        assert_eq!(result.label.as_deref(), Some("edge"));
    }

    #[test]
    fn test_tie_break_prefers_earlier_entry() {
        let g = gallery(vec![
            entry("decoy", vec![3.0, 3.0]),
            entry("alpha", vec![0.0, 0.2]),
            entry("beta", vec![0.2, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        for _ in 0..10 {
            let result = EuclideanMatcher.resolve(&probe, &g, 0.4).unwrap();
            assert_eq!(result.label.as_deref(), Some("alpha"));
            assert_eq!(result.nearest_index, Some(1));
        }
    }

    #[test]
    fn test_duplicate_labels_resolve_to_shared_identity() {
        let g = gallery(vec![
            entry("alice", vec![5.0, 5.0]),
            entry("alice", vec![0.1, 0.1]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.resolve(&probe, &g, 0.4).unwrap();
        assert_eq!(result.label.as_deref(), Some("alice"));
        assert_eq!(result.nearest_index, Some(1));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let g = gallery(vec![entry("alice", vec![0.0, 0.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let err = EuclideanMatcher.resolve(&probe, &g, 0.4).unwrap_err();
        assert_eq!(err, MatchError::DimensionMismatch { probe: 2, gallery: 3 });
    }
}
