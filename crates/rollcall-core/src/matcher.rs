use crate::gallery::Gallery;
use crate::types::{Embedding, Identity};

/// Label shown for faces that match nobody in the gallery.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Default maximum Euclidean distance accepted as the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Matched identity, `None` when the probe is unknown.
    pub identity: Option<Identity>,
    /// Distance to the nearest gallery entry (`+inf` when nothing was comparable).
    pub distance: f32,
    /// Gallery position of the nearest entry, matched or not.
    pub nearest: Option<usize>,
}

impl MatchResult {
    fn unknown() -> Self {
        Self {
            identity: None,
            distance: f32::INFINITY,
            nearest: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }

    /// Display label: the identity, or [`UNKNOWN_LABEL`].
    pub fn label(&self) -> &str {
        self.identity.as_ref().map_or(UNKNOWN_LABEL, Identity::as_str)
    }
}

/// Strategy for deciding which enrolled identity, if any, a probe belongs to.
pub trait Matcher {
    fn identify(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult;
}

/// Nearest-neighbour matcher over Euclidean distance with one acceptance
/// threshold: a probe matches iff its nearest entry is within `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn identify(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult {
        if gallery.dimension().is_some_and(|d| d != probe.len()) {
            tracing::warn!(
                probe = probe.len(),
                gallery = ?gallery.dimension(),
                "probe dimension differs from gallery"
            );
            return MatchResult::unknown();
        }

        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        // Strict `<` keeps the earliest entry on ties.
        for (i, entry) in gallery.entries().iter().enumerate() {
            let dist = probe.euclidean_distance(&entry.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        let identity = match best_idx {
            Some(idx) if best_dist <= self.threshold => {
                Some(gallery.entries()[idx].identity.clone())
            }
            _ => None,
        };

        MatchResult {
            identity,
            distance: best_dist,
            nearest: best_idx,
        }
    }
}
