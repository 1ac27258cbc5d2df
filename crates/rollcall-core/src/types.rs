use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding box for a detected face, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Build a box from `(top, right, bottom, left)` edges, the order most
    /// HOG/CNN face locators report.
    pub fn from_trbl(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self {
            x: left,
            y: top,
            width: (right - left).max(0.0),
            height: (bottom - top).max(0.0),
        }
    }
}

/// Face embedding vector (128-dimensional for dlib-style encoders).
///
/// Produced by an external model; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings of different lengths are incomparable and sit at `+inf`.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Human-readable label of an enrolled person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for Identity {
    fn from(label: String) -> Self {
        Self(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(a.euclidean_distance(&a.clone()), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert!((b.euclidean_distance(&a) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_length_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.euclidean_distance(&b), f32::INFINITY);
    }

    #[test]
    fn test_bbox_from_trbl() {
        let bbox = BoundingBox::from_trbl(10.0, 60.0, 90.0, 20.0);
        assert_eq!(bbox.x, 20.0);
        assert_eq!(bbox.y, 10.0);
        assert_eq!(bbox.width, 40.0);
        assert_eq!(bbox.height, 80.0);
    }

    #[test]
    fn test_embedding_serializes_as_array() {
        let e = Embedding::new(vec![1.0, 2.5]);
        assert_eq!(serde_json::to_string(&e).unwrap(), "[1.0,2.5]");
        let back: Embedding = serde_json::from_str("[1.0,2.5]").unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::from("alice").to_string(), "alice");
    }
}
