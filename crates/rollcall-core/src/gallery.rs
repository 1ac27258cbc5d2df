//! Reference gallery of known faces.
//!
//! A [`Gallery`] is built once at startup from a directory of labeled
//! reference files and stays read-only for the rest of the session.

use crate::types::{Embedding, Identity};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory unreadable: {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed encoder output: {0}")]
    Malformed(String),
}

/// Seam to the external face model: turns one reference file into the
/// embeddings of every face found in it, in detection order.
pub trait FaceEncoder {
    /// Whether `path` is a reference file this encoder understands.
    fn accepts(&self, path: &Path) -> bool;

    fn encode(&mut self, path: &Path) -> Result<Vec<Embedding>, EncodeError>;
}

/// One enrolled reference face.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub identity: Identity,
    pub embedding: Embedding,
}

/// Ordered, immutable sequence of reference faces.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn builder() -> GalleryBuilder {
        GalleryBuilder::default()
    }

    /// Build a gallery from every accepted file in `dir`.
    ///
    /// The identity is the file stem. Files are visited in name order.
    /// Files without a detectable face, or that the encoder fails on, are
    /// skipped; only an unreadable directory is an error.
    pub fn from_dir(dir: &Path, encoder: &mut dyn FaceEncoder) -> Result<Self, GalleryError> {
        let load_err = |source| GalleryError::Load {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(load_err)? {
            let path = entry.map_err(load_err)?.path();
            if path.is_file() && encoder.accepts(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut builder = GalleryBuilder::default();
        for path in paths {
            let Some(label) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::warn!(path = %path.display(), "skipping reference with non-UTF-8 name");
                continue;
            };

            let faces = match encoder.encode(&path) {
                Ok(faces) => faces,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable reference"
                    );
                    continue;
                }
            };

            let count = faces.len();
            let Some(first) = faces.into_iter().next() else {
                tracing::info!(path = %path.display(), "no face found in reference; skipped");
                continue;
            };
            if count > 1 {
                tracing::warn!(
                    path = %path.display(),
                    faces = count,
                    "reference holds several faces; keeping the first"
                );
            }
            builder.push(Identity::new(label), first);
        }

        let gallery = builder.build();
        tracing::info!(
            dir = %dir.display(),
            entries = gallery.len(),
            dimension = ?gallery.dimension(),
            "gallery loaded"
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

    /// Embedding length shared by every entry, `None` for an empty gallery.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.len())
    }

    /// Distinct identities in first-enrolled order.
    pub fn identities(&self) -> Vec<&Identity> {
        let mut seen: Vec<&Identity> = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&&entry.identity) {
                seen.push(&entry.identity);
            }
        }
        seen
    }

    /// Number of reference embeddings enrolled for `identity`.
    pub fn count_for(&self, identity: &Identity) -> usize {
        self.entries.iter().filter(|e| &e.identity == identity).count()
    }
}

/// Accumulates entries before freezing them into a [`Gallery`].
#[derive(Debug, Default)]
pub struct GalleryBuilder {
    entries: Vec<GalleryEntry>,
}

impl GalleryBuilder {
    /// Append a reference embedding. Empty embeddings and embeddings whose
    /// length differs from the first accepted one are dropped with a warning.
    pub fn push(&mut self, identity: Identity, embedding: Embedding) -> &mut Self {
        if embedding.is_empty() {
            tracing::warn!(%identity, "empty embedding; skipped");
            return self;
        }
        if let Some(first) = self.entries.first() {
            if first.embedding.len() != embedding.len() {
                tracing::warn!(
                    %identity,
                    expected = first.embedding.len(),
                    actual = embedding.len(),
                    "embedding dimension mismatch; skipped"
                );
                return self;
            }
        }
        self.entries.push(GalleryEntry { identity, embedding });
        self
    }

    pub fn build(self) -> Gallery {
        Gallery {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Encoder fixture keyed by file name.
    struct FakeEncoder {
        faces: HashMap<String, Result<Vec<Embedding>, ()>>,
    }

    impl FaceEncoder for FakeEncoder {
        fn accepts(&self, path: &Path) -> bool {
            path.extension().is_some_and(|e| e == "jpg")
        }

        fn encode(&mut self, path: &Path) -> Result<Vec<Embedding>, EncodeError> {
            let name = path.file_name().unwrap().to_str().unwrap();
            match self.faces.get(name) {
                Some(Ok(faces)) => Ok(faces.clone()),
                Some(Err(())) => Err(EncodeError::Malformed("bad image".into())),
                None => Ok(Vec::new()),
            }
        }
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_from_dir_labels_from_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bob.jpg");
        touch(dir.path(), "alice.jpg");
        let mut encoder = FakeEncoder {
            faces: HashMap::from([
                ("alice.jpg".to_string(), Ok(vec![emb(&[1.0, 0.0])])),
                ("bob.jpg".to_string(), Ok(vec![emb(&[0.0, 1.0])])),
            ]),
        };

        let gallery = Gallery::from_dir(dir.path(), &mut encoder).unwrap();
        let labels: Vec<&str> = gallery.entries().iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(labels, vec!["alice", "bob"]);
        assert_eq!(gallery.dimension(), Some(2));
    }

    #[test]
    fn test_from_dir_skips_faceless_and_failing_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "alice.jpg");
        touch(dir.path(), "empty.jpg");
        touch(dir.path(), "broken.jpg");
        touch(dir.path(), "notes.txt");
        let mut encoder = FakeEncoder {
            faces: HashMap::from([
                ("alice.jpg".to_string(), Ok(vec![emb(&[1.0, 0.0])])),
                ("empty.jpg".to_string(), Ok(vec![])),
                ("broken.jpg".to_string(), Err(())),
            ]),
        };

        let gallery = Gallery::from_dir(dir.path(), &mut encoder).unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.entries()[0].identity.as_str(), "alice");
    }

    #[test]
    fn test_from_dir_keeps_first_face_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "group.jpg");
        let mut encoder = FakeEncoder {
            faces: HashMap::from([(
                "group.jpg".to_string(),
                Ok(vec![emb(&[1.0, 0.0]), emb(&[0.0, 1.0])]),
            )]),
        };

        let gallery = Gallery::from_dir(dir.path(), &mut encoder).unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.entries()[0].embedding, emb(&[1.0, 0.0]));
    }

    #[test]
    fn test_from_dir_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = FakeEncoder { faces: HashMap::new() };
        let result = Gallery::from_dir(&dir.path().join("absent"), &mut encoder);
        assert!(matches!(result, Err(GalleryError::Load { .. })));
    }

    #[test]
    fn test_builder_rejects_dimension_mismatch() {
        let mut builder = Gallery::builder();
        builder
            .push("alice".into(), emb(&[1.0, 0.0]))
            .push("bob".into(), emb(&[1.0, 0.0, 0.0]))
            .push("carol".into(), emb(&[]))
            .push("alice".into(), emb(&[0.9, 0.1]));
        let gallery = builder.build();

        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.count_for(&"alice".into()), 2);
        assert_eq!(gallery.identities(), vec![&Identity::from("alice")]);
    }

    #[test]
    fn test_empty_gallery() {
        let gallery = Gallery::builder().build();
        assert!(gallery.is_empty());
        assert_eq!(gallery.dimension(), None);
    }
}
