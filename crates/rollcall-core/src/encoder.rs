//! Gallery encoder backed by pre-computed model output.
//!
//! The face model runs outside this process. For every reference image it
//! leaves a JSON document next to the others in the gallery directory:
//!
//! ```json
//! { "faces": [[0.01, -0.12, ...], ...] }
//! ```
//!
//! The document's file stem is the identity label.

use crate::gallery::{EncodeError, FaceEncoder};
use crate::types::Embedding;
use serde::Deserialize;
use std::path::Path;

const ENCODING_EXTENSION: &str = "json";

#[derive(Debug, Deserialize)]
struct EncodedImage {
    #[serde(default)]
    faces: Vec<Embedding>,
}

/// Reads `*.json` embedding documents produced by the external model.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddingFileEncoder;

impl FaceEncoder for EmbeddingFileEncoder {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ENCODING_EXTENSION))
    }

    fn encode(&mut self, path: &Path) -> Result<Vec<Embedding>, EncodeError> {
        let raw = std::fs::read_to_string(path)?;
        let doc: EncodedImage = serde_json::from_str(&raw)
            .map_err(|e| EncodeError::Malformed(format!("{}: {e}", path.display())))?;
        Ok(doc.faces)
    }
}
