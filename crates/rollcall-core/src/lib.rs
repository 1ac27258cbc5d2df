//! rollcall-core — Face gallery, embedding matcher and frame pipeline boundary.
//!
//! Face detection and embedding extraction run outside this crate; the core
//! consumes their output as fixed-length [`Embedding`]s.

pub mod config;
pub mod encoder;
pub mod gallery;
pub mod matcher;
pub mod pipeline;
pub mod types;

pub use config::{Config, ConfigError};
pub use encoder::EmbeddingFileEncoder;
pub use gallery::{EncodeError, FaceEncoder, Gallery, GalleryBuilder, GalleryEntry, GalleryError};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher, UNKNOWN_LABEL};
pub use pipeline::{Annotation, Detection, Frame, FrameSink, FrameSource, Recognition, Recognizer};
pub use types::{BoundingBox, Embedding, Identity};
