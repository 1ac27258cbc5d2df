//! Boundary between the external frame pipeline and the recognition core.
//!
//! The pipeline pulls [`Frame`]s from a [`FrameSource`], hands them to a
//! [`Recognizer`], and pushes the resulting [`Annotation`]s to a
//! [`FrameSink`] for drawing.

use crate::gallery::Gallery;
use crate::matcher::Matcher;
use crate::types::{BoundingBox, Embedding, Identity};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame at line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One detected face: where it is and what it looks like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// All faces found in one captured frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub sequence: u64,
    /// Capture time; the consumer falls back to its own clock when absent.
    #[serde(default)]
    pub captured_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub faces: Vec<Detection>,
}

/// Draw instruction handed back to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub label: String,
    /// Distance to the nearest reference; `None` when nothing was comparable.
    pub distance: Option<f32>,
}

/// Pull interface over the upstream frame producer.
pub trait FrameSource {
    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError>;
}

/// Receiver of per-frame draw instructions.
pub trait FrameSink {
    fn emit(&mut self, sequence: u64, annotations: &[Annotation]) -> Result<(), PipelineError>;
}

/// Frame source reading one JSON-encoded [`Frame`] per line.
pub struct JsonLinesSource<R> {
    reader: R,
    line: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> FrameSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        loop {
            self.buf.clear();
            // Raw bytes: a line that is not UTF-8 is a bad frame, not a dead stream.
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;

            let text = trim_ascii(&self.buf);
            if text.is_empty() {
                continue;
            }
            return serde_json::from_slice(text)
                .map(Some)
                .map_err(|source| PipelineError::Malformed {
                    line: self.line,
                    source,
                });
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[derive(Serialize)]
struct AnnotatedFrame<'a> {
    sequence: u64,
    annotations: &'a [Annotation],
}

/// Frame sink writing one JSON object per frame, flushed per line.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for JsonLinesSink<W> {
    fn emit(&mut self, sequence: u64, annotations: &[Annotation]) -> Result<(), PipelineError> {
        serde_json::to_writer(&mut self.writer, &AnnotatedFrame { sequence, annotations })?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Outcome of recognizing every face in a frame.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    /// One annotation per face, in detection order.
    pub annotations: Vec<Annotation>,
    /// Identities of matched faces, in detection order.
    pub sightings: Vec<Identity>,
}

/// Immutable gallery plus the matcher that decides against it.
pub struct Recognizer<M> {
    gallery: Gallery,
    matcher: M,
}

impl<M: Matcher> Recognizer<M> {
    pub fn new(gallery: Gallery, matcher: M) -> Self {
        Self { gallery, matcher }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn recognize(&self, frame: &Frame) -> Recognition {
        let mut recognition = Recognition::default();

        for face in &frame.faces {
            let result = self.matcher.identify(&face.embedding, &self.gallery);
            tracing::debug!(
                sequence = frame.sequence,
                label = result.label(),
                distance = result.distance,
                "face matched"
            );

            recognition.annotations.push(Annotation {
                bbox: face.bbox,
                label: result.label().to_string(),
                distance: result.distance.is_finite().then_some(result.distance),
            });
            if let Some(identity) = result.identity {
                recognition.sightings.push(identity);
            }
        }

        recognition
    }
}
