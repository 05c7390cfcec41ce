//! Face landmark feeds from an external detector.
//!
//! Each frame's faces arrive as one JSON array:
//! `[{"rect": [x, y, w, h], "landmarks": [[x, y], ...]}, ...]`.

use crate::types::Face;
use std::io::BufRead;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read landmark feed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed faces on feed line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one frame's worth of faces.
pub fn parse_faces(json: &str) -> Result<Vec<Face>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Supplies the faces found in each successive frame.
pub trait LandmarkSource {
    /// Faces for the next frame, or `None` once the feed has ended.
    fn next_faces(&mut self) -> Result<Option<Vec<Face>>, SourceError>;
}

/// JSON Lines feed: one JSON array of faces per line, one line per frame.
/// Blank lines are frames without faces.
pub struct JsonLinesSource<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> LandmarkSource for JsonLinesSource<R> {
    fn next_faces(&mut self) -> Result<Option<Vec<Face>>, SourceError> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;

        let line = self.buf.trim();
        if line.is_empty() {
            return Ok(Some(Vec::new()));
        }

        parse_faces(line)
            .map(Some)
            .map_err(|source| SourceError::Malformed {
                line: self.line_no,
                source,
            })
    }
}

/// Replays the same faces for every frame. Useful for still images and for
/// a fixed face position in front of a camera.
pub struct StaticSource {
    faces: Vec<Face>,
}

impl StaticSource {
    pub fn new(faces: Vec<Face>) -> Self {
        Self { faces }
    }
}

impl LandmarkSource for StaticSource {
    fn next_faces(&mut self) -> Result<Option<Vec<Face>>, SourceError> {
        Ok(Some(self.faces.clone()))
    }
}
