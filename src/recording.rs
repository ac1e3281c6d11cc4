//! Landmark recordings in JSON-lines form.
//!
//! Each line holds the keypoints a landmark model produced for one frame:
//!
//! ```text
//! {"geometry":{"width":640,"height":480},"face":{...},"pose":null}
//! ```
//!
//! Replaying a recording drives the full pipeline without a camera or models.
//! A line that fails to parse is an unreadable frame and is skipped.

use crate::{
    landmarks::{FaceKeypoints, FrameGeometry, LandmarkSource, PoseKeypoints},
    pipeline::{Frame, FrameSource},
    Error, Result,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Landmark output captured for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub geometry: FrameGeometry,
    #[serde(default)]
    pub face: Option<FaceKeypoints>,
    #[serde(default)]
    pub pose: Option<PoseKeypoints>,
}

/// Frame source replaying a recording line by line
#[derive(Debug)]
pub struct RecordedSource<R> {
    reader: R,
    line: String,
    line_number: usize,
    next_index: u64,
}

impl RecordedSource<BufReader<File>> {
    /// Open a recording file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Replaying landmark recording from {}", path.display());
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> RecordedSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
            next_index: 0,
        }
    }
}

impl<R: BufRead> FrameSource for RecordedSource<R> {
    type Image = RecordedFrame;

    fn read_frame(&mut self) -> Result<Option<Frame<RecordedFrame>>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                debug!("Recording exhausted after {} lines", self.line_number);
                return Ok(None);
            }
            self.line_number += 1;

            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }

            let index = self.next_index;
            self.next_index += 1;

            let recorded: RecordedFrame = serde_json::from_str(text).map_err(|e| {
                Error::Acquisition(format!("Unreadable frame on line {}: {e}", self.line_number))
            })?;

            return Ok(Some(Frame {
                index,
                geometry: recorded.geometry,
                image: recorded,
            }));
        }
    }
}

/// Landmark "model" that reads keypoints straight out of a [`RecordedFrame`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordedLandmarks;

impl LandmarkSource for RecordedLandmarks {
    type Image = RecordedFrame;

    fn detect_face(&mut self, image: &RecordedFrame) -> Result<Option<FaceKeypoints>> {
        Ok(image.face.clone())
    }

    fn detect_pose(&mut self, image: &RecordedFrame) -> Result<Option<PoseKeypoints>> {
        Ok(image.pose)
    }
}

/// Writes frames in the format [`RecordedSource`] reads
#[derive(Debug)]
pub struct RecordingWriter<W: Write> {
    writer: W,
    frames: usize,
}

impl RecordingWriter<BufWriter<File>> {
    /// Create (or truncate) a recording file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> RecordingWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frames: 0 }
    }

    /// Append one frame
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn write_frame(&mut self, frame: &RecordedFrame) -> Result<()> {
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")?;
        self.frames += 1;
        Ok(())
    }

    #[must_use]
    pub fn frames_written(&self) -> usize {
        self.frames
    }

    /// Flush and hand back the underlying writer
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
