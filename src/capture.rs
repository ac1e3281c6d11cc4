//! `OpenCV` camera and video-file frame source.

use crate::{
    config::CameraConfig,
    constants::CAMERA_BUFFER_SIZE,
    landmarks::FrameGeometry,
    pipeline::{Frame, FrameSource},
    Error, Result,
};
use log::{info, warn};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use std::thread;
use std::time::Duration;

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// Camera device index
    Camera(i32),
    /// Video file path
    File(String),
}

/// Frame source backed by `VideoCapture`
pub struct CameraSource {
    capture: VideoCapture,
    source: VideoSource,
    geometry: FrameGeometry,
    next_index: u64,
}

impl CameraSource {
    /// Connect to the video source.
    ///
    /// Cameras get up to `max_attempts` tries one second apart, a one-frame
    /// buffer and the configured resolution. The geometry is whatever the
    /// device actually granted.
    ///
    /// # Errors
    ///
    /// Returns `Fatal` if the source cannot be opened
    pub fn open(source: VideoSource, config: &CameraConfig) -> Result<Self> {
        let mut capture = match &source {
            VideoSource::Camera(index) => Self::connect(*index, config.max_attempts)?,
            VideoSource::File(path) => {
                info!("Opening video file: {path}");
                let capture = VideoCapture::from_file(path, videoio::CAP_ANY)?;
                if !capture.is_opened()? {
                    return Err(Error::Fatal(format!("Could not open video: {path}")));
                }
                capture
            }
        };

        if matches!(source, VideoSource::Camera(_)) {
            capture.set(CAP_PROP_FRAME_WIDTH, f64::from(config.frame_width))?;
            capture.set(CAP_PROP_FRAME_HEIGHT, f64::from(config.frame_height))?;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let geometry = FrameGeometry::new(
            capture.get(CAP_PROP_FRAME_WIDTH)? as u32,
            capture.get(CAP_PROP_FRAME_HEIGHT)? as u32,
        );
        info!("Video source ready at {}x{}", geometry.width, geometry.height);

        Ok(Self {
            capture,
            source,
            geometry,
            next_index: 0,
        })
    }

    fn connect(index: i32, max_attempts: u32) -> Result<VideoCapture> {
        for attempt in 1..=max_attempts {
            info!("Opening camera {index} (attempt {attempt}/{max_attempts})");
            let mut capture = VideoCapture::new(index, videoio::CAP_ANY)?;
            capture.set(CAP_PROP_BUFFERSIZE, CAMERA_BUFFER_SIZE)?;
            if capture.is_opened()? {
                return Ok(capture);
            }
            warn!("Attempt {attempt}: couldn't connect to camera {index}");
            if attempt < max_attempts {
                thread::sleep(Duration::from_secs(1));
            }
        }
        Err(Error::Fatal(format!(
            "Failed to connect to camera {index} after {max_attempts} attempts"
        )))
    }

    #[must_use]
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }
}

impl FrameSource for CameraSource {
    type Image = Mat;

    fn read_frame(&mut self) -> Result<Option<Frame<Mat>>> {
        let mut image = Mat::default();
        let grabbed = self.capture.read(&mut image).map_err(read_failure)?;
        if !grabbed || image.empty() {
            return match self.source {
                VideoSource::File(_) => {
                    info!("End of video file reached");
                    Ok(None)
                }
                VideoSource::Camera(_) => Err(Error::Acquisition("Failed to read frame".to_string())),
            };
        }

        let index = self.next_index;
        self.next_index += 1;

        #[allow(clippy::cast_sign_loss)]
        let geometry = FrameGeometry::new(image.cols() as u32, image.rows() as u32);
        Ok(Some(Frame { index, image, geometry }))
    }
}

/// A failed read loses one frame, not the stream
fn read_failure(e: opencv::Error) -> Error {
    Error::Acquisition(format!("Frame read failed: {e}"))
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("Failed to release video source: {e}");
        }
    }
}
