//! Error types for the eye/posture monitor.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// No subject or keypoints were found in the frame
    #[error("Not detected: {0}")]
    NotDetected(String),

    /// An operation needs setup (focal length, calibration) that has not happened yet
    #[error("Uncalibrated: {0}")]
    Uncalibrated(String),

    /// Degenerate keypoint configuration, e.g. a zero-width eye
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The frame source failed to deliver a frame
    #[error("Frame acquisition failed: {0}")]
    Acquisition(String),

    /// Unrecoverable resource failure; aborts the run
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Recording (JSON lines) could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `OpenCV` operation failed
    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),
}

impl Error {
    /// Whether the error only affects the current frame.
    ///
    /// Per-frame kinds are logged and counted by the pipeline, which then
    /// moves on to the next frame. Everything else ends the run.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotDetected(_) | Self::Uncalibrated(_) | Self::InvalidGeometry(_) | Self::Acquisition(_)
        )
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(Error::NotDetected("face".into()).is_recoverable());
        assert!(Error::Uncalibrated("focal length".into()).is_recoverable());
        assert!(Error::InvalidGeometry("zero width".into()).is_recoverable());
        assert!(Error::Acquisition("camera".into()).is_recoverable());
        assert!(!Error::Fatal("landmark model".into()).is_recoverable());
        assert!(!Error::ConfigError("bad window".into()).is_recoverable());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::InvalidGeometry("pixel width is 0".into());
        assert_eq!(err.to_string(), "Invalid geometry: pixel width is 0");
    }
}
