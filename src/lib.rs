//! Real-time eye-state, posture and screen-distance monitoring.
//!
//! The library turns per-frame face and body keypoints into three judgments:
//! - whether each eye is open or closed, against a per-user threshold learned
//!   during a calibration phase
//! - whether the upper body posture is acceptable
//! - how far the subject sits from the camera
//!
//! Landmark models and image rendering stay outside the crate. Models plug in
//! through [`landmarks::LandmarkSource`] and consumers read
//! [`pipeline::DetectionResult`]s through a [`pipeline::ResultSink`].
//!
//! # Examples
//!
//! ## Classifying keypoints directly
//!
//! ```no_run
//! use eye_posture_monitor::{
//!     config::Config,
//!     eye_state::{EarPair, EyeStateClassifier},
//! };
//!
//! # fn main() -> eye_posture_monitor::Result<()> {
//! let config = Config::default();
//! let mut eyes = EyeStateClassifier::new(&config.eye)?;
//!
//! // Calibration frames establish the baseline
//! for _ in 0..config.eye.calibration_frames {
//!     eyes.update(EarPair { left: 0.35, right: 0.35 });
//! }
//!
//! let reading = eyes.update(EarPair { left: 0.05, right: 0.05 });
//! println!("Eyes: {}", reading.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Replaying a landmark recording
//!
//! ```no_run
//! use eye_posture_monitor::{
//!     config::Config,
//!     pipeline::{FrameProcessor, LogSink, Pipeline},
//!     recording::{RecordedLandmarks, RecordedSource},
//! };
//!
//! # fn main() -> eye_posture_monitor::Result<()> {
//! let config = Config::default();
//! let processor = FrameProcessor::new(&config, RecordedLandmarks)?;
//! let mut pipeline = Pipeline::new(processor);
//!
//! let source = RecordedSource::open("session.jsonl")?;
//! let stats = pipeline.run(source, &mut LogSink::default())?;
//! println!("{} frames at {:.1} FPS", stats.processed_frames, stats.average_fps);
//! # Ok(())
//! # }
//! ```

/// Fixed-capacity sample window shared by filters and metrics
pub mod window;

/// Temporal smoothing filters
pub mod filters;

/// Keypoint types and the landmark-model boundary
pub mod landmarks;

/// Subject-to-camera distance estimation
pub mod distance;

/// Posture classification
pub mod posture;

/// Calibrated eye open/closed classification
pub mod eye_state;

/// Rolling performance metrics
pub mod metrics;

/// Focal-length and face-width calibration helpers
pub mod calibration;

/// Per-frame orchestration and the frame loop
pub mod pipeline;

/// Offline benchmark harness
pub mod benchmark;

/// JSON-lines landmark recordings
pub mod recording;

/// `OpenCV` video capture
#[cfg(feature = "opencv")]
pub mod capture;

/// Error types and result handling
pub mod error;

/// Constants used throughout the application
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
