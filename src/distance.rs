//! Camera-to-subject distance estimation from the eye span.
//!
//! Uses similar triangles: a feature of known real width `W` that spans `p`
//! pixels under focal length `f` sits at `W * f / p` centimeters.

use crate::{config::DistanceConfig, landmarks::FaceKeypoints, Error, Result};
use log::{debug, info};
use serde::Serialize;
use std::fmt;

/// Discrete distance label for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceZone {
    /// Focal length has not been set
    Uncalibrated,
    /// No face in the frame
    NoSubject,
    /// Degenerate eye span
    Invalid,
    TooClose,
    Good,
    TooFar,
}

impl DistanceZone {
    /// Whether a distance was actually computed
    #[must_use]
    pub fn is_measured(self) -> bool {
        matches!(self, Self::TooClose | Self::Good | Self::TooFar)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Uncalibrated => "FOCAL LENGTH NOT SET",
            Self::NoSubject => "NO FACE",
            Self::Invalid => "INVALID FACE",
            Self::TooClose => "TOO CLOSE!",
            Self::Good => "GOOD DISTANCE",
            Self::TooFar => "TOO FAR!",
        }
    }
}

impl fmt::Display for DistanceZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Distance result for one frame; `distance_cm` is 0 unless the zone is measured
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceEstimate {
    pub distance_cm: f64,
    pub zone: DistanceZone,
}

impl DistanceEstimate {
    fn unmeasured(zone: DistanceZone) -> Self {
        Self { distance_cm: 0.0, zone }
    }
}

/// Pixel span between the two outer eye corners.
///
/// Both coordinates are scaled by the frame width, matching how the focal
/// length default was calibrated.
#[must_use]
pub fn eye_span_pixels(face: &FaceKeypoints, frame_width: u32) -> f64 {
    let scale = f64::from(frame_width);
    let (lx, ly) = face.left_eye_outer().scaled(scale, scale);
    let (rx, ry) = face.right_eye_outer().scaled(scale, scale);
    (lx - rx).hypot(ly - ry)
}

/// Distance estimator. Estimation never mutates the estimator.
#[derive(Debug, Clone)]
pub struct DistanceEstimator {
    known_width_cm: f64,
    focal_length_px: Option<f64>,
    min_distance_cm: f64,
    max_distance_cm: f64,
}

impl DistanceEstimator {
    #[must_use]
    pub fn new(config: &DistanceConfig) -> Self {
        info!(
            "Initializing DistanceEstimator: known width {:.1}cm, bounds [{:.0}, {:.0}]cm",
            config.known_width_cm, config.min_distance_cm, config.max_distance_cm
        );
        Self {
            known_width_cm: config.known_width_cm,
            focal_length_px: config.focal_length_px,
            min_distance_cm: config.min_distance_cm,
            max_distance_cm: config.max_distance_cm,
        }
    }

    /// Set the camera focal length in pixels
    ///
    /// # Errors
    ///
    /// Returns an error if the focal length is not a positive finite number
    pub fn set_focal_length(&mut self, focal_length_px: f64) -> Result<()> {
        if !(focal_length_px.is_finite() && focal_length_px > 0.0) {
            return Err(Error::InvalidInput(format!(
                "Focal length must be positive, got {focal_length_px}"
            )));
        }
        info!("Distance estimator focal length set to {focal_length_px:.2}px");
        self.focal_length_px = Some(focal_length_px);
        Ok(())
    }

    /// Forget the focal length; later estimates report `Uncalibrated`
    pub fn clear_focal_length(&mut self) {
        self.focal_length_px = None;
    }

    #[must_use]
    pub fn focal_length(&self) -> Option<f64> {
        self.focal_length_px
    }

    /// Override the real-world feature width
    ///
    /// # Errors
    ///
    /// Returns an error if the width is not positive
    pub fn set_known_width(&mut self, known_width_cm: f64) -> Result<()> {
        if !(known_width_cm.is_finite() && known_width_cm > 0.0) {
            return Err(Error::InvalidInput(format!(
                "Known width must be positive, got {known_width_cm}"
            )));
        }
        self.known_width_cm = known_width_cm;
        Ok(())
    }

    #[must_use]
    pub fn known_width(&self) -> f64 {
        self.known_width_cm
    }

    /// Compute the distance in centimeters.
    ///
    /// The focal length is checked before anything else, so an uncalibrated
    /// estimator reports `Uncalibrated` even when no face was found.
    ///
    /// # Errors
    ///
    /// `Uncalibrated`, `NotDetected` or `InvalidGeometry`, in that order
    pub fn measure(&self, face: Option<&FaceKeypoints>, frame_width: u32) -> Result<f64> {
        let focal_length = self
            .focal_length_px
            .ok_or_else(|| Error::Uncalibrated("focal length not set".to_string()))?;
        let face = face.ok_or_else(|| Error::NotDetected("no face for distance estimation".to_string()))?;

        let pixel_width = eye_span_pixels(face, frame_width);
        if !(pixel_width > 0.0) {
            return Err(Error::InvalidGeometry(format!("eye span is {pixel_width}px")));
        }

        Ok(self.known_width_cm * focal_length / pixel_width)
    }

    /// Map a distance onto its zone
    #[must_use]
    pub fn classify(&self, distance_cm: f64) -> DistanceZone {
        if distance_cm < self.min_distance_cm {
            DistanceZone::TooClose
        } else if distance_cm > self.max_distance_cm {
            DistanceZone::TooFar
        } else {
            DistanceZone::Good
        }
    }

    /// Estimate distance and zone for one frame
    #[must_use]
    pub fn estimate(&self, face: Option<&FaceKeypoints>, frame_width: u32) -> DistanceEstimate {
        match self.measure(face, frame_width) {
            Ok(distance_cm) => {
                let zone = self.classify(distance_cm);
                debug!("Distance {distance_cm:.1}cm -> {zone}");
                DistanceEstimate { distance_cm, zone }
            }
            Err(Error::Uncalibrated(_)) => DistanceEstimate::unmeasured(DistanceZone::Uncalibrated),
            Err(Error::NotDetected(_)) => DistanceEstimate::unmeasured(DistanceZone::NoSubject),
            Err(_) => DistanceEstimate::unmeasured(DistanceZone::Invalid),
        }
    }
}
