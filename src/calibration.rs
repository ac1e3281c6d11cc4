//! Camera focal-length and face-width calibration helpers.
//!
//! All functions apply the pinhole relation `pixels = width * focal / distance`
//! solved for whichever quantity is unknown.

use crate::{config::CameraConfig, Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Demographic face-width presets (anthropometric averages, adults)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceProfile {
    Male,
    Female,
    Average,
}

impl FaceProfile {
    /// Statistical face width in centimeters
    #[must_use]
    pub fn face_width_cm(self) -> f64 {
        match self {
            Self::Male => 15.0,
            Self::Female => 14.6,
            Self::Average => 15.2,
        }
    }
}

impl FromStr for FaceProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "average" => Ok(Self::Average),
            other => Err(Error::InvalidInput(format!("Unknown face profile: {other}"))),
        }
    }
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidGeometry(format!("{name} must be positive, got {value}")))
    }
}

/// Focal length from a reference object of known width at a known distance
///
/// # Errors
///
/// Returns `InvalidGeometry` if any input is not positive
pub fn focal_length_from_reference(pixel_width: f64, known_distance_cm: f64, known_width_cm: f64) -> Result<f64> {
    require_positive("reference pixel width", pixel_width)?;
    require_positive("reference distance", known_distance_cm)?;
    require_positive("reference width", known_width_cm)?;
    Ok(pixel_width * known_distance_cm / known_width_cm)
}

/// Focal length in pixels from lens and sensor specifications
///
/// # Errors
///
/// Returns `InvalidGeometry` if the sensor width is not positive
pub fn focal_length_from_sensor(image_width_px: f64, focal_length_mm: f64, sensor_width_mm: f64) -> Result<f64> {
    require_positive("sensor width", sensor_width_mm)?;
    Ok(image_width_px * focal_length_mm / sensor_width_mm)
}

/// [`focal_length_from_sensor`] using a camera configuration
///
/// # Errors
///
/// Returns `InvalidGeometry` if the sensor width is not positive
pub fn focal_length_from_camera(camera: &CameraConfig) -> Result<f64> {
    focal_length_from_sensor(camera.image_width_px, camera.focal_length_mm, camera.sensor_width_mm)
}

/// Eye-span measurement taken at a known distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanSample {
    pub pixel_width: f64,
    pub distance_cm: f64,
}

/// Face width from several measurements at known distances.
///
/// Returns the median of the per-sample estimates, or `None` without samples.
///
/// # Errors
///
/// Returns `InvalidGeometry` if the focal length is not positive
pub fn estimate_face_width_multi_distance(samples: &[SpanSample], focal_length_px: f64) -> Result<Option<f64>> {
    require_positive("focal length", focal_length_px)?;

    let mut estimates: Vec<f64> = samples
        .iter()
        .map(|s| s.pixel_width * s.distance_cm / focal_length_px)
        .collect();
    if estimates.is_empty() {
        return Ok(None);
    }
    estimates.sort_by(f64::total_cmp);

    let mid = estimates.len() / 2;
    let median = if estimates.len() % 2 == 0 {
        (estimates[mid - 1] + estimates[mid]) / 2.0
    } else {
        estimates[mid]
    };
    Ok(Some(median))
}

/// Face width from a reference object of known width in the same frame
///
/// # Errors
///
/// Returns `InvalidGeometry` if the reference span is not positive
pub fn estimate_face_width_with_reference(
    face_pixel_width: f64,
    reference_width_cm: f64,
    reference_pixel_width: f64,
) -> Result<f64> {
    require_positive("reference pixel width", reference_pixel_width)?;
    Ok(face_pixel_width * reference_width_cm / reference_pixel_width)
}
