//! Eye-openness classification with per-subject calibration.
//!
//! Absolute eye aspect ratio (EAR) varies with eye shape, so the classifier
//! first averages the subject's open-eye EAR over a fixed number of frames and
//! derives a personal closed-eye threshold from it. After that, each eye's raw
//! EAR is smoothed by a short median window and compared to the threshold.
//!
//! ```text
//! Uncalibrated --first sample--> Calibrating --N samples--> Calibrated
//!       ^                                                       |
//!       +------------------------- reset() ---------------------+
//! ```
//!
//! Frames without a face leave the state untouched.

use crate::{
    config::EyeConfig,
    constants::{EAR_HEIGHT_SPANS, EYE_CONTOUR_FAR_CORNER, EYE_CONTOUR_POINTS},
    filters::{create_filter, SmoothingFilter},
    landmarks::{FaceKeypoints, Keypoint},
    Result,
};
use log::{debug, info};
use serde::Serialize;
use std::fmt;

/// Horizontal extent of an eye contour
#[must_use]
pub fn eye_width(contour: &[Keypoint; EYE_CONTOUR_POINTS]) -> f64 {
    contour[0].distance(&contour[EYE_CONTOUR_FAR_CORNER])
}

/// Eye aspect ratio of a 16-point contour.
///
/// The contour runs from one corner along the lower lid to the far corner
/// (index 8) and back along the upper lid, so point `i + 1` faces point
/// `14 - i`. The height is the mean of four such spans; 0 for a
/// zero-width eye.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn eye_aspect_ratio(contour: &[Keypoint; EYE_CONTOUR_POINTS]) -> f64 {
    let width = eye_width(contour);
    if !(width > 0.0) {
        return 0.0;
    }
    let height = (0..EAR_HEIGHT_SPANS)
        .map(|i| contour[i + 1].distance(&contour[EYE_CONTOUR_POINTS - 2 - i]))
        .sum::<f64>()
        / EAR_HEIGHT_SPANS as f64;
    height / width
}

/// Per-eye EAR values for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EarPair {
    pub left: f64,
    pub right: f64,
}

impl EarPair {
    #[must_use]
    pub fn from_face(face: &FaceKeypoints) -> Self {
        Self {
            left: eye_aspect_ratio(&face.left_eye),
            right: eye_aspect_ratio(&face.right_eye),
        }
    }

    /// Both eyes had a measurable contour
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.left > 0.0 && self.right > 0.0
    }
}

/// Per-subject open-eye baseline and the threshold derived from it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBaseline {
    pub left_mean: f64,
    pub right_mean: f64,
    pub threshold: f64,
}

/// Calibration state machine
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationState {
    Uncalibrated,
    Calibrating { left_sum: f64, right_sum: f64, frames: usize },
    Calibrated(CalibrationBaseline),
}

/// Open/closed state of a single eye
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EyeState {
    Open,
    Closed,
}

/// Combined eye status for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EyeStatus {
    NoSubject,
    Calibrating,
    Open,
    LeftClosed,
    RightClosed,
    BothClosed,
}

impl EyeStatus {
    fn from_states(left: EyeState, right: EyeState) -> Self {
        match (left, right) {
            (EyeState::Closed, EyeState::Closed) => Self::BothClosed,
            (EyeState::Closed, EyeState::Open) => Self::LeftClosed,
            (EyeState::Open, EyeState::Closed) => Self::RightClosed,
            (EyeState::Open, EyeState::Open) => Self::Open,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NoSubject => "NO FACE DETECTED",
            Self::Calibrating => "CALIBRATING... KEEP EYES OPEN",
            Self::Open => "EYES OPEN",
            Self::LeftClosed => "LEFT EYE CLOSED",
            Self::RightClosed => "RIGHT EYE CLOSED",
            Self::BothClosed => "BOTH EYES CLOSED",
        }
    }
}

impl fmt::Display for EyeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Eye classification for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EyeReading {
    pub status: EyeStatus,
    /// Unsmoothed EAR, absent when no face was found
    pub raw_ear: Option<EarPair>,
    /// Smoothed EAR, present once calibrated
    pub smoothed_ear: Option<EarPair>,
    /// Set on the single frame that completed calibration
    pub calibration_complete: bool,
    /// Calibration samples collected so far (saturates at the target)
    pub calibration_frames: usize,
}

/// Stateful eye-openness classifier
pub struct EyeStateClassifier {
    calibration_frames: usize,
    threshold_scale: f64,
    state: CalibrationState,
    left_filter: Box<dyn SmoothingFilter>,
    right_filter: Box<dyn SmoothingFilter>,
}

impl EyeStateClassifier {
    /// Create a classifier in the `Uncalibrated` state
    ///
    /// # Errors
    ///
    /// Returns an error if the smoothing filter cannot be built
    pub fn new(config: &EyeConfig) -> Result<Self> {
        info!(
            "Initializing EyeStateClassifier: {} calibration frames, scale {}, {} window of {}",
            config.calibration_frames, config.threshold_scale, config.smoothing_filter, config.smoothing_window
        );
        Ok(Self {
            calibration_frames: config.calibration_frames.max(1),
            threshold_scale: config.threshold_scale,
            state: CalibrationState::Uncalibrated,
            left_filter: create_filter(&config.smoothing_filter, config.smoothing_window)?,
            right_filter: create_filter(&config.smoothing_filter, config.smoothing_window)?,
        })
    }

    #[must_use]
    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, CalibrationState::Calibrated(_))
    }

    #[must_use]
    pub fn baseline(&self) -> Option<&CalibrationBaseline> {
        match &self.state {
            CalibrationState::Calibrated(baseline) => Some(baseline),
            _ => None,
        }
    }

    /// Closed-eye threshold, `None` until calibrated
    #[must_use]
    pub fn threshold(&self) -> Option<f64> {
        self.baseline().map(|b| b.threshold)
    }

    /// Samples currently held by each eye's smoothing buffer
    #[must_use]
    pub fn buffered_samples(&self) -> (usize, usize) {
        (self.left_filter.len(), self.right_filter.len())
    }

    /// Return to `Uncalibrated`, discarding the baseline and smoothing history
    pub fn reset(&mut self) {
        info!("Eye-state calibration reset");
        self.state = CalibrationState::Uncalibrated;
        self.left_filter.reset();
        self.right_filter.reset();
    }

    /// Classify one frame's face keypoints
    pub fn analyze(&mut self, face: Option<&FaceKeypoints>) -> EyeReading {
        match face {
            Some(face) => self.update(EarPair::from_face(face)),
            None => EyeReading {
                status: EyeStatus::NoSubject,
                raw_ear: None,
                smoothed_ear: None,
                calibration_complete: false,
                calibration_frames: self.collected_frames(),
            },
        }
    }

    /// Feed one frame's raw EAR values
    pub fn update(&mut self, raw: EarPair) -> EyeReading {
        let calibration_complete = self.calibrate(raw);

        let Some(threshold) = self.threshold() else {
            return EyeReading {
                status: EyeStatus::Calibrating,
                raw_ear: Some(raw),
                smoothed_ear: None,
                calibration_complete: false,
                calibration_frames: self.collected_frames(),
            };
        };

        let smoothed = EarPair {
            left: self.left_filter.apply(raw.left),
            right: self.right_filter.apply(raw.right),
        };
        let classify = |ear: f64| if ear < threshold { EyeState::Closed } else { EyeState::Open };
        let status = EyeStatus::from_states(classify(smoothed.left), classify(smoothed.right));

        debug!(
            "EAR left {:.3} right {:.3} (threshold {threshold:.3}) -> {status}",
            smoothed.left, smoothed.right
        );

        EyeReading {
            status,
            raw_ear: Some(raw),
            smoothed_ear: Some(smoothed),
            calibration_complete,
            calibration_frames: self.calibration_frames,
        }
    }

    /// Accumulate a calibration sample; returns true on the completing frame
    #[allow(clippy::cast_precision_loss)]
    fn calibrate(&mut self, raw: EarPair) -> bool {
        let (left_sum, right_sum, frames) = match self.state {
            CalibrationState::Calibrated(_) => return false,
            CalibrationState::Uncalibrated => (raw.left, raw.right, 1),
            CalibrationState::Calibrating {
                left_sum,
                right_sum,
                frames,
            } => (left_sum + raw.left, right_sum + raw.right, frames + 1),
        };

        if frames < self.calibration_frames {
            self.state = CalibrationState::Calibrating {
                left_sum,
                right_sum,
                frames,
            };
            return false;
        }

        let left_mean = left_sum / frames as f64;
        let right_mean = right_sum / frames as f64;
        let threshold = self.threshold_scale * left_mean.min(right_mean);
        info!(
            "Eye calibration complete after {frames} frames: baseline left {left_mean:.3} right {right_mean:.3}, threshold {threshold:.3}"
        );
        self.state = CalibrationState::Calibrated(CalibrationBaseline {
            left_mean,
            right_mean,
            threshold,
        });
        true
    }

    fn collected_frames(&self) -> usize {
        match self.state {
            CalibrationState::Uncalibrated => 0,
            CalibrationState::Calibrating { frames, .. } => frames,
            CalibrationState::Calibrated(_) => self.calibration_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(calibration_frames: usize) -> EyeStateClassifier {
        EyeStateClassifier::new(&EyeConfig {
            calibration_frames,
            ..EyeConfig::default()
        })
        .unwrap()
    }

    fn ears(left: f64, right: f64) -> EarPair {
        EarPair { left, right }
    }

    /// Box-shaped eye contour centered at (cx, cy) whose paired lid points
    /// are exactly `height` apart
    #[allow(clippy::cast_precision_loss)]
    fn contour(cx: f64, cy: f64, width: f64, height: f64) -> [Keypoint; 16] {
        let x = |i: usize| cx - width / 2.0 + width * i as f64 / 8.0;
        let mut points = [Keypoint::new(cx, cy); 16];
        points[0] = Keypoint::new(x(0), cy);
        points[8] = Keypoint::new(x(8), cy);
        for i in 1..8 {
            points[i] = Keypoint::new(x(i), cy + height / 2.0);
        }
        for u in 9..16 {
            points[u] = Keypoint::new(x(15 - u), cy - height / 2.0);
        }
        points
    }

    #[test]
    fn test_eye_aspect_ratio() {
        let eye = contour(0.4, 0.4, 0.1, 0.03);
        assert!((eye_aspect_ratio(&eye) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_zero_width_eye() {
        let eye = [Keypoint::new(0.5, 0.5); 16];
        assert_eq!(eye_aspect_ratio(&eye), 0.0);
        assert!(!EarPair { left: 0.0, right: 0.3 }.is_valid());
    }

    #[test]
    fn test_stays_calibrating_before_target() {
        let mut eyes = classifier(30);
        assert_eq!(eyes.state(), &CalibrationState::Uncalibrated);

        for k in 1..30 {
            let reading = eyes.update(ears(0.3, 0.3));
            assert_eq!(reading.status, EyeStatus::Calibrating);
            assert_eq!(reading.calibration_frames, k);
            assert!(eyes.threshold().is_none());
        }
        assert!(matches!(eyes.state(), CalibrationState::Calibrating { frames: 29, .. }));
    }

    #[test]
    fn test_threshold_uses_smaller_mean() {
        let mut eyes = classifier(4);
        for (l, r) in [(0.30, 0.20), (0.34, 0.24), (0.32, 0.22), (0.32, 0.22)] {
            eyes.update(ears(l, r));
        }
        let baseline = eyes.baseline().unwrap();
        assert!((baseline.left_mean - 0.32).abs() < 1e-12);
        assert!((baseline.right_mean - 0.22).abs() < 1e-12);
        assert!((baseline.threshold - 0.165).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_complete_flag_fires_once() {
        let mut eyes = classifier(3);
        let flags: Vec<bool> = (0..6)
            .map(|_| eyes.update(ears(0.3, 0.3)).calibration_complete)
            .collect();
        assert_eq!(flags, vec![false, false, true, false, false, false]);
    }

    #[test]
    fn test_baseline_not_overwritten() {
        let mut eyes = classifier(2);
        eyes.update(ears(0.3, 0.3));
        eyes.update(ears(0.3, 0.3));
        let threshold = eyes.threshold().unwrap();

        for _ in 0..50 {
            eyes.update(ears(0.9, 0.9));
        }
        assert_eq!(eyes.threshold(), Some(threshold));
    }

    #[test]
    fn test_single_eye_closed() {
        let mut eyes = classifier(1);
        eyes.update(ears(0.3, 0.3));
        for _ in 0..5 {
            eyes.update(ears(0.05, 0.3));
        }
        assert_eq!(eyes.update(ears(0.05, 0.3)).status, EyeStatus::LeftClosed);

        eyes.reset();
        eyes.update(ears(0.3, 0.3));
        for _ in 0..5 {
            eyes.update(ears(0.3, 0.05));
        }
        assert_eq!(eyes.update(ears(0.3, 0.05)).status, EyeStatus::RightClosed);
    }

    #[test]
    fn test_single_frame_blink_is_smoothed_out() {
        let mut eyes = classifier(1);
        eyes.update(ears(0.3, 0.3));
        eyes.update(ears(0.3, 0.3));
        eyes.update(ears(0.3, 0.3));

        let reading = eyes.update(ears(0.01, 0.01));
        assert_eq!(reading.status, EyeStatus::Open);
    }

    #[test]
    fn test_smoothing_buffer_bounded() {
        let mut eyes = classifier(1);
        for _ in 0..100 {
            eyes.update(ears(0.3, 0.3));
        }
        assert_eq!(eyes.buffered_samples(), (5, 5));
    }

    #[test]
    fn test_missing_face_keeps_progress() {
        let mut eyes = classifier(5);
        eyes.update(ears(0.3, 0.3));
        eyes.update(ears(0.3, 0.3));

        let reading = eyes.analyze(None);
        assert_eq!(reading.status, EyeStatus::NoSubject);
        assert_eq!(reading.calibration_frames, 2);
        assert!(matches!(eyes.state(), CalibrationState::Calibrating { frames: 2, .. }));
    }

    #[test]
    fn test_reset_returns_to_uncalibrated() {
        let mut eyes = classifier(1);
        eyes.update(ears(0.3, 0.3));
        assert!(eyes.is_calibrated());

        eyes.reset();
        assert_eq!(eyes.state(), &CalibrationState::Uncalibrated);
        assert_eq!(eyes.buffered_samples(), (0, 0));
    }

    #[test]
    fn test_analyze_face_keypoints() {
        let mut eyes = classifier(1);
        let face = FaceKeypoints::new(contour(0.6, 0.4, 0.1, 0.03), contour(0.4, 0.4, 0.1, 0.02));
        let reading = eyes.analyze(Some(&face));
        let raw = reading.raw_ear.unwrap();
        assert!((raw.left - 0.3).abs() < 1e-9);
        assert!((raw.right - 0.2).abs() < 1e-9);
        assert!((eyes.threshold().unwrap() - 0.15).abs() < 1e-9);
    }
}
