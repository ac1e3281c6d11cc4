//! Posture classification from upper-body keypoints.
//!
//! Checks run in a fixed order and the first violated one wins: head tilt,
//! then forward lean, then uneven shoulders. Simultaneous violations are not
//! reported together.

use crate::{
    config::PostureConfig,
    landmarks::{FrameGeometry, PoseKeypoints},
};
use log::{debug, info};
use serde::Serialize;
use std::fmt;

/// Posture label for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostureStatus {
    NoPose,
    HeadTilted,
    LeaningForward,
    UnevenShoulders,
    GoodPosture,
}

impl PostureStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NoPose => "NO POSE",
            Self::HeadTilted => "HEAD TILTED",
            Self::LeaningForward => "LEANING FORWARD",
            Self::UnevenShoulders => "UNEVEN SHOULDERS",
            Self::GoodPosture => "GOOD POSTURE",
        }
    }
}

impl fmt::Display for PostureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Posture label plus the raw deviations it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PostureReading {
    pub status: PostureStatus,
    /// `|mean(ear.x) - nose.x|`
    pub vertical_diff: f64,
    /// `mean(ear.y) - nose.y`
    pub horizontal_diff: f64,
    /// `|left_shoulder.y - right_shoulder.y|`
    pub shoulder_diff: f64,
}

impl PostureReading {
    fn no_pose() -> Self {
        Self {
            status: PostureStatus::NoPose,
            vertical_diff: 0.0,
            horizontal_diff: 0.0,
            shoulder_diff: 0.0,
        }
    }
}

/// Stateless posture classifier
#[derive(Debug, Clone)]
pub struct PostureAnalyzer {
    config: PostureConfig,
}

impl PostureAnalyzer {
    #[must_use]
    pub fn new(config: &PostureConfig) -> Self {
        info!(
            "Initializing PostureAnalyzer: tilt {}, lean {}, shoulders {} at {}px",
            config.head_tilt_threshold,
            config.lean_forward_threshold,
            config.shoulder_diff_threshold,
            config.reference_width
        );
        Self { config: config.clone() }
    }

    /// Classify the subject's posture for one frame
    #[must_use]
    pub fn analyze(&self, pose: Option<&PoseKeypoints>, geometry: FrameGeometry) -> PostureReading {
        let Some(pose) = pose else {
            return PostureReading::no_pose();
        };

        let ear_x = (pose.left_ear.x + pose.right_ear.x) / 2.0;
        let ear_y = (pose.left_ear.y + pose.right_ear.y) / 2.0;

        let vertical_diff = (ear_x - pose.nose.x).abs();
        let horizontal_diff = ear_y - pose.nose.y;
        let shoulder_diff = (pose.left_shoulder.y - pose.right_shoulder.y).abs();

        let factor = geometry.dimension_factor(self.config.reference_width);

        let status = if vertical_diff > self.config.head_tilt_threshold * factor {
            PostureStatus::HeadTilted
        } else if horizontal_diff > self.config.lean_forward_threshold * factor {
            PostureStatus::LeaningForward
        } else if shoulder_diff > self.config.shoulder_diff_threshold * factor {
            PostureStatus::UnevenShoulders
        } else {
            PostureStatus::GoodPosture
        };

        debug!(
            "Posture {status}: vertical {vertical_diff:.4}, horizontal {horizontal_diff:.4}, shoulders {shoulder_diff:.4}"
        );

        PostureReading {
            status,
            vertical_diff,
            horizontal_diff,
            shoulder_diff,
        }
    }
}
