//! Keypoint types and the landmark-source boundary.
//!
//! Landmark models are consumed as an opaque capability: given an image they
//! return at most one subject's named keypoints, normalized to `[0, 1]` of
//! the frame width and height. Everything downstream works on these types.

use crate::{constants::REFERENCE_FRAME_WIDTH, Error, Result};
use serde::{Deserialize, Serialize};

/// MediaPipe face-mesh indices of the subject's left eye contour
pub const LEFT_EYE_MESH_INDICES: [usize; 16] = [
    362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398,
];

/// MediaPipe face-mesh indices of the subject's right eye contour
pub const RIGHT_EYE_MESH_INDICES: [usize; 16] = [
    33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246,
];

/// MediaPipe pose landmark indices
pub mod pose_indices {
    pub const NOSE: usize = 0;
    pub const LEFT_EAR: usize = 7;
    pub const RIGHT_EAR: usize = 8;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
}

/// A named 2-D landmark in normalized frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    /// Depth-like coordinate reported by some models; never used for classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Keypoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    #[must_use]
    pub const fn with_depth(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// Euclidean distance in normalized space
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Scale both coordinates into pixel space
    #[must_use]
    pub fn scaled(&self, scale_x: f64, scale_y: f64) -> (f64, f64) {
        (self.x * scale_x, self.y * scale_y)
    }
}

/// Pixel dimensions of the frame being analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Ratio of this frame's width to the width thresholds were tuned at
    #[must_use]
    pub fn dimension_factor(&self, reference_width: f64) -> f64 {
        f64::from(self.width) / reference_width
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        // Truncation is exact: the reference width is a whole number of pixels
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let width = REFERENCE_FRAME_WIDTH as u32;
        Self::new(width, crate::constants::DEFAULT_FRAME_HEIGHT)
    }
}

/// Face keypoints needed by the eye-state and distance classifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceKeypoints {
    /// Subject's left eye contour, starting at the outer corner
    pub left_eye: [Keypoint; 16],
    /// Subject's right eye contour, starting at the outer corner
    pub right_eye: [Keypoint; 16],
}

impl FaceKeypoints {
    #[must_use]
    pub fn new(left_eye: [Keypoint; 16], right_eye: [Keypoint; 16]) -> Self {
        Self { left_eye, right_eye }
    }

    /// Build from a full MediaPipe face mesh (468 or 478 landmarks)
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh is too short to contain both eye contours
    pub fn from_mesh(mesh: &[Keypoint]) -> Result<Self> {
        Ok(Self {
            left_eye: pick(mesh, &LEFT_EYE_MESH_INDICES)?,
            right_eye: pick(mesh, &RIGHT_EYE_MESH_INDICES)?,
        })
    }

    /// Outer corner of the subject's left eye (mesh landmark 263)
    #[must_use]
    pub fn left_eye_outer(&self) -> Keypoint {
        self.left_eye[crate::constants::EYE_CONTOUR_FAR_CORNER]
    }

    /// Outer corner of the subject's right eye (mesh landmark 33)
    #[must_use]
    pub fn right_eye_outer(&self) -> Keypoint {
        self.right_eye[0]
    }
}

fn pick(mesh: &[Keypoint], indices: &[usize; 16]) -> Result<[Keypoint; 16]> {
    let mut points = [Keypoint::new(0.0, 0.0); 16];
    for (slot, &index) in points.iter_mut().zip(indices) {
        *slot = *mesh.get(index).ok_or_else(|| {
            Error::InvalidInput(format!(
                "Face mesh has {} landmarks, index {index} required",
                mesh.len()
            ))
        })?;
    }
    Ok(points)
}

/// Upper-body keypoints needed by the posture classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseKeypoints {
    pub nose: Keypoint,
    pub left_ear: Keypoint,
    pub right_ear: Keypoint,
    pub left_shoulder: Keypoint,
    pub right_shoulder: Keypoint,
}

impl PoseKeypoints {
    /// Build from a full MediaPipe pose landmark list (33 landmarks)
    ///
    /// # Errors
    ///
    /// Returns an error if the list is too short
    pub fn from_pose_landmarks(landmarks: &[Keypoint]) -> Result<Self> {
        let get = |index: usize| {
            landmarks.get(index).copied().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Pose has {} landmarks, index {index} required",
                    landmarks.len()
                ))
            })
        };
        Ok(Self {
            nose: get(pose_indices::NOSE)?,
            left_ear: get(pose_indices::LEFT_EAR)?,
            right_ear: get(pose_indices::RIGHT_EAR)?,
            left_shoulder: get(pose_indices::LEFT_SHOULDER)?,
            right_shoulder: get(pose_indices::RIGHT_SHOULDER)?,
        })
    }
}

/// Opaque face/pose landmark capability.
///
/// `Ok(None)` means nothing was found in the image. Errors that are
/// [recoverable](Error::is_recoverable) only cost the current frame; any other
/// error stops the run.
pub trait LandmarkSource {
    /// Image type the models consume
    type Image;

    /// Find the subject's face keypoints
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails
    fn detect_face(&mut self, image: &Self::Image) -> Result<Option<FaceKeypoints>>;

    /// Find the subject's upper-body pose keypoints
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails
    fn detect_pose(&mut self, image: &Self::Image) -> Result<Option<PoseKeypoints>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypoint_distance() {
        let a = Keypoint::new(0.0, 0.0);
        let b = Keypoint::with_depth(0.3, 0.4, -0.1);
        assert!((a.distance(&b) - 0.5).abs() < 1e-12);
        assert_eq!(b.scaled(640.0, 480.0), (192.0, 192.0));
    }

    #[test]
    fn test_dimension_factor() {
        assert_eq!(FrameGeometry::new(640, 480).dimension_factor(640.0), 1.0);
        assert_eq!(FrameGeometry::new(1280, 720).dimension_factor(640.0), 2.0);
        assert_eq!(FrameGeometry::default(), FrameGeometry::new(640, 480));
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_face_from_mesh() {
        let mesh: Vec<Keypoint> = (0..468).map(|i| Keypoint::new(i as f64, 0.0)).collect();
        let face = FaceKeypoints::from_mesh(&mesh).unwrap();

        assert_eq!(face.left_eye[0].x, 362.0);
        assert_eq!(face.right_eye[15].x, 246.0);
        assert_eq!(face.left_eye_outer().x, 263.0);
        assert_eq!(face.right_eye_outer().x, 33.0);
    }

    #[test]
    fn test_face_from_short_mesh() {
        let mesh = vec![Keypoint::new(0.0, 0.0); 100];
        assert!(matches!(FaceKeypoints::from_mesh(&mesh), Err(Error::InvalidInput(_))));
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_pose_from_landmarks() {
        let landmarks: Vec<Keypoint> = (0..33).map(|i| Keypoint::new(i as f64, i as f64)).collect();
        let pose = PoseKeypoints::from_pose_landmarks(&landmarks).unwrap();
        assert_eq!(pose.nose.x, 0.0);
        assert_eq!(pose.right_ear.x, 8.0);
        assert_eq!(pose.right_shoulder.y, 12.0);

        assert!(PoseKeypoints::from_pose_landmarks(&landmarks[..10]).is_err());
    }

    #[test]
    fn test_keypoint_serde_omits_missing_depth() {
        let json = serde_json::to_string(&Keypoint::new(0.5, 0.25)).unwrap();
        assert_eq!(json, r#"{"x":0.5,"y":0.25}"#);
        let back: Keypoint = serde_json::from_str(r#"{"x":0.5,"y":0.25,"z":0.1}"#).unwrap();
        assert_eq!(back.z, Some(0.1));
    }
}
