//! Configuration management for the eye/posture monitor

use crate::{constants::*, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Eye-state calibration and smoothing
    pub eye: EyeConfig,

    /// Camera distance estimation
    pub distance: DistanceConfig,

    /// Posture thresholds
    pub posture: PostureConfig,

    /// Performance metrics collection
    pub metrics: MetricsConfig,

    /// Camera specification and connection
    pub camera: CameraConfig,

    /// Frame loop behavior
    pub pipeline: PipelineConfig,
}

/// Eye-state classifier parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeConfig {
    /// Valid frames averaged into the per-subject baseline
    pub calibration_frames: usize,

    /// Closed-eye threshold as a fraction of the smaller baseline EAR
    pub threshold_scale: f64,

    /// Samples held by each eye's smoothing buffer
    pub smoothing_window: usize,

    /// Smoothing filter type ("median" or "moving_average")
    pub smoothing_filter: String,
}

/// Distance estimation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Real-world span of the measured facial feature
    pub known_width_cm: f64,

    /// Camera focal length; `None` leaves the estimator uncalibrated
    pub focal_length_px: Option<f64>,

    /// Closer than this is too close
    pub min_distance_cm: f64,

    /// Farther than this is too far
    pub max_distance_cm: f64,
}

/// Posture classifier thresholds, in normalized units at `reference_width`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureConfig {
    pub head_tilt_threshold: f64,
    pub lean_forward_threshold: f64,
    pub shoulder_diff_threshold: f64,

    /// Frame width the thresholds were tuned at
    pub reference_width: f64,
}

/// Metrics aggregator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Collect per-operation latencies and detection counters
    pub detailed: bool,

    /// Samples kept per operation
    pub window_size: usize,

    /// One-second FPS samples kept for the rolling average
    pub fps_history: usize,

    /// Log a summary every N frames (0 disables periodic logging)
    pub log_interval: u64,
}

/// Camera specification and connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Lens focal length in 35mm-equivalent millimeters
    pub focal_length_mm: f64,

    /// Sensor width in 35mm-equivalent millimeters
    pub sensor_width_mm: f64,

    /// Native image width in pixels
    pub image_width_px: f64,

    /// Connection attempts before giving up
    pub max_attempts: u32,

    /// Requested capture width
    pub frame_width: u32,

    /// Requested capture height
    pub frame_height: u32,
}

/// Frame loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Read the next frame on a separate thread while the current one is classified
    pub prefetch: bool,

    /// Frames buffered between the acquisition thread and the classifier
    pub prefetch_depth: usize,

    /// History kept by the benchmark recorder
    pub benchmark_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            eye: EyeConfig::default(),
            distance: DistanceConfig::default(),
            posture: PostureConfig::default(),
            metrics: MetricsConfig::default(),
            camera: CameraConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            calibration_frames: DEFAULT_CALIBRATION_FRAMES,
            threshold_scale: DEFAULT_EAR_THRESHOLD_SCALE,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            smoothing_filter: "median".to_string(),
        }
    }
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            known_width_cm: DEFAULT_KNOWN_FACE_WIDTH_CM,
            focal_length_px: Some(DEFAULT_FOCAL_LENGTH_PX),
            min_distance_cm: DEFAULT_MIN_DISTANCE_CM,
            max_distance_cm: DEFAULT_MAX_DISTANCE_CM,
        }
    }
}

impl Default for PostureConfig {
    fn default() -> Self {
        Self {
            head_tilt_threshold: DEFAULT_HEAD_TILT_THRESHOLD,
            lean_forward_threshold: DEFAULT_LEAN_FORWARD_THRESHOLD,
            shoulder_diff_threshold: DEFAULT_SHOULDER_DIFF_THRESHOLD,
            reference_width: REFERENCE_FRAME_WIDTH,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            detailed: true,
            window_size: DEFAULT_METRICS_WINDOW,
            fps_history: DEFAULT_METRICS_WINDOW,
            log_interval: DEFAULT_METRICS_LOG_INTERVAL,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            focal_length_mm: FOCAL_LENGTH_35MM,
            sensor_width_mm: SENSOR_WIDTH_35MM,
            image_width_px: IMAGE_WIDTH_PX,
            max_attempts: MAX_CAMERA_ATTEMPTS,
            frame_width: 640,
            frame_height: DEFAULT_FRAME_HEIGHT,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prefetch: false,
            prefetch_depth: DEFAULT_PREFETCH_DEPTH,
            benchmark_window: DEFAULT_BENCHMARK_WINDOW,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found
    pub fn validate(&self) -> Result<()> {
        if self.eye.calibration_frames == 0 {
            return Err(Error::ConfigError(
                "Calibration frame count must be greater than 0".to_string(),
            ));
        }
        if !(self.eye.threshold_scale > 0.0 && self.eye.threshold_scale <= 1.0) {
            return Err(Error::ConfigError(
                "EAR threshold scale must be in (0, 1]".to_string(),
            ));
        }
        if self.eye.smoothing_window == 0 {
            return Err(Error::ConfigError(
                "Smoothing window size must be greater than 0".to_string(),
            ));
        }
        crate::filters::create_filter(&self.eye.smoothing_filter, self.eye.smoothing_window)
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        if !(self.distance.known_width_cm.is_finite() && self.distance.known_width_cm > 0.0) {
            return Err(Error::ConfigError("Known width must be positive".to_string()));
        }
        if let Some(focal) = self.distance.focal_length_px {
            if !(focal.is_finite() && focal > 0.0) {
                return Err(Error::ConfigError("Focal length must be positive".to_string()));
            }
        }
        if !(self.distance.min_distance_cm.is_finite()
            && self.distance.max_distance_cm.is_finite()
            && self.distance.min_distance_cm <= self.distance.max_distance_cm)
        {
            return Err(Error::ConfigError(format!(
                "Invalid distance range {} to {}",
                self.distance.min_distance_cm, self.distance.max_distance_cm
            )));
        }

        if self.posture.reference_width <= 0.0 {
            return Err(Error::ConfigError(
                "Posture reference width must be positive".to_string(),
            ));
        }
        let thresholds = [
            self.posture.head_tilt_threshold,
            self.posture.lean_forward_threshold,
            self.posture.shoulder_diff_threshold,
        ];
        if thresholds.iter().any(|t| *t < 0.0) {
            return Err(Error::ConfigError(
                "Posture thresholds must be non-negative".to_string(),
            ));
        }

        if self.metrics.window_size == 0 || self.metrics.fps_history == 0 {
            return Err(Error::ConfigError(
                "Metrics window sizes must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.prefetch_depth == 0 || self.pipeline.benchmark_window == 0 {
            return Err(Error::ConfigError(
                "Prefetch depth and benchmark window must be greater than 0".to_string(),
            ));
        }
        if self.camera.sensor_width_mm <= 0.0 {
            return Err(Error::ConfigError("Sensor width must be positive".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Eye / posture monitor configuration

# Eye-state calibration and smoothing
eye:
  calibration_frames: 30
  threshold_scale: 0.75
  smoothing_window: 5
  smoothing_filter: "median"

# Camera distance estimation
distance:
  known_width_cm: 14.0
  focal_length_px: 251.837
  min_distance_cm: 145.0
  max_distance_cm: 155.0

# Posture thresholds (normalized units at reference_width)
posture:
  head_tilt_threshold: 0.005
  lean_forward_threshold: 0.005
  shoulder_diff_threshold: 0.01
  reference_width: 640.0

# Performance metrics
metrics:
  detailed: true
  window_size: 30
  fps_history: 30
  log_interval: 30

# Camera specification
camera:
  focal_length_mm: 35.0
  sensor_width_mm: 24.0
  image_width_px: 1932.0
  max_attempts: 3
  frame_width: 640
  frame_height: 480

# Frame loop
pipeline:
  prefetch: false
  prefetch_depth: 2
  benchmark_window: 100
"#;
