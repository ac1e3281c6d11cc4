//! Constants used throughout the application

/// Frame width (pixels) the posture thresholds were tuned against
pub const REFERENCE_FRAME_WIDTH: f64 = 640.0;

/// Default frame height for processing
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;

/// Eye-state calibration defaults
pub const DEFAULT_CALIBRATION_FRAMES: usize = 30;
pub const DEFAULT_EAR_THRESHOLD_SCALE: f64 = 0.75;
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

/// Number of contour points per eye
pub const EYE_CONTOUR_POINTS: usize = 16;

/// Index of the far corner in an eye contour (the near corner is index 0)
pub const EYE_CONTOUR_FAR_CORNER: usize = 8;

/// Number of vertical spans averaged into the eye height
pub const EAR_HEIGHT_SPANS: usize = 4;

/// Metrics window sizes
pub const DEFAULT_METRICS_WINDOW: usize = 30;
pub const DEFAULT_BENCHMARK_WINDOW: usize = 100;

/// Frames between periodic metrics log lines
pub const DEFAULT_METRICS_LOG_INTERVAL: u64 = 30;

/// Posture thresholds in normalized coordinates at the reference width
pub const DEFAULT_HEAD_TILT_THRESHOLD: f64 = 0.005;
pub const DEFAULT_LEAN_FORWARD_THRESHOLD: f64 = 0.005;
pub const DEFAULT_SHOULDER_DIFF_THRESHOLD: f64 = 0.01;

/// Distance estimation defaults
pub const DEFAULT_KNOWN_FACE_WIDTH_CM: f64 = 14.0;
pub const DEFAULT_MIN_DISTANCE_CM: f64 = 145.0;
pub const DEFAULT_MAX_DISTANCE_CM: f64 = 155.0;
pub const DEFAULT_FOCAL_LENGTH_PX: f64 = 251.837;

/// 35mm-format camera defaults
pub const FOCAL_LENGTH_35MM: f64 = 35.0;
pub const SENSOR_WIDTH_35MM: f64 = 24.0;
pub const IMAGE_WIDTH_PX: f64 = 1932.0;

/// Camera connection settings
pub const MAX_CAMERA_ATTEMPTS: u32 = 3;
pub const CAMERA_BUFFER_SIZE: f64 = 1.0;

/// Capacity of the acquisition prefetch channel
pub const DEFAULT_PREFETCH_DEPTH: usize = 2;

/// Milliseconds per second
pub const MILLIS_PER_SECOND: f64 = 1000.0;
