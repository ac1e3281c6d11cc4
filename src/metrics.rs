//! Sliding-window performance metrics.
//!
//! Tracks per-operation latencies over a bounded window, cumulative detection
//! success counters, and a frames-per-second history sampled once per
//! elapsed second. Updates are O(1); summaries are O(window) and never mutate
//! the aggregator.

use crate::{config::MetricsConfig, constants::MILLIS_PER_SECOND, window::SlidingWindow};
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

const FPS_INTERVAL: Duration = Duration::from_secs(1);

/// Timed operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Whole frame, landmark detection included
    Total,
    EyeTracking,
    Posture,
    Distance,
    /// Face landmark model latency
    FaceMesh,
    /// Pose landmark model latency
    Pose,
}

impl Operation {
    pub const ALL: [Self; 6] = [
        Self::Total,
        Self::EyeTracking,
        Self::Posture,
        Self::Distance,
        Self::FaceMesh,
        Self::Pose,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::EyeTracking => "eye_tracking",
            Self::Posture => "posture",
            Self::Distance => "distance",
            Self::FaceMesh => "face_mesh",
            Self::Pose => "pose",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detection types with success-rate tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    Face,
    Pose,
    Eyes,
}

impl DetectionKind {
    pub const ALL: [Self; 3] = [Self::Face, Self::Pose, Self::Eyes];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Pose => "pose",
            Self::Eyes => "eyes",
        }
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque start marker returned by [`PerformanceMetrics::begin`]
#[derive(Debug, Clone, Copy)]
#[must_use = "pass the token to `end` to record the duration"]
pub struct OperationToken {
    started: Option<Instant>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DetectionCounter {
    success: u64,
    total: u64,
}

impl DetectionCounter {
    #[allow(clippy::cast_precision_loss)]
    fn rate(self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64 * 100.0
        }
    }
}

/// Point-in-time view of the aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// Mean of the recent one-second FPS samples
    pub fps: f64,
    /// Mean latency per operation in milliseconds
    pub latencies_ms: BTreeMap<Operation, f64>,
    /// Success percentage per detection type
    pub detection_rates: BTreeMap<DetectionKind, f64>,
}

/// Performance metrics aggregator
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    detailed: bool,
    window_size: usize,
    fps_capacity: usize,
    latencies: BTreeMap<Operation, SlidingWindow>,
    detections: BTreeMap<DetectionKind, DetectionCounter>,
    fps_history: SlidingWindow,
    interval_frames: u64,
    interval_start: Instant,
    frames_seen: u64,
}

impl PerformanceMetrics {
    /// Create an aggregator.
    ///
    /// With `detailed` off only FPS is tracked; timing and detection calls
    /// become no-ops.
    ///
    /// # Panics
    ///
    /// Panics if a window size in `config` is 0
    #[must_use]
    pub fn new(config: &MetricsConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Create an aggregator whose first FPS interval starts at `now`
    #[must_use]
    pub fn starting_at(config: &MetricsConfig, now: Instant) -> Self {
        let latencies = if config.detailed {
            Operation::ALL
                .iter()
                .map(|op| (*op, SlidingWindow::new(config.window_size)))
                .collect()
        } else {
            BTreeMap::new()
        };
        let detections = if config.detailed {
            DetectionKind::ALL
                .iter()
                .map(|kind| (*kind, DetectionCounter::default()))
                .collect()
        } else {
            BTreeMap::new()
        };

        Self {
            detailed: config.detailed,
            window_size: config.window_size,
            fps_capacity: config.fps_history,
            latencies,
            detections,
            fps_history: SlidingWindow::new(config.fps_history),
            interval_frames: 0,
            interval_start: now,
            frames_seen: 0,
        }
    }

    #[must_use]
    pub fn is_detailed(&self) -> bool {
        self.detailed
    }

    /// Frames passed to [`fps_tick`](Self::fps_tick) so far
    #[must_use]
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Start timing an operation
    pub fn begin(&self, _operation: Operation) -> OperationToken {
        OperationToken {
            started: self.detailed.then(Instant::now),
        }
    }

    /// Finish timing an operation and record its duration
    pub fn end(&mut self, token: OperationToken, operation: Operation) -> Option<Duration> {
        self.end_at(token, operation, Instant::now())
    }

    /// [`end`](Self::end) with an explicit clock reading
    pub fn end_at(&mut self, token: OperationToken, operation: Operation, now: Instant) -> Option<Duration> {
        let duration = now.saturating_duration_since(token.started?);
        self.record_duration(operation, duration);
        Some(duration)
    }

    /// Record a duration measured elsewhere
    pub fn record_duration(&mut self, operation: Operation, duration: Duration) {
        if let Some(window) = self.latencies.get_mut(&operation) {
            window.push(duration.as_secs_f64());
        }
    }

    /// Count one detection attempt
    pub fn record_detection(&mut self, kind: DetectionKind, success: bool) {
        if let Some(counter) = self.detections.get_mut(&kind) {
            counter.total += 1;
            if success {
                counter.success += 1;
            }
        }
    }

    /// Register a processed frame.
    ///
    /// Returns the FPS of the interval that just completed, or `None` while the
    /// current one-second interval is still open.
    pub fn fps_tick(&mut self) -> Option<f64> {
        self.fps_tick_at(Instant::now())
    }

    /// [`fps_tick`](Self::fps_tick) with an explicit clock reading
    #[allow(clippy::cast_precision_loss)]
    pub fn fps_tick_at(&mut self, now: Instant) -> Option<f64> {
        self.frames_seen += 1;
        self.interval_frames += 1;

        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < FPS_INTERVAL {
            return None;
        }

        let fps = self.interval_frames as f64 / elapsed.as_secs_f64();
        self.fps_history.push(fps);
        self.interval_frames = 0;
        self.interval_start = now;
        Some(fps)
    }

    /// Mean latency per operation in milliseconds (0 for operations with no samples)
    #[must_use]
    pub fn average_latencies(&self) -> BTreeMap<Operation, f64> {
        self.latencies
            .iter()
            .map(|(op, window)| (*op, window.mean().unwrap_or(0.0) * MILLIS_PER_SECOND))
            .collect()
    }

    /// Success percentage per detection type (0 when nothing was attempted)
    #[must_use]
    pub fn detection_rates(&self) -> BTreeMap<DetectionKind, f64> {
        self.detections
            .iter()
            .map(|(kind, counter)| (*kind, counter.rate()))
            .collect()
    }

    /// Rolling FPS over the recent one-second samples
    #[must_use]
    pub fn average_fps(&self) -> f64 {
        self.fps_history.mean().unwrap_or(0.0)
    }

    /// Samples currently held for an operation
    #[must_use]
    pub fn window_len(&self, operation: Operation) -> usize {
        self.latencies.get(&operation).map_or(0, SlidingWindow::len)
    }

    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            fps: self.average_fps(),
            latencies_ms: self.average_latencies(),
            detection_rates: self.detection_rates(),
        }
    }

    /// Write the current summary to the log
    pub fn log_summary(&self) {
        let summary = self.summary();
        info!("Performance Metrics Summary:");
        info!("FPS: {:.1}", summary.fps);

        if self.detailed {
            info!("Processing Latencies (ms):");
            for (op, latency) in &summary.latencies_ms {
                info!("  {op}: {latency:.1}ms");
            }
            info!("Detection Success Rates (%):");
            for (kind, rate) in &summary.detection_rates {
                info!("  {kind}: {rate:.1}%");
            }
        }
    }

    /// Drop all samples and counters
    pub fn reset(&mut self) {
        let config = MetricsConfig {
            detailed: self.detailed,
            window_size: self.window_size,
            fps_history: self.fps_capacity,
            log_interval: 0,
        };
        *self = Self::new(&config);
    }
}
