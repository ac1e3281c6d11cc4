//! Offline benchmark harness.
//!
//! [`PerformanceBenchmark`] keeps bounded histories of per-frame model,
//! real-time and system resource measurements. [`BenchmarkSink`] feeds it
//! from a running [`Pipeline`](crate::pipeline::Pipeline).

use crate::{
    constants::MILLIS_PER_SECOND,
    pipeline::{DetectionResult, ResultSink, RunStatistics},
    window::SlidingWindow,
    Error,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};

/// Minimum spacing between system resource samples
const SYSTEM_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Resource usage of this process at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SystemMetrics {
    /// Global CPU usage since the previous sample
    pub cpu_percent: f64,
    /// Resident memory of this process as a share of total memory
    pub memory_percent: f64,
    /// Bytes read from disk by this process since it started
    pub disk_read_bytes: u64,
    /// Bytes written to disk by this process since it started
    pub disk_written_bytes: u64,
}

/// Samples CPU, memory and disk I/O of the current process
pub struct ResourceMonitor {
    system: System,
    pid: Pid,
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor").field("pid", &self.pid).finish()
    }
}

impl ResourceMonitor {
    /// # Errors
    ///
    /// Returns `Fatal` if the current process id cannot be determined
    pub fn new() -> crate::Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| Error::Fatal(format!("Cannot monitor process: {e}")))?;
        let mut system = System::new();
        // CPU usage is a delta between refreshes, so take a baseline
        system.refresh_cpu();
        Ok(Self { system, pid })
    }

    /// Take a sample; CPU usage covers the time since the previous one
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&mut self) -> SystemMetrics {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.system.refresh_process(self.pid);

        let total_memory = self.system.total_memory();
        let (memory_percent, disk) = match self.system.process(self.pid) {
            Some(process) => (
                percentage(process.memory(), total_memory),
                process.disk_usage(),
            ),
            None => (0.0, sysinfo::DiskUsage::default()),
        };

        SystemMetrics {
            cpu_percent: f64::from(self.system.global_cpu_info().cpu_usage()),
            memory_percent,
            disk_read_bytes: disk.total_read_bytes,
            disk_written_bytes: disk.total_written_bytes,
        }
    }
}

/// Model quality for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelMetrics {
    pub inference_time_ms: f64,
    /// Percentages of all detections
    pub detection_accuracy: f64,
    pub false_positive_rate: f64,
    pub false_negative_rate: f64,
    pub calibration_error: f64,
}

/// Throughput health for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RealTimeMetrics {
    /// Percentage of frames dropped so far
    pub frame_drop_rate: f64,
    pub queue_length: usize,
    /// Percentage of the acquisition buffer in use
    pub buffer_utilization: f64,
    pub end_to_end_latency_ms: f64,
}

/// Means over the retained histories
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BenchmarkSummary {
    pub avg_inference_time_ms: f64,
    pub avg_detection_accuracy: f64,
    pub avg_false_positive_rate: f64,
    pub avg_false_negative_rate: f64,
    pub avg_calibration_error: f64,
    pub avg_frame_drop_rate: f64,
    pub avg_queue_length: f64,
    pub avg_buffer_utilization: f64,
    pub avg_end_to_end_latency_ms: f64,
    pub avg_cpu_percent: f64,
    pub avg_memory_percent: f64,
}

/// Detection counts against ground truth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionCounts {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

/// Acquisition queue occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueState {
    pub queue_length: usize,
    pub buffer_size: usize,
    pub buffer_used: usize,
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Sliding-window benchmark recorder
#[derive(Debug, Clone)]
pub struct PerformanceBenchmark {
    inference_time: SlidingWindow,
    accuracy: SlidingWindow,
    false_positive: SlidingWindow,
    false_negative: SlidingWindow,
    calibration_error: SlidingWindow,
    drop_rate: SlidingWindow,
    queue_length: SlidingWindow,
    buffer_utilization: SlidingWindow,
    latency: SlidingWindow,
    cpu: SlidingWindow,
    memory: SlidingWindow,
    last_system: Option<SystemMetrics>,
}

impl PerformanceBenchmark {
    /// # Panics
    ///
    /// Panics if `window_size` is zero
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            inference_time: SlidingWindow::new(window_size),
            accuracy: SlidingWindow::new(window_size),
            false_positive: SlidingWindow::new(window_size),
            false_negative: SlidingWindow::new(window_size),
            calibration_error: SlidingWindow::new(window_size),
            drop_rate: SlidingWindow::new(window_size),
            queue_length: SlidingWindow::new(window_size),
            buffer_utilization: SlidingWindow::new(window_size),
            latency: SlidingWindow::new(window_size),
            cpu: SlidingWindow::new(window_size),
            memory: SlidingWindow::new(window_size),
            last_system: None,
        }
    }

    /// Record model quality for one frame
    pub fn record_model(&mut self, inference_time_ms: f64, counts: DetectionCounts, calibration_error: f64) -> ModelMetrics {
        let total = counts.true_positives + counts.false_positives + counts.false_negatives;
        let metrics = ModelMetrics {
            inference_time_ms,
            detection_accuracy: percentage(counts.true_positives, total),
            false_positive_rate: percentage(counts.false_positives, total),
            false_negative_rate: percentage(counts.false_negatives, total),
            calibration_error,
        };

        self.inference_time.push(metrics.inference_time_ms);
        self.accuracy.push(metrics.detection_accuracy);
        self.false_positive.push(metrics.false_positive_rate);
        self.false_negative.push(metrics.false_negative_rate);
        self.calibration_error.push(metrics.calibration_error);
        metrics
    }

    /// Record throughput health for one frame
    #[allow(clippy::cast_precision_loss)]
    pub fn record_realtime(
        &mut self,
        total_frames: u64,
        dropped_frames: u64,
        queue: QueueState,
        end_to_end_latency_ms: f64,
    ) -> RealTimeMetrics {
        let metrics = RealTimeMetrics {
            frame_drop_rate: percentage(dropped_frames, total_frames),
            queue_length: queue.queue_length,
            buffer_utilization: percentage(queue.buffer_used as u64, queue.buffer_size as u64),
            end_to_end_latency_ms,
        };

        self.drop_rate.push(metrics.frame_drop_rate);
        self.queue_length.push(metrics.queue_length as f64);
        self.buffer_utilization.push(metrics.buffer_utilization);
        self.latency.push(metrics.end_to_end_latency_ms);
        metrics
    }

    /// Record one resource sample
    pub fn record_system(&mut self, metrics: SystemMetrics) {
        self.cpu.push(metrics.cpu_percent);
        self.memory.push(metrics.memory_percent);
        self.last_system = Some(metrics);
    }

    /// Sample the monitor and record the result
    pub fn measure_system_resources(&mut self, monitor: &mut ResourceMonitor) -> SystemMetrics {
        let metrics = monitor.sample();
        self.record_system(metrics);
        metrics
    }

    /// Most recent resource sample
    #[must_use]
    pub fn last_system(&self) -> Option<SystemMetrics> {
        self.last_system
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inference_time.is_empty() && self.latency.is_empty() && self.cpu.is_empty()
    }

    /// Means of everything recorded, `None` before the first record
    #[must_use]
    pub fn summary(&self) -> Option<BenchmarkSummary> {
        if self.is_empty() {
            return None;
        }
        let mean = |w: &SlidingWindow| w.mean().unwrap_or(0.0);
        Some(BenchmarkSummary {
            avg_inference_time_ms: mean(&self.inference_time),
            avg_detection_accuracy: mean(&self.accuracy),
            avg_false_positive_rate: mean(&self.false_positive),
            avg_false_negative_rate: mean(&self.false_negative),
            avg_calibration_error: mean(&self.calibration_error),
            avg_frame_drop_rate: mean(&self.drop_rate),
            avg_queue_length: mean(&self.queue_length),
            avg_buffer_utilization: mean(&self.buffer_utilization),
            avg_end_to_end_latency_ms: mean(&self.latency),
            avg_cpu_percent: mean(&self.cpu),
            avg_memory_percent: mean(&self.memory),
        })
    }

    pub fn log_summary(&self) {
        let Some(summary) = self.summary() else {
            warn!("No performance metrics available to summarize");
            return;
        };

        info!("Performance Summary:");
        info!("Model Performance:");
        info!("  Inference Time: {:.2}ms", summary.avg_inference_time_ms);
        info!("  Detection Accuracy: {:.1}%", summary.avg_detection_accuracy);
        info!("  False Positive Rate: {:.1}%", summary.avg_false_positive_rate);
        info!("  False Negative Rate: {:.1}%", summary.avg_false_negative_rate);
        info!("  Calibration Error: {:.2}", summary.avg_calibration_error);
        info!("Real-time Performance:");
        info!("  Frame Drop Rate: {:.1}%", summary.avg_frame_drop_rate);
        info!("  Avg Queue Length: {:.1}", summary.avg_queue_length);
        info!("  Buffer Utilization: {:.1}%", summary.avg_buffer_utilization);
        info!("  End-to-end Latency: {:.2}ms", summary.avg_end_to_end_latency_ms);
        info!("System Resources:");
        info!("  CPU Usage: {:.1}%", summary.avg_cpu_percent);
        info!("  Memory Usage: {:.1}%", summary.avg_memory_percent);
        if let Some(last) = self.last_system {
            info!(
                "  Disk I/O: {} bytes read, {} bytes written",
                last.disk_read_bytes, last.disk_written_bytes
            );
        }
    }
}

/// Result sink that benchmarks a pipeline run.
///
/// Without ground truth a frame with a face counts as a true positive and a
/// frame without one as a false negative. System resources are sampled at
/// most once per second.
#[derive(Debug)]
pub struct BenchmarkSink {
    benchmark: PerformanceBenchmark,
    monitor: Option<ResourceMonitor>,
    last_system_sample: Option<Instant>,
    calibration_error: f64,
    processed: u64,
    dropped: u64,
    last_mark: Instant,
    statistics: Option<RunStatistics>,
}

impl BenchmarkSink {
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        let monitor = match ResourceMonitor::new() {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                warn!("System resource monitoring disabled: {e}");
                None
            }
        };
        Self {
            benchmark: PerformanceBenchmark::new(window_size),
            monitor,
            last_system_sample: None,
            calibration_error: 0.0,
            processed: 0,
            dropped: 0,
            last_mark: Instant::now(),
            statistics: None,
        }
    }

    /// Stop sampling system resources
    #[must_use]
    pub fn without_system_monitor(mut self) -> Self {
        self.monitor = None;
        self
    }

    /// Calibration error reported for every frame (known from a reference measurement)
    #[must_use]
    pub fn with_calibration_error(mut self, calibration_error: f64) -> Self {
        self.calibration_error = calibration_error;
        self
    }

    #[must_use]
    pub fn benchmark(&self) -> &PerformanceBenchmark {
        &self.benchmark
    }

    /// Run statistics, once the run has completed
    #[must_use]
    pub fn statistics(&self) -> Option<&RunStatistics> {
        self.statistics.as_ref()
    }

    pub fn log_summary(&self) {
        self.benchmark.log_summary();
        if let Some(stats) = &self.statistics {
            info!("Total Time: {:.2}s", stats.total_time);
            info!(
                "Frames: {} total, {} processed, {} dropped",
                stats.total_frames, stats.processed_frames, stats.dropped_frames
            );
            info!("Average FPS: {:.1}", stats.average_fps);
        }
    }
}

impl ResultSink for BenchmarkSink {
    fn on_result(&mut self, result: &DetectionResult) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_mark).as_secs_f64() * MILLIS_PER_SECOND;
        self.last_mark = now;
        self.processed += 1;

        let counts = if result.face.is_some() {
            DetectionCounts {
                true_positives: 1,
                ..DetectionCounts::default()
            }
        } else {
            DetectionCounts {
                false_negatives: 1,
                ..DetectionCounts::default()
            }
        };

        self.benchmark
            .record_model(result.frame_time_ms, counts, self.calibration_error);
        self.benchmark.record_realtime(
            self.processed + self.dropped,
            self.dropped,
            QueueState {
                queue_length: 0,
                buffer_size: 1,
                buffer_used: 1,
            },
            elapsed_ms,
        );

        if let Some(monitor) = self.monitor.as_mut() {
            let due = self
                .last_system_sample
                .map_or(true, |at| now.duration_since(at) >= SYSTEM_SAMPLE_INTERVAL);
            if due {
                let system = self.benchmark.measure_system_resources(monitor);
                debug!(
                    "Frame {}: CPU {:.1}%, memory {:.1}%",
                    result.frame_index, system.cpu_percent, system.memory_percent
                );
                self.last_system_sample = Some(now);
            }
        }
    }

    fn on_frame_error(&mut self, _frame_index: Option<u64>, _error: &Error) {
        self.dropped += 1;
        self.last_mark = Instant::now();
    }

    fn on_complete(&mut self, stats: &RunStatistics) {
        self.statistics = Some(*stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let benchmark = PerformanceBenchmark::new(100);
        assert!(benchmark.summary().is_none());
    }

    #[test]
    fn test_model_rates() {
        let mut benchmark = PerformanceBenchmark::new(100);
        let metrics = benchmark.record_model(
            12.0,
            DetectionCounts {
                true_positives: 3,
                false_positives: 1,
                false_negatives: 0,
            },
            0.1,
        );
        assert!((metrics.detection_accuracy - 75.0).abs() < 1e-9);
        assert!((metrics.false_positive_rate - 25.0).abs() < 1e-9);

        let empty = benchmark.record_model(8.0, DetectionCounts::default(), 0.1);
        assert_eq!(empty.detection_accuracy, 0.0);

        let summary = benchmark.summary().unwrap();
        assert!((summary.avg_inference_time_ms - 10.0).abs() < 1e-9);
        assert!((summary.avg_detection_accuracy - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_realtime_window_is_bounded() {
        let mut benchmark = PerformanceBenchmark::new(2);
        let queue = QueueState {
            queue_length: 1,
            buffer_size: 2,
            buffer_used: 1,
        };
        benchmark.record_realtime(10, 5, queue, 100.0);
        benchmark.record_realtime(10, 0, queue, 4.0);
        benchmark.record_realtime(10, 0, queue, 6.0);

        let summary = benchmark.summary().unwrap();
        assert_eq!(summary.avg_frame_drop_rate, 0.0);
        assert!((summary.avg_end_to_end_latency_ms - 5.0).abs() < 1e-9);
        assert!((summary.avg_buffer_utilization - 50.0).abs() < 1e-9);
    }

    fn result(frame_index: u64, frame_time_ms: f64) -> DetectionResult {
        use crate::{
            config::Config,
            landmarks::{FaceKeypoints, FrameGeometry, LandmarkSource, PoseKeypoints},
            metrics::Operation,
            pipeline::FrameProcessor,
        };

        struct Nothing;

        impl LandmarkSource for Nothing {
            type Image = ();

            fn detect_face(&mut self, _image: &()) -> crate::Result<Option<FaceKeypoints>> {
                Ok(None)
            }

            fn detect_pose(&mut self, _image: &()) -> crate::Result<Option<PoseKeypoints>> {
                Ok(None)
            }
        }

        let mut processor = FrameProcessor::new(&Config::default(), Nothing).unwrap();
        let mut result = processor.process(&(), FrameGeometry::new(640, 480), frame_index).unwrap();
        result.frame_time_ms = frame_time_ms;
        // A rolling mean that differs from every frame's own time
        result.metrics.latencies_ms.insert(Operation::Total, 999.0);
        result
    }

    #[test]
    fn test_sink_records_each_frame_time() {
        let mut sink = BenchmarkSink::new(100).without_system_monitor();
        sink.on_result(&result(0, 80.0));
        for index in 1..8 {
            sink.on_result(&result(index, 0.0));
        }

        let summary = sink.benchmark().summary().unwrap();
        assert!((summary.avg_inference_time_ms - 10.0).abs() < 1e-9);
        assert_eq!(summary.avg_false_negative_rate, 100.0);
    }

    #[test]
    fn test_system_metrics_averaged() {
        let mut benchmark = PerformanceBenchmark::new(2);
        for (cpu, memory) in [(90.0, 1.0), (20.0, 2.0), (40.0, 4.0)] {
            benchmark.record_system(SystemMetrics {
                cpu_percent: cpu,
                memory_percent: memory,
                disk_read_bytes: 0,
                disk_written_bytes: 10,
            });
        }

        let summary = benchmark.summary().unwrap();
        assert!((summary.avg_cpu_percent - 30.0).abs() < 1e-9);
        assert!((summary.avg_memory_percent - 3.0).abs() < 1e-9);
        assert_eq!(summary.avg_inference_time_ms, 0.0);
        assert_eq!(benchmark.last_system().unwrap().disk_written_bytes, 10);
    }

    #[test]
    fn test_resource_monitor_samples_this_process() {
        let mut monitor = ResourceMonitor::new().unwrap();
        let mut benchmark = PerformanceBenchmark::new(10);
        let sample = benchmark.measure_system_resources(&mut monitor);

        assert!(sample.cpu_percent.is_finite() && sample.cpu_percent >= 0.0);
        assert!(sample.memory_percent > 0.0 && sample.memory_percent <= 100.0);
        assert!(benchmark.summary().is_some());
    }

    #[test]
    fn test_sink_samples_system_once_per_interval() {
        let mut sink = BenchmarkSink::new(100);
        if sink.monitor.is_none() {
            return;
        }
        sink.on_result(&result(0, 1.0));
        sink.on_result(&result(1, 1.0));
        assert_eq!(sink.benchmark().cpu.len(), 1);
    }

    #[test]
    fn test_sink_counts_drops() {
        let mut sink = BenchmarkSink::new(100);
        sink.on_frame_error(None, &Error::Acquisition("camera hiccup".into()));
        assert_eq!(sink.dropped, 1);
        assert!(sink.statistics().is_none());
    }
}
