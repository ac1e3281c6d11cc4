//! Frame orchestration: acquire, classify, report.
//!
//! [`FrameProcessor`] runs one frame through the landmark source, the three
//! classifiers and the metrics aggregator. [`Pipeline`] drives it over a
//! [`FrameSource`], handing every [`DetectionResult`] to a [`ResultSink`].
//! Frames are classified strictly in arrival order; acquisition can
//! optionally run one stage ahead on its own thread.

use crate::{
    config::Config,
    constants::MILLIS_PER_SECOND,
    distance::{DistanceEstimate, DistanceEstimator},
    eye_state::{EyeReading, EyeStateClassifier},
    landmarks::{FaceKeypoints, FrameGeometry, LandmarkSource, PoseKeypoints},
    metrics::{DetectionKind, MetricsSummary, Operation, PerformanceMetrics},
    posture::{PostureAnalyzer, PostureReading},
    Error, Result,
};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc,
};
use std::thread;
use std::time::{Duration, Instant};

/// One acquired frame
#[derive(Debug, Clone)]
pub struct Frame<I> {
    /// Position in the stream, starting at 0
    pub index: u64,
    pub image: I,
    pub geometry: FrameGeometry,
}

/// Producer of frames.
///
/// `Ok(None)` ends the stream. A [recoverable](Error::is_recoverable) error
/// drops one frame; any other error ends the run.
pub trait FrameSource {
    type Image;

    /// Read the next frame
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be acquired
    fn read_frame(&mut self) -> Result<Option<Frame<Self::Image>>>;
}

/// Everything the core concluded about one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub frame_index: u64,
    pub geometry: FrameGeometry,
    pub eyes: EyeReading,
    pub posture: PostureReading,
    pub distance: DistanceEstimate,
    /// Raw face keypoints, for overlays
    pub face: Option<FaceKeypoints>,
    /// Raw pose keypoints, for overlays
    pub pose: Option<PoseKeypoints>,
    /// Wall-clock time spent classifying this frame, in milliseconds
    pub frame_time_ms: f64,
    /// Metrics as of this frame; only `fps` is filled when detailed metrics
    /// are disabled
    pub metrics: MetricsSummary,
}

/// Cumulative statistics for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Wall-clock seconds from start to stop
    pub total_time: f64,
    /// Frames acquired or dropped
    pub total_frames: u64,
    pub processed_frames: u64,
    pub dropped_frames: u64,
    /// `processed_frames / total_time`
    pub average_fps: f64,
}

impl RunStatistics {
    #[allow(clippy::cast_precision_loss)]
    fn new(elapsed: Duration, processed_frames: u64, dropped_frames: u64) -> Self {
        let total_time = elapsed.as_secs_f64();
        Self {
            total_time,
            total_frames: processed_frames + dropped_frames,
            processed_frames,
            dropped_frames,
            average_fps: if total_time > 0.0 {
                processed_frames as f64 / total_time
            } else {
                0.0
            },
        }
    }
}

/// Consumer of per-frame results (live overlay, benchmark recorder, ...)
pub trait ResultSink {
    /// Called once per successfully processed frame
    fn on_result(&mut self, result: &DetectionResult);

    /// Called for every dropped frame; `frame_index` is `None` when the frame
    /// never arrived
    fn on_frame_error(&mut self, _frame_index: Option<u64>, _error: &Error) {}

    /// Called once when the run ends normally
    fn on_complete(&mut self, _stats: &RunStatistics) {}
}

/// Sink that logs status changes; stands in for a rendering layer
#[derive(Debug, Default)]
pub struct LogSink {
    last: Option<(String, String, String)>,
}

impl ResultSink for LogSink {
    fn on_result(&mut self, result: &DetectionResult) {
        let current = (
            result.eyes.status.to_string(),
            result.posture.status.to_string(),
            result.distance.zone.to_string(),
        );
        if result.eyes.calibration_complete {
            info!("Frame {}: CALIBRATION COMPLETE", result.frame_index);
        }
        if self.last.as_ref() != Some(&current) {
            info!(
                "Frame {}: eyes {} | posture {} | distance {:.1}cm {}",
                result.frame_index, current.0, current.1, result.distance.distance_cm, current.2
            );
            self.last = Some(current);
        }
    }

    fn on_frame_error(&mut self, frame_index: Option<u64>, error: &Error) {
        match frame_index {
            Some(index) => warn!("Frame {index} skipped: {error}"),
            None => warn!("Frame skipped: {error}"),
        }
    }

    fn on_complete(&mut self, stats: &RunStatistics) {
        info!(
            "Run complete: {} processed, {} dropped in {:.2}s ({:.1} FPS)",
            stats.processed_frames, stats.dropped_frames, stats.total_time, stats.average_fps
        );
    }
}

/// Cooperative stop flag shared between the frame loop and its controller
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop before the next frame
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs the per-frame classification sequence
pub struct FrameProcessor<L: LandmarkSource> {
    landmarks: L,
    eyes: EyeStateClassifier,
    posture: PostureAnalyzer,
    distance: DistanceEstimator,
    metrics: PerformanceMetrics,
    log_interval: u64,
}

impl<L: LandmarkSource> FrameProcessor<L> {
    /// Build all components from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(config: &Config, landmarks: L) -> Result<Self> {
        config.validate()?;
        info!("Initializing frame processor");

        Ok(Self {
            landmarks,
            eyes: EyeStateClassifier::new(&config.eye)?,
            posture: PostureAnalyzer::new(&config.posture),
            distance: DistanceEstimator::new(&config.distance),
            metrics: PerformanceMetrics::new(&config.metrics),
            log_interval: config.metrics.log_interval,
        })
    }

    #[must_use]
    pub fn eyes(&self) -> &EyeStateClassifier {
        &self.eyes
    }

    pub fn eyes_mut(&mut self) -> &mut EyeStateClassifier {
        &mut self.eyes
    }

    #[must_use]
    pub fn distance(&self) -> &DistanceEstimator {
        &self.distance
    }

    pub fn distance_mut(&mut self) -> &mut DistanceEstimator {
        &mut self.distance
    }

    #[must_use]
    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn landmarks_mut(&mut self) -> &mut L {
        &mut self.landmarks
    }

    /// Discard calibration progress, smoothing history and metrics
    pub fn reset(&mut self) {
        self.eyes.reset();
        self.metrics.reset();
    }

    /// Classify a single frame.
    ///
    /// Landmark failures that only affect this frame degrade to "not
    /// detected".
    ///
    /// # Errors
    ///
    /// Returns an error only if the landmark source fails unrecoverably
    pub fn process(&mut self, image: &L::Image, geometry: FrameGeometry, frame_index: u64) -> Result<DetectionResult> {
        let frame_start = Instant::now();
        let frame_token = self.metrics.begin(Operation::Total);
        if let Some(fps) = self.metrics.fps_tick() {
            debug!("FPS: {fps:.1}");
        }

        let token = self.metrics.begin(Operation::FaceMesh);
        let face = degrade(self.landmarks.detect_face(image), "face", frame_index)?;
        self.metrics.end(token, Operation::FaceMesh);

        let token = self.metrics.begin(Operation::Pose);
        let pose = degrade(self.landmarks.detect_pose(image), "pose", frame_index)?;
        self.metrics.end(token, Operation::Pose);

        self.metrics.record_detection(DetectionKind::Face, face.is_some());
        self.metrics.record_detection(DetectionKind::Pose, pose.is_some());

        let token = self.metrics.begin(Operation::EyeTracking);
        let eyes = self.eyes.analyze(face.as_ref());
        self.metrics.end(token, Operation::EyeTracking);
        self.metrics
            .record_detection(DetectionKind::Eyes, eyes.raw_ear.is_some_and(|ear| ear.is_valid()));

        let token = self.metrics.begin(Operation::Posture);
        let posture = self.posture.analyze(pose.as_ref(), geometry);
        self.metrics.end(token, Operation::Posture);

        let token = self.metrics.begin(Operation::Distance);
        let distance = self.distance.estimate(face.as_ref(), geometry.width);
        self.metrics.end(token, Operation::Distance);

        let frame_time = self
            .metrics
            .end(frame_token, Operation::Total)
            .unwrap_or_else(|| frame_start.elapsed());

        if self.log_interval > 0 && self.metrics.frames_seen() % self.log_interval == 0 {
            self.metrics.log_summary();
        }

        Ok(DetectionResult {
            frame_index,
            geometry,
            eyes,
            posture,
            distance,
            face,
            pose,
            frame_time_ms: frame_time.as_secs_f64() * MILLIS_PER_SECOND,
            metrics: self.metrics.summary(),
        })
    }
}

fn degrade<T>(result: Result<Option<T>>, what: &str, frame_index: u64) -> Result<Option<T>> {
    match result {
        Ok(found) => Ok(found),
        Err(e) if e.is_recoverable() => {
            warn!("Frame {frame_index}: {what} detection failed: {e}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Frame loop over a [`FrameProcessor`]
pub struct Pipeline<L: LandmarkSource> {
    processor: FrameProcessor<L>,
    stop: StopSignal,
}

impl<L: LandmarkSource> Pipeline<L> {
    #[must_use]
    pub fn new(processor: FrameProcessor<L>) -> Self {
        Self {
            processor,
            stop: StopSignal::new(),
        }
    }

    /// Handle for stopping the loop from elsewhere
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    #[must_use]
    pub fn processor(&self) -> &FrameProcessor<L> {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut FrameProcessor<L> {
        &mut self.processor
    }

    /// Give back the processor, dropping the loop
    #[must_use]
    pub fn into_processor(self) -> FrameProcessor<L> {
        self.processor
    }

    /// Read and classify frames on the calling thread until the source ends
    /// or the stop signal is raised
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable error from the source or landmark models
    pub fn run<S, K>(&mut self, mut source: S, sink: &mut K) -> Result<RunStatistics>
    where
        S: FrameSource<Image = L::Image>,
        K: ResultSink + ?Sized,
    {
        info!("Starting frame loop");
        self.drive(|| source.read_frame(), || 0, sink)
    }

    /// Like [`run`](Self::run), with acquisition on a separate thread.
    ///
    /// Up to `depth` frames are read ahead through a bounded channel, so
    /// frames still reach the classifiers in arrival order. Frames still
    /// buffered when the stop signal is raised are discarded and counted as
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable error from the source or landmark
    /// models, or `Fatal` if the acquisition thread cannot be started
    pub fn run_prefetched<S, K>(&mut self, source: S, sink: &mut K, depth: usize) -> Result<RunStatistics>
    where
        S: FrameSource<Image = L::Image> + Send + 'static,
        L::Image: Send + 'static,
        K: ResultSink + ?Sized,
    {
        info!("Starting frame loop with {depth}-frame prefetch");
        let (tx, rx) = mpsc::sync_channel(depth.max(1));
        let stop = self.stop.clone();

        let handle = thread::Builder::new()
            .name("frame-acquisition".to_string())
            .spawn(move || acquire(source, &tx, &stop))
            .map_err(|e| Error::Fatal(format!("Failed to start acquisition thread: {e}")))?;

        let outcome = self.drive(
            || rx.recv().unwrap_or(Ok(None)),
            || {
                // The acquisition thread exits after its current read once it sees the stop
                rx.iter().filter(|item| matches!(item, Ok(Some(_)))).count() as u64
            },
            sink,
        );

        drop(rx);
        if handle.join().is_err() {
            error!("Acquisition thread panicked");
        }
        outcome
    }

    /// Core loop. `pending` is called once on stop and returns how many
    /// acquired frames were discarded without being classified.
    fn drive<F, P, K>(&mut self, mut next: F, mut pending: P, sink: &mut K) -> Result<RunStatistics>
    where
        F: FnMut() -> Result<Option<Frame<L::Image>>>,
        P: FnMut() -> u64,
        K: ResultSink + ?Sized,
    {
        let start = Instant::now();
        let mut processed = 0u64;
        let mut dropped = 0u64;

        loop {
            if self.stop.is_stopped() {
                let discarded = pending();
                info!("Stop requested, {discarded} buffered frames discarded");
                dropped += discarded;
                break;
            }

            let frame = match next() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("End of stream reached");
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    dropped += 1;
                    sink.on_frame_error(None, &e);
                    continue;
                }
                Err(e) => {
                    error!("Frame source failed: {e}");
                    return Err(e);
                }
            };

            match self.processor.process(&frame.image, frame.geometry, frame.index) {
                Ok(result) => {
                    processed += 1;
                    sink.on_result(&result);
                }
                Err(e) if e.is_recoverable() => {
                    dropped += 1;
                    sink.on_frame_error(Some(frame.index), &e);
                }
                Err(e) => {
                    error!("Frame {} failed: {e}", frame.index);
                    return Err(e);
                }
            }
        }

        let stats = RunStatistics::new(start.elapsed(), processed, dropped);
        info!("Final Performance Metrics:");
        self.processor.metrics.log_summary();
        sink.on_complete(&stats);
        Ok(stats)
    }
}

/// Acquisition thread body: forward frames until the stream ends, the
/// consumer goes away or a stop is requested
fn acquire<S: FrameSource>(mut source: S, tx: &mpsc::SyncSender<Result<Option<Frame<S::Image>>>>, stop: &StopSignal) {
    while !stop.is_stopped() {
        let item = source.read_frame();
        let last = match &item {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(e) => !e.is_recoverable(),
        };
        if tx.send(item).is_err() || last {
            break;
        }
    }
    debug!("Acquisition thread finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Keypoint;

    #[derive(Clone, Copy)]
    enum PoseFailure {
        None,
        Recoverable,
        Fatal,
    }

    struct FixedLandmarks {
        face: Option<FaceKeypoints>,
        pose_error: PoseFailure,
    }

    impl LandmarkSource for FixedLandmarks {
        type Image = ();

        fn detect_face(&mut self, _image: &()) -> Result<Option<FaceKeypoints>> {
            Ok(self.face.clone())
        }

        fn detect_pose(&mut self, _image: &()) -> Result<Option<PoseKeypoints>> {
            match self.pose_error {
                PoseFailure::None => Ok(None),
                PoseFailure::Recoverable => Err(Error::NotDetected("pose model timeout".into())),
                PoseFailure::Fatal => Err(Error::Fatal("model unloaded".into())),
            }
        }
    }

    struct CountingSource {
        remaining: u64,
        next_index: u64,
    }

    impl FrameSource for CountingSource {
        type Image = ();

        fn read_frame(&mut self) -> Result<Option<Frame<()>>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let index = self.next_index;
            self.next_index += 1;
            Ok(Some(Frame {
                index,
                image: (),
                geometry: FrameGeometry::new(640, 480),
            }))
        }
    }

    #[derive(Default)]
    struct Collect(Vec<u64>, Vec<Option<u64>>);

    impl ResultSink for Collect {
        fn on_result(&mut self, result: &DetectionResult) {
            self.0.push(result.frame_index);
        }

        fn on_frame_error(&mut self, frame_index: Option<u64>, _error: &Error) {
            self.1.push(frame_index);
        }
    }

    fn processor(landmarks: FixedLandmarks) -> FrameProcessor<FixedLandmarks> {
        FrameProcessor::new(&Config::default(), landmarks).unwrap()
    }

    #[test]
    fn test_no_subject_frame() {
        let mut p = processor(FixedLandmarks {
            face: None,
            pose_error: PoseFailure::None,
        });
        let result = p.process(&(), FrameGeometry::new(640, 480), 0).unwrap();

        assert_eq!(result.eyes.status, crate::eye_state::EyeStatus::NoSubject);
        assert_eq!(result.posture.status, crate::posture::PostureStatus::NoPose);
        assert_eq!(result.distance.zone, crate::distance::DistanceZone::NoSubject);

        let rates = &result.metrics.detection_rates;
        assert_eq!(rates[&DetectionKind::Face], 0.0);
        assert_eq!(p.metrics().window_len(Operation::Total), 1);
    }

    #[test]
    fn test_recoverable_landmark_error_degrades() {
        let mut p = processor(FixedLandmarks {
            face: Some(FaceKeypoints::new([Keypoint::new(0.5, 0.5); 16], [Keypoint::new(0.4, 0.5); 16])),
            pose_error: PoseFailure::Recoverable,
        });
        let result = p.process(&(), FrameGeometry::new(640, 480), 3).unwrap();
        assert!(result.pose.is_none());
        assert!(result.face.is_some());
    }

    #[test]
    fn test_fatal_landmark_error_propagates() {
        let mut p = processor(FixedLandmarks {
            face: None,
            pose_error: PoseFailure::Fatal,
        });
        assert!(matches!(p.process(&(), FrameGeometry::new(640, 480), 0), Err(Error::Fatal(_))));
    }

    #[test]
    fn test_run_processes_in_order() {
        let mut pipeline = Pipeline::new(processor(FixedLandmarks {
            face: None,
            pose_error: PoseFailure::None,
        }));
        let mut sink = Collect::default();
        let stats = pipeline
            .run(CountingSource { remaining: 5, next_index: 0 }, &mut sink)
            .unwrap();

        assert_eq!(sink.0, vec![0, 1, 2, 3, 4]);
        assert_eq!(stats.processed_frames, 5);
        assert_eq!(stats.dropped_frames, 0);
        assert_eq!(stats.total_frames, 5);
    }

    #[test]
    fn test_prefetched_run_preserves_order() {
        let mut pipeline = Pipeline::new(processor(FixedLandmarks {
            face: None,
            pose_error: PoseFailure::None,
        }));
        let mut sink = Collect::default();
        let stats = pipeline
            .run_prefetched(CountingSource { remaining: 50, next_index: 0 }, &mut sink, 2)
            .unwrap();

        assert_eq!(sink.0, (0..50).collect::<Vec<_>>());
        assert_eq!(stats.processed_frames, 50);
    }

    #[test]
    fn test_frame_time_is_per_frame() {
        struct SlowFirstFrame {
            calls: u32,
        }

        impl LandmarkSource for SlowFirstFrame {
            type Image = ();

            fn detect_face(&mut self, _image: &()) -> Result<Option<FaceKeypoints>> {
                self.calls += 1;
                if self.calls == 1 {
                    thread::sleep(Duration::from_millis(40));
                }
                Ok(None)
            }

            fn detect_pose(&mut self, _image: &()) -> Result<Option<PoseKeypoints>> {
                Ok(None)
            }
        }

        let mut p = FrameProcessor::new(&Config::default(), SlowFirstFrame { calls: 0 }).unwrap();
        let slow = p.process(&(), FrameGeometry::new(640, 480), 0).unwrap();
        let fast = p.process(&(), FrameGeometry::new(640, 480), 1).unwrap();

        assert!(slow.frame_time_ms >= 40.0);
        assert!(fast.frame_time_ms < slow.frame_time_ms);
        // The rolling mean still carries the slow frame
        assert!(fast.metrics.latencies_ms[&Operation::Total] >= 20.0);
    }

    #[test]
    fn test_prefetched_stop_counts_buffered_frames() {
        struct Produced {
            count: Arc<std::sync::atomic::AtomicU64>,
            remaining: u64,
        }

        impl FrameSource for Produced {
            type Image = ();

            fn read_frame(&mut self) -> Result<Option<Frame<()>>> {
                if self.remaining == 0 {
                    return Ok(None);
                }
                self.remaining -= 1;
                let index = self.count.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Frame {
                    index,
                    image: (),
                    geometry: FrameGeometry::new(640, 480),
                }))
            }
        }

        struct StopAfter(u64, StopSignal);

        impl ResultSink for StopAfter {
            fn on_result(&mut self, result: &DetectionResult) {
                if result.frame_index + 1 >= self.0 {
                    self.1.stop();
                }
            }
        }

        let mut pipeline = Pipeline::new(processor(FixedLandmarks {
            face: None,
            pose_error: PoseFailure::None,
        }));
        let count = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let source = Produced {
            count: Arc::clone(&count),
            remaining: 1000,
        };
        let mut sink = StopAfter(3, pipeline.stop_signal());
        let stats = pipeline.run_prefetched(source, &mut sink, 4).unwrap();

        assert_eq!(stats.processed_frames, 3);
        assert_eq!(stats.total_frames, count.load(Ordering::SeqCst));
        assert_eq!(stats.dropped_frames, stats.total_frames - 3);
        assert!(stats.total_frames < 1000);
    }

    #[test]
    fn test_stop_before_start() {
        let mut pipeline = Pipeline::new(processor(FixedLandmarks {
            face: None,
            pose_error: PoseFailure::None,
        }));
        pipeline.stop_signal().stop();
        let mut sink = Collect::default();
        let stats = pipeline
            .run(CountingSource { remaining: 5, next_index: 0 }, &mut sink)
            .unwrap();
        assert_eq!(stats.processed_frames, 0);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_recoverable_processing_error_skips_frame() {
        let mut pipeline = Pipeline::new(processor(FixedLandmarks {
            face: None,
            pose_error: PoseFailure::None,
        }));
        let mut calls = 0;
        let mut sink = Collect::default();
        let stats = pipeline
            .drive(
                || {
                    calls += 1;
                    match calls {
                        1 => Err(Error::Acquisition("unreadable frame".into())),
                        2 => Ok(Some(Frame {
                            index: 1,
                            image: (),
                            geometry: FrameGeometry::new(640, 480),
                        })),
                        _ => Ok(None),
                    }
                },
                || 0,
                &mut sink,
            )
            .unwrap();

        assert_eq!(stats.dropped_frames, 1);
        assert_eq!(stats.processed_frames, 1);
        assert_eq!(sink.1, vec![None]);
    }
}
