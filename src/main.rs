//! Eye-state, posture and distance monitor over recorded landmark streams.

use anyhow::{bail, Context, Result};
use clap::Parser;
use eye_posture_monitor::{
    benchmark::BenchmarkSink,
    calibration::{focal_length_from_camera, FaceProfile},
    config::{Config, EXAMPLE_CONFIG},
    pipeline::{DetectionResult, FrameProcessor, LogSink, Pipeline, ResultSink, RunStatistics, StopSignal},
    recording::{RecordedLandmarks, RecordedSource},
    Error,
};
use log::{info, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Landmark recording to replay (JSON lines)
    #[arg(short, long)]
    recording: Option<String>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Write an example configuration file and exit
    #[arg(long)]
    write_config: Option<String>,

    /// Write every detection result as JSON lines
    #[arg(short, long)]
    output: Option<String>,

    /// Record benchmark metrics and print a summary at the end
    #[arg(short, long)]
    benchmark: bool,

    /// Camera focal length in pixels
    #[arg(long, conflicts_with = "focal_from_camera")]
    focal_length: Option<f64>,

    /// Derive the focal length from the configured camera specification
    #[arg(long)]
    focal_from_camera: bool,

    /// Real-world eye span in centimeters
    #[arg(long, conflicts_with = "face_profile")]
    face_width: Option<f64>,

    /// Statistical face width preset (male, female, average)
    #[arg(long)]
    face_profile: Option<FaceProfile>,

    /// Read frames ahead on a separate thread
    #[arg(long)]
    prefetch: bool,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Open a camera, read a few frames and report what it delivers
    #[cfg(feature = "opencv")]
    #[arg(long)]
    probe_camera: Option<i32>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

/// Forwards to an inner sink and optionally stops the loop after a frame budget
struct RunSink<K> {
    inner: K,
    output: Option<BufWriter<File>>,
    limit: Option<(u64, StopSignal)>,
    seen: u64,
}

impl<K> RunSink<K> {
    fn wrap<T>(self, inner: T) -> RunSink<T> {
        RunSink {
            inner,
            output: self.output,
            limit: self.limit,
            seen: self.seen,
        }
    }
}

impl<K: ResultSink> ResultSink for RunSink<K> {
    fn on_result(&mut self, result: &DetectionResult) {
        self.inner.on_result(result);

        if let Some(writer) = self.output.as_mut() {
            let written = serde_json::to_writer(&mut *writer, result)
                .map_err(Error::from)
                .and_then(|()| writer.write_all(b"\n").map_err(Error::from));
            if let Err(e) = written {
                warn!("Failed to write result for frame {}: {e}", result.frame_index);
            }
        }

        self.seen += 1;
        if let Some((max, stop)) = &self.limit {
            if self.seen >= *max {
                info!("Frame limit of {max} reached");
                stop.stop();
            }
        }
    }

    fn on_frame_error(&mut self, frame_index: Option<u64>, error: &Error) {
        self.inner.on_frame_error(frame_index, error);
    }

    fn on_complete(&mut self, stats: &RunStatistics) {
        self.inner.on_complete(stats);
        if let Some(writer) = self.output.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush results: {e}");
            }
        }
    }
}

fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(focal) = args.focal_length {
        config.distance.focal_length_px = Some(focal);
    }
    if args.focal_from_camera {
        let focal = focal_length_from_camera(&config.camera)?;
        info!("Focal length from camera specification: {focal:.1}px");
        config.distance.focal_length_px = Some(focal);
    }
    if let Some(width) = args.face_width {
        config.distance.known_width_cm = width;
    }
    if let Some(profile) = args.face_profile {
        config.distance.known_width_cm = profile.face_width_cm();
    }
    if args.prefetch {
        config.pipeline.prefetch = true;
    }
    config.validate().context("Invalid configuration")?;
    Ok(())
}

#[cfg(feature = "opencv")]
fn probe_camera(index: i32, config: &Config) -> Result<()> {
    use eye_posture_monitor::{
        capture::{CameraSource, VideoSource},
        pipeline::FrameSource,
    };

    let mut camera = CameraSource::open(VideoSource::Camera(index), &config.camera)?;
    let geometry = camera.geometry();
    let mut dropped = 0;
    for _ in 0..30 {
        match camera.read_frame() {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) if e.is_recoverable() => dropped += 1,
            Err(e) => return Err(e.into()),
        }
    }
    info!("Camera {index}: {}x{}, {dropped} of 30 frames dropped", geometry.width, geometry.height);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Eye / Posture Monitor");

    if let Some(path) = &args.write_config {
        std::fs::write(path, EXAMPLE_CONFIG).with_context(|| format!("Failed to write {path}"))?;
        info!("Example configuration written to {path}");
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {path}");
            match Config::from_file(path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("Failed to load config file: {e}. Using defaults.");
                    Config::default()
                }
            }
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &args)?;

    #[cfg(feature = "opencv")]
    if let Some(index) = args.probe_camera {
        return probe_camera(index, &config);
    }

    let Some(recording) = &args.recording else {
        bail!("No input given; pass --recording <file>");
    };
    let source = RecordedSource::open(recording)?;

    let processor = FrameProcessor::new(&config, RecordedLandmarks)?;
    let mut pipeline = Pipeline::new(processor);
    let output = match &args.output {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {path}"))?,
        )),
        None => None,
    };
    let mut sink = RunSink {
        inner: LogSink::default(),
        output,
        limit: args.max_frames.map(|max| (max, pipeline.stop_signal())),
        seen: 0,
    };

    let stats = if args.benchmark {
        let mut sink = sink.wrap(BenchmarkSink::new(config.pipeline.benchmark_window));
        let stats = run(&mut pipeline, source, &mut sink, &config)?;
        sink.inner.log_summary();
        stats
    } else {
        run(&mut pipeline, source, &mut sink, &config)?
    };

    info!(
        "Processed {} of {} frames in {:.2}s",
        stats.processed_frames, stats.total_frames, stats.total_time
    );
    Ok(())
}

fn run<K: ResultSink>(
    pipeline: &mut Pipeline<RecordedLandmarks>,
    source: RecordedSource<BufReader<File>>,
    sink: &mut K,
    config: &Config,
) -> Result<RunStatistics> {
    let stats = if config.pipeline.prefetch {
        pipeline.run_prefetched(source, sink, config.pipeline.prefetch_depth)?
    } else {
        pipeline.run(source, sink)?
    };
    Ok(stats)
}
