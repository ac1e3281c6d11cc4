//! Benchmarks for the per-frame classifiers

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use eye_posture_monitor::{
    config::{DistanceConfig, EyeConfig, PostureConfig},
    distance::DistanceEstimator,
    eye_state::{eye_aspect_ratio, EarPair, EyeStateClassifier},
    filters::create_filter,
    landmarks::{FaceKeypoints, FrameGeometry, Keypoint, PoseKeypoints},
    posture::PostureAnalyzer,
};

fn eye_contour(cx: f64, width: f64, ear: f64) -> [Keypoint; 16] {
    let height = ear * width;
    let x = |i: usize| cx - width / 2.0 + width * i as f64 / 8.0;
    let mut points = [Keypoint::new(cx, 0.4); 16];
    points[0] = Keypoint::new(x(0), 0.4);
    points[8] = Keypoint::new(x(8), 0.4);
    for i in 1..8 {
        points[i] = Keypoint::new(x(i), 0.4 + height / 2.0);
    }
    for u in 9..16 {
        points[u] = Keypoint::new(x(15 - u), 0.4 - height / 2.0);
    }
    points
}

fn face(ear: f64) -> FaceKeypoints {
    FaceKeypoints::new(eye_contour(0.55, 0.05, ear), eye_contour(0.45, 0.05, ear))
}

fn pose() -> PoseKeypoints {
    PoseKeypoints {
        nose: Keypoint::new(0.5, 0.30),
        left_ear: Keypoint::new(0.55, 0.29),
        right_ear: Keypoint::new(0.45, 0.29),
        left_shoulder: Keypoint::new(0.65, 0.50),
        right_shoulder: Keypoint::new(0.35, 0.50),
    }
}

fn benchmark_eye_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("eye_state");

    let contour = eye_contour(0.5, 0.05, 0.3);
    group.bench_function("eye_aspect_ratio", |b| {
        b.iter(|| black_box(eye_aspect_ratio(black_box(&contour))));
    });

    // Noisy open-eye signal with occasional blinks
    let samples: Vec<EarPair> = (0..100)
        .map(|i| {
            let base = if i % 25 < 3 { 0.05 } else { 0.32 };
            EarPair {
                left: base + 0.02 * rand::random::<f64>(),
                right: base + 0.02 * rand::random::<f64>(),
            }
        })
        .collect();

    let config = EyeConfig::default();
    let mut classifier = EyeStateClassifier::new(&config).unwrap();
    for _ in 0..config.calibration_frames {
        classifier.update(EarPair { left: 0.32, right: 0.32 });
    }

    group.bench_function("calibrated_update", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % samples.len();
            black_box(classifier.update(black_box(samples[i])))
        });
    });

    group.bench_function("calibration_cycle", |b| {
        let mut classifier = EyeStateClassifier::new(&config).unwrap();
        b.iter(|| {
            classifier.reset();
            for sample in &samples[..config.calibration_frames + 1] {
                black_box(classifier.update(*sample));
            }
        });
    });

    let face = face(0.3);
    group.bench_function("analyze_face", |b| {
        b.iter(|| black_box(classifier.analyze(Some(black_box(&face)))));
    });

    group.finish();
}

fn benchmark_posture_and_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("posture_distance");

    let analyzer = PostureAnalyzer::new(&PostureConfig::default());
    let pose = pose();
    for (width, height) in [(640, 480), (1280, 720), (1920, 1080)] {
        let geometry = FrameGeometry::new(width, height);
        group.bench_with_input(BenchmarkId::new("posture", width), &geometry, |b, geometry| {
            b.iter(|| black_box(analyzer.analyze(Some(black_box(&pose)), *geometry)));
        });
    }

    let estimator = DistanceEstimator::new(&DistanceConfig::default());
    let face = face(0.3);
    group.bench_function("distance", |b| {
        b.iter(|| black_box(estimator.estimate(Some(black_box(&face)), 640)));
    });

    group.finish();
}

fn benchmark_smoothing(c: &mut Criterion) {
    let mut group = c.benchmark_group("smoothing");

    let data: Vec<f64> = (0..100).map(|_| 0.3 + 0.05 * rand::random::<f64>()).collect();

    for name in ["median", "moving_average"] {
        for window in [5, 9, 15] {
            let mut filter = create_filter(name, window).unwrap();
            group.bench_with_input(BenchmarkId::new(name, window), &data, |b, data| {
                b.iter(|| {
                    filter.reset();
                    for &value in data {
                        black_box(filter.apply(black_box(value)));
                    }
                });
            });
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_eye_state,
    benchmark_posture_and_distance,
    benchmark_smoothing
);
criterion_main!(benches);
