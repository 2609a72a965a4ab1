//! Pipeline stage benchmarks
//!
//! Run with: cargo bench --bench tempo_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use tempo_normalizer::config::{CurveConfig, FlowConfig, MotionConfig};
use tempo_normalizer::tempo::{
    FlowExtractor, FlowField, FrameResampler, MotionAnalysis, MotionEstimator, MotionSample,
    SpeedCurveBuilder, TempoClass, TempoClassification,
};
use tempo_normalizer::Frame;

fn textured_frame(width: u32, height: u32, shift: f64) -> Frame {
    let tau = std::f64::consts::TAU;
    let image = RgbImage::from_fn(width, height, |x, y| {
        let fx = x as f64 - shift;
        let fy = y as f64;
        let v = 128.0 + 50.0 * (tau * fx / 24.0).sin() + 50.0 * (tau * fy / 29.0).sin();
        let v = v.clamp(0.0, 255.0) as u8;
        Rgb([v, v, v])
    });
    Frame::new(image, 0)
}

/// Benchmark dense flow at several analysis sizes
fn bench_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow");
    let a = textured_frame(640, 360, 0.0);
    let b = textured_frame(640, 360, 1.5);

    for max_dimension in [80u32, 160, 320] {
        let extractor = FlowExtractor::new(FlowConfig {
            max_dimension,
            ..FlowConfig::default()
        });
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(max_dimension),
            &extractor,
            |bench, extractor| bench.iter(|| extractor.extract(black_box(&a), black_box(&b))),
        );
    }

    group.finish();
}

/// Benchmark the flow-field reduction on a noisy field
fn bench_motion(c: &mut Criterion) {
    let mut group = c.benchmark_group("motion");
    let mut rng = SmallRng::seed_from_u64(7);

    let vectors: Vec<(f32, f32)> = (0..160 * 90)
        .map(|_| {
            if rng.gen_bool(0.05) {
                (rng.gen_range(-30.0..30.0), rng.gen_range(-30.0..30.0))
            } else {
                (1.0 + rng.gen_range(-0.2..0.2), rng.gen_range(-0.2..0.2))
            }
        })
        .collect();
    let field = FlowField::from_vectors(160, 90, &vectors).expect("field size");
    let estimator = MotionEstimator::new(MotionConfig::default());

    group.throughput(Throughput::Elements(vectors.len() as u64));
    group.bench_function("estimate_160x90", |b| b.iter(|| estimator.estimate(black_box(&field))));

    group.finish();
}

/// Benchmark curve shaping and resampling for a long clip
fn bench_curve(c: &mut Criterion) {
    let mut group = c.benchmark_group("curve");
    let mut rng = SmallRng::seed_from_u64(11);

    let analysis = MotionAnalysis::new(
        (0..2400)
            .map(|_| {
                let magnitude = rng.gen_range(0.2..3.0);
                MotionSample {
                    magnitude,
                    raw: magnitude,
                    subject: magnitude,
                    camera: 0.0,
                    noise_factor: 1.0,
                }
            })
            .collect(),
    );
    let classification = TempoClassification {
        class: TempoClass::Slow,
        baseline: 1.0,
        floor: 1.5,
        window: 24,
        noisy: false,
    };
    let builder = SpeedCurveBuilder::new(CurveConfig::default());
    let resampler = FrameResampler::new();

    group.throughput(Throughput::Elements(2400));
    group.bench_function("build_2400", |b| {
        b.iter(|| builder.build(black_box(&analysis), &classification, 24.0))
    });

    let curve = builder.build(&analysis, &classification, 24.0);
    group.bench_function("resample_2400", |b| {
        b.iter(|| resampler.resample(black_box(&curve), 24.0))
    });

    group.finish();
}

criterion_group!(benches, bench_flow, bench_motion, bench_curve);

criterion_main!(benches);
