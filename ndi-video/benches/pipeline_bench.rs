//! Benchmarks for ndi-video
//!
//! Measures the per-frame cost of duplicate and send at common capture sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndi_video::testing::RecordingEngine;
use ndi_video::{
    ExtendedPixels, FrameNormalizer, FrameTransmitter, PixelBuffer, PixelFormat,
    TransmitterConfig,
};

const SIZES: [(u32, u32); 3] = [(1280, 720), (1920, 1080), (2560, 1440)];

fn captured(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::new(
        PixelFormat::Nv12FullRange,
        width,
        height,
        ExtendedPixels::new(0, 0, 0, 16),
    )
    .unwrap()
}

fn bench_duplicate(c: &mut Criterion) {
    let mut group = c.benchmark_group("duplicate");

    for (width, height) in SIZES {
        let input = captured(width, height);
        let mut normalizer = FrameNormalizer::default();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &input,
            |b, input| {
                b.iter(|| {
                    let output = normalizer.duplicate(black_box(input)).unwrap();
                    black_box(output.width());
                });
            },
        );
    }

    group.finish();
}

fn bench_duplicate_and_send(c: &mut Criterion) {
    let mut group = c.benchmark_group("duplicate_and_send");

    for (width, height) in SIZES {
        let input = captured(width, height);
        let mut normalizer = FrameNormalizer::default();
        let mut engine = RecordingEngine::new();
        engine.keep_frames = false;
        let mut transmitter = FrameTransmitter::new(engine, TransmitterConfig::default());
        transmitter.initialize();
        transmitter.create("Bench").unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &input,
            |b, input| {
                b.iter(|| {
                    let output = normalizer.duplicate(black_box(input)).unwrap();
                    black_box(transmitter.send(&output).unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_duplicate, bench_duplicate_and_send);
criterion_main!(benches);
