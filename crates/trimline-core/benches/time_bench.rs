//! Benchmarks for trimline-core time operations.
//!
//! Run with: cargo bench -p trimline-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trimline_core::{FrameRate, RationalTime};

fn bench_rational_time_arithmetic(c: &mut Criterion) {
    let a = RationalTime::new(1001, 30);
    let b = RationalTime::new(500, 24);

    c.bench_function("rational_time_add", |bencher| {
        bencher.iter(|| black_box(a) + black_box(b));
    });

    c.bench_function("rational_time_sub", |bencher| {
        bencher.iter(|| black_box(a) - black_box(b));
    });
}

fn bench_frame_conversion(c: &mut Criterion) {
    let time = RationalTime::new(3600, 1); // 1 hour
    let rate = FrameRate::FPS_29_97;

    c.bench_function("to_frames_1hr", |bencher| {
        bencher.iter(|| black_box(time).to_frames(black_box(rate)));
    });

    c.bench_function("from_frames_86400", |bencher| {
        bencher.iter(|| RationalTime::from_frames(black_box(86400), black_box(rate)));
    });
}

criterion_group!(
    benches,
    bench_rational_time_arithmetic,
    bench_frame_conversion
);
criterion_main!(benches);
