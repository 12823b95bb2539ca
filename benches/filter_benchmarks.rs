//! Benchmarks for filter performance

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use head_tracking::filters::{KalmanCoeffs, KalmanFilter, LowPassFilter};
use head_tracking::types::Point;
use nalgebra::Vector3;

fn noisy_track(len: usize) -> Vec<Point> {
    (0..len)
        .map(|i| {
            let t = i as f32 * 0.1;
            Point::new(
                80.0 * t.sin() + 2.0 * rand::random::<f32>(),
                30.0 * t.cos() + 2.0 * rand::random::<f32>(),
                600.0 + 20.0 * rand::random::<f32>(),
            )
        })
        .collect()
}

fn benchmark_kalman(c: &mut Criterion) {
    let mut group = c.benchmark_group("kalman");
    let track = noisy_track(100);

    let gains = [
        ("default", KalmanCoeffs::default()),
        ("responsive", KalmanCoeffs { a: Vector3::repeat(0.5), b: Vector3::repeat(0.3) }),
    ];

    for (name, coeffs) in gains {
        let mut filter = KalmanFilter::new();
        filter.reset(track[0]);

        group.bench_with_input(BenchmarkId::new("single_update", name), &track[1], |b, &pos| {
            b.iter(|| filter.update(black_box(&coeffs), black_box(pos), black_box(33.0)));
        });

        group.bench_with_input(BenchmarkId::new("sequence_100", name), &track, |b, data| {
            b.iter(|| {
                filter.reset(data[0]);
                for &pos in &data[1..] {
                    filter.update(&coeffs, black_box(pos), 33.0);
                }
                black_box(filter.point().pos)
            });
        });
    }

    group.bench_function("predict", |b| {
        let mut filter = KalmanFilter::new();
        filter.reset(track[0]);
        filter.update(&KalmanCoeffs::default(), track[1], 33.0);
        b.iter(|| black_box(filter.predict(black_box(16.0))));
    });

    group.finish();
}

fn benchmark_low_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("low_pass");
    let depths: Vec<f32> = noisy_track(100).iter().map(|p| p.z).collect();

    for alpha in [0.1, 0.2, 0.5] {
        let mut filter = LowPassFilter::new(alpha);
        group.bench_with_input(BenchmarkId::new("sequence_100", alpha), &depths, |b, data| {
            b.iter(|| {
                filter.reset();
                for &z in data {
                    black_box(filter.update(black_box(z)));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_kalman, benchmark_low_pass);
criterion_main!(benches);
