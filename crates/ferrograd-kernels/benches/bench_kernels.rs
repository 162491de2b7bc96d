use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ferrograd_kernels::{
    ops::{binary_op_kernel, dot_kernel, gemm_kernel, sum_kernel, transpose_2d_kernel},
    Acceleration, BinaryOp,
};
use rand::Rng;

fn bench_dot_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot_kernel");
    let mut rng = rand::rng();
    let detected = Acceleration::detect();

    for size in [8, 128, 1024, 16384] {
        let a: Vec<f32> = (0..size).map(|_| rng.random::<f32>()).collect();
        let b: Vec<f32> = (0..size).map(|_| rng.random::<f32>()).collect();

        for accel in [Acceleration::Scalar, detected] {
            group.bench_function(format!("f32_{accel}_size_{size}"), |bencher| {
                bencher.iter(|| black_box(dot_kernel(accel, &a, &b).unwrap()))
            });
        }
    }

    group.finish();
}

fn bench_binary_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("binary_kernel");
    let mut rng = rand::rng();
    let detected = Acceleration::detect();

    for size in [1024, 65536] {
        let a: Vec<f32> = (0..size).map(|_| rng.random::<f32>()).collect();
        let b: Vec<f32> = (0..size).map(|_| rng.random::<f32>()).collect();
        let mut out = vec![0.0f32; size];

        for accel in [Acceleration::Scalar, detected] {
            group.bench_function(format!("add_f32_{accel}_size_{size}"), |bencher| {
                bencher.iter(|| {
                    binary_op_kernel(accel, BinaryOp::Add, &a, &b, &mut out).unwrap();
                    black_box(&out);
                })
            });
        }
    }

    group.finish();
}

fn bench_sum_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("sum_kernel");
    let mut rng = rand::rng();
    let a: Vec<f64> = (0..65536).map(|_| rng.random::<f64>()).collect();

    for accel in [Acceleration::Scalar, Acceleration::detect()] {
        group.bench_function(format!("f64_{accel}"), |bencher| {
            bencher.iter(|| black_box(sum_kernel(accel, &a)))
        });
    }

    group.finish();
}

fn bench_gemm_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("gemm_kernel");
    let mut rng = rand::rng();
    let detected = Acceleration::detect();

    for size in [32, 128, 256] {
        let a: Vec<f32> = (0..size * size).map(|_| rng.random::<f32>()).collect();
        let b: Vec<f32> = (0..size * size).map(|_| rng.random::<f32>()).collect();
        let mut out = vec![0.0f32; size * size];

        for accel in [Acceleration::Scalar, detected] {
            group.bench_function(format!("f32_{accel}_{size}x{size}"), |bencher| {
                bencher.iter(|| {
                    gemm_kernel(accel, size, size, size, &a, &b, &mut out).unwrap();
                    black_box(&out);
                })
            });
        }
    }

    group.finish();
}

fn bench_transpose_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("transpose_2d_kernel");

    for (rows, cols) in [(64, 64), (512, 384)] {
        let src: Vec<f32> = (0..rows * cols).map(|i| i as f32).collect();
        let mut dst = vec![0.0f32; rows * cols];
        group.bench_function(format!("{rows}x{cols}"), |bencher| {
            bencher.iter(|| {
                transpose_2d_kernel(&src, rows, cols, &mut dst).unwrap();
                black_box(&dst);
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_dot_kernel,
    bench_binary_kernel,
    bench_sum_kernel,
    bench_gemm_kernel,
    bench_transpose_kernel
);
criterion_main!(benches);
