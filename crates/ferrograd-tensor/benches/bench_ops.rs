use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ferrograd_tensor::{matmul, ops, reduce, ExecutionContext, ExecutionStrategy, Seed, Tensor};

fn contexts() -> [(&'static str, ExecutionContext); 3] {
    [
        ("serial", ExecutionContext::serial()),
        ("parallel", ExecutionContext::default()),
        (
            "fixed_4",
            ExecutionContext::default().with_strategy(ExecutionStrategy::Fixed(4)),
        ),
    ]
}

fn bench_elementwise(c: &mut Criterion) {
    let mut group = c.benchmark_group("Elementwise");

    for (rows, cols) in [(256, 256), (1024, 1024)] {
        group.throughput(criterion::Throughput::Elements((rows * cols) as u64));
        let parameter_string = format!("{rows}x{cols}");

        let a = Tensor::<f32>::rand(&[rows, cols], Seed::Fixed(0)).unwrap();
        let b = Tensor::<f32>::rand(&[rows, cols], Seed::Fixed(1)).unwrap();
        let row = Tensor::<f32>::rand(&[cols], Seed::Fixed(2)).unwrap();
        let bt = b.transpose().unwrap();

        for (name, ctx) in contexts() {
            group.bench_with_input(
                BenchmarkId::new(format!("add_same_shape_{name}"), &parameter_string),
                &(&a, &b),
                |bencher, &(a, b)| bencher.iter(|| black_box(ops::add(&ctx, a, b, None).unwrap())),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("add_broadcast_row_{name}"), &parameter_string),
                &(&a, &row),
                |bencher, &(a, r)| bencher.iter(|| black_box(ops::add(&ctx, a, r, None).unwrap())),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("add_transposed_{name}"), &parameter_string),
                &(&a, &bt),
                |bencher, &(a, bt)| bencher.iter(|| black_box(ops::add(&ctx, a, bt, None).unwrap())),
            );
        }
    }
    group.finish();
}

fn bench_matmul(c: &mut Criterion) {
    let mut group = c.benchmark_group("Matmul");
    group.sample_size(20);

    for size in [64, 256, 512] {
        let parameter_string = format!("{size}x{size}");
        let a = Tensor::<f32>::rand(&[size, size], Seed::Fixed(3)).unwrap();
        let b = Tensor::<f32>::rand(&[size, size], Seed::Fixed(4)).unwrap();

        for (name, ctx) in contexts() {
            group.bench_with_input(
                BenchmarkId::new(format!("blocked_{name}"), &parameter_string),
                &(&a, &b),
                |bencher, &(a, b)| bencher.iter(|| black_box(matmul::matmul(&ctx, a, b).unwrap())),
            );
        }

        let ctx = ExecutionContext::default();
        group.bench_with_input(
            BenchmarkId::new("recursive_parallel", &parameter_string),
            &(&a, &b),
            |bencher, &(a, b)| {
                bencher.iter(|| black_box(matmul::matmul_recursive(&ctx, a, b).unwrap()))
            },
        );
    }
    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reduce");
    let t = Tensor::<f64>::rand(&[512, 512], Seed::Fixed(5)).unwrap();

    for (name, ctx) in contexts() {
        group.bench_function(format!("sum_{name}"), |bencher| {
            bencher.iter(|| black_box(reduce::sum(&ctx, &t, false).unwrap()))
        });
        group.bench_function(format!("max_{name}"), |bencher| {
            bencher.iter(|| black_box(reduce::max(&ctx, &t, false).unwrap()))
        });
    }
    let ctx = ExecutionContext::default();
    group.bench_function("sum_along_axis_0", |bencher| {
        bencher.iter(|| black_box(reduce::sum_along_axis(&ctx, &t, 0, false).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_elementwise, bench_matmul, bench_reduce);
criterion_main!(benches);
