use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quinfer::kernels::fused_matmul::mat_mul;
use quinfer::quant::{QuantScheme, QuantTensor};
use quinfer::tensor_pool::TensorPool;

fn bench_fused_matmul_schemes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fused_matmul_by_scheme");
    let k = 512;
    let n = 512;
    let weight_data = vec![0.3f32; k * n];
    let activations = vec![0.7f32; k];

    for scheme in [
        QuantScheme::Q8_0,
        QuantScheme::Q4_0,
        QuantScheme::Q4_1,
        QuantScheme::Q4_K,
        QuantScheme::Q6_K,
    ] {
        let weights = QuantTensor::quantize(scheme, &weight_data, k, n).unwrap();
        let pool = TensorPool::new();
        let mut out = vec![0.0f32; n];

        group.bench_with_input(BenchmarkId::from_parameter(scheme.name()), &scheme, |b, _| {
            b.iter(|| {
                mat_mul(&pool, black_box(&activations), black_box(&weights), &mut out, 1, k, n).unwrap();
            })
        });
    }
    group.finish();
}

fn bench_fused_matmul_batch_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("fused_matmul_by_row_count");
    let k = 256;
    let n = 256;
    let weight_data = vec![0.5f32; k * n];
    let weights = QuantTensor::quantize(QuantScheme::Q4_0, &weight_data, k, n).unwrap();
    let pool = TensorPool::new();

    for m in [1, 4, 8, 16] {
        let activations = vec![0.2f32; m * k];
        let mut out = vec![0.0f32; m * n];

        group.bench_with_input(BenchmarkId::from_parameter(m), &m, |b, &m| {
            b.iter(|| {
                mat_mul(&pool, black_box(&activations), black_box(&weights), &mut out, m, k, n).unwrap();
            })
        });
    }
    group.finish();
}

fn bench_tensor_pool_acquire(c: &mut Criterion) {
    let pool = TensorPool::new();
    c.bench_function("tensor_pool_acquire_release_64k", |b| {
        b.iter(|| {
            let buf = pool.acquire(black_box(65536));
            black_box(&buf);
        })
    });
}

criterion_group!(
    fused_matmul_benches,
    bench_fused_matmul_schemes,
    bench_fused_matmul_batch_rows,
);
criterion_group!(tensor_pool_benches, bench_tensor_pool_acquire);

criterion_main!(fused_matmul_benches, tensor_pool_benches);
