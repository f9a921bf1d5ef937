use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use optics_math::linalg::{pinv_truncated, svd_small};
use optics_math::symplectic::{identity4, mat_mul4, symplecticity_error};
use std::hint::black_box;

fn response_matrix(m: usize, n: usize) -> Array2<f64> {
    Array2::from_shape_fn((m, n), |(i, j)| {
        ((i as f64 * 0.37 + j as f64 * 1.13).sin() * (1.0 + 0.1 * j as f64)).exp_m1()
    })
}

fn bench_svd(c: &mut Criterion) {
    let bump = response_matrix(4, 4);
    let wide = response_matrix(8, 24);

    c.bench_function("svd_4x4_bump", |b| b.iter(|| svd_small(black_box(&bump))));
    c.bench_function("pinv_truncated_8x24", |b| {
        b.iter(|| pinv_truncated(black_box(&wide), 1e-10))
    });
}

fn bench_matrix_chain(c: &mut Criterion) {
    let mut cell = identity4();
    cell[0][1] = 10.0;
    cell[2][3] = 10.0;
    cell[1][0] = -0.05;
    cell[3][2] = 0.05;

    c.bench_function("transfer_chain_1000", |b| {
        b.iter(|| {
            let mut m = identity4();
            for _ in 0..1000 {
                m = mat_mul4(&cell, &m);
            }
            black_box(symplecticity_error(&m))
        })
    });
}

criterion_group!(benches, bench_svd, bench_matrix_chain);
criterion_main!(benches);
