// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Graph Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for Laplacian construction and decomposition at
//! typical parcellation sizes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nigsp_graph::graph::zero_crossings;
use nigsp_graph::laplacian::{build_laplacian, LaplacianOptions};
use nigsp_graph::spectral::decompose;
use nigsp_types::{Matrix, SignConvention};

const N_SMALL: usize = 16;
const N_ATLAS: usize = 90;

// ── Helpers ───────────────────────────────────────────────────────────

fn make_w(n: usize) -> Matrix {
    let mut w = Matrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let v = ((i * 7 + j * 13) as f64 * 0.11).sin().abs();
            w[(i, j)] = v;
            w[(j, i)] = v;
        }
    }
    w
}

// ── Laplacian benchmarks ──────────────────────────────────────────────

fn bench_laplacian_symmetric(c: &mut Criterion) {
    let w = make_w(N_ATLAS);
    let opts = LaplacianOptions::default();

    c.bench_function("laplacian_symmetric_90x90", |b| {
        b.iter(|| build_laplacian(black_box(&w), &opts))
    });
}

// ── Spectral benchmarks ───────────────────────────────────────────────

fn bench_decompose_small(c: &mut Criterion) {
    let lap = build_laplacian(&make_w(N_SMALL), &LaplacianOptions::default())
        .expect("laplacian");

    c.bench_function("decompose_16x16", |b| {
        b.iter(|| decompose(black_box(lap.matrix()), SignConvention::default()))
    });
}

fn bench_decompose_atlas(c: &mut Criterion) {
    let lap = build_laplacian(&make_w(N_ATLAS), &LaplacianOptions::default())
        .expect("laplacian");

    c.bench_function("decompose_90x90", |b| {
        b.iter(|| decompose(black_box(lap.matrix()), SignConvention::default()))
    });
}

fn bench_zero_crossings(c: &mut Criterion) {
    let w = make_w(N_ATLAS);
    let lap = build_laplacian(&w, &LaplacianOptions::default()).expect("laplacian");
    let eig = decompose(lap.matrix(), SignConvention::default()).expect("decompose");

    c.bench_function("zero_crossings_90", |b| {
        b.iter(|| zero_crossings(black_box(eig.eigenvectors()), &w))
    });
}

criterion_group!(laplacian, bench_laplacian_symmetric);
criterion_group!(
    spectral,
    bench_decompose_small,
    bench_decompose_atlas,
    bench_zero_crossings,
);
criterion_main!(laplacian, spectral);
