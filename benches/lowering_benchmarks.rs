//! Benchmarks for the pass pipeline and AST construction.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashSet;
use tensorpoly::graph::{DataType, Program, ProgramBuilder};
use tensorpoly::pass::{apply, PassRegistry, Target};
use tensorpoly::polyhedral::parse::parse_set;
use tensorpoly::{lower, LoweringRequest, StageDesc};

/// `layers` chained `relu(matmul(x, w) + b)` blocks.
fn mlp(layers: usize) -> Program {
    let mut b = ProgramBuilder::new();
    let mut x = b.input("x", vec![64, 64], DataType::Float32).unwrap();
    for l in 0..layers {
        let w = b.input(&format!("w{}", l), vec![64, 64], DataType::Float32).unwrap();
        let bias = b.input(&format!("b{}", l), vec![64, 64], DataType::Float32).unwrap();
        let v = b.matmul(x, w, &format!("mm{}", l)).unwrap();
        let s = b.add(v, bias, &format!("add{}", l)).unwrap();
        x = b.relu(s, &format!("act{}", l)).unwrap();
    }
    b.build()
}

/// Benchmark the default pass pipeline on a GPU target.
fn bench_passes(c: &mut Criterion) {
    let registry = PassRegistry::with_builtin_passes();
    let program = mlp(32);
    let fetch: HashSet<String> = ["act31".to_string()].into_iter().collect();
    let passes = ["remove_identity", "gemm_rewriter", "dead_code_elimination"];

    c.bench_function("passes_mlp_32", |b| {
        b.iter(|| {
            let mut p = program.clone();
            apply(&registry, &mut p, black_box(&fetch), &Target::nvgpu(), &passes).unwrap();
            p
        })
    });
}

/// Benchmark parsing of set notation.
fn bench_parse(c: &mut Criterion) {
    let text = "[N, M] -> { S[i, j, k] : 0 <= i < N and 0 <= j < M and 0 <= k <= i + j and 2k <= N }";
    c.bench_function("parse_set", |b| b.iter(|| parse_set(black_box(text)).unwrap()));
}

/// Benchmark AST construction.
fn bench_lowering(c: &mut Criterion) {
    let triangle = LoweringRequest {
        context: "[N] -> { : N >= 1 }".into(),
        stages: vec![
            StageDesc::new("[N] -> { S[i, j, k] : 0 <= i < N and 0 <= j <= i and 0 <= k < N }"),
        ],
        ..Default::default()
    };
    c.bench_function("lower_triangle", |b| b.iter(|| lower(black_box(&triangle)).unwrap()));

    let fused = LoweringRequest {
        context: "[N] -> { : N >= 1 }".into(),
        stages: vec![
            StageDesc::new("[N] -> { A[i, j] : 0 <= i < N and 0 <= j < N }")
                .with_schedule("[N] -> { A[i, j] -> [i, j, 0] }"),
            StageDesc::new("[N] -> { B[i, j] : 0 <= i < N and i <= j < N }")
                .with_schedule("[N] -> { B[i, j] -> [i, j, 1] }"),
            StageDesc::new("[N] -> { C[i] : 0 <= i < N }").with_schedule("[N] -> { C[i] -> [i, 0, 2] }"),
        ],
        ..Default::default()
    };
    c.bench_function("lower_fused_three_stages", |b| b.iter(|| lower(black_box(&fused)).unwrap()));

    let unrolled = LoweringRequest {
        stages: vec![StageDesc::new("{ S[i, j] : 0 <= i < 16 and 0 <= j < 16 }")],
        build_options: "{ unroll[1] }".into(),
        ..Default::default()
    };
    c.bench_function("lower_unroll_16x16", |b| b.iter(|| lower(black_box(&unrolled)).unwrap()));
}

criterion_group!(benches, bench_passes, bench_parse, bench_lowering);
criterion_main!(benches);
