//! Benchmarks for grid commitments and the checks the ledger runs per call

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use battleship::game::grid::{validate_fleet, validate_hit_pattern, Coordinate, Grid};
use battleship::proof::commitment::verify_grid_root;
use battleship::proof::merkle::{build_tree, verify_proof};

fn sample_grid(seed: u64) -> Grid {
    Grid::random(&mut StdRng::seed_from_u64(seed))
}

fn bench_build_tree(c: &mut Criterion) {
    let grid = sample_grid(1);

    c.bench_function("build_tree", |b| {
        b.iter(|| {
            let (_, root) = build_tree(black_box(&grid));
            black_box(root)
        })
    });
}

fn bench_verify_proof(c: &mut Criterion) {
    let grid = sample_grid(2);
    let (tree, root) = build_tree(&grid);
    let index = 57;
    let proof = tree.generate_proof(index).unwrap();
    let leaf = grid.cells()[index].leaf_hash();

    c.bench_function("verify_proof", |b| {
        b.iter(|| verify_proof(black_box(&root), black_box(&proof), black_box(index), black_box(&leaf)))
    });
}

fn bench_winner_reveal(c: &mut Criterion) {
    let grid = sample_grid(3);
    let (_, root) = build_tree(&grid);
    let cells = grid.cells().to_vec();

    let mut group = c.benchmark_group("winner_reveal");

    group.bench_function("root_check", |b| {
        b.iter(|| verify_grid_root(black_box(&cells), black_box(&root)))
    });

    group.bench_function("fleet_check", |b| {
        b.iter(|| validate_fleet(black_box(&cells)).is_ok())
    });

    group.finish();
}

fn bench_hit_pattern(c: &mut Criterion) {
    let hits: Vec<Coordinate> = sample_grid(4).occupied();

    c.bench_function("hit_pattern_17", |b| {
        b.iter(|| validate_hit_pattern(black_box(&hits)))
    });
}

criterion_group!(
    benches,
    bench_build_tree,
    bench_verify_proof,
    bench_winner_reveal,
    bench_hit_pattern,
);
criterion_main!(benches);
