use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use mesh_exchange::algs::communicator::NoComm;
use mesh_exchange::algs::token::{CommTokenBuilder, Token, TokenOperation};
use mesh_exchange::context::Context;
use mesh_exchange::data::cells::Cells;
use mesh_exchange::topology::block_layout::{BlockLayout, BlockLayoutMethod};

/// Every slot mirrors a pseudo-random home cell of a serial group.
fn scrambled_token(n: usize, ctx: &Context) -> Token {
    let mut cells = Cells::new(n);
    cells.update_global_base(&NoComm).unwrap();
    let slots: Vec<usize> = (0..n).collect();
    let globals: Vec<usize> = (0..n).map(|i| (i * 7919) % n).collect();
    let mut b = CommTokenBuilder::new();
    b.set_num_cells(n);
    b.build_global(&NoComm, ctx, &slots, Some(&globals), &cells).unwrap()
}

fn bench_token(c: &mut Criterion) {
    let ctx = Context::default();
    let mut group = c.benchmark_group("token");
    for &n in &[1_000usize, 100_000] {
        let token = scrambled_token(n, &ctx);
        let home: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut slots = vec![0.0; n];
        group.bench_with_input(BenchmarkId::new("get_copy", n), &n, |b, _| {
            b.iter(|| {
                token
                    .get(&NoComm, &ctx, TokenOperation::Copy, black_box(&home), &mut slots)
                    .unwrap()
            })
        });
        let wide: Vec<f64> = (0..3 * n).map(|i| i as f64).collect();
        let mut acc = vec![0.0; 3 * n];
        group.bench_with_input(BenchmarkId::new("put_v_add", n), &n, |b, _| {
            b.iter(|| {
                token
                    .put_v(&NoComm, &ctx, TokenOperation::Add, 3, black_box(&wide), &mut acc)
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_layout(c: &mut Criterion) {
    let layout = BlockLayout::new([64, 64, 64], BlockLayoutMethod::ColumnMajorZigZag).unwrap();
    c.bench_function("zigzag_roundtrip_64^3", |b| {
        b.iter(|| {
            let mut acc = 0usize;
            for a in 0..layout.num_blocks() {
                let coord = layout.get_coordinates(black_box(a)).unwrap();
                acc ^= layout.get_address(coord).unwrap();
            }
            acc
        })
    });
}

criterion_group!(benches, bench_token, bench_layout);
criterion_main!(benches);
