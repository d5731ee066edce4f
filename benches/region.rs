//! Benchmarks for method body region layout and emission.
//!
//! Measures the full region lifecycle over a mixed population of tiny and
//! fat bodies:
//! - Admission with and without content sharing
//! - Layout assignment (two-pass offset/RVA computation)
//! - Emission into an in-memory sink

extern crate cilbody;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use cilbody::prelude::*;

/// A mixed body population: mostly tiny methods with some duplicates, plus
/// a tail of fat methods.
fn sample_bodies() -> Vec<MethodBody> {
    let mut bodies = Vec::with_capacity(1_000);
    for i in 0..900u32 {
        // 30 distinct tiny payloads, repeated
        let len = (i % 30 + 1) as usize;
        bodies.push(MethodBody::new(vec![(i % 30) as u8; len]));
    }
    for i in 0..100u32 {
        let len = 64 + (i % 200) as usize;
        bodies.push(MethodBody::new(vec![0x00; len]).with_max_stack(4));
    }
    bodies
}

fn bench_region_lifecycle(c: &mut Criterion) {
    c.bench_function("region_shared_1000_bodies", |b| {
        b.iter(|| {
            let mut region = MethodBodyRegion::new(true);
            for body in sample_bodies() {
                region.add(black_box(body)).unwrap();
            }
            region
                .set_position(FileOffset::new(0x200), Rva::new(0x2000))
                .unwrap();

            let mut output = Vec::new();
            region.write_to(&mut output).unwrap();
            black_box(output)
        });
    });

    c.bench_function("region_unshared_1000_bodies", |b| {
        b.iter(|| {
            let mut region = MethodBodyRegion::new(false);
            for body in sample_bodies() {
                region.add(black_box(body)).unwrap();
            }
            region
                .set_position(FileOffset::new(0x200), Rva::new(0x2000))
                .unwrap();

            let mut output = Vec::new();
            region.write_to(&mut output).unwrap();
            black_box(output)
        });
    });
}

criterion_group!(benches, bench_region_lifecycle);
criterion_main!(benches);
