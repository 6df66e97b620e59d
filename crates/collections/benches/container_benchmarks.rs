//! Container benchmarks
//!
//! Heap push/pop throughput, heapify versus repeated push, and single-thread
//! versus parallel-writer stack appends.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nebula_collections::prelude::*;
use std::hint::black_box;

const SIZES: [usize; 3] = [64, 1024, 16 * 1024];

fn pseudo_random(n: usize) -> Vec<u32> {
    // xorshift keeps the input deterministic across runs
    let mut state = 0x9E37_79B9u32;
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        })
        .collect()
}

/// Push n entries then pop them all
fn bench_heap_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_push_pop");

    for size in SIZES {
        let priorities = pseudo_random(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &priorities, |b, input| {
            b.iter(|| {
                let mut heap: Heap<u32, u32> = Heap::new(input.len(), AllocatorTag::Temp).unwrap();
                for &p in input {
                    heap.push(p, p).unwrap();
                }
                while let Some(entry) = heap.try_pop().unwrap() {
                    black_box(entry);
                }
                heap.dispose().unwrap();
            });
        });
    }

    group.finish();
}

/// O(n) heapify against n sequential pushes
fn bench_heap_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_build");

    for size in SIZES {
        let entries: Vec<HeapEntry<u32, u32>> = pseudo_random(size)
            .into_iter()
            .map(|p| HeapEntry::new(p, p))
            .collect();
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("heapify", size), &entries, |b, input| {
            b.iter(|| {
                let mut heap = Heap::from_entries(input, AllocatorTag::Temp).unwrap();
                black_box(heap.peek().unwrap());
                heap.dispose().unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("repeated_push", size), &entries, |b, input| {
            b.iter(|| {
                let mut heap = Heap::new(input.len(), AllocatorTag::Temp).unwrap();
                for entry in input {
                    heap.push(entry.value, entry.priority).unwrap();
                }
                black_box(heap.peek().unwrap());
                heap.dispose().unwrap();
            });
        });
    }

    group.finish();
}

/// Owner pushes against four threads sharing a parallel writer
fn bench_stack_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_append");
    let size = 16 * 1024;
    group.throughput(Throughput::Elements(size as u64));

    group.bench_function("owner_push", |b| {
        b.iter(|| {
            let mut stack = Stack::new(0, AllocatorTag::Temp).unwrap();
            for i in 0..size as u64 {
                stack.push(i).unwrap();
            }
            black_box(stack.len().unwrap());
            stack.dispose().unwrap();
        });
    });

    group.bench_function("parallel_writer_4", |b| {
        b.iter(|| {
            let mut stack = Stack::new(size, AllocatorTag::Temp).unwrap();
            {
                let writer = stack.as_parallel_writer().unwrap();
                std::thread::scope(|scope| {
                    for t in 0..4u64 {
                        let writer = &writer;
                        scope.spawn(move || {
                            for i in 0..(size as u64 / 4) {
                                writer.push_no_resize(t * 1_000_000 + i).unwrap();
                            }
                        });
                    }
                });
            }
            black_box(stack.len().unwrap());
            stack.dispose().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_heap_push_pop,
    bench_heap_build,
    bench_stack_append
);
criterion_main!(benches);
