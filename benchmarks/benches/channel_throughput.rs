//! Channel throughput: SPSC and MPSC at several capacities and message counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spindle::{mpsc, spsc};
use spindle_benchmarks::{pump_mpsc, pump_spsc, MESSAGE_COUNTS};

fn bench_uncontended_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_round_trip");

    let (tx, rx) = spsc::<u64>(1024);
    group.bench_function("spsc", |b| {
        b.iter(|| {
            tx.try_push(black_box(1)).unwrap();
            black_box(rx.try_pop().unwrap())
        });
    });

    let (tx, rx) = mpsc::<u64>(1024);
    group.bench_function("mpsc", |b| {
        b.iter(|| {
            tx.try_push(black_box(1)).unwrap();
            black_box(rx.try_pop().unwrap())
        });
    });

    group.finish();
}

fn bench_spsc_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_throughput");

    for &messages in &MESSAGE_COUNTS {
        group.throughput(Throughput::Elements(messages as u64));
        for capacity in [16, 1024] {
            group.bench_with_input(
                BenchmarkId::new(format!("cap{capacity}"), messages),
                &messages,
                |b, &messages| b.iter(|| black_box(pump_spsc(capacity, messages))),
            );
        }
    }

    group.finish();
}

fn bench_mpsc_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpsc_throughput");

    for &messages in &MESSAGE_COUNTS {
        group.throughput(Throughput::Elements(messages as u64));
        for producers in [1, 2, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("{producers}_producers"), messages),
                &messages,
                |b, &messages| b.iter(|| black_box(pump_mpsc(256, producers, messages))),
            );
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_uncontended_round_trip,
    bench_spsc_throughput,
    bench_mpsc_throughput
);
criterion_main!(benches);
