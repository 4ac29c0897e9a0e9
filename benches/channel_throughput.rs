// Throughput of a single channel's write/read round trip, solo (one
// process, one thread acting as both ends). Replaces the teacher's
// allocator microbenchmark with the hot path this crate actually cares
// about: copying writes and their matching reads.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cortez_mesh_ipc::{Channel, ChannelOptions, CreatePolicy};

fn unique_name(tag: &str) -> String {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("bench-{tag}-{}-{n}", std::process::id())
}

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_write_read");

    for &size in &[64usize, 1024, 16 * 1024] {
        let name = unique_name("throughput");
        let ch = Channel::join(
            &name,
            &ChannelOptions {
                size: 4 * 1024 * 1024,
                create_policy: CreatePolicy::CreateOnly,
            },
        )
        .expect("join");

        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                ch.write(200, &payload).expect("write");
                let msg = ch.read(None).expect("read");
                criterion::black_box(msg.payload().len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_read);
criterion_main!(benches);
