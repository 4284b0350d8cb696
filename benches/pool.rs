use browsernet::socket::pool::{ConnectionPool, PoolConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Pool bookkeeping only: handles are plain integers, so no I/O is involved.
fn benchmark_pool_operations(c: &mut Criterion) {
    c.bench_function("pool_new", |b| {
        b.iter(|| black_box(ConnectionPool::<u32>::new(PoolConfig::default())))
    });

    let pool = ConnectionPool::<u32>::new(PoolConfig::default());
    c.bench_function("pool_release_acquire", |b| {
        b.iter(|| {
            pool.release("example.com", 443, 1);
            black_box(pool.acquire("example.com", 443))
        })
    });

    let busy = ConnectionPool::<u32>::new(PoolConfig::default());
    for i in 0..30u32 {
        let host = format!("host{}.example", i % 10);
        busy.release(&host, 443, i);
    }
    c.bench_function("pool_stats", |b| {
        b.iter(|| {
            black_box(busy.count());
            black_box(busy.idle_count("host3.example", 443));
        })
    });
}

criterion_group!(benches, benchmark_pool_operations);
criterion_main!(benches);
