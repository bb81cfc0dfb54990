/// Fingerprint computation benchmarks
/// Measures streaming SHA-256 throughput on the staging write path
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dedupstore::infrastructure::storage::ContentHasher;
use std::io::Cursor;
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn fingerprint_benchmarks(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fingerprint");
    group.measurement_time(Duration::from_secs(10));

    for size in [1024, 64 * 1024, 1024 * 1024, 10 * 1024 * 1024].iter() {
        let size = *size;
        group.throughput(Throughput::Bytes(size as u64));

        // Streaming hash-while-write, the hot path of every ingestion
        group.bench_with_input(BenchmarkId::new("write_and_hash", size), &size, |b, &s| {
            let temp_dir = TempDir::new().unwrap();
            b.to_async(&rt).iter_custom(|iters| {
                let temp_dir = temp_dir.path().to_path_buf();
                async move {
                    let mut total_duration = Duration::default();
                    for i in 0..iters {
                        let mut data = vec![0u8; s];
                        // Make each iteration unique to avoid deduplication
                        let prefix = i.to_le_bytes();
                        for (j, byte) in prefix.iter().enumerate() {
                            if j < data.len() {
                                data[j] = *byte;
                            }
                        }

                        let start = std::time::Instant::now();
                        let path = temp_dir.join(format!("stage_{}.tmp", i));
                        let reader = Cursor::new(data);
                        ContentHasher::write_and_hash(&path, reader, u64::MAX, false)
                            .await
                            .unwrap();
                        total_duration += start.elapsed();
                    }
                    total_duration
                }
            })
        });

        // Pure SHA-256 computation (without I/O)
        group.bench_with_input(BenchmarkId::new("hash_bytes", size), &size, |b, &s| {
            let mut data = vec![0u8; s];
            for (i, item) in data.iter_mut().enumerate() {
                *item = (i % 256) as u8;
            }

            b.iter(|| {
                let fingerprint = ContentHasher::hash_bytes(&data);
                std::hint::black_box(fingerprint);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, fingerprint_benchmarks);
criterion_main!(benches);
