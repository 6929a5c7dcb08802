use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use foldermerge_lib::core::hasher::{hash_file, HashCache};
use foldermerge_lib::core::signature::signature_from_entries;
use tokio_util::sync::CancellationToken;

fn bench_hash_file(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();

    let mut group = c.benchmark_group("hash_file");
    for size in [64 * 1024usize, 1024 * 1024, 16 * 1024 * 1024] {
        let path = dir.path().join(format!("blob_{}", size));
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &path, |b, path| {
            b.iter(|| rt.block_on(hash_file(black_box(path), &token)).done().unwrap())
        });
    }
    group.finish();
}

fn bench_cache_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let path = dir.path().join("cached.bin");
    std::fs::write(&path, vec![7u8; 4 * 1024 * 1024]).unwrap();

    let mut cache = HashCache::new();
    rt.block_on(cache.key_for(&path, &token)).done().unwrap();

    c.bench_function("hash_cache_hit", |b| {
        b.iter(|| rt.block_on(cache.key_for(black_box(&path), &token)).done().unwrap())
    });
}

fn bench_signature(c: &mut Criterion) {
    let entries: Vec<(String, u64, String)> = (0..1000)
        .map(|i| {
            (
                format!("IMG_{:04}.jpg", 1000 - i),
                i as u64 * 1024,
                blake3::hash(format!("{}", i).as_bytes()).to_hex().to_string(),
            )
        })
        .collect();

    c.bench_function("folder_signature_1000", |b| {
        b.iter(|| signature_from_entries(black_box(entries.clone())))
    });
}

criterion_group!(benches, bench_hash_file, bench_cache_hit, bench_signature);
criterion_main!(benches);
