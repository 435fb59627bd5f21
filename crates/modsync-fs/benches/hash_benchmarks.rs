use criterion::{Criterion, black_box, criterion_group, criterion_main};
use modsync_fs::ContentHasher;
use std::fs;
use tempfile::tempdir;

fn hash_small_file_benchmark(c: &mut Criterion) {
    c.bench_function("ContentHasher::hash_file (64 KiB, full)", |b| {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.dll");
        fs::write(&path, vec![7u8; 64 * 1024]).unwrap();
        let hasher = ContentHasher::new();

        b.iter(|| hasher.hash_file(black_box(&path)).unwrap())
    });
}

fn hash_large_file_benchmark(c: &mut Criterion) {
    c.bench_function("ContentHasher::hash_file (32 MiB, sampled)", |b| {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.bin");
        fs::write(&path, vec![7u8; 32 * 1024 * 1024]).unwrap();
        let hasher = ContentHasher::new();

        b.iter(|| hasher.hash_file(black_box(&path)).unwrap())
    });
}

criterion_group!(benches, hash_small_file_benchmark, hash_large_file_benchmark);
criterion_main!(benches);
