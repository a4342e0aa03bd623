use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use fingermapper::config::UmapOptions;
use fingermapper::knn::batch_knn_euclidean;
use fingermapper::mapper::Dbscan;
use fingermapper::umap::Umap;
use ndarray::Array2;
use rand::prelude::*;
use rand::rngs::StdRng;

fn random_matrix(rows: usize, cols: usize) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(0);
    Array2::from_shape_simple_fn((rows, cols), || rng.random_range(-1.0..1.0))
}

fn bench_knn(c: &mut Criterion) {
    let mut group = c.benchmark_group("kNN");
    // 80 张图片的规模，与实验数据集一致
    let data = random_matrix(80, 512);
    group.throughput(Throughput::Elements((data.nrows() * data.nrows()) as u64));
    group.bench_function("batch_knn_euclidean_80x512", |b| {
        b.iter(|| batch_knn_euclidean(black_box(data.view()), data.view(), 10))
    });
    let data = random_matrix(1000, 512);
    group.bench_function("batch_knn_euclidean_1000x512", |b| {
        b.iter(|| batch_knn_euclidean(black_box(data.view()), data.view(), 10))
    });
    group.finish();
}

fn bench_dbscan(c: &mut Criterion) {
    let mut group = c.benchmark_group("DBSCAN");
    let data = random_matrix(500, 2) * 5.0;
    let dbscan = Dbscan::new(0.5, 3);
    group.bench_function("dbscan_500x2", |b| b.iter(|| dbscan.fit(black_box(data.view()))));
    group.finish();
}

fn bench_umap(c: &mut Criterion) {
    let mut group = c.benchmark_group("UMAP");
    group.sample_size(10);
    let data = random_matrix(200, 64);
    let umap = Umap::new(UmapOptions { n_epochs: Some(100), ..UmapOptions::default() });
    group.bench_function("fit_transform_200x64", |b| b.iter(|| umap.fit_transform(black_box(data.view()))));
    group.finish();
}

criterion_group!(benches, bench_knn, bench_dbscan, bench_umap);
criterion_main!(benches);
