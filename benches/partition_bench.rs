//! Benchmarks for mesh partitioning and face storage construction.
//!
//! Run with: `cargo bench --bench partition_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dg_gpu::device::DeviceData;
use dg_gpu::local::LocalDiscretization;
use dg_gpu::mesh::{DgMesh, Mesh2D};
use dg_gpu::plan::{GivenOptions, PlanGivenData};
use dg_gpu::storage::build_face_storage_info;
use dg_gpu::{partition_greedy, PartitionData};

fn bench_partition_greedy(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_greedy");

    for n in [16, 32, 64] {
        let mesh = Mesh2D::uniform_rectangle(0.0, 1.0, 0.0, 1.0, n, n).unwrap();
        let graph = mesh.element_adjacency_graph();
        group.bench_with_input(BenchmarkId::new("grid", n * n), &graph, |b, graph| {
            b.iter(|| partition_greedy(black_box(graph), black_box(24)).unwrap())
        });
    }

    group.finish();
}

fn bench_partition_statistics(c: &mut Criterion) {
    let mesh = Mesh2D::uniform_rectangle(0.0, 1.0, 0.0, 1.0, 48, 48).unwrap();
    c.bench_function("partition_data_48x48", |b| {
        b.iter(|| PartitionData::compute(black_box(&mesh), black_box(24)).unwrap())
    });
}

fn bench_face_storage(c: &mut Criterion) {
    let mut group = c.benchmark_group("face_storage");

    let mesh = Mesh2D::uniform_rectangle(0.0, 1.0, 0.0, 1.0, 32, 32).unwrap();
    let partition = partition_greedy(&mesh.element_adjacency_graph(), 24).unwrap();
    for order in [1, 3, 5] {
        let ldis = LocalDiscretization::quadrilateral(order);
        let mut given = PlanGivenData::new(DeviceData::reference(), &ldis, GivenOptions::default());
        let mbs = 24usize.div_ceil(given.microblock.elements);
        given.post_decomposition(partition.block_count(), mbs).unwrap();
        group.bench_with_input(BenchmarkId::new("order", order), &ldis, |b, ldis| {
            b.iter(|| build_face_storage_info(&mesh, ldis, &partition, &given, false).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_partition_greedy,
    bench_partition_statistics,
    bench_face_storage
);
criterion_main!(benches);
