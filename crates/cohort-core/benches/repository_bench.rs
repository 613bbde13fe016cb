//! # Repository Benchmarks
//!
//! Performance benchmarks for cohort-core repository operations.
//!
//! Run with: `cargo bench -p cohort-core`

use cohort_core::{
    AttributeDef, EntityDetail, Guid, InstanceHeader, InstanceKind, InstanceProperties,
    InstanceProvenanceType, InstanceStatus, InstanceType, MemoryStore, MetadataCollection,
    MetadataCollectionId, PropertyKind, PropertyValue, Repository, TypeDef, TypeRegistry,
    export_archive,
};
use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

const USER: &str = "bench";

fn registry() -> TypeRegistry {
    TypeRegistry::from_defs([
        TypeDef::new("t-asset", "Asset", InstanceKind::Entity).with_attribute(
            AttributeDef::new("qualifiedName", PropertyKind::String)
                .required()
                .unique(),
        ),
        TypeDef::new("t-flow", "DataFlow", InstanceKind::Relationship).with_ends("Asset", "Asset"),
    ])
    .expect("registry")
}

fn repository() -> Repository<MemoryStore> {
    Repository::new(
        MemoryStore::new(),
        MetadataCollectionId::new("bench-local"),
        Arc::new(registry()),
    )
    .expect("repository")
}

fn named(name: String) -> InstanceProperties {
    InstanceProperties::from([("qualifiedName".to_string(), PropertyValue::from(name))])
}

/// A hub entity with `size` spokes, each linked to the hub.
fn create_star(size: usize) -> (Repository<MemoryStore>, Guid) {
    let repo = repository();
    let hub = repo
        .add_entity(USER, "t-asset", named("hub".into()), Vec::new(), None)
        .expect("hub")
        .header
        .guid;
    for i in 0..size {
        let spoke = repo
            .add_entity(USER, "t-asset", named(format!("spoke{i}")), Vec::new(), None)
            .expect("spoke")
            .header
            .guid;
        repo.add_relationship(USER, "t-flow", InstanceProperties::new(), &hub, &spoke, None)
            .expect("relationship");
    }
    (repo, hub)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_add_entity(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_entity");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let repo = repository();
                for i in 0..size {
                    let _ = repo.add_entity(
                        USER,
                        "t-asset",
                        named(format!("e{i}")),
                        Vec::new(),
                        None,
                    );
                }
                black_box(repo)
            });
        });
    }

    group.finish();
}

fn bench_relationships_for_entity(c: &mut Criterion) {
    let mut group = c.benchmark_group("relationships_for_entity");

    for size in [100, 500, 1000].iter() {
        let (repo, hub) = create_star(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &hub, |b, hub| {
            b.iter(|| black_box(repo.get_relationships_for_entity(USER, hub)));
        });
    }

    group.finish();
}

fn bench_delete_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete_cascade");
    group.sample_size(20);

    for size in [100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_batched(
                || create_star(size),
                |(repo, hub)| black_box(repo.delete_entity(USER, "t-asset", "Asset", &hub)),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_save_reference_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("save_entity_reference_copy");
    let peer = MetadataCollectionId::new("bench-peer");

    for size in [100, 1000].iter() {
        let copies: Vec<EntityDetail> = (0..*size)
            .map(|i| {
                let header = InstanceHeader::new(
                    Guid::new(format!("copy-{i}")),
                    InstanceType::new("t-asset", "Asset", InstanceKind::Entity),
                    InstanceStatus::Active,
                    peer.clone(),
                    if i % 2 == 0 {
                        InstanceProvenanceType::ContentPack
                    } else {
                        InstanceProvenanceType::LocalCohort
                    },
                );
                EntityDetail::new(header, named(format!("copy{i}")))
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &copies, |b, copies| {
            b.iter(|| {
                let repo = repository();
                for copy in copies {
                    let _ = repo.save_entity_reference_copy(USER, copy.clone());
                }
                black_box(repo)
            });
        });
    }

    group.finish();
}

fn bench_export_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_archive");

    for size in [100, 500, 1000].iter() {
        let (repo, _) = create_star(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(export_archive(&repo, "bench", None)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_add_entity,
    bench_relationships_for_entity,
    bench_delete_cascade,
    bench_save_reference_copy,
    bench_export_archive,
);

criterion_main!(benches);
