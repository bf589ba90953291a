//! Benchmarks for identifier pools and the NDP registry.
//!
//! Run with: cargo bench --bench pool

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nanmgr::ndl::NdlTable;
use nanmgr::ndp::NdpRegistry;
use nanmgr::{IdentifierPool, MacAddr};

fn peer(val: u8) -> MacAddr {
    MacAddr::new([0x02, 0, 0, 0, 0, val])
}

/// Pool of `capacity` with every id but the last allocated.
fn nearly_full(capacity: u16) -> IdentifierPool {
    let mut pool = IdentifierPool::new(capacity);
    for _ in 1..capacity {
        let _ = pool.allocate_first();
    }
    pool
}

// ===== IdentifierPool Benchmarks =====

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_allocate");

    for capacity in [8u16, 64, 255] {
        let base = nearly_full(capacity);
        group.bench_with_input(
            BenchmarkId::new("first_fit_nearly_full", capacity),
            &base,
            |b, base| {
                b.iter(|| {
                    let mut pool = base.clone();
                    black_box(pool.allocate_first())
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("hinted_nearly_full", capacity),
            &base,
            |b, base| {
                b.iter(|| {
                    let mut pool = base.clone();
                    black_box(pool.allocate(black_box(capacity / 2)))
                })
            },
        );
    }

    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_churn");

    group.bench_function("allocate_free_255", |b| {
        let mut pool = IdentifierPool::new(255);
        b.iter(|| {
            if let Ok(id) = pool.allocate_first() {
                let _ = pool.free(black_box(id));
            }
        })
    });

    group.finish();
}

// ===== NdpRegistry Benchmarks =====

fn bench_ndp_entry(c: &mut Criterion) {
    let mut group = c.benchmark_group("ndp_entry");

    group.bench_function("new_del_shared_slot", |b| {
        let mut registry = NdpRegistry::new(8);
        let mut ndl = NdlTable::new(8, 2);
        b.iter(|| {
            let Ok(id) = registry.allocate_id() else {
                return;
            };
            if let Some(slot) = ndl.get_or_create_slot(black_box(peer(1))) {
                if registry.new_entry(&mut ndl, id, slot, peer(0x50), 1).is_ok() {
                    black_box(registry.del_entry(&mut ndl, id));
                    return;
                }
            }
            let _ = registry.release_id(id);
        })
    });

    group.bench_function("lookup_by_slot_ndi", |b| {
        let mut registry = NdpRegistry::new(8);
        let mut ndl = NdlTable::new(8, 2);
        for i in 0..8u8 {
            if let (Ok(id), Some(slot)) = (registry.allocate_id(), ndl.get_or_create_slot(peer(i + 1))) {
                let _ = registry.new_entry(&mut ndl, id, slot, peer(0x50 + i), u64::from(i));
            }
        }
        let vif = ndl.vif_id(7);
        b.iter(|| black_box(registry.ndp_for_slot_ndi(&ndl, black_box(vif), peer(0x57))))
    });

    group.finish();
}

criterion_group!(benches, bench_allocate, bench_churn, bench_ndp_entry);
criterion_main!(benches);
