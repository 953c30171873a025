//! Benchmark: peer lookup and creation
//!
//! Measures the registry hit path, cold peer creation through a hierarchy
//! walk, and registry behavior under identity-hash collisions.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use peer_bridge::test_util::{activate_from_handle, FakeRuntime, OBJECT_CLASS};
use peer_bridge::typemap::PeerTypeRegistration;
use peer_bridge::{
    Bridge, ForeignRuntime, ManagedType, ObjectRef, Ownership, RefKind, TypeMapBackend, TypeMapKind,
};

static OBJECT: ManagedType =
    ManagedType::class("Java.Lang.Object").with_handle_initializer(activate_from_handle);
static VIEW: ManagedType = ManagedType::class("Android.Views.View")
    .extends(&OBJECT)
    .with_handle_initializer(activate_from_handle);

static REGISTRATIONS: [PeerTypeRegistration; 2] = [
    PeerTypeRegistration::new(&OBJECT, OBJECT_CLASS, None),
    PeerTypeRegistration::new(&VIEW, "android/view/View", None),
];

const DEPTH: usize = 8;

fn setup(kind: TypeMapKind) -> (Arc<FakeRuntime>, Bridge, String) {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.define_class("android/view/View", OBJECT_CLASS);
    let mut parent = "android/view/View".to_owned();
    for depth in 0..DEPTH {
        let name = format!("com/example/Deep{depth}");
        runtime.define_class(&name, &parent);
        parent = name;
    }
    let foreign: Arc<dyn ForeignRuntime> = runtime.clone();
    let bridge = Bridge::builder(foreign)
        .type_map(TypeMapBackend::from_registration_list(kind, REGISTRATIONS.iter()))
        .build();
    (runtime, bridge, parent)
}

fn bench_resolve_existing(c: &mut Criterion) {
    let (runtime, bridge, _) = setup(TypeMapKind::ExactTable);
    let handle = runtime.new_object("android/view/View");
    let peer = bridge
        .resolve_peer(handle, Ownership::DO_NOT_TRANSFER, None)
        .unwrap();

    c.bench_function("resolve_existing_peer", |b| {
        b.iter(|| {
            black_box(
                bridge
                    .resolve_peer(black_box(handle), Ownership::DO_NOT_TRANSFER, None)
                    .unwrap(),
            )
        });
    });

    drop(peer);
    runtime.delete_transient(handle);
}

fn bench_create_deep_subclass(c: &mut Criterion) {
    for kind in [
        TypeMapKind::ExactTable,
        TypeMapKind::HierarchyWalking,
        TypeMapKind::AttributeScan,
    ] {
        let (runtime, bridge, leaf) = setup(kind);
        c.bench_function(&format!("create_peer_depth_{DEPTH}_{kind:?}"), |b| {
            b.iter_batched(
                || runtime.new_object(&leaf),
                |handle| {
                    let peer = bridge
                        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None)
                        .unwrap();
                    black_box(&peer);
                    if let Some(peer) = peer {
                        bridge.dispose_peer(&*peer);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
}

fn bench_colliding_peek(c: &mut Criterion) {
    let (runtime, bridge, _) = setup(TypeMapKind::ExactTable);
    let handles: Vec<_> = (0..64)
        .map(|_| runtime.new_object_with_hash("android/view/View", Some(1)))
        .collect();
    let peers: Vec<_> = handles
        .iter()
        .map(|&h| bridge.resolve_peer(h, Ownership::DO_NOT_TRANSFER, None).unwrap())
        .collect();
    let first = ObjectRef::new(handles[0], RefKind::Transient);

    c.bench_function("peek_peer_64_way_collision", |b| {
        b.iter(|| black_box(bridge.peek_peer(black_box(first))));
    });

    drop(peers);
    for handle in handles {
        runtime.delete_transient(handle);
    }
}

criterion_group!(
    benches,
    bench_resolve_existing,
    bench_create_deep_subclass,
    bench_colliding_peek
);
criterion_main!(benches);
