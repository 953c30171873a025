//! Tests for peer creation: type resolution, target hints, invokers and
//! the failure modes of activation.
//!
//! Every test ends with the fake runtime's handle tables balanced, so a
//! leaked or double-released reference fails the test that caused it.

mod common;

use std::sync::Arc;

use common::*;
use peer_bridge::test_util::{FakeRuntime, OBJECT_CLASS};
use peer_bridge::{
    BridgeConfig, BridgeError, ForeignRuntime, Handle, Ownership, Peer, PeerState, RefKind,
    TypeMapKind,
};

fn release(runtime: &FakeRuntime, handle: Handle) {
    runtime.delete_transient(handle);
}

/// Test that an object of a bound class gets a peer of exactly that type.
#[test]
fn test_exact_class_resolves_to_bound_type() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(BUTTON_CLASS);

    let peer = bridge
        .resolve_peer(handle, Ownership::DO_NOT_TRANSFER, None)
        .expect("creation should succeed")
        .expect("a peer should be created");

    assert_eq!(peer.managed_type(), &BUTTON);
    assert_eq!(peer.reference().kind(), RefKind::Durable);
    assert_ne!(peer.reference().handle(), handle, "peer must hold its own reference");
    assert_eq!(peer.identity_hash(), runtime.identity_hash(handle));
    assert_eq!(bridge.registry().len(), 1);

    release(&runtime, handle);
    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that an unbound subclass resolves to the nearest bound ancestor.
#[test]
fn test_unbound_subclass_walks_hierarchy() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(FANCY_BUTTON_CLASS);

    let peer = bridge
        .resolve_peer(handle, Ownership::DO_NOT_TRANSFER, None)
        .unwrap()
        .unwrap();
    assert_eq!(peer.managed_type(), &BUTTON);

    release(&runtime, handle);
    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that the hierarchy walk result is cached under the exact class name.
#[test]
fn test_hierarchy_walk_is_cached() {
    let runtime = runtime();
    let bridge = bridge(&runtime);

    let first = runtime.new_object(FANCY_BUTTON_CLASS);
    let second = runtime.new_object(FANCY_BUTTON_CLASS);
    let a = bridge.resolve_peer(first, Ownership::TRANSFER_TRANSIENT, None).unwrap().unwrap();
    let hits_before = bridge.metrics().total_type_cache_hits();
    let b = bridge.resolve_peer(second, Ownership::TRANSFER_TRANSIENT, None).unwrap().unwrap();

    assert_eq!(a.managed_type(), b.managed_type());
    assert_eq!(bridge.metrics().total_type_cache_hits(), hits_before + 1);

    drop((a, b));
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a class with no bound ancestor fails with a missing mapping.
#[test]
fn test_unbound_root_is_missing_mapping() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(ORPHAN_CLASS);

    let err = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None)
        .unwrap_err();
    assert!(
        matches!(&err, BridgeError::MissingMapping { class_name } if class_name == ORPHAN_CLASS),
        "unexpected error: {err}"
    );
    assert!(err.to_string().contains(ORPHAN_CLASS));
    assert!(bridge.registry().is_empty());

    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a target hint supplies the type when nothing is bound.
#[test]
fn test_target_hint_used_when_unbound() {
    let runtime = runtime();
    let bridge = bridge_with(&runtime, BridgeConfig::new().with_strict_assignability(false));
    let handle = runtime.new_object(ORPHAN_CLASS);

    let peer = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, Some(&VIEW))
        .unwrap()
        .expect("lenient creation should proceed");
    assert_eq!(peer.managed_type(), &VIEW);

    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a target hint does not override a more specific resolved type.
#[test]
fn test_target_hint_keeps_assignable_resolved_type() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(BUTTON_CLASS);

    let peer = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, Some(&VIEW))
        .unwrap()
        .unwrap();
    assert_eq!(peer.managed_type(), &BUTTON);

    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that an interface target is substituted with its invoker.
#[test]
fn test_interface_target_uses_invoker() {
    for kind in [
        TypeMapKind::ExactTable,
        TypeMapKind::HierarchyWalking,
        TypeMapKind::AttributeScan,
    ] {
        let runtime = runtime();
        let bridge = bridge_with(&runtime, BridgeConfig::new().with_type_map(kind));
        let handle = runtime.new_object(TASK_CLASS);

        let peer = bridge
            .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, Some(&RUNNABLE))
            .unwrap()
            .unwrap();
        assert_eq!(peer.managed_type(), &RUNNABLE_INVOKER, "backend {kind:?}");
        assert!(peer.managed_type().is_assignable_to(&RUNNABLE));

        drop(peer);
        drop(bridge);
        runtime.assert_balanced();
    }
}

/// Test that an abstract bound ancestor is substituted with its invoker.
#[test]
fn test_abstract_ancestor_uses_invoker() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(LIST_VIEW_CLASS);

    let peer = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None)
        .unwrap()
        .unwrap();
    assert_eq!(peer.managed_type(), &ABS_LIST_VIEW_INVOKER);

    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that an interface with no invoker fails with a missing invoker.
#[test]
fn test_interface_without_invoker_fails() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(PARCEL_CLASS);

    let err = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, Some(&PARCELABLE))
        .unwrap_err();
    assert!(matches!(err, BridgeError::MissingInvoker { type_name } if type_name == PARCELABLE.name()));

    drop(bridge);
    runtime.assert_balanced();
}

/// Test that an open generic definition cannot be activated.
#[test]
fn test_generic_definition_rejected() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(GENERIC_CLASS);

    let err = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None)
        .unwrap_err();
    assert!(matches!(err, BridgeError::OpenGenericType { .. }), "unexpected error: {err}");

    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a type with no initializer fails with a descriptive error.
#[test]
fn test_missing_initializer() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(NO_INIT_CLASS);

    let err = bridge
        .resolve_peer(handle, Ownership::DO_NOT_TRANSFER, None)
        .unwrap_err();
    assert!(
        err.to_string()
            .starts_with("Unable to activate instance of type Example.NoInit from native handle"),
        "unexpected message: {err}"
    );
    assert!(bridge.registry().is_empty());

    release(&runtime, handle);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a reference-initialized peer is marked replaceable.
#[test]
fn test_reference_initializer_marks_replaceable() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(REF_ONLY_CLASS);

    let peer = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None)
        .unwrap()
        .unwrap();
    assert_eq!(peer.managed_type(), &REF_ONLY);
    assert!(peer.state().contains(PeerState::REPLACEABLE));
    assert!(!peer.state().contains(PeerState::ACTIVATABLE));

    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that GC user peers are flagged replaceable and activatable.
#[test]
fn test_gc_user_peer_flags() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(BUTTON_CLASS);
    runtime.mark_gc_user_peer(handle);

    let peer = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None)
        .unwrap()
        .unwrap();
    assert_eq!(peer.state(), PeerState::REPLACEABLE | PeerState::ACTIVATABLE);

    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a strict assignability mismatch yields no peer.
#[test]
fn test_strict_mismatch_returns_none() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(VIEW_CLASS);

    let peer = bridge
        .resolve_peer(handle, Ownership::DO_NOT_TRANSFER, Some(&BUTTON))
        .expect("a mismatch is not an error");
    assert!(peer.is_none());
    assert!(bridge.registry().is_empty());
    assert!(runtime.is_alive(handle), "caller keeps its handle");

    release(&runtime, handle);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a lenient assignability mismatch still creates the peer.
#[test]
fn test_lenient_mismatch_creates_peer() {
    let runtime = runtime();
    let bridge = bridge_with(&runtime, BridgeConfig::new().with_strict_assignability(false));
    let handle = runtime.new_object(VIEW_CLASS);

    let peer = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, Some(&BUTTON))
        .unwrap()
        .unwrap();
    assert_eq!(peer.managed_type(), &BUTTON);

    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a type bound to no foreign name cannot be checked.
#[test]
fn test_unknown_foreign_name() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(OBJECT_CLASS);

    let err = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, Some(&STRAY))
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnknownForeignName { .. }), "unexpected error: {err}");

    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a bound foreign class missing from the runtime is reported.
#[test]
fn test_foreign_class_not_found() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(OBJECT_CLASS);

    let err = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, Some(&GHOST))
        .unwrap_err();
    assert!(
        matches!(&err, BridgeError::ForeignClassNotFound { class_name } if class_name == GHOST_CLASS),
        "unexpected error: {err}"
    );

    drop(bridge);
    runtime.assert_balanced();
}

/// Test that each transfer mode releases the incoming handle correctly.
#[test]
fn test_transfer_modes_release_incoming_handle() {
    let runtime = runtime();
    let bridge = bridge(&runtime);

    let borrowed = runtime.new_object(BUTTON_CLASS);
    let a = bridge.resolve_peer(borrowed, Ownership::DO_NOT_TRANSFER, None).unwrap().unwrap();
    assert!(runtime.is_alive(borrowed));
    release(&runtime, borrowed);

    let transient = runtime.new_object(BUTTON_CLASS);
    let b = bridge.resolve_peer(transient, Ownership::TRANSFER_TRANSIENT, None).unwrap().unwrap();

    let object = runtime.new_object(BUTTON_CLASS);
    let durable = runtime.new_durable(object);
    release(&runtime, object);
    let c = bridge.resolve_peer(durable, Ownership::TRANSFER_DURABLE, None).unwrap().unwrap();

    assert_eq!(runtime.outstanding(RefKind::Transient), 0);
    assert_eq!(runtime.outstanding(RefKind::Durable), 3, "one durable per peer");

    drop((a, b, c));
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that the incoming handle is released even when creation fails.
#[test]
fn test_transfer_released_on_failure() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(NO_INIT_CLASS);

    assert!(bridge.resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None).is_err());
    assert_eq!(runtime.outstanding(RefKind::Transient), 0);

    drop(bridge);
    runtime.assert_balanced();
}

/// Test that an unregistered creation leaves the registry untouched.
#[test]
fn test_do_not_register() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(BUTTON_CLASS);

    let peer = bridge
        .creator()
        .create_peer(handle, Ownership::DO_NOT_TRANSFER.do_not_register(), None)
        .unwrap()
        .unwrap();
    assert!(bridge.registry().is_empty());
    assert!(bridge.peek_peer(peer.reference()).is_none());

    release(&runtime, handle);
    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a null handle yields no peer and no error.
#[test]
fn test_null_handle() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    assert!(bridge
        .resolve_peer(Handle::NULL, Ownership::TRANSFER_TRANSIENT, None)
        .unwrap()
        .is_none());
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that resolving the same object twice returns the same peer.
#[test]
fn test_resolve_returns_existing_peer() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let handle = runtime.new_object(BUTTON_CLASS);
    let alias = runtime.new_transient(handle);

    let first = bridge.resolve_peer(handle, Ownership::DO_NOT_TRANSFER, None).unwrap().unwrap();
    let second = bridge.resolve_peer(alias, Ownership::TRANSFER_TRANSIENT, Some(&VIEW)).unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(bridge.metrics().total_peers_created(), 1);

    release(&runtime, handle);
    drop((first, second));
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that an existing peer of an unsuitable type is not returned for a
/// more specific target.
#[test]
fn test_existing_peer_of_wrong_type_is_not_reused() {
    let runtime = runtime();
    let bridge = bridge_with(&runtime, BridgeConfig::new().with_strict_assignability(false));
    let handle = runtime.new_object(VIEW_CLASS);

    let view = bridge.resolve_peer(handle, Ownership::DO_NOT_TRANSFER, None).unwrap().unwrap();
    let button = bridge
        .resolve_peer(handle, Ownership::DO_NOT_TRANSFER, Some(&BUTTON))
        .unwrap()
        .unwrap();

    assert!(!Arc::ptr_eq(&view, &button));
    assert_eq!(button.managed_type(), &BUTTON);

    release(&runtime, handle);
    drop((view, button));
    drop(bridge);
    runtime.assert_balanced();
}
