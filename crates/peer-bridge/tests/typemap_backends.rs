//! Tests that the three type map backends agree, and that each can be
//! populated the way it is meant to be.

mod common;

use std::sync::Arc;

use common::*;
use peer_bridge::register_peer_type;
use peer_bridge::test_util::{activate_from_handle, OBJECT_CLASS};
use peer_bridge::typemap::{
    AttributeTypeMap, ExactTable, HierarchyTypeMap, InvokerEntry, PackageLookup,
    PeerTypeRegistration, TypeMapEntry,
};
use peer_bridge::{
    Bridge, BridgeConfig, ForeignRuntime, ManagedType, Ownership, Peer, TypeMap, TypeMapBackend,
    TypeMapKind,
};

const ALL_KINDS: [TypeMapKind; 3] = [
    TypeMapKind::ExactTable,
    TypeMapKind::HierarchyWalking,
    TypeMapKind::AttributeScan,
];

static SCANNED_WIDGET: ManagedType = ManagedType::class("Example.Scan.Widget")
    .extends(&OBJECT)
    .with_handle_initializer(activate_from_handle);
register_peer_type!(SCANNED_WIDGET, "com/example/scan/Widget");

static SCANNED_LISTENER: ManagedType = ManagedType::interface("Example.Scan.IListener");
static SCANNED_LISTENER_INVOKER_INTERFACES: [&ManagedType; 1] = [&SCANNED_LISTENER];
static SCANNED_LISTENER_INVOKER: ManagedType = ManagedType::class("Example.Scan.IListenerInvoker")
    .extends(&OBJECT)
    .implements(&SCANNED_LISTENER_INVOKER_INTERFACES)
    .with_handle_initializer(activate_from_handle);
register_peer_type!(
    SCANNED_LISTENER,
    "com/example/scan/Listener",
    invoker = SCANNED_LISTENER_INVOKER,
);

/// Test that every backend resolves every registered name both ways.
#[test]
fn test_backends_agree_on_registrations() {
    let maps: Vec<TypeMapBackend> = ALL_KINDS.into_iter().map(type_map).collect();
    for reg in &REGISTRATIONS {
        for map in &maps {
            assert_eq!(
                map.try_resolve_managed_type(reg.foreign_name()),
                Some(reg.managed_type()),
                "{:?} forward lookup of {}",
                map.kind(),
                reg.foreign_name()
            );
            assert_eq!(
                map.try_resolve_foreign_name(reg.managed_type()).as_deref(),
                Some(reg.foreign_name()),
                "{:?} reverse lookup of {}",
                map.kind(),
                reg.managed_type()
            );
            assert_eq!(
                map.try_resolve_invoker_type(reg.managed_type()),
                reg.invoker(),
                "{:?} invoker of {}",
                map.kind(),
                reg.managed_type()
            );
        }
    }
}

/// Test that invokers reverse-resolve to the name of the type they stand in
/// for, in every backend.
#[test]
fn test_invoker_reverse_lookup() {
    for kind in ALL_KINDS {
        let map = type_map(kind);
        assert_eq!(
            map.try_resolve_foreign_name(&RUNNABLE_INVOKER).as_deref(),
            Some(RUNNABLE_CLASS),
            "{kind:?}"
        );
        assert_eq!(
            map.try_resolve_foreign_name(&ABS_LIST_VIEW_INVOKER).as_deref(),
            Some(ABS_LIST_VIEW_CLASS),
            "{kind:?}"
        );
    }
}

static CALLBACK: ManagedType = ManagedType::interface("Example.ICallback");
/// Invoker whose name does not follow the `Invoker` suffix convention and
/// which shares no ancestry with the interface it stands in for.
static CALLBACK_PROXY: ManagedType = ManagedType::class("Example.CallbackProxy")
    .extends(&OBJECT)
    .with_handle_initializer(activate_from_handle);
static CALLBACK_REGISTRATIONS: [PeerTypeRegistration; 2] = [
    PeerTypeRegistration::new(&OBJECT, OBJECT_CLASS, None),
    PeerTypeRegistration::new(&CALLBACK, "com/example/Callback", Some(&CALLBACK_PROXY)),
];

/// Test that every backend honours the invoker named by a registration,
/// whatever that invoker is called.
#[test]
fn test_backends_agree_on_unconventional_invoker() {
    for kind in ALL_KINDS {
        let map = TypeMapBackend::from_registration_list(kind, CALLBACK_REGISTRATIONS.iter());
        assert_eq!(
            map.try_resolve_invoker_type(&CALLBACK),
            Some(&CALLBACK_PROXY),
            "{kind:?}"
        );
        assert_eq!(
            map.try_resolve_foreign_name(&CALLBACK_PROXY).as_deref(),
            Some("com/example/Callback"),
            "{kind:?}"
        );
    }
}

/// Test that no backend walks the foreign hierarchy on its own.
#[test]
fn test_forward_lookup_is_exact() {
    for kind in ALL_KINDS {
        let map = type_map(kind);
        assert!(map.try_resolve_managed_type(FANCY_BUTTON_CLASS).is_none(), "{kind:?}");
        assert!(map.try_resolve_managed_type("").is_none(), "{kind:?}");
    }
}

/// Test that peers created through each backend have the same types.
#[test]
fn test_backends_create_same_peer_types() {
    let cases = [
        (BUTTON_CLASS, &BUTTON),
        (FANCY_BUTTON_CLASS, &BUTTON),
        (TEXT_VIEW_CLASS, &TEXT_VIEW),
        (LIST_VIEW_CLASS, &ABS_LIST_VIEW_INVOKER),
        (TASK_CLASS, &OBJECT),
    ];
    for kind in ALL_KINDS {
        let runtime = runtime();
        let bridge = bridge_with(&runtime, BridgeConfig::new().with_type_map(kind));
        for (class, expected) in cases {
            let handle = runtime.new_object(class);
            let peer = bridge
                .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None)
                .unwrap()
                .unwrap();
            assert_eq!(peer.managed_type(), expected, "{kind:?} for {class}");
        }
        drop(bridge);
        runtime.assert_balanced();
    }
}

/// Test that registrations made with the macro are found by the link-time scan.
#[test]
fn test_scan_finds_macro_registrations() {
    let map = AttributeTypeMap::scan();
    assert_eq!(
        map.try_resolve_managed_type("com/example/scan/Widget"),
        Some(&SCANNED_WIDGET)
    );
    assert_eq!(
        map.try_resolve_foreign_name(&SCANNED_WIDGET).as_deref(),
        Some("com/example/scan/Widget")
    );
    assert_eq!(
        map.try_resolve_invoker_type(&SCANNED_LISTENER),
        Some(&SCANNED_LISTENER_INVOKER)
    );
    assert_eq!(
        map.try_resolve_foreign_name(&SCANNED_LISTENER_INVOKER).as_deref(),
        Some("com/example/scan/Listener")
    );
    assert!(map.try_resolve_managed_type(BUTTON_CLASS).is_none());
}

/// Test that a bridge built without a type map uses the registrations in the
/// binary, whatever backend is configured.
#[test]
fn test_default_type_map_uses_macro_registrations() {
    for kind in ALL_KINDS {
        let runtime = runtime();
        runtime.define_class("com/example/scan/Widget", OBJECT_CLASS);
        let foreign: Arc<dyn ForeignRuntime> = runtime.clone();
        let bridge = Bridge::builder(foreign)
            .config(BridgeConfig::new().with_type_map(kind))
            .build();
        assert_eq!(bridge.type_map().kind(), kind);

        let handle = runtime.new_object("com/example/scan/Widget");
        let peer = bridge
            .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None)
            .unwrap()
            .unwrap();
        assert_eq!(peer.managed_type(), &SCANNED_WIDGET, "{kind:?}");

        drop(peer);
        drop(bridge);
        runtime.assert_balanced();
    }
}

/// Test a hand-built exact table.
#[test]
fn test_exact_table_rows() {
    let table = ExactTable::new(
        &[
            TypeMapEntry {
                foreign_name: OBJECT_CLASS,
                ty: &OBJECT,
            },
            TypeMapEntry {
                foreign_name: RUNNABLE_CLASS,
                ty: &RUNNABLE,
            },
            TypeMapEntry {
                foreign_name: OBJECT_CLASS,
                ty: &VIEW,
            },
        ],
        &[InvokerEntry {
            ty: &RUNNABLE,
            invoker: &RUNNABLE_INVOKER,
        }],
    );
    assert_eq!(table.len(), 2, "the first row for a name wins");
    assert_eq!(table.try_resolve_managed_type(OBJECT_CLASS), Some(&OBJECT));
    assert!(table.try_resolve_foreign_name(&VIEW).is_none());
    assert_eq!(table.try_resolve_invoker_type(&RUNNABLE), Some(&RUNNABLE_INVOKER));
}

static DYNAMIC_GADGET: ManagedType = ManagedType::class("Example.Dynamic.Gadget")
    .extends(&VIEW)
    .with_handle_initializer(activate_from_handle);

/// Test that a package lookup resolves classes registered by nobody and that
/// the bridge creates peers through it.
#[test]
fn test_hierarchy_package_lookup_through_bridge() {
    let runtime = runtime();
    runtime.define_class("com/example/dynamic/Gadget", VIEW_CLASS);

    let map = HierarchyTypeMap::new();
    for reg in &REGISTRATIONS {
        map.register_type(reg.foreign_name(), reg.managed_type());
    }
    let lookup: PackageLookup = Arc::new(|name: &str| {
        (name == "com/example/dynamic/Gadget").then_some(&DYNAMIC_GADGET)
    });
    map.register_package("com/example/dynamic", lookup);

    let foreign: Arc<dyn ForeignRuntime> = runtime.clone();
    let bridge = Bridge::builder(foreign).type_map(map).build();
    assert_eq!(bridge.type_map().kind(), TypeMapKind::HierarchyWalking);

    let handle = runtime.new_object("com/example/dynamic/Gadget");
    let peer = bridge
        .resolve_peer(handle, Ownership::TRANSFER_TRANSIENT, None)
        .unwrap()
        .unwrap();
    assert_eq!(peer.managed_type(), &DYNAMIC_GADGET);
    assert_eq!(
        bridge
            .type_map()
            .try_resolve_foreign_name(&DYNAMIC_GADGET)
            .as_deref(),
        Some("com/example/dynamic/Gadget")
    );

    drop(peer);
    drop(bridge);
    runtime.assert_balanced();
}
