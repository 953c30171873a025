//! Shared fixtures: a small foreign class hierarchy and the managed types
//! bound to it.
#![allow(dead_code)]

use std::sync::Arc;

use peer_bridge::test_util::{activate_from_handle, activate_from_reference, FakeRuntime, OBJECT_CLASS};
use peer_bridge::typemap::PeerTypeRegistration;
use peer_bridge::{Bridge, BridgeConfig, ForeignRuntime, ManagedType, TypeMapBackend, TypeMapKind};

pub const VIEW_CLASS: &str = "android/view/View";
pub const TEXT_VIEW_CLASS: &str = "android/widget/TextView";
pub const BUTTON_CLASS: &str = "android/widget/Button";
/// Subclass with no managed binding of its own.
pub const FANCY_BUTTON_CLASS: &str = "com/example/FancyButton";
pub const RUNNABLE_CLASS: &str = "java/lang/Runnable";
/// Implements `java/lang/Runnable`; unbound.
pub const TASK_CLASS: &str = "com/example/Task";
pub const ABS_LIST_VIEW_CLASS: &str = "android/widget/AbsListView";
/// Concrete subclass of an abstract bound type; unbound.
pub const LIST_VIEW_CLASS: &str = "android/widget/ListView";
pub const PARCELABLE_CLASS: &str = "android/os/Parcelable";
/// Implements `android/os/Parcelable`; unbound.
pub const PARCEL_CLASS: &str = "com/example/Parcel";
pub const NO_INIT_CLASS: &str = "com/example/NoInit";
pub const REF_ONLY_CLASS: &str = "com/example/RefOnly";
pub const GENERIC_CLASS: &str = "com/example/Generic";
/// Root class with no bound ancestor.
pub const ORPHAN_CLASS: &str = "com/example/Orphan";
/// Bound, but never defined in the foreign runtime.
pub const GHOST_CLASS: &str = "com/example/Ghost";

pub static OBJECT: ManagedType =
    ManagedType::class("Java.Lang.Object").with_handle_initializer(activate_from_handle);
pub static VIEW: ManagedType = ManagedType::class("Android.Views.View")
    .extends(&OBJECT)
    .with_handle_initializer(activate_from_handle);
pub static TEXT_VIEW: ManagedType = ManagedType::class("Android.Widget.TextView")
    .extends(&VIEW)
    .with_handle_initializer(activate_from_handle);
pub static BUTTON: ManagedType = ManagedType::class("Android.Widget.Button")
    .extends(&TEXT_VIEW)
    .with_handle_initializer(activate_from_handle);

pub static RUNNABLE: ManagedType = ManagedType::interface("Java.Lang.IRunnable");
static RUNNABLE_INVOKER_INTERFACES: [&ManagedType; 1] = [&RUNNABLE];
pub static RUNNABLE_INVOKER: ManagedType = ManagedType::class("Java.Lang.IRunnableInvoker")
    .extends(&OBJECT)
    .implements(&RUNNABLE_INVOKER_INTERFACES)
    .with_handle_initializer(activate_from_handle);

pub static ABS_LIST_VIEW: ManagedType =
    ManagedType::abstract_class("Android.Widget.AbsListView").extends(&VIEW);
pub static ABS_LIST_VIEW_INVOKER: ManagedType =
    ManagedType::class("Android.Widget.AbsListViewInvoker")
        .extends(&ABS_LIST_VIEW)
        .with_handle_initializer(activate_from_handle);

/// Interface bound without an invoker.
pub static PARCELABLE: ManagedType = ManagedType::interface("Android.OS.IParcelable");

pub static NO_INIT: ManagedType = ManagedType::class("Example.NoInit").extends(&OBJECT);
pub static REF_ONLY: ManagedType = ManagedType::class("Example.RefOnly")
    .extends(&OBJECT)
    .with_reference_initializer(activate_from_reference);
pub static GENERIC: ManagedType = ManagedType::class("Example.Generic`1")
    .extends(&OBJECT)
    .generic_definition()
    .with_handle_initializer(activate_from_handle);
pub static GHOST: ManagedType = ManagedType::class("Example.Ghost")
    .extends(&OBJECT)
    .with_handle_initializer(activate_from_handle);
/// Known to managed code but bound to no foreign name.
pub static STRAY: ManagedType = ManagedType::class("Example.Stray")
    .extends(&OBJECT)
    .with_handle_initializer(activate_from_handle);

pub static REGISTRATIONS: [PeerTypeRegistration; 11] = [
    PeerTypeRegistration::new(&OBJECT, OBJECT_CLASS, None),
    PeerTypeRegistration::new(&VIEW, VIEW_CLASS, None),
    PeerTypeRegistration::new(&TEXT_VIEW, TEXT_VIEW_CLASS, None),
    PeerTypeRegistration::new(&BUTTON, BUTTON_CLASS, None),
    PeerTypeRegistration::new(&RUNNABLE, RUNNABLE_CLASS, Some(&RUNNABLE_INVOKER)),
    PeerTypeRegistration::new(&ABS_LIST_VIEW, ABS_LIST_VIEW_CLASS, Some(&ABS_LIST_VIEW_INVOKER)),
    PeerTypeRegistration::new(&PARCELABLE, PARCELABLE_CLASS, None),
    PeerTypeRegistration::new(&NO_INIT, NO_INIT_CLASS, None),
    PeerTypeRegistration::new(&REF_ONLY, REF_ONLY_CLASS, None),
    PeerTypeRegistration::new(&GENERIC, GENERIC_CLASS, None),
    PeerTypeRegistration::new(&GHOST, GHOST_CLASS, None),
];

/// A fake runtime with the fixture hierarchy defined.
pub fn runtime() -> Arc<FakeRuntime> {
    let runtime = FakeRuntime::new();
    runtime.define_class(VIEW_CLASS, OBJECT_CLASS);
    runtime.define_class(TEXT_VIEW_CLASS, VIEW_CLASS);
    runtime.define_class(BUTTON_CLASS, TEXT_VIEW_CLASS);
    runtime.define_class(FANCY_BUTTON_CLASS, BUTTON_CLASS);
    runtime.define_interface(RUNNABLE_CLASS);
    runtime.define_class(TASK_CLASS, OBJECT_CLASS);
    runtime.implement(TASK_CLASS, RUNNABLE_CLASS);
    runtime.define_class(ABS_LIST_VIEW_CLASS, VIEW_CLASS);
    runtime.define_class(LIST_VIEW_CLASS, ABS_LIST_VIEW_CLASS);
    runtime.define_interface(PARCELABLE_CLASS);
    runtime.define_class(PARCEL_CLASS, OBJECT_CLASS);
    runtime.implement(PARCEL_CLASS, PARCELABLE_CLASS);
    runtime.define_class(NO_INIT_CLASS, OBJECT_CLASS);
    runtime.define_class(REF_ONLY_CLASS, OBJECT_CLASS);
    runtime.define_class(GENERIC_CLASS, OBJECT_CLASS);
    runtime.define_interface(ORPHAN_CLASS);
    Arc::new(runtime)
}

pub fn type_map(kind: TypeMapKind) -> TypeMapBackend {
    TypeMapBackend::from_registration_list(kind, REGISTRATIONS.iter())
}

pub fn bridge(runtime: &Arc<FakeRuntime>) -> Bridge {
    bridge_with(runtime, BridgeConfig::new())
}

pub fn bridge_with(runtime: &Arc<FakeRuntime>, config: BridgeConfig) -> Bridge {
    let kind = config.type_map;
    let foreign: Arc<dyn ForeignRuntime> = runtime.clone();
    Bridge::builder(foreign)
        .type_map(type_map(kind))
        .config(config)
        .build()
}
