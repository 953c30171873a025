//! Tests for exception translation between managed failures and foreign
//! throwables.

mod common;

use common::*;
use peer_bridge::test_util::{PROXY_THROWABLE_CLASS, THROWABLE_CLASS};
use peer_bridge::{BridgeError, ForeignException, ForeignRuntime, RefKind};

/// Test that a managed error crosses as a proxy and comes back unchanged.
#[test]
fn test_error_round_trips_through_proxy() {
    let runtime = runtime();
    let bridge = bridge(&runtime);

    let value: i32 = bridge.invoke_from_foreign(|| {
        Err(BridgeError::MissingMapping {
            class_name: "com/example/Nowhere".to_owned(),
        })
    });
    assert_eq!(value, 0, "failed calls return the default");
    assert_eq!(bridge.exceptions().in_flight(), 1);

    let throwable = runtime
        .take_pending_exception()
        .expect("a proxy throwable is pending");
    assert_eq!(runtime.class_of(throwable), PROXY_THROWABLE_CLASS);
    assert!(runtime
        .message_of(throwable)
        .unwrap()
        .contains("com/example/Nowhere"));

    let err = bridge.exception_from_throwable(throwable);
    assert!(
        matches!(&err, BridgeError::MissingMapping { class_name } if class_name == "com/example/Nowhere"),
        "unexpected error: {err}"
    );
    assert_eq!(bridge.exceptions().in_flight(), 0);

    runtime.delete_transient(throwable);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a panic in managed code becomes a proxy throwable.
#[test]
fn test_panic_becomes_proxy() {
    let runtime = runtime();
    let bridge = bridge(&runtime);

    let value: bool = bridge.invoke_from_foreign(|| panic!("managed code exploded"));
    assert!(!value);

    let throwable = runtime.take_pending_exception().unwrap();
    let err = bridge.exception_from_throwable(throwable);
    assert!(
        matches!(&err, BridgeError::ManagedPanic { message } if message == "managed code exploded"),
        "unexpected error: {err}"
    );

    runtime.delete_transient(throwable);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that a successful call raises nothing.
#[test]
fn test_success_raises_nothing() {
    let runtime = runtime();
    let bridge = bridge(&runtime);

    let value = bridge.invoke_from_foreign(|| Ok(17_u32));
    assert_eq!(value, 17);
    assert!(runtime.take_pending_exception().is_none());
    assert_eq!(bridge.exceptions().in_flight(), 0);
}

/// Test that a throwable created on the foreign side translates to a
/// foreign exception.
#[test]
fn test_foreign_throwable_translates() {
    let runtime = runtime();
    let bridge = bridge(&runtime);
    let throwable = runtime.new_object(THROWABLE_CLASS);

    let err = bridge.exception_from_throwable(throwable);
    match err {
        BridgeError::ForeignException(ForeignException {
            class_name,
            identity_hash,
        }) => {
            assert_eq!(class_name, THROWABLE_CLASS);
            assert_eq!(identity_hash, runtime.identity_hash(throwable));
        }
        other => panic!("unexpected error: {other}"),
    }

    runtime.delete_transient(throwable);
    drop(bridge);
    runtime.assert_balanced();
}

/// Test that proxies never translated back are released with the bridge.
#[test]
fn test_untranslated_proxies_released_on_drop() {
    let runtime = runtime();
    let bridge = bridge(&runtime);

    for _ in 0..3 {
        let _: () = bridge.invoke_from_foreign(|| Err(BridgeError::NotInstalled));
    }
    assert_eq!(bridge.exceptions().in_flight(), 3);
    assert_eq!(runtime.outstanding(RefKind::Durable), 3);

    drop(bridge);
    runtime.assert_balanced();
}
