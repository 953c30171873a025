//! C entry points for the foreign runtime and the collector.
//!
//! The foreign side cannot hold a `&Bridge`, so these functions operate on the
//! process-wide bridge registered with [`install`]. Every entry point that
//! runs managed code waits for bridge processing first.

use std::ffi::{c_char, CStr};
use std::sync::OnceLock;

use crate::bridge::Bridge;
use crate::coordinator::CollectedPeer;
use crate::error::{BridgeError, Result};
use crate::handle::{Handle, IdentityHash, ObjectRef, Ownership, RefKind};
use crate::typemap::TypeMap;

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

/// Installs the process-wide bridge.
///
/// # Errors
///
/// [`BridgeError::AlreadyInstalled`] if a bridge was installed before.
pub fn install(bridge: Bridge) -> Result<&'static Bridge> {
    BRIDGE
        .set(bridge)
        .map_err(|_| BridgeError::AlreadyInstalled)?;
    tracing::debug!("process-wide bridge installed");
    bridge_ref()
}

/// The process-wide bridge, if installed.
#[must_use]
pub fn installed() -> Option<&'static Bridge> {
    BRIDGE.get()
}

/// The process-wide bridge.
///
/// # Errors
///
/// [`BridgeError::NotInstalled`] before [`install`].
pub fn bridge_ref() -> Result<&'static Bridge> {
    installed().ok_or(BridgeError::NotInstalled)
}

/// Status returned by the C entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum NativeStatus {
    Ok = 0,
    /// The call succeeded but no peer exists or was created.
    NoPeer = 1,
    NotInstalled = -1,
    InvalidArgument = -2,
    /// Managed code failed; a proxy throwable is pending on the foreign side.
    #[default]
    Failed = -3,
}

impl From<NativeStatus> for i32 {
    fn from(status: NativeStatus) -> Self {
        status as Self
    }
}

/// Blocks while bridge processing is in progress. No-op before install.
#[no_mangle]
pub extern "C" fn peer_bridge_wait_for_bridge_processing() {
    if let Some(bridge) = installed() {
        bridge.wait_for_bridge_processing();
    }
}

/// Collector callback: bridge processing begins.
#[no_mangle]
pub extern "C" fn peer_bridge_bridge_processing_started() -> i32 {
    match installed() {
        Some(bridge) => {
            bridge.bridge_processing_started();
            NativeStatus::Ok.into()
        }
        None => NativeStatus::NotInstalled.into(),
    }
}

/// Collector callback: bridge processing ended.
///
/// `collected` points to `len` identity hashes whose foreign objects did not
/// survive the collection. It may be null when `len` is zero.
///
/// # Safety
///
/// `collected` must be valid for reads of `len` `i32` values.
#[no_mangle]
pub unsafe extern "C" fn peer_bridge_bridge_processing_finished(
    collected: *const i32,
    len: usize,
) -> i32 {
    let Some(bridge) = installed() else {
        return NativeStatus::NotInstalled.into();
    };
    let hashes: &[i32] = if len == 0 {
        &[]
    } else if collected.is_null() {
        bridge.bridge_processing_finished(Vec::new());
        return NativeStatus::InvalidArgument.into();
    } else {
        // SAFETY: the caller guarantees `collected` is valid for `len` reads.
        unsafe { std::slice::from_raw_parts(collected, len) }
    };
    bridge.bridge_processing_finished(
        hashes
            .iter()
            .map(|&hash| CollectedPeer::identity(IdentityHash(hash))),
    );
    NativeStatus::Ok.into()
}

/// Surfaces the object `handle` as a peer of the type registered for
/// `class_name`, creating one if needed.
///
/// The caller keeps ownership of `handle`.
///
/// # Safety
///
/// `class_name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn peer_bridge_activate(class_name: *const c_char, handle: usize) -> i32 {
    let Some(bridge) = installed() else {
        return NativeStatus::NotInstalled.into();
    };
    if class_name.is_null() || handle == 0 {
        return NativeStatus::InvalidArgument.into();
    }
    // SAFETY: checked non-null; the caller guarantees NUL termination.
    let Ok(class_name) = unsafe { CStr::from_ptr(class_name) }.to_str() else {
        return NativeStatus::InvalidArgument.into();
    };
    let status = bridge.invoke_from_foreign(|| {
        let target = bridge
            .type_map()
            .try_resolve_managed_type(class_name)
            .ok_or_else(|| BridgeError::MissingMapping {
                class_name: class_name.to_owned(),
            })?;
        let peer = bridge.resolve_peer(
            Handle::from_raw(handle),
            Ownership::DO_NOT_TRANSFER,
            Some(target),
        )?;
        Ok(match peer {
            Some(peer) => {
                // Nothing managed refers to the peer yet; keep it until released.
                bridge.retain_peer(peer);
                NativeStatus::Ok
            }
            None => NativeStatus::NoPeer,
        })
    });
    status.into()
}

/// Disposes the peer registered for `handle`, if any.
#[no_mangle]
pub extern "C" fn peer_bridge_release_peer(handle: usize) -> i32 {
    let Some(bridge) = installed() else {
        return NativeStatus::NotInstalled.into();
    };
    if handle == 0 {
        return NativeStatus::InvalidArgument.into();
    }
    let status = bridge.invoke_from_foreign(|| {
        let reference = ObjectRef::new(Handle::from_raw(handle), RefKind::Transient);
        Ok(match bridge.peek_peer(reference) {
            Some(peer) => {
                bridge.dispose_peer(&*peer);
                NativeStatus::Ok
            }
            None => NativeStatus::NoPeer,
        })
    });
    status.into()
}

/// Live durable references, or -1 before install.
#[no_mangle]
pub extern "C" fn peer_bridge_outstanding_durable() -> i64 {
    installed().map_or(-1, |bridge| {
        i64::try_from(bridge.references().outstanding_durable_count()).unwrap_or(i64::MAX)
    })
}
