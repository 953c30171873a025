//! Structured spans and events for bridge operations.
//!
//! Reference traffic is only logged when the matching [`LogCategories`] flag is
//! set; everything else goes through `tracing` unconditionally and is filtered
//! by the subscriber.
//!
//! [`LogCategories`]: crate::LogCategories

use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{span, Level};

use crate::handle::{Handle, IdentityHash, ObjectRef, RefKind};

/// Identifier correlating every event of one bridge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleId(pub u64);

static NEXT_CYCLE_ID: AtomicU64 = AtomicU64::new(1);

/// Generate the next bridge cycle id.
pub fn next_cycle_id() -> CycleId {
    CycleId(NEXT_CYCLE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Span covering one bridge-processing window.
pub fn trace_bridge_cycle(cycle: CycleId) -> span::EnteredSpan {
    span!(Level::DEBUG, "bridge_cycle", cycle_id = cycle.0).entered()
}

/// Span covering the surfacing of one foreign object.
pub fn trace_peer_creation(handle: Handle) -> span::EnteredSpan {
    span!(Level::DEBUG, "create_peer", handle = %handle).entered()
}

/// Which reference operation is being logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefOp {
    New,
    Delete,
    /// A reference produced by a runtime query rather than an explicit `New`.
    Created,
}

/// Logs one reference operation with its running counts.
///
/// The thread name and id are always recorded. A backtrace is captured unless
/// `light` is set.
pub fn log_reference(
    op: RefOp,
    from: ObjectRef,
    to: ObjectRef,
    durable_count: usize,
    weak_count: usize,
    light: bool,
) {
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("unnamed");
    let thread_id = thread.id();
    if light {
        tracing::debug!(
            op = ?op,
            from = %from,
            to = %to,
            durable_count,
            weak_count,
            thread_name,
            thread_id = ?thread_id,
            "reference"
        );
    } else {
        let backtrace = Backtrace::force_capture();
        tracing::debug!(
            op = ?op,
            from = %from,
            to = %to,
            durable_count,
            weak_count,
            thread_name,
            thread_id = ?thread_id,
            %backtrace,
            "reference"
        );
    }
}

/// Logs a transient reference operation with the per-thread count.
pub fn log_transient(op: RefOp, reference: ObjectRef, transient_count: usize, light: bool) {
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("unnamed");
    let thread_id = thread.id();
    debug_assert_eq!(reference.kind(), RefKind::Transient);
    if light {
        tracing::debug!(op = ?op, reference = %reference, transient_count, thread_name, thread_id = ?thread_id, "transient");
    } else {
        let backtrace = Backtrace::force_capture();
        tracing::debug!(
            op = ?op,
            reference = %reference,
            transient_count,
            thread_name,
            thread_id = ?thread_id,
            %backtrace,
            "transient"
        );
    }
}

/// Logs a threshold-triggered collection request.
pub fn log_collection_request(outstanding: usize, threshold: usize) {
    tracing::info!(
        outstanding,
        threshold,
        "outstanding durable references reached threshold; requesting a full collection"
    );
}

/// Logs that a registration kept the existing peer instead of the new one.
pub fn log_not_replacing(identity: IdentityHash, kept: ObjectRef, ignored: ObjectRef) {
    tracing::warn!(
        identity = %identity,
        kept = %kept,
        ignored = %ignored,
        "not replacing previous registered peer; keeping both"
    );
}

/// Logs a type map miss for one step of the hierarchy walk.
pub fn log_type_miss(class_name: &str) {
    tracing::trace!(class_name, "no managed type for foreign class");
}

/// Logs a foreign/managed assignability mismatch.
pub fn log_assignability_mismatch(class_name: &str, type_name: &str, strict: bool) {
    tracing::warn!(
        class_name,
        type_name,
        strict,
        "foreign class is not assignable to resolved managed type"
    );
}
