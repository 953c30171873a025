//! Reference manager: creation and release of foreign handles.
//!
//! All handle traffic funnels through [`ReferenceManager`] so that it can
//! keep the per-thread transient count, emit reference logs and watch the
//! outstanding durable count. When that count reaches the configured threshold
//! after a durable allocation, a managed collection is requested so that
//! finalizers can release durable references before the foreign runtime's
//! handle table overflows.

use std::cell::Cell;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::handle::{Handle, ObjectRef, Ownership, RefKind, Transfer};
use crate::metrics::BridgeMetrics;
use crate::runtime::{ForeignRuntime, ManagedCollector};
use crate::tracing::{log_collection_request, log_reference, log_transient, RefOp};

// ============================================================================
// Collection condition
// ============================================================================

/// Inputs to a [`CollectCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurableCollectInfo {
    outstanding_durable: usize,
    outstanding_weak: usize,
    threshold: usize,
    max: usize,
}

impl DurableCollectInfo {
    #[must_use]
    pub const fn new(
        outstanding_durable: usize,
        outstanding_weak: usize,
        threshold: usize,
        max: usize,
    ) -> Self {
        Self {
            outstanding_durable,
            outstanding_weak,
            threshold,
            max,
        }
    }

    /// Live durable references, as counted by the foreign runtime.
    #[must_use]
    pub const fn outstanding_durable(&self) -> usize {
        self.outstanding_durable
    }

    /// Live weak-durable references.
    #[must_use]
    pub const fn outstanding_weak(&self) -> usize {
        self.outstanding_weak
    }

    /// Configured request threshold.
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Configured ceiling.
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }
}

/// Decides, after each durable allocation, whether to request a collection.
pub type CollectCondition = fn(&DurableCollectInfo) -> bool;

/// Requests a collection once the outstanding durable count reaches the threshold.
#[must_use]
pub const fn default_collect_condition(info: &DurableCollectInfo) -> bool {
    info.outstanding_durable >= info.threshold
}

// ============================================================================
// Thread-local state
// ============================================================================

thread_local! {
    /// Transient references created and not yet released on this thread.
    static TRANSIENT_COUNT: Cell<usize> = const { Cell::new(0) };
    /// Whether this thread is inside a collection request.
    static IN_COLLECT_REQUEST: Cell<bool> = const { Cell::new(false) };
}

struct CollectRequestGuard;

impl CollectRequestGuard {
    fn enter() -> Option<Self> {
        IN_COLLECT_REQUEST.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(Self)
            }
        })
    }
}

impl Drop for CollectRequestGuard {
    fn drop(&mut self) {
        IN_COLLECT_REQUEST.with(|flag| flag.set(false));
    }
}

// ============================================================================
// ReferenceManager
// ============================================================================

/// Creates and releases foreign references and enforces the durable threshold.
pub struct ReferenceManager {
    runtime: Arc<dyn ForeignRuntime>,
    collector: Arc<dyn ManagedCollector>,
    condition: CollectCondition,
    threshold: usize,
    max: usize,
    log_gref: bool,
    log_lref: bool,
    light_gref: bool,
    light_lref: bool,
    metrics: Arc<BridgeMetrics>,
}

impl std::fmt::Debug for ReferenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceManager")
            .field("threshold", &self.threshold)
            .field("max", &self.max)
            .field("outstanding_durable", &self.outstanding_durable_count())
            .finish_non_exhaustive()
    }
}

impl ReferenceManager {
    #[must_use]
    pub fn new(
        runtime: Arc<dyn ForeignRuntime>,
        collector: Arc<dyn ManagedCollector>,
        condition: CollectCondition,
        config: &BridgeConfig,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        use crate::config::LogCategories;
        Self {
            runtime,
            collector,
            condition,
            threshold: config.durable_threshold,
            max: config.max_durable_count,
            log_gref: config.logs(LogCategories::GREF),
            log_lref: config.logs(LogCategories::LREF),
            light_gref: config.light_gref,
            light_lref: config.light_lref,
            metrics,
        }
    }

    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.runtime
    }

    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Live durable references, as reported by the foreign runtime.
    #[must_use]
    pub fn outstanding_durable_count(&self) -> usize {
        self.runtime.durable_count()
    }

    /// Transient references created and not yet released on the calling thread.
    #[must_use]
    pub fn transient_count() -> usize {
        TRANSIENT_COUNT.with(Cell::get)
    }

    /// Current inputs to the collection condition.
    #[must_use]
    pub fn collect_info(&self) -> DurableCollectInfo {
        DurableCollectInfo::new(
            self.runtime.durable_count(),
            self.runtime.weak_durable_count(),
            self.threshold,
            self.max,
        )
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    /// Creates a transient reference. Invalid if `handle` is a dead weak reference.
    pub fn new_transient(&self, handle: Handle) -> ObjectRef {
        if handle.is_null() {
            return ObjectRef::invalid();
        }
        let reference = ObjectRef::new(self.runtime.new_transient(handle), RefKind::Transient);
        if reference.is_valid() {
            self.note_transient(RefOp::New, reference);
        }
        reference
    }

    /// Records a transient reference that a runtime query returned.
    pub fn created_transient(&self, handle: Handle) -> ObjectRef {
        let reference = ObjectRef::new(handle, RefKind::Transient);
        if reference.is_valid() {
            self.note_transient(RefOp::Created, reference);
        }
        reference
    }

    /// Creates a durable reference, then requests a collection if the
    /// outstanding count has reached the threshold.
    pub fn new_durable(&self, handle: Handle) -> ObjectRef {
        if handle.is_null() {
            return ObjectRef::invalid();
        }
        let reference = ObjectRef::new(self.runtime.new_durable(handle), RefKind::Durable);
        if !reference.is_valid() {
            return reference;
        }
        if self.log_gref {
            log_reference(
                RefOp::New,
                ObjectRef::new(handle, RefKind::Invalid),
                reference,
                self.runtime.durable_count(),
                self.runtime.weak_durable_count(),
                self.light_gref,
            );
        }
        self.maybe_request_collection();
        reference
    }

    /// Creates a weak-durable reference.
    pub fn new_weak_durable(&self, handle: Handle) -> ObjectRef {
        if handle.is_null() {
            return ObjectRef::invalid();
        }
        let reference = ObjectRef::new(self.runtime.new_weak_durable(handle), RefKind::WeakDurable);
        if reference.is_valid() && self.log_gref {
            log_reference(
                RefOp::New,
                ObjectRef::new(handle, RefKind::Invalid),
                reference,
                self.runtime.durable_count(),
                self.runtime.weak_durable_count(),
                self.light_gref,
            );
        }
        reference
    }

    // ------------------------------------------------------------------------
    // Release
    // ------------------------------------------------------------------------

    /// Releases `reference` according to its kind. Invalid references are ignored.
    ///
    /// The caller must not use or release the reference again.
    pub fn release(&self, reference: ObjectRef) {
        match reference.kind() {
            RefKind::Invalid => {}
            RefKind::Transient => self.release_transient(reference, true),
            RefKind::Durable => {
                self.runtime.delete_durable(reference.handle());
                self.log_durable_delete(reference);
            }
            RefKind::WeakDurable => {
                self.runtime.delete_weak_durable(reference.handle());
                self.log_durable_delete(reference);
            }
        }
    }

    /// Releases `reference` and resets it to invalid.
    pub fn dispose(&self, reference: &mut ObjectRef) {
        self.release(std::mem::take(reference));
    }

    // ------------------------------------------------------------------------
    // Ownership transfer
    // ------------------------------------------------------------------------

    /// Takes a durable reference to `handle` according to `ownership`.
    ///
    /// * `DoNotTransfer`: a new durable is created; the caller keeps `handle`.
    /// * `TransferTransient`: a new durable is created and `handle` is released.
    /// * `TransferDurable`: `handle` itself is adopted.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidReference`] for a null handle and
    /// [`BridgeError::AllocationFailed`] if the foreign runtime returns null.
    pub fn adopt(&self, handle: Handle, ownership: Ownership) -> Result<ObjectRef> {
        if handle.is_null() {
            return Err(BridgeError::InvalidReference {
                reason: "cannot adopt a null handle",
            });
        }
        if ownership.transfer() == Transfer::TransferDurable {
            return Ok(ObjectRef::new(handle, RefKind::Durable));
        }
        let durable = self.new_durable(handle);
        self.release_transfer(handle, ownership);
        if durable.is_valid() {
            Ok(durable)
        } else {
            Err(BridgeError::AllocationFailed {
                kind: "durable",
                handle,
            })
        }
    }

    /// Releases `handle` if `ownership` transferred it to the callee.
    pub fn release_transfer(&self, handle: Handle, ownership: Ownership) {
        match ownership.transfer() {
            Transfer::DoNotTransfer => {}
            // The caller's transient was never counted on this thread.
            Transfer::TransferTransient => {
                let reference = ObjectRef::new(handle, RefKind::Transient);
                if reference.is_valid() {
                    self.release_transient(reference, false);
                }
            }
            Transfer::TransferDurable => self.release(ObjectRef::new(handle, RefKind::Durable)),
        }
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    /// Wraps `reference` so that it is released on drop.
    #[must_use]
    pub const fn scoped(&self, reference: ObjectRef) -> ScopedRef<'_> {
        ScopedRef {
            manager: self,
            reference,
        }
    }

    /// Opens a frame whose transient references are released together.
    #[must_use]
    pub const fn frame(&self) -> TransientFrame<'_> {
        TransientFrame {
            manager: self,
            references: Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn note_transient(&self, op: RefOp, reference: ObjectRef) {
        TRANSIENT_COUNT.with(|count| count.set(count.get() + 1));
        if self.log_lref {
            log_transient(op, reference, Self::transient_count(), self.light_lref);
        }
    }

    fn release_transient(&self, reference: ObjectRef, counted: bool) {
        self.runtime.delete_transient(reference.handle());
        if counted {
            TRANSIENT_COUNT.with(|count| count.set(count.get().saturating_sub(1)));
        }
        if self.log_lref {
            log_transient(
                RefOp::Delete,
                reference,
                Self::transient_count(),
                self.light_lref,
            );
        }
    }

    fn log_durable_delete(&self, reference: ObjectRef) {
        if self.log_gref {
            log_reference(
                RefOp::Delete,
                reference,
                ObjectRef::invalid(),
                self.runtime.durable_count(),
                self.runtime.weak_durable_count(),
                self.light_gref,
            );
        }
    }

    fn maybe_request_collection(&self) {
        let info = self.collect_info();
        if !(self.condition)(&info) {
            return;
        }
        // A collector that allocates durables must not recurse into itself.
        let Some(_guard) = CollectRequestGuard::enter() else {
            return;
        };
        self.metrics.record_collection_request();
        log_collection_request(info.outstanding_durable(), info.threshold());
        self.collector.collect();
    }
}

// ============================================================================
// Scoped references
// ============================================================================

/// A reference released when dropped.
#[derive(Debug)]
pub struct ScopedRef<'a> {
    manager: &'a ReferenceManager,
    reference: ObjectRef,
}

impl ScopedRef<'_> {
    #[inline]
    #[must_use]
    pub const fn get(&self) -> ObjectRef {
        self.reference
    }

    #[inline]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.reference.handle()
    }

    /// Gives up the release obligation and returns the reference.
    #[must_use]
    pub fn into_inner(mut self) -> ObjectRef {
        std::mem::take(&mut self.reference)
    }
}

impl Drop for ScopedRef<'_> {
    fn drop(&mut self) {
        self.manager.dispose(&mut self.reference);
    }
}

/// A group of transient references released in reverse order when dropped.
#[derive(Debug)]
pub struct TransientFrame<'a> {
    manager: &'a ReferenceManager,
    references: Vec<ObjectRef>,
}

impl TransientFrame<'_> {
    /// Creates a transient reference owned by this frame.
    pub fn new_transient(&mut self, handle: Handle) -> Handle {
        let reference = self.manager.new_transient(handle);
        self.push(reference)
    }

    /// Hands an existing reference to this frame.
    pub fn push(&mut self, reference: ObjectRef) -> Handle {
        if reference.is_valid() {
            self.references.push(reference);
        }
        reference.handle()
    }

    /// Number of references the frame will release.
    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

impl Drop for TransientFrame<'_> {
    fn drop(&mut self) {
        while let Some(reference) = self.references.pop() {
            self.manager.release(reference);
        }
    }
}
