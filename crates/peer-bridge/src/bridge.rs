//! The bridge: one object tying the reference manager, type map, registry,
//! creator and coordinator together.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{BridgeConfig, LogCategories};
use crate::coordinator::{BridgeCycle, CollectedPeer, CollectorCoordinator};
use crate::creator::PeerCreator;
use crate::error::Result;
use crate::exceptions::{ExceptionTranslator, ManagedFailure};
use crate::handle::{Handle, ObjectRef, Ownership, RefKind};
use crate::metrics::BridgeMetrics;
use crate::peer::{peer_addr, Peer};
use crate::references::{default_collect_condition, CollectCondition, ReferenceManager};
use crate::registry::{PeerRegistry, Registration, SurfacedPeer};
use crate::runtime::{ForeignRuntime, ManagedCollector, NoopCollector};
use crate::typemap::TypeMapBackend;
use crate::types::ManagedType;
use crate::BridgeError;

/// Result of [`Bridge::finalize_peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The peer was unregistered and its `finalized` hook ran.
    Finalized,
    /// The foreign object is still alive; the peer was queued to be finalized
    /// again later.
    Deferred,
}

/// Builder for [`Bridge`].
pub struct BridgeBuilder {
    runtime: Arc<dyn ForeignRuntime>,
    config: BridgeConfig,
    type_map: Option<TypeMapBackend>,
    collector: Arc<dyn ManagedCollector>,
    condition: Option<CollectCondition>,
}

impl BridgeBuilder {
    #[must_use]
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `type_map` instead of building one from registrations.
    #[must_use]
    pub fn type_map(mut self, type_map: impl Into<TypeMapBackend>) -> Self {
        self.type_map = Some(type_map.into());
        self
    }

    #[must_use]
    pub fn collector(mut self, collector: Arc<dyn ManagedCollector>) -> Self {
        self.collector = collector;
        self
    }

    #[must_use]
    pub fn collect_condition(mut self, condition: CollectCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn build(self) -> Bridge {
        let Self {
            runtime,
            config,
            type_map,
            collector,
            condition,
        } = self;
        let metrics = Arc::new(BridgeMetrics::new());
        let references = Arc::new(ReferenceManager::new(
            Arc::clone(&runtime),
            collector,
            condition.unwrap_or(default_collect_condition),
            &config,
            Arc::clone(&metrics),
        ));
        let type_map = Arc::new(
            type_map.unwrap_or_else(|| TypeMapBackend::from_registrations(config.type_map)),
        );
        let registry = Arc::new(PeerRegistry::new(Arc::clone(&runtime), Arc::clone(&metrics)));
        let creator = PeerCreator::new(
            Arc::clone(&references),
            Arc::clone(&registry),
            Arc::clone(&type_map),
            config.strict_assignability,
            Arc::clone(&metrics),
        );
        let exceptions = ExceptionTranslator::new(Arc::clone(&references));
        if config.logs(LogCategories::DEFAULT) {
            tracing::info!(
                type_map = ?type_map.kind(),
                max_durable = config.max_durable_count,
                threshold = config.durable_threshold,
                strict_assignability = config.strict_assignability,
                "bridge initialized"
            );
        }
        Bridge {
            config,
            runtime,
            references,
            type_map,
            registry,
            creator,
            coordinator: CollectorCoordinator::new(),
            exceptions,
            pending_finalization: Mutex::new(Vec::new()),
            retained: Mutex::new(Vec::new()),
            metrics,
        }
    }
}

/// Peer bridge between a managed runtime and a foreign object system.
pub struct Bridge {
    config: BridgeConfig,
    runtime: Arc<dyn ForeignRuntime>,
    references: Arc<ReferenceManager>,
    type_map: Arc<TypeMapBackend>,
    registry: Arc<PeerRegistry>,
    creator: PeerCreator,
    coordinator: CollectorCoordinator,
    exceptions: ExceptionTranslator,
    pending_finalization: Mutex<Vec<Arc<dyn Peer>>>,
    /// Peers activated by the foreign side and owned by nobody in managed code.
    retained: Mutex<Vec<Arc<dyn Peer>>>,
    metrics: Arc<BridgeMetrics>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Starts building a bridge over `runtime`.
    #[must_use]
    pub fn builder(runtime: Arc<dyn ForeignRuntime>) -> BridgeBuilder {
        BridgeBuilder {
            runtime,
            config: BridgeConfig::default(),
            type_map: None,
            collector: Arc::new(NoopCollector),
            condition: None,
        }
    }

    // ------------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------------

    /// Returns the peer for `handle`, creating and registering one if none
    /// exists.
    ///
    /// A null handle yields `Ok(None)`. `handle` is released according to
    /// `ownership` in every outcome.
    ///
    /// # Errors
    ///
    /// Propagates [`PeerCreator::create_peer`] failures.
    pub fn resolve_peer(
        &self,
        handle: Handle,
        ownership: Ownership,
        target: Option<&'static ManagedType>,
    ) -> Result<Option<Arc<dyn Peer>>> {
        if handle.is_null() {
            return Ok(None);
        }
        self.coordinator.wait_for_bridge_processing();
        let incoming = ObjectRef::new(handle, ownership.incoming_kind());
        if let Some(peer) = self.registry.peek_peer(incoming) {
            if target.is_none_or(|target| peer.managed_type().is_assignable_to(target)) {
                self.references.release_transfer(handle, ownership);
                return Ok(Some(peer));
            }
        }
        self.creator.create_peer(handle, ownership, target)
    }

    /// Registers a peer constructed by managed code.
    ///
    /// A transient reference is promoted to durable first.
    ///
    /// # Errors
    ///
    /// Fails if the peer holds no reference or promotion fails.
    pub fn register_peer(&self, peer: &Arc<dyn Peer>) -> Result<Registration> {
        peer.peer_core().promote()?;
        self.registry.add_peer(peer)
    }

    /// Removes `peer` from the registry. Idempotent.
    pub fn unregister_peer(&self, peer: &dyn Peer) -> bool {
        self.registry.remove_peer(peer)
    }

    /// Unregisters `peer` and releases its reference. Idempotent.
    pub fn dispose_peer(&self, peer: &dyn Peer) {
        let retained = self.release_retained(peer);
        self.registry.remove_peer(peer);
        let reference = peer.peer_core().take_reference();
        if matches!(reference.kind(), RefKind::Durable | RefKind::WeakDurable) {
            self.references.release(reference);
        }
        drop(retained);
    }

    /// Keeps `peer` alive until it is disposed or released with
    /// [`release_retained`](Self::release_retained).
    pub fn retain_peer(&self, peer: Arc<dyn Peer>) {
        let mut retained = self.retained.lock();
        if !retained.iter().any(|p| peer_addr(&**p) == peer_addr(&*peer)) {
            retained.push(peer);
        }
    }

    /// Stops keeping `peer` alive and hands back the retained handle.
    pub fn release_retained(&self, peer: &dyn Peer) -> Option<Arc<dyn Peer>> {
        let mut retained = self.retained.lock();
        let idx = retained.iter().position(|p| peer_addr(&**p) == peer_addr(peer))?;
        Some(retained.swap_remove(idx))
    }

    #[must_use]
    pub fn retained_count(&self) -> usize {
        self.retained.lock().len()
    }

    /// Returns the registered peer for the object `reference` names.
    #[must_use]
    pub fn peek_peer(&self, reference: ObjectRef) -> Option<Arc<dyn Peer>> {
        self.registry.peek_peer(reference)
    }

    /// Every registered peer that is still alive.
    #[must_use]
    pub fn surfaced_peers(&self) -> Vec<SurfacedPeer> {
        self.registry.surfaced_peers()
    }

    // ------------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------------

    /// Finalizes `peer` unless its foreign object may still be in use.
    ///
    /// A peer holding a durable reference, or a weak reference to a live
    /// object, is queued and [`FinalizeOutcome::Deferred`] is returned.
    /// Otherwise the peer is unregistered, its reference cleared and its
    /// `finalized` hook run.
    pub fn finalize_peer(&self, peer: Arc<dyn Peer>) -> FinalizeOutcome {
        if self.is_foreign_alive(peer.reference()) {
            self.pending_finalization.lock().push(peer);
            self.metrics.record_finalization_deferred();
            return FinalizeOutcome::Deferred;
        }
        self.registry.remove_peer(&*peer);
        let reference = peer.peer_core().take_reference();
        if reference.kind() == RefKind::WeakDurable {
            self.references.release(reference);
        }
        peer.finalized();
        self.metrics.record_finalization_completed();
        FinalizeOutcome::Finalized
    }

    /// Retries every deferred finalization. Returns how many completed.
    pub fn run_pending_finalizers(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending_finalization.lock());
        pending
            .into_iter()
            .filter(|peer| self.finalize_peer(Arc::clone(peer)) == FinalizeOutcome::Finalized)
            .count()
    }

    /// Number of peers waiting for finalization.
    #[must_use]
    pub fn pending_finalizers(&self) -> usize {
        self.pending_finalization.lock().len()
    }

    fn is_foreign_alive(&self, reference: ObjectRef) -> bool {
        match reference.kind() {
            RefKind::Invalid | RefKind::Transient => false,
            RefKind::Durable => true,
            RefKind::WeakDurable => {
                let transient = self.references.new_transient(reference.handle());
                let alive = transient.is_valid();
                self.references.release(transient);
                alive
            }
        }
    }

    // ------------------------------------------------------------------------
    // Collector coordination
    // ------------------------------------------------------------------------

    /// Blocks while the collector's bridge processing is in progress.
    pub fn wait_for_bridge_processing(&self) {
        self.coordinator.wait_for_bridge_processing();
    }

    #[must_use]
    pub fn is_bridge_processing(&self) -> bool {
        self.coordinator.is_bridge_processing()
    }

    /// Collector callback: bridge processing begins.
    pub fn bridge_processing_started(&self) {
        self.coordinator.bridge_processing_started(&self.metrics);
    }

    /// Collector callback: bridge processing ended; `collected` lists peers
    /// whose foreign objects did not survive.
    pub fn bridge_processing_finished<I>(&self, collected: I)
    where
        I: IntoIterator<Item = CollectedPeer>,
    {
        self.coordinator.bridge_processing_finished(collected);
    }

    /// Opens a bridge-processing window that closes when the guard drops.
    #[must_use]
    pub fn begin_bridge_cycle(&self) -> BridgeCycle<'_> {
        self.coordinator.begin_cycle(&self.metrics)
    }

    /// Swaps the peer's durable reference for a weak-durable one so that the
    /// foreign collector may reclaim the object. Returns `false` if the peer
    /// held no durable reference.
    pub fn weaken_peer(&self, peer: &dyn Peer) -> bool {
        let current = peer.reference();
        if current.kind() != RefKind::Durable {
            return false;
        }
        let weak = self.references.new_weak_durable(current.handle());
        if !weak.is_valid() {
            return false;
        }
        let previous = peer.peer_core().replace_reference(weak);
        self.references.release(previous);
        true
    }

    /// Swaps a weak-durable reference back to durable.
    ///
    /// Returns `false` if the foreign object was collected meanwhile; the
    /// peer's reference is then cleared and the caller should report it as
    /// collected.
    pub fn strengthen_peer(&self, peer: &dyn Peer) -> bool {
        let current = peer.reference();
        match current.kind() {
            RefKind::Durable => return true,
            RefKind::WeakDurable => {}
            RefKind::Invalid | RefKind::Transient => return false,
        }
        let durable = self.references.new_durable(current.handle());
        let replacement = if durable.is_valid() {
            durable
        } else {
            ObjectRef::invalid()
        };
        let previous = peer.peer_core().replace_reference(replacement);
        self.references.release(previous);
        durable.is_valid()
    }

    /// Unregisters every peer reported collected since the last call and
    /// clears its reference. Returns the number of peers cleared.
    pub fn collect_peers(&self) -> usize {
        let mut cleared = 0;
        for collected in self.coordinator.drain_collected() {
            let victims = match collected.peer {
                Some(peer) => {
                    self.registry.remove_collected(collected.identity_hash, &peer);
                    vec![peer]
                }
                None => self.registry.remove_identity(collected.identity_hash),
            };
            for peer in victims.iter().filter_map(std::sync::Weak::upgrade) {
                // A handle to a collected object still has to be deleted once.
                let reference = peer.peer_core().take_reference();
                if matches!(reference.kind(), RefKind::Durable | RefKind::WeakDurable) {
                    self.references.release(reference);
                }
                self.metrics.record_peer_collected();
                cleared += 1;
            }
        }
        if cleared > 0 && self.config.logs(LogCategories::GC) {
            tracing::debug!(cleared, "cleared collected peers");
        }
        cleared
    }

    // ------------------------------------------------------------------------
    // Calls from the foreign side
    // ------------------------------------------------------------------------

    /// Runs a managed callback on behalf of the foreign side.
    ///
    /// Waits for bridge processing first. An error or panic in `f` is raised
    /// on the foreign side as a proxy throwable and `R::default()` is
    /// returned.
    pub fn invoke_from_foreign<R, F>(&self, f: F) -> R
    where
        R: Default,
        F: FnOnce() -> Result<R>,
    {
        self.coordinator.wait_for_bridge_processing();
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                self.exceptions.raise(ManagedFailure::Error(err));
                R::default()
            }
            Err(payload) => {
                self.exceptions.raise(ManagedFailure::from_panic(&*payload));
                R::default()
            }
        }
    }

    /// Converts a foreign throwable into a managed error, unwrapping proxies.
    #[must_use]
    pub fn exception_from_throwable(&self, throwable: Handle) -> BridgeError {
        self.exceptions.translate(throwable)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub const fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.runtime
    }

    #[must_use]
    pub const fn references(&self) -> &Arc<ReferenceManager> {
        &self.references
    }

    #[must_use]
    pub const fn type_map(&self) -> &Arc<TypeMapBackend> {
        &self.type_map
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn creator(&self) -> &PeerCreator {
        &self.creator
    }

    #[must_use]
    pub const fn coordinator(&self) -> &CollectorCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub const fn exceptions(&self) -> &ExceptionTranslator {
        &self.exceptions
    }

    #[must_use]
    pub const fn metrics(&self) -> &Arc<BridgeMetrics> {
        &self.metrics
    }
}
