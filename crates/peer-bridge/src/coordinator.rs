//! Collector coordination.
//!
//! While the managed collector's bridge processing runs, peer references are
//! being swapped between durable and weak-durable kinds. No managed code may
//! touch peers during that window, so every entry point from the foreign side
//! calls [`CollectorCoordinator::wait_for_bridge_processing`] first.
//!
//! The collector reports the window with
//! [`bridge_processing_started`](CollectorCoordinator::bridge_processing_started)
//! and
//! [`bridge_processing_finished`](CollectorCoordinator::bridge_processing_finished).
//! Peers whose foreign objects were collected during the window are queued and
//! drained later by [`Bridge::collect_peers`](crate::Bridge::collect_peers).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};

use crate::handle::IdentityHash;
use crate::metrics::BridgeMetrics;
use crate::peer::Peer;
use crate::tracing::{next_cycle_id, trace_bridge_cycle, CycleId};

/// A peer whose foreign object was collected during bridge processing.
#[derive(Debug, Clone)]
pub struct CollectedPeer {
    pub identity_hash: IdentityHash,
    /// The specific peer, or `None` for every peer registered under the hash.
    pub peer: Option<Weak<dyn Peer>>,
}

impl CollectedPeer {
    #[must_use]
    pub const fn identity(identity_hash: IdentityHash) -> Self {
        Self {
            identity_hash,
            peer: None,
        }
    }

    #[must_use]
    pub const fn peer(identity_hash: IdentityHash, peer: Weak<dyn Peer>) -> Self {
        Self {
            identity_hash,
            peer: Some(peer),
        }
    }
}

/// Tracks the bridge-processing window and blocks callers during it.
#[derive(Debug, Default)]
pub struct CollectorCoordinator {
    in_progress: AtomicBool,
    lock: Mutex<Option<CycleId>>,
    idle: Condvar,
    collected: SegQueue<CollectedPeer>,
}

impl CollectorCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while bridge processing is in progress.
    #[inline]
    #[must_use]
    pub fn is_bridge_processing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Blocks until no bridge processing is in progress.
    ///
    /// Returns immediately when the flag is clear. The flag is re-checked under
    /// the lock, so a `finished` racing with this call cannot be missed.
    pub fn wait_for_bridge_processing(&self) {
        if !self.in_progress.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.lock.lock();
        while self.in_progress.load(Ordering::Acquire) {
            self.idle.wait(&mut guard);
        }
    }

    /// Marks the start of bridge processing.
    pub fn bridge_processing_started(&self, metrics: &BridgeMetrics) -> CycleId {
        let cycle = next_cycle_id();
        let mut guard = self.lock.lock();
        *guard = Some(cycle);
        self.in_progress.store(true, Ordering::Release);
        drop(guard);
        metrics.record_bridge_cycle();
        tracing::debug!(cycle_id = cycle.0, "bridge processing started");
        cycle
    }

    /// Queues the collected peers, clears the flag and wakes every waiter.
    pub fn bridge_processing_finished<I>(&self, collected: I)
    where
        I: IntoIterator<Item = CollectedPeer>,
    {
        let mut count = 0usize;
        for peer in collected {
            self.collected.push(peer);
            count += 1;
        }
        let mut guard = self.lock.lock();
        let cycle = guard.take();
        self.in_progress.store(false, Ordering::Release);
        self.idle.notify_all();
        drop(guard);
        tracing::debug!(
            cycle_id = cycle.map(|c| c.0),
            collected = count,
            "bridge processing finished"
        );
    }

    /// Starts a bridge-processing window that ends when the guard drops.
    #[must_use]
    pub fn begin_cycle<'a>(&'a self, metrics: &BridgeMetrics) -> BridgeCycle<'a> {
        let id = self.bridge_processing_started(metrics);
        BridgeCycle {
            coordinator: self,
            span: Some(trace_bridge_cycle(id)),
            id,
            collected: Vec::new(),
        }
    }

    /// Removes and returns every queued collected peer.
    pub(crate) fn drain_collected(&self) -> Vec<CollectedPeer> {
        std::iter::from_fn(|| self.collected.pop()).collect()
    }

    /// Number of collected peers waiting to be drained.
    #[must_use]
    pub fn pending_collected(&self) -> usize {
        self.collected.len()
    }
}

/// An open bridge-processing window.
///
/// Collected peers recorded on the guard are queued when it drops.
pub struct BridgeCycle<'a> {
    coordinator: &'a CollectorCoordinator,
    span: Option<tracing::span::EnteredSpan>,
    id: CycleId,
    collected: Vec<CollectedPeer>,
}

impl BridgeCycle<'_> {
    #[must_use]
    pub const fn id(&self) -> CycleId {
        self.id
    }

    /// Records a peer whose foreign object did not survive the collection.
    pub fn record_collected(&mut self, peer: CollectedPeer) {
        self.collected.push(peer);
    }
}

impl std::fmt::Debug for BridgeCycle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeCycle")
            .field("id", &self.id)
            .field("collected", &self.collected.len())
            .finish_non_exhaustive()
    }
}

impl Drop for BridgeCycle<'_> {
    fn drop(&mut self) {
        let collected = std::mem::take(&mut self.collected);
        self.coordinator.bridge_processing_finished(collected);
        drop(self.span.take());
    }
}
