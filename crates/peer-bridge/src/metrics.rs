//! Bridge counters.
//!
//! Each [`Bridge`](crate::Bridge) owns one [`BridgeMetrics`]. Counters are
//! cumulative and updated with relaxed atomics; they are diagnostics, not
//! synchronization.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Cumulative bridge counters.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    peers_created: AtomicUsize,
    peers_registered: AtomicUsize,
    peers_superseded: AtomicUsize,
    duplicate_registrations: AtomicUsize,
    peers_removed: AtomicUsize,
    collection_requests: AtomicUsize,
    bridge_cycles: AtomicUsize,
    peers_collected: AtomicUsize,
    finalizations_deferred: AtomicUsize,
    finalizations_completed: AtomicUsize,
    type_cache_hits: AtomicUsize,
}

/// Point-in-time copy of [`BridgeMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub peers_created: usize,
    pub peers_registered: usize,
    pub peers_superseded: usize,
    pub duplicate_registrations: usize,
    pub peers_removed: usize,
    pub collection_requests: usize,
    pub bridge_cycles: usize,
    pub peers_collected: usize,
    pub finalizations_deferred: usize,
    pub finalizations_completed: usize,
    pub type_cache_hits: usize,
}

macro_rules! counters {
    ($($field:ident => $record:ident, $total:ident;)*) => {
        impl BridgeMetrics {
            $(
                #[inline]
                pub(crate) fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }

                #[inline]
                #[must_use]
                pub fn $total(&self) -> usize {
                    self.$field.load(Ordering::Relaxed)
                }
            )*

            /// Copies every counter.
            #[must_use]
            pub fn snapshot(&self) -> MetricsSnapshot {
                MetricsSnapshot {
                    $($field: self.$total(),)*
                }
            }
        }
    };
}

counters! {
    peers_created => record_peer_created, total_peers_created;
    peers_registered => record_peer_registered, total_peers_registered;
    peers_superseded => record_peer_superseded, total_peers_superseded;
    duplicate_registrations => record_duplicate_registration, total_duplicate_registrations;
    peers_removed => record_peer_removed, total_peers_removed;
    collection_requests => record_collection_request, total_collection_requests;
    bridge_cycles => record_bridge_cycle, total_bridge_cycles;
    peers_collected => record_peer_collected, total_peers_collected;
    finalizations_deferred => record_finalization_deferred, total_finalizations_deferred;
    finalizations_completed => record_finalization_completed, total_finalizations_completed;
    type_cache_hits => record_type_cache_hit, total_type_cache_hits;
}

impl BridgeMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
