//! Peer registry: identity hash → live peers.
//!
//! The registry answers "is there already a managed peer for this foreign
//! object?". Entries are weak so that the registry never keeps a peer alive;
//! dead entries are pruned whenever a bucket is touched.
//!
//! Identity hashes can collide, so each bucket holds a list and lookups
//! confirm a match with [`ForeignRuntime::is_same_object`].
//!
//! No strong peer reference obtained from a weak entry is dropped while the
//! registry lock is held: a peer's drop releases its durable reference, which
//! may re-enter the bridge.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::handle::{IdentityHash, ObjectRef};
use crate::metrics::BridgeMetrics;
use crate::peer::{peer_addr, Peer, PeerState};
use crate::runtime::ForeignRuntime;
use crate::tracing::log_not_replacing;

type Bucket = Vec<Weak<dyn Peer>>;

/// Outcome of [`PeerRegistry::add_peer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First entry for the identity hash, or a hash collision with other objects.
    Inserted,
    /// Replaced a dead entry or a replaceable peer for the same object.
    Superseded,
    /// The same peer was already registered.
    AlreadyRegistered,
    /// A live peer for the same object was kept; the new peer was appended
    /// next to it.
    Duplicate,
}

/// A registered peer, as returned by [`PeerRegistry::surfaced_peers`].
#[derive(Debug, Clone)]
pub struct SurfacedPeer {
    pub identity_hash: IdentityHash,
    pub peer: Weak<dyn Peer>,
}

/// Map from identity hash to the peers registered for it.
pub struct PeerRegistry {
    runtime: Arc<dyn ForeignRuntime>,
    instances: Mutex<HashMap<IdentityHash, Bucket>>,
    metrics: Arc<BridgeMetrics>,
}

impl std::fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRegistry")
            .field("buckets", &self.instances.lock().len())
            .finish_non_exhaustive()
    }
}

impl PeerRegistry {
    #[must_use]
    pub fn new(runtime: Arc<dyn ForeignRuntime>, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            runtime,
            instances: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Registers `peer` under its identity hash.
    ///
    /// Within the bucket, a replaceable peer for the same object is superseded
    /// when `peer` is not replaceable. Any other live peer for the same object
    /// is kept, `peer` is appended next to it and the duplicate is logged.
    /// Without a live match, `peer` takes the first dead entry or is appended.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidReference`] if the peer holds no reference.
    pub fn add_peer(&self, peer: &Arc<dyn Peer>) -> Result<Registration> {
        let reference = peer.reference();
        if !reference.is_valid() {
            return Err(BridgeError::InvalidReference {
                reason: "cannot register a peer without a reference",
            });
        }
        let hash = peer.identity_hash();
        let replaceable = peer.state().contains(PeerState::REPLACEABLE);
        let new_addr = peer_addr(&**peer);

        // Strong references upgraded under the lock are dropped after it.
        let mut keep_alive: Vec<Arc<dyn Peer>> = Vec::new();
        let mut kept: Option<ObjectRef> = None;

        let outcome = {
            let mut instances = self.instances.lock();
            let bucket = instances.entry(hash).or_default();
            let mut already_registered = false;
            let mut replace_at = None;
            let mut stale_at = None;

            // The whole bucket is scanned: a stale slot is only reused when no
            // live peer for the same object is present.
            for (idx, slot) in bucket.iter().enumerate() {
                if std::ptr::addr_eq(slot.as_ptr(), new_addr) {
                    already_registered = true;
                    break;
                }
                let Some(existing) = slot.upgrade() else {
                    stale_at.get_or_insert(idx);
                    continue;
                };
                let existing_ref = existing.reference();
                if !existing_ref.is_valid() {
                    stale_at.get_or_insert(idx);
                } else if self
                    .runtime
                    .is_same_object(existing_ref.handle(), reference.handle())
                {
                    if replace_at.is_none()
                        && existing.state().contains(PeerState::REPLACEABLE)
                        && !replaceable
                    {
                        replace_at = Some(idx);
                    } else {
                        kept.get_or_insert(existing_ref);
                    }
                }
                keep_alive.push(existing);
            }

            if already_registered {
                Registration::AlreadyRegistered
            } else if let Some(idx) = replace_at {
                bucket[idx] = Arc::downgrade(peer);
                Registration::Superseded
            } else if kept.is_some() {
                bucket.push(Arc::downgrade(peer));
                Registration::Duplicate
            } else if let Some(idx) = stale_at {
                bucket[idx] = Arc::downgrade(peer);
                Registration::Superseded
            } else {
                bucket.push(Arc::downgrade(peer));
                Registration::Inserted
            }
        };
        drop(keep_alive);

        match outcome {
            Registration::Inserted => self.metrics.record_peer_registered(),
            Registration::Superseded => {
                self.metrics.record_peer_registered();
                self.metrics.record_peer_superseded();
            }
            Registration::Duplicate => {
                self.metrics.record_peer_registered();
                self.metrics.record_duplicate_registration();
                if let Some(kept) = kept {
                    log_not_replacing(hash, kept, reference);
                }
            }
            Registration::AlreadyRegistered => {}
        }
        Ok(outcome)
    }

    /// Removes `peer` from its bucket, pruning dead entries on the way.
    ///
    /// Idempotent. Works after the peer's reference has been released, since
    /// the identity hash is captured at construction.
    pub fn remove_peer(&self, peer: &dyn Peer) -> bool {
        let addr = peer_addr(peer);
        let removed = self.remove_where(peer.identity_hash(), |slot| {
            std::ptr::addr_eq(slot.as_ptr(), addr)
        });
        removed > 0
    }

    /// Removes every entry for `hash` whose peer matches `predicate`, plus
    /// dead entries. Returns the number of matching entries removed.
    fn remove_where<F>(&self, hash: IdentityHash, mut predicate: F) -> usize
    where
        F: FnMut(&Weak<dyn Peer>) -> bool,
    {
        let mut removed = 0;
        let mut instances = self.instances.lock();
        let Some(bucket) = instances.get_mut(&hash) else {
            return 0;
        };
        bucket.retain(|slot| {
            if predicate(slot) {
                removed += 1;
                return false;
            }
            slot.strong_count() > 0
        });
        if bucket.is_empty() {
            instances.remove(&hash);
        }
        drop(instances);
        for _ in 0..removed {
            self.metrics.record_peer_removed();
        }
        removed
    }

    /// Removes every entry for `hash` and returns them.
    pub(crate) fn remove_identity(&self, hash: IdentityHash) -> Vec<Weak<dyn Peer>> {
        let bucket = self.instances.lock().remove(&hash).unwrap_or_default();
        for _ in &bucket {
            self.metrics.record_peer_removed();
        }
        bucket
    }

    /// Removes the entry for one collected peer.
    pub(crate) fn remove_collected(&self, hash: IdentityHash, peer: &Weak<dyn Peer>) -> bool {
        let addr = peer.as_ptr();
        self.remove_where(hash, |slot| std::ptr::addr_eq(slot.as_ptr(), addr)) > 0
    }

    /// Returns the live peer registered for the object `reference` names.
    ///
    /// Dead entries and entries whose peer has been disposed are pruned.
    pub fn peek_peer(&self, reference: ObjectRef) -> Option<Arc<dyn Peer>> {
        if !reference.is_valid() {
            return None;
        }
        let hash = self.runtime.identity_hash(reference.handle());
        let mut keep_alive: Vec<Arc<dyn Peer>> = Vec::new();
        let mut found = None;
        {
            let mut instances = self.instances.lock();
            let Some(bucket) = instances.get_mut(&hash) else {
                return None;
            };
            let mut i = bucket.len();
            while i > 0 {
                i -= 1;
                let Some(peer) = bucket[i].upgrade() else {
                    bucket.remove(i);
                    continue;
                };
                let peer_ref = peer.reference();
                if !peer_ref.is_valid() {
                    bucket.remove(i);
                    keep_alive.push(peer);
                    continue;
                }
                if self
                    .runtime
                    .is_same_object(reference.handle(), peer_ref.handle())
                {
                    found = Some(peer);
                    break;
                }
                keep_alive.push(peer);
            }
            if bucket.is_empty() {
                instances.remove(&hash);
            }
        }
        drop(keep_alive);
        found
    }

    /// Every registered entry whose peer is still alive.
    #[must_use]
    pub fn surfaced_peers(&self) -> Vec<SurfacedPeer> {
        let instances = self.instances.lock();
        instances
            .iter()
            .flat_map(|(&identity_hash, bucket)| {
                bucket
                    .iter()
                    .filter(|slot| slot.strong_count() > 0)
                    .map(move |slot| SurfacedPeer {
                        identity_hash,
                        peer: Weak::clone(slot),
                    })
            })
            .collect()
    }

    /// Number of entries, dead ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.lock().values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }

    /// Number of identity hashes with at least one entry.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.instances.lock().len()
    }
}
