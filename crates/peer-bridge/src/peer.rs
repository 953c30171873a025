//! Peers: managed objects that stand for foreign objects.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::error::Result;
use crate::handle::{Handle, IdentityHash, ObjectRef, Ownership, RefKind};
use crate::references::ReferenceManager;
use crate::types::ManagedType;

bitflags! {
    /// Lifecycle flags of a peer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PeerState: u8 {
        /// A later registration for the same foreign object may supersede this peer.
        const REPLACEABLE = 1 << 0;
        /// The peer was activated from the foreign side.
        const ACTIVATABLE = 1 << 1;
    }
}

/// Bridge-owned part of every peer: the foreign reference, the identity hash
/// and the state flags.
///
/// Dropping a `PeerCore` releases its reference if one is still held.
pub struct PeerCore {
    reference: Mutex<ObjectRef>,
    identity_hash: IdentityHash,
    state: AtomicU8,
    references: Arc<ReferenceManager>,
}

impl PeerCore {
    /// Builds a core around `handle`, taking a durable reference according to
    /// `ownership`.
    ///
    /// # Errors
    ///
    /// Propagates [`ReferenceManager::adopt`] failures.
    pub fn new(
        references: &Arc<ReferenceManager>,
        handle: Handle,
        ownership: Ownership,
    ) -> Result<Self> {
        let reference = references.adopt(handle, ownership)?;
        Ok(Self::from_reference(references, reference))
    }

    /// Builds a core that takes ownership of `reference` as-is.
    ///
    /// A transient `reference` is accepted; it is promoted when the peer is
    /// registered.
    #[must_use]
    pub fn from_reference(references: &Arc<ReferenceManager>, reference: ObjectRef) -> Self {
        let identity_hash = if reference.is_valid() {
            references.runtime().identity_hash(reference.handle())
        } else {
            IdentityHash::default()
        };
        Self {
            reference: Mutex::new(reference),
            identity_hash,
            state: AtomicU8::new(PeerState::empty().bits()),
            references: Arc::clone(references),
        }
    }

    /// Current reference. Invalid once the peer is disposed or collected.
    #[inline]
    #[must_use]
    pub fn reference(&self) -> ObjectRef {
        *self.reference.lock()
    }

    /// Identity hash captured at construction; stable across promotion.
    #[inline]
    #[must_use]
    pub const fn identity_hash(&self) -> IdentityHash {
        self.identity_hash
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> PeerState {
        PeerState::from_bits_truncate(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: PeerState) {
        self.state.store(state.bits(), Ordering::Release);
    }

    /// Adds `flags` to the state.
    pub fn insert_state(&self, flags: PeerState) {
        self.state.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    #[must_use]
    pub fn is_replaceable(&self) -> bool {
        self.state().contains(PeerState::REPLACEABLE)
    }

    /// Swaps in `reference` and returns the previous one unreleased.
    pub(crate) fn replace_reference(&self, reference: ObjectRef) -> ObjectRef {
        std::mem::replace(&mut *self.reference.lock(), reference)
    }

    /// Clears the reference and returns it unreleased.
    pub(crate) fn take_reference(&self) -> ObjectRef {
        std::mem::take(&mut *self.reference.lock())
    }

    /// Promotes a transient reference to durable in place.
    pub(crate) fn promote(&self) -> Result<()> {
        let transient = self.reference();
        if transient.kind() != RefKind::Transient {
            return Ok(());
        }
        // Adopting may request a collection; the lock is not held across it.
        let adopted = self
            .references
            .adopt(transient.handle(), Ownership::DO_NOT_TRANSFER);
        let mut guard = self.reference.lock();
        if *guard != transient {
            // Someone else replaced the transient and owns its release.
            drop(guard);
            if let Ok(durable) = adopted {
                self.references.release(durable);
            }
            return Ok(());
        }
        let result = match adopted {
            Ok(durable) => {
                *guard = durable;
                Ok(())
            }
            Err(err) => {
                *guard = ObjectRef::invalid();
                Err(err)
            }
        };
        drop(guard);
        self.references.release(transient);
        result
    }
}

impl fmt::Debug for PeerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerCore")
            .field("reference", &self.reference())
            .field("identity_hash", &self.identity_hash)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for PeerCore {
    fn drop(&mut self) {
        let reference = std::mem::take(self.reference.get_mut());
        // Transients belong to the thread that created them.
        if matches!(reference.kind(), RefKind::Durable | RefKind::WeakDurable) {
            self.references.release(reference);
        }
    }
}

/// A managed object standing for a foreign object.
///
/// Implementors embed a [`PeerCore`] and return it from [`Peer::peer_core`].
pub trait Peer: Send + Sync + 'static {
    fn peer_core(&self) -> &PeerCore;

    /// The managed type this peer was activated as.
    fn managed_type(&self) -> &'static ManagedType;

    /// Called once when the bridge finalizes the peer.
    fn finalized(&self) {}
}

impl dyn Peer {
    #[inline]
    #[must_use]
    pub fn reference(&self) -> ObjectRef {
        self.peer_core().reference()
    }

    #[inline]
    #[must_use]
    pub fn identity_hash(&self) -> IdentityHash {
        self.peer_core().identity_hash()
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> PeerState {
        self.peer_core().state()
    }

    /// Returns `true` once the peer no longer holds a reference.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        !self.reference().is_valid()
    }
}

impl fmt::Debug for dyn Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("type", &self.managed_type().name())
            .field("core", self.peer_core())
            .finish()
    }
}

/// Address of a peer, used for identity comparison without upgrading.
pub(crate) fn peer_addr(peer: &dyn Peer) -> *const () {
    std::ptr::from_ref(peer).cast::<()>()
}
