//! Peer identity and handle ownership between a managed runtime and a foreign
//! object system.
//!
//! Every foreign object that becomes visible to managed code is represented by
//! exactly one live managed *peer*. `peer-bridge` keeps that mapping honest:
//!
//! - **Reference manager**: creates and releases transient, durable and
//!   weak-durable handles, and requests a managed collection when the number
//!   of durable handles approaches the foreign runtime's limit.
//! - **Type map**: translates foreign class names to managed types and back,
//!   with three interchangeable backends.
//! - **Peer registry**: finds the existing peer for a foreign object by
//!   identity hash, without keeping it alive.
//! - **Peer creator**: builds a peer for an object that has none, walking the
//!   foreign class hierarchy to pick the most specific managed type.
//! - **Collector coordinator**: blocks managed code while the collector is
//!   rewriting peer references.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use peer_bridge::{Bridge, BridgeConfig, Ownership};
//!
//! let bridge = Bridge::builder(runtime)
//!     .config(BridgeConfig::from_env())
//!     .build();
//!
//! // Surface a foreign object handed to us by a native callback.
//! let peer = bridge.resolve_peer(handle, Ownership::DO_NOT_TRANSFER, None)?;
//! ```
//!
//! # Thread Safety
//!
//! [`Bridge`] is `Send + Sync`. Transient references are only valid on the
//! thread and in the call that produced them; durable references may be used
//! from any thread.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod bridge;
pub mod config;
mod coordinator;
mod creator;
mod error;
mod exceptions;
mod handle;
mod metrics;
pub mod native;
mod peer;
mod references;
mod registry;
mod runtime;
mod tracing;
pub mod typemap;
mod types;

pub use bridge::{Bridge, BridgeBuilder, FinalizeOutcome};
pub use config::{BridgeConfig, LogCategories, TypeMapKind};
pub use coordinator::{BridgeCycle, CollectedPeer, CollectorCoordinator};
pub use creator::PeerCreator;
pub use error::{BridgeError, Result};
pub use exceptions::{ExceptionTranslator, ForeignException, ManagedFailure};
pub use handle::{Handle, IdentityHash, ObjectRef, Ownership, RefKind, Transfer};
pub use metrics::{BridgeMetrics, MetricsSnapshot};
pub use peer::{Peer, PeerCore, PeerState};
pub use references::{
    default_collect_condition, CollectCondition, DurableCollectInfo, ReferenceManager, ScopedRef,
    TransientFrame,
};
pub use registry::{PeerRegistry, Registration, SurfacedPeer};
pub use runtime::{ForeignRuntime, ManagedCollector, NoopCollector};
pub use typemap::{TypeMap, TypeMapBackend};
pub use types::{
    HandleActivation, HandleInitializer, ManagedType, ReferenceActivation, ReferenceInitializer,
    TypeShape,
};

#[doc(hidden)]
pub use inventory;

#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod test_util;
