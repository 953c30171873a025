//! Peer creation: surfacing a foreign object as a managed peer.

use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::handle::{Handle, ObjectRef, Ownership, RefKind};
use crate::metrics::BridgeMetrics;
use crate::peer::{Peer, PeerState};
use crate::references::ReferenceManager;
use crate::registry::PeerRegistry;
use crate::runtime::ForeignRuntime;
use crate::tracing::{log_assignability_mismatch, log_type_miss, trace_peer_creation};
use crate::typemap::{ResolutionCache, TypeMap, TypeMapBackend};
use crate::types::{HandleActivation, ManagedType, ReferenceActivation};

/// Builds peers for foreign objects that have none yet.
///
/// Creation walks the object's class hierarchy until the type map knows a
/// class, honours a caller-supplied target type, substitutes invokers for
/// abstract types and interfaces, checks assignability against the foreign
/// class and finally runs one of the type's initializers.
pub struct PeerCreator {
    runtime: Arc<dyn ForeignRuntime>,
    references: Arc<ReferenceManager>,
    registry: Arc<PeerRegistry>,
    type_map: Arc<TypeMapBackend>,
    cache: ResolutionCache,
    strict_assignability: bool,
    metrics: Arc<BridgeMetrics>,
}

impl std::fmt::Debug for PeerCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerCreator")
            .field("type_map", &self.type_map.kind())
            .field("cache", &self.cache)
            .field("strict_assignability", &self.strict_assignability)
            .finish_non_exhaustive()
    }
}

impl PeerCreator {
    #[must_use]
    pub fn new(
        references: Arc<ReferenceManager>,
        registry: Arc<PeerRegistry>,
        type_map: Arc<TypeMapBackend>,
        strict_assignability: bool,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            runtime: Arc::clone(references.runtime()),
            references,
            registry,
            type_map,
            cache: ResolutionCache::new(),
            strict_assignability,
            metrics,
        }
    }

    /// Creates a peer for `handle`.
    ///
    /// `target`, when given, is the type the caller expects; it replaces the
    /// resolved type if that type is missing or not assignable to it.
    ///
    /// Returns `Ok(None)` when strict assignability rejects the pairing.
    /// `handle` is released according to `ownership` in every outcome.
    ///
    /// # Errors
    ///
    /// Fails when no type can be determined, no invoker exists for an
    /// abstract type, the foreign class is unknown, no initializer is
    /// available, or the initializer fails.
    pub fn create_peer(
        &self,
        handle: Handle,
        ownership: Ownership,
        target: Option<&'static ManagedType>,
    ) -> Result<Option<Arc<dyn Peer>>> {
        if handle.is_null() {
            return Ok(None);
        }
        let _span = trace_peer_creation(handle);
        let result = self.create_peer_inner(handle, ownership, target);
        self.references.release_transfer(handle, ownership);
        result
    }

    fn create_peer_inner(
        &self,
        handle: Handle,
        ownership: Ownership,
        target: Option<&'static ManagedType>,
    ) -> Result<Option<Arc<dyn Peer>>> {
        let class = self
            .references
            .scoped(self.references.created_transient(self.runtime.object_class(handle)));
        let class_name = self.runtime.class_name(class.handle());

        let mut ty = self.resolve_type(class.handle(), &class_name);
        drop(class);

        if let Some(target) = target {
            if ty.is_none_or(|resolved| !resolved.is_assignable_to(target)) {
                ty = Some(target);
            }
        }

        let Some(mut ty) = ty else {
            return Err(BridgeError::MissingMapping { class_name });
        };

        if ty.is_generic_definition() {
            return Err(BridgeError::OpenGenericType {
                type_name: ty.name(),
            });
        }

        if ty.needs_invoker() {
            ty = self
                .type_map
                .try_resolve_invoker_type(ty)
                .ok_or(BridgeError::MissingInvoker {
                    type_name: ty.name(),
                })?;
        }

        if !self.check_assignable(handle, &class_name, ty)? {
            return Ok(None);
        }

        let peer = self.activate(handle, ty)?;

        if self.runtime.is_gc_user_peer(peer.reference().handle()) {
            peer.peer_core()
                .insert_state(PeerState::REPLACEABLE | PeerState::ACTIVATABLE);
        }

        self.metrics.record_peer_created();
        tracing::debug!(
            class_name = class_name.as_str(),
            type_name = ty.name(),
            identity = %peer.identity_hash(),
            "created peer"
        );

        if ownership.registers() {
            self.registry.add_peer(&peer)?;
        }
        Ok(Some(peer))
    }

    /// Walks from `class` up its superclass chain until the type map resolves
    /// a name. Results are cached by the exact class name.
    fn resolve_type(&self, class: Handle, class_name: &str) -> Option<&'static ManagedType> {
        if let Some(ty) = self.cache.get(class_name) {
            self.metrics.record_type_cache_hit();
            return Some(ty);
        }
        if let Some(ty) = self.type_map.try_resolve_managed_type(class_name) {
            self.cache.insert(class_name, ty);
            return Some(ty);
        }
        log_type_miss(class_name);

        let mut current = self
            .references
            .scoped(self.references.created_transient(self.runtime.superclass(class)));
        while current.get().is_valid() {
            let name = self.runtime.class_name(current.handle());
            if let Some(ty) = self.type_map.try_resolve_managed_type(&name) {
                self.cache.insert(class_name, ty);
                return Some(ty);
            }
            log_type_miss(&name);
            let next = self
                .references
                .created_transient(self.runtime.superclass(current.handle()));
            current = self.references.scoped(next);
        }
        None
    }

    /// Compares the object's class with the class `ty` maps to.
    /// Returns `false` only for a strict mismatch.
    fn check_assignable(
        &self,
        handle: Handle,
        class_name: &str,
        ty: &'static ManagedType,
    ) -> Result<bool> {
        let foreign_name = self
            .type_map
            .try_resolve_foreign_name(ty)
            .ok_or(BridgeError::UnknownForeignName {
                type_name: ty.name(),
            })?;
        let type_class = self
            .references
            .scoped(self.references.created_transient(self.runtime.find_class(&foreign_name)));
        if !type_class.get().is_valid() {
            return Err(BridgeError::ForeignClassNotFound {
                class_name: foreign_name.to_string(),
            });
        }
        let handle_class = self
            .references
            .scoped(self.references.created_transient(self.runtime.object_class(handle)));
        if self
            .runtime
            .is_assignable_from(handle_class.handle(), type_class.handle())
        {
            return Ok(true);
        }
        log_assignability_mismatch(class_name, ty.name(), self.strict_assignability);
        Ok(!self.strict_assignability)
    }

    fn activate(&self, handle: Handle, ty: &'static ManagedType) -> Result<Arc<dyn Peer>> {
        if let Some(init) = ty.handle_initializer() {
            return init(HandleActivation::new(&self.references, handle, ty))
                .map_err(|err| wrap_activation_error(ty, handle, err));
        }
        if let Some(init) = ty.reference_initializer() {
            let reference = ObjectRef::new(handle, RefKind::Transient);
            let peer = init(ReferenceActivation::new(&self.references, reference, ty))
                .map_err(|err| wrap_activation_error(ty, handle, err))?;
            peer.peer_core().insert_state(PeerState::REPLACEABLE);
            return Ok(peer);
        }
        Err(BridgeError::MissingInitializer {
            type_name: ty.name(),
            handle,
            identity: self.runtime.identity_hash(handle),
        })
    }

    /// Drops every cached hierarchy-walk result.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub const fn type_map(&self) -> &Arc<TypeMapBackend> {
        &self.type_map
    }
}

fn wrap_activation_error(
    ty: &'static ManagedType,
    handle: Handle,
    err: BridgeError,
) -> BridgeError {
    match err {
        already @ BridgeError::ActivationFailed { .. } => already,
        other => BridgeError::activation_failed(ty.name(), handle, other),
    }
}
