//! Managed type descriptors.
//!
//! A [`ManagedType`] is a `'static` description of a peer type: its name, its
//! place in the managed hierarchy and the initializers that activate it from a
//! foreign handle. Descriptors are declared as statics and compared by name.
//!
//! ```
//! use peer_bridge::ManagedType;
//!
//! static OBJECT: ManagedType = ManagedType::class("Java.Lang.Object");
//! static RUNNABLE: ManagedType = ManagedType::interface("Java.Lang.IRunnable");
//! static THREAD_INTERFACES: [&ManagedType; 1] = [&RUNNABLE];
//! static THREAD: ManagedType = ManagedType::class("Java.Lang.Thread")
//!     .extends(&OBJECT)
//!     .implements(&THREAD_INTERFACES);
//!
//! assert!(THREAD.is_assignable_to(&RUNNABLE));
//! assert!(!OBJECT.is_assignable_to(&THREAD));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::Result;
use crate::handle::{Handle, ObjectRef, Ownership};
use crate::peer::{Peer, PeerCore};
use crate::references::ReferenceManager;

/// Constructs a peer from a raw handle.
pub type HandleInitializer = for<'a> fn(HandleActivation<'a>) -> Result<Arc<dyn Peer>>;

/// Constructs a peer by copying a reference.
pub type ReferenceInitializer = for<'a> fn(ReferenceActivation<'a>) -> Result<Arc<dyn Peer>>;

/// Shape of a managed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeShape {
    Class,
    /// Cannot be instantiated; activation goes through an invoker.
    Abstract,
    /// Cannot be instantiated; activation goes through an invoker.
    Interface,
}

/// Static description of a peer type.
pub struct ManagedType {
    name: &'static str,
    shape: TypeShape,
    base: Option<&'static ManagedType>,
    interfaces: &'static [&'static ManagedType],
    generic_definition: bool,
    handle_initializer: Option<HandleInitializer>,
    reference_initializer: Option<ReferenceInitializer>,
}

impl ManagedType {
    const fn with_shape(name: &'static str, shape: TypeShape) -> Self {
        Self {
            name,
            shape,
            base: None,
            interfaces: &[],
            generic_definition: false,
            handle_initializer: None,
            reference_initializer: None,
        }
    }

    #[must_use]
    pub const fn class(name: &'static str) -> Self {
        Self::with_shape(name, TypeShape::Class)
    }

    #[must_use]
    pub const fn abstract_class(name: &'static str) -> Self {
        Self::with_shape(name, TypeShape::Abstract)
    }

    #[must_use]
    pub const fn interface(name: &'static str) -> Self {
        Self::with_shape(name, TypeShape::Interface)
    }

    #[must_use]
    pub const fn extends(mut self, base: &'static Self) -> Self {
        self.base = Some(base);
        self
    }

    #[must_use]
    pub const fn implements(mut self, interfaces: &'static [&'static Self]) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Marks the type as an unbound generic definition.
    #[must_use]
    pub const fn generic_definition(mut self) -> Self {
        self.generic_definition = true;
        self
    }

    #[must_use]
    pub const fn with_handle_initializer(mut self, init: HandleInitializer) -> Self {
        self.handle_initializer = Some(init);
        self
    }

    #[must_use]
    pub const fn with_reference_initializer(mut self, init: ReferenceInitializer) -> Self {
        self.reference_initializer = Some(init);
        self
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    #[must_use]
    pub const fn shape(&self) -> TypeShape {
        self.shape
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> Option<&'static Self> {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn interfaces(&self) -> &'static [&'static Self] {
        self.interfaces
    }

    #[inline]
    #[must_use]
    pub const fn is_generic_definition(&self) -> bool {
        self.generic_definition
    }

    /// Returns `true` for abstract classes and interfaces.
    #[inline]
    #[must_use]
    pub const fn needs_invoker(&self) -> bool {
        matches!(self.shape, TypeShape::Abstract | TypeShape::Interface)
    }

    #[must_use]
    pub const fn handle_initializer(&self) -> Option<HandleInitializer> {
        self.handle_initializer
    }

    #[must_use]
    pub const fn reference_initializer(&self) -> Option<ReferenceInitializer> {
        self.reference_initializer
    }

    /// Whether a value of this type can be used where `target` is expected.
    #[must_use]
    pub fn is_assignable_to(&self, target: &Self) -> bool {
        if self == target {
            return true;
        }
        if self.interfaces.iter().any(|i| i.is_assignable_to(target)) {
            return true;
        }
        self.base.is_some_and(|base| base.is_assignable_to(target))
    }

    /// The base chain, starting with `base()` and ending at the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &'static Self> {
        std::iter::successors(self.base, |ty| ty.base)
    }
}

impl PartialEq for ManagedType {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.name == other.name
    }
}

impl Eq for ManagedType {}

impl Hash for ManagedType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedType")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("base", &self.base.map(Self::name))
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// Activation contexts
// ============================================================================

/// Context passed to a [`HandleInitializer`].
///
/// The handle is borrowed; [`HandleActivation::into_core`] takes the peer's
/// own durable reference.
pub struct HandleActivation<'a> {
    references: &'a Arc<ReferenceManager>,
    handle: Handle,
    ty: &'static ManagedType,
}

impl<'a> HandleActivation<'a> {
    pub(crate) const fn new(
        references: &'a Arc<ReferenceManager>,
        handle: Handle,
        ty: &'static ManagedType,
    ) -> Self {
        Self {
            references,
            handle,
            ty,
        }
    }

    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// The concrete type being activated.
    #[must_use]
    pub const fn managed_type(&self) -> &'static ManagedType {
        self.ty
    }

    /// Builds the peer core around a new durable reference.
    ///
    /// # Errors
    ///
    /// Fails if the durable reference cannot be created.
    pub fn into_core(self) -> Result<PeerCore> {
        PeerCore::new(self.references, self.handle, Ownership::DO_NOT_TRANSFER)
    }
}

/// Context passed to a [`ReferenceInitializer`].
///
/// Peers activated through this path are marked replaceable.
pub struct ReferenceActivation<'a> {
    references: &'a Arc<ReferenceManager>,
    reference: ObjectRef,
    ty: &'static ManagedType,
}

impl<'a> ReferenceActivation<'a> {
    pub(crate) const fn new(
        references: &'a Arc<ReferenceManager>,
        reference: ObjectRef,
        ty: &'static ManagedType,
    ) -> Self {
        Self {
            references,
            reference,
            ty,
        }
    }

    #[must_use]
    pub const fn reference(&self) -> ObjectRef {
        self.reference
    }

    #[must_use]
    pub const fn managed_type(&self) -> &'static ManagedType {
        self.ty
    }

    /// Builds the peer core around a copy of the reference.
    ///
    /// # Errors
    ///
    /// Fails if the copy cannot be created.
    pub fn into_core(self) -> Result<PeerCore> {
        PeerCore::new(
            self.references,
            self.reference.handle(),
            Ownership::DO_NOT_TRANSFER,
        )
    }
}
