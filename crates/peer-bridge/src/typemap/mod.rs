//! Foreign name ↔ managed type mapping.
//!
//! Three backends implement [`TypeMap`]:
//!
//! - [`ExactTable`]: a table built ahead of time from explicit entries.
//! - [`HierarchyTypeMap`]: registrations made at runtime, with per-package
//!   lookups for classes nobody registered and a base-chain walk for reverse
//!   lookups.
//! - [`AttributeTypeMap`]: registrations declared next to the peer types with
//!   [`register_peer_type!`](crate::register_peer_type) and collected at link
//!   time.
//!
//! A bridge picks one backend when it is built ([`TypeMapBackend`]); the
//! choice does not change afterwards. For every registered class the three
//! backends give the same answers.

mod attribute;
mod cache;
mod exact;
mod hierarchy;

use std::sync::Arc;

pub use attribute::{AttributeTypeMap, PeerTypeRegistration};
pub use cache::ResolutionCache;
pub use exact::{ExactTable, InvokerEntry, TypeMapEntry};
pub use hierarchy::{HierarchyTypeMap, PackageLookup};

use crate::config::TypeMapKind;
use crate::types::ManagedType;

/// Suffix of the invoker type name for an abstract type or interface.
pub const INVOKER_SUFFIX: &str = "Invoker";

/// Bidirectional name mapping between the foreign and managed type systems.
pub trait TypeMap: Send + Sync {
    /// Managed type registered for exactly `foreign_name`. No hierarchy walk.
    fn try_resolve_managed_type(&self, foreign_name: &str) -> Option<&'static ManagedType>;

    /// Foreign class name for `ty`.
    fn try_resolve_foreign_name(&self, ty: &ManagedType) -> Option<Arc<str>>;

    /// Concrete stand-in for an abstract type or interface.
    fn try_resolve_invoker_type(&self, ty: &ManagedType) -> Option<&'static ManagedType>;
}

/// The type map a bridge was built with.
#[derive(Debug)]
pub enum TypeMapBackend {
    ExactTable(ExactTable),
    HierarchyWalking(HierarchyTypeMap),
    AttributeScan(AttributeTypeMap),
}

impl TypeMapBackend {
    /// Builds the backend of `kind` from every
    /// [`register_peer_type!`](crate::register_peer_type) registration in the
    /// binary.
    #[must_use]
    pub fn from_registrations(kind: TypeMapKind) -> Self {
        let registrations: Vec<&'static PeerTypeRegistration> =
            inventory::iter::<PeerTypeRegistration>.into_iter().collect();
        Self::from_registration_list(kind, registrations)
    }

    /// Builds the backend of `kind` from an explicit registration list.
    #[must_use]
    pub fn from_registration_list<I>(kind: TypeMapKind, registrations: I) -> Self
    where
        I: IntoIterator<Item = &'static PeerTypeRegistration>,
    {
        match kind {
            TypeMapKind::ExactTable => Self::ExactTable(ExactTable::from_registrations(registrations)),
            TypeMapKind::HierarchyWalking => {
                let map = HierarchyTypeMap::new();
                for registration in registrations {
                    map.register_type(registration.foreign_name(), registration.managed_type());
                    if let Some(invoker) = registration.invoker() {
                        map.register_invoker(registration.managed_type(), invoker);
                    }
                }
                Self::HierarchyWalking(map)
            }
            TypeMapKind::AttributeScan => {
                Self::AttributeScan(AttributeTypeMap::from_registrations(registrations))
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> TypeMapKind {
        match self {
            Self::ExactTable(_) => TypeMapKind::ExactTable,
            Self::HierarchyWalking(_) => TypeMapKind::HierarchyWalking,
            Self::AttributeScan(_) => TypeMapKind::AttributeScan,
        }
    }

    fn as_dyn(&self) -> &dyn TypeMap {
        match self {
            Self::ExactTable(map) => map,
            Self::HierarchyWalking(map) => map,
            Self::AttributeScan(map) => map,
        }
    }
}

impl TypeMap for TypeMapBackend {
    fn try_resolve_managed_type(&self, foreign_name: &str) -> Option<&'static ManagedType> {
        self.as_dyn().try_resolve_managed_type(foreign_name)
    }

    fn try_resolve_foreign_name(&self, ty: &ManagedType) -> Option<Arc<str>> {
        self.as_dyn().try_resolve_foreign_name(ty)
    }

    fn try_resolve_invoker_type(&self, ty: &ManagedType) -> Option<&'static ManagedType> {
        self.as_dyn().try_resolve_invoker_type(ty)
    }
}

impl From<ExactTable> for TypeMapBackend {
    fn from(map: ExactTable) -> Self {
        Self::ExactTable(map)
    }
}

impl From<HierarchyTypeMap> for TypeMapBackend {
    fn from(map: HierarchyTypeMap) -> Self {
        Self::HierarchyWalking(map)
    }
}

impl From<AttributeTypeMap> for TypeMapBackend {
    fn from(map: AttributeTypeMap) -> Self {
        Self::AttributeScan(map)
    }
}

/// Package part of a foreign class name (`com/example` for `com/example/Widget`).
#[must_use]
pub fn package_of(foreign_name: &str) -> &str {
    foreign_name.rfind('/').map_or("", |idx| &foreign_name[..idx])
}

/// Conventional invoker name for `ty`.
#[must_use]
pub fn invoker_name(ty: &ManagedType) -> String {
    format!("{}{INVOKER_SUFFIX}", ty.name())
}
