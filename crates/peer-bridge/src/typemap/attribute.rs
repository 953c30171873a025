//! Registrations declared next to peer types and collected at link time.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::TypeMap;
use crate::types::ManagedType;

/// One peer type registration.
///
/// Submitted with [`register_peer_type!`](crate::register_peer_type).
#[derive(Debug)]
pub struct PeerTypeRegistration {
    ty: &'static ManagedType,
    foreign_name: &'static str,
    invoker: Option<&'static ManagedType>,
}

impl PeerTypeRegistration {
    #[must_use]
    pub const fn new(
        ty: &'static ManagedType,
        foreign_name: &'static str,
        invoker: Option<&'static ManagedType>,
    ) -> Self {
        Self {
            ty,
            foreign_name,
            invoker,
        }
    }

    #[must_use]
    pub const fn managed_type(&self) -> &'static ManagedType {
        self.ty
    }

    #[must_use]
    pub const fn foreign_name(&self) -> &'static str {
        self.foreign_name
    }

    #[must_use]
    pub const fn invoker(&self) -> Option<&'static ManagedType> {
        self.invoker
    }
}

inventory::collect!(PeerTypeRegistration);

/// Registers a managed peer type under a foreign class name.
///
/// ```
/// use peer_bridge::{register_peer_type, ManagedType};
///
/// static RUNNABLE: ManagedType = ManagedType::interface("Java.Lang.IRunnable");
/// static RUNNABLE_INVOKER: ManagedType = ManagedType::class("Java.Lang.IRunnableInvoker");
///
/// register_peer_type!(RUNNABLE, "java/lang/Runnable", invoker = RUNNABLE_INVOKER);
/// ```
#[macro_export]
macro_rules! register_peer_type {
    ($ty:path, $foreign:expr $(,)?) => {
        $crate::inventory::submit! {
            $crate::typemap::PeerTypeRegistration::new(&$ty, $foreign, ::core::option::Option::None)
        }
    };
    ($ty:path, $foreign:expr, invoker = $invoker:path $(,)?) => {
        $crate::inventory::submit! {
            $crate::typemap::PeerTypeRegistration::new(
                &$ty,
                $foreign,
                ::core::option::Option::Some(&$invoker),
            )
        }
    };
}

#[derive(Debug, Default)]
struct AttributeIndex {
    by_foreign: HashMap<&'static str, &'static ManagedType>,
    by_managed: HashMap<&'static str, Arc<str>>,
    invokers: HashMap<&'static str, &'static ManagedType>,
}

impl AttributeIndex {
    fn build<I>(registrations: I) -> Self
    where
        I: IntoIterator<Item = &'static PeerTypeRegistration>,
    {
        let mut index = Self::default();
        for reg in registrations {
            if let Some(existing) = index.by_foreign.get(reg.foreign_name) {
                if *existing != reg.ty {
                    tracing::warn!(
                        foreign_name = reg.foreign_name,
                        kept = existing.name(),
                        ignored = reg.ty.name(),
                        "duplicate peer type registration"
                    );
                }
                continue;
            }
            index.by_foreign.insert(reg.foreign_name, reg.ty);
            let name: Arc<str> = Arc::from(reg.foreign_name);
            index.by_managed.entry(reg.ty.name()).or_insert_with(|| Arc::clone(&name));
            if let Some(invoker) = reg.invoker {
                index.invokers.insert(reg.ty.name(), invoker);
                index.by_managed.entry(invoker.name()).or_insert(name);
            }
        }
        index
    }
}

static SCANNED: LazyLock<Arc<AttributeIndex>> = LazyLock::new(|| {
    let index = AttributeIndex::build(inventory::iter::<PeerTypeRegistration>);
    tracing::debug!(types = index.by_foreign.len(), "scanned peer type registrations");
    Arc::new(index)
});

/// Type map over `register_peer_type!` registrations.
///
/// Reverse lookups are exact: a type resolves to the name it was registered
/// under, and an invoker to the name of the type it stands in for.
#[derive(Debug, Clone)]
pub struct AttributeTypeMap {
    index: Arc<AttributeIndex>,
}

impl AttributeTypeMap {
    /// The process-wide map over every registration in the binary. The scan
    /// runs once.
    #[must_use]
    pub fn scan() -> Self {
        Self {
            index: Arc::clone(&SCANNED),
        }
    }

    /// A map over an explicit registration set.
    #[must_use]
    pub fn from_registrations<I>(registrations: I) -> Self
    where
        I: IntoIterator<Item = &'static PeerTypeRegistration>,
    {
        Self {
            index: Arc::new(AttributeIndex::build(registrations)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.by_foreign.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.by_foreign.is_empty()
    }
}

impl TypeMap for AttributeTypeMap {
    fn try_resolve_managed_type(&self, foreign_name: &str) -> Option<&'static ManagedType> {
        self.index.by_foreign.get(foreign_name).copied()
    }

    fn try_resolve_foreign_name(&self, ty: &ManagedType) -> Option<Arc<str>> {
        self.index.by_managed.get(ty.name()).cloned()
    }

    fn try_resolve_invoker_type(&self, ty: &ManagedType) -> Option<&'static ManagedType> {
        self.index.invokers.get(ty.name()).copied()
    }
}
