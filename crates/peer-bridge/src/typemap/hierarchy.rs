//! Runtime registrations with package fallbacks and base-chain reverse lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{invoker_name, package_of, TypeMap};
use crate::types::ManagedType;

/// Resolves a foreign class name within one package. Returns `None` for names
/// the package does not know.
pub type PackageLookup = Arc<dyn Fn(&str) -> Option<&'static ManagedType> + Send + Sync>;

/// Type map populated at runtime.
///
/// Forward lookups check explicit registrations first, then the lookups
/// registered for the class's package. Reverse lookups walk the managed type's
/// interfaces and base chain until a registered name is found. Invokers
/// registered with [`register_invoker`](Self::register_invoker) win; otherwise
/// the invoker of `Foo` is the known type named `FooInvoker`.
#[derive(Default)]
pub struct HierarchyTypeMap {
    foreign_to_managed: RwLock<HashMap<Arc<str>, &'static ManagedType>>,
    managed_to_foreign: RwLock<HashMap<&'static str, Arc<str>>>,
    known: RwLock<HashMap<&'static str, &'static ManagedType>>,
    invokers: RwLock<HashMap<&'static str, &'static ManagedType>>,
    packages: RwLock<HashMap<String, Vec<PackageLookup>>>,
}

impl std::fmt::Debug for HierarchyTypeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyTypeMap")
            .field("types", &self.foreign_to_managed.read().len())
            .field("packages", &self.packages.read().len())
            .finish_non_exhaustive()
    }
}

impl HierarchyTypeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `foreign_name` to `ty`. The first registration of a name wins;
    /// later ones are logged and ignored. Returns `true` if the mapping was added.
    pub fn register_type(&self, foreign_name: &str, ty: &'static ManagedType) -> bool {
        let name: Arc<str> = Arc::from(foreign_name);
        {
            let mut forward = self.foreign_to_managed.write();
            if let Some(existing) = forward.get(foreign_name) {
                if *existing != ty {
                    tracing::warn!(
                        foreign_name,
                        kept = existing.name(),
                        ignored = ty.name(),
                        "type registration skipped: name already registered"
                    );
                }
                return false;
            }
            forward.insert(Arc::clone(&name), ty);
        }
        {
            let mut reverse = self.managed_to_foreign.write();
            let name = Arc::clone(reverse.entry(ty.name()).or_insert(name));
            if let Some(invoker) = self.invokers.read().get(ty.name()) {
                reverse.entry(invoker.name()).or_insert(name);
            }
        }
        self.register_known_type(ty);
        true
    }

    /// Records `invoker` as the invoker of `ty`, whatever its name. The
    /// invoker reverse-resolves to the foreign name of `ty`. The first
    /// invoker recorded for a type wins.
    pub fn register_invoker(&self, ty: &'static ManagedType, invoker: &'static ManagedType) {
        self.invokers.write().entry(ty.name()).or_insert(invoker);
        self.register_known_type(invoker);
        let mut reverse = self.managed_to_foreign.write();
        if let Some(name) = reverse.get(ty.name()).cloned() {
            reverse.entry(invoker.name()).or_insert(name);
        }
    }

    /// Makes `ty` discoverable by name without giving it a foreign name.
    /// Used for invokers.
    pub fn register_known_type(&self, ty: &'static ManagedType) {
        self.known.write().entry(ty.name()).or_insert(ty);
    }

    /// Adds a lookup for classes in `package` (such as `com/example`).
    /// Lookups for one package are consulted in registration order.
    pub fn register_package(&self, package: &str, lookup: PackageLookup) {
        self.packages
            .write()
            .entry(package.to_owned())
            .or_default()
            .push(lookup);
    }

    fn resolve_from_packages(&self, foreign_name: &str) -> Option<&'static ManagedType> {
        let lookups: Vec<PackageLookup> = self
            .packages
            .read()
            .get(package_of(foreign_name))
            .cloned()
            .unwrap_or_default();
        // Lookups run without the lock; they may register types themselves.
        lookups.iter().find_map(|lookup| lookup(foreign_name))
    }
}

impl TypeMap for HierarchyTypeMap {
    fn try_resolve_managed_type(&self, foreign_name: &str) -> Option<&'static ManagedType> {
        if let Some(ty) = self.foreign_to_managed.read().get(foreign_name).copied() {
            return Some(ty);
        }
        let ty = self.resolve_from_packages(foreign_name)?;
        self.register_type(foreign_name, ty);
        Some(ty)
    }

    fn try_resolve_foreign_name(&self, ty: &ManagedType) -> Option<Arc<str>> {
        let reverse = self.managed_to_foreign.read();
        if let Some(name) = reverse.get(ty.name()) {
            return Some(Arc::clone(name));
        }
        // An invoker has no name of its own; it inherits the name of the
        // interface or abstract base it implements.
        // Interfaces are pushed last so they are tried before the base.
        let mut pending: Vec<&ManagedType> = ty.base().into_iter().collect();
        pending.extend(ty.interfaces().iter().copied());
        while let Some(next) = pending.pop() {
            if let Some(name) = reverse.get(next.name()) {
                return Some(Arc::clone(name));
            }
            pending.extend(next.base());
            pending.extend(next.interfaces().iter().copied());
        }
        None
    }

    fn try_resolve_invoker_type(&self, ty: &ManagedType) -> Option<&'static ManagedType> {
        if let Some(invoker) = self.invokers.read().get(ty.name()).copied() {
            return Some(invoker);
        }
        self.known.read().get(invoker_name(ty).as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static OBJECT: ManagedType = ManagedType::class("Java.Lang.Object");
    static RUNNABLE: ManagedType = ManagedType::interface("Java.Lang.IRunnable");
    static RUNNABLE_INVOKER_INTERFACES: [&ManagedType; 1] = [&RUNNABLE];
    static RUNNABLE_INVOKER: ManagedType = ManagedType::class("Java.Lang.IRunnableInvoker")
        .extends(&OBJECT)
        .implements(&RUNNABLE_INVOKER_INTERFACES);
    static BUTTON: ManagedType = ManagedType::class("Android.Widget.Button").extends(&OBJECT);

    #[test]
    fn test_invoker_by_naming_convention() {
        let map = HierarchyTypeMap::new();
        map.register_type("java/lang/Runnable", &RUNNABLE);
        assert!(map.try_resolve_invoker_type(&RUNNABLE).is_none());
        map.register_known_type(&RUNNABLE_INVOKER);
        assert_eq!(map.try_resolve_invoker_type(&RUNNABLE), Some(&RUNNABLE_INVOKER));
    }

    #[test]
    fn test_explicit_invoker_ignores_naming_convention() {
        static CALLBACK: ManagedType = ManagedType::class("Java.Lang.RunnableImpl").extends(&OBJECT);

        let map = HierarchyTypeMap::new();
        map.register_invoker(&RUNNABLE, &CALLBACK);
        map.register_known_type(&RUNNABLE_INVOKER);
        map.register_type("java/lang/Runnable", &RUNNABLE);
        map.register_type("java/lang/Object", &OBJECT);

        assert_eq!(map.try_resolve_invoker_type(&RUNNABLE), Some(&CALLBACK));
        assert_eq!(
            map.try_resolve_foreign_name(&CALLBACK).as_deref(),
            Some("java/lang/Runnable")
        );
    }

    #[test]
    fn test_reverse_lookup_prefers_interface_over_base() {
        let map = HierarchyTypeMap::new();
        map.register_type("java/lang/Object", &OBJECT);
        map.register_type("java/lang/Runnable", &RUNNABLE);
        assert_eq!(
            map.try_resolve_foreign_name(&RUNNABLE_INVOKER).as_deref(),
            Some("java/lang/Runnable")
        );
    }

    #[test]
    fn test_package_lookup_result_is_cached() {
        let map = HierarchyTypeMap::new();
        map.register_package(
            "android/widget",
            Arc::new(|name: &str| (name == "android/widget/Button").then_some(&BUTTON)),
        );
        assert_eq!(map.try_resolve_managed_type("android/widget/Button"), Some(&BUTTON));
        assert!(map.try_resolve_managed_type("android/widget/Spinner").is_none());
        assert_eq!(
            map.try_resolve_foreign_name(&BUTTON).as_deref(),
            Some("android/widget/Button")
        );
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let map = HierarchyTypeMap::new();
        assert!(map.register_type("java/lang/Object", &OBJECT));
        assert!(!map.register_type("java/lang/Object", &BUTTON));
        assert_eq!(map.try_resolve_managed_type("java/lang/Object"), Some(&OBJECT));
    }
}
