//! Precomputed name tables.

use std::collections::HashMap;
use std::sync::Arc;

use super::{PeerTypeRegistration, TypeMap};
use crate::types::ManagedType;

/// One row of the foreign-name table.
#[derive(Debug, Clone, Copy)]
pub struct TypeMapEntry {
    pub foreign_name: &'static str,
    pub ty: &'static ManagedType,
}

/// One row of the invoker table.
#[derive(Debug, Clone, Copy)]
pub struct InvokerEntry {
    pub ty: &'static ManagedType,
    pub invoker: &'static ManagedType,
}

/// Type map backed by tables fixed at construction.
///
/// Lookups are exact in both directions. Invokers have their own table and
/// reverse-resolve to the foreign name of the type they stand in for.
#[derive(Debug, Default)]
pub struct ExactTable {
    foreign_to_managed: HashMap<&'static str, &'static ManagedType>,
    managed_to_foreign: HashMap<&'static str, Arc<str>>,
    invokers: HashMap<&'static str, &'static ManagedType>,
}

impl ExactTable {
    /// Builds the table from entry and invoker rows.
    ///
    /// When a foreign name appears twice the first row wins.
    #[must_use]
    pub fn new(entries: &[TypeMapEntry], invokers: &[InvokerEntry]) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table.insert(entry.foreign_name, entry.ty);
        }
        for row in invokers {
            table.insert_invoker(row.ty, row.invoker);
        }
        table
    }

    /// Materializes a table from registrations.
    #[must_use]
    pub fn from_registrations<I>(registrations: I) -> Self
    where
        I: IntoIterator<Item = &'static PeerTypeRegistration>,
    {
        let mut table = Self::default();
        for reg in registrations {
            table.insert(reg.foreign_name(), reg.managed_type());
            if let Some(invoker) = reg.invoker() {
                table.insert_invoker(reg.managed_type(), invoker);
            }
        }
        table
    }

    fn insert(&mut self, foreign_name: &'static str, ty: &'static ManagedType) {
        if self.foreign_to_managed.contains_key(foreign_name) {
            return;
        }
        self.foreign_to_managed.insert(foreign_name, ty);
        self.managed_to_foreign
            .entry(ty.name())
            .or_insert_with(|| Arc::from(foreign_name));
    }

    fn insert_invoker(&mut self, ty: &'static ManagedType, invoker: &'static ManagedType) {
        self.invokers.entry(ty.name()).or_insert(invoker);
        if let Some(name) = self.managed_to_foreign.get(ty.name()).cloned() {
            self.managed_to_foreign.entry(invoker.name()).or_insert(name);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.foreign_to_managed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.foreign_to_managed.is_empty()
    }
}

impl TypeMap for ExactTable {
    fn try_resolve_managed_type(&self, foreign_name: &str) -> Option<&'static ManagedType> {
        self.foreign_to_managed.get(foreign_name).copied()
    }

    fn try_resolve_foreign_name(&self, ty: &ManagedType) -> Option<Arc<str>> {
        self.managed_to_foreign.get(ty.name()).cloned()
    }

    fn try_resolve_invoker_type(&self, ty: &ManagedType) -> Option<&'static ManagedType> {
        self.invokers.get(ty.name()).copied()
    }
}
