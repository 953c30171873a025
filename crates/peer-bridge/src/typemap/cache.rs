//! Lock-free cache of hierarchy-walk results.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::ManagedType;

type Snapshot = HashMap<Arc<str>, &'static ManagedType>;

/// Maps an exact foreign class name to the managed type its hierarchy walk
/// resolved to.
///
/// Readers load a snapshot without locking. Writers publish a new snapshot
/// with a compare-and-swap loop; concurrent inserts for the same name resolve
/// to the same type, so losing a race is harmless.
pub struct ResolutionCache {
    snap: ArcSwap<Snapshot>,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            snap: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    #[must_use]
    pub fn get(&self, class_name: &str) -> Option<&'static ManagedType> {
        self.snap.load().get(class_name).copied()
    }

    pub fn insert(&self, class_name: &str, ty: &'static ManagedType) {
        let key: Arc<str> = Arc::from(class_name);
        loop {
            let cur = self.snap.load_full();
            if cur.contains_key(class_name) {
                return;
            }
            let mut next = (*cur).clone();
            next.insert(Arc::clone(&key), ty);
            let prev = self.snap.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&*prev, &cur) {
                return;
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snap.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snap.load().is_empty()
    }

    pub fn clear(&self) {
        self.snap.store(Arc::new(HashMap::new()));
    }
}
