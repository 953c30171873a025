//! Seams to the two runtimes the bridge sits between.

use crate::handle::{Handle, IdentityHash};

/// Primitive operations of the foreign runtime.
///
/// Every method that returns a [`Handle`] returns a new transient reference
/// unless its name says otherwise; the caller owns it and must release it.
/// A null return means "no object" (a dead weak reference, an unknown class or
/// the root of a class hierarchy).
pub trait ForeignRuntime: Send + Sync + 'static {
    /// Creates a transient reference to the object named by `handle`.
    /// Returns null if `handle` is a weak-durable whose object was collected.
    fn new_transient(&self, handle: Handle) -> Handle;
    fn delete_transient(&self, handle: Handle);

    /// Creates a durable reference. Returns null on failure or dead weak input.
    fn new_durable(&self, handle: Handle) -> Handle;
    fn delete_durable(&self, handle: Handle);

    fn new_weak_durable(&self, handle: Handle) -> Handle;
    fn delete_weak_durable(&self, handle: Handle);

    /// Number of live durable references, as counted by the foreign runtime.
    fn durable_count(&self) -> usize;

    /// Number of live weak-durable references.
    fn weak_durable_count(&self) -> usize;

    fn identity_hash(&self, handle: Handle) -> IdentityHash;

    /// Whether two handles name the same object. Two null handles are the same.
    fn is_same_object(&self, a: Handle, b: Handle) -> bool;

    /// Whether the object was created by the managed side and carries a peer
    /// that must survive handle replacement.
    fn is_gc_user_peer(&self, handle: Handle) -> bool;

    /// Class of the object, as a transient class handle.
    fn object_class(&self, handle: Handle) -> Handle;

    /// Superclass of `class` as a transient handle, or null at the root.
    fn superclass(&self, class: Handle) -> Handle;

    /// Fully-qualified foreign name of `class`, such as `java/lang/Object`.
    fn class_name(&self, class: Handle) -> String;

    /// Looks a class up by foreign name. Returns null if unknown.
    fn find_class(&self, name: &str) -> Handle;

    /// Whether instances of `class` can be assigned to `target`.
    fn is_assignable_from(&self, class: Handle, target: Handle) -> bool;

    /// Creates a foreign throwable carrying `message`, used to transport a
    /// managed failure across the boundary. Returns a transient handle.
    fn new_proxy_throwable(&self, message: &str) -> Handle;

    /// Raises `throwable` as the pending foreign exception.
    fn throw(&self, throwable: Handle);
}

/// Requests a managed collection.
///
/// Called when the outstanding durable count reaches the threshold. The
/// collection may run synchronously inside `collect` or be scheduled.
pub trait ManagedCollector: Send + Sync {
    fn collect(&self);
}

impl<F> ManagedCollector for F
where
    F: Fn() + Send + Sync,
{
    fn collect(&self) {
        self();
    }
}

/// Collector used when the host does not supply one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCollector;

impl ManagedCollector for NoopCollector {
    fn collect(&self) {
        tracing::debug!("managed collection requested but no collector is installed");
    }
}
