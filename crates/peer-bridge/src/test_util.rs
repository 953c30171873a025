//! In-memory foreign runtime and peer helpers for tests.
//!
//! [`FakeRuntime`] models a foreign object system with a class hierarchy,
//! identity hashes and separate transient, durable and weak-durable handle
//! tables. Handle values are never reused, and releasing an unknown handle
//! panics, so double releases and use-after-release show up immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::handle::{Handle, IdentityHash, Ownership, RefKind};
use crate::peer::{Peer, PeerCore};
use crate::references::ReferenceManager;
use crate::runtime::{ForeignRuntime, ManagedCollector};
use crate::types::{HandleActivation, ManagedType, ReferenceActivation};

/// Root class every fake class descends from.
pub const OBJECT_CLASS: &str = "java/lang/Object";
/// Class of class objects.
pub const CLASS_CLASS: &str = "java/lang/Class";
pub const THROWABLE_CLASS: &str = "java/lang/Throwable";
/// Class of the throwables created by `new_proxy_throwable`.
pub const PROXY_THROWABLE_CLASS: &str = "peer/bridge/ProxyThrowable";

type ObjectId = usize;

#[derive(Debug)]
struct FakeClass {
    superclass: Option<String>,
    interfaces: Vec<String>,
    object: ObjectId,
}

#[derive(Debug)]
struct FakeObject {
    class: String,
    identity_hash: i32,
    gc_user_peer: bool,
    alive: bool,
    /// Set for class objects.
    names_class: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    objects: Vec<FakeObject>,
    classes: HashMap<String, FakeClass>,
    handles: HashMap<Handle, (ObjectId, RefKind)>,
    next_handle: usize,
    next_hash: i32,
    created: [usize; 4],
    released: [usize; 4],
    pending_exception: Option<ObjectId>,
}

const fn slot(kind: RefKind) -> usize {
    kind as usize
}

impl State {
    fn alloc_object(&mut self, class: &str, identity_hash: Option<i32>) -> ObjectId {
        let identity_hash = identity_hash.unwrap_or_else(|| {
            self.next_hash += 1;
            self.next_hash
        });
        self.objects.push(FakeObject {
            class: class.to_owned(),
            identity_hash,
            gc_user_peer: false,
            alive: true,
            names_class: None,
            message: None,
        });
        self.objects.len() - 1
    }

    fn alloc_handle(&mut self, object: ObjectId, kind: RefKind) -> Handle {
        self.next_handle += 1;
        let handle = Handle::from_raw(self.next_handle * 8);
        self.handles.insert(handle, (object, kind));
        self.created[slot(kind)] += 1;
        handle
    }

    fn entry(&self, handle: Handle) -> (ObjectId, RefKind) {
        match self.handles.get(&handle) {
            Some(&entry) => entry,
            None => panic!("use of unknown or released handle {handle}"),
        }
    }

    /// Object named by `handle`, or `None` for null and dead weak handles.
    fn resolve(&self, handle: Handle) -> Option<ObjectId> {
        if handle.is_null() {
            return None;
        }
        let (object, _) = self.entry(handle);
        self.objects[object].alive.then_some(object)
    }

    fn object(&self, handle: Handle) -> &FakeObject {
        match self.resolve(handle) {
            Some(object) => &self.objects[object],
            None => panic!("handle {handle} does not name a live object"),
        }
    }

    fn new_ref(&mut self, handle: Handle, kind: RefKind) -> Handle {
        match self.resolve(handle) {
            Some(object) => self.alloc_handle(object, kind),
            None => Handle::NULL,
        }
    }

    fn delete_ref(&mut self, handle: Handle, kind: RefKind) {
        match self.handles.remove(&handle) {
            Some((_, actual)) if actual == kind => self.released[slot(kind)] += 1,
            Some((_, actual)) => panic!("released {handle} as {kind:?} but it is {actual:?}"),
            None => panic!("double release of {handle} ({kind:?})"),
        }
    }

    fn class_handle(&mut self, name: &str) -> Handle {
        match self.classes.get(name) {
            Some(class) => {
                let object = class.object;
                self.alloc_handle(object, RefKind::Transient)
            }
            None => Handle::NULL,
        }
    }

    fn class_name_of(&self, class: Handle) -> String {
        match &self.object(class).names_class {
            Some(name) => name.clone(),
            None => panic!("handle {class} is not a class object"),
        }
    }

    fn is_subclass(&self, class: &str, target: &str) -> bool {
        if class == target {
            return true;
        }
        let Some(def) = self.classes.get(class) else {
            return false;
        };
        def.interfaces.iter().any(|i| self.is_subclass(i, target))
            || def
                .superclass
                .as_deref()
                .is_some_and(|sup| self.is_subclass(sup, target))
    }

    fn define(&mut self, name: &str, superclass: Option<&str>) {
        assert!(
            !self.classes.contains_key(name),
            "class {name} defined twice"
        );
        if let Some(sup) = superclass {
            assert!(self.classes.contains_key(sup), "unknown superclass {sup}");
        }
        let object = self.alloc_object(CLASS_CLASS, None);
        self.objects[object].names_class = Some(name.to_owned());
        self.classes.insert(
            name.to_owned(),
            FakeClass {
                superclass: superclass.map(str::to_owned),
                interfaces: Vec::new(),
                object,
            },
        );
    }
}

/// In-memory [`ForeignRuntime`].
#[derive(Debug)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    /// A runtime with `java/lang/Object`, `java/lang/Class`,
    /// `java/lang/Throwable` and the proxy throwable class defined.
    #[must_use]
    pub fn new() -> Self {
        let mut state = State::default();
        state.define(OBJECT_CLASS, None);
        state.define(CLASS_CLASS, Some(OBJECT_CLASS));
        state.define(THROWABLE_CLASS, Some(OBJECT_CLASS));
        state.define(PROXY_THROWABLE_CLASS, Some(THROWABLE_CLASS));
        Self {
            state: Mutex::new(state),
        }
    }

    /// Defines `name` as a subclass of `superclass`.
    ///
    /// # Panics
    ///
    /// Panics if `name` exists or `superclass` does not.
    pub fn define_class(&self, name: &str, superclass: &str) {
        self.state.lock().define(name, Some(superclass));
    }

    /// Defines an interface. Interfaces have no superclass.
    pub fn define_interface(&self, name: &str) {
        self.state.lock().define(name, None);
    }

    /// Declares that `class` implements `interface`.
    ///
    /// # Panics
    ///
    /// Panics if either is unknown.
    pub fn implement(&self, class: &str, interface: &str) {
        let mut state = self.state.lock();
        assert!(state.classes.contains_key(interface), "unknown interface {interface}");
        match state.classes.get_mut(class) {
            Some(def) => def.interfaces.push(interface.to_owned()),
            None => panic!("unknown class {class}"),
        }
    }

    /// Allocates an instance of `class` and returns a transient handle to it.
    pub fn new_object(&self, class: &str) -> Handle {
        self.new_object_with_hash(class, None)
    }

    /// Allocates an instance with a chosen identity hash, for collision tests.
    ///
    /// # Panics
    ///
    /// Panics if `class` is unknown.
    pub fn new_object_with_hash(&self, class: &str, identity_hash: Option<i32>) -> Handle {
        let mut state = self.state.lock();
        assert!(state.classes.contains_key(class), "unknown class {class}");
        let object = state.alloc_object(class, identity_hash);
        state.alloc_handle(object, RefKind::Transient)
    }

    /// Flags the object as a GC user peer.
    pub fn mark_gc_user_peer(&self, handle: Handle) {
        let mut state = self.state.lock();
        let (object, _) = state.entry(handle);
        state.objects[object].gc_user_peer = true;
    }

    /// Collects every instance not named by a transient or durable handle.
    /// Weak-durable handles to collected objects read as dead afterwards.
    /// Returns the number of objects collected.
    pub fn collect_foreign(&self) -> usize {
        let mut state = self.state.lock();
        let mut rooted = vec![false; state.objects.len()];
        for &(object, kind) in state.handles.values() {
            if matches!(kind, RefKind::Transient | RefKind::Durable) {
                rooted[object] = true;
            }
        }
        let mut collected = 0;
        for (object, obj) in state.objects.iter_mut().enumerate() {
            if obj.alive && obj.names_class.is_none() && !rooted[object] {
                obj.alive = false;
                collected += 1;
            }
        }
        collected
    }

    /// Whether `handle` names a live object.
    #[must_use]
    pub fn is_alive(&self, handle: Handle) -> bool {
        self.state.lock().resolve(handle).is_some()
    }

    /// Class name of the object `handle` names.
    #[must_use]
    pub fn class_of(&self, handle: Handle) -> String {
        self.state.lock().object(handle).class.clone()
    }

    /// Message of a proxy throwable.
    #[must_use]
    pub fn message_of(&self, handle: Handle) -> Option<String> {
        self.state.lock().object(handle).message.clone()
    }

    /// References of `kind` created and not released.
    #[must_use]
    pub fn outstanding(&self, kind: RefKind) -> usize {
        let state = self.state.lock();
        state.created[slot(kind)] - state.released[slot(kind)]
    }

    /// References of `kind` ever created.
    #[must_use]
    pub fn created(&self, kind: RefKind) -> usize {
        self.state.lock().created[slot(kind)]
    }

    /// References of `kind` ever released.
    #[must_use]
    pub fn released(&self, kind: RefKind) -> usize {
        self.state.lock().released[slot(kind)]
    }

    /// Asserts that every reference ever created has been released.
    ///
    /// # Panics
    ///
    /// Panics listing the outstanding counts otherwise.
    pub fn assert_balanced(&self) {
        let state = self.state.lock();
        let outstanding: Vec<(RefKind, usize)> = [RefKind::Transient, RefKind::Durable, RefKind::WeakDurable]
            .into_iter()
            .map(|kind| (kind, state.created[slot(kind)] - state.released[slot(kind)]))
            .filter(|&(_, n)| n > 0)
            .collect();
        assert!(outstanding.is_empty(), "unreleased references: {outstanding:?}");
    }

    /// Takes the pending exception as a new transient handle.
    pub fn take_pending_exception(&self) -> Option<Handle> {
        let mut state = self.state.lock();
        let object = state.pending_exception.take()?;
        Some(state.alloc_handle(object, RefKind::Transient))
    }
}

impl ForeignRuntime for FakeRuntime {
    fn new_transient(&self, handle: Handle) -> Handle {
        self.state.lock().new_ref(handle, RefKind::Transient)
    }

    fn delete_transient(&self, handle: Handle) {
        self.state.lock().delete_ref(handle, RefKind::Transient);
    }

    fn new_durable(&self, handle: Handle) -> Handle {
        self.state.lock().new_ref(handle, RefKind::Durable)
    }

    fn delete_durable(&self, handle: Handle) {
        self.state.lock().delete_ref(handle, RefKind::Durable);
    }

    fn new_weak_durable(&self, handle: Handle) -> Handle {
        self.state.lock().new_ref(handle, RefKind::WeakDurable)
    }

    fn delete_weak_durable(&self, handle: Handle) {
        self.state.lock().delete_ref(handle, RefKind::WeakDurable);
    }

    fn durable_count(&self) -> usize {
        self.outstanding(RefKind::Durable)
    }

    fn weak_durable_count(&self) -> usize {
        self.outstanding(RefKind::WeakDurable)
    }

    fn identity_hash(&self, handle: Handle) -> IdentityHash {
        let state = self.state.lock();
        if handle.is_null() {
            return IdentityHash(0);
        }
        let (object, _) = state.entry(handle);
        IdentityHash(state.objects[object].identity_hash)
    }

    fn is_same_object(&self, a: Handle, b: Handle) -> bool {
        let state = self.state.lock();
        state.resolve(a) == state.resolve(b)
    }

    fn is_gc_user_peer(&self, handle: Handle) -> bool {
        self.state.lock().object(handle).gc_user_peer
    }

    fn object_class(&self, handle: Handle) -> Handle {
        let mut state = self.state.lock();
        let class = state.object(handle).class.clone();
        state.class_handle(&class)
    }

    fn superclass(&self, class: Handle) -> Handle {
        let mut state = self.state.lock();
        let name = state.class_name_of(class);
        let superclass = state
            .classes
            .get(&name)
            .and_then(|def| def.superclass.clone());
        match superclass {
            Some(sup) => state.class_handle(&sup),
            None => Handle::NULL,
        }
    }

    fn class_name(&self, class: Handle) -> String {
        self.state.lock().class_name_of(class)
    }

    fn find_class(&self, name: &str) -> Handle {
        self.state.lock().class_handle(name)
    }

    fn is_assignable_from(&self, class: Handle, target: Handle) -> bool {
        let state = self.state.lock();
        let class = state.class_name_of(class);
        let target = state.class_name_of(target);
        state.is_subclass(&class, &target)
    }

    fn new_proxy_throwable(&self, message: &str) -> Handle {
        let mut state = self.state.lock();
        let object = state.alloc_object(PROXY_THROWABLE_CLASS, None);
        state.objects[object].message = Some(message.to_owned());
        state.alloc_handle(object, RefKind::Transient)
    }

    fn throw(&self, throwable: Handle) {
        let mut state = self.state.lock();
        let object = state.resolve(throwable);
        state.pending_exception = object;
    }
}

// ============================================================================
// Peers and collectors
// ============================================================================

/// General-purpose peer for tests.
#[derive(Debug)]
pub struct TestPeer {
    core: PeerCore,
    ty: &'static ManagedType,
    finalized: AtomicBool,
}

impl TestPeer {
    /// Builds a peer around `handle` the way managed code constructs one.
    ///
    /// # Errors
    ///
    /// Propagates reference adoption failures.
    pub fn create(
        references: &Arc<ReferenceManager>,
        handle: Handle,
        ownership: Ownership,
        ty: &'static ManagedType,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            core: PeerCore::new(references, handle, ownership)?,
            ty,
            finalized: AtomicBool::new(false),
        }))
    }

    /// Builds a peer that holds `handle` as a transient reference, as a
    /// freshly constructed managed object does before registration.
    #[must_use]
    pub fn with_transient(
        references: &Arc<ReferenceManager>,
        handle: Handle,
        ty: &'static ManagedType,
    ) -> Arc<Self> {
        let reference = references.new_transient(handle);
        Arc::new(Self {
            core: PeerCore::from_reference(references, reference),
            ty,
            finalized: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn was_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }
}

impl Peer for TestPeer {
    fn peer_core(&self) -> &PeerCore {
        &self.core
    }

    fn managed_type(&self) -> &'static ManagedType {
        self.ty
    }

    fn finalized(&self) {
        self.finalized.store(true, Ordering::Release);
    }
}

/// [`HandleInitializer`](crate::HandleInitializer) producing a [`TestPeer`].
///
/// # Errors
///
/// Propagates reference adoption failures.
pub fn activate_from_handle(activation: HandleActivation<'_>) -> Result<Arc<dyn Peer>> {
    let ty = activation.managed_type();
    let core = activation.into_core()?;
    Ok(Arc::new(TestPeer {
        core,
        ty,
        finalized: AtomicBool::new(false),
    }))
}

/// [`ReferenceInitializer`](crate::ReferenceInitializer) producing a [`TestPeer`].
///
/// # Errors
///
/// Propagates reference copy failures.
pub fn activate_from_reference(activation: ReferenceActivation<'_>) -> Result<Arc<dyn Peer>> {
    let ty = activation.managed_type();
    let core = activation.into_core()?;
    Ok(Arc::new(TestPeer {
        core,
        ty,
        finalized: AtomicBool::new(false),
    }))
}

/// Collector that counts requests.
#[derive(Debug, Default)]
pub struct RecordingCollector {
    requests: AtomicUsize,
}

impl RecordingCollector {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }
}

impl ManagedCollector for RecordingCollector {
    fn collect(&self) {
        self.requests.fetch_add(1, Ordering::AcqRel);
    }
}
