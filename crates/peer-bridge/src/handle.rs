//! Foreign handles and the ownership kinds attached to them.
//!
//! A [`Handle`] is an opaque integer naming a foreign object. On its own it says
//! nothing about lifetime; paired with a [`RefKind`] it becomes an
//! [`ObjectRef`], which is what the rest of the bridge passes around.

use std::fmt;

/// Opaque integer naming a foreign-runtime object.
///
/// Handles are not pointers in the managed sense. Their values are not stable
/// across promotion (a transient and the durable created from it have different
/// values), which is why peers are keyed by [`IdentityHash`] instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(usize);

impl Handle {
    /// The null handle. Never names an object.
    pub const NULL: Self = Self(0);

    /// Wraps a raw handle value received from the foreign runtime.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> usize {
        self.0
    }

    /// Returns `true` for [`Handle::NULL`].
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::LowerHex for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Stable per-object integer provided by the foreign runtime.
///
/// Independent of which transient, durable or weak handle currently refers to
/// the object, so it survives promotion. Distinct objects may share a hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct IdentityHash(pub i32);

impl fmt::Debug for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Ownership kind of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RefKind {
    /// No object is referenced.
    #[default]
    Invalid = 0,
    /// Valid only within the current call scope.
    Transient = 1,
    /// Valid until released; keeps the foreign object alive.
    Durable = 2,
    /// Does not keep the foreign object alive; reads as dead once collected.
    WeakDurable = 3,
}

impl RefKind {
    /// Single-letter code used in reference logs (`I`, `L`, `G`, `W`).
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Invalid => 'I',
            Self::Transient => 'L',
            Self::Durable => 'G',
            Self::WeakDurable => 'W',
        }
    }
}

/// A handle paired with its ownership kind.
///
/// `ObjectRef` is `Copy`, like the raw handles it wraps. Copying does not
/// duplicate ownership: every reference obtained from the
/// [`ReferenceManager`](crate::ReferenceManager) must be released exactly once.
/// [`ScopedRef`](crate::ScopedRef) enforces that for code that can use it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectRef {
    handle: Handle,
    kind: RefKind,
}

impl ObjectRef {
    /// Pairs `handle` with `kind`. A null handle always yields an invalid reference.
    #[must_use]
    pub const fn new(handle: Handle, kind: RefKind) -> Self {
        if handle.is_null() {
            Self::invalid()
        } else {
            Self { handle, kind }
        }
    }

    /// The invalid reference.
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            handle: Handle::NULL,
            kind: RefKind::Invalid,
        }
    }

    #[inline]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> RefKind {
        self.kind
    }

    /// Returns `true` if this reference names an object.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !self.handle.is_null() && !matches!(self.kind, RefKind::Invalid)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.handle, self.kind.code())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a caller hands over together with a raw handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transfer {
    /// The caller keeps ownership; the callee must take its own reference.
    #[default]
    DoNotTransfer,
    /// The handle is a transient the callee must release.
    TransferTransient,
    /// The handle is a durable reference the callee adopts as-is.
    TransferDurable,
}

/// Transfer mode plus whether the resulting peer is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ownership {
    transfer: Transfer,
    register: bool,
}

impl Ownership {
    /// Caller keeps the handle; the peer is registered.
    pub const DO_NOT_TRANSFER: Self = Self::new(Transfer::DoNotTransfer);
    /// Callee releases the transient handle; the peer is registered.
    pub const TRANSFER_TRANSIENT: Self = Self::new(Transfer::TransferTransient);
    /// Callee adopts the durable handle; the peer is registered.
    pub const TRANSFER_DURABLE: Self = Self::new(Transfer::TransferDurable);

    #[must_use]
    pub const fn new(transfer: Transfer) -> Self {
        Self {
            transfer,
            register: true,
        }
    }

    /// Same transfer mode, but the resulting peer is not added to the registry.
    #[must_use]
    pub const fn do_not_register(self) -> Self {
        Self {
            transfer: self.transfer,
            register: false,
        }
    }

    #[inline]
    #[must_use]
    pub const fn transfer(self) -> Transfer {
        self.transfer
    }

    #[inline]
    #[must_use]
    pub const fn registers(self) -> bool {
        self.register
    }

    /// Ownership kind the incoming handle carries under this transfer mode.
    ///
    /// `DoNotTransfer` handles are borrowed; they are treated as transient for
    /// lookups since that is the weakest kind that is still readable.
    #[must_use]
    pub const fn incoming_kind(self) -> RefKind {
        match self.transfer {
            Transfer::DoNotTransfer | Transfer::TransferTransient => RefKind::Transient,
            Transfer::TransferDurable => RefKind::Durable,
        }
    }
}

impl Default for Ownership {
    fn default() -> Self {
        Self::DO_NOT_TRANSFER
    }
}

impl From<Transfer> for Ownership {
    fn from(transfer: Transfer) -> Self {
        Self::new(transfer)
    }
}
