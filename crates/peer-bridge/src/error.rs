//! Error type shared by every bridge operation.

use thiserror::Error;

use crate::exceptions::ForeignException;
use crate::handle::Handle;

/// Errors produced by the bridge.
///
/// Activation failures are fatal for the object being surfaced but not for the
/// process. [`BridgeError::is_fatal`] tells the caller which ones indicate a
/// broken install rather than a bad object.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No managed type is registered for the object's class or any ancestor.
    #[error("Internal error finding wrapper class for '{class_name}'. (Where is the Java.Lang.Object wrapper?!)")]
    MissingMapping {
        /// Foreign class name of the object being surfaced.
        class_name: String,
    },

    /// The resolved type is abstract or an interface and has no concrete stand-in.
    #[error("Unable to find Invoker for type '{type_name}'. Was it linked away?")]
    MissingInvoker { type_name: &'static str },

    /// The concrete type exposes neither activation initializer.
    #[error("Unable to activate instance of type {type_name} from native handle {handle} (key_handle {identity})")]
    MissingInitializer {
        type_name: &'static str,
        handle: Handle,
        identity: crate::IdentityHash,
    },

    /// The resolved type is a generic definition that cannot be instantiated.
    #[error("Cannot create an instance of '{type_name}': it is an open generic type")]
    OpenGenericType { type_name: &'static str },

    /// The type map knows no foreign name for the managed type.
    #[error("Could not determine foreign type for managed type '{type_name}'")]
    UnknownForeignName { type_name: &'static str },

    /// The foreign runtime could not find the class named by the type map.
    #[error("Foreign class '{class_name}' was not found")]
    ForeignClassNotFound { class_name: String },

    /// An operation received a null or released reference.
    #[error("Invalid foreign reference: {reason}")]
    InvalidReference { reason: &'static str },

    /// The foreign runtime returned null while creating a reference.
    #[error("Foreign runtime failed to allocate a {kind} reference for {handle}")]
    AllocationFailed { kind: &'static str, handle: Handle },

    /// A user initializer failed while constructing a peer.
    #[error("Activation of '{type_name}' from native handle {handle} failed")]
    ActivationFailed {
        type_name: &'static str,
        handle: Handle,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A configuration value could not be parsed.
    #[error("Invalid value '{value}' for {key}")]
    InvalidConfig { key: &'static str, value: String },

    /// The process-wide bridge has already been installed.
    #[error("A bridge is already installed for this process")]
    AlreadyInstalled,

    /// A process-wide entry point was used before a bridge was installed.
    #[error("No bridge is installed for this process")]
    NotInstalled,

    /// Managed code panicked while servicing a call from the foreign side.
    #[error("Managed code panicked: {message}")]
    ManagedPanic { message: String },

    /// A foreign exception crossed into managed code.
    #[error(transparent)]
    ForeignException(#[from] ForeignException),
}

impl BridgeError {
    /// Returns `true` for errors that indicate a broken install rather than a
    /// problem with one object.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingMapping { .. }
                | Self::MissingInvoker { .. }
                | Self::UnknownForeignName { .. }
                | Self::ForeignClassNotFound { .. }
                | Self::AlreadyInstalled
                | Self::NotInstalled
        )
    }

    /// Wraps an initializer failure.
    pub fn activation_failed<E>(type_name: &'static str, handle: Handle, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self::ActivationFailed {
            type_name,
            handle,
            source: source.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
