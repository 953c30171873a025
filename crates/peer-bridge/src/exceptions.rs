//! Exception translation across the boundary.
//!
//! A managed failure raised while servicing a foreign call travels to the
//! foreign side as a proxy throwable. The bridge remembers which failure each
//! proxy carries, so when the same throwable comes back it unwraps to the
//! original error instead of a generic foreign exception.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BridgeError;
use crate::handle::{Handle, IdentityHash, ObjectRef};
use crate::references::ReferenceManager;

/// A foreign throwable that crossed into managed code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("foreign exception {class_name} (identity {identity_hash})")]
pub struct ForeignException {
    pub class_name: String,
    pub identity_hash: IdentityHash,
}

/// What a proxy throwable carries.
#[derive(Debug)]
pub enum ManagedFailure {
    Error(BridgeError),
    /// A panic payload rendered to text.
    Panic(String),
}

impl ManagedFailure {
    /// Renders a `catch_unwind` payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::Panic(message)
    }

    #[must_use]
    pub fn into_error(self) -> BridgeError {
        match self {
            Self::Error(err) => err,
            Self::Panic(message) => BridgeError::ManagedPanic { message },
        }
    }
}

impl fmt::Display for ManagedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => write!(f, "{err}"),
            Self::Panic(message) => write!(f, "panic: {message}"),
        }
    }
}

struct Carried {
    throwable: ObjectRef,
    failure: ManagedFailure,
}

/// Wraps managed failures into proxy throwables and unwraps them again.
pub struct ExceptionTranslator {
    references: Arc<ReferenceManager>,
    proxies: Mutex<HashMap<IdentityHash, Vec<Carried>>>,
}

impl fmt::Debug for ExceptionTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionTranslator")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl ExceptionTranslator {
    #[must_use]
    pub fn new(references: Arc<ReferenceManager>) -> Self {
        Self {
            references,
            proxies: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a proxy throwable for `failure`, remembers the pairing and
    /// raises it on the foreign side.
    pub fn raise(&self, failure: ManagedFailure) {
        let runtime = self.references.runtime();
        let message = failure.to_string();
        let transient = self
            .references
            .scoped(self.references.created_transient(runtime.new_proxy_throwable(&message)));
        if !transient.get().is_valid() {
            tracing::error!(message = message.as_str(), "foreign runtime could not create a proxy throwable");
            return;
        }
        let throwable = self.references.new_durable(transient.handle());
        if !throwable.is_valid() {
            tracing::error!(message = message.as_str(), "could not retain proxy throwable");
            runtime.throw(transient.handle());
            return;
        }
        let hash = runtime.identity_hash(throwable.handle());
        self.proxies
            .lock()
            .entry(hash)
            .or_default()
            .push(Carried { throwable, failure });
        tracing::debug!(identity = %hash, message = message.as_str(), "raising managed failure as proxy throwable");
        runtime.throw(throwable.handle());
    }

    /// Converts a foreign throwable into a managed error.
    ///
    /// A proxy created by [`raise`](Self::raise) yields the failure it carries;
    /// any other throwable yields [`BridgeError::ForeignException`].
    pub fn translate(&self, throwable: Handle) -> BridgeError {
        let runtime = self.references.runtime();
        let hash = runtime.identity_hash(throwable);
        let carried = {
            let mut proxies = self.proxies.lock();
            let carried = proxies.get_mut(&hash).and_then(|bucket| {
                let idx = bucket
                    .iter()
                    .position(|c| runtime.is_same_object(c.throwable.handle(), throwable))?;
                Some(bucket.swap_remove(idx))
            });
            if proxies.get(&hash).is_some_and(Vec::is_empty) {
                proxies.remove(&hash);
            }
            carried
        };
        if let Some(carried) = carried {
            self.references.release(carried.throwable);
            return carried.failure.into_error();
        }
        let class = self
            .references
            .scoped(self.references.created_transient(runtime.object_class(throwable)));
        ForeignException {
            class_name: runtime.class_name(class.handle()),
            identity_hash: hash,
        }
        .into()
    }

    /// Proxy throwables raised and not yet translated back.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.proxies.lock().values().map(Vec::len).sum()
    }
}

impl Drop for ExceptionTranslator {
    fn drop(&mut self) {
        for carried in self.proxies.get_mut().drain().flat_map(|(_, bucket)| bucket) {
            self.references.release(carried.throwable);
        }
    }
}
