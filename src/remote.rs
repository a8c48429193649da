//! Reference-counted handles to server-side state.
//!
//! A [`RemoteObjectRef`] tracks how many client-side holders still depend on
//! one server-side object. When the count reaches zero the object is deleted
//! on the server, best-effort: teardown ordering between the session and
//! in-flight releases is not guaranteed, so "session already gone" is a
//! normal, silent outcome. Count underflow or revival of a dead reference is
//! a programming error and aborts.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::session::Session;

/// Separator marking a *derived* reference id (e.g. `<model>.summary`).
/// Derived ids borrow the base object's lifetime and never trigger an
/// independent server-side delete.
pub const DERIVED_REF_SEPARATOR: char = '.';

/// Reference-counted handle to one server-side object.
pub struct RemoteObjectRef {
    ref_id: String,
    count: Mutex<u64>,
}

impl RemoteObjectRef {
    /// Creates a handle with an initial count of one.
    pub fn new(ref_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            ref_id: ref_id.into(),
            count: Mutex::new(1),
        })
    }

    /// The opaque server-side reference id.
    pub fn ref_id(&self) -> &str {
        &self.ref_id
    }

    /// Current reference count.
    pub fn ref_count(&self) -> u64 {
        *self
            .count
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Adds a strong holder. The count must still be positive; reviving a
    /// reference that already reached zero is an invariant violation.
    pub fn add_ref(&self) {
        let mut count = self
            .count
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        assert!(
            *count > 0,
            "add_ref on released remote object {}",
            self.ref_id
        );
        *count += 1;
    }

    /// Drops a strong holder. On reaching zero, issues the best-effort
    /// server-side delete. The lock covers only the decrement and the
    /// cleanup decision, not the cleanup call itself.
    pub fn release_ref(&self) {
        let reached_zero = {
            let mut count = self
                .count
                .lock()
                .unwrap_or_else(|poison| poison.into_inner());
            assert!(
                *count > 0,
                "release_ref underflow on remote object {}",
                self.ref_id
            );
            *count -= 1;
            *count == 0
        };
        if reached_zero {
            delete_remote_cache(&self.ref_id);
        }
    }
}

impl fmt::Debug for RemoteObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObjectRef")
            .field("ref_id", &self.ref_id)
            .field("count", &self.ref_count())
            .finish()
    }
}

impl fmt::Display for RemoteObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ref_id)
    }
}

/// Best-effort eager delete of a server-side object.
///
/// Swallows every failure: cleanup must never raise during teardown. Derived
/// reference ids are skipped entirely, they do not own server-side lifetime.
pub(crate) fn delete_remote_cache(ref_id: &str) {
    if ref_id.contains(DERIVED_REF_SEPARATOR) {
        return;
    }
    if let Some(session) = Session::active() {
        if let Some(transport) = session.transport() {
            let _ = transport.delete_ml_cache(&[ref_id.to_string()]);
        }
    }
}

/// RAII strong hold on a [`RemoteObjectRef`].
///
/// `adopt` takes over the reference minted at construction; `share` and
/// `clone` register an additional holder; dropping the hold releases it.
pub struct RemoteRefHold {
    obj: Arc<RemoteObjectRef>,
}

impl RemoteRefHold {
    /// Takes ownership of the initial construction reference.
    pub fn adopt(obj: Arc<RemoteObjectRef>) -> Self {
        Self { obj }
    }

    /// Registers a new strong holder of an existing reference.
    pub fn share(obj: &Arc<RemoteObjectRef>) -> Self {
        obj.add_ref();
        Self {
            obj: Arc::clone(obj),
        }
    }

    /// The underlying reference id.
    pub fn ref_id(&self) -> &str {
        self.obj.ref_id()
    }

    /// The shared reference object.
    pub fn object(&self) -> &Arc<RemoteObjectRef> {
        &self.obj
    }
}

impl Clone for RemoteRefHold {
    fn clone(&self) -> Self {
        Self::share(&self.obj)
    }
}

impl Drop for RemoteRefHold {
    fn drop(&mut self) {
        self.obj.release_ref();
    }
}

impl fmt::Debug for RemoteRefHold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteRefHold").field(&self.obj).finish()
    }
}
