// Observable state container with shallow-merge updates

use crate::errors::{json_type_name, StoreError};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use tracing::error;

type Listener = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

struct StoreInner {
    /// Always a JSON object; enforced by the constructor and every merge.
    state: Value,
    /// Listeners in subscription order. Ids are never reused, so detaching
    /// one subscription can never remove another.
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

/// Single-document state store with synchronous change notification.
///
/// Updates are shallow merges: each top-level key of the patch overwrites the
/// corresponding key of the current state (last write wins), untouched keys
/// survive. Listeners observe `(new_state, prev_state)` after every merge, in
/// subscription order.
pub struct StateStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl StateStore {
    /// Create a store around an initial JSON object.
    pub fn new(initial: Value) -> Result<Self, StoreError> {
        if !initial.is_object() {
            return Err(StoreError::InvalidInitialState {
                found: json_type_name(&initial),
            });
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner {
                state: initial,
                listeners: Vec::new(),
                next_listener_id: 1,
            })),
        })
    }

    /// Snapshot of the current state.
    pub fn get_state(&self) -> Value {
        self.lock().state.clone()
    }

    /// Merge a patch object over the current state and notify listeners.
    ///
    /// Rejects non-object patches before any mutation or notification.
    pub fn set_state(&self, patch: Value) -> Result<(), StoreError> {
        self.apply_patch(patch)
    }

    /// Updater-function form of [`set_state`](Self::set_state): the closure
    /// receives the previous state and returns the patch to merge.
    pub fn set_state_with<F>(&self, updater: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Value) -> Value,
    {
        let prev = self.get_state();
        self.apply_patch(updater(&prev))
    }

    /// Register a change listener; returns the capability to detach it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn apply_patch(&self, patch: Value) -> Result<(), StoreError> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidPatch {
                found: json_type_name(&patch),
            });
        };

        let (new_state, prev_state, listeners) = {
            let mut inner = self.lock();
            let prev = inner.state.clone();
            let map = inner
                .state
                .as_object_mut()
                .expect("store state is always an object");
            for (key, value) in patch {
                map.insert(key, value);
            }
            let listeners: Vec<Listener> = inner
                .listeners
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect();
            (inner.state.clone(), prev, listeners)
        };

        // Invoked outside the lock so a listener may read or update the store.
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(&new_state, &prev_state)));
            if outcome.is_err() {
                error!("state listener panicked; remaining listeners still notified");
            }
        }

        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("store lock poisoned")
    }
}

/// Detach capability returned by [`StateStore::subscribe`].
///
/// Dropping a `Subscription` does NOT detach the listener; only an explicit
/// [`detach`](Self::detach) call removes it.
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<StoreInner>>,
}

impl Subscription {
    /// Remove the listener from the store. A no-op if the store is gone.
    pub fn detach(self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().expect("store lock poisoned");
            inner.listeners.retain(|(id, _)| *id != self.id);
        }
    }

    /// Whether the listener is still registered on a live store.
    pub fn is_attached(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner
                .lock()
                .expect("store lock poisoned")
                .listeners
                .iter()
                .any(|(id, _)| *id == self.id),
            None => false,
        }
    }
}
