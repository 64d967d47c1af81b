//! Change notification.
//!
//! Listeners are called in registration order after every state mutation, but
//! should not rely on that order.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;

use super::state::TheaterState;

pub type Listener = Arc<dyn Fn(&TheaterState) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Ordered set of change listeners, shared between the coordinator and its
/// handles.
#[derive(Clone, Default)]
pub struct Listeners {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Listeners never run under the lock, so a poisoned registry is still consistent.
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

impl Listeners {
    pub fn register<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TheaterState) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Call every listener with `state`.
    ///
    /// Works on a copy of the list, so a listener may register or unregister
    /// others (or itself) without deadlocking.
    pub fn broadcast(&self, state: &TheaterState) {
        let listeners: Vec<Listener> = lock(&self.registry)
            .entries
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            listener(state);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registration of a single listener.
///
/// Dropping it leaves the listener registered; call `unregister` to remove it.
#[must_use = "the listener stays registered until unregister() is called"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the listener. Safe to call after the coordinator is gone.
    pub fn unregister(self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).entries.retain(|(id, _)| *id != self.id);
        }
    }
}
