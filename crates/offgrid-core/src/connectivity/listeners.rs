use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Callback registered for change notifications.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registration handle. Dropping it unsubscribes, so a listener is released
/// on every exit path of the code that registered it.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

struct Registry<T> {
    next_id: u64,
    listeners: HashMap<u64, Listener<T>>,
}

/// Unordered set of listeners keyed by registration. The same callback may be
/// registered more than once; each registration is independent.
pub struct ListenerSet<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: HashMap::new(),
            })),
        }
    }
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    // A panicking listener never runs under the lock, so poisoning only
    // means a panic elsewhere; the map itself is still consistent.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: 'static> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Listener<T>) -> Subscription {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.insert(id, listener);
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                lock(&registry).listeners.remove(&id);
            }
        })
    }

    /// Call every listener with `value`. Listeners run outside the lock, so
    /// they may subscribe or unsubscribe while being notified.
    pub fn emit(&self, value: &T) {
        let listeners: Vec<Listener<T>> = lock(&self.registry).listeners.values().cloned().collect();
        for listener in listeners {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
