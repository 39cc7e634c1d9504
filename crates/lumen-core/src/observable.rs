use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle (or calling [`Subscription::dispose`]) removes the
/// listener. Use [`Subscription::detach`] to keep the listener registered for
/// the lifetime of the source.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A subscription that owns nothing.
    pub fn empty() -> Self {
        Self { dispose: None }
    }

    pub fn dispose(mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }

    /// Forget the disposer; the listener stays registered.
    pub fn detach(mut self) {
        self.dispose = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

/// A list of listeners notified with a borrowed event.
pub struct Notifier<T> {
    listeners: Arc<Mutex<Listeners<T>>>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }
}

impl<T: 'static> Notifier<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Arc::new(listener)));
            id
        };

        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners.lock().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Invoke every listener with `event`.
    ///
    /// Listeners run outside the internal lock, so they may subscribe or
    /// dispose other listeners re-entrantly; such changes apply from the next
    /// notification on.
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }
}

/// A shared value that notifies subscribers when it changes.
///
/// Cloning an `Observable` yields another handle to the same value.
pub struct Observable<T> {
    value: Arc<RwLock<T>>,
    notifier: Notifier<T>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            notifier: self.notifier.clone(),
        }
    }
}

impl<T: Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observable").field(&*self.value.read()).finish()
    }
}

impl<T: 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
            notifier: Notifier::new(),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.notifier.subscribe(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.notifier.listener_count()
    }
}

impl<T: Clone + 'static> Observable<T> {
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Mutate the value in place and notify unconditionally.
    ///
    /// Listeners receive a snapshot taken after `f` ran and are invoked with no
    /// lock held, so they may write back to this observable.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let snapshot = {
            let mut value = self.value.write();
            f(&mut value);
            value.clone()
        };
        self.notifier.notify(&snapshot);
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Store `value`, notifying subscribers only when it differs from the
    /// current one. Returns whether a change happened.
    pub fn set(&self, value: T) -> bool {
        let snapshot = {
            let mut current = self.value.write();
            if *current == value {
                return false;
            }
            *current = value;
            current.clone()
        };
        self.notifier.notify(&snapshot);
        true
    }
}
