use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

/// Session-scoped memo table whose concurrent lookups share one fetch.
///
/// Each key owns a [`OnceCell`]; the first caller runs the fetch while later
/// callers for the same key wait for its result. A failed fetch leaves the
/// cell empty, so the next lookup retries.
pub struct CoalescingCache<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for CoalescingCache<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> CoalescingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = Arc::clone(self.cells.lock().entry(key).or_default());
        cell.get_or_try_init(fetch).await.cloned()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.cells.lock().get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of keys with a completed value.
    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every entry. Fetches still in flight complete into detached
    /// cells and never become visible through this cache.
    pub fn clear(&self) {
        self.cells.lock().clear();
    }
}
