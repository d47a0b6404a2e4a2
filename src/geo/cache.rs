use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Lookup cache shared between the resolver and the distance engine.
///
/// Writes are idempotent (a key always maps to the same value), so implementations only need
/// enough synchronization to keep the map itself consistent.
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn set(&self, key: K, value: V);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime, unbounded cache. Nothing is evicted until the process exits.
pub struct MemoryCache<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn seeded<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(key).cloned()
    }

    fn set(&self, key: K, value: V) {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(key, value);
    }

    fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
