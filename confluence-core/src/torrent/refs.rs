//! Reference-counted registry keyed by torrent.
//!
//! Each key has at most one live entry. An entry carries a count of
//! outstanding [`Ref`]s and an optional closer. Releasing the last ref removes
//! the entry and runs the closer once, outside the registry lock, so closers
//! are free to call back into the registry or the torrent client.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// Callback run once when the last reference to an entry is released.
pub type Closer = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    count: usize,
    closer: Option<Closer>,
}

/// Registry of reference-counted entries.
///
/// Cloning is cheap and clones share the same entries.
pub struct RefRegistry<K> {
    entries: Arc<Mutex<HashMap<K, Entry>>>,
}

impl<K> Clone for RefRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K> Default for RefRegistry<K> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> RefRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtains or creates the entry for `key` and takes one reference on it.
    pub fn new_ref(&self, key: K) -> Ref<K> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            count: 0,
            closer: None,
        });
        entry.count += 1;
        tracing::trace!(?key, count = entry.count, "Added torrent ref");

        Ref {
            key,
            registry: self.clone(),
            released: false,
        }
    }

    /// Whether an entry for `key` is currently live.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Outstanding reference count for `key`, zero when absent.
    pub fn ref_count(&self, key: &K) -> usize {
        self.entries.lock().get(key).map_or(0, |entry| entry.count)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry has no live entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn set_closer(&self, key: &K, closer: Closer) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.closer = Some(closer);
        }
    }

    fn release(&self, key: &K) {
        let closer = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                tracing::warn!(?key, "Released ref for absent entry");
                return;
            };
            entry.count -= 1;
            tracing::trace!(?key, count = entry.count, "Released torrent ref");
            if entry.count > 0 {
                return;
            }
            entries.remove(key).and_then(|entry| entry.closer)
        };

        if let Some(closer) = closer {
            tracing::debug!(?key, "Running closer for released entry");
            closer();
        }
    }
}

/// One outstanding reference on a registry entry.
///
/// Released explicitly with [`Ref::release`] or implicitly on drop.
pub struct Ref<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    key: K,
    registry: RefRegistry<K>,
    released: bool,
}

impl<K> Ref<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    /// Key this reference holds.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Sets or replaces the entry's closer.
    pub fn set_closer<F>(&self, closer: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.registry.set_closer(&self.key, Box::new(closer));
    }

    /// Drops this reference, tearing the entry down if it was the last one.
    pub fn release(mut self) {
        self.released = true;
        self.registry.release(&self.key);
    }
}

impl<K> Drop for Ref<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.key);
        }
    }
}

impl<K> fmt::Debug for Ref<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref").field("key", &self.key).finish()
    }
}
