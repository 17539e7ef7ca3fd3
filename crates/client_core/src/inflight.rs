use std::{
    collections::HashSet,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
};

/// Result of an action that may be suppressed because the same item already
/// has a call outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Completed(T),
    Suppressed,
}

impl<T> Attempt<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Suppressed => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed)
    }
}

/// Keys with an outstanding remote call. Only the same key is suppressed;
/// distinct keys proceed concurrently.
pub struct InflightSet<K> {
    keys: Arc<Mutex<HashSet<K>>>,
}

impl<K> Default for InflightSet<K> {
    fn default() -> Self {
        Self {
            keys: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K> InflightSet<K>
where
    K: Eq + Hash + Clone,
{
    pub fn try_acquire(&self, key: K) -> Option<InflightTicket<K>> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(InflightTicket {
            keys: Arc::clone(&self.keys),
            key: Some(key),
        })
    }

    pub fn contains(&self, key: &K) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

/// Releases its key when dropped, including when the owning future is.
pub struct InflightTicket<K: Eq + Hash> {
    keys: Arc<Mutex<HashSet<K>>>,
    key: Option<K>,
}

impl<K: Eq + Hash> Drop for InflightTicket<K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.keys
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}
