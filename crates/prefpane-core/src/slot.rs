use std::sync::{Arc, Mutex, MutexGuard};

/// One optional value shared between the affinity thread, which replaces
/// it from listeners, and workers that read it.
pub struct SharedSlot<T> {
    value: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for SharedSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Default for SharedSlot<T> {
    fn default() -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: Clone> SharedSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }

    /// Stores `value` and returns the one it replaced.
    pub fn set(&self, value: T) -> Option<T> {
        self.lock().replace(value)
    }

    pub fn clear(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
