use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared, lock-guarded state that many execution states can read and write.
#[derive(Debug, Default)]
pub struct MutableReference<T: Debug>(Arc<RwLock<T>>);

impl<T: Debug> Clone for MutableReference<T> {
    fn clone(&self) -> Self {
        MutableReference(self.0.clone())
    }
}

impl<T: Debug> From<T> for MutableReference<T> {
    fn from(t: T) -> Self {
        MutableReference(Arc::new(RwLock::new(t)))
    }
}

impl<T: Debug> MutableReference<T> {
    // a panicking writer cannot leave a Vec<Value> half-updated, so poisoning is ignored
    pub fn apply<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.0.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
