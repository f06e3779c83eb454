use parking_lot::RwLock;
use std::sync::Arc;

/// Shared, lock-guarded value. Configuration fields, the committed root of
/// an in-memory store and the current schema context all live in one.
pub type Atomic<T> = Arc<RwLock<T>>;

#[inline]
pub fn atomic<T>(value: T) -> Atomic<T> {
    Arc::new(RwLock::new(value))
}

pub trait ReadExecutor<T> {
    /// Runs `f` under the read lock.
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R;

    /// Clones the current value out of the lock.
    fn read_cloned(&self) -> T
    where
        T: Clone,
    {
        self.read_with(T::clone)
    }
}

impl<T> ReadExecutor<T> for Atomic<T> {
    #[inline]
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.read();
        f(&*guard)
    }
}

pub trait WriteExecutor<T> {
    /// Runs `f` under the write lock.
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;

    /// Stores `value` and returns the one it replaced.
    fn swap(&self, value: T) -> T {
        self.write_with(|current| std::mem::replace(current, value))
    }
}

impl<T> WriteExecutor<T> for Atomic<T> {
    #[inline]
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.write();
        f(&mut *guard)
    }
}
