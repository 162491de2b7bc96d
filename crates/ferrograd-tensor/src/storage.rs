//! Arc-based storage shared by a tensor and all of its views.
//!
//! A buffer is freed when the last [`TensorStorage`] handle pointing at it is dropped, so a
//! view may outlive the tensor it was derived from.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

/// Inner storage holding the actual elements.
struct StorageImpl<T> {
    /// The flat element buffer.
    data: RwLock<Vec<T>>,
    /// Set while every element of the buffer is known to hold the same value.
    uniform: AtomicBool,
}

/// Reference-counted, interior-mutable element buffer.
///
/// Cloning a `TensorStorage` is cheap (a reference count increment) and yields a handle to
/// the same buffer. Writes made through any handle are visible through all of them.
///
/// # Thread Safety
///
/// Access to the buffer goes through a read/write lock. Kernels take one read guard per
/// operand for the whole operation and never hold a write guard while reading.
pub struct TensorStorage<T> {
    inner: Arc<StorageImpl<T>>,
}

impl<T> Clone for TensorStorage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for TensorStorage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorStorage")
            .field("len", &self.len())
            .field("uniform", &self.is_uniform())
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl<T> TensorStorage<T> {
    /// Creates a new storage taking ownership of `data` without copying.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self::build(data, false)
    }

    /// Creates a new storage whose elements are all known to be equal.
    pub(crate) fn from_uniform_vec(data: Vec<T>) -> Self {
        Self::build(data, true)
    }

    fn build(data: Vec<T>, uniform: bool) -> Self {
        Self {
            inner: Arc::new(StorageImpl {
                data: RwLock::new(data),
                uniform: AtomicBool::new(uniform),
            }),
        }
    }

    /// Acquires shared read access to the whole buffer.
    ///
    /// A lock poisoned by a panicking writer is recovered, the buffer holds plain values.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.inner
            .data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquires exclusive write access to the whole buffer.
    ///
    /// Handing out a writable buffer clears the uniform-value flag since the caller may
    /// store anything through it.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        let guard = self
            .inner
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.inner.uniform.store(false, Ordering::Release);
        guard
    }

    /// Returns the number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if every element is known to hold the same value.
    ///
    /// A `false` result does not mean the values differ, only that nothing vouches for them.
    #[inline]
    pub fn is_uniform(&self) -> bool {
        self.inner.uniform.load(Ordering::Acquire)
    }

    /// Flags the buffer as uniform.
    ///
    /// Must be called with the write guard that made the values equal still held, otherwise
    /// another writer could change an element between the write and the flag.
    pub(crate) fn mark_uniform(&self, _held: &RwLockWriteGuard<'_, Vec<T>>) {
        self.inner.uniform.store(true, Ordering::Release);
    }

    /// Returns true if both handles point at the same buffer.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true if this is the only handle to the buffer.
    #[inline]
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}
