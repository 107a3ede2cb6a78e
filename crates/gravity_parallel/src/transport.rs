//! Shared-array transport between the orchestrator and its workers.
//!
//! A [`SharedArrayPool`] is owned by one orchestrator run. The orchestrator
//! publishes each input once, hands workers the resulting [`ArrayHandle`]s,
//! and releases every handle after the workers quiesce. Workers attach
//! handles to get read-only [`ArrayView`]s; nothing is copied or
//! re-serialised on attach.
//!
//! A released buffer stays alive until the last attached view drops, so a
//! worker that attached before the release always reads valid data. New
//! attaches after the release fail with [`TransportError::Released`].
//!
//! # Example
//!
//! ```rust
//! use gravity_parallel::transport::SharedArrayPool;
//!
//! let pool: SharedArrayPool<[f64]> = SharedArrayPool::new();
//! let handle = pool.publish(vec![1.0, 2.0, 3.0]);
//!
//! let view = pool.attach(handle).unwrap();
//! assert_eq!(view.iter().sum::<f64>(), 6.0);
//!
//! pool.release(handle).unwrap();
//! assert_eq!(view[2], 3.0); // still readable
//! assert!(pool.attach(handle).is_err());
//! ```

use crate::error::TransportError;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Deref};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Opaque reference to a published array.
///
/// Handles are only meaningful to the pool that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayHandle(u64);

impl ArrayHandle {
    /// Raw handle number.
    #[inline]
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArrayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "array#{}", self.0)
    }
}

/// Transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Arrays published.
    pub published: usize,
    /// Successful attaches.
    pub attached: usize,
    /// Arrays released.
    pub released: usize,
    /// Views currently alive.
    pub live_views: usize,
}

impl TransportStats {
    /// Published arrays not yet released.
    #[inline]
    pub fn live_buffers(&self) -> usize {
        self.published - self.released
    }
}

impl Add for TransportStats {
    type Output = TransportStats;

    fn add(self, rhs: TransportStats) -> TransportStats {
        TransportStats {
            published: self.published + rhs.published,
            attached: self.attached + rhs.attached,
            released: self.released + rhs.released,
            live_views: self.live_views + rhs.live_views,
        }
    }
}

enum Slot<T: ?Sized> {
    Live(Arc<T>),
    Released,
}

/// Read-only view of a published array.
///
/// Dereferences to the shared data. Dropping the view is what tells the pool
/// this worker has finished with it.
pub struct ArrayView<T: ?Sized> {
    data: Arc<T>,
    handle: ArrayHandle,
    live_views: Arc<AtomicUsize>,
}

impl<T: ?Sized> ArrayView<T> {
    /// Handle this view was attached from.
    #[inline]
    pub fn handle(&self) -> ArrayHandle {
        self.handle
    }

    /// Returns `true` if both views read the same allocation.
    #[inline]
    pub fn same_buffer(&self, other: &ArrayView<T>) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<T: ?Sized> Deref for ArrayView<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T: ?Sized> Drop for ArrayView<T> {
    fn drop(&mut self) {
        self.live_views.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: ?Sized> fmt::Debug for ArrayView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView").field("handle", &self.handle).finish()
    }
}

/// Publish/attach/release registry of immutable shared arrays.
///
/// `T` is usually `[f64]`; any `Send + Sync` type works, including
/// unsized slices.
pub struct SharedArrayPool<T: ?Sized> {
    slots: RwLock<HashMap<u64, Slot<T>>>,
    next_id: AtomicU64,
    published: AtomicUsize,
    attached: AtomicUsize,
    released: AtomicUsize,
    live_views: Arc<AtomicUsize>,
}

impl<T: ?Sized + Send + Sync> SharedArrayPool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            published: AtomicUsize::new(0),
            attached: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            live_views: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publishes an array, taking ownership without copying it.
    ///
    /// Passing an existing `Arc` shares its allocation.
    pub fn publish(&self, data: impl Into<Arc<T>>) -> ArrayHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Slot::Live(data.into()));
        self.published.fetch_add(1, Ordering::Relaxed);
        ArrayHandle(id)
    }

    /// Attaches a read-only view of a published array.
    ///
    /// # Errors
    ///
    /// [`TransportError::UnknownHandle`] if this pool never issued `handle`;
    /// [`TransportError::Released`] if it has already been released.
    pub fn attach(&self, handle: ArrayHandle) -> Result<ArrayView<T>, TransportError> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        match slots.get(&handle.0) {
            Some(Slot::Live(data)) => {
                self.live_views.fetch_add(1, Ordering::AcqRel);
                self.attached.fetch_add(1, Ordering::Relaxed);
                Ok(ArrayView {
                    data: Arc::clone(data),
                    handle,
                    live_views: Arc::clone(&self.live_views),
                })
            }
            Some(Slot::Released) => Err(TransportError::Released(handle.0)),
            None => Err(TransportError::UnknownHandle(handle.0)),
        }
    }

    /// Drops the pool's reference to an array.
    ///
    /// Views attached earlier keep the buffer alive until they drop.
    pub fn release(&self, handle: ArrayHandle) -> Result<(), TransportError> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = slots.get_mut(&handle.0) else {
            return Err(TransportError::UnknownHandle(handle.0));
        };
        if matches!(slot, Slot::Released) {
            return Err(TransportError::Released(handle.0));
        }
        *slot = Slot::Released;
        self.released.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Releases every live array. Returns how many were released.
    pub fn release_all(&self) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let mut count = 0;
        for slot in slots.values_mut() {
            if matches!(slot, Slot::Live(_)) {
                *slot = Slot::Released;
                count += 1;
            }
        }
        self.released.fetch_add(count, Ordering::Relaxed);
        count
    }

    /// Returns `true` if `handle` can still be attached.
    pub fn is_live(&self, handle: ArrayHandle) -> bool {
        matches!(
            self.slots
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&handle.0),
            Some(Slot::Live(_))
        )
    }

    /// Current counters.
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            published: self.published.load(Ordering::Relaxed),
            attached: self.attached.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            live_views: self.live_views.load(Ordering::Acquire),
        }
    }
}

impl<T: ?Sized + Send + Sync> Default for SharedArrayPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for SharedArrayPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedArrayPool")
            .field("published", &self.published.load(Ordering::Relaxed))
            .field("released", &self.released.load(Ordering::Relaxed))
            .field("live_views", &self.live_views.load(Ordering::Relaxed))
            .finish()
    }
}
