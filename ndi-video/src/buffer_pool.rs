//! Recycling pool of size-matched output buffers

use crate::error::LayoutError;
use crate::pixel_buffer::{owned_layout, AlignedStorage, PixelBuffer};
use crate::types::{ExtendedPixels, PixelFormat, PlaneLayout};
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Everything that determines the shape of a pooled buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolGeometry {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub extended: ExtendedPixels,
}

impl PoolGeometry {
    /// Geometry of an existing buffer
    pub fn of(buffer: &PixelBuffer) -> Self {
        PoolGeometry {
            format: buffer.format(),
            width: buffer.width(),
            height: buffer.height(),
            extended: buffer.extended_pixels(),
        }
    }
}

struct PoolShared {
    id: u64,
    free: ArrayQueue<AlignedStorage>,
    outstanding: AtomicUsize,
}

/// Hands a dropped buffer's memory back to the pool that allocated it
pub(crate) struct Recycler {
    pool: Weak<PoolShared>,
    pool_id: u64,
}

impl Recycler {
    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }

    /// Memory of a buffer from a discarded pool is freed instead
    pub(crate) fn recycle(self, storage: AlignedStorage) {
        if let Some(pool) = self.pool.upgrade() {
            pool.outstanding.fetch_sub(1, Ordering::AcqRel);
            let _ = pool.free.push(storage);
        }
    }
}

/// Pool of pre-shaped pixel buffers to eliminate allocation churn
///
/// Buffers are allocated lazily up to `capacity` and return to the pool
/// when dropped, from any thread.
pub struct BufferPool {
    shared: Arc<PoolShared>,
    geometry: PoolGeometry,
    planes: Vec<PlaneLayout>,
    size: usize,
    capacity: usize,
}

impl BufferPool {
    /// Create a new buffer pool
    ///
    /// # Arguments
    /// * `geometry` - Format, visible size and extended pixels of every buffer
    /// * `capacity` - Maximum number of buffers outstanding at once
    pub fn new(geometry: PoolGeometry, capacity: usize) -> Result<Self, LayoutError> {
        let (planes, size) = owned_layout(
            geometry.format,
            geometry.width,
            geometry.height,
            geometry.extended,
        )?;
        let capacity = capacity.max(1);

        Ok(BufferPool {
            shared: Arc::new(PoolShared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                free: ArrayQueue::new(capacity),
                outstanding: AtomicUsize::new(0),
            }),
            geometry,
            planes,
            size,
            capacity,
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn geometry(&self) -> PoolGeometry {
        self.geometry
    }

    /// Acquire a buffer from the pool
    ///
    /// Returns `None` when `capacity` buffers are outstanding or memory
    /// cannot be allocated.
    pub fn acquire(&self) -> Option<PixelBuffer> {
        let reserved = self
            .shared
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            return None; // Pool exhausted
        }

        let storage = match self.shared.free.pop() {
            Some(storage) => storage,
            None => match AlignedStorage::zeroed(self.size) {
                Some(storage) => storage,
                None => {
                    self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
                    return None;
                }
            },
        };
        debug_assert_eq!(storage.len(), self.size.max(1));

        let recycler = Recycler {
            pool: Arc::downgrade(&self.shared),
            pool_id: self.shared.id,
        };

        Some(PixelBuffer::with_storage(
            self.geometry.format,
            self.geometry.width,
            self.geometry.height,
            self.geometry.extended,
            self.planes.clone(),
            storage,
            Some(recycler),
        ))
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let in_use = self.shared.outstanding.load(Ordering::Acquire);

        PoolStats {
            capacity: self.capacity,
            in_use,
            available: self.capacity - in_use,
            cached: self.shared.free.len(),
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("id", &self.shared.id)
            .field("geometry", &self.geometry)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub available: usize,
    /// Recycled allocations waiting for reuse
    pub cached: usize,
}
