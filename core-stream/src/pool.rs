//! # Sample Buffer Pool
//!
//! Free list of fixed-capacity PCM buffers shared between the request path
//! (which fills them) and the consumer (which hands them back).
//!
//! ## Design
//!
//! - **Ownership**: a buffer is always in exactly one place: the free list,
//!   or inside a [`PooledBuffer`] handle.
//! - **Return**: dropping the handle (or calling
//!   [`PooledBuffer::mark_processed`]) puts the buffer back, once.
//! - **Lifetime**: handles only hold a weak reference. Buffers returned after
//!   the pool is gone are freed.
//!
//! ## Usage
//!
//! ```rust
//! use core_stream::pool::BufferPool;
//!
//! let pool = BufferPool::new(2048, None);
//!
//! let mut sample = pool.acquire();
//! sample.buffer_mut().extend_from_slice(&[0u8; 16]);
//! assert_eq!(sample.len(), 16);
//!
//! sample.mark_processed();
//! assert_eq!(pool.available(), 1);
//! ```

use bytes::BytesMut;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Thread-safe pool of fixed-capacity buffers.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    free: parking_lot::Mutex<Vec<BytesMut>>,
    buffer_capacity: usize,
    max_pooled: Option<usize>,
    allocated: AtomicUsize,
}

impl PoolInner {
    fn release(&self, mut buffer: BytesMut) {
        buffer.clear();
        if buffer.capacity() < self.buffer_capacity {
            return;
        }

        let mut free = self.free.lock();
        if let Some(max) = self.max_pooled {
            if free.len() >= max {
                return;
            }
        }
        free.push(buffer);
    }
}

impl BufferPool {
    /// Create an empty pool handing out buffers of `buffer_capacity` bytes.
    ///
    /// At most `max_pooled` free buffers are retained, all of them if `None`.
    pub fn new(buffer_capacity: usize, max_pooled: Option<usize>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: parking_lot::Mutex::new(Vec::new()),
                buffer_capacity,
                max_pooled,
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    /// Take a free buffer, allocating one if the pool is empty.
    pub fn acquire(&self) -> PooledBuffer {
        let pooled = self.inner.free.lock().pop();
        let buffer = match pooled {
            Some(buffer) => buffer,
            None => {
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(self.inner.buffer_capacity)
            }
        };

        PooledBuffer {
            buffer,
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Capacity of every buffer handed out.
    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffer_capacity
    }

    /// Number of free buffers.
    pub fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Number of buffers allocated over the pool's lifetime.
    pub fn allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }

    /// Drop every free buffer.
    pub fn clear(&self) {
        self.inner.free.lock().clear();
    }
}

/// A buffer on loan from a [`BufferPool`].
///
/// Goes back to the pool when dropped.
pub struct PooledBuffer {
    buffer: BytesMut,
    pool: Weak<PoolInner>,
}

impl PooledBuffer {
    /// Mutable access for filling.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Capacity of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Signal that the consumer is done with this buffer.
    pub fn mark_processed(self) {
        drop(self);
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buffer
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buffer.len())
            .field("capacity", &self.buffer.capacity())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        if let Some(pool) = self.pool.upgrade() {
            pool.release(buffer);
        }
    }
}
