//! Buffer Pool
//!
//! Bounded staging memory for large values on their way through the write
//! path. Every buffer handed out is counted against the pool's capacity until
//! it is released.
//!
//! ## Responsibilities
//! - Grant or refuse buffers against a byte budget
//! - Track current usage and the high-water mark
//! - Return memory automatically when a [`PoolBuffer`] is dropped

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

/// Source of staging buffers
pub trait BufferPool: Send + Sync {
    /// A zero-filled buffer of exactly `size` bytes, or None when exhausted
    fn acquire(&self, size: usize) -> Option<BytesMut>;

    /// Return a buffer obtained from `acquire`
    fn release(&self, buffer: BytesMut);

    /// Bytes currently handed out
    fn usage(&self) -> usize;
}

#[derive(Debug, Default)]
struct PoolState {
    usage: usize,
    high_water: usize,
    outstanding: usize,
}

/// Heap-backed pool with an optional byte budget
#[derive(Debug)]
pub struct HeapBufferPool {
    capacity: Option<usize>,
    state: Mutex<PoolState>,
}

impl HeapBufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Largest usage observed
    pub fn high_water(&self) -> usize {
        self.state.lock().high_water
    }

    /// Buffers acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }
}

impl BufferPool for HeapBufferPool {
    fn acquire(&self, size: usize) -> Option<BytesMut> {
        {
            let mut state = self.state.lock();
            if let Some(capacity) = self.capacity {
                if state.usage + size > capacity {
                    tracing::warn!(requested = size, usage = state.usage, capacity, "buffer pool exhausted");
                    return None;
                }
            }
            state.usage += size;
            state.outstanding += 1;
            state.high_water = state.high_water.max(state.usage);
        }
        Some(BytesMut::zeroed(size))
    }

    fn release(&self, buffer: BytesMut) {
        let mut state = self.state.lock();
        state.usage = state.usage.saturating_sub(buffer.len());
        state.outstanding = state.outstanding.saturating_sub(1);
    }

    fn usage(&self) -> usize {
        self.state.lock().usage
    }
}

/// A buffer leased from a pool; released back on drop
pub struct PoolBuffer {
    buf: Option<BytesMut>,
    pool: Arc<dyn BufferPool>,
}

impl PoolBuffer {
    /// Copy `data` into a fresh buffer from `pool`
    pub fn copy_from(pool: &Arc<dyn BufferPool>, data: &[u8]) -> Option<Self> {
        let mut buf = pool.acquire(data.len())?;
        buf.copy_from_slice(data);
        Some(Self {
            buf: Some(buf),
            pool: Arc::clone(pool),
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl std::ops::Deref for PoolBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

impl std::fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuffer").field("len", &self.len()).finish()
    }
}
