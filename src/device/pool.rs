//! Binned memory pools with scoped checkout.
//!
//! Freed buffers are kept on per-size-bin free lists and handed out again
//! to later requests of the same bin. A [`PooledBuffer`] returns its
//! storage to the pool when dropped, so early returns and `?` never leak
//! pool accounting.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dg_gpu::device::{MemoryPool, PoolKind};
//!
//! let pool = Arc::new(MemoryPool::new(PoolKind::Device, Some(1 << 20)));
//! {
//!     let mut buf = pool.allocate(100).unwrap();
//!     buf[0] = 1.0;
//!     assert_eq!(pool.held_bytes(), 0);
//! }
//! // buffer returned to the pool on drop
//! assert_eq!(pool.active_bytes(), 0);
//! assert!(pool.held_bytes() > 0);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ResourceError;

const WORD: usize = std::mem::size_of::<f64>();

/// Which memory a pool hands out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Device global memory
    Device,
    /// Page-locked host memory used for async transfers
    PageLocked,
}

impl PoolKind {
    pub fn name(self) -> &'static str {
        match self {
            PoolKind::Device => "device",
            PoolKind::PageLocked => "page-locked",
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    free: BTreeMap<usize, Vec<Vec<f64>>>,
    held_bytes: usize,
    active_bytes: usize,
    allocations: usize,
    reuses: usize,
    stopped_holding: bool,
}

/// Memory pool with a capacity limit and size-binned free lists.
#[derive(Debug)]
pub struct MemoryPool {
    kind: PoolKind,
    capacity: Option<usize>,
    log: bool,
    state: Mutex<PoolState>,
}

/// Bin size (in elements) for a request of `len` elements.
fn bin_for(len: usize) -> usize {
    len.max(1).next_power_of_two()
}

impl MemoryPool {
    /// Create a pool. `capacity` limits active plus held bytes.
    pub fn new(kind: PoolKind, capacity: Option<usize>) -> Self {
        Self {
            kind,
            capacity,
            log: false,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Log every allocation and release.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Check out a zeroed buffer of `len` elements.
    pub fn allocate(self: &Arc<Self>, len: usize) -> Result<PooledBuffer, ResourceError> {
        let bin = bin_for(len);
        let bytes = bin * WORD;
        let mut state = self.state.lock();

        let reused = state.free.get_mut(&bin).and_then(Vec::pop);
        let mut data = match reused {
            Some(data) => {
                state.held_bytes -= bytes;
                state.reuses += 1;
                data
            }
            None => {
                if let Some(capacity) = self.capacity {
                    if state.active_bytes + state.held_bytes + bytes > capacity {
                        // Give back cached buffers before failing.
                        state.free.clear();
                        state.held_bytes = 0;
                    }
                    if state.active_bytes + bytes > capacity {
                        return Err(ResourceError::PoolExhausted {
                            pool: self.kind.name(),
                            requested: bytes,
                            available: capacity - state.active_bytes,
                        });
                    }
                }
                state.allocations += 1;
                Vec::with_capacity(bin)
            }
        };
        state.active_bytes += bytes;

        if self.log {
            debug!(
                pool = self.kind.name(),
                len,
                bin,
                active_bytes = state.active_bytes,
                held_bytes = state.held_bytes,
                "pool allocate"
            );
        }
        drop(state);

        data.clear();
        data.resize(len, 0.0);
        Ok(PooledBuffer {
            data,
            bin,
            pool: Arc::clone(self),
        })
    }

    fn release(&self, data: Vec<f64>, bin: usize) {
        let bytes = bin * WORD;
        let mut state = self.state.lock();
        state.active_bytes -= bytes;
        if !state.stopped_holding {
            state.held_bytes += bytes;
            state.free.entry(bin).or_default().push(data);
        }
        if self.log {
            debug!(
                pool = self.kind.name(),
                bin,
                active_bytes = state.active_bytes,
                held_bytes = state.held_bytes,
                "pool release"
            );
        }
    }

    /// Drop every cached buffer but keep caching future releases.
    pub fn free_held(&self) {
        let mut state = self.state.lock();
        state.free.clear();
        state.held_bytes = 0;
    }

    /// Drop every cached buffer and stop caching. Checked-out buffers are
    /// freed directly when they come back.
    pub fn stop_holding(&self) {
        let mut state = self.state.lock();
        state.free.clear();
        state.held_bytes = 0;
        state.stopped_holding = true;
    }

    /// Bytes cached on free lists.
    pub fn held_bytes(&self) -> usize {
        self.state.lock().held_bytes
    }

    /// Bytes currently checked out.
    pub fn active_bytes(&self) -> usize {
        self.state.lock().active_bytes
    }

    /// Number of fresh allocations (free-list misses).
    pub fn allocation_count(&self) -> usize {
        self.state.lock().allocations
    }

    /// Number of requests served from a free list.
    pub fn reuse_count(&self) -> usize {
        self.state.lock().reuses
    }
}

/// Buffer checked out of a [`MemoryPool`]; returned on drop.
pub struct PooledBuffer {
    data: Vec<f64>,
    bin: usize,
    pool: Arc<MemoryPool>,
}

impl PooledBuffer {
    /// Pool this buffer came from.
    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .field("bin", &self.bin)
            .field("pool", &self.pool.kind)
            .finish()
    }
}

impl Deref for PooledBuffer {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.data), self.bin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(capacity: Option<usize>) -> Arc<MemoryPool> {
        Arc::new(MemoryPool::new(PoolKind::Device, capacity))
    }

    #[test]
    fn test_acquire_release() {
        let pool = pool(None);
        {
            let mut buf = pool.allocate(100).unwrap();
            buf[0] = 1.0;
            assert_eq!(buf.len(), 100);
            assert_eq!(pool.active_bytes(), 128 * 8);
        }
        assert_eq!(pool.active_bytes(), 0);
        assert_eq!(pool.held_bytes(), 128 * 8);
    }

    #[test]
    fn test_reuse_is_zeroed() {
        let pool = pool(None);
        {
            let mut buf = pool.allocate(100).unwrap();
            buf[0] = 42.0;
        }
        let buf = pool.allocate(120).unwrap();
        assert_eq!(buf[0], 0.0);
        assert_eq!(pool.allocation_count(), 1);
        assert_eq!(pool.reuse_count(), 1);
        assert_eq!(pool.held_bytes(), 0);
    }

    #[test]
    fn test_exhaustion() {
        let pool = pool(Some(1024));
        let _a = pool.allocate(64).unwrap();
        let err = pool.allocate(128).unwrap_err();
        assert_eq!(
            err,
            ResourceError::PoolExhausted {
                pool: "device",
                requested: 1024,
                available: 512,
            }
        );
    }

    #[test]
    fn test_held_buffers_released_under_pressure() {
        let pool = pool(Some(1024));
        drop(pool.allocate(64).unwrap());
        assert_eq!(pool.held_bytes(), 512);
        // different bin: held memory must be given back to fit
        let _b = pool.allocate(100).unwrap();
        assert_eq!(pool.held_bytes(), 0);
        assert_eq!(pool.active_bytes(), 1024);
    }

    #[test]
    fn test_stop_holding() {
        let pool = pool(None);
        let buf = pool.allocate(10).unwrap();
        pool.stop_holding();
        drop(buf);
        assert_eq!(pool.held_bytes(), 0);
        assert_eq!(pool.active_bytes(), 0);
    }
}
