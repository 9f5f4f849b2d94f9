//! Host-simulated device: capabilities, memory pools, streams and futures.
//!
//! Device memory is ordinary host memory handed out through a
//! [`MemoryPool`]; device work runs on [`Stream`] worker threads. Pools
//! are the only path to device storage so reuse accounting stays exact.

mod data;
mod future;
mod pool;
mod stream;

pub use data::DeviceData;
pub use future::{DeviceFuture, ReadyFuture, StreamFuture};
pub use pool::{MemoryPool, PoolKind, PooledBuffer};
pub use stream::{PooledStream, Stream, StreamPool};
