//! Handles for asynchronous device work.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::stream::{PooledStream, StreamPool};
use crate::error::{ExecError, ResourceError, Result};
use crate::exec::Value;

/// Result of an asynchronous operation.
///
/// `is_ready` never blocks; `resolve` blocks until the value is available.
pub trait DeviceFuture: Send {
    fn is_ready(&self) -> bool;

    fn resolve(self: Box<Self>) -> Result<Value>;
}

/// A future that is complete on creation.
#[derive(Debug)]
pub struct ReadyFuture(pub Value);

impl DeviceFuture for ReadyFuture {
    fn is_ready(&self) -> bool {
        true
    }

    fn resolve(self: Box<Self>) -> Result<Value> {
        Ok(self.0)
    }
}

type Slot = Arc<Mutex<Option<Result<Value>>>>;

/// Job running on a pooled stream; the stream goes back to the pool once
/// the future is resolved.
pub struct StreamFuture {
    label: String,
    stream: PooledStream,
    slot: Slot,
}

impl StreamFuture {
    /// Enqueue `job` on a stream taken from `pool`.
    pub fn spawn(
        pool: &Arc<StreamPool>,
        label: impl Into<String>,
        job: impl FnOnce() -> Result<Value> + Send + 'static,
    ) -> std::result::Result<Self, ResourceError> {
        let stream = pool.acquire()?;
        let slot: Slot = Arc::new(Mutex::new(None));
        let out = Arc::clone(&slot);
        stream.enqueue(move || {
            let value = job();
            *out.lock() = Some(value);
        })?;
        Ok(Self {
            label: label.into(),
            stream,
            slot,
        })
    }
}

impl fmt::Debug for StreamFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamFuture")
            .field("label", &self.label)
            .field("stream", &self.stream.id())
            .finish()
    }
}

impl DeviceFuture for StreamFuture {
    fn is_ready(&self) -> bool {
        self.stream.is_done()
    }

    fn resolve(self: Box<Self>) -> Result<Value> {
        self.stream.synchronize()?;
        let value = self.slot.lock().take();
        value.unwrap_or_else(|| Err(ExecError::FutureFailed(self.label.clone()).into()))
    }
}
