//! Neighbor data exchange for flux-receive instructions.
//!
//! Only a single-rank loopback is provided: "receiving" a field from a
//! rank copies the local field on a stream, so the value arrives as a
//! future exactly like a remote transfer would.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use super::value::{DeviceVector, Value};
use crate::device::{DeviceFuture, MemoryPool, StreamFuture, StreamPool};
use crate::error::Result;

/// Source of exchanged face data.
pub trait NeighborExchange: Debug + Send + Sync {
    /// Start receiving the `index`-th exchanged field from `rank`.
    fn receive(&self, field: &DeviceVector, index: usize, rank: usize) -> Result<Box<dyn DeviceFuture>>;
}

/// Receives every field from the local rank.
#[derive(Debug)]
pub struct LoopbackExchange {
    streams: Arc<StreamPool>,
    pool: Arc<MemoryPool>,
    latency: Option<Duration>,
}

impl LoopbackExchange {
    pub fn new(streams: Arc<StreamPool>, pool: Arc<MemoryPool>) -> Self {
        Self {
            streams,
            pool,
            latency: None,
        }
    }

    /// Delay every transfer, to exercise slow futures.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

impl NeighborExchange for LoopbackExchange {
    fn receive(&self, field: &DeviceVector, index: usize, rank: usize) -> Result<Box<dyn DeviceFuture>> {
        let field = Arc::clone(field);
        let pool = Arc::clone(&self.pool);
        let latency = self.latency;
        let future = StreamFuture::spawn(&self.streams, format!("receive {index}@{rank}"), move || {
            if let Some(latency) = latency {
                std::thread::sleep(latency);
            }
            Ok(Value::vector_from_slice(&pool, &field)?)
        })?;
        Ok(Box::new(future))
    }
}
