//! Execution streams and the stream pool.
//!
//! A [`Stream`] owns one worker thread that runs enqueued jobs in order.
//! `is_done` is a non-blocking completion check, `synchronize` blocks until
//! every job enqueued so far has run. Streams are expensive to create, so
//! they are recycled through a [`StreamPool`]; a [`PooledStream`] guard
//! synchronizes its stream before handing it back.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::error::ResourceError;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default)]
struct StreamState {
    enqueued: u64,
    completed: u64,
    failure: Option<String>,
}

#[derive(Debug, Default)]
struct StreamShared {
    state: Mutex<StreamState>,
    done: Condvar,
}

/// Worker thread and its queue. Joined once the last handle is gone.
#[derive(Debug)]
struct StreamWorker {
    sender: Option<mpsc::Sender<Job>>,
    shared: Arc<StreamShared>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// In-order work queue backed by one worker thread.
#[derive(Debug)]
pub struct Stream {
    id: usize,
    worker: Arc<StreamWorker>,
}

impl Stream {
    /// Spawn a new stream worker.
    pub fn new(id: usize) -> Result<Self, ResourceError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let shared = Arc::new(StreamShared::default());
        let worker_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name(format!("dg-stream-{id}"))
            .spawn(move || {
                for job in receiver {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(job));
                    let mut state = worker_shared.state.lock();
                    state.completed += 1;
                    if outcome.is_err() && state.failure.is_none() {
                        state.failure = Some(format!("job on stream {id} panicked"));
                    }
                    worker_shared.done.notify_all();
                }
            })
            .map_err(|e| ResourceError::Stream(e.to_string()))?;

        Ok(Self {
            id,
            worker: Arc::new(StreamWorker {
                sender: Some(sender),
                shared,
                handle: Some(handle),
            }),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Second handle onto the same worker and queue.
    fn share(&self) -> Stream {
        Stream {
            id: self.id,
            worker: Arc::clone(&self.worker),
        }
    }

    /// Queue a job behind everything already enqueued.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) -> Result<(), ResourceError> {
        let sender = self
            .worker
            .sender
            .as_ref()
            .ok_or_else(|| ResourceError::Stream(format!("stream {} is closed", self.id)))?;
        let shared = &self.worker.shared;
        shared.state.lock().enqueued += 1;
        if sender.send(Box::new(job)).is_err() {
            let mut state = shared.state.lock();
            state.enqueued -= 1;
            return Err(ResourceError::Stream(format!(
                "stream {} worker disconnected",
                self.id
            )));
        }
        Ok(())
    }

    /// True once every enqueued job has finished.
    pub fn is_done(&self) -> bool {
        let state = self.worker.shared.state.lock();
        state.completed == state.enqueued
    }

    /// Block until every enqueued job has finished.
    pub fn synchronize(&self) -> Result<(), ResourceError> {
        let shared = &self.worker.shared;
        let mut state = shared.state.lock();
        while state.completed < state.enqueued {
            shared.done.wait(&mut state);
        }
        match state.failure.take() {
            Some(msg) => Err(ResourceError::Stream(msg)),
            None => Ok(()),
        }
    }
}

/// Recycles streams. Acquire before use, release after synchronize.
#[derive(Debug, Default)]
pub struct StreamPool {
    idle: Mutex<Vec<Stream>>,
    created: AtomicUsize,
}

impl StreamPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool with `n` streams created up front.
    pub fn with_streams(n: usize) -> Result<Self, ResourceError> {
        let pool = Self::new();
        {
            let mut idle = pool.idle.lock();
            for _ in 0..n {
                idle.push(Stream::new(pool.created.fetch_add(1, Ordering::Relaxed))?);
            }
        }
        Ok(pool)
    }

    /// Take an idle stream, or create one if none is idle.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledStream, ResourceError> {
        let stream = match self.idle.lock().pop() {
            Some(stream) => stream,
            None => {
                let id = self.created.fetch_add(1, Ordering::Relaxed);
                trace!(stream = id, "creating stream");
                Stream::new(id)?
            }
        };
        Ok(PooledStream {
            stream,
            pool: Arc::clone(self),
        })
    }

    /// Number of streams waiting in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of streams ever created by this pool.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

/// Stream checked out of a [`StreamPool`].
#[derive(Debug)]
pub struct PooledStream {
    stream: Stream,
    pool: Arc<StreamPool>,
}

impl std::ops::Deref for PooledStream {
    type Target = Stream;

    fn deref(&self) -> &Stream {
        &self.stream
    }
}

impl Drop for PooledStream {
    fn drop(&mut self) {
        match self.stream.synchronize() {
            Ok(()) => self.pool.idle.lock().push(self.stream.share()),
            Err(e) => warn!(stream = self.stream.id(), error = %e, "discarding failed stream"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_order() {
        let stream = Stream::new(0).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = Arc::clone(&log);
            stream.enqueue(move || log.lock().push(i)).unwrap();
        }
        stream.synchronize().unwrap();
        assert!(stream.is_done());
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_is_done_is_nonblocking() {
        let stream = Stream::new(0).unwrap();
        let gate = Arc::new(AtomicBool::new(false));
        let g = Arc::clone(&gate);
        stream
            .enqueue(move || {
                while !g.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(1));
                }
            })
            .unwrap();
        assert!(!stream.is_done());
        gate.store(true, Ordering::Release);
        stream.synchronize().unwrap();
        assert!(stream.is_done());
    }

    #[test]
    fn test_panicking_job_reported() {
        let stream = Stream::new(0).unwrap();
        stream.enqueue(|| panic!("boom")).unwrap();
        assert!(matches!(stream.synchronize(), Err(ResourceError::Stream(_))));
        // the worker survives
        stream.enqueue(|| {}).unwrap();
        assert!(stream.synchronize().is_ok());
    }

    #[test]
    fn test_pool_synchronizes_on_release() {
        let pool = Arc::new(StreamPool::new());
        let flag = Arc::new(AtomicBool::new(false));
        {
            let stream = pool.acquire().unwrap();
            let f = Arc::clone(&flag);
            stream
                .enqueue(move || {
                    thread::sleep(Duration::from_millis(20));
                    f.store(true, Ordering::Release);
                })
                .unwrap();
        }
        assert!(flag.load(Ordering::Acquire));
        assert_eq!(pool.idle_count(), 1);

        let _again = pool.acquire().unwrap();
        assert_eq!(pool.created_count(), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_returned_stream_keeps_worker() {
        let pool = Arc::new(StreamPool::new());
        let id = {
            let stream = pool.acquire().unwrap();
            stream.enqueue(|| {}).unwrap();
            stream.id()
        };
        let stream = pool.acquire().unwrap();
        assert_eq!(stream.id(), id);
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        stream.enqueue(move || r.store(true, Ordering::Release)).unwrap();
        stream.synchronize().unwrap();
        assert!(ran.load(Ordering::Acquire));
    }

    #[test]
    fn test_failed_stream_not_returned() {
        let pool = Arc::new(StreamPool::new());
        {
            let stream = pool.acquire().unwrap();
            stream.enqueue(|| panic!("boom")).unwrap();
        }
        assert_eq!(pool.idle_count(), 0);
        let _fresh = pool.acquire().unwrap();
        assert_eq!(pool.created_count(), 2);
    }
}
