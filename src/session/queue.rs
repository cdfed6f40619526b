//! Asynchronous rendezvous FIFO for streaming messages.
//!
//! Buffers items when the producer runs ahead, buffers waiters when the
//! consumer runs ahead; the two never coexist. Order is preserved across
//! all accepted items regardless of which side arrives first: a waiting
//! consumer receives a produced item directly, bypassing the buffer, which
//! keeps latency minimal in the empty-queue steady state.

use crate::error::{LiveloopError, Result};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;

struct Inner<T> {
    buffer: VecDeque<T>,
    waiters: VecDeque<oneshot::Sender<Result<T>>>,
}

/// Unbounded async FIFO with a cancellation mode that fails all waiters.
pub struct AsyncQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: VecDeque::new(),
                waiters: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A poisoned lock only means a panic elsewhere; queue state is
        // still coherent because every mutation is a single push/pop
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enqueues an item, delivering directly to the longest-waiting
    /// consumer when one exists.
    pub fn put(&self, item: T) {
        let mut inner = self.lock();
        let mut item = item;
        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(Ok(item)) {
                Ok(()) => return,
                // Receiver dropped (cancelled get); reclaim and try the next
                Err(Ok(reclaimed)) => item = reclaimed,
                Err(Err(_)) => return,
            }
        }
        inner.buffer.push_back(item);
    }

    /// Dequeues the next item in strict arrival order, suspending until one
    /// is produced.
    ///
    /// # Errors
    /// [`LiveloopError::QueueCleared`] when [`clear`](Self::clear) fails the
    /// wait, distinguishable from any transport failure.
    pub async fn get(&self) -> Result<T> {
        let rx = {
            let mut inner = self.lock();
            if let Some(item) = inner.buffer.pop_front() {
                return Ok(item);
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            rx
        };
        // Sender dropped without resolving also counts as cleared
        // (the queue itself was dropped mid-wait)
        rx.await.unwrap_or(Err(LiveloopError::QueueCleared))
    }

    /// Empties the buffer and rejects every waiting consumer with
    /// [`LiveloopError::QueueCleared`]. Safe with no waiters; the queue
    /// behaves as fresh afterwards.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.buffer.clear();
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(Err(LiveloopError::QueueCleared));
        }
    }

    /// Number of buffered (not yet consumed) items.
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }
}
