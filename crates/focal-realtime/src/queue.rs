//! Bounded per-connection outbound frame queue.
//!
//! Each live connection owns one queue. Publishers push synchronously and
//! never block: when the queue is full the oldest frame is evicted, so a
//! slow consumer costs itself at most its own backlog. The consumer task
//! awaits [`OutboundQueue::recv`] and terminates once the queue is closed
//! and drained.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

use focal_core::defaults::OUTBOUND_QUEUE_CAPACITY;
use focal_core::DeliveryFrame;

/// Outcome of a non-blocking push.
#[derive(Debug, Clone, PartialEq)]
pub enum PushResult {
    /// Frame enqueued within capacity.
    Enqueued,
    /// Frame enqueued, but the oldest queued frame was evicted to make room.
    Evicted(DeliveryFrame),
    /// Queue is closed; the frame was discarded.
    Closed,
}

/// Bounded FIFO of [`DeliveryFrame`]s with drop-oldest overflow.
pub struct OutboundQueue {
    frames: Mutex<VecDeque<DeliveryFrame>>,
    capacity: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
    notify: Notify,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Push a frame without blocking.
    ///
    /// On overflow the oldest frame is evicted and returned so the caller
    /// can account for the drop; the queue length never exceeds capacity.
    pub fn push(&self, frame: DeliveryFrame) -> PushResult {
        if self.closed.load(Ordering::Acquire) {
            return PushResult::Closed;
        }

        let evicted = {
            let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if frames.len() >= self.capacity {
                frames.pop_front()
            } else {
                None
            };
            frames.push_back(frame);
            evicted
        };

        self.notify.notify_one();

        match evicted {
            Some(old) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushResult::Evicted(old)
            }
            None => PushResult::Enqueued,
        }
    }

    /// Await the next frame.
    ///
    /// Returns `None` only after [`close`](Self::close) once the backlog is
    /// drained; frames queued before the close are still delivered.
    pub async fn recv(&self) -> Option<DeliveryFrame> {
        loop {
            // Register for wakeup before checking state so a concurrent
            // push or close between the check and the await is not missed.
            let notified = self.notify.notified();

            if let Some(frame) = self.try_recv() {
                return Some(frame);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            notified.await;
        }
    }

    /// Pop the next frame if one is queued.
    pub fn try_recv(&self) -> Option<DeliveryFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Close the queue and wake every pending receiver.
    ///
    /// Idempotent. Subsequent pushes return [`PushResult::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total frames evicted over the queue's lifetime.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(OUTBOUND_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for OutboundQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .field("dropped", &self.dropped())
            .finish()
    }
}
