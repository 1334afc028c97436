//! Bounded FIFO queue between callers and the serial listener.
//!
//! Producers either wait for space ([`Fifo::push`]) or fail fast
//! ([`Fifo::try_push`]). The single consumer waits in [`Fifo::pop`] until an
//! item arrives or the queue is closed and drained.

use crate::error::{SpectroError, SpectroResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded, closable, async-aware FIFO.
pub struct Fifo<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> Fifo<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Whether [`Fifo::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Enqueue without waiting.
    ///
    /// # Errors
    /// `QueueFull` at capacity, `QueueClosed` after close.
    pub fn try_push(&self, item: T) -> SpectroResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SpectroError::QueueClosed);
        }
        if state.items.len() >= self.capacity {
            return Err(SpectroError::QueueFull(self.capacity));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue, waiting for space if the queue is full.
    ///
    /// # Errors
    /// `QueueClosed` if the queue is closed before space frees up.
    pub async fn push(&self, item: T) -> SpectroResult<()> {
        loop {
            let space = self.not_full.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(SpectroError::QueueClosed);
                }
                if state.items.len() < self.capacity {
                    state.items.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            space.await;
        }
    }

    /// Dequeue, waiting for an item.
    ///
    /// Returns `None` once the queue is closed and every queued item has been
    /// handed out.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let arrival = self.not_empty.notified();
            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            arrival.await;
        }
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Close the queue. Queued items can still be popped; pushes fail.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }
}

impl<T> std::fmt::Debug for Fifo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Fifo")
            .field("len", &state.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}
