//! Overflow Task Queue - Bounded Deque Backed by an Unbounded Stack
//!
//! Pushing never fails: when the bounded deque is full, tasks spill onto an
//! owner-only LIFO stack. Stealers only ever see the bounded part.

use super::{GenericTaskQueue, PopResult, QueueElement, TaskQueueStats};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct OverflowTaskQueue<E> {
    queue: GenericTaskQueue<E>,
    overflow: Mutex<Vec<E>>,
    overflow_len: AtomicUsize,
}

impl<E: QueueElement> OverflowTaskQueue<E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: GenericTaskQueue::new(capacity),
            overflow: Mutex::new(Vec::new()),
            overflow_len: AtomicUsize::new(0),
        }
    }

    pub fn task_queue(&self) -> &GenericTaskQueue<E> {
        &self.queue
    }

    pub fn stats(&self) -> &TaskQueueStats {
        self.queue.stats()
    }

    /// Owner push; spills to the overflow stack when the deque is full
    pub fn push(&self, task: E) {
        if !self.queue.push(task) {
            let mut overflow = self.overflow.lock();
            overflow.push(task);
            self.overflow_len.store(overflow.len(), Ordering::Relaxed);
            self.queue.stats().record_overflow(overflow.len());
        }
    }

    /// Owner push into the bounded deque only
    pub fn try_push_to_taskqueue(&self, task: E) -> bool {
        self.queue.push(task)
    }

    pub fn pop_local(&self, threshold: usize) -> Option<E> {
        self.queue.pop_local(threshold)
    }

    /// Owner pop from the overflow stack (LIFO)
    pub fn pop_overflow(&self) -> Option<E> {
        if self.overflow_empty() {
            return None;
        }
        let mut overflow = self.overflow.lock();
        let task = overflow.pop();
        self.overflow_len.store(overflow.len(), Ordering::Relaxed);
        task
    }

    pub fn pop_global(&self) -> PopResult<E> {
        self.queue.pop_global()
    }

    pub fn overflow_empty(&self) -> bool {
        self.overflow_len.load(Ordering::Relaxed) == 0
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow_len.load(Ordering::Relaxed)
    }

    /// Elements in the bounded deque
    pub fn size(&self) -> usize {
        self.queue.size()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.overflow_empty()
    }
}

impl<E> std::fmt::Debug for OverflowTaskQueue<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverflowTaskQueue")
            .field("queue", &self.queue)
            .field("overflow_len", &self.overflow_len.load(Ordering::Relaxed))
            .finish()
    }
}
