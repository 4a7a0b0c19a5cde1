//! Task Queue Module - Work-Stealing Deques for Parallel Evacuation
//!
//! Each GC worker owns one [`OverflowTaskQueue`]. The owner pushes and pops
//! at the *bottom*; any other worker steals from the *top*.
//!
//! ```text
//!            top (Age: {top, tag})                 bottom
//!             │                                      │
//!   ┌────┬────▼───┬────────┬────────┬────────┬───────▼┬────┐
//!   │    │ task 0 │ task 1 │ task 2 │ task 3 │        │    │   N slots (power of two)
//!   └────┴────────┴────────┴────────┴────────┴────────┴────┘
//!          ▲ pop_global (strangers)       push/pop_local ▲ (owner)
//! ```
//!
//! The *Age* word packs `top` and an ABA `tag` into one `u64` so a stealer's
//! CAS fails if the owner emptied and refilled the queue in between. The
//! queue never holds more than `N - 2` elements, so the distance
//! `bottom - top` (mod N) distinguishes empty from full and the transient
//! `N - 1` state seen during a racing `pop_local` reads as empty.
//!
//! # Memory Ordering Model
//!
//! - **Age / bottom:** `SeqCst` on every contended access, with full fences
//!   between the owner's bottom decrement and its top read, and between a
//!   stealer's age read and its bottom read.
//! - **Element slots:** `Relaxed`; publication happens through the release
//!   store of `bottom` and the acquire load by stealers.

mod overflow;
mod set;
mod terminator;

pub use overflow::OverflowTaskQueue;
pub use set::TaskQueueSet;
pub use terminator::TaskTerminator;

use crossbeam::utils::CachePadded;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Element stored in a task queue, packed into one word
pub trait QueueElement: Copy + Send {
    fn encode(self) -> u64;
    fn decode(raw: u64) -> Self;
}

impl QueueElement for u64 {
    #[inline]
    fn encode(self) -> u64 {
        self
    }

    #[inline]
    fn decode(raw: u64) -> Self {
        raw
    }
}

impl QueueElement for usize {
    #[inline]
    fn encode(self) -> u64 {
        self as u64
    }

    #[inline]
    fn decode(raw: u64) -> Self {
        raw as usize
    }
}

/// Outcome of a steal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopResult<E> {
    /// The queue had no elements
    Empty,
    /// Another thread won the race for the top element
    Contended,
    Success(E),
}

impl<E> PopResult<E> {
    pub fn success(self) -> Option<E> {
        match self {
            PopResult::Success(e) => Some(e),
            _ => None,
        }
    }
}

/// `{top, tag}` pair guarding the steal end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Age {
    top: u32,
    tag: u32,
}

impl Age {
    #[inline]
    fn pack(self) -> u64 {
        ((self.tag as u64) << 32) | self.top as u64
    }

    #[inline]
    fn unpack(raw: u64) -> Self {
        Age {
            top: raw as u32,
            tag: (raw >> 32) as u32,
        }
    }

    /// Advance top; bump the tag when top wraps to 0
    #[inline]
    fn increment(self, mask: u32) -> Self {
        let top = (self.top + 1) & mask;
        let tag = if top == 0 {
            self.tag.wrapping_add(1)
        } else {
            self.tag
        };
        Age { top, tag }
    }
}

const INVALID_QUEUE_ID: u32 = u32::MAX;

/// Per-queue operation counters
#[derive(Debug, Default)]
pub struct TaskQueueStats {
    push: AtomicUsize,
    pop: AtomicUsize,
    pop_slow: AtomicUsize,
    steal_attempt: AtomicUsize,
    steal: AtomicUsize,
    overflow: AtomicUsize,
    overflow_max_len: AtomicUsize,
}

/// Snapshot of [`TaskQueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskQueueStatsSnapshot {
    pub push: usize,
    pub pop: usize,
    pub pop_slow: usize,
    pub steal_attempt: usize,
    pub steal: usize,
    pub overflow: usize,
    pub overflow_max_len: usize,
}

impl TaskQueueStats {
    #[inline]
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_push(&self) {
        Self::bump(&self.push)
    }

    pub(crate) fn record_pop(&self) {
        Self::bump(&self.pop)
    }

    pub(crate) fn record_pop_slow(&self) {
        Self::bump(&self.pop_slow)
    }

    pub(crate) fn record_steal_attempt(&self) {
        Self::bump(&self.steal_attempt)
    }

    pub(crate) fn record_steal(&self) {
        Self::bump(&self.steal)
    }

    pub(crate) fn record_overflow(&self, len: usize) {
        Self::bump(&self.overflow);
        self.overflow_max_len.fetch_max(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TaskQueueStatsSnapshot {
        TaskQueueStatsSnapshot {
            push: self.push.load(Ordering::Relaxed),
            pop: self.pop.load(Ordering::Relaxed),
            pop_slow: self.pop_slow.load(Ordering::Relaxed),
            steal_attempt: self.steal_attempt.load(Ordering::Relaxed),
            steal: self.steal.load(Ordering::Relaxed),
            overflow: self.overflow.load(Ordering::Relaxed),
            overflow_max_len: self.overflow_max_len.load(Ordering::Relaxed),
        }
    }
}

impl std::ops::AddAssign for TaskQueueStatsSnapshot {
    fn add_assign(&mut self, other: Self) {
        self.push += other.push;
        self.pop += other.pop;
        self.pop_slow += other.pop_slow;
        self.steal_attempt += other.steal_attempt;
        self.steal += other.steal;
        self.overflow += other.overflow;
        self.overflow_max_len = self.overflow_max_len.max(other.overflow_max_len);
    }
}

/// Bounded lock-free work-stealing deque
///
/// `push` and `pop_local` must only be called by the owning worker;
/// `pop_global` may be called by any thread.
pub struct GenericTaskQueue<E> {
    bottom: CachePadded<AtomicU32>,
    age: CachePadded<AtomicU64>,
    elems: Box<[AtomicU64]>,
    mask: u32,
    last_stolen_queue_id: AtomicU32,
    stats: TaskQueueStats,
    _marker: PhantomData<fn() -> E>,
}

impl<E: QueueElement> GenericTaskQueue<E> {
    /// Create a queue with `capacity` slots (power of two, at least 4)
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 4 && capacity <= (1 << 30),
            "task queue capacity must be a power of two in 4..=2^30, got {}",
            capacity
        );
        Self {
            bottom: CachePadded::new(AtomicU32::new(0)),
            age: CachePadded::new(AtomicU64::new(0)),
            elems: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            mask: (capacity - 1) as u32,
            last_stolen_queue_id: AtomicU32::new(INVALID_QUEUE_ID),
            stats: TaskQueueStats::default(),
            _marker: PhantomData,
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.mask as usize + 1
    }

    /// Most elements the queue holds at once
    pub fn max_elems(&self) -> usize {
        self.capacity() - 2
    }

    pub fn stats(&self) -> &TaskQueueStats {
        &self.stats
    }

    #[inline]
    fn increment_index(&self, index: u32) -> u32 {
        (index + 1) & self.mask
    }

    #[inline]
    fn decrement_index(&self, index: u32) -> u32 {
        index.wrapping_sub(1) & self.mask
    }

    /// Distance from top to bottom; `N - 1` during a racing pop
    #[inline]
    fn dirty_size(&self, bottom: u32, top: u32) -> u32 {
        bottom.wrapping_sub(top) & self.mask
    }

    /// Like `dirty_size`, but the transient `N - 1` reads as empty
    #[inline]
    fn clean_size(&self, bottom: u32, top: u32) -> u32 {
        let size = self.dirty_size(bottom, top);
        if size == self.mask {
            0
        } else {
            size
        }
    }

    #[inline]
    fn age_relaxed(&self) -> Age {
        Age::unpack(self.age.load(Ordering::Relaxed))
    }

    /// Approximate number of elements
    pub fn size(&self) -> usize {
        let top = self.age_relaxed().top;
        self.clean_size(self.bottom.load(Ordering::Relaxed), top) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Owner push; false when the queue holds `max_elems` elements
    pub fn push(&self, task: E) -> bool {
        let local_bot = self.bottom.load(Ordering::Relaxed);
        let top = self.age_relaxed().top;
        let dirty = self.dirty_size(local_bot, top);
        debug_assert!(dirty != self.mask, "push on a queue in the transient state");
        if (dirty as usize) < self.max_elems() {
            self.elems[local_bot as usize].store(task.encode(), Ordering::Relaxed);
            self.bottom
                .store(self.increment_index(local_bot), Ordering::SeqCst);
            self.stats.record_push();
            true
        } else {
            false
        }
    }

    /// Owner pop from the bottom, leaving at least `threshold` elements
    pub fn pop_local(&self, threshold: usize) -> Option<E> {
        let mut local_bot = self.bottom.load(Ordering::Relaxed);
        let dirty = self.dirty_size(local_bot, self.age_relaxed().top);
        debug_assert!(dirty != self.mask);
        if dirty as usize <= threshold {
            return None;
        }

        local_bot = self.decrement_index(local_bot);
        self.bottom.store(local_bot, Ordering::SeqCst);
        // Stealers must see the new bottom before we read top
        fence(Ordering::SeqCst);

        let raw = self.elems[local_bot as usize].load(Ordering::Relaxed);
        let top = self.age_relaxed().top;
        if self.clean_size(local_bot, top) > 0 {
            self.stats.record_pop();
            return Some(E::decode(raw));
        }

        // Exactly one element was present; race stealers for it
        let old_age = Age::unpack(self.age.load(Ordering::SeqCst));
        if self.pop_local_slow(local_bot, old_age) {
            self.stats.record_pop_slow();
            Some(E::decode(raw))
        } else {
            None
        }
    }

    /// Resolve the one-element race; leaves the queue empty either way
    fn pop_local_slow(&self, local_bot: u32, old_age: Age) -> bool {
        let new_age = Age {
            top: local_bot,
            tag: old_age.tag.wrapping_add(1),
        };
        if local_bot == old_age.top
            && self
                .age
                .compare_exchange(
                    old_age.pack(),
                    new_age.pack(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
        {
            return true;
        }
        // A stealer took the element; publish the canonical empty state
        self.age.store(new_age.pack(), Ordering::SeqCst);
        false
    }

    /// Steal from the top
    pub fn pop_global(&self) -> PopResult<E> {
        let old_age = Age::unpack(self.age.load(Ordering::SeqCst));
        fence(Ordering::SeqCst);
        let local_bot = self.bottom.load(Ordering::Acquire);
        if self.clean_size(local_bot, old_age.top) == 0 {
            return PopResult::Empty;
        }

        let raw = self.elems[old_age.top as usize].load(Ordering::Relaxed);
        let new_age = old_age.increment(self.mask);
        match self.age.compare_exchange(
            old_age.pack(),
            new_age.pack(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => PopResult::Success(E::decode(raw)),
            Err(_) => PopResult::Contended,
        }
    }

    pub(crate) fn last_stolen_queue_id(&self) -> Option<usize> {
        match self.last_stolen_queue_id.load(Ordering::Relaxed) {
            INVALID_QUEUE_ID => None,
            id => Some(id as usize),
        }
    }

    pub(crate) fn set_last_stolen_queue_id(&self, id: usize) {
        self.last_stolen_queue_id
            .store(id as u32, Ordering::Relaxed);
    }

    pub(crate) fn invalidate_last_stolen_queue_id(&self) {
        self.last_stolen_queue_id
            .store(INVALID_QUEUE_ID, Ordering::Relaxed);
    }
}

impl<E> fmt::Debug for GenericTaskQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let age = Age::unpack(self.age.load(Ordering::Relaxed));
        f.debug_struct("GenericTaskQueue")
            .field("capacity", &(self.mask as usize + 1))
            .field("bottom", &self.bottom.load(Ordering::Relaxed))
            .field("top", &age.top)
            .field("tag", &age.tag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_age_increment_wraps_with_tag() {
        let age = Age { top: 7, tag: 3 };
        assert_eq!(age.increment(7), Age { top: 0, tag: 4 });
        assert_eq!(Age { top: 2, tag: 3 }.increment(7), Age { top: 3, tag: 3 });
        assert_eq!(Age::unpack(age.pack()), age);
    }

    #[test]
    fn test_lifo_owner_order() {
        let queue = GenericTaskQueue::<u64>::new(8);
        for i in 1..=3 {
            assert!(queue.push(i));
        }
        assert_eq!(queue.pop_local(0), Some(3));
        assert_eq!(queue.pop_local(0), Some(2));
        assert_eq!(queue.pop_local(0), Some(1));
        assert_eq!(queue.pop_local(0), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_fails_at_n_minus_two() {
        let queue = GenericTaskQueue::<u64>::new(8);
        for i in 0..6 {
            assert!(queue.push(i), "push {} should succeed", i);
        }
        assert!(!queue.push(6));
        assert_eq!(queue.size(), 6);
        assert_eq!(queue.max_elems(), 6);
    }

    #[test]
    fn test_pop_local_keeps_threshold() {
        let queue = GenericTaskQueue::<u64>::new(16);
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.pop_local(3), Some(4));
        assert_eq!(queue.pop_local(3), Some(3));
        assert_eq!(queue.pop_local(3), None);
        assert_eq!(queue.size(), 3);
    }

    #[test]
    fn test_steal_takes_oldest() {
        let queue = GenericTaskQueue::<u64>::new(8);
        for i in 1..=4 {
            queue.push(i);
        }
        assert_eq!(queue.pop_global(), PopResult::Success(1));
        assert_eq!(queue.pop_local(0), Some(4));
        assert_eq!(queue.pop_local(0), Some(3));
        assert_eq!(queue.pop_local(0), Some(2));
        assert_eq!(queue.pop_global(), PopResult::Empty);
    }

    #[test]
    fn test_single_element_pop_resets_age() {
        let queue = GenericTaskQueue::<u64>::new(4);
        for round in 0..10u64 {
            assert!(queue.push(round));
            assert_eq!(queue.pop_local(0), Some(round));
            assert!(queue.is_empty());
        }
        // Tag advanced on each slow-path pop
        assert_eq!(queue.age_relaxed().tag, 10);
    }

    #[test]
    fn test_wraparound_steals() {
        let queue = GenericTaskQueue::<u64>::new(4);
        let mut next = 0u64;
        let mut stolen = Vec::new();
        for _ in 0..10 {
            queue.push(next);
            queue.push(next + 1);
            next += 2;
            while let PopResult::Success(v) = queue.pop_global() {
                stolen.push(v);
            }
        }
        assert_eq!(stolen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrent_conservation() {
        const ITEMS: u64 = 20_000;
        let queue = Arc::new(GenericTaskQueue::<u64>::new(256));
        let barrier = Arc::new(Barrier::new(4));
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let stealers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    barrier.wait();
                    let mut got = Vec::new();
                    loop {
                        match queue.pop_global() {
                            PopResult::Success(v) => got.push(v),
                            PopResult::Contended => continue,
                            PopResult::Empty => {
                                if done.load(Ordering::Acquire) && queue.is_empty() {
                                    break;
                                }
                                thread::yield_now();
                            }
                        }
                    }
                    got
                })
            })
            .collect();

        barrier.wait();
        let mut owner_got = Vec::new();
        let mut next = 0;
        while next < ITEMS {
            if queue.push(next) {
                next += 1;
            } else if let Some(v) = queue.pop_local(0) {
                owner_got.push(v);
            }
            if next % 7 == 0 {
                if let Some(v) = queue.pop_local(0) {
                    owner_got.push(v);
                }
            }
        }
        while let Some(v) = queue.pop_local(0) {
            owner_got.push(v);
        }
        done.store(true, Ordering::Release);

        let mut all = owner_got;
        for handle in stealers {
            all.extend(handle.join().unwrap());
        }
        all.sort_unstable();
        assert_eq!(all.len() as u64, ITEMS, "every task consumed exactly once");
        assert!(all.iter().copied().eq(0..ITEMS));
    }
}
