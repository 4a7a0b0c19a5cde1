//! Task Terminator - Distributed Termination for Work Stealing
//!
//! A worker that found no work anywhere *offers* termination. Once all `N`
//! workers have offered, every queue is empty and no worker can produce
//! more work, so the phase is over. An offering worker that sees stealable
//! work withdraws its offer and goes back to stealing.

use super::{QueueElement, TaskQueueSet};
use crossbeam::utils::{Backoff, CachePadded};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const SLEEP_WHILE_OFFERED: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct TaskTerminator {
    n_threads: usize,
    offered: CachePadded<AtomicUsize>,
}

impl TaskTerminator {
    pub fn new(n_threads: usize) -> Self {
        assert!(n_threads > 0, "terminator needs at least one thread");
        Self {
            n_threads,
            offered: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Number of workers currently offering termination
    pub fn offered(&self) -> usize {
        self.offered.load(Ordering::SeqCst)
    }

    /// Offer termination; true once every worker has offered
    ///
    /// Returns false when work showed up in `queues`; the caller must go
    /// back to stealing.
    pub fn offer_termination<E: QueueElement>(&self, queues: &TaskQueueSet<E>) -> bool {
        if self.offered.fetch_add(1, Ordering::SeqCst) + 1 == self.n_threads {
            return true;
        }

        let backoff = Backoff::new();
        loop {
            if self.offered.load(Ordering::SeqCst) == self.n_threads {
                return true;
            }

            if queues.tasks() > 0 {
                // Withdraw unless everyone offered in the meantime
                let withdrawn = self.offered.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                    if c == self.n_threads {
                        None
                    } else {
                        Some(c - 1)
                    }
                });
                return withdrawn.is_err();
            }

            if backoff.is_completed() {
                thread::sleep(SLEEP_WHILE_OFFERED);
            } else {
                backoff.snooze();
            }
        }
    }

    /// Prepare for another parallel phase
    pub fn reset_for_reuse(&mut self) {
        debug_assert!(
            *self.offered.get_mut() == 0 || *self.offered.get_mut() == self.n_threads,
            "terminator reset while workers are active"
        );
        *self.offered.get_mut() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_single_thread_terminates_immediately() {
        let set = TaskQueueSet::<u64>::new(1, 8);
        let term = TaskTerminator::new(1);
        assert!(term.offer_termination(&set));
    }

    #[test]
    fn test_withdraws_when_work_appears() {
        let set = TaskQueueSet::<u64>::new(2, 8);
        set.queue(1).push(3);
        let term = TaskTerminator::new(2);
        assert!(!term.offer_termination(&set));
        assert_eq!(term.offered(), 0);
    }

    #[test]
    fn test_all_threads_terminate() {
        let set = Arc::new(TaskQueueSet::<u64>::new(4, 8));
        let term = Arc::new(TaskTerminator::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let set = Arc::clone(&set);
                let term = Arc::clone(&term);
                thread::spawn(move || term.offer_termination(&set))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_reset_for_reuse() {
        let set = TaskQueueSet::<u64>::new(1, 8);
        let mut term = TaskTerminator::new(1);
        assert!(term.offer_termination(&set));
        term.reset_for_reuse();
        assert_eq!(term.offered(), 0);
    }
}
