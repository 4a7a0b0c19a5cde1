//! Task Queue Set - Victim Selection for Work Stealing
//!
//! Stealing uses *best of two*: sample two random victims and steal from the
//! one with more queued tasks. A worker keeps stealing from its last
//! successful victim until that victim runs dry.

use super::{OverflowTaskQueue, PopResult, QueueElement, TaskQueueStatsSnapshot};
use rand::Rng;

/// One queue per worker
pub struct TaskQueueSet<E> {
    queues: Vec<OverflowTaskQueue<E>>,
}

impl<E: QueueElement> TaskQueueSet<E> {
    pub fn new(workers: usize, capacity: usize) -> Self {
        assert!(workers > 0, "task queue set needs at least one queue");
        Self {
            queues: (0..workers)
                .map(|_| OverflowTaskQueue::new(capacity))
                .collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.queues.len()
    }

    pub fn queue(&self, index: usize) -> &OverflowTaskQueue<E> {
        &self.queues[index]
    }

    /// Tasks currently visible to stealers across all queues
    pub fn tasks(&self) -> usize {
        self.queues.iter().map(OverflowTaskQueue::size).sum()
    }

    /// True when any queue, overflow included, still holds work
    pub fn has_work(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    pub fn stats(&self) -> TaskQueueStatsSnapshot {
        let mut total = TaskQueueStatsSnapshot::default();
        for queue in &self.queues {
            total += queue.stats().snapshot();
        }
        total
    }

    /// One steal attempt on behalf of `queue_num`
    pub fn steal_best_of_2(&self, queue_num: usize) -> PopResult<E> {
        let num_queues = self.queues.len();
        let local = &self.queues[queue_num];

        if num_queues > 2 {
            let mut rng = rand::thread_rng();
            let k1 = match local.task_queue().last_stolen_queue_id() {
                Some(id) => id,
                None => {
                    let mut k1 = queue_num;
                    while k1 == queue_num {
                        k1 = rng.gen_range(0..num_queues);
                    }
                    k1
                }
            };
            let mut k2 = queue_num;
            while k2 == queue_num || k2 == k1 {
                k2 = rng.gen_range(0..num_queues);
            }

            let sz1 = self.queues[k1].size();
            let sz2 = self.queues[k2].size();

            let (selected, result) = if sz2 > sz1 {
                (k2, self.queues[k2].pop_global())
            } else if sz1 > 0 {
                (k1, self.queues[k1].pop_global())
            } else {
                (k1, PopResult::Empty)
            };

            if matches!(result, PopResult::Success(_)) {
                local.task_queue().set_last_stolen_queue_id(selected);
            } else {
                local.task_queue().invalidate_last_stolen_queue_id();
            }
            result
        } else if num_queues == 2 {
            // Only one possible victim
            self.queues[(queue_num + 1) % 2].pop_global()
        } else {
            PopResult::Empty
        }
    }

    /// Try up to `2 * N` times to steal a task for `queue_num`
    pub fn steal(&self, queue_num: usize) -> Option<E> {
        let attempts = 2 * self.queues.len();
        let stats = self.queues[queue_num].stats();
        for _ in 0..attempts {
            stats.record_steal_attempt();
            if let PopResult::Success(task) = self.steal_best_of_2(queue_num) {
                stats.record_steal();
                return Some(task);
            }
        }
        None
    }
}

impl<E> std::fmt::Debug for TaskQueueSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueueSet")
            .field("queues", &self.queues.len())
            .finish()
    }
}
