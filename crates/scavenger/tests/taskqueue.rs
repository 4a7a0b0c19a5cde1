//! Work-stealing queue behavior under single-owner and concurrent use

use scavenger::taskqueue::{GenericTaskQueue, OverflowTaskQueue, PopResult, TaskQueueSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_owner_pops_in_lifo_order() {
    let queue = GenericTaskQueue::<u64>::new(8);
    for i in 1..=6 {
        assert!(queue.push(i));
    }
    let popped: Vec<u64> = (0..6).map(|_| queue.pop_local(0).unwrap()).collect();
    assert_eq!(popped, vec![6, 5, 4, 3, 2, 1]);
    assert_eq!(queue.pop_local(0), None);
}

#[test]
fn test_steal_takes_oldest_task() {
    let set = TaskQueueSet::<u64>::new(2, 8);
    for i in 1..=4 {
        set.queue(0).push(i);
    }
    assert_eq!(set.steal(1), Some(1));

    let mut rest: Vec<u64> = std::iter::from_fn(|| set.queue(0).pop_local(0)).collect();
    rest.sort_unstable();
    assert_eq!(rest, vec![2, 3, 4]);
    assert_eq!(set.steal(1), None);
}

#[test]
fn test_pop_local_respects_threshold() {
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
fn test_bounded_queue_rejects_push_when_full() {
    let queue = GenericTaskQueue::<u64>::new(8);
    let accepted = (0..10).filter(|&i| queue.push(i)).count();
    assert_eq!(accepted, queue.max_elems());
    assert_eq!(queue.size(), 6);

    // Room again after one pop
    queue.pop_local(0).unwrap();
    assert!(queue.push(99));
    assert!(!queue.push(100));
}

#[test]
fn test_overflow_keeps_every_task() {
    let queue = OverflowTaskQueue::<u64>::new(8);
    for i in 0..20 {
        queue.push(i);
    }
    assert_eq!(queue.size(), 6);
    assert_eq!(queue.overflow_len(), 14);

    let mut popped = Vec::new();
    while let Some(task) = queue.pop_overflow() {
        popped.push(task);
    }
    while let Some(task) = queue.pop_local(0) {
        popped.push(task);
    }
    popped.sort_unstable();
    assert_eq!(popped, (0..20).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[test]
fn test_empty_set_steal_reports_nothing() {
    let set = TaskQueueSet::<u64>::new(4, 16);
    assert_eq!(set.steal_best_of_2(0), PopResult::Empty);
    assert_eq!(set.steal(2), None);
    assert_eq!(set.tasks(), 0);
}

#[test]
fn test_single_queue_never_steals() {
    let set = TaskQueueSet::<u64>::new(1, 16);
    set.queue(0).push(7);
    assert_eq!(set.steal_best_of_2(0), PopResult::Empty);
    assert_eq!(set.queue(0).pop_local(0), Some(7));
}

#[test]
fn test_concurrent_steals_conserve_tasks() {
    const TASKS: u64 = 20_000;
    const THIEVES: usize = 3;

    let set = Arc::new(TaskQueueSet::<u64>::new(THIEVES + 1, 64));
    let done = Arc::new(AtomicBool::new(false));

    let thieves: Vec<_> = (1..=THIEVES)
        .map(|id| {
            let set = Arc::clone(&set);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut stolen = Vec::new();
                loop {
                    match set.steal(id) {
                        Some(task) => stolen.push(task),
                        None if done.load(Ordering::Acquire) => break,
                        None => thread::yield_now(),
                    }
                }
                stolen
            })
        })
        .collect();

    let owner = set.queue(0);
    let mut mine = Vec::new();
    for i in 0..TASKS {
        owner.push(i);
        // Keep some tasks local so the owner races thieves for the last one
        if i % 3 == 0 {
            if let Some(task) = owner.pop_local(0) {
                mine.push(task);
            }
        }
    }
    loop {
        while let Some(task) = owner.pop_overflow() {
            mine.push(task);
        }
        while let Some(task) = owner.pop_local(0) {
            mine.push(task);
        }
        if owner.is_empty() {
            break;
        }
    }
    done.store(true, Ordering::Release);

    let mut counts: HashMap<u64, usize> = HashMap::new();
    for task in mine
        .into_iter()
        .chain(thieves.into_iter().flat_map(|t| t.join().unwrap()))
    {
        *counts.entry(task).or_default() += 1;
    }
    assert_eq!(counts.len(), TASKS as usize);
    assert!(counts.values().all(|&n| n == 1), "a task was popped twice");
}
