//! Scanner Tasks - Units of Work in the Evacuation Queues
//!
//! A task is either a reference slot still to be evacuated or a
//! continuation of a large object array. Tasks are packed into one `u64`
//! so the work-stealing queues stay lock-free:
//!
//! ```text
//!  63                               2  1 0
//! ┌───────────────────────────────────┬────┐
//! │ wide slot address                 │ 00 │  Oop
//! │ narrow slot (half-word) address   │ 01 │  NarrowOop
//! │ start (30 bits) │ array (32 bits) │ 10 │  PartialArray
//! └───────────────────────────────────┴────┘
//! ```

use crate::object::{NarrowSlot, ObjRef, WideSlot};
use crate::taskqueue::QueueElement;

const TAG_BITS: u32 = 2;
const TAG_MASK: u64 = (1 << TAG_BITS) - 1;
const TAG_OOP: u64 = 0;
const TAG_NARROW_OOP: u64 = 1;
const TAG_PARTIAL_ARRAY: u64 = 2;

const ARRAY_BITS: u32 = 32;
const ARRAY_MASK: u64 = (1 << ARRAY_BITS) - 1;
const START_SHIFT: u32 = TAG_BITS + ARRAY_BITS;

/// Next chunk of a large object array
///
/// `array` is the from-space object; its length field still holds the
/// real length while the to-space copy is being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialArrayTask {
    pub array: ObjRef,
    pub start: usize,
}

impl PartialArrayTask {
    pub fn new(array: ObjRef, start: usize) -> Self {
        Self { array, start }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerTask {
    Oop(WideSlot),
    NarrowOop(NarrowSlot),
    PartialArray(PartialArrayTask),
}

impl From<WideSlot> for ScannerTask {
    fn from(slot: WideSlot) -> Self {
        ScannerTask::Oop(slot)
    }
}

impl From<NarrowSlot> for ScannerTask {
    fn from(slot: NarrowSlot) -> Self {
        ScannerTask::NarrowOop(slot)
    }
}

impl From<PartialArrayTask> for ScannerTask {
    fn from(task: PartialArrayTask) -> Self {
        ScannerTask::PartialArray(task)
    }
}

impl QueueElement for ScannerTask {
    #[inline]
    fn encode(self) -> u64 {
        match self {
            ScannerTask::Oop(slot) => ((slot.0 as u64) << TAG_BITS) | TAG_OOP,
            ScannerTask::NarrowOop(slot) => ((slot.0 as u64) << TAG_BITS) | TAG_NARROW_OOP,
            ScannerTask::PartialArray(task) => {
                debug_assert!(task.array.index() as u64 <= ARRAY_MASK);
                debug_assert!(task.start <= crate::object::MAX_ARRAY_LENGTH);
                ((task.start as u64) << START_SHIFT)
                    | ((task.array.index() as u64) << TAG_BITS)
                    | TAG_PARTIAL_ARRAY
            }
        }
    }

    #[inline]
    fn decode(raw: u64) -> Self {
        match raw & TAG_MASK {
            TAG_OOP => ScannerTask::Oop(WideSlot((raw >> TAG_BITS) as usize)),
            TAG_NARROW_OOP => ScannerTask::NarrowOop(NarrowSlot((raw >> TAG_BITS) as usize)),
            _ => {
                let index = ((raw >> TAG_BITS) & ARRAY_MASK) as usize;
                let start = (raw >> START_SHIFT) as usize;
                match ObjRef::from_index(index) {
                    Some(array) => ScannerTask::PartialArray(PartialArrayTask { array, start }),
                    None => unreachable!("partial-array task without an array: {:#x}", raw),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_array_keeps_both_fields() {
        let array = ObjRef::from_index(0xdead_beef).unwrap();
        let task = ScannerTask::PartialArray(PartialArrayTask::new(array, (1 << 30) - 1));
        assert_eq!(ScannerTask::decode(task.encode()), task);
    }

    #[test]
    fn test_slot_tags_are_distinct() {
        let wide = ScannerTask::from(WideSlot(40)).encode();
        let narrow = ScannerTask::from(NarrowSlot(40)).encode();
        assert_ne!(wide, narrow);
        assert_eq!(ScannerTask::decode(narrow), ScannerTask::NarrowOop(NarrowSlot(40)));
    }

    #[test]
    fn test_tasks_flow_through_queue() {
        let queue = crate::taskqueue::GenericTaskQueue::<ScannerTask>::new(8);
        let array = ObjRef::from_index(64).unwrap();
        assert!(queue.push(ScannerTask::from(WideSlot(9))));
        assert!(queue.push(ScannerTask::from(PartialArrayTask::new(array, 50))));
        assert_eq!(
            queue.pop_local(0),
            Some(ScannerTask::PartialArray(PartialArrayTask::new(array, 50)))
        );
        assert_eq!(queue.pop_local(0), Some(ScannerTask::Oop(WideSlot(9))));
    }
}
