//! Preserved Marks - Headers Saved Across Self-Forwarding
//!
//! An object that cannot be copied is forwarded to itself, which
//! overwrites its header. Headers carrying information (a lock or an
//! identity hash) are saved here and written back after the pause; all
//! other self-forwarded objects get a fresh prototype header.

use crate::heap::Heap;
use crate::object::{MarkWord, ObjRef};
use parking_lot::Mutex;

/// Per-worker stack of saved headers
#[derive(Debug, Default)]
pub struct PreservedMarks {
    stack: Vec<(ObjRef, MarkWord)>,
}

impl PreservedMarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save `mark` if it cannot be recreated from the prototype
    pub fn push_if_necessary(&mut self, obj: ObjRef, mark: MarkWord) {
        if mark.must_be_preserved() {
            self.stack.push((obj, mark));
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Write every saved header back; returns how many were restored
    pub fn restore(&mut self, heap: &Heap) -> usize {
        let count = self.stack.len();
        for (obj, mark) in self.stack.drain(..) {
            heap.set_mark(obj, mark);
        }
        count
    }
}

/// Stacks handed over by the workers at flush time
#[derive(Debug, Default)]
pub struct PreservedMarksSet {
    stacks: Mutex<Vec<PreservedMarks>>,
}

impl PreservedMarksSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, marks: PreservedMarks) {
        if !marks.is_empty() {
            self.stacks.lock().push(marks);
        }
    }

    pub fn len(&self) -> usize {
        self.stacks.lock().iter().map(PreservedMarks::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn restore(&self, heap: &Heap) -> usize {
        let mut stacks = std::mem::take(&mut *self.stacks.lock());
        let restored: usize = stacks.iter_mut().map(|marks| marks.restore(heap)).sum();
        if restored > 0 {
            log::debug!("Restored {} preserved marks", restored);
        }
        restored
    }
}
