//! Mark Word - Object Header Encoding
//!
//! The first word of every object. It carries the lock state, the GC age and
//! the identity hash, and is overwritten with a forwarding reference once the
//! object has been evacuated.
//!
//! ```text
//!  63                            8 7 6   3 2 1 0
//! ┌───────────────────────────────┬─┬─────┬─┬───┐
//! │ identity hash                 │ │ age │ │tag│   unlocked   (tag 01)
//! ├───────────────────────────────┴─┴─────┴─┼───┤
//! │ monitor slot                            │tag│   stack-locked (00) / inflated (10)
//! ├─────────────────────────────────────────┼───┤
//! │ forwardee word index                    │tag│   forwarded  (11)
//! └─────────────────────────────────────────┴───┘
//! ```
//!
//! A locked object keeps its real (unlocked) header in the monitor table;
//! that header is the *displaced mark*. An object forwarded to itself marks a
//! failed evacuation.

use super::ObjRef;
use std::fmt;

const TAG_MASK: u64 = 0b11;
const PAYLOAD_SHIFT: u32 = 2;

const STACK_LOCKED_TAG: u64 = 0b00;
const UNLOCKED_TAG: u64 = 0b01;
const INFLATED_TAG: u64 = 0b10;
const MARKED_TAG: u64 = 0b11;

const AGE_SHIFT: u32 = 3;
const AGE_BITS: u32 = 4;
const AGE_MASK: u64 = ((1 << AGE_BITS) - 1) << AGE_SHIFT;

const HASH_SHIFT: u32 = 8;
const HASH_MASK: u64 = (u32::MAX as u64) << HASH_SHIFT;

/// Oldest age an object can reach
pub const MAX_AGE: u8 = (1 << AGE_BITS) - 1;

/// Decoded view of a mark word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkState {
    Unlocked { hash: u32, age: u8 },
    StackLocked { monitor: usize },
    Inflated { monitor: usize },
    Forwarded(ObjRef),
}

/// Object header word
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkWord(u64);

impl MarkWord {
    /// Header of a freshly allocated object: unlocked, no hash, age 0
    pub const PROTOTYPE: MarkWord = MarkWord(UNLOCKED_TAG);

    /// Header of a one-word filler. Forwarding to word 0 never happens for a
    /// real object.
    pub const FILLER: MarkWord = MarkWord(MARKED_TAG);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        MarkWord(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn unlocked(hash: u32, age: u8) -> Self {
        debug_assert!(age <= MAX_AGE);
        MarkWord(((hash as u64) << HASH_SHIFT) | ((age as u64) << AGE_SHIFT) | UNLOCKED_TAG)
    }

    pub fn stack_locked(monitor: usize) -> Self {
        MarkWord(((monitor as u64) << PAYLOAD_SHIFT) | STACK_LOCKED_TAG)
    }

    pub fn inflated(monitor: usize) -> Self {
        MarkWord(((monitor as u64) << PAYLOAD_SHIFT) | INFLATED_TAG)
    }

    /// Header of an object evacuated to `to`
    #[inline]
    pub fn forwarding_to(to: ObjRef) -> Self {
        MarkWord(((to.index() as u64) << PAYLOAD_SHIFT) | MARKED_TAG)
    }

    #[inline]
    fn tag(self) -> u64 {
        self.0 & TAG_MASK
    }

    #[inline]
    pub fn is_unlocked(self) -> bool {
        self.tag() == UNLOCKED_TAG
    }

    /// True when the header has been replaced by a forwarding reference
    #[inline]
    pub fn is_marked(self) -> bool {
        self.tag() == MARKED_TAG && self != Self::FILLER
    }

    #[inline]
    pub fn is_filler(self) -> bool {
        self == Self::FILLER
    }

    /// True when the real header lives in the monitor table
    #[inline]
    pub fn has_displaced_mark(self) -> bool {
        matches!(self.tag(), STACK_LOCKED_TAG | INFLATED_TAG)
    }

    /// Monitor slot holding the displaced header
    #[inline]
    pub fn monitor_slot(self) -> usize {
        debug_assert!(self.has_displaced_mark());
        (self.0 >> PAYLOAD_SHIFT) as usize
    }

    #[inline]
    pub fn forwardee(self) -> Option<ObjRef> {
        if self.tag() == MARKED_TAG {
            ObjRef::from_index((self.0 >> PAYLOAD_SHIFT) as usize)
        } else {
            None
        }
    }

    /// Age bits of an unlocked header
    #[inline]
    pub fn age(self) -> u8 {
        debug_assert!(self.is_unlocked());
        ((self.0 & AGE_MASK) >> AGE_SHIFT) as u8
    }

    #[inline]
    pub fn with_age(self, age: u8) -> Self {
        debug_assert!(self.is_unlocked());
        debug_assert!(age <= MAX_AGE);
        MarkWord((self.0 & !AGE_MASK) | ((age as u64) << AGE_SHIFT))
    }

    /// Age one older, saturating at [`MAX_AGE`]
    #[inline]
    pub fn incr_age(self) -> Self {
        let age = self.age();
        if age < MAX_AGE {
            self.with_age(age + 1)
        } else {
            self
        }
    }

    #[inline]
    pub fn hash(self) -> u32 {
        debug_assert!(self.is_unlocked());
        ((self.0 & HASH_MASK) >> HASH_SHIFT) as u32
    }

    pub fn with_hash(self, hash: u32) -> Self {
        debug_assert!(self.is_unlocked());
        MarkWord((self.0 & !HASH_MASK) | ((hash as u64) << HASH_SHIFT))
    }

    /// Whether a self-forwarded object must have this header saved
    ///
    /// Headers equal to the prototype up to age are rebuilt on restore.
    pub fn must_be_preserved(self) -> bool {
        !self.is_unlocked() || self.hash() != 0
    }

    pub fn decode(self) -> MarkState {
        match self.tag() {
            UNLOCKED_TAG => MarkState::Unlocked {
                hash: self.hash(),
                age: self.age(),
            },
            STACK_LOCKED_TAG => MarkState::StackLocked {
                monitor: self.monitor_slot(),
            },
            INFLATED_TAG => MarkState::Inflated {
                monitor: self.monitor_slot(),
            },
            _ => match self.forwardee() {
                Some(to) => MarkState::Forwarded(to),
                None => MarkState::Unlocked { hash: 0, age: 0 },
            },
        }
    }
}

impl fmt::Debug for MarkWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_filler() {
            return write!(f, "MarkWord(filler)");
        }
        write!(f, "MarkWord({:?})", self.decode())
    }
}
