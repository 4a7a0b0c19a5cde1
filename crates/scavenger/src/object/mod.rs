//! Object Module - Object Model
//!
//! Objects live in the heap arena and are addressed by word index.
//!
//! ```text
//! word 0   mark word   (lock state, age, hash, or forwarding reference)
//! word 1   klass word  (kind and shape)
//! word 2   length      (arrays only)
//! ...      reference area, then data words
//! ```
//!
//! The reference area holds either wide slots (one `u64` each) or narrow
//! slots (a `u32` word index, two per heap word), selected heap-wide by
//! `compressed_refs`. Slot *addresses* are word indices for wide slots and
//! half-word indices (`word * 2 + half`) for narrow slots.

pub mod mark;

pub use mark::{MarkState, MarkWord, MAX_AGE};

use crate::heap::Heap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::Ordering;

/// Words taken by the mark and klass words
pub const HEADER_WORDS: usize = 2;
/// Words taken by the array header (mark, klass, length)
pub const ARRAY_HEADER_WORDS: usize = 3;
/// Largest supported array length; partial-array tasks carry 30-bit indices
pub const MAX_ARRAY_LENGTH: usize = (1 << 30) - 1;

/// Reference to an object header in the heap arena
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(NonZeroUsize);

impl ObjRef {
    /// Word index 0 is reserved as null
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        NonZeroUsize::new(index).map(ObjRef)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0.get()
    }

    /// Word index `words` past the header
    #[inline]
    pub fn offset(self, words: usize) -> usize {
        self.0.get() + words
    }

    /// Encoding stored in a wide slot or root
    #[inline]
    pub fn encode(reference: Option<ObjRef>) -> u64 {
        reference.map_or(0, |r| r.index() as u64)
    }

    #[inline]
    pub fn decode(raw: u64) -> Option<ObjRef> {
        Self::from_index(raw as usize)
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({:#x})", self.index())
    }
}

/// Shape of an object, decoded from its klass word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Fixed shape: `ref_fields` references followed by `data_words` words
    Instance { ref_fields: u32, data_words: u32 },
    /// Array of references
    ObjArray,
    /// Array of primitive words
    TypeArray,
    /// Dead space of `words` words keeping regions parseable
    Filler { words: usize },
}

impl ObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Instance { .. } => "instance",
            ObjectKind::ObjArray => "object array",
            ObjectKind::TypeArray => "type array",
            ObjectKind::Filler { .. } => "filler",
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ObjectKind::ObjArray | ObjectKind::TypeArray)
    }
}

const KIND_MASK: u64 = 0b11;
const KIND_INSTANCE: u64 = 0;
const KIND_OBJ_ARRAY: u64 = 1;
const KIND_TYPE_ARRAY: u64 = 2;
const KIND_FILLER: u64 = 3;
const REF_FIELDS_SHIFT: u32 = 2;
const REF_FIELDS_MASK: u64 = (1 << 30) - 1;
const DATA_WORDS_SHIFT: u32 = 32;

/// Second header word describing the object's shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KlassWord(u64);

impl KlassWord {
    pub fn instance(ref_fields: u32, data_words: u32) -> Self {
        debug_assert!((ref_fields as u64) <= REF_FIELDS_MASK);
        KlassWord(
            ((data_words as u64) << DATA_WORDS_SHIFT)
                | ((ref_fields as u64) << REF_FIELDS_SHIFT)
                | KIND_INSTANCE,
        )
    }

    pub fn obj_array() -> Self {
        KlassWord(KIND_OBJ_ARRAY)
    }

    pub fn type_array() -> Self {
        KlassWord(KIND_TYPE_ARRAY)
    }

    pub fn filler(words: usize) -> Self {
        KlassWord(((words as u64) << REF_FIELDS_SHIFT) | KIND_FILLER)
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        KlassWord(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn kind(self) -> ObjectKind {
        match self.0 & KIND_MASK {
            KIND_INSTANCE => ObjectKind::Instance {
                ref_fields: ((self.0 >> REF_FIELDS_SHIFT) & REF_FIELDS_MASK) as u32,
                data_words: (self.0 >> DATA_WORDS_SHIFT) as u32,
            },
            KIND_OBJ_ARRAY => ObjectKind::ObjArray,
            KIND_TYPE_ARRAY => ObjectKind::TypeArray,
            _ => ObjectKind::Filler {
                words: (self.0 >> REF_FIELDS_SHIFT) as usize,
            },
        }
    }
}

/// Words taken by `count` reference slots
#[inline]
pub fn ref_area_words(count: usize, compressed: bool) -> usize {
    if compressed {
        (count + 1) / 2
    } else {
        count
    }
}

/// Size in words of an object with the given shape and array length
pub fn object_size(kind: ObjectKind, length: usize, compressed: bool) -> usize {
    match kind {
        ObjectKind::Instance {
            ref_fields,
            data_words,
        } => HEADER_WORDS + ref_area_words(ref_fields as usize, compressed) + data_words as usize,
        ObjectKind::ObjArray => ARRAY_HEADER_WORDS + ref_area_words(length, compressed),
        ObjectKind::TypeArray => ARRAY_HEADER_WORDS + length,
        ObjectKind::Filler { words } => words,
    }
}

/// A location holding a reference
///
/// Implemented by wide and narrow heap slots so the scanning code is
/// monomorphised once per slot width.
pub trait RefSlot: Copy + fmt::Debug + Send {
    /// Slot at the given slot address
    fn at(address: usize) -> Self;

    /// Slot address (word or half-word index)
    fn address(self) -> usize;

    /// Heap word containing this slot
    fn word(self) -> usize;

    fn load(self, heap: &Heap) -> Option<ObjRef>;

    fn store(self, heap: &Heap, value: Option<ObjRef>);
}

/// Full-word reference slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WideSlot(pub usize);

/// 32-bit reference slot, two per heap word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NarrowSlot(pub usize);

impl RefSlot for WideSlot {
    #[inline]
    fn at(address: usize) -> Self {
        WideSlot(address)
    }

    #[inline]
    fn address(self) -> usize {
        self.0
    }

    #[inline]
    fn word(self) -> usize {
        self.0
    }

    #[inline]
    fn load(self, heap: &Heap) -> Option<ObjRef> {
        ObjRef::decode(heap.word(self.0).load(Ordering::Relaxed))
    }

    #[inline]
    fn store(self, heap: &Heap, value: Option<ObjRef>) {
        heap.word(self.0).store(ObjRef::encode(value), Ordering::Relaxed);
    }
}

impl NarrowSlot {
    #[inline]
    fn shift(self) -> u32 {
        ((self.0 & 1) as u32) * 32
    }
}

impl RefSlot for NarrowSlot {
    #[inline]
    fn at(address: usize) -> Self {
        NarrowSlot(address)
    }

    #[inline]
    fn address(self) -> usize {
        self.0
    }

    #[inline]
    fn word(self) -> usize {
        self.0 >> 1
    }

    #[inline]
    fn load(self, heap: &Heap) -> Option<ObjRef> {
        let raw = heap.word(self.word()).load(Ordering::Relaxed);
        ObjRef::from_index(((raw >> self.shift()) as u32) as usize)
    }

    #[inline]
    fn store(self, heap: &Heap, value: Option<ObjRef>) {
        let narrow = ObjRef::encode(value) & u32::MAX as u64;
        let shift = self.shift();
        let mask = (u32::MAX as u64) << shift;
        // The neighbouring half may be written concurrently by another worker
        let _ = heap
            .word(self.word())
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |raw| {
                Some((raw & !mask) | (narrow << shift))
            });
    }
}
