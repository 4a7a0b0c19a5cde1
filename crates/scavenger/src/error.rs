//! Error Module - Scavenger Error Types
//!
//! Defines the errors surfaced by heap setup and mutator-side operations.
//!
//! The evacuation hot path never returns errors: allocation exhaustion is
//! absorbed by the fallback chain (survivor → old → self-forward) and a lost
//! forwarding race is an expected outcome reported through return values.
//!
//! # Error Categories
//!
//! ## Memory Errors
//! - `OutOfMemory` - No free region can satisfy a mutator allocation
//! - `ObjectTooLarge` - Object does not fit in a single region
//!
//! ## Access Errors
//! - `InvalidReference` - Reference outside the committed heap
//! - `FieldOutOfBounds` - Field or element index past the object's end
//! - `WrongObjectKind` - Operation not supported by the object's kind
//!
//! ## Setup Errors
//! - `Configuration` - Invalid configuration
//! - `MonitorTableFull` - Monitor side table exhausted

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for scavenger operations
#[derive(Debug, Error)]
pub enum ScavengeError {
    /// Mutator allocation could not find a free region
    ///
    /// **Recovery strategy:** run a young collection, expand the heap, or fail
    #[error("Out of memory: requested {requested} words, {free_regions} free regions")]
    OutOfMemory {
        requested: usize,
        free_regions: usize,
    },

    /// Humongous objects are not supported
    #[error("Object of {words} words exceeds region size of {region_words} words")]
    ObjectTooLarge { words: usize, region_words: usize },

    /// Reference does not point at an object header inside the committed heap
    #[error("Invalid object reference: word {0:#x}")]
    InvalidReference(usize),

    /// Field index past the end of the object's reference area
    #[error("Field index {index} out of bounds (length {length})")]
    FieldOutOfBounds { index: usize, length: usize },

    /// Operation not applicable to this object kind
    #[error("Wrong object kind: expected {expected}, found {found}")]
    WrongObjectKind {
        expected: &'static str,
        found: &'static str,
    },

    /// All monitor slots are in use
    #[error("Monitor table full ({capacity} slots)")]
    MonitorTableFull { capacity: usize },

    /// Object is not in the lock state required by the operation
    #[error("Invalid lock state: {0}")]
    InvalidLockState(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScavengeError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScavengeError::OutOfMemory { .. })
    }

    /// Check if this error indicates a bug in the code
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            ScavengeError::Internal(_) | ScavengeError::InvalidReference(_)
        )
    }
}

/// Result type alias for scavenger operations
pub type Result<T> = std::result::Result<T, ScavengeError>;
