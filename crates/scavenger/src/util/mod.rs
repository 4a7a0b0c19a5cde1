//! Utility Module - Shared Constants and Helpers

pub mod constants {
    /// Kilobyte
    pub const KB: usize = 1024;
    /// Megabyte
    pub const MB: usize = 1024 * KB;

    /// Heap word size in bytes
    pub const WORD_SIZE: usize = 8;
    /// log2 of the heap word size
    pub const LOG_WORD_SIZE: u32 = 3;
}

use constants::{LOG_WORD_SIZE, WORD_SIZE};

/// Convert a word count to bytes
#[inline]
pub const fn words_to_bytes(words: usize) -> usize {
    words << LOG_WORD_SIZE
}

/// Convert a byte count to whole words, rounding up
#[inline]
pub const fn bytes_to_words(bytes: usize) -> usize {
    (bytes + WORD_SIZE - 1) >> LOG_WORD_SIZE
}

/// Percentage of `part` in `whole`, zero when `whole` is zero
#[inline]
pub fn percent_of(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_conversions() {
        assert_eq!(words_to_bytes(3), 24);
        assert_eq!(bytes_to_words(24), 3);
        assert_eq!(bytes_to_words(25), 4);
        assert_eq!(bytes_to_words(0), 0);
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(1, 4), 25.0);
        assert_eq!(percent_of(1, 0), 0.0);
    }
}
