//! Age Table - Survivor Volume by Age and Tenuring Threshold
//!
//! Each worker counts the words it copied into survivor regions per
//! (incremented) age. The merged table decides the next tenuring threshold:
//! the youngest age at which the cumulative survivor volume exceeds the
//! desired survivor size.

use crate::object::MAX_AGE;

pub const TABLE_SIZE: usize = MAX_AGE as usize + 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgeTable {
    sizes: [usize; TABLE_SIZE],
}

impl AgeTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, age: u8, words: usize) {
        self.sizes[age as usize] += words;
    }

    pub fn merge(&mut self, other: &AgeTable) {
        for (total, words) in self.sizes.iter_mut().zip(other.sizes.iter()) {
            *total += words;
        }
    }

    pub fn clear(&mut self) {
        self.sizes = [0; TABLE_SIZE];
    }

    pub fn words_at(&self, age: u8) -> usize {
        self.sizes[age as usize]
    }

    pub fn total_words(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// New threshold for a survivor budget of `desired_survivor_words`
    pub fn compute_tenuring_threshold(&self, desired_survivor_words: usize, max_threshold: u8) -> u8 {
        debug_assert_eq!(self.sizes[0], 0, "copied objects have age >= 1");
        let mut total = 0;
        let mut age = 1;
        while age < TABLE_SIZE {
            total += self.sizes[age];
            if total > desired_survivor_words {
                break;
            }
            age += 1;
        }
        (age as u8).min(max_threshold)
    }
}

/// Tenuring threshold carried from pause to pause
#[derive(Debug, Clone)]
pub struct TenuringPolicy {
    threshold: u8,
    max_threshold: u8,
    target_survivor_ratio: u32,
}

impl TenuringPolicy {
    pub fn new(initial_threshold: u8, max_threshold: u8, target_survivor_ratio: u32) -> Self {
        Self {
            threshold: initial_threshold.min(max_threshold),
            max_threshold,
            target_survivor_ratio,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Survivor words the next pause should aim for
    pub fn desired_survivor_words(&self, survivor_capacity_words: usize) -> usize {
        (survivor_capacity_words as f64 * self.target_survivor_ratio as f64 / 100.0) as usize
    }

    /// Recompute the threshold from the ages observed in the last pause
    pub fn update(&mut self, ages: &AgeTable, survivor_capacity_words: usize) -> u8 {
        let desired = self.desired_survivor_words(survivor_capacity_words);
        self.threshold = ages.compute_tenuring_threshold(desired, self.max_threshold);
        log::debug!(
            "Tenuring threshold {} (max {}), desired survivor {} words, survived {} words",
            self.threshold,
            self.max_threshold,
            desired,
            ages.total_words()
        );
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_uses_max_threshold() {
        let table = AgeTable::new();
        assert_eq!(table.compute_tenuring_threshold(100, 15), 15);
        assert_eq!(table.compute_tenuring_threshold(100, 7), 7);
    }

    #[test]
    fn test_threshold_is_first_age_over_budget() {
        let mut table = AgeTable::new();
        table.add(1, 40);
        table.add(2, 40);
        table.add(3, 40);
        // 40, 80 fit in 100; 120 does not
        assert_eq!(table.compute_tenuring_threshold(100, 15), 3);
        assert_eq!(table.compute_tenuring_threshold(30, 15), 1);
    }

    #[test]
    fn test_merge() {
        let mut a = AgeTable::new();
        let mut b = AgeTable::new();
        a.add(1, 5);
        b.add(1, 7);
        b.add(4, 1);
        a.merge(&b);
        assert_eq!(a.words_at(1), 12);
        assert_eq!(a.words_at(4), 1);
        assert_eq!(a.total_words(), 13);
    }

    #[test]
    fn test_policy_update() {
        let mut policy = TenuringPolicy::new(7, 15, 50);
        assert_eq!(policy.threshold(), 7);
        assert_eq!(policy.desired_survivor_words(1000), 500);
        let mut table = AgeTable::new();
        table.add(1, 300);
        table.add(2, 300);
        assert_eq!(policy.update(&table, 1000), 2);
        assert_eq!(policy.threshold(), 2);
    }
}
