//! Batch queue and flush policy
//!
//! A queue holds the entries of one request in emission order. Flushes only
//! ever remove a prefix, so order is preserved across group boundaries.

use crate::model::LogEntry;
use std::collections::VecDeque;

/// Default number of entries per dispatched group.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Ordered, append-only buffer drained in groups of at most `batch_size`.
#[derive(Debug)]
pub struct BatchQueue {
    entries: VecDeque<LogEntry>,
    batch_size: usize,
}

impl BatchQueue {
    /// Create an empty queue.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            entries: VecDeque::with_capacity(batch_size + 1),
            batch_size,
        }
    }

    /// Configured group size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry and apply the threshold policy.
    ///
    /// Once the queue holds more than `batch_size` entries, exactly
    /// `batch_size` of the oldest are removed and returned as one group.
    pub fn push(&mut self, entry: LogEntry) -> Option<Vec<LogEntry>> {
        self.entries.push_back(entry);

        if self.entries.len() > self.batch_size {
            Some(self.entries.drain(..self.batch_size).collect())
        } else {
            None
        }
    }

    /// Append an entry without applying the threshold policy.
    ///
    /// Used once a request is finalizing, where the next step is a full drain.
    pub fn push_tail(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
    }

    /// Remove everything, in chunks of at most `batch_size`.
    pub fn drain(&mut self) -> Vec<Vec<LogEntry>> {
        let mut groups = Vec::with_capacity(self.entries.len().div_ceil(self.batch_size));
        while !self.entries.is_empty() {
            let take = self.batch_size.min(self.entries.len());
            groups.push(self.entries.drain(..take).collect());
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use proptest::prelude::*;

    fn entry(n: usize) -> LogEntry {
        LogEntry::new(Severity::Info, format!("entry {}", n), None).unwrap()
    }

    fn messages(group: &[LogEntry]) -> Vec<String> {
        group.iter().map(|e| e.message().to_string()).collect()
    }

    #[test]
    fn test_threshold_flush_with_batch_size_three() {
        let mut queue = BatchQueue::new(3);
        let mut groups = Vec::new();

        for n in 1..=7 {
            if let Some(group) = queue.push(entry(n)) {
                groups.push(group);
            }
            if n == 4 || n == 7 {
                assert_eq!(queue.len(), 1, "one entry stays queued after entry {}", n);
            }
        }
        groups.extend(queue.drain());

        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let all: Vec<String> = groups.iter().flat_map(|g| messages(g)).collect();
        let expected: Vec<String> = (1..=7).map(|n| format!("entry {}", n)).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_no_flush_at_exact_batch_size() {
        let mut queue = BatchQueue::new(3);
        for n in 1..=3 {
            assert!(queue.push(entry(n)).is_none());
        }
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_drain_empty_queue_yields_nothing() {
        let mut queue = BatchQueue::new(DEFAULT_BATCH_SIZE);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let mut queue = BatchQueue::new(0);
        assert_eq!(queue.batch_size(), 1);
        assert!(queue.push(entry(1)).is_none());
        assert_eq!(queue.push(entry(2)).map(|g| g.len()), Some(1));
    }

    #[test]
    fn test_push_tail_never_flushes() {
        let mut queue = BatchQueue::new(2);
        for n in 1..=2 {
            assert!(queue.push(entry(n)).is_none());
        }
        queue.push_tail(entry(3));
        assert_eq!(queue.len(), 3);

        let sizes: Vec<usize> = queue.drain().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_flushes_preserve_count_and_order(
            batch_size in 1usize..16,
            count in 0usize..80,
        ) {
            let mut queue = BatchQueue::new(batch_size);
            let mut groups = Vec::new();
            for n in 0..count {
                if let Some(group) = queue.push(entry(n)) {
                    prop_assert_eq!(group.len(), batch_size);
                    groups.push(group);
                }
                prop_assert!(queue.len() <= batch_size);
            }
            groups.extend(queue.drain());

            for group in &groups {
                prop_assert!(!group.is_empty() && group.len() <= batch_size);
            }

            let all: Vec<String> = groups.iter().flat_map(|g| messages(g)).collect();
            let expected: Vec<String> = (0..count).map(|n| format!("entry {}", n)).collect();
            prop_assert_eq!(all, expected);
        }
    }
}
