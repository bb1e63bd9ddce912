//! In-memory sink

use super::{LogBatch, LogSink};
use crate::correlator::TransmissionUnit;
use std::sync::{Mutex, PoisonError};

/// Sink that keeps every batch in memory.
///
/// Meant for tests and in-process inspection; nothing is ever evicted.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<LogBatch>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches written so far, in write order
    pub fn batches(&self) -> Vec<LogBatch> {
        self.lock().clone()
    }

    /// All units written so far, flattened in write order
    pub fn entries(&self) -> Vec<TransmissionUnit> {
        self.lock()
            .iter()
            .flat_map(|batch| batch.entries.iter().cloned())
            .collect()
    }

    /// Batches whose units belong to the given request
    pub fn batches_for(&self, request_id: &str) -> Vec<LogBatch> {
        self.lock()
            .iter()
            .filter(|batch| {
                batch.entries.iter().any(|unit| {
                    unit.operation
                        .as_ref()
                        .is_some_and(|op| op.id == request_id)
                })
            })
            .cloned()
            .collect()
    }

    /// Number of batches written
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget everything written so far
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogBatch>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for MemorySink {
    fn write(&self, batch: LogBatch) {
        self.lock().push(batch);
    }
}
