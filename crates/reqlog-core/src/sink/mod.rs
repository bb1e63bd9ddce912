//! Sink adapters
//!
//! A sink receives stamped groups and delivers them to a log backend. The
//! logger calls [`LogSink::write`] once per dispatched group, in emission
//! order, and expects it to return without waiting for delivery. Delivery
//! failures are the sink's business; they never reach the caller.
//!
//! Bundled sinks:
//!
//! - [`MemorySink`] keeps every batch in memory (tests, inspection)
//! - [`TracingSink`] renders each unit as a JSON line through `tracing`
//! - [`JsonLinesSink`] appends JSON lines to a file
//! - [`AsyncSink`] moves writes to a background task in front of another sink

mod channel;
mod file;
mod memory;
mod tracing_sink;

pub use channel::AsyncSink;
pub use file::JsonLinesSink;
pub use memory::MemorySink;
pub use tracing_sink::TracingSink;

use crate::correlator::TransmissionUnit;
use serde::Serialize;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

thread_local! {
    static IN_SINK_CALL: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running a sink call until dropped.
///
/// Anything a sink logs while the mark is set must not be fed back into the
/// logger: the request lock may be held further up this thread's stack.
pub(crate) struct SinkCallGuard {
    previous: bool,
}

impl SinkCallGuard {
    pub(crate) fn enter() -> Self {
        Self {
            previous: IN_SINK_CALL.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for SinkCallGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        IN_SINK_CALL.with(|flag| flag.set(previous));
    }
}

/// Check if this thread is inside a sink call
pub(crate) fn in_sink_call() -> bool {
    IN_SINK_CALL.with(Cell::get)
}

/// Resource the entries are attributed to at the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonitoredResource {
    /// Resource type
    #[serde(rename = "type")]
    pub kind: String,
    /// Resource labels
    pub labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    /// Resource describing the project a service runs in.
    pub fn project(service_name: &str) -> Self {
        Self {
            kind: "project".to_string(),
            labels: BTreeMap::from([("project_id".to_string(), service_name.to_string())]),
        }
    }
}

/// One sink write: a group of units plus where they go.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    /// Log stream name
    pub log_name: String,
    /// Monitored resource
    pub resource: MonitoredResource,
    /// Labels derived from the service identity
    pub labels: BTreeMap<String, String>,
    /// Units in emission order
    pub entries: Vec<TransmissionUnit>,
}

/// Destination for dispatched groups.
pub trait LogSink: Send + Sync + 'static {
    /// Hand over a batch. Must not block on delivery and never fails.
    fn write(&self, batch: LogBatch);

    /// Push out anything buffered. Best effort.
    fn flush(&self) {}
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn write(&self, batch: LogBatch) {
        (**self).write(batch)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

impl LogSink for Box<dyn LogSink> {
    fn write(&self, batch: LogBatch) {
        (**self).write(batch)
    }

    fn flush(&self) {
        (**self).flush()
    }
}
