//! Background delivery in front of another sink
//!
//! ```text
//!   request flows ──write──▶ unbounded channel ──▶ worker ──▶ inner sink
//! ```
//!
//! Producers never wait: `write` only enqueues. A single worker drains the
//! channel in order, so batches reach the inner sink in the order they were
//! written.

use super::{LogBatch, LogSink, SinkCallGuard};
use crate::error::SinkError;
use std::sync::{Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Commands processed by the worker.
enum SinkCommand {
    Write(LogBatch),
    Flush(Option<oneshot::Sender<()>>),
}

/// Non-blocking sink that delivers through a worker task.
///
/// The worker runs on tokio's blocking pool, so the inner sink may do
/// blocking I/O.
///
/// No delivery guarantee is made: batches written after [`shutdown`](Self::shutdown)
/// are dropped with a warning, and failures inside the inner sink are only
/// logged.
pub struct AsyncSink {
    tx: Mutex<Option<mpsc::UnboundedSender<SinkCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncSink {
    /// Start a worker delivering to `inner`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: LogSink>(inner: S) -> Result<Self, SinkError> {
        let handle = Handle::try_current().map_err(|e| SinkError::Unavailable(e.to_string()))?;
        let (tx, mut rx) = mpsc::unbounded_channel::<SinkCommand>();

        let worker = handle.spawn_blocking(move || {
            while let Some(command) = rx.blocking_recv() {
                let _sink_call = SinkCallGuard::enter();
                match command {
                    SinkCommand::Write(batch) => inner.write(batch),
                    SinkCommand::Flush(done) => {
                        inner.flush();
                        if let Some(done) = done {
                            let _ = done.send(());
                        }
                    }
                }
            }
            {
                let _sink_call = SinkCallGuard::enter();
                inner.flush();
            }
            tracing::debug!("log sink worker stopped");
        });

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Wait until every batch written so far has reached the inner sink.
    pub async fn flushed(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.send(SinkCommand::Flush(Some(done_tx))).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Stop accepting batches and wait for the worker to drain the channel.
    ///
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "log sink worker failed");
            }
        }
    }

    fn send(&self, command: SinkCommand) -> Result<(), SinkError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx
                .send(command)
                .map_err(|_| SinkError::Unavailable("worker stopped".to_string())),
            None => Err(SinkError::Unavailable("sink shut down".to_string())),
        }
    }
}

impl LogSink for AsyncSink {
    fn write(&self, batch: LogBatch) {
        let entries = batch.entries.len();
        if let Err(e) = self.send(SinkCommand::Write(batch)) {
            tracing::warn!(entries, error = %e, "dropping log batch");
        }
    }

    fn flush(&self) {
        let _ = self.send(SinkCommand::Flush(None));
    }
}

impl std::fmt::Debug for AsyncSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self
            .tx
            .lock()
            .map(|tx| tx.is_some())
            .unwrap_or(false);
        f.debug_struct("AsyncSink").field("open", &open).finish()
    }
}
