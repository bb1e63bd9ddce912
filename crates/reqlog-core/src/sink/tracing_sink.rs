//! Sink that renders units through `tracing`

use super::{LogBatch, LogSink};
use crate::model::Severity;

/// Writes each unit as one JSON line through `tracing`.
///
/// Useful in development, where the process subscriber prints to the
/// console. Events use the `reqlog::sink` target, which the capture layer
/// ignores.
#[derive(Clone, Debug, Default)]
pub struct TracingSink {
    pretty: bool,
}

impl TracingSink {
    /// Create a sink emitting compact JSON
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink emitting pretty-printed JSON
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl LogSink for TracingSink {
    fn write(&self, batch: LogBatch) {
        for unit in &batch.entries {
            let rendered = if self.pretty {
                serde_json::to_string_pretty(unit)
            } else {
                serde_json::to_string(unit)
            };
            let rendered = match rendered {
                Ok(rendered) => rendered,
                Err(e) => {
                    tracing::warn!(target: "reqlog::sink", error = %e, "failed to render log entry");
                    continue;
                }
            };

            let log_name = batch.log_name.as_str();
            match unit.severity {
                Severity::Debug => tracing::debug!(target: "reqlog::sink", log_name, "{}", rendered),
                Severity::Info | Severity::Default => {
                    tracing::info!(target: "reqlog::sink", log_name, "{}", rendered)
                }
                Severity::Warning => tracing::warn!(target: "reqlog::sink", log_name, "{}", rendered),
                Severity::Error | Severity::Critical => {
                    tracing::error!(target: "reqlog::sink", log_name, "{}", rendered)
                }
            }
        }
    }
}
