//! `tracing` bridge
//!
//! [`RequestCaptureLayer`] feeds `tracing` events into a [`RequestLogger`],
//! so events emitted by the application and its libraries while a request
//! is being handled end up in that request's groups.
//!
//! ```ignore
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(RequestCaptureLayer::new(logger.clone()))
//!     .init();
//! ```
//!
//! Events from the `reqlog_core` and `reqlog_tower` crates are the logger's
//! own diagnostics and are never captured. Neither is anything a sink logs
//! while it is being called by the logger.

use crate::context;
use crate::logger::RequestLogger;
use crate::model::Severity;
use crate::source::CallSite;
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

const OWN_CRATES: [&str; 2] = ["reqlog_core", "reqlog_tower"];

fn is_own_target(target: &str) -> bool {
    OWN_CRATES.iter().any(|name| {
        target
            .strip_prefix(name)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Layer recording `tracing` events through a [`RequestLogger`].
#[derive(Clone, Debug)]
pub struct RequestCaptureLayer {
    logger: RequestLogger,
    requests_only: bool,
}

impl RequestCaptureLayer {
    /// Capture every event.
    ///
    /// Events outside a request take the logger's uncorrelated path.
    pub fn new(logger: RequestLogger) -> Self {
        Self {
            logger,
            requests_only: false,
        }
    }

    /// Only capture events emitted inside a request.
    pub fn requests_only(mut self) -> Self {
        self.requests_only = true;
        self
    }
}

impl<S: Subscriber> Layer<S> for RequestCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_own_target(metadata.target()) {
            return;
        }
        if self.requests_only && context::current().is_none() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.logger.record_at(
            Severity::from(*metadata.level()),
            visitor.finish(),
            CallSite::from_metadata(metadata),
        );
    }
}

/// Collects the `message` field followed by the other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        let fields = self.fields.join(" ");
        if self.message.is_empty() {
            fields
        } else {
            format!("{} {}", self.message, fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogBatch, LogSink, LoggerConfig, MemorySink, RequestMeta};
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    /// Sink whose transport logs through `tracing` on every write.
    struct ChattySink(Arc<MemorySink>);

    impl LogSink for ChattySink {
        fn write(&self, batch: LogBatch) {
            tracing::info!(target: "http_client", entries = batch.entries.len(), "sending log batch");
            self.0.write(batch);
        }

        fn flush(&self) {
            tracing::debug!(target: "http_client", "flushing");
        }
    }

    fn logger() -> (RequestLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let config = LoggerConfig::new().request_markers(false);
        (RequestLogger::new(config, sink.clone()).unwrap(), sink)
    }

    #[test]
    fn test_event_inside_request_is_buffered() {
        let (logger, sink) = logger();
        let subscriber = tracing_subscriber::registry().with(RequestCaptureLayer::new(logger.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let ctx = logger.begin("req-1", RequestMeta::new("get", "/orders"));
            {
                let _guard = ctx.enter();
                tracing::warn!(target: "shop::orders", order_id = 42, "slow query");
                assert_eq!(ctx.queued(), 1);
                assert!(sink.is_empty());
            }
            logger.finish(&ctx, None);
        });

        let unit = &sink.entries()[0];
        assert_eq!(unit.message, "slow query order_id=42");
        assert_eq!(unit.severity, Severity::Warning);
        assert_eq!(unit.operation.as_ref().unwrap().id, "req-1");
        let location = unit.source_location.as_ref().unwrap();
        assert!(location.file.ends_with("capture.rs"));
    }

    #[test]
    fn test_own_diagnostics_are_ignored() {
        let (logger, sink) = logger();
        let subscriber = tracing_subscriber::registry().with(RequestCaptureLayer::new(logger.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "reqlog_core::logger", "dispatching log group");
            let ctx = logger.begin("req-1", RequestMeta::new("get", "/"));
            logger.finish(&ctx, None);
        });

        assert!(sink.is_empty());
    }

    #[test]
    fn test_application_crates_named_like_reqlog_are_captured() {
        assert!(is_own_target("reqlog_core"));
        assert!(is_own_target("reqlog_core::logger"));
        assert!(is_own_target("reqlog_tower::layer"));
        assert!(!is_own_target("reqlog_app"));
        assert!(!is_own_target("reqlog_core_ext::jobs"));

        let (logger, sink) = logger();
        let subscriber = tracing_subscriber::registry().with(RequestCaptureLayer::new(logger));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "reqlog_app::billing", "invoice sent");
        });

        assert_eq!(sink.entries()[0].message, "invoice sent");
    }

    #[test]
    fn test_events_logged_by_a_sink_do_not_reenter_the_request() {
        let memory = Arc::new(MemorySink::new());
        let config = LoggerConfig::new().batch_size(1).request_markers(false);
        let logger = RequestLogger::new(config, ChattySink(memory.clone())).unwrap();
        let subscriber = tracing_subscriber::registry().with(RequestCaptureLayer::new(logger.clone()));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            tracing::subscriber::with_default(subscriber, || {
                let ctx = logger.begin("req-1", RequestMeta::new("get", "/"));
                {
                    let _guard = ctx.enter();
                    tracing::info!(target: "shop", "a");
                    tracing::info!(target: "shop", "b");
                    tracing::info!(target: "shop", "c");
                }
                logger.finish(&ctx, None);
                tracing::warn!(target: "shop", "outside");
            });
            let _ = done_tx.send(());
        });

        let completed = done_rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok();
        assert!(completed, "request deadlocked on a sink's own log event");

        let messages: Vec<String> = memory.entries().into_iter().map(|u| u.message).collect();
        assert_eq!(messages, vec!["a", "b", "c", "outside"]);
    }

    #[test]
    fn test_requests_only_skips_events_outside_requests() {
        let (logger, sink) = logger();
        let layer = RequestCaptureLayer::new(logger.clone()).requests_only();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "shop", "booting");
        });

        assert!(sink.is_empty());
    }

    #[test]
    fn test_event_outside_request_is_written_uncorrelated() {
        let (logger, sink) = logger();
        let subscriber = tracing_subscriber::registry().with(RequestCaptureLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "shop", "database unreachable");
        });

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].log_name, "app_log");
        assert!(batches[0].entries[0].operation.is_none());
        assert_eq!(batches[0].entries[0].severity, Severity::Error);
    }

    #[test]
    fn test_fields_without_message() {
        let mut visitor = MessageVisitor::default();
        visitor.fields.push("user=7".to_string());
        assert_eq!(visitor.finish(), "user=7");
    }
}
