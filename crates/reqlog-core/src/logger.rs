//! Request logger
//!
//! [`RequestLogger`] is the entry point for log calls. Each call resolves the
//! request bound to the current execution flow:
//!
//! - inside a request, the entry is appended to that request's queue and the
//!   flush policy may dispatch a group;
//! - outside any request, the entry is written to the sink straight away,
//!   uncorrelated.
//!
//! The lifecycle helpers [`begin`](RequestLogger::begin) and
//! [`finish`](RequestLogger::finish) are what the HTTP middleware drives.
//!
//! # Example
//!
//! ```ignore
//! use reqlog_core::{LoggerConfig, MemorySink, RequestLogger, RequestMeta, RequestFutureExt};
//!
//! let logger = RequestLogger::new(LoggerConfig::default(), MemorySink::new())?;
//!
//! let ctx = logger.begin("req-1", RequestMeta::new("GET", "/orders"));
//! async {
//!     logger.info("loading orders");
//! }
//! .in_request(ctx.clone())
//! .await;
//! logger.finish(&ctx, None);
//! ```

use crate::config::LoggerConfig;
use crate::context::{self, ContextState, HttpOutcome, Phase, RequestContext, RequestMeta};
use crate::correlator::{Correlator, GroupMarks, TransmissionUnit};
use crate::error::ReqlogError;
use crate::model::{LogEntry, Severity, SourceLocation};
use crate::sink::{self, LogBatch, LogSink, MonitoredResource, SinkCallGuard};
use crate::source::{CallSite, SourceResolver};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Message of the entry emitted when a request starts.
pub const REQUEST_STARTED: &str = "Request Started";

/// Message of the entry emitted when a request ends.
pub const REQUEST_ENDED: &str = "Request Ended";

/// Request-scoped logger. Cheap to clone.
#[derive(Clone)]
pub struct RequestLogger {
    inner: Arc<Inner>,
}

struct Inner {
    config: LoggerConfig,
    correlator: Correlator,
    resolver: SourceResolver,
    resource: MonitoredResource,
    labels: BTreeMap<String, String>,
    request_log_name: String,
    fallback_log_name: String,
    sink: Box<dyn LogSink>,
}

impl RequestLogger {
    /// Create a logger writing to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: LoggerConfig, sink: impl LogSink) -> Result<Self, ReqlogError> {
        config.validate()?;

        let inner = Inner {
            correlator: Correlator::new(&config.service_name, &config.environment),
            resolver: SourceResolver::new(config.source_roots.iter().cloned()),
            resource: MonitoredResource::project(&config.service_name),
            labels: BTreeMap::from([("service".to_string(), config.service_name.clone())]),
            request_log_name: config.request_log_name(),
            fallback_log_name: config.fallback_log_name(),
            sink: Box::new(sink),
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &LoggerConfig {
        &self.inner.config
    }

    /// Producer id stamped on correlated entries
    pub fn producer(&self) -> &str {
        self.inner.correlator.producer()
    }

    /// Record a message at `severity`, attributed to the caller.
    #[track_caller]
    pub fn record(&self, severity: Severity, message: impl Into<String>) {
        self.record_at(severity, message, Some(CallSite::caller()));
    }

    /// Record a lazily built message at `severity`, attributed to the caller.
    #[track_caller]
    pub fn record_with<F, M>(&self, severity: Severity, message: F)
    where
        F: FnOnce() -> M,
        M: Into<String>,
    {
        let site = CallSite::caller();
        self.record_at(severity, message(), Some(site));
    }

    /// Record a message with an explicit call site.
    ///
    /// Blank messages are dropped without any side effect, and so is anything
    /// logged from inside a sink call on this thread. Inside a request the
    /// entry is timestamped under the request lock, so queue order and
    /// timestamp order agree.
    pub fn record_at(&self, severity: Severity, message: impl Into<String>, site: Option<CallSite>) {
        if sink::in_sink_call() {
            return;
        }
        let message = message.into();
        if message.trim().is_empty() {
            return;
        }
        let location = site.and_then(|site| self.inner.resolver.resolve([site]));

        match context::current() {
            Some(ctx) => self.append(&ctx, severity, message, location),
            None => {
                if let Some(entry) = LogEntry::new(severity, message, location) {
                    self.write_uncorrelated(entry);
                }
            }
        }
    }

    /// Record at DEBUG
    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.record(Severity::Debug, message);
    }

    /// Record at INFO
    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.record(Severity::Info, message);
    }

    /// Record at WARNING
    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.record(Severity::Warning, message);
    }

    /// Record at ERROR
    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.record(Severity::Error, message);
    }

    /// Record at CRITICAL
    #[track_caller]
    pub fn fatal(&self, message: impl Into<String>) {
        self.record(Severity::Critical, message);
    }

    /// Record at DEFAULT
    #[track_caller]
    pub fn unknown(&self, message: impl Into<String>) {
        self.record(Severity::Default, message);
    }

    /// Open a context for a new request.
    ///
    /// The context is not bound to anything yet; run the request inside
    /// [`scope`](crate::scope) or [`RequestContext::enter`]. When request
    /// markers are enabled the start marker is queued right away.
    pub fn begin(&self, request_id: impl Into<String>, meta: RequestMeta) -> Arc<RequestContext> {
        let ctx = RequestContext::new(request_id.into(), meta, self.inner.config.batch_size);
        tracing::debug!(
            request_id = %ctx.request_id(),
            method = %ctx.meta().method,
            path = %ctx.meta().path,
            "request context opened"
        );

        if self.inner.config.request_markers {
            self.append(&ctx, Severity::Info, REQUEST_STARTED.to_string(), None);
        }
        ctx
    }

    /// Finish a request: record its outcome, run the final flush and close
    /// the context.
    ///
    /// Only the first call for a context has any effect.
    pub fn finish(&self, ctx: &RequestContext, outcome: Option<HttpOutcome>) {
        let mut state = ctx.lock();
        if state.phase() != Phase::Accumulating {
            return;
        }
        if let Some(outcome) = outcome {
            state.set_outcome(outcome);
        }

        // everything queued from here on leaves in the final flush
        state.begin_finalizing();
        if self.inner.config.request_markers {
            if let Some(entry) = LogEntry::new(Severity::Info, REQUEST_ENDED, None) {
                state.queue.push_tail(entry);
            }
        }

        let groups = state.queue.drain();
        let outcome = state.outcome().cloned();
        let count = groups.len();

        for (index, group) in groups.into_iter().enumerate() {
            let marks = GroupMarks {
                first: state.claim_first(),
                last: index + 1 == count,
                outcome: outcome.as_ref(),
            };
            self.dispatch(ctx, group, marks);
        }

        ctx.close_locked(&mut state);
        drop(state);

        {
            let _sink_call = SinkCallGuard::enter();
            self.inner.sink.flush();
        }
        tracing::debug!(
            request_id = %ctx.request_id(),
            groups = count,
            status = outcome.as_ref().map(|o| o.status),
            "request context closed"
        );
    }

    /// Finish a request without an outcome.
    pub fn end(&self, ctx: &RequestContext) {
        self.finish(ctx, None);
    }

    /// Finish `ctx` without an outcome when the returned guard is dropped,
    /// unless [`FinishGuard::complete`] ran first.
    pub fn finish_on_drop(&self, ctx: Arc<RequestContext>) -> FinishGuard {
        FinishGuard {
            logger: self.clone(),
            ctx: Some(ctx),
        }
    }

    fn append(
        &self,
        ctx: &RequestContext,
        severity: Severity,
        message: String,
        location: Option<SourceLocation>,
    ) {
        let mut state = ctx.lock();
        let Some(entry) = LogEntry::new(severity, message, location) else {
            return;
        };
        if state.phase() != Phase::Accumulating {
            drop(state);
            tracing::debug!(
                request_id = %ctx.request_id(),
                "request already finished, writing entry uncorrelated"
            );
            self.write_uncorrelated(entry);
            return;
        }
        self.push_locked(ctx, &mut state, entry);
    }

    fn push_locked(&self, ctx: &RequestContext, state: &mut ContextState, entry: LogEntry) {
        if let Some(group) = state.queue.push(entry) {
            let marks = GroupMarks {
                first: state.claim_first(),
                ..Default::default()
            };
            self.dispatch(ctx, group, marks);
        }
    }

    /// Stamp a group and hand it to the sink. Runs under the context lock.
    fn dispatch(&self, ctx: &RequestContext, group: Vec<LogEntry>, marks: GroupMarks<'_>) {
        tracing::debug!(
            request_id = %ctx.request_id(),
            entries = group.len(),
            first = marks.first,
            last = marks.last,
            "dispatching log group"
        );

        let entries = self.inner.correlator.stamp(ctx, group, marks);
        let _sink_call = SinkCallGuard::enter();
        self.inner.sink.write(LogBatch {
            log_name: self.inner.request_log_name.clone(),
            resource: self.inner.resource.clone(),
            labels: self.inner.labels.clone(),
            entries,
        });
    }

    fn write_uncorrelated(&self, entry: LogEntry) {
        let _sink_call = SinkCallGuard::enter();
        self.inner.sink.write(LogBatch {
            log_name: self.inner.fallback_log_name.clone(),
            resource: self.inner.resource.clone(),
            labels: self.inner.labels.clone(),
            entries: vec![TransmissionUnit::standalone(entry)],
        });
    }
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("config", &self.inner.config)
            .field("producer", &self.producer())
            .finish_non_exhaustive()
    }
}

/// Runs [`RequestLogger::finish`] when dropped.
///
/// Covers panics and cancelled futures: the final flush and teardown still
/// happen, only without an outcome.
#[must_use = "the request is finished as soon as the guard is dropped"]
pub struct FinishGuard {
    logger: RequestLogger,
    ctx: Option<Arc<RequestContext>>,
}

impl FinishGuard {
    /// The guarded context
    pub fn context(&self) -> Option<&Arc<RequestContext>> {
        self.ctx.as_ref()
    }

    /// Finish with `outcome` now and disarm the guard.
    pub fn complete(mut self, outcome: Option<HttpOutcome>) {
        if let Some(ctx) = self.ctx.take() {
            self.logger.finish(&ctx, outcome);
        }
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            tracing::debug!(request_id = %ctx.request_id(), "finishing abandoned request");
            self.logger.finish(&ctx, None);
        }
    }
}
