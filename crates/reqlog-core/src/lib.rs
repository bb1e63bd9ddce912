//! # reqlog-core
//!
//! Request-scoped log batching and correlation.
//!
//! Log calls made while a request is being handled are buffered per request,
//! dispatched to a sink in groups of at most `batch_size` entries, and stamped
//! so the backend can stitch the groups back together:
//!
//! - every entry of a request carries the same `operation.id`;
//! - the earliest entry carries `operation.first`, the final one
//!   `operation.last`;
//! - the response status and size appear only on the groups sent once the
//!   response is known.
//!
//! Calls made outside any request are written to the sink immediately,
//! without correlation.
//!
//! ## Features
//!
//! - `config` - `LoggerConfig::from_env` with `.env` file support (default)
//! - `capture` - [`RequestCaptureLayer`], a `tracing` layer feeding the logger (default)
//!
//! ## Example
//!
//! ```ignore
//! use reqlog_core::{log_info, HttpOutcome, LoggerConfig, RequestLogger, RequestMeta, TracingSink};
//! use reqlog_core::RequestFutureExt;
//!
//! let logger = RequestLogger::new(LoggerConfig::from_env()?, TracingSink::new())?;
//!
//! let ctx = logger.begin("req-1", RequestMeta::new("GET", "/orders"));
//! let finish = logger.finish_on_drop(ctx.clone());
//! async {
//!     log_info!(logger, "listing orders for {}", user);
//! }
//! .in_request(ctx)
//! .await;
//! finish.complete(Some(HttpOutcome::new(200)));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod macros;

pub mod config;
pub mod context;
pub mod correlator;
pub mod error;
pub mod logger;
pub mod model;
pub mod queue;
pub mod sink;
pub mod source;

// tracing bridge
#[cfg(feature = "capture")]
pub mod capture;

pub use config::LoggerConfig;
pub use context::{
    current, in_current_request, scope, ContextGuard, HttpOutcome, InRequest, Phase,
    RequestContext, RequestFutureExt, RequestMeta,
};
pub use correlator::{Correlator, GroupMarks, HttpRequestInfo, Operation, TransmissionUnit};
pub use error::{ConfigError, ReqlogError, Result, SinkError};
pub use logger::{FinishGuard, RequestLogger, REQUEST_ENDED, REQUEST_STARTED};
pub use model::{LogEntry, Severity, SourceLocation};
pub use queue::{BatchQueue, DEFAULT_BATCH_SIZE};
pub use sink::{AsyncSink, JsonLinesSink, LogBatch, LogSink, MemorySink, MonitoredResource, TracingSink};
pub use source::{CallSite, SourceResolver};

#[cfg(feature = "capture")]
pub use capture::RequestCaptureLayer;

#[cfg(feature = "config")]
pub use config::load_dotenv;
