//! # reqlog-tower
//!
//! Tower middleware driving [`reqlog_core`] request contexts.
//!
//! [`RequestLoggingLayer`] opens a request context for each HTTP request,
//! binds it while the inner service runs, and always finishes it, so every
//! log call made by the handler lands in that request's correlated groups.
//!
//! ## Example
//!
//! ```rust,ignore
//! use reqlog_core::{AsyncSink, JsonLinesSink, LoggerConfig, RequestLogger};
//! use reqlog_tower::RequestLoggingLayer;
//!
//! let sink = AsyncSink::spawn(JsonLinesSink::create("requests.jsonl")?)?;
//! let logger = RequestLogger::new(LoggerConfig::from_env()?, sink)?;
//!
//! let app = tower::ServiceBuilder::new()
//!     .layer(RequestLoggingLayer::new(logger))
//!     .service(handler);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod layer;
pub mod meta;

pub use layer::{RequestLoggingLayer, RequestLoggingService};
pub use meta::RequestId;

pub use reqlog_core;
