//! Correlation of dispatched groups
//!
//! Every group of a request is turned into transmission units that share the
//! request's operation id. The first group ever dispatched carries
//! `operation.first` on its first unit, the last group of the final flush
//! carries `operation.last` on its last unit, and only final-flush groups
//! carry the response outcome.

use crate::context::{HttpOutcome, RequestContext, RequestMeta};
use crate::model::{LogEntry, Severity, SourceLocation};
use serde::{Serialize, Serializer};
use std::time::{Duration, SystemTime};

/// One entry as delivered to the sink.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionUnit {
    /// When the entry was logged
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: SystemTime,
    /// Severity
    pub severity: Severity,
    /// Log message
    pub message: String,
    /// Application call site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    /// Request attributes; absent on uncorrelated entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequestInfo>,
    /// Correlation stamp; absent on uncorrelated entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
}

impl TransmissionUnit {
    /// Build an uncorrelated unit, used outside any request.
    pub fn standalone(entry: LogEntry) -> Self {
        Self::from_entry(entry, None, None)
    }

    fn from_entry(
        entry: LogEntry,
        http_request: Option<HttpRequestInfo>,
        operation: Option<Operation>,
    ) -> Self {
        Self {
            timestamp: entry.timestamp(),
            severity: entry.severity(),
            source_location: entry.source_location().cloned(),
            message: entry.message().to_string(),
            http_request,
            operation,
        }
    }
}

/// HTTP request attributes attached to correlated units.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestInfo {
    /// Request method
    pub method: String,
    /// Path including the query string
    pub url: String,
    /// `Referer` header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Client address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    /// Request payload size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// `User-Agent` header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Response status, final flush only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Response size, final flush only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    /// Request latency, final flush only
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_latency"
    )]
    pub latency: Option<Duration>,
}

impl HttpRequestInfo {
    fn new(meta: &RequestMeta, outcome: Option<&HttpOutcome>) -> Self {
        Self {
            method: meta.method.clone(),
            url: meta.path.clone(),
            referer: meta.referer.clone(),
            remote_address: meta.remote_address.clone(),
            size: meta.request_size,
            user_agent: meta.user_agent.clone(),
            status: outcome.map(|o| o.status),
            response_size: outcome.and_then(|o| o.response_size),
            latency: outcome.and_then(|o| o.latency),
        }
    }
}

/// Operation stamp tying the groups of one request together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Operation {
    /// Request id
    pub id: String,
    /// Service and environment that produced the entry
    pub producer: String,
    /// Set on the earliest entry of the request
    pub first: bool,
    /// Set on the final entry of the request
    pub last: bool,
}

/// How a group is marked.
#[derive(Clone, Copy, Debug, Default)]
pub struct GroupMarks<'a> {
    /// This is the first group dispatched for the request
    pub first: bool,
    /// This is the last group of the final flush
    pub last: bool,
    /// Response outcome, present only during the final flush
    pub outcome: Option<&'a HttpOutcome>,
}

/// Stamps groups with correlation metadata.
#[derive(Clone, Debug)]
pub struct Correlator {
    producer: String,
}

impl Correlator {
    /// Create a correlator for a service deployed in an environment.
    pub fn new(service_name: &str, environment: &str) -> Self {
        Self {
            producer: format!("{}#{}", service_name, environment),
        }
    }

    /// Producer identifier
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Turn a group into stamped transmission units.
    pub fn stamp(
        &self,
        context: &RequestContext,
        group: Vec<LogEntry>,
        marks: GroupMarks<'_>,
    ) -> Vec<TransmissionUnit> {
        let http_request = HttpRequestInfo::new(context.meta(), marks.outcome);
        let count = group.len();

        group
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let operation = Operation {
                    id: context.request_id().to_string(),
                    producer: self.producer.clone(),
                    first: marks.first && index == 0,
                    last: marks.last && index + 1 == count,
                };
                TransmissionUnit::from_entry(entry, Some(http_request.clone()), Some(operation))
            })
            .collect()
    }
}

#[derive(Serialize)]
struct Timestamp {
    seconds: u64,
    nanos: u32,
}

fn serialize_timestamp<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let since_epoch = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    Timestamp {
        seconds: since_epoch.as_secs(),
        nanos: since_epoch.subsec_nanos(),
    }
    .serialize(serializer)
}

fn serialize_latency<S: Serializer>(
    latency: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match latency {
        Some(latency) => serializer.serialize_str(&format!("{:.3}s", latency.as_secs_f64())),
        None => serializer.serialize_none(),
    }
}
