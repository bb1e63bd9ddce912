//! Log entry model

use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

/// Severity of a log entry.
///
/// Serialized with the upper-case names the log backend expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Debug or trace information.
    Debug,
    /// Routine information.
    Info,
    /// Something unexpected that did not fail the request.
    Warning,
    /// An operation failed.
    Error,
    /// A failure severe enough to abort processing (`fatal`).
    Critical,
    /// No assigned severity (`unknown`).
    Default,
}

impl Severity {
    /// Get the severity name as sent to the sink.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Default => "DEFAULT",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warning,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// Application call site an entry was emitted from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    /// Source file, relative to the application root when one is configured
    pub file: String,
    /// Line number
    pub line: u32,
    /// Enclosing function or module path, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// One log event.
///
/// Entries are immutable once built. Blank messages never become entries.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    timestamp: SystemTime,
    severity: Severity,
    message: String,
    source_location: Option<SourceLocation>,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    ///
    /// Returns `None` when the message is empty or whitespace only.
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        source_location: Option<SourceLocation>,
    ) -> Option<Self> {
        Self::at(SystemTime::now(), severity, message, source_location)
    }

    /// Create an entry with an explicit timestamp.
    pub fn at(
        timestamp: SystemTime,
        severity: Severity,
        message: impl Into<String>,
        source_location: Option<SourceLocation>,
    ) -> Option<Self> {
        let message = message.into();
        if message.trim().is_empty() {
            return None;
        }

        Some(Self {
            timestamp,
            severity,
            message,
            source_location,
        })
    }

    /// Get the timestamp
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Get the severity
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Get the message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source location, if one was resolved
    pub fn source_location(&self) -> Option<&SourceLocation> {
        self.source_location.as_ref()
    }
}
