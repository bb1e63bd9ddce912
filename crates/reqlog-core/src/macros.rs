//! Call-site logging macros
//!
//! These macros format a message and record it with the file, line and
//! module path of the call, which `#[track_caller]` methods cannot provide.
//!
//! ```ignore
//! reqlog_core::log_info!(logger, "loaded {} orders", orders.len());
//! ```

/// Record a formatted message at the given severity with the caller's call site
#[macro_export]
macro_rules! log_at {
    ($logger:expr, $severity:expr, $($arg:tt)+) => {
        $logger.record_at(
            $severity,
            ::std::format!($($arg)+),
            ::std::option::Option::Some($crate::CallSite::new(
                ::std::file!(),
                ::std::line!(),
                ::std::module_path!(),
            )),
        )
    };
}

/// Record at DEBUG with the caller's call site
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Debug, $($arg)+)
    };
}

/// Record at INFO with the caller's call site
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Info, $($arg)+)
    };
}

/// Record at WARNING with the caller's call site
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Warning, $($arg)+)
    };
}

/// Record at ERROR with the caller's call site
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Error, $($arg)+)
    };
}

/// Record at CRITICAL with the caller's call site
#[macro_export]
macro_rules! log_fatal {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Critical, $($arg)+)
    };
}

/// Record at DEFAULT with the caller's call site
#[macro_export]
macro_rules! log_unknown {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::Severity::Default, $($arg)+)
    };
}
