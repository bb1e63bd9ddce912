//! Logger configuration
//!
//! [`LoggerConfig`] can be built in code or, with the `config` feature,
//! read from `REQLOG_*` environment variables:
//!
//! | variable | field | default |
//! |---|---|---|
//! | `REQLOG_BATCH_SIZE` | `batch_size` | `10` |
//! | `REQLOG_SERVICE_NAME` | `service_name` | `app` |
//! | `REQLOG_ENVIRONMENT` | `environment` | `development` |
//! | `REQLOG_REQUEST_MARKERS` | `request_markers` | `true` |
//! | `REQLOG_REQUEST_ID_HEADER` | `request_id_header` | `x-request-id` |
//! | `REQLOG_SOURCE_ROOTS` | `source_roots` (comma separated) | none |
//!
//! # Example
//!
//! ```ignore
//! use reqlog_core::LoggerConfig;
//!
//! let config = LoggerConfig::new()
//!     .service_name("shop")
//!     .environment("production")
//!     .batch_size(20);
//! ```

use crate::error::ConfigError;
use crate::queue::DEFAULT_BATCH_SIZE;
use serde::Deserialize;
use std::path::PathBuf;

/// Prefix of the environment variables read by [`LoggerConfig::from_env`].
pub const ENV_PREFIX: &str = "REQLOG_";

/// Configuration of a [`RequestLogger`](crate::RequestLogger).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Queue length above which a partial group is dispatched
    pub batch_size: usize,
    /// Service identity, used in the producer id, log names and labels
    pub service_name: String,
    /// Deployment environment, used in the producer id and request log name
    pub environment: String,
    /// Emit "Request Started" / "Request Ended" marker entries
    pub request_markers: bool,
    /// Header carrying an incoming request id
    pub request_id_header: String,
    /// Roots of the application source tree
    pub source_roots: Vec<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            service_name: "app".to_string(),
            environment: "development".to_string(),
            request_markers: true,
            request_id_header: "x-request-id".to_string(),
            source_roots: Vec::new(),
        }
    }
}

impl LoggerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the service name
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the deployment environment
    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.environment = env.into();
        self
    }

    /// Enable or disable the request start/end markers
    pub fn request_markers(mut self, enabled: bool) -> Self {
        self.request_markers = enabled;
        self
    }

    /// Set the header an incoming request id is read from
    pub fn request_id_header(mut self, header: impl Into<String>) -> Self {
        self.request_id_header = header.into();
        self
    }

    /// Add a root of the application source tree
    pub fn source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_roots.push(root.into());
        self
    }

    /// Log name request groups are written to
    pub fn request_log_name(&self) -> String {
        format!("{}_log", self.environment)
    }

    /// Log name entries outside any request are written to
    pub fn fallback_log_name(&self) -> String {
        format!("{}_log", self.service_name)
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        Ok(())
    }

    /// Load configuration from `REQLOG_*` environment variables.
    ///
    /// A `.env` file in the current directory is loaded first; variables
    /// already set in the process take precedence. Unset variables keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the resulting
    /// configuration is invalid.
    #[cfg(feature = "config")]
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_env_only()
    }

    /// Like [`from_env`](Self::from_env) without touching `.env` files.
    #[cfg(feature = "config")]
    pub fn from_env_only() -> Result<Self, ConfigError> {
        let config: Self = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }
}

/// Load environment variables from a `.env` file, if there is one.
///
/// Existing variables are never overridden.
#[cfg(feature = "config")]
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggerConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.service_name, "app");
        assert_eq!(config.environment, "development");
        assert!(config.request_markers);
        assert_eq!(config.request_id_header, "x-request-id");
        assert!(config.source_roots.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = LoggerConfig::new()
            .batch_size(3)
            .service_name("shop")
            .environment("production")
            .request_markers(false)
            .request_id_header("x-correlation-id")
            .source_root("/srv/shop");

        assert_eq!(config.batch_size, 3);
        assert_eq!(config.request_log_name(), "production_log");
        assert_eq!(config.fallback_log_name(), "shop_log");
        assert!(!config.request_markers);
        assert_eq!(config.source_roots, vec![PathBuf::from("/srv/shop")]);
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let result = LoggerConfig::new().batch_size(0).validate();
        assert!(matches!(result, Err(ConfigError::InvalidBatchSize)));
    }

    #[test]
    fn test_validate_rejects_blank_service_name() {
        let result = LoggerConfig::new().service_name("  ").validate();
        assert!(matches!(result, Err(ConfigError::EmptyServiceName)));
    }

    #[cfg(feature = "config")]
    mod env {
        use super::*;
        use serial_test::serial;

        const VARS: [&str; 6] = [
            "REQLOG_BATCH_SIZE",
            "REQLOG_SERVICE_NAME",
            "REQLOG_ENVIRONMENT",
            "REQLOG_REQUEST_MARKERS",
            "REQLOG_REQUEST_ID_HEADER",
            "REQLOG_SOURCE_ROOTS",
        ];

        fn clear() {
            for var in VARS {
                std::env::remove_var(var);
            }
        }

        #[test]
        #[serial]
        fn test_from_env_uses_defaults_when_unset() {
            clear();
            let config = LoggerConfig::from_env_only().unwrap();
            assert_eq!(config, LoggerConfig::default());
        }

        #[test]
        #[serial]
        fn test_from_env_reads_prefixed_variables() {
            clear();
            std::env::set_var("REQLOG_BATCH_SIZE", "25");
            std::env::set_var("REQLOG_SERVICE_NAME", "billing");
            std::env::set_var("REQLOG_ENVIRONMENT", "staging");
            std::env::set_var("REQLOG_REQUEST_MARKERS", "false");
            std::env::set_var("REQLOG_SOURCE_ROOTS", "/srv/billing,/opt/shared");

            let config = LoggerConfig::from_env_only().unwrap();
            clear();

            assert_eq!(config.batch_size, 25);
            assert_eq!(config.service_name, "billing");
            assert_eq!(config.environment, "staging");
            assert!(!config.request_markers);
            assert_eq!(
                config.source_roots,
                vec![PathBuf::from("/srv/billing"), PathBuf::from("/opt/shared")]
            );
        }

        #[test]
        #[serial]
        fn test_from_env_rejects_unparsable_value() {
            clear();
            std::env::set_var("REQLOG_BATCH_SIZE", "many");
            let result = LoggerConfig::from_env_only();
            clear();
            assert!(matches!(result, Err(ConfigError::Env(_))));
        }

        #[test]
        #[serial]
        fn test_from_env_validates() {
            clear();
            std::env::set_var("REQLOG_BATCH_SIZE", "0");
            let result = LoggerConfig::from_env_only();
            clear();
            assert!(matches!(result, Err(ConfigError::InvalidBatchSize)));
        }
    }
}
