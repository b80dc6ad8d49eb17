//! Configuration for the call-history application server
//!
//! ```rust
//! use rvoip_call_history::config::CallHistoryConfig;
//! use std::time::Duration;
//!
//! let config = CallHistoryConfig::new("homedomain")
//!     .with_max_call_list_length(50)
//!     .with_workers(8)
//!     .with_call_list_ttl(Duration::from_secs(7 * 24 * 3600))
//!     .with_notify_url("http://call-list-notify.homedomain:8080/notify");
//!
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{CallHistoryError, Result};
pub use crate::load_monitor::LoadMonitorConfig;

/// Settings consumed when the application server is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallHistoryConfig {
    /// Service name the host invokes this application server under
    pub service_name: String,

    /// Home domain of the deployment
    pub home_domain: String,

    /// Calls kept per call list; zero keeps everything until it expires
    pub max_call_list_length: usize,

    /// Store worker tasks
    pub workers: usize,

    /// Queued fragments awaiting a worker before new ones are refused
    pub queue_capacity: usize,

    /// How long fragments are kept by the store
    pub call_list_ttl: Duration,

    /// Overload guard tuning
    pub load_monitor: LoadMonitorConfig,

    /// Where call list changes are POSTed; empty disables notifications
    pub notify_url: String,

    /// Timeout for a single notification request
    pub notify_timeout: Duration,
}

impl Default for CallHistoryConfig {
    fn default() -> Self {
        Self {
            service_name: "memento".to_string(),
            home_domain: "localhost".to_string(),
            max_call_list_length: 0,
            workers: 25,
            queue_capacity: 1000,
            call_list_ttl: Duration::from_secs(604_800),
            load_monitor: LoadMonitorConfig::default(),
            notify_url: String::new(),
            notify_timeout: Duration::from_secs(5),
        }
    }
}

impl CallHistoryConfig {
    pub fn new(home_domain: impl Into<String>) -> Self {
        Self {
            home_domain: home_domain.into(),
            ..Default::default()
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_max_call_list_length(mut self, length: usize) -> Self {
        self.max_call_list_length = length;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_call_list_ttl(mut self, ttl: Duration) -> Self {
        self.call_list_ttl = ttl;
        self
    }

    pub fn with_load_monitor(mut self, load_monitor: LoadMonitorConfig) -> Self {
        self.load_monitor = load_monitor;
        self
    }

    pub fn with_notify_url(mut self, url: impl Into<String>) -> Self {
        self.notify_url = url.into();
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(CallHistoryError::ConfigError("service_name must not be empty".to_string()));
        }
        if self.workers == 0 {
            return Err(CallHistoryError::ConfigError("workers must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(CallHistoryError::ConfigError("queue_capacity must be at least 1".to_string()));
        }
        if self.call_list_ttl.is_zero() {
            return Err(CallHistoryError::ConfigError("call_list_ttl must be non-zero".to_string()));
        }

        let lm = &self.load_monitor;
        if lm.max_tokens == 0 {
            return Err(CallHistoryError::ConfigError("max_tokens must be at least 1".to_string()));
        }
        if lm.init_token_rate <= 0.0 {
            return Err(CallHistoryError::ConfigError("init_token_rate must be positive".to_string()));
        }
        if lm.min_token_rate < 0.0 {
            return Err(CallHistoryError::ConfigError("min_token_rate must not be negative".to_string()));
        }
        if lm.max_token_rate > 0.0 && lm.min_token_rate > lm.max_token_rate {
            return Err(CallHistoryError::ConfigError(format!(
                "min_token_rate ({}) exceeds max_token_rate ({})",
                lm.min_token_rate, lm.max_token_rate
            )));
        }

        if !self.notify_url.is_empty() {
            parse_notify_url(&self.notify_url)?;
        }

        Ok(())
    }
}

/// Parse a notification URL, requiring an http(s) scheme and a host
pub fn parse_notify_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|e| CallHistoryError::ConfigError(format!("invalid notify_url {}: {}", url, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CallHistoryError::ConfigError(format!(
            "notify_url must be http or https: {}",
            url
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CallHistoryError::ConfigError(format!("notify_url has no host: {}", url)));
    }

    Ok(parsed)
}
