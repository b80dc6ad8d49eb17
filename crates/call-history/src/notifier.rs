//! Call list change notifications
//!
//! After a fragment lands in an owner's call list, interested parties (for
//! example a push service that refreshes handsets) are told which call list
//! changed. The HTTP notifier POSTs `{"impu": "<owner identity>"}` to the
//! configured URL and treats only `200 OK` as success.

use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::config::{parse_notify_url, CallHistoryConfig};
use crate::errors::{CallHistoryError, Result};
use crate::types::TrailId;

/// Tells subscribers an owner's call list has changed
#[async_trait]
pub trait CallListNotifier: Send + Sync {
    async fn send_notify(&self, owner_identity: &str, trail: TrailId) -> Result<()>;
}

/// HTTP notifier
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    url: Option<Url>,
}

impl HttpNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = parse_notify_url(url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallHistoryError::ConfigError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url: Some(url) })
    }

    /// A notifier that accepts every notification without sending anything
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            url: None,
        }
    }

    /// Build from configuration; an empty `notify_url` disables notifications
    pub fn from_config(config: &CallHistoryConfig) -> Result<Self> {
        if config.notify_url.is_empty() {
            Ok(Self::disabled())
        } else {
            Self::new(&config.notify_url, config.notify_timeout)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl CallListNotifier for HttpNotifier {
    async fn send_notify(&self, owner_identity: &str, trail: TrailId) -> Result<()> {
        let Some(url) = &self.url else {
            return Ok(());
        };

        debug!(%trail, "Notifying {} of call list change for {}", url, owner_identity);
        let response = self
            .client
            .post(url.clone())
            .json(&json!({ "impu": owner_identity }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(CallHistoryError::NotifyError(format!(
                "{} answered {} for {}",
                url, status, owner_identity
            ))),
        }
    }
}
