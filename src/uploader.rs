//! # Uploader
//!
//! Delivers readings to the remote collection endpoint over HTTP(S).
//!
//! A single reading is POSTed as a JSON object and a batch as a JSON array,
//! both to `base_url + readings_path`. A batch is acknowledged as a whole or
//! not at all.
//!
//! | Outcome | Result |
//! |---------|--------|
//! | 2xx | [`Ack`] |
//! | 4xx | `DeliveryError::Rejected(status)` |
//! | 5xx, other statuses | `DeliveryError::Unreachable` (retried later) |
//! | connect failure | `DeliveryError::Unreachable` |
//! | request timeout | `DeliveryError::Timeout` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use crate::config::EndpointConfig;
use crate::error::{AgentError, DeliveryError, Result};
use crate::reading::Reading;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("meter-relay/", env!("CARGO_PKG_VERSION"));

/// Positive acknowledgement from the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// HTTP status returned
    pub status: u16,
    /// Number of readings covered by this acknowledgement
    pub accepted: usize,
}

/// Sends readings to the endpoint; never touches local state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Deliver one reading
    async fn send(&self, reading: &Reading) -> std::result::Result<Ack, DeliveryError>;

    /// Deliver readings in order, all-or-nothing
    async fn send_batch(&self, readings: &[Reading]) -> std::result::Result<Ack, DeliveryError>;

    /// Tell the endpoint this device is alive
    async fn heartbeat(&self, meter_id: u8) -> std::result::Result<Ack, DeliveryError>;
}

#[derive(Debug, Serialize)]
struct Heartbeat {
    timestamp: DateTime<Utc>,
    meter_id: u8,
}

/// reqwest-backed uploader
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    readings_url: String,
    ping_url: String,
}

impl HttpUploader {
    /// Build the HTTP client from endpoint configuration
    ///
    /// # Errors
    ///
    /// Returns `AgentError::HttpClient` if the TLS backend cannot be initialised
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AgentError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            readings_url: join_url(&config.base_url, &config.readings_path),
            ping_url: join_url(&config.base_url, &config.ping_path),
        })
    }

    pub fn readings_url(&self) -> &str {
        &self.readings_url
    }

    async fn post<T>(&self, url: &str, body: &T, count: usize) -> std::result::Result<Ack, DeliveryError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        debug!("POST {} -> {} ({} readings)", url, status, count);
        classify_status(status, count)
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn send(&self, reading: &Reading) -> std::result::Result<Ack, DeliveryError> {
        self.post(&self.readings_url, reading, 1).await
    }

    async fn send_batch(&self, readings: &[Reading]) -> std::result::Result<Ack, DeliveryError> {
        self.post(&self.readings_url, readings, readings.len()).await
    }

    async fn heartbeat(&self, meter_id: u8) -> std::result::Result<Ack, DeliveryError> {
        let body = Heartbeat {
            timestamp: Utc::now(),
            meter_id,
        };
        self.post(&self.ping_url, &body, 0).await
    }
}

/// Join a base URL and a path with exactly one slash between them
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn classify_status(status: StatusCode, count: usize) -> std::result::Result<Ack, DeliveryError> {
    if status.is_success() {
        Ok(Ack {
            status: status.as_u16(),
            accepted: count,
        })
    } else if status.is_client_error() {
        Err(DeliveryError::Rejected(status.as_u16()))
    } else {
        Err(DeliveryError::Unreachable(format!("endpoint returned {}", status)))
    }
}

fn classify_error(err: reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout
    } else {
        DeliveryError::Unreachable(err.to_string())
    }
}
