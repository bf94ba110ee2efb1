//! # Connectivity Probe
//!
//! Cheap reachability test against the collection endpoint's host.
//!
//! The probe opens (and immediately closes) a TCP connection to the endpoint
//! host and port. It never sends a payload, so "network down" is not confused
//! with "endpoint refused the data". Every failure, including DNS errors and
//! timeouts, is reported as [`ConnectivityState::Offline`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Whether the endpoint can currently be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    Online,
    #[default]
    Offline,
}

impl ConnectivityState {
    pub fn is_online(self) -> bool {
        self == ConnectivityState::Online
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
        }
    }
}

/// Reachability check with no side effects on local state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Check reachability, bounded by the probe's own timeout
    async fn check(&self) -> ConnectivityState;
}

/// TCP connect probe against the host of the endpoint URL
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: Option<(String, u16)>,
    timeout: Duration,
}

impl TcpProbe {
    /// Create a probe for the host and port of `base_url`
    ///
    /// A URL without a host yields a probe that always reports offline.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let target = reqwest::Url::parse(base_url).ok().and_then(|url| {
            let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']').to_string();
            let port = url.port_or_known_default()?;
            Some((host, port))
        });

        if target.is_none() {
            warn!("Cannot derive probe target from {:?}, connectivity will read offline", base_url);
        }

        Self { target, timeout }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn check(&self) -> ConnectivityState {
        let Some((host, port)) = &self.target else {
            return ConnectivityState::Offline;
        };

        match tokio::time::timeout(self.timeout, TcpStream::connect((host.as_str(), *port))).await {
            Ok(Ok(_stream)) => ConnectivityState::Online,
            Ok(Err(e)) => {
                debug!("Probe to {}:{} failed: {}", host, port, e);
                ConnectivityState::Offline
            }
            Err(_) => {
                debug!("Probe to {}:{} timed out after {:?}", host, port, self.timeout);
                ConnectivityState::Offline
            }
        }
    }
}
