//! Capabilities the wake cycle needs from the board it runs on.
//!
//! Every collaborator outside the cycle logic is reached through one of
//! these traits so that the same orchestration runs on a device, on a
//! host and against recording fakes in tests. The cycle is strictly
//! sequential, hence all traits are `?Send` and take `&self`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::{fmt, time::Duration};

use crate::core::{WakeEvent, WakeLevel};

/// Failures while joining the wireless network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// No association within the connect timeout
    Timeout,
    /// The access point refused the association
    Rejected(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Timeout => write!(f, "Connect timeout"),
            NetworkError::Rejected(msg) => write!(f, "Connection rejected: {}", msg),
        }
    }
}

impl std::error::Error for NetworkError {}

#[async_trait(?Send)]
pub trait Network {
    /// Join the network, giving up after `timeout`.
    async fn connect(&self, ssid: &str, password: &str, timeout: Duration)
        -> Result<(), NetworkError>;
}

/// Response of a POST request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Transport level failures, i.e. no HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    ConnectionFailed(String),
    Timeout(String),
    InvalidUrl(String),
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            TransportError::Timeout(msg) => write!(f, "Request timeout: {}", msg),
            TransportError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            TransportError::Other(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Secure request channel to the collector.
#[async_trait(?Send)]
pub trait Transport {
    /// POST a JSON document, with an `Authorization: Bearer` header iff
    /// `bearer` is given.
    async fn post_json(
        &self,
        url: &str,
        body: &str,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, TransportError>;
}

/// Local wall clock that can be set from a network time service.
#[async_trait(?Send)]
pub trait TimeService {
    /// Start synchronizing the local clock. Completion is observed by
    /// polling [`TimeService::now`].
    async fn request_sync(&self, server: &str);

    fn now(&self) -> DateTime<Utc>;
}

/// Sink for the values shown on the local display.
pub trait ReadingDisplay {
    fn render(&self, moisture_pct: f64, temperature_c: f64);
}

/// Power management of the board.
pub trait PowerManager {
    /// Cause of the current power-on. Resets and other non-button causes
    /// are reported as [`WakeEvent::TimerExpired`].
    fn wake_cause(&self) -> WakeEvent;

    fn arm_external_wake(&self, level: WakeLevel);

    fn arm_timer_wake(&self, after: Duration);

    /// Halt until one of the armed sources fires. On a device this does
    /// not return; execution restarts from power-on.
    fn enter_deep_sleep(&self);
}

/// Bounded blocking wait.
#[async_trait(?Send)]
pub trait Delay {
    async fn pause(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait(?Send)]
impl Delay for TokioDelay {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Host clock that is always synchronized.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait(?Send)]
impl TimeService for SystemClock {
    async fn request_sync(&self, server: &str) {
        log::debug!("Host clock is managed by the OS, ignoring sync with {}", server);
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
