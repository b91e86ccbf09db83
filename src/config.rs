//! Node configuration, restored from non-volatile storage on every wake.

use serde::Deserialize;
use std::{fmt, fs, path::Path, time::Duration};

use crate::core::{BackoffSchedule, TimeSyncMode, WakeLevel};

const DEVICE_ID_PLACEHOLDER: &str = "{device_id}";

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Json(e) => write!(f, "JSON error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub device_id: String,
    pub username: String,
    pub password: String,
    pub auth_url: String,
    /// Telemetry endpoint, `{device_id}` is substituted.
    pub data_url: String,
    pub ntp_server: String,
    pub sleep_interval_secs: u64,
    pub time_sync_mode: TimeSyncMode,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub display_hold_ms: u64,
    pub time_sync_timeout_ms: u64,
    pub time_sync_poll_ms: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub sensor_timeout_ms: u64,
    pub button_wake_level: WakeLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            device_id: "smt100-node".to_owned(),
            username: String::new(),
            password: String::new(),
            auth_url: "https://api.example.com/auth/login".to_owned(),
            data_url: "https://api.example.com/devices/{device_id}/data".to_owned(),
            ntp_server: "pool.ntp.org".to_owned(),
            sleep_interval_secs: 3600,
            time_sync_mode: TimeSyncMode::Hybrid,
            max_retries: BackoffSchedule::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: BackoffSchedule::DEFAULT_INITIAL_BACKOFF_MS,
            display_hold_ms: 5000,
            time_sync_timeout_ms: 10_000,
            time_sync_poll_ms: 500,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 10_000,
            sensor_timeout_ms: 1000,
            button_wake_level: WakeLevel::Low,
        }
    }
}

// Secrets stay out of the logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("wifi_ssid", &self.wifi_ssid)
            .field("device_id", &self.device_id)
            .field("username", &self.username)
            .field("auth_url", &self.auth_url)
            .field("data_url", &self.data_url)
            .field("ntp_server", &self.ntp_server)
            .field("sleep_interval_secs", &self.sleep_interval_secs)
            .field("time_sync_mode", &self.time_sync_mode)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("display_hold_ms", &self.display_hold_ms)
            .field("button_wake_level", &self.button_wake_level)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        log::info!("Loading configuration from {}", path.as_ref().display());
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Invalid("device_id must not be empty"));
        }
        if !self.data_url.contains(DEVICE_ID_PLACEHOLDER) {
            return Err(ConfigError::Invalid("data_url must contain {device_id}"));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1"));
        }
        if self.sleep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sleep_interval_secs must be positive"));
        }
        if self.time_sync_poll_ms == 0 {
            return Err(ConfigError::Invalid("time_sync_poll_ms must be positive"));
        }
        if self.time_sync_poll_ms > self.time_sync_timeout_ms {
            return Err(ConfigError::Invalid(
                "time_sync_poll_ms must not exceed time_sync_timeout_ms",
            ));
        }
        Ok(())
    }

    pub fn data_endpoint(&self) -> String {
        self.data_url.replace(DEVICE_ID_PLACEHOLDER, &self.device_id)
    }

    pub fn backoff_schedule(&self) -> BackoffSchedule {
        BackoffSchedule::new(self.max_retries, self.initial_backoff_ms)
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_interval_secs)
    }

    pub fn display_hold(&self) -> Duration {
        Duration::from_millis(self.display_hold_ms)
    }

    pub fn time_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.time_sync_timeout_ms)
    }

    pub fn time_sync_poll(&self) -> Duration {
        Duration::from_millis(self.time_sync_poll_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }
}
