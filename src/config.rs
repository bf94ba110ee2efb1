//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Configuration is read once at startup and treated as immutable afterwards.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{AgentError, Result};
use crate::modbus::protocol::{SLAVE_ID_MAX, SLAVE_ID_MIN};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub meter: MeterConfig,
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Energy meter and serial line configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MeterConfig {
    #[serde(default = "default_device_id")]
    pub device_id: u8,

    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    #[serde(default = "default_meter_timeout_ms")]
    pub timeout_ms: u64,
}

/// Remote collection endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    pub base_url: String,

    #[serde(default = "default_readings_path")]
    pub readings_path: String,

    #[serde(default = "default_ping_path")]
    pub ping_path: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Durable ledger configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: String,

    #[serde(default = "default_drain_chunk_size")]
    pub drain_chunk_size: usize,

    /// 0 keeps every undelivered reading
    #[serde(default)]
    pub max_entries: usize,

    #[serde(default = "default_compact_threshold_bytes")]
    pub compact_threshold_bytes: u64,
}

/// Scheduling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_poll_interval_s")]
    pub poll_interval_s: u64,

    /// 0 disables the heartbeat
    #[serde(default = "default_heartbeat_interval_s")]
    pub heartbeat_interval_s: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_file_enabled")]
    pub file_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            drain_chunk_size: default_drain_chunk_size(),
            max_entries: 0,
            compact_threshold_bytes: default_compact_threshold_bytes(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_s: default_poll_interval_s(),
            heartbeat_interval_s: default_heartbeat_interval_s(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_enabled: default_file_enabled(),
            log_dir: default_log_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

// Default value functions
fn default_device_id() -> u8 { 101 }
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 9600 }
fn default_stop_bits() -> u8 { 2 }
fn default_meter_timeout_ms() -> u64 { 1000 }

fn default_readings_path() -> String { "/readings/".to_string() }
fn default_ping_path() -> String { "/ping/".to_string() }
fn default_request_timeout_ms() -> u64 { 10000 }
fn default_probe_timeout_ms() -> u64 { 2000 }

fn default_ledger_path() -> String { "./data/ledger.jsonl".to_string() }
fn default_drain_chunk_size() -> usize { 50 }
fn default_compact_threshold_bytes() -> u64 { 1024 * 1024 }

fn default_poll_interval_s() -> u64 { 60 }
fn default_heartbeat_interval_s() -> u64 { 300 }

fn default_log_level() -> String { "info".to_string() }
fn default_file_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_file_prefix() -> String { "meter-relay.log".to_string() }

fn invalid(msg: impl std::fmt::Display) -> AgentError {
    AgentError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use meter_relay::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Worst-case time for one poll, one probe and one request
    pub fn cycle_budget_ms(&self) -> u64 {
        self.meter.timeout_ms * crate::meter::registers::MEASUREMENT_COUNT as u64
            + self.endpoint.probe_timeout_ms
            + self.endpoint.request_timeout_ms
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Meter
        if !(SLAVE_ID_MIN..=SLAVE_ID_MAX).contains(&self.meter.device_id) {
            return Err(invalid(format!(
                "device_id must be between {} and {}",
                SLAVE_ID_MIN, SLAVE_ID_MAX
            )));
        }

        if self.meter.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if ![1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200].contains(&self.meter.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200",
            ));
        }

        if ![1, 2].contains(&self.meter.stop_bits) {
            return Err(invalid("stop_bits must be 1 or 2"));
        }

        if self.meter.timeout_ms == 0 || self.meter.timeout_ms > 10000 {
            return Err(invalid("meter timeout_ms must be between 1 and 10000"));
        }

        // Endpoint
        let base_url = self.endpoint.base_url.as_str();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(invalid("base_url must start with http:// or https://"));
        }

        if reqwest::Url::parse(base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .is_none()
        {
            return Err(invalid(format!("base_url has no host: {}", base_url)));
        }

        if self.endpoint.readings_path.is_empty() || self.endpoint.ping_path.is_empty() {
            return Err(invalid("readings_path and ping_path cannot be empty"));
        }

        if self.endpoint.request_timeout_ms == 0 || self.endpoint.request_timeout_ms > 120000 {
            return Err(invalid("request_timeout_ms must be between 1 and 120000"));
        }

        if self.endpoint.probe_timeout_ms == 0 || self.endpoint.probe_timeout_ms > 30000 {
            return Err(invalid("probe_timeout_ms must be between 1 and 30000"));
        }

        // Ledger
        if self.ledger.path.is_empty() {
            return Err(invalid("ledger path cannot be empty"));
        }

        if self.ledger.drain_chunk_size == 0 || self.ledger.drain_chunk_size > 10000 {
            return Err(invalid("drain_chunk_size must be between 1 and 10000"));
        }

        if self.ledger.compact_threshold_bytes == 0 {
            return Err(invalid("compact_threshold_bytes must be greater than 0"));
        }

        // Agent
        if self.agent.poll_interval_s == 0 || self.agent.poll_interval_s > 86400 {
            return Err(invalid("poll_interval_s must be between 1 and 86400"));
        }

        // A worst-case poll, probe and send must fit inside one cycle
        if self.cycle_budget_ms() >= self.agent.poll_interval_s * 1000 {
            return Err(invalid(format!(
                "meter timeout_ms x {} registers + probe_timeout_ms + request_timeout_ms must be shorter than poll_interval_s",
                crate::meter::registers::MEASUREMENT_COUNT
            )));
        }

        // Logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        if self.logging.file_enabled && self.logging.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty when file logging is enabled"));
        }

        if self.logging.file_enabled && self.logging.file_prefix.is_empty() {
            return Err(invalid("file_prefix cannot be empty when file logging is enabled"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config {
            meter: MeterConfig {
                device_id: default_device_id(),
                port: default_serial_port(),
                baud_rate: default_baud_rate(),
                stop_bits: default_stop_bits(),
                timeout_ms: default_meter_timeout_ms(),
            },
            endpoint: EndpointConfig {
                base_url: "https://collector.example.com/api".to_string(),
                readings_path: default_readings_path(),
                ping_path: default_ping_path(),
                request_timeout_ms: default_request_timeout_ms(),
                probe_timeout_ms: default_probe_timeout_ms(),
            },
            ledger: LedgerConfig::default(),
            agent: AgentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[meter]
device_id = 7
port = "/dev/ttyAMA0"

[endpoint]
base_url = "http://10.0.0.5:8000"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.meter.device_id, 7);
        assert_eq!(config.meter.port, "/dev/ttyAMA0");
        assert_eq!(config.meter.baud_rate, 9600);
        assert_eq!(config.ledger.drain_chunk_size, 50);
        assert_eq!(config.agent.poll_interval_s, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_endpoint_section_fails() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[meter]\n").unwrap();
        temp_file.flush().unwrap();

        assert!(matches!(Config::load(temp_file.path()), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            Config::load("/nonexistent/meter-relay.toml"),
            Err(AgentError::Io(_))
        ));
    }

    #[test]
    fn test_device_id_zero() {
        let mut config = create_valid_config();
        config.meter.device_id = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_id_too_high() {
        let mut config = create_valid_config();
        config.meter.device_id = 248;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = create_valid_config();
        config.meter.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.meter.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in &[1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200] {
            let mut config = create_valid_config();
            config.meter.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_invalid_stop_bits() {
        let mut config = create_valid_config();
        config.meter.stop_bits = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_meter_timeout_zero() {
        let mut config = create_valid_config();
        config.meter.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_must_fit_in_interval() {
        let mut config = create_valid_config();
        config.agent.poll_interval_s = 10;
        config.meter.timeout_ms = 1000; // 32 registers x 1 s > 10 s
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_network_timeouts_count_toward_cycle_budget() {
        let mut config = create_valid_config();
        config.agent.poll_interval_s = 40;
        config.meter.timeout_ms = 1000;
        config.endpoint.probe_timeout_ms = 2000;

        // 32 s poll + 2 s probe + 5 s request fits in 40 s
        config.endpoint.request_timeout_ms = 5000;
        assert_eq!(config.cycle_budget_ms(), 39000);
        assert!(config.validate().is_ok());

        // 32 s poll alone fits, but not with a 10 s request on top
        config.endpoint.request_timeout_ms = 10000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_without_scheme() {
        let mut config = create_valid_config();
        config.endpoint.base_url = "collector.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_empty() {
        let mut config = create_valid_config();
        config.endpoint.base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_zero() {
        let mut config = create_valid_config();
        config.endpoint.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probe_timeout_too_high() {
        let mut config = create_valid_config();
        config.endpoint.probe_timeout_ms = 30001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_drain_chunk_size_zero() {
        let mut config = create_valid_config();
        config.ledger.drain_chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_ledger_path() {
        let mut config = create_valid_config();
        config.ledger.path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_interval_zero() {
        let mut config = create_valid_config();
        config.agent.poll_interval_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heartbeat_can_be_disabled() {
        let mut config = create_valid_config();
        config.agent.heartbeat_interval_s = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_valid_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = create_valid_config();
        config.logging.file_enabled = true;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = create_valid_config();
        config.logging.file_enabled = false;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_device_id(), 101);
        assert_eq!(default_serial_port(), "/dev/ttyUSB0");
        assert_eq!(default_baud_rate(), 9600);
        assert_eq!(default_stop_bits(), 2);
        assert_eq!(default_meter_timeout_ms(), 1000);
        assert_eq!(default_readings_path(), "/readings/");
        assert_eq!(default_ping_path(), "/ping/");
        assert_eq!(default_request_timeout_ms(), 10000);
        assert_eq!(default_probe_timeout_ms(), 2000);
        assert_eq!(default_drain_chunk_size(), 50);
        assert_eq!(default_poll_interval_s(), 60);
        assert_eq!(default_heartbeat_interval_s(), 300);
        assert_eq!(default_log_dir(), "./logs");
    }
}
