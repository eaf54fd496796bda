//! Configuration module for the edge image relay.
//!
//! Both binaries load their settings from environment variables with
//! validation and sensible defaults; the same `Config` carries the sender
//! (endpoint, interval, capture source) and collector (bind address,
//! deadline, directories) surfaces.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default collector host the edge node connects to
const DEFAULT_COLLECTOR_HOST: &str = "127.0.0.1";

/// Default address the collector binds
const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default TCP port for the frame exchange
const DEFAULT_PORT: u16 = 12345;

/// Default seconds between send ticks
const DEFAULT_SEND_INTERVAL_SECS: u64 = 5;

/// Minimum send interval to avoid hammering the collector
const MIN_SEND_INTERVAL_SECS: u64 = 1;

/// Maximum send interval to keep the edge node visibly alive
const MAX_SEND_INTERVAL_SECS: u64 = 3_600;

/// Default frame size cap (16 MiB); 0 disables the cap
const DEFAULT_MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Default collector per-connection read deadline; 0 disables it
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Default directory for decoded images
const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Default directory for raw dumps of undecodable payloads
const DEFAULT_DEBUG_DUMP_DIR: &str = "./debug";

/// Configuration for the edge image relay.
///
/// All settings can be configured via environment variables:
/// - `EDGE_RELAY_COLLECTOR_HOST`: host the edge node connects to (default: 127.0.0.1)
/// - `EDGE_RELAY_BIND_HOST`: address the collector binds (default: 0.0.0.0)
/// - `EDGE_RELAY_PORT`: TCP port, 1-65535 (default: 12345)
/// - `EDGE_RELAY_SEND_INTERVAL_SECS`: seconds between send ticks (default: 5)
/// - `EDGE_RELAY_MAX_FRAME_BYTES`: frame size cap, 0 = unbounded (default: 16 MiB)
/// - `EDGE_RELAY_READ_TIMEOUT_SECS`: collector read deadline, 0 = disabled (default: 30)
/// - `EDGE_RELAY_OUTPUT_DIR`: decoded-image directory (default: ./output)
/// - `EDGE_RELAY_DEBUG_DUMP_DIR`: raw-dump directory (default: ./debug)
/// - `EDGE_RELAY_CAPTURE_PATH`: capture image file; unset selects the synthetic source
#[derive(Debug, Clone)]
pub struct Config {
    /// Host the edge node connects to
    pub collector_host: String,

    /// Address the collector binds
    pub bind_host: String,

    /// TCP port used by both sides
    pub port: u16,

    /// Interval between send ticks
    pub send_interval: Duration,

    /// Maximum accepted frame payload size in bytes; 0 disables the cap
    pub max_frame_bytes: u32,

    /// Collector per-connection read deadline; `None` disables it
    pub read_timeout: Option<Duration>,

    /// Directory decoded images are written to
    pub output_dir: PathBuf,

    /// Directory undecodable payloads are dumped to
    pub debug_dump_dir: PathBuf,

    /// Capture image file; `None` selects the synthetic test-pattern source
    pub capture_path: Option<PathBuf>,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `EDGE_RELAY_PORT` is not a valid nonzero port number
    /// - `EDGE_RELAY_SEND_INTERVAL_SECS` is not a valid number or exceeds limits
    /// - `EDGE_RELAY_MAX_FRAME_BYTES` or `EDGE_RELAY_READ_TIMEOUT_SECS` is not
    ///   a valid number
    pub fn from_env() -> Result<Self, ConfigError> {
        let collector_host = env::var("EDGE_RELAY_COLLECTOR_HOST")
            .unwrap_or_else(|_| DEFAULT_COLLECTOR_HOST.to_string());

        let bind_host =
            env::var("EDGE_RELAY_BIND_HOST").unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string());

        let port = Self::parse_port()?;
        let send_interval = Duration::from_secs(Self::parse_send_interval()?);
        let max_frame_bytes =
            Self::parse_u32("EDGE_RELAY_MAX_FRAME_BYTES", DEFAULT_MAX_FRAME_BYTES)?;

        let read_timeout_secs =
            Self::parse_u64("EDGE_RELAY_READ_TIMEOUT_SECS", DEFAULT_READ_TIMEOUT_SECS)?;
        let read_timeout = if read_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(read_timeout_secs))
        };

        let output_dir = env::var("EDGE_RELAY_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let debug_dump_dir = env::var("EDGE_RELAY_DEBUG_DUMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DEBUG_DUMP_DIR));

        let capture_path = env::var("EDGE_RELAY_CAPTURE_PATH").ok().map(PathBuf::from);

        Ok(Self {
            collector_host,
            bind_host,
            port,
            send_interval,
            max_frame_bytes,
            read_timeout,
            output_dir,
            debug_dump_dir,
            capture_path,
        })
    }

    /// Endpoint string the edge node connects to.
    pub fn collector_addr(&self) -> String {
        format!("{}:{}", self.collector_host, self.port)
    }

    /// Address string the collector binds.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Parse the port from the environment with validation.
    fn parse_port() -> Result<u16, ConfigError> {
        let env_var = "EDGE_RELAY_PORT";

        match env::var(env_var) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|_| ConfigError {
                    message: format!("'{}' is not a valid port number", value),
                    env_var: Some(env_var.to_string()),
                })?;

                if port == 0 {
                    return Err(ConfigError {
                        message: "port must be in the range 1-65535".to_string(),
                        env_var: Some(env_var.to_string()),
                    });
                }

                Ok(port)
            }
            Err(_) => Ok(DEFAULT_PORT),
        }
    }

    /// Parse the send interval from the environment with validation.
    fn parse_send_interval() -> Result<u64, ConfigError> {
        let env_var = "EDGE_RELAY_SEND_INTERVAL_SECS";

        match env::var(env_var) {
            Ok(value) => {
                let interval: u64 = value.parse().map_err(|_| ConfigError {
                    message: format!("'{}' is not a valid number", value),
                    env_var: Some(env_var.to_string()),
                })?;

                if interval < MIN_SEND_INTERVAL_SECS {
                    return Err(ConfigError {
                        message: format!(
                            "send interval {} is below minimum ({}s)",
                            interval, MIN_SEND_INTERVAL_SECS
                        ),
                        env_var: Some(env_var.to_string()),
                    });
                }

                if interval > MAX_SEND_INTERVAL_SECS {
                    return Err(ConfigError {
                        message: format!(
                            "send interval {} exceeds maximum ({}s)",
                            interval, MAX_SEND_INTERVAL_SECS
                        ),
                        env_var: Some(env_var.to_string()),
                    });
                }

                Ok(interval)
            }
            Err(_) => Ok(DEFAULT_SEND_INTERVAL_SECS),
        }
    }

    fn parse_u32(env_var: &str, default: u32) -> Result<u32, ConfigError> {
        match env::var(env_var) {
            Ok(value) => value.parse().map_err(|_| ConfigError {
                message: format!("'{}' is not a valid number", value),
                env_var: Some(env_var.to_string()),
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_u64(env_var: &str, default: u64) -> Result<u64, ConfigError> {
        match env::var(env_var) {
            Ok(value) => value.parse().map_err(|_| ConfigError {
                message: format!("'{}' is not a valid number", value),
                env_var: Some(env_var.to_string()),
            }),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    /// Create a default configuration using default values.
    ///
    /// This is useful for testing or when environment variables are not set.
    fn default() -> Self {
        Self {
            collector_host: DEFAULT_COLLECTOR_HOST.to_string(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            send_interval: Duration::from_secs(DEFAULT_SEND_INTERVAL_SECS),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            read_timeout: Some(Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS)),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            debug_dump_dir: PathBuf::from(DEFAULT_DEBUG_DUMP_DIR),
            capture_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }

        fn remove(key: &str) -> Self {
            let original = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => env::set_var(&self.key, val),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.collector_host, "127.0.0.1");
        assert_eq!(config.bind_host, "0.0.0.0");
        assert_eq!(config.port, 12345);
        assert_eq!(config.send_interval, Duration::from_secs(5));
        assert_eq!(config.max_frame_bytes, 16 * 1024 * 1024);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));
        assert!(config.capture_path.is_none());
    }

    #[test]
    fn test_addr_helpers() {
        let config = Config::default();
        assert_eq!(config.collector_addr(), "127.0.0.1:12345");
        assert_eq!(config.bind_addr(), "0.0.0.0:12345");
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _guard1 = EnvGuard::remove("EDGE_RELAY_COLLECTOR_HOST");
        let _guard2 = EnvGuard::remove("EDGE_RELAY_PORT");
        let _guard3 = EnvGuard::remove("EDGE_RELAY_SEND_INTERVAL_SECS");

        let config = Config::from_env().expect("Should load with defaults");
        assert_eq!(config.collector_host, "127.0.0.1");
        assert_eq!(config.port, 12345);
        assert_eq!(config.send_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_config_from_env_custom_values() {
        let _guard1 = EnvGuard::set("EDGE_RELAY_COLLECTOR_HOST", "192.168.0.37");
        let _guard2 = EnvGuard::set("EDGE_RELAY_PORT", "15000");
        let _guard3 = EnvGuard::set("EDGE_RELAY_SEND_INTERVAL_SECS", "10");
        let _guard4 = EnvGuard::set("EDGE_RELAY_CAPTURE_PATH", "sample.jpg");

        let config = Config::from_env().expect("Should load custom values");
        assert_eq!(config.collector_host, "192.168.0.37");
        assert_eq!(config.port, 15000);
        assert_eq!(config.collector_addr(), "192.168.0.37:15000");
        assert_eq!(config.send_interval, Duration::from_secs(10));
        assert_eq!(config.capture_path, Some(PathBuf::from("sample.jpg")));
    }

    #[test]
    fn test_invalid_port() {
        let _guard = EnvGuard::set("EDGE_RELAY_PORT", "not_a_port");

        let result = Config::from_env();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.message.contains("not a valid port"));
    }

    #[test]
    fn test_zero_port_rejected() {
        let _guard = EnvGuard::set("EDGE_RELAY_PORT", "0");

        let result = Config::from_env();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.message.contains("1-65535"));
    }

    #[test]
    fn test_send_interval_below_min() {
        let _guard = EnvGuard::set("EDGE_RELAY_SEND_INTERVAL_SECS", "0");

        let result = Config::from_env();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.message.contains("below minimum"));
    }

    #[test]
    fn test_send_interval_exceeds_max() {
        let _guard = EnvGuard::set("EDGE_RELAY_SEND_INTERVAL_SECS", "99999");

        let result = Config::from_env();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.message.contains("exceeds maximum"));
    }

    #[test]
    fn test_zero_read_timeout_disables_deadline() {
        let _guard = EnvGuard::set("EDGE_RELAY_READ_TIMEOUT_SECS", "0");

        let config = Config::from_env().expect("Should load");
        assert!(config.read_timeout.is_none());
    }

    #[test]
    fn test_zero_max_frame_bytes_means_unbounded() {
        let _guard = EnvGuard::set("EDGE_RELAY_MAX_FRAME_BYTES", "0");

        let config = Config::from_env().expect("Should load");
        assert_eq!(config.max_frame_bytes, 0);
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError {
            message: "test error".to_string(),
            env_var: Some("TEST_VAR".to_string()),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration error for TEST_VAR: test error"
        );

        let error_no_var = ConfigError {
            message: "general error".to_string(),
            env_var: None,
        };
        assert_eq!(
            format!("{}", error_no_var),
            "Configuration error: general error"
        );
    }
}
