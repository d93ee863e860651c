use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub websocket: WebSocketConfig,
    pub hub: HubConfig,
    pub janus: JanusConfig,
    pub signaling: SignalingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            shutdown_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Per-connection transport limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Deadline for a single frame write
    pub write_wait_seconds: u64,
    /// Idle-read timeout; any inbound frame (including pong) resets it
    pub pong_wait_seconds: u64,
    /// Largest inbound frame accepted by the upgrade
    pub max_message_size: usize,
    /// Outbound queue depth before a peer is evicted as a slow consumer
    pub peer_queue_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            write_wait_seconds: 10,
            pong_wait_seconds: 60,
            max_message_size: 64 * 1024,
            peer_queue_capacity: 256,
        }
    }
}

impl WebSocketConfig {
    #[must_use]
    pub const fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_seconds)
    }

    #[must_use]
    pub const fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_seconds)
    }

    /// Heartbeat period, 9/10 of the idle-read timeout
    #[must_use]
    pub const fn ping_period(&self) -> Duration {
        Duration::from_millis(self.pong_wait_seconds * 900)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Capacity of each hub command channel
    pub channel_capacity: usize,
    /// A per-room signaling worker exits after this long without work
    pub signaling_worker_idle_seconds: u64,
    /// Calls queued for one room's signaling worker before new ones are dropped
    pub signaling_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            signaling_worker_idle_seconds: 30,
            signaling_queue_capacity: 256,
        }
    }
}

impl HubConfig {
    #[must_use]
    pub const fn signaling_worker_idle(&self) -> Duration {
        Duration::from_secs(self.signaling_worker_idle_seconds)
    }
}

/// Janus media server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanusConfig {
    /// When disabled the hub runs without a signaling coordinator
    pub enabled: bool,
    pub base_url: String,
    pub api_secret: Option<String>,
    pub plugin: String,
    pub request_timeout_seconds: u64,
    pub keepalive_interval_seconds: u64,
}

impl Default for JanusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:8088/janus".to_string(),
            api_secret: None,
            plugin: "janus.plugin.videoroom".to_string(),
            request_timeout_seconds: 30,
            keepalive_interval_seconds: 25,
        }
    }
}

impl JanusConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    #[must_use]
    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    pub cleanup_interval_seconds: u64,
    /// Room sessions older than this are torn down by the cleanup sweep
    pub session_max_age_seconds: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: 300,
            session_max_age_seconds: 24 * 60 * 60,
        }
    }
}

impl SignalingConfig {
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    #[must_use]
    pub const fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_seconds)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // WEBMEET_SERVER__PORT, WEBMEET_JANUS__BASE_URL, ...
        builder = builder.add_source(
            Environment::with_prefix("WEBMEET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP listen address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Check the configuration, reporting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got \"{}\"",
                self.logging.format
            ));
        }

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("logging.level \"{}\" is not a log level", self.logging.level));
        }

        if self.websocket.write_wait_seconds == 0 {
            errors.push("websocket.write_wait_seconds must be positive".to_string());
        }
        if self.websocket.pong_wait_seconds == 0 {
            errors.push("websocket.pong_wait_seconds must be positive".to_string());
        }
        if self.websocket.max_message_size == 0 {
            errors.push("websocket.max_message_size must be positive".to_string());
        }
        if self.websocket.peer_queue_capacity == 0 {
            errors.push("websocket.peer_queue_capacity must be positive".to_string());
        }
        if self.hub.channel_capacity == 0 {
            errors.push("hub.channel_capacity must be positive".to_string());
        }
        if self.hub.signaling_queue_capacity == 0 {
            errors.push("hub.signaling_queue_capacity must be positive".to_string());
        }

        if self.janus.enabled {
            if !(self.janus.base_url.starts_with("http://")
                || self.janus.base_url.starts_with("https://"))
            {
                errors.push(format!(
                    "janus.base_url must be an http(s) URL, got \"{}\"",
                    self.janus.base_url
                ));
            }
            if self.janus.plugin.is_empty() {
                errors.push("janus.plugin must be set".to_string());
            }
            if self.janus.request_timeout_seconds == 0 {
                errors.push("janus.request_timeout_seconds must be positive".to_string());
            }
            if self.janus.keepalive_interval_seconds == 0 {
                errors.push("janus.keepalive_interval_seconds must be positive".to_string());
            }
        }

        if self.signaling.cleanup_interval_seconds == 0 {
            errors.push("signaling.cleanup_interval_seconds must be positive".to_string());
        }
        if self.signaling.session_max_age_seconds == 0 {
            errors.push("signaling.session_max_age_seconds must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.janus.plugin, "janus.plugin.videoroom");
        assert_eq!(config.websocket.peer_queue_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_address() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 9000,
                shutdown_timeout_seconds: 5,
            },
            ..Config::default()
        };

        assert_eq!(config.http_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_ping_period_is_nine_tenths_of_pong_wait() {
        let ws = WebSocketConfig::default();
        assert_eq!(ws.pong_wait(), Duration::from_secs(60));
        assert_eq!(ws.ping_period(), Duration::from_secs(54));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.server.port = 0;
        config.logging.format = "xml".to_string();
        config.janus.base_url = "localhost:8088".to_string();
        config.hub.signaling_queue_capacity = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("hub.signaling_queue_capacity")));
        assert!(errors.iter().any(|e| e.contains("janus.base_url")));
    }

    #[test]
    fn test_disabled_janus_skips_janus_checks() {
        let mut config = Config::default();
        config.janus.enabled = false;
        config.janus.base_url = String::new();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9100\n\n[janus]\nbase_url = \"http://janus:8088/janus\"\napi_secret = \"s3cret\""
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.janus.base_url, "http://janus:8088/janus");
        assert_eq!(config.janus.api_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.janus.request_timeout_seconds, 30);
    }
}
