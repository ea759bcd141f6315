//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use hook_relay_core::feishu::{FeishuApiConfig, DEFAULT_API_BASE_URL};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default location of the relay configuration file.
pub const DEFAULT_APP_CONFIG_PATH: &str = "feishu_config.json";

/// Service configuration
///
/// Every section carries serde defaults, so a partial file (or none at all)
/// still yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Outbound Feishu Open API settings
    pub feishu: FeishuSettings,

    /// Path of the JSON file holding credentials and chat routing
    pub app_config_path: String,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            feishu: FeishuSettings::default(),
            app_config_path: DEFAULT_APP_CONFIG_PATH.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Reject settings the service cannot start with.
    ///
    /// # Errors
    /// - `ConfigError::Invalid` - zero port, empty API base URL or a zero timeout
    /// - `ConfigError::Missing` - empty relay configuration path
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be greater than zero".to_string(),
            });
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "server.host".to_string(),
            });
        }

        if self.feishu.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "feishu.api_base_url must not be empty".to_string(),
            });
        }

        if self.feishu.token_timeout_seconds == 0 || self.feishu.send_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "feishu timeouts must be at least one second".to_string(),
            });
        }

        if self.app_config_path.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "app_config_path".to_string(),
            });
        }

        Ok(())
    }

    /// Address string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8002,
            shutdown_timeout_seconds: 30,
            max_body_size: 5 * 1024 * 1024, // 5MB
        }
    }
}

/// Feishu Open API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeishuSettings {
    pub api_base_url: String,

    /// Timeout for tenant token requests
    pub token_timeout_seconds: u64,

    /// Timeout for message sends
    pub send_timeout_seconds: u64,
}

impl Default for FeishuSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_timeout_seconds: 5,
            send_timeout_seconds: 10,
        }
    }
}

impl FeishuSettings {
    /// Client settings for the core Feishu client.
    pub fn to_api_config(&self) -> FeishuApiConfig {
        FeishuApiConfig {
            api_base_url: self.api_base_url.trim_end_matches('/').to_string(),
            token_timeout: Duration::from_secs(self.token_timeout_seconds),
            send_timeout: Duration::from_secs(self.send_timeout_seconds),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
