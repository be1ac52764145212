//! Configuration module for portway
//!
//! Handles loading and validation of the YAML configuration file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub lb: LbConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bind address of the management API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Bind address and forwarding behavior of the proxy listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LbConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_lb_port")]
    pub port: u16,
    /// Overall deadline for one upstream exchange, in seconds.
    #[serde(default = "default_forward_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub sticky: StickyConfig,
}

/// Sticky-session lifetime tuning for stateful services.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StickyConfig {
    /// Seconds of inactivity before a session mapping expires.
    #[serde(default = "default_sticky_ttl")]
    pub ttl: u64,
    /// Minimum seconds between sweeps of expired mappings.
    #[serde(default = "default_sticky_cleanup_interval")]
    pub cleanup_interval: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Seconds between probe sweeps over all instances.
    #[serde(default = "default_check_interval")]
    pub interval: u64,
    /// Per-probe timeout in seconds.
    #[serde(default = "default_check_timeout")]
    pub timeout: u64,
    /// Probe attempts per instance before it is declared unhealthy.
    #[serde(default = "default_check_retries")]
    pub retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; stdout only when absent.
    pub file: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_api_port() -> u16 {
    8081
}
fn default_lb_port() -> u16 {
    8080
}
fn default_forward_timeout() -> u64 {
    30
}
fn default_sticky_ttl() -> u64 {
    300
}
fn default_sticky_cleanup_interval() -> u64 {
    60
}
fn default_check_interval() -> u64 {
    5
}
fn default_check_timeout() -> u64 {
    2
}
fn default_check_retries() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_api_port(),
        }
    }
}

impl Default for LbConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_lb_port(),
            timeout: default_forward_timeout(),
            sticky: StickyConfig::default(),
        }
    }
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            ttl: default_sticky_ttl(),
            cleanup_interval: default_sticky_cleanup_interval(),
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_check_interval(),
            timeout: default_check_timeout(),
            retries: default_check_retries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {}", e)))
    }
}
