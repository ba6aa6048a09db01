// src/config/models.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

fn default_lb_host() -> String {
    "0.0.0.0".to_string()
}

fn default_lb_port() -> u16 {
    8080
}

fn default_backend_servers() -> Vec<String> {
    vec![
        "http://localhost:9001".to_string(),
        "http://localhost:9002".to_string(),
        "http://localhost:9003".to_string(),
    ]
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level configuration for the load balancer.
///
/// Deserialized from YAML or JSON via [`load_config`](super::load_config);
/// every field falls back to its default when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_lb_host")]
    pub lb_host: String,

    #[serde(default = "default_lb_port")]
    pub lb_port: u16,

    #[serde(default = "default_backend_servers")]
    pub backend_servers: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lb_host: default_lb_host(),
            lb_port: default_lb_port(),
            backend_servers: default_backend_servers(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            log_level: default_log_level(),
            health_check: HealthCheckConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Total outbound request timeout, applied per forward attempt.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Outbound connect timeout, applied per forward attempt.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Validate structural sanity of the loaded config.
    ///
    /// This does not reject an empty `backend_servers` list. An empty
    /// initial pool is a startup concern for the entry point (exit code 1),
    /// not a config-parsing error.
    pub fn validate(&self) -> Result<()> {
        if self.lb_port == 0 {
            bail!("lb_port must be a non-zero port number");
        }
        for server in &self.backend_servers {
            Url::parse(server)
                .map_err(|e| anyhow::anyhow!("invalid backend_servers entry '{server}': {e}"))?;
        }
        self.health_check.validate()?;
        Ok(())
    }
}

fn default_health_check_interval() -> f64 {
    5.0
}

fn default_health_check_timeout() -> f64 {
    2.0
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

fn default_health_check_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_threshold() -> u32 {
    2
}

/// Tunables for the background health checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_check_interval")]
    pub interval_secs: f64,

    #[serde(default = "default_health_check_timeout")]
    pub timeout_secs: f64,

    #[serde(default = "default_health_check_path")]
    pub path: String,

    #[serde(default = "default_health_check_method")]
    pub method: String,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    #[serde(default = "default_threshold")]
    pub healthy_threshold: u32,

    #[serde(default = "default_threshold")]
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_check_interval(),
            timeout_secs: default_health_check_timeout(),
            path: default_health_check_path(),
            method: default_health_check_method(),
            expected_status: default_expected_status(),
            healthy_threshold: default_threshold(),
            unhealthy_threshold: default_threshold(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    /// Probe path with a leading "/" enforced.
    pub fn normalized_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.healthy_threshold == 0 {
            bail!("health_check.healthy_threshold must be >= 1");
        }
        if self.unhealthy_threshold == 0 {
            bail!("health_check.unhealthy_threshold must be >= 1");
        }
        if reqwest::Method::from_bytes(self.method.as_bytes()).is_err() {
            bail!("health_check.method '{}' is not a valid HTTP method", self.method);
        }
        Ok(())
    }
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Optional Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}
