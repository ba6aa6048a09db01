// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Load configuration from a file (YAML or JSON), falling back to the
/// documented defaults if no file exists at `path`.
///
/// Only a file that exists but fails to parse is a hard error. A missing
/// path falls back to pure defaults.
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!(
            path = %path.display(),
            "config file not found, using built-in defaults"
        );
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .context("Failed to read config file")?;

    let is_yaml = matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    );

    let config: Config = if is_yaml {
        serde_yaml::from_str(&contents).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(&contents).context("Failed to parse JSON config")?
    };

    config.validate()?;
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let config = load_config("/nonexistent/path/config.yaml").await.unwrap();
        assert_eq!(config.lb_port, 8080);
    }

    #[tokio::test]
    async fn loads_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(
            &path,
            "lb_port: 9000\nbackend_servers:\n  - http://localhost:7001\n",
        )
        .await
        .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.lb_port, 9000);
        assert_eq!(config.backend_servers, vec!["http://localhost:7001"]);
    }

    #[tokio::test]
    async fn loads_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"lb_port": 9100}"#).await.unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.lb_port, 9100);
    }

    #[tokio::test]
    async fn rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, "not: valid: yaml: at: all:").await.unwrap();

        assert!(load_config(&path).await.is_err());
    }
}
