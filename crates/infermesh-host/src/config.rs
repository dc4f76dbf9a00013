use crate::restart::RestartPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Supervisor configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Inference process settings
    pub inference: InferenceConfig,

    /// Chain access for proof submission
    pub chain: ChainAccessConfig,

    /// Storage portal for checkpoint blobs
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Restart policy
    #[serde(default)]
    pub restart: RestartPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Explicit binary path; PATH and fallback locations otherwise.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Models loaded at startup.
    #[serde(default)]
    pub models_to_preload: Vec<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// The operator's registered public URL, forwarded to the engine.
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAccessConfig {
    /// Path to the chains TOML (shared with the CLI).
    pub chains_config: PathBuf,
    pub chain_id: u64,
    /// Path to the operator's keystore or raw key file.
    pub key_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub portal_url: String,
    /// Checkpoint delta retention; `0` retains indefinitely (default).
    #[serde(default)]
    pub delta_retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_name: String,
    /// Rotate after this many bytes.
    pub max_file_bytes: u64,
    /// Rotated files kept.
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "infermesh-host.log".into(),
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

fn default_listen_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8091
}

fn default_log_level() -> String {
    "info".into()
}

impl SupervisorConfig {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| crate::HostError::Config(format!("{}: {e}", path.display())))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| crate::HostError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.inference.public_url.is_empty() {
            return Err(crate::HostError::Config("inference.public_url is required".into()));
        }
        if !self.inference.public_url.starts_with("http://")
            && !self.inference.public_url.starts_with("https://")
        {
            return Err(crate::HostError::Config(format!(
                "malformed public_url: {}",
                self.inference.public_url
            )));
        }
        Ok(())
    }

    /// Base URL of the local inference HTTP API.
    pub fn local_api_url(&self) -> String {
        format!("http://{}:{}", self.inference.listen_address, self.inference.port)
    }

    /// Local WebSocket carrying session lifecycle events.
    pub fn events_ws_url(&self) -> String {
        format!("ws://{}:{}/v1/events", self.inference.listen_address, self.inference.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [inference]
        public_url = "https://gpu.example.org"

        [chain]
        chains_config = "chains.toml"
        chain_id = 84532
        key_file = "host.key"

        [storage]
        portal_url = "https://portal.example.org"
    "#;

    #[test]
    fn test_minimal_config_with_defaults() {
        let config: SupervisorConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.inference.port, 8091);
        assert_eq!(config.logging.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.logging.max_files, 5);
        assert!(matches!(config.restart, RestartPolicy::OnFailure));
        assert_eq!(config.local_api_url(), "http://127.0.0.1:8091");
        assert_eq!(config.events_ws_url(), "ws://127.0.0.1:8091/v1/events");
        assert_eq!(config.storage.delta_retention_days, 0);
    }

    #[test]
    fn test_missing_public_url_rejected() {
        let bad = MINIMAL.replace("public_url = \"https://gpu.example.org\"", "public_url = \"\"");
        let config: SupervisorConfig = toml::from_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_restart_policy_parses() {
        let toml_src = format!(
            "{MINIMAL}\n[restart]\npolicy = \"custom\"\nmax_attempts = 10\nbase_delay_secs = 2\nmultiplier = 3\nreset_window_secs = 120\n"
        );
        let config: SupervisorConfig = toml::from_str(&toml_src).unwrap();
        assert!(matches!(config.restart, RestartPolicy::Custom { max_attempts: 10, .. }));
    }
}
