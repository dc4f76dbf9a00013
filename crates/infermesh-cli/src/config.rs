use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Operator CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub chain_id: u64,
    /// Chains TOML shared with the supervisor.
    pub chains_config: PathBuf,
    /// Storage portal for metadata blobs.
    #[serde(default)]
    pub portal_url: Option<String>,
    /// Keystore file for the operator wallet.
    #[serde(default = "default_keystore_path")]
    pub keystore_path: PathBuf,
    /// The host's registered public URL (for `status`).
    #[serde(default)]
    pub public_url: Option<String>,
    /// Supervisor config handed to `start`.
    #[serde(default = "default_host_config")]
    pub host_config: PathBuf,
    /// Pidfile used by `start`/`stop`.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

fn default_keystore_path() -> PathBuf {
    PathBuf::from("keystore.json")
}

fn default_host_config() -> PathBuf {
    PathBuf::from("infermesh-host.toml")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("infermesh-host.pid")
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| CliError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: CliConfig = toml::from_str(
            r#"
            chain_id = 84532
            chains_config = "chains.toml"
            "#,
        )
        .unwrap();
        assert_eq!(config.chain_id, 84532);
        assert_eq!(config.keystore_path, PathBuf::from("keystore.json"));
        assert!(config.portal_url.is_none());
    }
}
