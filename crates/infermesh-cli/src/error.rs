use infermesh_chain::ChainError;
use thiserror::Error;

/// CLI failure classes, each with a stable process exit code.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Other(_) => 1,
            CliError::Config(_) => 2,
            CliError::Chain(_) => 3,
            CliError::Network(_) => 4,
            CliError::InvalidModel(_) => 5,
        }
    }
}

impl From<ChainError> for CliError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::MissingField(_) | ChainError::InvalidConfig(_) => {
                CliError::Config(e.to_string())
            }
            ChainError::UnknownModel(m) => CliError::InvalidModel(m),
            other => CliError::Chain(other.to_string()),
        }
    }
}

impl From<infermesh_crypto::CryptoError> for CliError {
    fn from(e: infermesh_crypto::CryptoError) -> Self {
        CliError::Other(e.to_string())
    }
}

impl From<infermesh_storage::StorageError> for CliError {
    fn from(e: infermesh_storage::StorageError) -> Self {
        CliError::Network(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Other("x".into()).exit_code(), 1);
        assert_eq!(CliError::Config("x".into()).exit_code(), 2);
        assert_eq!(CliError::Chain("x".into()).exit_code(), 3);
        assert_eq!(CliError::Network("x".into()).exit_code(), 4);
        assert_eq!(CliError::InvalidModel("x".into()).exit_code(), 5);
    }

    #[test]
    fn test_chain_config_errors_map_to_config() {
        let e: CliError = ChainError::MissingField("stablecoin_address").into();
        assert_eq!(e.exit_code(), 2);
        let e: CliError = ChainError::Reverted("nope".into()).into();
        assert_eq!(e.exit_code(), 3);
    }
}
