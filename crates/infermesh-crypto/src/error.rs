use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(String),

    #[error("Decryption failed (authentication)")]
    DecryptionFailed,

    #[error("Replayed envelope: message index {index} already processed")]
    Replay { index: u64 },

    #[error("Envelope timestamp skew {skew_ms}ms exceeds the allowed window")]
    ClockSkew { skew_ms: u64 },

    #[error("Sender address mismatch: expected {expected}, recovered {recovered}")]
    SenderMismatch { expected: String, recovered: String },

    #[error("Malformed envelope field: {0}")]
    MalformedEnvelope(String),

    #[error("Invalid seed phrase: {0}")]
    InvalidSeedPhrase(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
