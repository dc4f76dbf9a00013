//! # InferMesh Cryptography
//!
//! Cryptographic primitives for the InferMesh session protocol.
//!
//! ## Features
//! - secp256k1 key pairs, low-S signing, address recovery
//! - Per-session envelope encryption (ECDH + HKDF + XChaCha20-Poly1305)
//! - Deterministic storage-seed phrases derived from wallet addresses
//! - Hash functions (Keccak256, SHA-256)

pub mod envelope;
pub mod error;
pub mod hash;
pub mod seed;
pub mod signature;

pub use envelope::{Envelope, EnvelopeAad, ReplayGuard, SessionCipher};
pub use error::{CryptoError, Result};
pub use hash::{keccak256, sha256, Hash};
pub use seed::{derive_seed_entropy, derive_seed_phrase, phrase_to_entropy};
pub use signature::{recover_address, verify_signature, Address, KeyPair};
