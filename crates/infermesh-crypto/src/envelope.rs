//! Per-session envelope encryption.
//!
//! Key agreement is ephemeral-static ECDH on secp256k1: the client mints
//! a fresh ephemeral keypair per session against the host's static key,
//! and HKDF-SHA256 turns the shared secret into one 32-byte session key
//! used in both directions. Payloads are sealed with XChaCha20-Poly1305
//! under AAD binding `(sessionId, messageIndex, timestampMs)`, and every
//! envelope carries a recoverable ECDSA signature over
//! `keccak256(ciphertext ‖ aad)` identifying the sender.
//!
//! Chain data stays plaintext on purpose; only session traffic and
//! persisted conversation blobs go through here.

use crate::{keccak256, recover_address, Address, CryptoError, KeyPair, Result};
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{AeadCore, KeyInit, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use secp256k1::{ecdh::SharedSecret, PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

/// HKDF context string; versioned so a future scheme bump cannot
/// collide with existing session keys.
const KDF_INFO: &[u8] = b"infermesh/session-key/v1";

/// Maximum tolerated difference between an envelope timestamp and the
/// local clock.
pub const MAX_CLOCK_SKEW_MS: u64 = 5 * 60 * 1000;

/// Additional authenticated data carried by every envelope. Any
/// mutation of these fields fails authentication on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeAad {
    pub session_id: u64,
    pub message_index: u64,
    pub timestamp_ms: u64,
}

impl EnvelopeAad {
    /// Canonical byte encoding. Field order is fixed by the struct, so
    /// the JSON bytes are stable for a given value.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("aad serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("aad: {e}")))
    }
}

/// Wire form of an encrypted frame payload. All fields hex-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub ephemeral_public_key_hex: String,
    pub nonce_hex: String,
    pub ciphertext_hex: String,
    pub aad_hex: String,
    pub signature_hex: String,
}

/// Symmetric state for one session.
///
/// Both directions use the same key; the ephemeral secret is discarded
/// immediately after derivation and the session key is zeroized on
/// drop, so prior sessions stay unreadable after a later key
/// compromise.
pub struct SessionCipher {
    key: [u8; 32],
    ephemeral_public: PublicKey,
}

impl Drop for SessionCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl SessionCipher {
    /// Client side: mint an ephemeral keypair against the host's static
    /// public key and derive the session key.
    pub fn initiate(host_static: &PublicKey) -> Result<Self> {
        let secp = Secp256k1::new();
        let (ephemeral_secret, ephemeral_public) =
            secp.generate_keypair(&mut rand::rngs::OsRng);
        let shared = SharedSecret::new(host_static, &ephemeral_secret);
        // ephemeral_secret drops here; only the derived key survives
        Ok(Self { key: derive_key(shared), ephemeral_public })
    }

    /// Host side: reconstruct the session key from the client's
    /// ephemeral public key and the host's static secret.
    pub fn respond(host_static: &KeyPair, ephemeral_public_bytes: &[u8]) -> Result<Self> {
        let ephemeral_public = PublicKey::from_slice(ephemeral_public_bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        let shared = SharedSecret::new(&ephemeral_public, host_static.secret_key());
        Ok(Self { key: derive_key(shared), ephemeral_public })
    }

    /// The ephemeral public key advertised in every envelope header.
    pub fn ephemeral_public_bytes(&self) -> Vec<u8> {
        self.ephemeral_public.serialize_uncompressed().to_vec()
    }

    /// Seal `plaintext` under `aad` and sign as `signer`.
    pub fn seal(&self, signer: &KeyPair, aad: &EnvelopeAad, plaintext: &[u8]) -> Result<Envelope> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let nonce = XChaCha20Poly1305::generate_nonce(&mut rand::rngs::OsRng);
        let aad_bytes = aad.to_bytes();

        let ciphertext = cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad: &aad_bytes })
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let digest = keccak256(&[ciphertext.as_slice(), aad_bytes.as_slice()].concat());
        let signature = signer.sign_recoverable(&digest)?;

        Ok(Envelope {
            ephemeral_public_key_hex: hex::encode(self.ephemeral_public_bytes()),
            nonce_hex: hex::encode(nonce),
            ciphertext_hex: hex::encode(&ciphertext),
            aad_hex: hex::encode(&aad_bytes),
            signature_hex: hex::encode(signature),
        })
    }

    /// Open an envelope: recover and check the sender, then decrypt
    /// under the authenticated AAD.
    ///
    /// Replay and clock-skew checks live in [`ReplayGuard`]; callers run
    /// them on the returned AAD before acting on the plaintext.
    pub fn open(
        &self,
        envelope: &Envelope,
        expected_sender: Option<Address>,
    ) -> Result<(EnvelopeAad, Vec<u8>)> {
        let ciphertext = decode_field(&envelope.ciphertext_hex, "ciphertext")?;
        let aad_bytes = decode_field(&envelope.aad_hex, "aad")?;
        let nonce_bytes = decode_field(&envelope.nonce_hex, "nonce")?;
        let signature = decode_field(&envelope.signature_hex, "signature")?;

        if nonce_bytes.len() != 24 {
            return Err(CryptoError::MalformedEnvelope(format!(
                "nonce must be 24 bytes, got {}",
                nonce_bytes.len()
            )));
        }

        let digest = keccak256(&[ciphertext.as_slice(), aad_bytes.as_slice()].concat());
        let sender = recover_address(&digest, &signature)?;
        if let Some(expected) = expected_sender {
            if sender != expected {
                return Err(CryptoError::SenderMismatch {
                    expected: expected.to_string(),
                    recovered: sender.to_string(),
                });
            }
        }

        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let nonce = XNonce::from_slice(&nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, Payload { msg: ciphertext.as_slice(), aad: &aad_bytes })
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let aad = EnvelopeAad::from_bytes(&aad_bytes)?;
        Ok((aad, plaintext))
    }
}

fn derive_key(shared: SharedSecret) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, &shared.secret_bytes());
    let mut key = [0u8; 32];
    hk.expand(KDF_INFO, &mut key).expect("32 bytes is a valid hkdf output length");
    key
}

fn decode_field(hex_str: &str, name: &str) -> Result<Vec<u8>> {
    hex::decode(hex_str).map_err(|e| CryptoError::MalformedEnvelope(format!("{name}: {e}")))
}

/// Per-session, per-direction replay defense.
///
/// Rejects envelopes whose message index does not advance, and
/// envelopes whose timestamp strays more than the skew window from the
/// local clock.
#[derive(Debug)]
pub struct ReplayGuard {
    session_id: u64,
    last_index: Option<u64>,
    max_skew_ms: u64,
}

impl ReplayGuard {
    pub fn new(session_id: u64) -> Self {
        Self { session_id, last_index: None, max_skew_ms: MAX_CLOCK_SKEW_MS }
    }

    pub fn with_max_skew(session_id: u64, max_skew_ms: u64) -> Self {
        Self { session_id, last_index: None, max_skew_ms }
    }

    /// Validate and record an AAD. Envelopes for other sessions are
    /// malformed, not replays.
    pub fn check(&mut self, aad: &EnvelopeAad, now_ms: u64) -> Result<()> {
        if aad.session_id != self.session_id {
            return Err(CryptoError::MalformedEnvelope(format!(
                "envelope for session {}, guard for {}",
                aad.session_id, self.session_id
            )));
        }
        if let Some(last) = self.last_index {
            if aad.message_index <= last {
                return Err(CryptoError::Replay { index: aad.message_index });
            }
        }
        let skew = now_ms.abs_diff(aad.timestamp_ms);
        if skew > self.max_skew_ms {
            return Err(CryptoError::ClockSkew { skew_ms: skew });
        }
        self.last_index = Some(aad.message_index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (SessionCipher, SessionCipher, KeyPair, KeyPair) {
        let client = KeyPair::generate();
        let host = KeyPair::generate();
        let client_cipher = SessionCipher::initiate(host.public_key()).unwrap();
        let host_cipher =
            SessionCipher::respond(&host, &client_cipher.ephemeral_public_bytes()).unwrap();
        (client_cipher, host_cipher, client, host)
    }

    fn aad() -> EnvelopeAad {
        EnvelopeAad { session_id: 7, message_index: 3, timestamp_ms: 1_700_000_000_000 }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (client_cipher, host_cipher, client, _host) = pair();
        let envelope = client_cipher.seal(&client, &aad(), b"hello mesh").unwrap();
        let (opened_aad, plaintext) =
            host_cipher.open(&envelope, Some(client.address())).unwrap();
        assert_eq!(plaintext, b"hello mesh");
        assert_eq!(opened_aad, aad());
    }

    #[test]
    fn test_both_directions_share_one_key() {
        let (client_cipher, host_cipher, _client, host) = pair();
        let envelope = host_cipher.seal(&host, &aad(), b"stream token").unwrap();
        let (_, plaintext) = client_cipher.open(&envelope, Some(host.address())).unwrap();
        assert_eq!(plaintext, b"stream token");
    }

    #[test]
    fn test_aad_mutation_fails_authentication() {
        let (client_cipher, host_cipher, client, _) = pair();
        let mut envelope = client_cipher.seal(&client, &aad(), b"payload").unwrap();
        // Flip one byte of the AAD
        let mut aad_bytes = hex::decode(&envelope.aad_hex).unwrap();
        aad_bytes[0] ^= 0x01;
        envelope.aad_hex = hex::encode(aad_bytes);
        assert!(host_cipher.open(&envelope, None).is_err());
    }

    #[test]
    fn test_ciphertext_tamper_fails() {
        let (client_cipher, host_cipher, client, _) = pair();
        let mut envelope = client_cipher.seal(&client, &aad(), b"payload").unwrap();
        let mut ct = hex::decode(&envelope.ciphertext_hex).unwrap();
        ct[0] ^= 0xff;
        envelope.ciphertext_hex = hex::encode(ct);
        assert!(host_cipher.open(&envelope, None).is_err());
    }

    #[test]
    fn test_sender_mismatch_rejected() {
        let (client_cipher, host_cipher, client, _) = pair();
        let envelope = client_cipher.seal(&client, &aad(), b"payload").unwrap();
        let stranger = KeyPair::generate().address();
        let err = host_cipher.open(&envelope, Some(stranger)).unwrap_err();
        assert!(matches!(err, CryptoError::SenderMismatch { .. }));
    }

    #[test]
    fn test_distinct_sessions_distinct_keys() {
        let host = KeyPair::generate();
        let a = SessionCipher::initiate(host.public_key()).unwrap();
        let b = SessionCipher::initiate(host.public_key()).unwrap();
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_replay_guard_rejects_duplicate_index() {
        let mut guard = ReplayGuard::new(7);
        let now = 1_700_000_000_000;
        let first = EnvelopeAad { session_id: 7, message_index: 5, timestamp_ms: now };
        guard.check(&first, now).unwrap();
        let err = guard.check(&first, now).unwrap_err();
        assert!(matches!(err, CryptoError::Replay { index: 5 }));
        // Lower index is also a replay
        let older = EnvelopeAad { session_id: 7, message_index: 4, timestamp_ms: now };
        assert!(guard.check(&older, now).is_err());
    }

    #[test]
    fn test_replay_guard_rejects_stale_timestamp() {
        let mut guard = ReplayGuard::new(7);
        let now = 1_700_000_000_000u64;
        let stale = EnvelopeAad {
            session_id: 7,
            message_index: 1,
            timestamp_ms: now - MAX_CLOCK_SKEW_MS - 1,
        };
        assert!(matches!(guard.check(&stale, now), Err(CryptoError::ClockSkew { .. })));
    }

    #[test]
    fn test_replay_guard_scoped_to_session() {
        let mut guard = ReplayGuard::new(7);
        let now = 1_700_000_000_000;
        let other = EnvelopeAad { session_id: 8, message_index: 1, timestamp_ms: now };
        assert!(guard.check(&other, now).is_err());
    }
}
