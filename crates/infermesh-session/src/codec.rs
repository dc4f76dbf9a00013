//! Encrypted frame codec.
//!
//! An encrypted frame is the plain frame's JSON sealed into an
//! envelope, shipped as `{"type": "encrypted_<kind>", ...envelope}`.
//! The decrypted payload must parse back to the same kind. Plaintext
//! framing is only for `encryption = false` sessions (development);
//! production sessions always seal.

use crate::error::{Result, SessionError};
use crate::frames::Frame;
use infermesh_crypto::{Address, Envelope, EnvelopeAad, KeyPair, ReplayGuard, SessionCipher};
use serde_json::Value;

const ENCRYPTED_PREFIX: &str = "encrypted_";

/// Per-session codec state: the shared cipher, this side's signing
/// key, the peer's expected address and the replay guard for inbound
/// envelopes. Envelope sequence numbers are independent of message
/// indexes; each direction counts its own wire frames.
pub struct FrameCodec {
    session_id: u64,
    cipher: Option<SessionCipher>,
    signer: KeyPair,
    peer: Address,
    guard: ReplayGuard,
    out_seq: u64,
}

impl FrameCodec {
    pub fn encrypted(
        session_id: u64,
        cipher: SessionCipher,
        signer: KeyPair,
        peer: Address,
    ) -> Self {
        Self {
            session_id,
            cipher: Some(cipher),
            signer,
            peer,
            guard: ReplayGuard::new(session_id),
            out_seq: 0,
        }
    }

    /// Plaintext mode; frame bodies go over the wire as-is.
    pub fn plaintext(session_id: u64, signer: KeyPair, peer: Address) -> Self {
        Self {
            session_id,
            cipher: None,
            signer,
            peer,
            guard: ReplayGuard::new(session_id),
            out_seq: 0,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Serialize a frame for the wire.
    pub fn encode(&mut self, frame: &Frame) -> Result<String> {
        let Some(cipher) = &self.cipher else {
            return serde_json::to_string(frame)
                .map_err(|e| SessionError::Protocol(e.to_string()));
        };

        let plaintext =
            serde_json::to_vec(frame).map_err(|e| SessionError::Protocol(e.to_string()))?;
        let aad = EnvelopeAad {
            session_id: self.session_id,
            message_index: self.out_seq,
            timestamp_ms: now_ms(),
        };
        self.out_seq += 1;
        let envelope = cipher.seal(&self.signer, &aad, &plaintext)?;

        let mut body = serde_json::to_value(&envelope)
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        body.as_object_mut()
            .expect("envelope serializes to an object")
            .insert("type".into(), Value::String(format!("{ENCRYPTED_PREFIX}{}", frame.kind())));
        Ok(body.to_string())
    }

    /// Parse (and, in encrypted mode, open and replay-check) one wire
    /// message.
    pub fn decode(&mut self, text: &str) -> Result<Frame> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| SessionError::Protocol(format!("not json: {e}")))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Protocol("frame missing type".into()))?;

        let Some(inner_kind) = kind.strip_prefix(ENCRYPTED_PREFIX) else {
            if self.cipher.is_some() {
                return Err(SessionError::Protocol(format!(
                    "plaintext frame `{kind}` on an encrypted session"
                )));
            }
            return serde_json::from_value(value)
                .map_err(|e| SessionError::Protocol(e.to_string()));
        };
        let inner_kind = inner_kind.to_string();

        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| SessionError::Protocol("encrypted frame on a plaintext session".into()))?;
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| SessionError::Protocol(format!("bad envelope: {e}")))?;
        let (aad, plaintext) = cipher.open(&envelope, Some(self.peer))?;
        self.guard.check(&aad, now_ms()).map_err(SessionError::Encryption)?;

        let frame: Frame = serde_json::from_slice(&plaintext)
            .map_err(|e| SessionError::Protocol(format!("bad payload: {e}")))?;
        if frame.kind() != inner_kind {
            return Err(SessionError::Protocol(format!(
                "envelope type `{inner_kind}` wraps a `{}` payload",
                frame.kind()
            )));
        }
        Ok(frame)
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::PromptParameters;
    use infermesh_crypto::CryptoError;

    fn codec_pair() -> (FrameCodec, FrameCodec) {
        let client = KeyPair::generate();
        let host = KeyPair::generate();
        let client_cipher = SessionCipher::initiate(host.public_key()).unwrap();
        let host_cipher =
            SessionCipher::respond(&host, &client_cipher.ephemeral_public_bytes()).unwrap();
        let client_codec =
            FrameCodec::encrypted(7, client_cipher, client.clone(), host.address());
        let host_codec = FrameCodec::encrypted(7, host_cipher, host, client.address());
        (client_codec, host_codec)
    }

    fn prompt() -> Frame {
        Frame::Prompt {
            chain_id: 1,
            session_id: 7,
            message_index: 0,
            content: "Hello".into(),
            parameters: PromptParameters::default(),
        }
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let (mut client, mut host) = codec_pair();
        let wire = client.encode(&prompt()).unwrap();
        let value: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value["type"], "encrypted_prompt");
        assert!(value.get("ciphertextHex").is_some());
        assert!(!wire.contains("Hello"));

        let decoded = host.decode(&wire).unwrap();
        assert_eq!(decoded, prompt());
    }

    #[test]
    fn test_replayed_wire_frame_rejected() {
        let (mut client, mut host) = codec_pair();
        let wire = client.encode(&prompt()).unwrap();
        host.decode(&wire).unwrap();
        let err = host.decode(&wire).unwrap_err();
        assert!(matches!(err, SessionError::Encryption(CryptoError::Replay { .. })));
    }

    #[test]
    fn test_plaintext_frame_rejected_on_encrypted_session() {
        let (_, mut host) = codec_pair();
        let plain = serde_json::to_string(&prompt()).unwrap();
        assert!(matches!(host.decode(&plain), Err(SessionError::Protocol(_))));
    }

    #[test]
    fn test_wrong_sender_rejected() {
        let (mut client, _) = codec_pair();
        let (_, mut host_expecting_other) = codec_pair();
        let wire = client.encode(&prompt()).unwrap();
        assert!(host_expecting_other.decode(&wire).is_err());
    }

    #[test]
    fn test_plaintext_mode_roundtrip() {
        let client = KeyPair::generate();
        let host = KeyPair::generate();
        let mut tx = FrameCodec::plaintext(7, client.clone(), host.address());
        let mut rx = FrameCodec::plaintext(7, host, client.address());
        let wire = tx.encode(&prompt()).unwrap();
        assert!(wire.contains("\"type\":\"prompt\""));
        assert_eq!(rx.decode(&wire).unwrap(), prompt());
    }
}
