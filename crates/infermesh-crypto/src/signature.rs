use crate::{keccak256, CryptoError, Hash, Result};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use zeroize::Zeroize;

/// A 20-byte Ethereum-style address derived from a public key.
/// This provides type safety over raw `[u8; 20]` arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; 20] {
        self.0
    }

    /// Parse from a hex string, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(stripped)
            .map_err(|e| CryptoError::InvalidAddress(format!("{s}: {e}")))?;
        if bytes.len() != 20 {
            return Err(CryptoError::InvalidAddress(format!(
                "expected 20 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// Lowercase `0x`-prefixed hex, the canonical form used for seed
    /// derivation and storage paths.
    pub fn to_lowercase_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl std::str::FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_lowercase_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Key pair for signing and ECDH.
///
/// # Security
/// The secret key is overwritten in memory when the KeyPair is dropped
/// so key material does not linger.
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        // secp256k1::SecretKey hands out copies of the scalar, so zeroizing
        // a copy is not enough. Overwrite the key in-place with a dummy
        // scalar, then zeroize the copy as well.
        let dummy = [0x01u8; 32];
        if let Ok(dummy_key) = SecretKey::from_slice(&dummy) {
            self.secret_key = dummy_key;
        }
        let mut secret_bytes = self.secret_key.secret_bytes();
        secret_bytes.zeroize();
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        // The bytes were already validated as a scalar; failure here means
        // memory corruption and panicking is the right response.
        let sk = SecretKey::from_slice(&self.secret_key.secret_bytes())
            .unwrap_or_else(|_| panic!("FATAL: KeyPair clone failed"));
        let pk = self.public_key;
        Self { secret_key: sk, public_key: pk }
    }
}

impl KeyPair {
    /// Generate a new random key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut rand::rngs::OsRng);

        Self { secret_key, public_key }
    }

    /// Create key pair from secret key bytes
    pub fn from_secret(bytes: &[u8; 32]) -> Result<Self> {
        let secret_key =
            SecretKey::from_slice(bytes).map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);

        Ok(Self { secret_key, public_key })
    }

    /// Sign a message hash, returning a compact 64-byte signature.
    ///
    /// # Security
    /// Enforces low-S normalization to prevent ECDSA signature
    /// malleability (BIP-62).
    pub fn sign(&self, message_hash: &Hash) -> Result<[u8; 64]> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(message_hash)
            .map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;
        let mut signature = secp.sign_ecdsa(&message, &self.secret_key);
        signature.normalize_s();
        let sig_bytes = signature.serialize_compact();

        let mut result = [0u8; 64];
        result.copy_from_slice(&sig_bytes);
        Ok(result)
    }

    /// Sign a message hash recoverably, returning 65 bytes `r ‖ s ‖ v`.
    ///
    /// Recipients use [`recover_address`] to identify the sender without
    /// an out-of-band public key.
    pub fn sign_recoverable(&self, message_hash: &Hash) -> Result<[u8; 65]> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(message_hash)
            .map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;
        let sig = secp.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (rec_id, compact) = sig.serialize_compact();

        let mut result = [0u8; 65];
        result[..64].copy_from_slice(&compact);
        result[64] = rec_id.to_i32() as u8;
        Ok(result)
    }

    /// Uncompressed SEC1 public key bytes (65, `0x04`-prefixed).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.serialize_uncompressed().to_vec()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Raw secret scalar, for binding the same identity to an external
    /// signer (e.g. a chain wallet). Handle with care.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret_key.secret_bytes()
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Derive address from public key (Ethereum-style)
    pub fn address(&self) -> Address {
        let pubkey_bytes = self.public_key.serialize_uncompressed();
        // Skip the 0x04 prefix, take the last 20 bytes of the hash
        let hash = keccak256(&pubkey_bytes[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        Address(address)
    }
}

/// Verify a compact signature against a message hash and public key.
pub fn verify_signature(
    message_hash: &Hash,
    signature: &[u8; 64],
    public_key: &[u8],
) -> Result<bool> {
    let secp = Secp256k1::new();

    let sig = Signature::from_compact(signature)
        .map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;

    // Reject high-S signatures (BIP-62 / EIP-2)
    {
        let mut normalized = sig;
        normalized.normalize_s();
        if normalized != sig {
            return Ok(false);
        }
    }

    let pubkey = PublicKey::from_slice(public_key)
        .map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;

    let message = Message::from_digest_slice(message_hash)
        .map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;

    match secp.verify_ecdsa(&message, &sig, &pubkey) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

fn recover_public_key(
    message_hash: &Hash,
    signature: &[u8; 64],
    recovery_id: u8,
) -> Result<Vec<u8>> {
    let secp = Secp256k1::new();

    let message = Message::from_digest_slice(message_hash)
        .map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;

    let rec_id = RecoveryId::from_i32(recovery_id as i32)
        .map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;

    let rec_sig = RecoverableSignature::from_compact(signature, rec_id)
        .map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;

    let pubkey = secp
        .recover_ecdsa(&message, &rec_sig)
        .map_err(|e| CryptoError::Secp256k1Error(e.to_string()))?;

    Ok(pubkey.serialize_uncompressed().to_vec())
}

/// Recover the 20-byte address from a message hash and signature.
///
/// The signature must be 65 bytes (`r ‖ s ‖ v`, the recovery id taken
/// from the last byte) or 64 bytes, in which case recovery ids 0 and 1
/// are tried in order.
pub fn recover_address(message_hash: &Hash, signature: &[u8]) -> Result<Address> {
    let (sig_bytes, recovery_ids): ([u8; 64], Vec<u8>) = if signature.len() == 65 {
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&signature[..64]);
        (sig, vec![signature[64]])
    } else if signature.len() == 64 {
        let mut sig = [0u8; 64];
        sig.copy_from_slice(signature);
        (sig, vec![0, 1])
    } else {
        return Err(CryptoError::Secp256k1Error(format!(
            "Invalid signature length: expected 64 or 65, got {}",
            signature.len()
        )));
    };

    for rid in recovery_ids {
        if let Ok(pubkey) = recover_public_key(message_hash, &sig_bytes, rid) {
            if let Ok(addr) = address_from_public_key(&pubkey) {
                return Ok(addr);
            }
        }
    }

    Err(CryptoError::Secp256k1Error("Failed to recover address with any recovery id".into()))
}

/// Derive address from uncompressed public key bytes
pub fn address_from_public_key(public_key: &[u8]) -> Result<Address> {
    if public_key.len() != 65 || public_key[0] != 0x04 {
        return Err(CryptoError::InvalidPublicKey);
    }

    let hash = keccak256(&public_key[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);

    Ok(Address(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let keypair = KeyPair::generate();
        let address = keypair.address();
        assert_eq!(address.as_bytes().len(), 20);
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let hash = keccak256(b"payload");
        let sig = keypair.sign(&hash).unwrap();
        assert!(verify_signature(&hash, &sig, &keypair.public_key_bytes()).unwrap());
    }

    #[test]
    fn test_recoverable_roundtrip() {
        let keypair = KeyPair::generate();
        let hash = keccak256(b"payload");
        let sig = keypair.sign_recoverable(&hash).unwrap();
        let recovered = recover_address(&hash, &sig).unwrap();
        assert_eq!(recovered, keypair.address());
    }

    #[test]
    fn test_recover_rejects_wrong_hash() {
        let keypair = KeyPair::generate();
        let sig = keypair.sign_recoverable(&keccak256(b"payload")).unwrap();
        let recovered = recover_address(&keccak256(b"other"), &sig).unwrap();
        // Recovers successfully, but to a different address
        assert_ne!(recovered, keypair.address());
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = KeyPair::generate().address();
        let parsed = Address::from_hex(&addr.to_lowercase_hex()).unwrap();
        assert_eq!(parsed, addr);
        assert!(Address::from_hex("0x1234").is_err());
    }

    #[test]
    fn test_address_serde() {
        let addr = Address::new([0xab; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(20)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
