//! Ethereum-keystore-style key files.
//!
//! scrypt KDF (keystore v3 defaults), AES-128-CTR cipher, keccak MAC.

use crate::error::{CliError, Result};
use infermesh_crypto::{keccak256, KeyPair};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::Zeroizing;

#[derive(Debug, Serialize, Deserialize)]
pub struct Keystore {
    pub version: u32,
    pub address: String,
    pub crypto: CryptoSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CryptoSection {
    pub cipher: String,
    pub ciphertext: String,
    pub cipherparams: CipherParams,
    pub kdf: String,
    pub kdfparams: KdfParams,
    pub mac: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CipherParams {
    pub iv: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KdfParams {
    pub salt: String,
    pub n: u32,
    pub r: u32,
    pub p: u32,
    pub dklen: u32,
}

/// Derive a 32-byte encryption key using scrypt.
/// Params match Ethereum keystore v3 defaults (N=16384, r=8, p=1).
fn derive_key_scrypt(password: &[u8], salt: &[u8]) -> Result<[u8; 32]> {
    let params = scrypt::Params::new(14, 8, 1, 32)
        .map_err(|e| CliError::Other(format!("scrypt params: {e}")))?;
    let mut key = [0u8; 32];
    scrypt::scrypt(password, salt, &params, &mut key)
        .map_err(|e| CliError::Other(format!("scrypt: {e}")))?;
    Ok(key)
}

/// AES-128-CTR encrypt/decrypt (symmetric, same operation both ways).
fn aes128_ctr_apply(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    use aes::cipher::{KeyIvInit, StreamCipher};
    type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

    let mut cipher = Aes128Ctr::new_from_slices(key, iv)
        .map_err(|e| CliError::Other(format!("AES-128-CTR init: {e}")))?;
    let mut buffer = data.to_vec();
    cipher.apply_keystream(&mut buffer);
    Ok(buffer)
}

/// Constant-time comparison to keep MAC checks timing-safe.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn mac_for(derived: &[u8; 32], ciphertext: &[u8]) -> [u8; 32] {
    keccak256(&[&derived[16..32], ciphertext].concat())
}

/// Seal a secret key under a password.
pub fn encrypt_key(secret: &[u8; 32], password: &str) -> Result<Keystore> {
    let keypair = KeyPair::from_secret(secret)?;
    let mut salt = [0u8; 32];
    let mut iv = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let derived = derive_key_scrypt(password.as_bytes(), &salt)?;
    let ciphertext = aes128_ctr_apply(&derived[..16], &iv, secret)?;
    let mac = mac_for(&derived, &ciphertext);

    Ok(Keystore {
        version: 3,
        address: keypair.address().to_lowercase_hex(),
        crypto: CryptoSection {
            cipher: "aes-128-ctr".into(),
            ciphertext: hex::encode(&ciphertext),
            cipherparams: CipherParams { iv: hex::encode(iv) },
            kdf: "scrypt".into(),
            kdfparams: KdfParams { salt: hex::encode(salt), n: 16384, r: 8, p: 1, dklen: 32 },
            mac: hex::encode(mac),
        },
    })
}

/// Open a keystore with a password; MAC is checked before decryption
/// output is trusted.
pub fn decrypt_key(keystore: &Keystore, password: &str) -> Result<Zeroizing<[u8; 32]>> {
    if keystore.crypto.kdf != "scrypt" || keystore.crypto.cipher != "aes-128-ctr" {
        return Err(CliError::Other(format!(
            "unsupported keystore scheme {}/{}",
            keystore.crypto.kdf, keystore.crypto.cipher
        )));
    }
    let salt = hex::decode(&keystore.crypto.kdfparams.salt)
        .map_err(|e| CliError::Other(format!("keystore salt: {e}")))?;
    let iv = hex::decode(&keystore.crypto.cipherparams.iv)
        .map_err(|e| CliError::Other(format!("keystore iv: {e}")))?;
    let ciphertext = hex::decode(&keystore.crypto.ciphertext)
        .map_err(|e| CliError::Other(format!("keystore ciphertext: {e}")))?;
    let expected_mac = hex::decode(&keystore.crypto.mac)
        .map_err(|e| CliError::Other(format!("keystore mac: {e}")))?;

    let derived = derive_key_scrypt(password.as_bytes(), &salt)?;
    let mac = mac_for(&derived, &ciphertext);
    if !constant_time_eq(&mac, &expected_mac) {
        return Err(CliError::Other("wrong password (MAC mismatch)".into()));
    }

    let plaintext = aes128_ctr_apply(&derived[..16], &iv, &ciphertext)?;
    let secret: [u8; 32] = plaintext
        .try_into()
        .map_err(|_| CliError::Other("keystore payload is not 32 bytes".into()))?;
    Ok(Zeroizing::new(secret))
}

pub fn load(path: &Path) -> Result<Keystore> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| CliError::Config(format!("keystore: {e}")))
}

pub fn save(path: &Path, keystore: &Keystore) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(keystore).expect("keystore serializes"))?;
    Ok(())
}
