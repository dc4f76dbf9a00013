//! User identity: one secp256k1 key backs both the chain wallet and
//! the session signing identity, and the storage seed is derived from
//! the address (never from signatures, which wallets do not guarantee
//! to be deterministic).

use crate::error::{Result, SessionError};
use ethers::signers::LocalWallet;
use infermesh_core::ChainId;
use infermesh_crypto::{derive_seed_phrase, phrase_to_entropy, Address, KeyPair};
use zeroize::Zeroizing;

pub struct Identity {
    keypair: KeyPair,
    chain_id: ChainId,
    seed_entropy: [u8; 16],
    seed_phrase: Zeroizing<String>,
}

impl Identity {
    /// Bind a signing key to a chain.
    ///
    /// `cached_seed` (from configuration) takes precedence; otherwise
    /// the seed is derived from the address so it survives cleared
    /// caches and device changes.
    pub fn new(keypair: KeyPair, chain_id: ChainId, cached_seed: Option<String>) -> Result<Self> {
        let phrase = match cached_seed {
            Some(phrase) => phrase,
            None => derive_seed_phrase(&keypair.address(), chain_id.as_u64()),
        };
        let seed_entropy = phrase_to_entropy(&phrase)?;
        Ok(Self { keypair, chain_id, seed_entropy, seed_phrase: Zeroizing::new(phrase) })
    }

    pub fn from_private_key(
        secret: &[u8; 32],
        chain_id: ChainId,
        cached_seed: Option<String>,
    ) -> Result<Self> {
        Self::new(KeyPair::from_secret(secret)?, chain_id, cached_seed)
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Keys the encrypted-at-rest storage wrapper.
    pub fn seed_entropy(&self) -> &[u8; 16] {
        &self.seed_entropy
    }

    pub fn seed_phrase(&self) -> &str {
        &self.seed_phrase
    }

    /// The same key as an ethers wallet for chain transactions.
    pub fn wallet(&self) -> Result<LocalWallet> {
        LocalWallet::from_bytes(&self.keypair.secret_bytes())
            .map_err(|e| SessionError::Validation(format!("wallet binding: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_seed_is_stable_across_instances() {
        let secret = [0x11u8; 32];
        let a = Identity::from_private_key(&secret, ChainId(84532), None).unwrap();
        let b = Identity::from_private_key(&secret, ChainId(84532), None).unwrap();
        assert_eq!(a.seed_entropy(), b.seed_entropy());
        assert_eq!(a.seed_phrase(), b.seed_phrase());
    }

    #[test]
    fn test_cached_seed_takes_precedence() {
        let secret = [0x11u8; 32];
        let derived = Identity::from_private_key(&secret, ChainId(84532), None).unwrap();
        let cached_phrase = derived.seed_phrase().to_string();

        // Another chain would derive differently, but the cached phrase wins
        let pinned =
            Identity::from_private_key(&secret, ChainId(1), Some(cached_phrase)).unwrap();
        assert_eq!(pinned.seed_entropy(), derived.seed_entropy());
    }

    #[test]
    fn test_invalid_cached_seed_rejected() {
        let secret = [0x11u8; 32];
        let result =
            Identity::from_private_key(&secret, ChainId(1), Some("not a phrase".into()));
        assert!(result.is_err());
    }

    #[test]
    fn test_wallet_shares_the_address() {
        use ethers::signers::Signer;
        let secret = [0x22u8; 32];
        let identity = Identity::from_private_key(&secret, ChainId(1), None).unwrap();
        let wallet = identity.wallet().unwrap();
        assert_eq!(wallet.address().as_bytes(), identity.address().as_bytes());
    }
}
