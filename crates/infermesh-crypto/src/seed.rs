//! Deterministic storage-seed phrases.
//!
//! The seed that keys a user's encrypted storage is derived purely from
//! the wallet address and chain id, never from a signature: wallets do
//! not guarantee deterministic signatures, and the seed must be
//! re-derivable on any device to reach previously stored blobs.
//!
//! Encoding: 16 bytes of entropy become 13 data words over a fixed
//! 1024-word list (12 words of 10 bits, then one 8-bit word restricted
//! to the first 256 entries), followed by 2 checksum words computed
//! from a hash of the first 13.

use crate::{sha256, Address, CryptoError, Result};
use std::sync::OnceLock;

/// Domain separator mixed into the entropy hash so seeds cannot collide
/// with any other address-derived value.
const DOMAIN_SEP: &str = "/infermesh-storage-seed/";

const WORD_COUNT: usize = 1024;
/// Entropy words: 12 full-range + 1 restricted.
const DATA_WORDS: usize = 13;
/// Total phrase length including the 2 checksum words.
pub const PHRASE_WORDS: usize = 15;
/// The 13th data word carries 8 bits, so it must index the first 256
/// entries of the list.
const LAST_WORD_RANGE: u16 = 256;

fn wordlist() -> &'static [&'static str] {
    static WORDS: OnceLock<Vec<&'static str>> = OnceLock::new();
    WORDS
        .get_or_init(|| {
            let words: Vec<&'static str> =
                include_str!("wordlist.txt").lines().filter(|l| !l.is_empty()).collect();
            assert_eq!(words.len(), WORD_COUNT, "seed wordlist must hold exactly 1024 words");
            words
        })
        .as_slice()
}

/// Derive the 16 bytes of seed entropy for `(address, chain_id)`.
///
/// Idempotent by construction: the same pair always yields the same
/// entropy on any device.
pub fn derive_seed_entropy(address: &Address, chain_id: u64) -> [u8; 16] {
    let preimage = format!("{}{}{}", address.to_lowercase_hex(), DOMAIN_SEP, chain_id);
    let digest = sha256(preimage.as_bytes());
    let mut entropy = [0u8; 16];
    entropy.copy_from_slice(&digest[..16]);
    entropy
}

/// Derive the full 15-word phrase for `(address, chain_id)`.
pub fn derive_seed_phrase(address: &Address, chain_id: u64) -> String {
    entropy_to_phrase(&derive_seed_entropy(address, chain_id))
}

/// Encode 16 bytes of entropy as a 15-word phrase.
pub fn entropy_to_phrase(entropy: &[u8; 16]) -> String {
    let words = wordlist();
    let mut indices = Vec::with_capacity(PHRASE_WORDS);

    let mut reader = BitReader::new(entropy);
    for _ in 0..12 {
        indices.push(reader.take(10));
    }
    indices.push(reader.take(8)); // restricted last data word
    debug_assert!(reader.exhausted());

    let data_phrase: Vec<&str> = indices.iter().map(|&i| words[i as usize]).collect();
    for index in checksum_indices(&data_phrase) {
        indices.push(index);
    }

    indices.iter().map(|&i| words[i as usize]).collect::<Vec<_>>().join(" ")
}

/// Decode and validate a 15-word phrase back into its 16 entropy bytes.
pub fn phrase_to_entropy(phrase: &str) -> Result<[u8; 16]> {
    let words = wordlist();
    let parts: Vec<&str> = phrase.split_whitespace().collect();
    if parts.len() != PHRASE_WORDS {
        return Err(CryptoError::InvalidSeedPhrase(format!(
            "expected {PHRASE_WORDS} words, got {}",
            parts.len()
        )));
    }

    let mut indices = Vec::with_capacity(PHRASE_WORDS);
    for part in &parts {
        let index = words
            .iter()
            .position(|w| w == part)
            .ok_or_else(|| CryptoError::InvalidSeedPhrase(format!("unknown word: {part}")))?;
        indices.push(index as u16);
    }

    if indices[DATA_WORDS - 1] >= LAST_WORD_RANGE {
        return Err(CryptoError::InvalidSeedPhrase(
            "thirteenth word outside the restricted range".into(),
        ));
    }

    let expected = checksum_indices(&parts[..DATA_WORDS]);
    if indices[13] != expected[0] || indices[14] != expected[1] {
        return Err(CryptoError::InvalidSeedPhrase("checksum mismatch".into()));
    }

    let mut writer = BitWriter::new();
    for &index in &indices[..12] {
        writer.push(index, 10);
    }
    writer.push(indices[12], 8);

    let bytes = writer.into_bytes();
    let mut entropy = [0u8; 16];
    entropy.copy_from_slice(&bytes);
    Ok(entropy)
}

/// Two 10-bit checksum indices from a hash of the first 13 words.
fn checksum_indices(data_words: &[&str]) -> [u16; 2] {
    let joined = data_words.join(" ");
    let digest = sha256(joined.as_bytes());
    let c1 = ((digest[0] as u16) << 2) | ((digest[1] as u16) >> 6);
    let c2 = (((digest[1] as u16) & 0x3f) << 4) | ((digest[2] as u16) >> 4);
    [c1, c2]
}

struct BitReader<'a> {
    bytes: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, bit_pos: 0 }
    }

    fn take(&mut self, bits: usize) -> u16 {
        let mut value = 0u16;
        for _ in 0..bits {
            let byte = self.bytes[self.bit_pos / 8];
            let bit = (byte >> (7 - (self.bit_pos % 8))) & 1;
            value = (value << 1) | bit as u16;
            self.bit_pos += 1;
        }
        value
    }

    fn exhausted(&self) -> bool {
        self.bit_pos == self.bytes.len() * 8
    }
}

struct BitWriter {
    bytes: Vec<u8>,
    bit_pos: usize,
}

impl BitWriter {
    fn new() -> Self {
        Self { bytes: Vec::new(), bit_pos: 0 }
    }

    fn push(&mut self, value: u16, bits: usize) {
        for i in (0..bits).rev() {
            if self.bit_pos % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            let byte = self.bytes.last_mut().expect("pushed above");
            *byte |= bit << (7 - (self.bit_pos % 8));
            self.bit_pos += 1;
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let a = derive_seed_phrase(&addr(0xab), 84532);
        let b = derive_seed_phrase(&addr(0xab), 84532);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_inputs_distinct_phrases() {
        let base = derive_seed_phrase(&addr(0xab), 84532);
        assert_ne!(base, derive_seed_phrase(&addr(0xac), 84532));
        assert_ne!(base, derive_seed_phrase(&addr(0xab), 8453));
    }

    #[test]
    fn test_phrase_has_fifteen_known_words() {
        let phrase = derive_seed_phrase(&addr(0x01), 1);
        let words: Vec<&str> = phrase.split(' ').collect();
        assert_eq!(words.len(), PHRASE_WORDS);
        for word in words {
            assert!(wordlist().contains(&word), "unknown word {word}");
        }
    }

    #[test]
    fn test_thirteenth_word_restricted() {
        // The 13th data word carries only 8 bits for every derivation
        for i in 0..50u8 {
            let phrase = derive_seed_phrase(&addr(i), u64::from(i));
            let thirteenth = phrase.split(' ').nth(12).unwrap();
            let index = wordlist().iter().position(|w| *w == thirteenth).unwrap();
            assert!(index < LAST_WORD_RANGE as usize);
        }
    }

    #[test]
    fn test_roundtrip_from_derived_phrase() {
        let entropy = derive_seed_entropy(&addr(0x42), 84532);
        let phrase = entropy_to_phrase(&entropy);
        assert_eq!(phrase_to_entropy(&phrase).unwrap(), entropy);
    }

    #[test]
    fn test_checksum_detects_word_swap() {
        let phrase = derive_seed_phrase(&addr(0x42), 84532);
        let mut words: Vec<&str> = phrase.split(' ').collect();
        // Replace the first word with a different list word
        words[0] = if words[0] == "abandon" { "ability" } else { "abandon" };
        let tampered = words.join(" ");
        assert!(phrase_to_entropy(&tampered).is_err());
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(phrase_to_entropy("abandon ability").is_err());
    }

    proptest! {
        #[test]
        fn prop_entropy_roundtrip(bytes in prop::array::uniform16(any::<u8>())) {
            let phrase = entropy_to_phrase(&bytes);
            prop_assert_eq!(phrase_to_entropy(&phrase).unwrap(), bytes);
        }
    }
}
