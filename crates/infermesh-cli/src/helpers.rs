//! Parsing and small shared utilities for the command handlers.

use crate::error::{CliError, Result};
use infermesh_chain::{model_id_for, H256, U256};
use std::time::Duration;

/// Parse a decimal token amount (e.g. "5", "0.25") into base units.
pub fn parse_amount(s: &str, decimals: u32) -> Result<U256> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CliError::Other("empty amount".into()));
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac.len() as u32 > decimals {
        return Err(CliError::Other(format!(
            "amount `{s}` has more than {decimals} decimal places"
        )));
    }
    let whole: U256 = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|e| CliError::Other(format!("amount `{s}`: {e}")))?
    };
    let scale = U256::exp10(decimals as usize);
    let mut result = whole
        .checked_mul(scale)
        .ok_or_else(|| CliError::Other(format!("amount `{s}` overflows")))?;
    if !frac.is_empty() {
        let frac_units = U256::from_dec_str(frac)
            .map_err(|e| CliError::Other(format!("amount `{s}`: {e}")))?
            * U256::exp10((decimals as usize) - frac.len());
        result += frac_units;
    }
    Ok(result)
}

/// `--pricing` is quoted in base units per million tokens.
pub fn price_per_token_from_million(units_per_million: &str) -> Result<U256> {
    let per_million = U256::from_dec_str(units_per_million.trim())
        .map_err(|e| CliError::Other(format!("pricing: {e}")))?;
    let million = U256::from(1_000_000u64);
    if (per_million % million) != U256::zero() {
        return Err(CliError::Other(
            "pricing must be a whole number of base units per token (multiple of 1000000)".into(),
        ));
    }
    Ok(per_million / million)
}

/// A model argument: `0x…` 32-byte id, or `repo:filename`.
pub fn parse_model_spec(s: &str) -> Result<H256> {
    if let Some(stripped) = s.strip_prefix("0x") {
        let raw = hex::decode(stripped)
            .map_err(|e| CliError::InvalidModel(format!("{s}: {e}")))?;
        let bytes: [u8; 32] =
            raw.try_into().map_err(|_| CliError::InvalidModel(format!("{s}: not 32 bytes")))?;
        return Ok(H256::from(bytes));
    }
    match s.split_once(':') {
        Some((repo, filename)) if !repo.is_empty() && !filename.is_empty() => {
            Ok(model_id_for(repo, filename))
        }
        _ => Err(CliError::InvalidModel(format!(
            "`{s}` is neither a 0x model id nor repo:filename"
        ))),
    }
}

/// Reachability probe used before spending gas on registration.
pub async fn probe_host(url: &str) -> Result<()> {
    let probe_url = format!("{}/health", url.trim_end_matches('/'));
    let client = reqwest::Client::new();
    let response = client
        .get(&probe_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .map_err(|e| CliError::Network(format!("{probe_url}: {e}")))?;
    if !response.status().is_success() {
        return Err(CliError::Network(format!("{probe_url}: http {}", response.status())));
    }
    Ok(())
}

/// Parse a 32-byte hex private key.
pub fn parse_private_key(hex_str: &str) -> Result<[u8; 32]> {
    let stripped = hex_str.trim().strip_prefix("0x").unwrap_or(hex_str.trim());
    let bytes =
        hex::decode(stripped).map_err(|e| CliError::Other(format!("private key: {e}")))?;
    bytes.try_into().map_err(|_| CliError::Other("private key must be 32 bytes".into()))
}

/// Format base units back to a decimal string for display.
pub fn format_amount(amount: U256, decimals: u32) -> String {
    let scale = U256::exp10(decimals as usize);
    let whole = amount / scale;
    let frac = amount % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac_str = format!("{:0width$}", frac.as_u128(), width = decimals as usize);
    format!("{whole}.{}", frac_str.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_whole() {
        assert_eq!(parse_amount("5", 6).unwrap(), U256::from(5_000_000u64));
    }

    #[test]
    fn test_parse_amount_fractional() {
        assert_eq!(parse_amount("0.25", 6).unwrap(), U256::from(250_000u64));
        assert_eq!(parse_amount("1.5", 18).unwrap(), U256::exp10(18) * 3 / 2);
    }

    #[test]
    fn test_parse_amount_too_many_places() {
        assert!(parse_amount("0.1234567", 6).is_err());
    }

    #[test]
    fn test_pricing_per_million() {
        assert_eq!(price_per_token_from_million("100000000").unwrap(), U256::from(100u64));
        assert!(price_per_token_from_million("1500000").is_ok());
        assert!(price_per_token_from_million("123").is_err());
    }

    #[test]
    fn test_model_spec_hex_and_repo() {
        let hex_id = format!("0x{}", "ab".repeat(32));
        assert_eq!(parse_model_spec(&hex_id).unwrap(), H256::from([0xab; 32]));
        let by_name = parse_model_spec("org/repo:weights.gguf").unwrap();
        assert_eq!(by_name, model_id_for("org/repo", "weights.gguf"));
        assert!(parse_model_spec("nonsense").is_err());
        assert!(parse_model_spec("nonsense").unwrap_err().exit_code() == 5);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(U256::from(5_000_000u64), 6), "5");
        assert_eq!(format_amount(U256::from(4_998_000u64), 6), "4.998");
        assert_eq!(format_amount(U256::zero(), 6), "0");
    }
}
