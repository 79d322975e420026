//! Utility functions for identifiers, hashing and serialization

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Human facing document number, e.g. `REQ-2026-00042`
pub fn document_number(prefix: &str, year: i32, seq: u64) -> String {
    format!("{prefix}-{year}-{seq:05}")
}

/// Signature tokens are only ever stored as their digest
pub fn token_digest(token: &str) -> String {
    sha256::digest(token)
}

/// Render any boundary record as JSON
pub fn to_json<T: serde::Serialize>(record: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_numbers_are_zero_padded() {
        assert_eq!(document_number("PO", 2026, 7), "PO-2026-00007");
        assert_eq!(document_number("TKT", 2025, 123456), "TKT-2025-123456");
    }

    #[test]
    fn token_digest_is_stable_hex() {
        let a = token_digest("tok_abc");
        assert_eq!(a, token_digest("tok_abc"));
        assert_ne!(a, token_digest("tok_abd"));
        assert_eq!(a.len(), 64);
    }
}
