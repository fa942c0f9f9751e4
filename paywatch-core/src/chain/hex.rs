//! Hex encodings used by EVM JSON-RPC: quantities, addresses, 32-byte words.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("missing 0x prefix: {0}")]
    MissingPrefix(String),
    #[error("invalid hex digits: {0}")]
    InvalidDigits(String),
    #[error("expected {expected} hex digits, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("value exceeds 128 bits: {0}")]
    Overflow(String),
}

fn strip_prefix(value: &str) -> Result<&str, HexError> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| HexError::MissingPrefix(value.to_string()))
}

fn is_hex(digits: &str) -> bool {
    digits.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse a JSON-RPC quantity (`"0x1b4"`) into a `u64`.
pub fn parse_quantity(value: &str) -> Result<u64, HexError> {
    let digits = strip_prefix(value)?;
    if digits.is_empty() {
        return Err(HexError::InvalidDigits(value.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| {
        if is_hex(digits) {
            HexError::Overflow(value.to_string())
        } else {
            HexError::InvalidDigits(value.to_string())
        }
    })
}

/// Parse a JSON-RPC quantity into a `u128` (wei amounts).
pub fn parse_quantity_u128(value: &str) -> Result<u128, HexError> {
    let digits = strip_prefix(value)?;
    if digits.is_empty() {
        return Err(HexError::InvalidDigits(value.to_string()));
    }
    u128::from_str_radix(digits, 16).map_err(|_| {
        if is_hex(digits) {
            HexError::Overflow(value.to_string())
        } else {
            HexError::InvalidDigits(value.to_string())
        }
    })
}

pub fn format_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

/// Parse an ABI-encoded `uint256` word. Values above `u128::MAX` are
/// rejected rather than truncated.
pub fn parse_word_u128(value: &str) -> Result<u128, HexError> {
    let digits = strip_prefix(value)?;
    if digits.len() != 64 {
        return Err(HexError::WrongLength {
            expected: 64,
            actual: digits.len(),
        });
    }
    if !is_hex(digits) {
        return Err(HexError::InvalidDigits(value.to_string()));
    }
    let (high, low) = digits.split_at(32);
    if high.bytes().any(|b| b != b'0') {
        return Err(HexError::Overflow(value.to_string()));
    }
    u128::from_str_radix(low, 16).map_err(|_| HexError::InvalidDigits(value.to_string()))
}

/// Lowercase a 20-byte address. Checksummed input is accepted but the
/// checksum is not validated.
pub fn normalize_address(value: &str) -> Result<String, HexError> {
    let digits = strip_prefix(value.trim())?;
    if digits.len() != 40 {
        return Err(HexError::WrongLength {
            expected: 40,
            actual: digits.len(),
        });
    }
    if !is_hex(digits) {
        return Err(HexError::InvalidDigits(value.to_string()));
    }
    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}

/// Lowercase a 32-byte transaction hash.
pub fn normalize_tx_hash(value: &str) -> Result<String, HexError> {
    let digits = strip_prefix(value.trim())?;
    if digits.len() != 64 {
        return Err(HexError::WrongLength {
            expected: 64,
            actual: digits.len(),
        });
    }
    if !is_hex(digits) {
        return Err(HexError::InvalidDigits(value.to_string()));
    }
    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}

/// Left-pad an address into an indexed event topic.
pub fn address_to_topic(address: &str) -> Result<String, HexError> {
    let address = normalize_address(address)?;
    Ok(format!("0x{:0>64}", &address[2..]))
}

/// Extract the address from an indexed event topic.
pub fn topic_to_address(topic: &str) -> Result<String, HexError> {
    let digits = strip_prefix(topic)?;
    if digits.len() != 64 {
        return Err(HexError::WrongLength {
            expected: 64,
            actual: digits.len(),
        });
    }
    let (padding, address) = digits.split_at(24);
    if padding.bytes().any(|b| b != b'0') {
        return Err(HexError::InvalidDigits(topic.to_string()));
    }
    normalize_address(&format!("0x{address}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn test_quantities() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x64").unwrap(), 100);
        assert_eq!(format_quantity(100), "0x64");
        assert!(matches!(parse_quantity("64"), Err(HexError::MissingPrefix(_))));
        assert!(matches!(parse_quantity("0xzz"), Err(HexError::InvalidDigits(_))));
        assert!(matches!(
            parse_quantity("0x1ffffffffffffffff"),
            Err(HexError::Overflow(_))
        ));
        assert_eq!(
            parse_quantity_u128("0x8ac7230489e80000").unwrap(),
            10_000_000_000_000_000_000
        );
    }

    #[test]
    fn test_word_parsing() {
        let word = format!("0x{:064x}", 2_500_000u128);
        assert_eq!(parse_word_u128(&word).unwrap(), 2_500_000);
        let too_big = format!("0x1{}", "0".repeat(63));
        assert!(matches!(parse_word_u128(&too_big), Err(HexError::Overflow(_))));
        assert!(matches!(
            parse_word_u128("0x01"),
            Err(HexError::WrongLength { expected: 64, .. })
        ));
    }

    #[test]
    fn test_address_topic_conversion() {
        let topic = address_to_topic(ADDR).unwrap();
        assert_eq!(topic.len(), 66);
        assert!(topic.starts_with("0x000000000000000000000000"));
        assert_eq!(topic_to_address(&topic).unwrap(), ADDR.to_ascii_lowercase());
    }

    #[test]
    fn test_address_validation() {
        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address(&format!("0x{}", "g".repeat(40))).is_err());
        assert_eq!(
            normalize_address(&format!(" {ADDR} ")).unwrap(),
            ADDR.to_ascii_lowercase()
        );
    }
}
