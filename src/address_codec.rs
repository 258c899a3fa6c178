//! Address encoding between Ethereum and Talleo
//!
//! Talleo transactions carry a 32-byte payment id. To let a Talleo deposit name
//! its Ethereum recipient, the recipient address is packed into that field.
//!
//! Ethereum addresses may be EIP-55 checksummed, so the letter case of every
//! character matters. Each character is therefore treated as one symbol of a
//! 22-symbol alphabet (5 bits) instead of a 4-bit nibble:
//!
//! ```text
//! 0123456789abcdefABCDEF
//! ```
//!
//! Groups of four symbols (20 bits) are repacked into five hex digits
//! (20 bits). The 40 address characters yield 50 hex digits, right-padded
//! with `0` to the 64-digit payment id width.
//!
//! The other direction (Ethereum → Talleo) carries the raw Talleo address
//! bytes in the `ConversionTo` event; those are rendered as base58.

use alloy::primitives::Address;
use thiserror::Error;

/// Address alphabet, indexed by 5-bit symbol value
const SYMBOLS: &[u8; 22] = b"0123456789abcdefABCDEF";

/// Hex digits of a Talleo payment id
pub const PAYMENT_ID_LEN: usize = 64;

/// Hex digits that carry the address, the rest is zero padding
const ENCODED_LEN: usize = 50;

/// Characters of an Ethereum address without the `0x` prefix
const ADDRESS_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("address must have 40 characters after the 0x prefix, got {0}")]
    InvalidAddressLength(usize),

    #[error("invalid address character {ch:?} at position {position}")]
    InvalidSymbol { ch: char, position: usize },

    #[error("payment id must have 64 hex characters, got {0}")]
    InvalidPaymentIdLength(usize),

    #[error("invalid payment id character {ch:?} at position {position}")]
    InvalidHexDigit { ch: char, position: usize },

    #[error("payment id padding is not zero")]
    NonZeroPadding,

    #[error("payment id decodes to symbol index {index} at position {position}")]
    SymbolOutOfRange { index: u8, position: usize },

    #[error("invalid Talleo address: {0}")]
    InvalidTalleoAddress(String),
}

fn symbol_index(ch: char, position: usize) -> Result<u8, CodecError> {
    SYMBOLS
        .iter()
        .position(|&s| s as char == ch)
        .map(|i| i as u8)
        .ok_or(CodecError::InvalidSymbol { ch, position })
}

fn hex_digit(value: u8) -> char {
    // value is always < 16 here
    char::from_digit(value as u32, 16).unwrap_or('0')
}

/// Encode an Ethereum address (with or without `0x`) into a 64-digit payment id.
pub fn eth_to_payment_id(address: &str) -> Result<String, CodecError> {
    let body = address.strip_prefix("0x").unwrap_or(address);
    let chars: Vec<char> = body.chars().collect();
    if chars.len() != ADDRESS_LEN {
        return Err(CodecError::InvalidAddressLength(chars.len()));
    }

    let mut pid = String::with_capacity(PAYMENT_ID_LEN);
    for (group, quad) in chars.chunks(4).enumerate() {
        let base = group * 4;
        let v1 = symbol_index(quad[0], base)?;
        let v2 = symbol_index(quad[1], base + 1)?;
        let v3 = symbol_index(quad[2], base + 2)?;
        let v4 = symbol_index(quad[3], base + 3)?;

        pid.push(hex_digit(v1 >> 1));
        pid.push(hex_digit(((v1 & 1) << 3) | (v2 >> 2)));
        pid.push(hex_digit(((v2 & 3) << 2) | (v3 >> 3)));
        pid.push(hex_digit(((v3 & 7) << 1) | (v4 >> 4)));
        pid.push(hex_digit(v4 & 15));
    }

    while pid.len() < PAYMENT_ID_LEN {
        pid.push('0');
    }
    Ok(pid)
}

/// Decode a 64-digit payment id back into a `0x`-prefixed Ethereum address,
/// preserving the letter case of the input.
pub fn payment_id_to_eth(payment_id: &str) -> Result<String, CodecError> {
    let digits = payment_id
        .chars()
        .enumerate()
        .map(|(position, ch)| {
            ch.to_digit(16)
                .map(|d| d as u8)
                .ok_or(CodecError::InvalidHexDigit { ch, position })
        })
        .collect::<Result<Vec<u8>, _>>()?;

    if digits.len() != PAYMENT_ID_LEN {
        return Err(CodecError::InvalidPaymentIdLength(digits.len()));
    }
    if digits[ENCODED_LEN..].iter().any(|&d| d != 0) {
        return Err(CodecError::NonZeroPadding);
    }

    let mut address = String::with_capacity(ADDRESS_LEN + 2);
    address.push_str("0x");
    for (group, n) in digits[..ENCODED_LEN].chunks(5).enumerate() {
        let indices = [
            (n[0] << 1) | (n[1] >> 3),
            ((n[1] & 7) << 2) | (n[2] >> 2),
            ((n[2] & 3) << 3) | (n[3] >> 1),
            ((n[3] & 1) << 4) | n[4],
        ];
        for (offset, index) in indices.into_iter().enumerate() {
            let symbol = SYMBOLS
                .get(index as usize)
                .ok_or(CodecError::SymbolOutOfRange {
                    index,
                    position: group * 4 + offset,
                })?;
            address.push(*symbol as char);
        }
    }
    Ok(address)
}

/// Whether `address` is an acceptable Ethereum destination: `0x` followed by
/// 40 hex characters that are all lowercase, all uppercase, or a valid
/// EIP-55 checksum.
pub fn is_valid_evm_address(address: &str) -> bool {
    let Some(body) = address.strip_prefix("0x") else {
        return false;
    };
    if body.len() != ADDRESS_LEN || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if !(has_lower && has_upper) {
        return true;
    }
    Address::parse_checksummed(address, None).is_ok()
}

/// Render raw Talleo address bytes (as carried in `ConversionTo.to`) as base58.
pub fn talleo_address_from_bytes(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode a base58 Talleo address into its raw bytes.
pub fn talleo_address_to_bytes(address: &str) -> Result<Vec<u8>, CodecError> {
    bs58::decode(address)
        .into_vec()
        .map_err(|e| CodecError::InvalidTalleoAddress(e.to_string()))
}
