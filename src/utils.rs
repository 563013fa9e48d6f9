//! Identifier generation and storage key helpers

use crate::error::{LedgerError, LedgerResult};
use bech32::Bech32m;
use uuid7::uuid7;

pub const INQUIRY_HRP: &str = "rfq";
pub const SKU_HRP: &str = "sku";
pub const VERSION_HRP: &str = "qv";
pub const VERSION_ITEM_HRP: &str = "qvi";
pub const CUSTOMER_RESPONSE_HRP: &str = "cr";
pub const QUOTATION_RESPONSE_HRP: &str = "qr";
pub const RESPONSE_ITEM_HRP: &str = "qri";
pub const HISTORY_HRP: &str = "hist";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> LedgerResult<String> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| LedgerError::Identifier(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| LedgerError::Identifier(e.to_string()))?;
    Ok(encode)
}

/// `<parent>/<seq as u32 big endian>`; big endian keeps sled's byte order numeric.
pub fn sequence_key(parent: &str, seq: u32) -> Vec<u8> {
    let mut key = sequence_prefix(parent);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

pub fn sequence_prefix(parent: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(parent.len() + 5);
    key.extend_from_slice(parent.as_bytes());
    key.push(b'/');
    key
}

/// Reads the trailing sequence number back out of a key built by [`sequence_key`].
pub fn sequence_of(key: &[u8]) -> Option<u32> {
    let tail: [u8; 4] = key.get(key.len().checked_sub(4)?..)?.try_into().ok()?;
    Some(u32::from_be_bytes(tail))
}
