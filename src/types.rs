// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

pub use primitive_types::{H160, H256, U256};

/// A 20-byte account address.
pub type Address = H160;

/// A 256-bit hash, also used as a storage slot identifier.
pub type Hash = H256;

/// A 32-byte storage word.
pub type Word = H256;

/// Builds an address from arbitrary bytes, keeping the trailing 20 bytes
/// and left-padding shorter input with zeros.
pub(crate) fn address_from_bytes(bytes: &[u8]) -> Address {
    let mut buf = [0u8; 20];
    if bytes.len() >= 20 {
        buf.copy_from_slice(&bytes[bytes.len() - 20..]);
    } else {
        buf[20 - bytes.len()..].copy_from_slice(bytes);
    }
    Address::from(buf)
}

/// Builds a 32-byte word from arbitrary bytes, keeping the trailing 32
/// bytes and left-padding shorter input with zeros.
pub(crate) fn word_from_bytes(bytes: &[u8]) -> Word {
    let mut buf = [0u8; 32];
    if bytes.len() >= 32 {
        buf.copy_from_slice(&bytes[bytes.len() - 32..]);
    } else {
        buf[32 - bytes.len()..].copy_from_slice(bytes);
    }
    Word::from(buf)
}

/// The 32-byte big-endian representation of a 256-bit value.
pub(crate) fn word_from_u256(value: U256) -> Word {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    Word::from(buf)
}

pub(crate) fn u256_from_word(word: &Word) -> U256 {
    U256::from_big_endian(word.as_bytes())
}

/// Parses the decimal text convention used for 256-bit values in contract
/// memory. Empty or malformed text reads as zero, as the arithmetic host
/// functions are total.
pub(crate) fn u256_from_decimal(text: &[u8]) -> U256 {
    match std::str::from_utf8(text) {
        Ok(s) if !s.is_empty() => U256::from_dec_str(s.trim()).unwrap_or_else(|_| U256::zero()),
        _ => U256::zero(),
    }
}
