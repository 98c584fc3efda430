// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use sha3::{Digest, Keccak256};

use crate::types::{Address, Hash};

/// Keccak-256 of the concatenation of the given byte slices.
pub fn keccak256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash::from_slice(&hasher.finalize())
}

/// The 4-byte method selector of a canonical signature such as
/// `transfer(address,uint64)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(&[signature.as_bytes()]);
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&hash.as_bytes()[..4]);
    sel
}

/// Hash of the empty byte string, the code hash of accounts without code.
pub fn empty_code_hash() -> Hash {
    keccak256(&[&[]])
}

/// Derives the address of a created contract from its creator and the
/// creator's nonce at creation time.
pub fn create_address(caller: &Address, nonce: u64) -> Address {
    let hash = keccak256(&[caller.as_bytes(), &nonce.to_be_bytes()]);
    crate::types::address_from_bytes(hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_of_known_signature() {
        // keccak256("transfer(address,uint256)") starts with a9059cbb
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn created_addresses_differ_by_nonce() {
        let caller = Address::from_low_u64_be(7);
        assert_ne!(create_address(&caller, 0), create_address(&caller, 1));
    }
}
