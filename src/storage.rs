// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Storage layout: the per-invocation mapping registry built by
//! constructor-time `AddKeyInfo` registrations, and the keccak fold that
//! derives a slot from an ordered key path.

use std::collections::{BTreeMap, BTreeSet};

use primitive_types::U256;

use crate::crypto;
use crate::types::{u256_from_word, word_from_u256, Hash, Word};
use crate::Error;

/// Type tags attached to storage registrations by the offline compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum StorageType {
    Int32 = 0,
    Int64 = 1,
    Uint32 = 2,
    Uint64 = 3,
    Uint256 = 4,
    String = 5,
    Address = 6,
    Bool = 7,
    /// The component is the registration address itself, used to separate
    /// the fields of a struct under one key path.
    Pointer = 8,
}

impl StorageType {
    pub fn from_u32(raw: u32) -> Result<Self, Error> {
        Ok(match raw {
            0 => Self::Int32,
            1 => Self::Int64,
            2 => Self::Uint32,
            3 => Self::Uint64,
            4 => Self::Uint256,
            5 => Self::String,
            6 => Self::Address,
            7 => Self::Bool,
            8 => Self::Pointer,
            _ => {
                return Err(Error::UnsupportedType(
                    format!("unknown storage type tag {raw}").into(),
                ))
            }
        })
    }
}

/// One key component of a storage access path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageKey {
    pub addr: u64,
    pub kind: StorageType,
    pub is_array_index: bool,
}

/// The value side of a registration: where the value lives in linear
/// memory and how to (de)serialize it.
#[derive(Debug, Clone, Copy)]
pub struct StorageValue {
    pub addr: u64,
    pub kind: StorageType,
}

/// A registered layout node: a value address with its ordered key path.
#[derive(Debug, Clone)]
pub struct StorageEntry {
    pub value: StorageValue,
    pub keys: Vec<StorageKey>,
    seen: BTreeSet<(u64, StorageType, bool)>,
}

impl StorageEntry {
    /// Whether any component of the key path indexes into an array.
    pub fn has_array_index(&self) -> bool {
        self.keys.iter().any(|k| k.is_array_index)
    }
}

/// Registry of every `AddKeyInfo` registration of the current frame,
/// keyed by value address.
#[derive(Debug, Clone, Default)]
pub struct StorageRegistry {
    entries: BTreeMap<u64, StorageEntry>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a key component to the entry at `value.addr`, creating the
    /// entry on first registration. Re-registering an identical component
    /// is a no-op.
    pub fn register(&mut self, value: StorageValue, key: StorageKey) {
        let sig = (key.addr, key.kind, key.is_array_index);
        let entry = self.entries.entry(value.addr).or_insert_with(|| StorageEntry {
            value,
            keys: Vec::new(),
            seen: BTreeSet::new(),
        });
        if entry.seen.insert(sig) {
            entry.keys.push(key);
        }
    }

    pub fn get(&self, value_addr: u64) -> Option<&StorageEntry> {
        self.entries.get(&value_addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &StorageEntry)> {
        self.entries.iter()
    }
}

/// One step of the slot derivation fold: the first component hashes
/// alone, every later component hashes prefixed by the running slot.
pub fn derive_slot(prev: Option<&Hash>, component: &[u8]) -> Hash {
    match prev {
        None => crypto::keccak256(&[component]),
        Some(slot) => crypto::keccak256(&[slot.as_bytes(), component]),
    }
}

/// The slot `offset` words past `slot`, used for multi-word values.
pub fn slot_add(slot: &Hash, offset: u64) -> Hash {
    let sum = u256_from_word(slot).overflowing_add(U256::from(offset)).0;
    word_from_u256(sum)
}

/// Splits a byte string into 32-byte words, left-padding the whole
/// buffer so the payload is right-aligned in the first word.
pub fn split_words(data: &[u8]) -> Vec<Word> {
    let n = data.len().div_ceil(32);
    let mut padded = vec![0u8; n * 32];
    padded[n * 32 - data.len()..].copy_from_slice(data);
    padded.chunks(32).map(Word::from_slice).collect()
}

/// Drops the leading zero bytes of a stored word, recovering the chunk
/// bytes `split_words` right-aligned.
pub fn trim_leading_zeros(word: &Word) -> &[u8] {
    let bytes = word.as_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_derivation_is_deterministic_and_order_sensitive() {
        let a = derive_slot(None, b"balances");
        let b = derive_slot(None, b"balances");
        assert_eq!(a, b);

        let nested_ab = derive_slot(Some(&a), b"alice");
        let nested_ba = derive_slot(Some(&derive_slot(None, b"alice")), b"balances");
        assert_ne!(nested_ab, nested_ba);
        assert_ne!(nested_ab, a);
    }

    #[test]
    fn slot_add_walks_consecutive_words() {
        let base = derive_slot(None, b"text");
        let one = slot_add(&base, 1);
        let two = slot_add(&base, 2);
        assert_ne!(one, base);
        assert_eq!(slot_add(&one, 1), two);
    }

    #[test]
    fn split_right_aligns_payload() {
        let words = split_words(b"ab");
        assert_eq!(words.len(), 1);
        assert_eq!(&words[0].as_bytes()[30..], b"ab");
        assert_eq!(trim_leading_zeros(&words[0]), b"ab");

        let long: Vec<u8> = (1u8..=40).collect();
        let words = split_words(&long);
        assert_eq!(words.len(), 2);
        // 80 bytes of capacity, 40 of payload: first word carries the
        // leading 8 bytes right-aligned
        assert_eq!(&words[0].as_bytes()[24..], &long[..8]);
        assert_eq!(words[1].as_bytes(), &long[8..]);
    }

    #[test]
    fn registry_ignores_duplicate_components() {
        let mut registry = StorageRegistry::new();
        let value = StorageValue {
            addr: 64,
            kind: StorageType::Uint64,
        };
        let key = StorageKey {
            addr: 80,
            kind: StorageType::String,
            is_array_index: false,
        };

        registry.register(value, key);
        registry.register(value, key);
        registry.register(
            value,
            StorageKey {
                addr: 96,
                kind: StorageType::Uint64,
                is_array_index: true,
            },
        );

        let entry = registry.get(64).unwrap();
        assert_eq!(entry.keys.len(), 2);
        assert!(entry.has_array_index());
    }
}
