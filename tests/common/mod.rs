// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Shared fixtures: hand-written WAT contracts with their interface JSON,
//! and the word-packing helpers the scenario tests build calldata with.

#![allow(dead_code)]

use kiln::{
    Address, BlockContext, ContractBlob, ContractInterface, MemoryState, Session, U256, VM,
};

pub const GAS: u64 = 10_000_000;

/// A mapping from string keys to u64 values, with an `Updated` event on
/// writes, a payable `$donate`, a fallback, and a `peek` that is declared
/// constant but tries to write.
pub const COUNTER_ABI: &str = r#"{
    "constructor": {"name": "init", "inputs": [], "outputs": []},
    "methods": {
        "get": {
            "name": "get",
            "inputs": [{"name": "key", "type": "string"}],
            "outputs": [{"name": "", "type": "uint64"}],
            "constant": true
        },
        "set": {
            "name": "set",
            "inputs": [
                {"name": "key", "type": "string"},
                {"name": "value", "type": "uint64"}
            ],
            "outputs": [],
            "constant": false
        },
        "peek": {
            "name": "peek",
            "inputs": [{"name": "key", "type": "string"}],
            "outputs": [{"name": "", "type": "uint64"}],
            "constant": true
        },
        "$donate": {
            "name": "$donate",
            "inputs": [],
            "outputs": [],
            "constant": false
        }
    },
    "events": {
        "Updated": {
            "name": "Updated",
            "inputs": [
                {"name": "key", "type": "string", "indexed": true},
                {"name": "value", "type": "uint64"}
            ]
        }
    }
}"#;

pub const COUNTER_WAT: &str = r#"(module
    (import "env" "AddKeyInfo" (func $add_key (param i64 i32 i64 i32 i32)))
    (import "env" "WriteWithPointer" (func $write (param i64 i64)))
    (import "env" "ReadWithPointer" (func $read (param i64 i64)))
    (import "env" "Updated" (func $updated (param i32 i64)))
    (memory (export "memory") 2)
    (data (i32.const 2048) "counter")
    (func $register (param $key i32)
        (i32.store (i32.const 1024) (local.get $key))
        (call $add_key (i64.const 1032) (i32.const 3)
                       (i64.const 1024) (i32.const 5) (i32.const 0)))
    (func (export "init"))
    (func (export "set") (param $key i32) (param $value i64)
        (call $register (local.get $key))
        (i64.store (i32.const 1032) (local.get $value))
        (call $write (i64.const 1032) (i64.const 0))
        (call $updated (local.get $key) (local.get $value)))
    (func (export "get") (param $key i32) (result i64)
        (call $register (local.get $key))
        (call $read (i64.const 1032) (i64.const 0))
        (i64.load (i32.const 1032)))
    (func (export "peek") (param $key i32) (result i64)
        (call $register (local.get $key))
        (call $write (i64.const 1032) (i64.const 0))
        (i64.load (i32.const 1032)))
    (func (export "$donate"))
    (func (export "Fallback")))"#;

/// A u64 array under the key "items": length at the name slot, elements
/// behind an array-index component with bounds checks.
pub const ARRAY_ABI: &str = r#"{
    "constructor": {"name": "init", "inputs": [], "outputs": []},
    "methods": {
        "push": {
            "name": "push",
            "inputs": [{"name": "v", "type": "uint64"}],
            "outputs": [],
            "constant": false
        },
        "pop": {
            "name": "pop",
            "inputs": [],
            "outputs": [],
            "constant": false
        },
        "at": {
            "name": "at",
            "inputs": [{"name": "i", "type": "uint64"}],
            "outputs": [{"name": "", "type": "uint64"}],
            "constant": true
        },
        "length": {
            "name": "length",
            "inputs": [],
            "outputs": [{"name": "", "type": "uint64"}],
            "constant": true
        }
    }
}"#;

pub const ARRAY_WAT: &str = r#"(module
    (import "env" "AddKeyInfo" (func $add_key (param i64 i32 i64 i32 i32)))
    (import "env" "WriteWithPointer" (func $write (param i64 i64)))
    (import "env" "ReadWithPointer" (func $read (param i64 i64)))
    (memory (export "memory") 2)
    (data (i32.const 2048) "items")
    (func $name
        (i32.store (i32.const 1024) (i32.const 2048)))
    (func $register_length
        (call $name)
        (call $add_key (i64.const 1048) (i32.const 3)
                       (i64.const 1024) (i32.const 5) (i32.const 0)))
    (func $register_element
        (call $name)
        (call $add_key (i64.const 1040) (i32.const 3)
                       (i64.const 1024) (i32.const 5) (i32.const 0))
        (call $add_key (i64.const 1040) (i32.const 3)
                       (i64.const 1032) (i32.const 3) (i32.const 1)))
    (func (export "init"))
    (func (export "push") (param $v i64)
        (call $register_length)
        (call $read (i64.const 1048) (i64.const 0))
        (i64.store (i32.const 1032) (i64.load (i32.const 1048)))
        (i64.store (i32.const 1048)
                   (i64.add (i64.load (i32.const 1048)) (i64.const 1)))
        (call $write (i64.const 1048) (i64.const 0))
        (call $register_element)
        (i64.store (i32.const 1040) (local.get $v))
        (call $write (i64.const 1040) (i64.const 0)))
    (func (export "pop")
        (call $register_length)
        (call $read (i64.const 1048) (i64.const 0))
        (i64.store (i32.const 1048)
                   (i64.sub (i64.load (i32.const 1048)) (i64.const 1)))
        (call $write (i64.const 1048) (i64.const 0)))
    (func (export "at") (param $i i64) (result i64)
        (call $register_element)
        (i64.store (i32.const 1032) (local.get $i))
        (call $read (i64.const 1040) (i64.const 0))
        (i64.load (i32.const 1040)))
    (func (export "length") (result i64)
        (call $register_length)
        (call $read (i64.const 1048) (i64.const 0))
        (i64.load (i32.const 1048))))"#;

/// A single string slot, exercising multi-word values.
pub const NOTE_ABI: &str = r#"{
    "constructor": {"name": "init", "inputs": [], "outputs": []},
    "methods": {
        "set_note": {
            "name": "set_note",
            "inputs": [{"name": "s", "type": "string"}],
            "outputs": [],
            "constant": false
        },
        "get_note": {
            "name": "get_note",
            "inputs": [],
            "outputs": [{"name": "", "type": "string"}],
            "constant": true
        }
    }
}"#;

pub const NOTE_WAT: &str = r#"(module
    (import "env" "AddKeyInfo" (func $add_key (param i64 i32 i64 i32 i32)))
    (import "env" "WriteWithPointer" (func $write (param i64 i64)))
    (import "env" "ReadWithPointer" (func $read (param i64 i64)))
    (memory (export "memory") 2)
    (data (i32.const 2048) "note")
    (func $register
        (i32.store (i32.const 1024) (i32.const 2048))
        (call $add_key (i64.const 1032) (i32.const 5)
                       (i64.const 1024) (i32.const 5) (i32.const 0)))
    (func (export "init"))
    (func (export "set_note") (param $s i32)
        (call $register)
        (i32.store (i32.const 1032) (local.get $s))
        (call $write (i64.const 1032) (i64.const 0)))
    (func (export "get_note") (result i32)
        (call $register)
        (call $read (i64.const 1032) (i64.const 0))
        (i32.load (i32.const 1032))))"#;

pub fn session() -> Session {
    VM::new().session(Box::new(MemoryState::new()), BlockContext::default())
}

pub fn deploy(session: &mut Session, caller: Address, wat: &str, abi: &str) -> Address {
    let code = wat::parse_str(wat).expect("fixture wat compiles");
    let blob = ContractBlob::new(code, abi.as_bytes().to_vec());
    let payload = blob.encode().expect("blob encodes");

    let (address, outcome) = session.create(caller, &payload, GAS, U256::zero());
    outcome.output.expect("deployment succeeds");
    address
}

pub fn selector(abi: &str, method: &str) -> [u8; 4] {
    ContractInterface::from_json(abi.as_bytes())
        .expect("fixture abi parses")
        .method(method)
        .expect("method is declared")
        .selector()
}

pub fn word_u64(v: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&v.to_be_bytes());
    word
}

fn string_tail(s: &str) -> Vec<u8> {
    let mut tail = word_u64(s.len() as u64).to_vec();
    let mut payload = s.as_bytes().to_vec();
    payload.resize(s.len().div_ceil(32) * 32, 0);
    tail.extend_from_slice(&payload);
    tail
}

/// `method(string)` calldata.
pub fn calldata_string(abi: &str, method: &str, s: &str) -> Vec<u8> {
    let mut data = selector(abi, method).to_vec();
    data.extend_from_slice(&word_u64(32));
    data.extend_from_slice(&string_tail(s));
    data
}

/// `method(string,uint64)` calldata.
pub fn calldata_string_u64(abi: &str, method: &str, s: &str, v: u64) -> Vec<u8> {
    let mut data = selector(abi, method).to_vec();
    data.extend_from_slice(&word_u64(64));
    data.extend_from_slice(&word_u64(v));
    data.extend_from_slice(&string_tail(s));
    data
}

/// `method(uint64)` calldata.
pub fn calldata_u64(abi: &str, method: &str, v: u64) -> Vec<u8> {
    let mut data = selector(abi, method).to_vec();
    data.extend_from_slice(&word_u64(v));
    data
}

/// `method()` calldata.
pub fn calldata(abi: &str, method: &str) -> Vec<u8> {
    selector(abi, method).to_vec()
}

/// Reads a u64 out of a returned 32-byte word.
pub fn u64_return(bytes: &[u8]) -> u64 {
    assert_eq!(bytes.len(), 32, "expected one return word");
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[24..]);
    u64::from_be_bytes(buf)
}

/// Reads a string out of returned offset + length + payload words.
pub fn string_return(bytes: &[u8]) -> Vec<u8> {
    let offset = u64_return(&bytes[..32]) as usize;
    let len = u64_return(&bytes[offset..offset + 32]) as usize;
    bytes[offset + 32..offset + 32 + len].to_vec()
}
