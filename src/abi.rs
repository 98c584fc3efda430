// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Word-level ABI codec: 32-byte words, right-aligned integers, and the
//! offset + length-prefixed convention for dynamic types. The VM-memory
//! side of marshaling lives in the dispatcher; everything here is pure.

use primitive_types::U256;

use crate::interface::{Method, Param, ParamType};
use crate::types::{address_from_bytes, u256_from_word, word_from_u256, Address};
use crate::Error;

pub const WORD: usize = 32;
pub const SELECTOR_LEN: usize = 4;

/// A value crossing the ABI boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Uint256(U256),
    Address(Address),
    Str(Vec<u8>),
    Bool(bool),
}

/// Reads the integer in `word` at the declared width. The value is
/// right-aligned; truncation preserves two's complement for signed kinds.
pub fn read_integer(kind: ParamType, word: &[u8]) -> u64 {
    let len = word.len();
    match kind {
        ParamType::Int32 | ParamType::Uint32 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&word[len - 4..]);
            u32::from_be_bytes(buf) as u64
        }
        _ => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&word[len - 8..]);
            u64::from_be_bytes(buf)
        }
    }
}

/// Reads a boolean word: 31 zero bytes then 0 or 1.
pub fn read_bool(word: &[u8]) -> Result<u64, Error> {
    if word[..WORD - 1].iter().any(|b| *b != 0) {
        return Err(Error::BadBoolean);
    }
    match word[WORD - 1] {
        0 => Ok(0),
        1 => Ok(1),
        _ => Err(Error::BadBoolean),
    }
}

/// Resolves the dynamic-type head word at `index`: returns the payload
/// range `(start, len)` within `data`, bounds-checked against it.
pub fn length_prefix_points_to(
    index: usize,
    data: &[u8],
) -> Result<(usize, usize), Error> {
    if data.len() < index + WORD {
        return Err(Error::BadCalldata("input too short for offset word".into()));
    }
    let offset = u256_from_word(&crate::types::word_from_bytes(
        &data[index..index + WORD],
    ));
    let offset_end = offset
        .checked_add(U256::from(WORD))
        .filter(|end| *end <= U256::from(data.len()))
        .ok_or(Error::BadCalldata("offset points past input".into()))?
        .as_usize();

    let len = u256_from_word(&crate::types::word_from_bytes(
        &data[offset_end - WORD..offset_end],
    ));
    len.checked_add(U256::from(offset_end))
        .filter(|end| *end <= U256::from(data.len()))
        .ok_or(Error::BadCalldata("length insufficient for payload".into()))?;

    Ok((offset_end, len.as_usize()))
}

/// Left-pads to a full 32-byte word.
pub fn pad_left(bytes: &[u8]) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - bytes.len()..].copy_from_slice(bytes);
    word
}

/// Right-pads to a multiple of 32 bytes.
pub fn pad_right(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.resize(bytes.len().div_ceil(WORD) * WORD, 0);
    out
}

/// Length word followed by the right-padded payload.
pub fn pack_bytes_slice(bytes: &[u8]) -> Vec<u8> {
    let mut out = word_from_u256(U256::from(bytes.len())).as_bytes().to_vec();
    out.extend_from_slice(&pad_right(bytes));
    out
}

fn head_word(param: &Param, value: &AbiValue) -> Result<[u8; WORD], Error> {
    Ok(match (param.kind, value) {
        (ParamType::Int32, AbiValue::Int32(v)) => {
            word_from_u256(U256::from(*v as u32)).to_fixed_bytes()
        }
        (ParamType::Int64, AbiValue::Int64(v)) => {
            word_from_u256(U256::from(*v as u64)).to_fixed_bytes()
        }
        (ParamType::Uint32, AbiValue::Uint32(v)) => {
            word_from_u256(U256::from(*v)).to_fixed_bytes()
        }
        (ParamType::Uint64, AbiValue::Uint64(v)) => {
            word_from_u256(U256::from(*v)).to_fixed_bytes()
        }
        (ParamType::Uint256, AbiValue::Uint256(v)) => {
            word_from_u256(*v).to_fixed_bytes()
        }
        (ParamType::Address, AbiValue::Address(addr)) => {
            pad_left(addr.as_bytes())
        }
        (ParamType::Bool, AbiValue::Bool(v)) => {
            let mut word = [0u8; WORD];
            word[WORD - 1] = u8::from(*v);
            word
        }
        (kind, _) => {
            return Err(Error::UnsupportedType(
                format!("argument does not match declared {}", kind.canonical())
                    .into(),
            ))
        }
    })
}

/// Packs calldata for a declared method: selector, then one head word per
/// input, with dynamic payloads appended after the head section.
pub fn encode_call(method: &Method, args: &[AbiValue]) -> Result<Vec<u8>, Error> {
    if args.len() != method.inputs.len() {
        return Err(Error::BadCalldata("argument count mismatch".into()));
    }

    let head_len = method.inputs.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for (param, value) in method.inputs.iter().zip(args) {
        if param.kind == ParamType::String {
            let AbiValue::Str(bytes) = value else {
                return Err(Error::UnsupportedType(
                    "argument does not match declared string".into(),
                ));
            };
            let offset = head_len + tail.len();
            head.extend_from_slice(&word_from_u256(U256::from(offset)).0);
            tail.extend_from_slice(&pack_bytes_slice(bytes));
        } else {
            head.extend_from_slice(&head_word(param, value)?);
        }
    }

    let mut out = Vec::with_capacity(SELECTOR_LEN + head.len() + tail.len());
    out.extend_from_slice(&method.selector());
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    Ok(out)
}

/// Unpacks a single returned value of the declared type from ABI return
/// bytes, the inverse of [`encode_return`].
pub fn decode_single(kind: ParamType, data: &[u8]) -> Result<AbiValue, Error> {
    if data.len() < WORD {
        return Err(Error::BadCalldata("return data too short".into()));
    }
    let word = &data[..WORD];
    Ok(match kind {
        ParamType::Int32 => AbiValue::Int32(read_integer(kind, word) as i32),
        ParamType::Uint32 => AbiValue::Uint32(read_integer(kind, word) as u32),
        ParamType::Int64 => AbiValue::Int64(read_integer(kind, word) as i64),
        ParamType::Uint64 => AbiValue::Uint64(read_integer(kind, word)),
        ParamType::Uint256 => AbiValue::Uint256(U256::from_big_endian(word)),
        ParamType::Bool => AbiValue::Bool(read_bool(word)? == 1),
        ParamType::Address => {
            AbiValue::Address(address_from_bytes(word))
        }
        ParamType::String => {
            let (start, len) = length_prefix_points_to(0, data)?;
            AbiValue::Str(data[start..start + len].to_vec())
        }
    })
}

/// Encodes a single returned value of the declared type, the encoding a
/// method's declared output leaves the engine with.
pub fn encode_return(kind: ParamType, value: &AbiValue) -> Result<Vec<u8>, Error> {
    Ok(match (kind, value) {
        (ParamType::String, AbiValue::Str(bytes)) => {
            let mut out =
                word_from_u256(U256::from(WORD)).as_bytes().to_vec();
            out.extend_from_slice(&pack_bytes_slice(bytes));
            out
        }
        (ParamType::Address, AbiValue::Address(addr)) => {
            pad_left(addr.as_bytes()).to_vec()
        }
        (ParamType::Bool, AbiValue::Bool(v)) => {
            let mut word = [0u8; WORD];
            word[WORD - 1] = u8::from(*v);
            word.to_vec()
        }
        (ParamType::Uint256, AbiValue::Uint256(v)) => {
            word_from_u256(*v).as_bytes().to_vec()
        }
        _ => {
            let param = Param {
                name: String::new(),
                kind,
                indexed: false,
            };
            head_word(&param, value)?.to_vec()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(kind: ParamType) -> Param {
        Param {
            name: "p".into(),
            kind,
            indexed: false,
        }
    }

    fn method(inputs: Vec<Param>) -> Method {
        Method {
            name: "m".into(),
            inputs,
            outputs: vec![],
            constant: false,
        }
    }

    #[test]
    fn integer_words_round_trip_boundaries() {
        let cases = [
            (ParamType::Uint64, AbiValue::Uint64(0)),
            (ParamType::Uint64, AbiValue::Uint64(u64::MAX)),
            (ParamType::Int64, AbiValue::Int64(i64::MIN)),
            (ParamType::Int64, AbiValue::Int64(-1)),
            (ParamType::Uint32, AbiValue::Uint32(u32::MAX)),
            (ParamType::Int32, AbiValue::Int32(i32::MIN)),
            (ParamType::Uint256, AbiValue::Uint256(U256::MAX)),
            (ParamType::Bool, AbiValue::Bool(true)),
            (ParamType::Bool, AbiValue::Bool(false)),
            (
                ParamType::Address,
                AbiValue::Address(Address::from_low_u64_be(0xDEADBEEF)),
            ),
        ];
        for (kind, value) in cases {
            let encoded = encode_return(kind, &value).unwrap();
            assert_eq!(decode_single(kind, &encoded).unwrap(), value);
        }
    }

    #[test]
    fn string_round_trip() {
        let value = AbiValue::Str(b"hello contract world".to_vec());
        let encoded = encode_return(ParamType::String, &value).unwrap();
        assert_eq!(decode_single(ParamType::String, &encoded).unwrap(), value);
    }

    #[test]
    fn bad_boolean_rejected() {
        let mut word = [0u8; WORD];
        word[WORD - 1] = 2;
        assert!(matches!(read_bool(&word), Err(Error::BadBoolean)));
        word[0] = 1;
        word[WORD - 1] = 1;
        assert!(matches!(read_bool(&word), Err(Error::BadBoolean)));
    }

    #[test]
    fn calldata_layout_for_mixed_args() {
        let m = method(vec![param(ParamType::String), param(ParamType::Uint64)]);
        let data = encode_call(
            &m,
            &[AbiValue::Str(b"alice".to_vec()), AbiValue::Uint64(42)],
        )
        .unwrap();

        assert_eq!(&data[..4], &m.selector());
        let body = &data[4..];
        // head: offset to the dynamic part, then the integer word
        assert_eq!(read_integer(ParamType::Uint64, &body[..WORD]), 64);
        assert_eq!(read_integer(ParamType::Uint64, &body[WORD..2 * WORD]), 42);
        let (start, len) = length_prefix_points_to(0, body).unwrap();
        assert_eq!(&body[start..start + len], b"alice");
    }

    #[test]
    fn malformed_offsets_rejected() {
        let m = method(vec![param(ParamType::String)]);
        let data =
            encode_call(&m, &[AbiValue::Str(b"abc".to_vec())]).unwrap();
        let body = &data[4..];

        // truncating the payload must fail the bounds check
        assert!(length_prefix_points_to(0, &body[..WORD]).is_err());
        assert!(length_prefix_points_to(0, &body[..2 * WORD - 1]).is_err());
    }
}
