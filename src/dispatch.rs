// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Export selection and the VM-memory side of argument/return marshaling.
//! The word-level codec itself lives in [`crate::abi`].

use tracing::debug;
use wasmi::Value;

use crate::abi::{self, AbiValue, SELECTOR_LEN, WORD};
use crate::instance::WrappedInstance;
use crate::interface::{
    Method, ParamType, FALLBACK_FUNCTION, FALLBACK_PAYABLE_FUNCTION,
};
use crate::types::{address_from_bytes, u256_from_word, word_from_bytes};
use crate::Error;

/// Runs one call frame against an instantiated contract: resolves the
/// export, enforces the payable and mutability rules, decodes calldata
/// and marshals the returned value.
pub(crate) fn dispatch(
    instance: &mut WrappedInstance,
    calldata: &[u8],
) -> Result<Vec<u8>, Error> {
    let (name, method) = select_export(instance, calldata)?;
    debug!(export = %name, "dispatching");

    let creation = instance.env().creation;
    let value = instance.env().value;
    if !creation && !value.is_zero() && !name.starts_with('$') {
        return Err(Error::InvalidPayableFunction(name));
    }

    let mutable = creation || instance.env().interface.export_mutating(&name);
    instance.env_mut().session.resolve_mutability(mutable)?;
    instance.env_mut().mutable = mutable;

    // constructor calldata carries no selector prefix
    let body = match &method {
        Some(_) if creation => calldata,
        Some(_) => &calldata[SELECTOR_LEN..],
        None => &[],
    };
    let args = match &method {
        Some(method) => decode_args(instance, method, body)?,
        None => Vec::new(),
    };

    let returned = instance.call_export(&name, &args)?;
    marshal_return(instance, method.as_ref(), returned)
}

/// Resolves the export to run: the constructor at creation, a selector
/// match otherwise, the fallback export as the last resort.
fn select_export(
    instance: &WrappedInstance,
    calldata: &[u8],
) -> Result<(String, Option<Method>), Error> {
    let env = instance.env();
    if env.creation {
        let constructor = env.interface.constructor.clone();
        return Ok((constructor.name.clone(), Some(constructor)));
    }

    if calldata.len() >= SELECTOR_LEN {
        let mut sel = [0u8; SELECTOR_LEN];
        sel.copy_from_slice(&calldata[..SELECTOR_LEN]);
        if let Some(method) = env
            .interface
            .method_by_selector(sel)
            .filter(|m| instance.has_export(&m.name))
        {
            return Ok((method.name.clone(), Some(method.clone())));
        }
    }

    let fallback = if env.value.is_zero() {
        FALLBACK_FUNCTION
    } else {
        FALLBACK_PAYABLE_FUNCTION
    };
    if instance.has_export(fallback) {
        return Ok((fallback.to_owned(), None));
    }
    Err(Error::InvalidFunctionName(fallback.to_owned()))
}

/// Decodes the ABI words of `body` into wasm values, copying dynamic
/// payloads into the instance arena.
fn decode_args(
    instance: &mut WrappedInstance,
    method: &Method,
    body: &[u8],
) -> Result<Vec<Value>, Error> {
    if body.len() < method.inputs.len() * WORD {
        return Err(Error::BadCalldata("input too short for arguments".into()));
    }

    let mut args = Vec::with_capacity(method.inputs.len());
    for (i, param) in method.inputs.iter().enumerate() {
        let word = &body[i * WORD..(i + 1) * WORD];
        let value = match param.kind {
            ParamType::Int32 | ParamType::Uint32 => {
                Value::I32(abi::read_integer(param.kind, word) as i32)
            }
            ParamType::Int64 | ParamType::Uint64 => {
                Value::I64(abi::read_integer(param.kind, word) as i64)
            }
            ParamType::Bool => Value::I32(abi::read_bool(word)? as i32),
            ParamType::String => {
                let (start, len) = abi::length_prefix_points_to(i * WORD, body)?;
                let ptr = instance.set_bytes(&body[start..start + len])?;
                Value::I32(ptr as i32)
            }
            ParamType::Address => {
                let ptr = instance.set_bytes(&word[WORD - 20..])?;
                Value::I32(ptr as i32)
            }
            ParamType::Uint256 => {
                let text = u256_from_word(&word_from_bytes(word)).to_string();
                let ptr = instance.set_bytes(text.as_bytes())?;
                Value::I32(ptr as i32)
            }
        };
        args.push(value);
    }
    Ok(args)
}

/// Encodes the single declared output into return bytes. Functions with
/// no declared output always return the 4-byte little-endian zero
/// sentinel, never an empty buffer.
fn marshal_return(
    instance: &WrappedInstance,
    method: Option<&Method>,
    returned: Option<Value>,
) -> Result<Vec<u8>, Error> {
    let Some(out) = method.and_then(|m| m.outputs.first()) else {
        return Ok(0i32.to_le_bytes().to_vec());
    };
    let Some(returned) = returned else {
        return Err(Error::BadCalldata(
            "export returned nothing for a declared output".into(),
        ));
    };

    let value = match out.kind {
        ParamType::Int32 => AbiValue::Int32(returned.i32().unwrap_or(0)),
        ParamType::Uint32 => AbiValue::Uint32(returned.i32().unwrap_or(0) as u32),
        ParamType::Int64 => AbiValue::Int64(returned.i64().unwrap_or(0)),
        ParamType::Uint64 => AbiValue::Uint64(returned.i64().unwrap_or(0) as u64),
        ParamType::Bool => AbiValue::Bool(returned.i32().unwrap_or(0) == 1),
        ParamType::String => {
            let ptr = returned.i32().unwrap_or(0) as u32;
            AbiValue::Str(instance.read_at(ptr)?)
        }
        ParamType::Address => {
            let ptr = returned.i32().unwrap_or(0) as u32;
            AbiValue::Address(address_from_bytes(&instance.read_at(ptr)?))
        }
        ParamType::Uint256 => {
            let ptr = returned.i32().unwrap_or(0) as u32;
            let text = instance.read_at(ptr)?;
            AbiValue::Uint256(crate::types::u256_from_decimal(&text))
        }
    };
    abi::encode_return(out.kind, &value)
}
