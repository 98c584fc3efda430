// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! The host import surface. Every import a contract may declare lives in
//! module `"env"`: the fixed table resolved by name, plus one synthesized
//! trampoline per declared event and external call. Unrecognized names
//! fail instantiation.

use std::collections::BTreeSet;

use primitive_types::U256;
use tracing::{debug, info};
use wasmi::core::{Trap, ValueType};
use wasmi::{Caller, Engine, Func, FuncType, Linker, Memory, Store, Value};

use crate::abi::{self, AbiValue};
use crate::event::Event;
use crate::instance::{self, read_at, read_slice, read_u32_le, read_u64_le, write_slice, Env};
use crate::interface::{Method, ParamType};
use crate::metering::GAS_FUNCTION;
use crate::storage::{
    self, slot_add, split_words, trim_leading_zeros, StorageEntry, StorageKey, StorageType,
    StorageValue,
};
use crate::types::{
    address_from_bytes, u256_from_decimal, u256_from_word, word_from_bytes, word_from_u256,
    Address, Hash, Word,
};
use crate::{crypto, Error};

/// Builds a linker resolving exactly the imports `module` declares.
pub(crate) fn link(
    engine: &Engine,
    store: &mut Store<Env>,
    module: &wasmi::Module,
) -> Result<Linker<Env>, Error> {
    let mut linker = Linker::new(engine);
    let mut defined = BTreeSet::new();

    for import in module.imports() {
        let name = import.name().to_owned();
        if import.module() != "env" {
            return Err(Error::InvalidImport(format!(
                "{}.{name}",
                import.module()
            )));
        }
        if !defined.insert(name.clone()) {
            continue;
        }
        let func = resolve(store, &name)?;
        linker
            .define("env", &name, func)
            .map_err(|err| Error::InvalidImport(err.to_string()))?;
    }
    Ok(linker)
}

fn memory(caller: &Caller<'_, Env>) -> Result<Memory, Error> {
    caller.data().memory.ok_or(Error::InvalidMemory)
}

/// Splits the caller into the linear memory view and the environment.
fn parts<'a>(
    caller: &'a mut Caller<'_, Env>,
) -> Result<(&'a mut [u8], &'a mut Env), Error> {
    let memory = caller.data().memory.ok_or(Error::InvalidMemory)?;
    Ok(memory.data_and_store_mut(caller))
}

/// Copies `bytes` into fresh arena memory and returns the pointer.
fn set_bytes(caller: &mut Caller<'_, Env>, bytes: &[u8]) -> Result<i32, Error> {
    let memory = memory(caller)?;
    let ptr = instance::set_bytes(&memory, &mut *caller, bytes)?;
    Ok(ptr as i32)
}

fn read_string(caller: &mut Caller<'_, Env>, ptr: u32) -> Result<Vec<u8>, Error> {
    let (data, env) = parts(caller)?;
    Ok(read_at(data, env, ptr)?.to_vec())
}

fn read_address(caller: &mut Caller<'_, Env>, ptr: u32) -> Result<Address, Error> {
    let bytes = read_string(caller, ptr)?;
    Ok(address_from_bytes(&bytes))
}

fn read_u256(caller: &mut Caller<'_, Env>, ptr: u32) -> Result<U256, Error> {
    let text = read_string(caller, ptr)?;
    Ok(u256_from_decimal(&text))
}

fn return_u256(caller: &mut Caller<'_, Env>, value: U256) -> Result<i32, Error> {
    set_bytes(caller, value.to_string().as_bytes())
}

fn hex_text(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// The length-prefixed string descriptor of the raw storage trio: a u32
/// little-endian size at `ptr`, a u32 little-endian payload offset at
/// `ptr + 4`.
fn read_qstring(data: &[u8], ptr: u32) -> Result<Vec<u8>, Error> {
    let size = read_u32_le(data, ptr)?;
    let offset = read_u32_le(data, ptr + 4)?;
    Ok(read_slice(data, offset, size)?.to_vec())
}

/// Walks an entry's key path and folds it into the storage slot. The
/// running slot doubles as the length slot for array-index components.
fn entry_slot(data: &[u8], env: &Env, entry: &StorageEntry) -> Result<Hash, Error> {
    let mut slot: Option<Hash> = None;
    for key in &entry.keys {
        let component = key_component(data, env, key, slot.as_ref())?;
        slot = Some(storage::derive_slot(slot.as_ref(), &component));
    }
    slot.ok_or(Error::UnsupportedType("storage entry with empty key path".into()))
}

fn key_component(
    data: &[u8],
    env: &Env,
    key: &StorageKey,
    running_slot: Option<&Hash>,
) -> Result<Vec<u8>, Error> {
    let addr = key.addr as u32;
    Ok(match key.kind {
        StorageType::Int32 | StorageType::Uint32 | StorageType::Bool => {
            read_u32_le(data, addr)?.to_be_bytes().to_vec()
        }
        StorageType::Int64 => read_u64_le(data, addr)?.to_be_bytes().to_vec(),
        StorageType::Uint64 => {
            let index = read_u64_le(data, addr)?;
            if key.is_array_index {
                let length_slot = running_slot.copied().unwrap_or_default();
                let word = env.session.state().get_state(&env.contract, &length_slot);
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&word.as_bytes()[24..]);
                let length = u64::from_be_bytes(buf);
                if index >= length {
                    return Err(Error::ExceededArray);
                }
            }
            index.to_be_bytes().to_vec()
        }
        StorageType::Uint256 => {
            let ptr = read_u32_le(data, addr)?;
            read_at(data, env, ptr)?.to_vec()
        }
        StorageType::String | StorageType::Address => {
            let ptr = read_u32_le(data, addr)?;
            read_at(data, env, ptr)?.to_vec()
        }
        StorageType::Pointer => key.addr.to_be_bytes().to_vec(),
    })
}

fn store_word(env: &mut Env, slot: Hash, value: Word) -> Result<(), Error> {
    let contract = env.contract;
    let current = env.session.state().get_state(&contract, &slot);
    env.gas.sstore(&current, &value)?;
    env.session.state_mut().set_state(&contract, slot, value);
    Ok(())
}

/// Serializes the value at an entry's memory address into storage.
fn write_entry(data: &[u8], env: &mut Env, entry: &StorageEntry) -> Result<(), Error> {
    let slot = entry_slot(data, env, entry)?;
    let addr = entry.value.addr as u32;

    match entry.value.kind {
        StorageType::String => {
            let ptr = read_u32_le(data, addr)?;
            let bytes = read_at(data, env, ptr)?.to_vec();
            let words = split_words(&bytes);
            store_word(env, slot, word_from_u256(U256::from(words.len())))?;
            for (i, word) in words.iter().enumerate() {
                store_word(env, slot_add(&slot, i as u64 + 1), *word)?;
            }
        }
        StorageType::Uint256 => {
            let ptr = read_u32_le(data, addr)?;
            let text = read_at(data, env, ptr)?.to_vec();
            store_word(env, slot, word_from_u256(u256_from_decimal(&text)))?;
        }
        StorageType::Address => {
            let ptr = read_u32_le(data, addr)?;
            let bytes = read_at(data, env, ptr)?.to_vec();
            store_word(env, slot, word_from_bytes(&bytes))?;
        }
        StorageType::Int32 | StorageType::Uint32 | StorageType::Bool => {
            let value = read_u32_le(data, addr)?;
            store_word(env, slot, word_from_u256(U256::from(value)))?;
        }
        StorageType::Int64 | StorageType::Uint64 => {
            let value = read_u64_le(data, addr)?;
            store_word(env, slot, word_from_u256(U256::from(value)))?;
        }
        StorageType::Pointer => {
            return Err(Error::UnsupportedType("pointer-typed storage value".into()))
        }
    }
    Ok(())
}

/// What a storage read leaves behind at the entry's value address:
/// pointer types allocate fresh arena bytes and patch the pointer,
/// scalars are written back in the VM's little-endian layout.
enum ReadBack {
    Pointer(Vec<u8>),
    U32(u32),
    U64(u64),
}

fn read_entry(data: &[u8], env: &mut Env, entry: &StorageEntry) -> Result<ReadBack, Error> {
    let slot = entry_slot(data, env, entry)?;
    let contract = env.contract;

    Ok(match entry.value.kind {
        StorageType::String => {
            let count = u256_from_word(&env.session.state().get_state(&contract, &slot));
            env.gas.sload()?;
            let mut bytes = Vec::new();
            for i in 1..=count.low_u64() {
                let chunk = env.session.state().get_state(&contract, &slot_add(&slot, i));
                env.gas.sload()?;
                bytes.extend_from_slice(trim_leading_zeros(&chunk));
            }
            ReadBack::Pointer(bytes)
        }
        StorageType::Uint256 => {
            let word = env.session.state().get_state(&contract, &slot);
            env.gas.sload()?;
            ReadBack::Pointer(u256_from_word(&word).to_string().into_bytes())
        }
        StorageType::Address => {
            let word = env.session.state().get_state(&contract, &slot);
            env.gas.sload()?;
            ReadBack::Pointer(word.as_bytes()[12..].to_vec())
        }
        StorageType::Int32 | StorageType::Uint32 | StorageType::Bool => {
            let word = env.session.state().get_state(&contract, &slot);
            env.gas.sload()?;
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&word.as_bytes()[28..]);
            ReadBack::U32(u32::from_be_bytes(buf))
        }
        StorageType::Int64 | StorageType::Uint64 => {
            let word = env.session.state().get_state(&contract, &slot);
            env.gas.sload()?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&word.as_bytes()[24..]);
            ReadBack::U64(u64::from_be_bytes(buf))
        }
        StorageType::Pointer => {
            return Err(Error::UnsupportedType("pointer-typed storage value".into()))
        }
    })
}

fn write_with_pointer(caller: &mut Caller<'_, Env>, val_addr: u64) -> Result<(), Error> {
    let (data, env) = parts(caller)?;
    let Some(entry) = env.registry.get(val_addr).cloned() else {
        return Ok(());
    };
    env.require_mutable()?;
    write_entry(data, env, &entry)
}

fn read_with_pointer(caller: &mut Caller<'_, Env>, val_addr: u64) -> Result<(), Error> {
    let back = {
        let (data, env) = parts(caller)?;
        let Some(entry) = env.registry.get(val_addr).cloned() else {
            return Ok(());
        };
        read_entry(data, env, &entry)?
    };

    match back {
        ReadBack::Pointer(bytes) => {
            let ptr = set_bytes(caller, &bytes)? as u32;
            let (data, _) = parts(caller)?;
            write_slice(data, val_addr as u32, &ptr.to_le_bytes())
        }
        ReadBack::U32(value) => {
            let (data, _) = parts(caller)?;
            write_slice(data, val_addr as u32, &value.to_le_bytes())
        }
        ReadBack::U64(value) => {
            let (data, _) = parts(caller)?;
            write_slice(data, val_addr as u32, &value.to_le_bytes())
        }
    }
}

fn transfer_via_call(caller: &mut Caller<'_, Env>, addr_ptr: u32, amount_ptr: u32) -> Result<bool, Error> {
    caller.data().require_mutable()?;
    let to = read_address(caller, addr_ptr)?;
    let amount = read_u256(caller, amount_ptr)?;

    let env = caller.data_mut();
    let from = env.contract;
    if !env.session.can_transfer(&from, amount) {
        return Ok(false);
    }
    let stipend = env.gas.stipend();
    let outcome = env.session.call(from, to, &[], stipend, amount);
    env.gas.credit(outcome.gas_left);
    env.gas.add_refund(outcome.refund);
    Ok(outcome.output.is_ok())
}

fn resolve(store: &mut Store<Env>, name: &str) -> Result<Func, Error> {
    let func = match name {
        "GetBalanceFromAddress" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, ptr: i32| -> Result<i64, Trap> {
                caller.data_mut().gas.balance()?;
                let addr = read_address(&mut caller, ptr as u32)?;
                let balance = caller.data().session.state().get_balance(&addr);
                Ok(return_u256(&mut caller, balance)? as i64)
            },
        ),
        "GetBlockNumber" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<i64, Trap> {
                caller.data_mut().gas.quick_step()?;
                Ok(caller.data().session.ctx().number as i64)
            },
        ),
        "GetTimestamp" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<i64, Trap> {
                caller.data_mut().gas.quick_step()?;
                Ok(caller.data().session.ctx().timestamp as i64)
            },
        ),
        "GetGasLimit" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<i64, Trap> {
                caller.data_mut().gas.quick_step()?;
                Ok(caller.data().session.ctx().gas_limit as i64)
            },
        ),
        "GetGas" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<i64, Trap> {
                caller.data_mut().gas.quick_step()?;
                Ok(caller.data().gas.remaining() as i64)
            },
        ),
        "GetBlockHash" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, number: i64| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let requested = number as u64;
                let current = caller.data().session.ctx().number;
                // trailing 256-block window, current block excluded
                let hash = if requested < current && requested + 257 > current {
                    (caller.data().session.ctx().get_hash)(requested)
                } else {
                    Hash::zero()
                };
                Ok(set_bytes(&mut caller, hex_text(hash.as_bytes()).as_bytes())?)
            },
        ),
        "GetBlockProduser" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let coinbase = caller.data().session.ctx().coinbase;
                Ok(set_bytes(&mut caller, coinbase.as_bytes())?)
            },
        ),
        "GetOrigin" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let origin = caller.data().session.ctx().origin;
                Ok(set_bytes(&mut caller, origin.as_bytes())?)
            },
        ),
        "GetSender" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let sender = caller.data().caller;
                Ok(set_bytes(&mut caller, sender.as_bytes())?)
            },
        ),
        "GetContractAddress" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let contract = caller.data().contract;
                Ok(set_bytes(&mut caller, contract.as_bytes())?)
            },
        ),
        "GetValue" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let value = caller.data().value;
                Ok(return_u256(&mut caller, value)?)
            },
        ),
        "SHA3" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, ptr: i32| -> Result<i32, Trap> {
                let bytes = read_string(&mut caller, ptr as u32)?;
                caller.data_mut().gas.sha3(bytes.len() as u64)?;
                let hash = crypto::keccak256(&[&bytes]);
                Ok(set_bytes(&mut caller, hex_text(hash.as_bytes()).as_bytes())?)
            },
        ),
        "Assert" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, condition: i32, msg_ptr: i32| -> Result<(), Trap> {
                caller.data_mut().gas.quick_step()?;
                if condition != 1 {
                    let msg = read_string(&mut caller, msg_ptr as u32)?;
                    let msg = String::from_utf8_lossy(&msg).into_owned();
                    return Err(Error::AssertFailed(msg).into());
                }
                Ok(())
            },
        ),
        "Revert" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, msg_ptr: i32| -> Result<(), Trap> {
                caller.data_mut().gas.quick_step()?;
                let msg = read_string(&mut caller, msg_ptr as u32)?;
                caller.data_mut().gas.memory_copy(msg.len() as u64)?;
                let msg = String::from_utf8_lossy(&msg).into_owned();
                info!(message = %msg, "contract revert");
                Err(Error::Reverted(msg).into())
            },
        ),
        "SendFromContract" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, addr_ptr: i32, amount_ptr: i32| -> Result<(), Trap> {
                match transfer_via_call(&mut caller, addr_ptr as u32, amount_ptr as u32)? {
                    true => Ok(()),
                    false => Err(Error::Reverted("transfer failed".to_owned()).into()),
                }
            },
        ),
        "TransferFromContract" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, addr_ptr: i32, amount_ptr: i32| -> Result<i32, Trap> {
                let sent = transfer_via_call(&mut caller, addr_ptr as u32, amount_ptr as u32)?;
                Ok(i32::from(sent))
            },
        ),
        "AddKeyInfo" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>,
             val_addr: i64,
             val_type: i32,
             key_addr: i64,
             key_type: i32,
             is_array_index: i32|
             -> Result<(), Trap> {
                let env = caller.data_mut();
                env.gas.quick_step()?;
                let value = StorageValue {
                    addr: val_addr as u64,
                    kind: StorageType::from_u32(val_type as u32)?,
                };
                let key = StorageKey {
                    addr: key_addr as u64,
                    kind: StorageType::from_u32(key_type as u32)?,
                    is_array_index: is_array_index > 0,
                };
                env.registry.register(value, key);
                Ok(())
            },
        ),
        "WriteWithPointer" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, offset: i64, base: i64| -> Result<(), Trap> {
                let val_addr = (offset as u64).wrapping_add(base as u64);
                write_with_pointer(&mut caller, val_addr)?;
                Ok(())
            },
        ),
        "ReadWithPointer" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, offset: i64, base: i64| -> Result<(), Trap> {
                let val_addr = (offset as u64).wrapping_add(base as u64);
                read_with_pointer(&mut caller, val_addr)?;
                Ok(())
            },
        ),
        "InitializeVariables" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>| -> Result<(), Trap> {
                caller.data().require_mutable()?;
                let entries: Vec<StorageEntry> = caller
                    .data()
                    .registry
                    .iter()
                    .filter(|(_, e)| !e.has_array_index())
                    .map(|(_, e)| e.clone())
                    .collect();
                let (data, env) = parts(&mut caller)?;
                for entry in &entries {
                    write_entry(data, env, entry)?;
                }
                Ok(())
            },
        ),
        GAS_FUNCTION => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, cost: i64| -> Result<(), Trap> {
                caller.data_mut().gas.charge(cost as u64)?;
                Ok(())
            },
        ),
        "FromI64" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, value: i64| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                Ok(set_bytes(&mut caller, value.to_string().as_bytes())?)
            },
        ),
        "FromU64" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, value: i64| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                Ok(set_bytes(&mut caller, (value as u64).to_string().as_bytes())?)
            },
        ),
        "ToI64" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, ptr: i32| -> Result<i64, Trap> {
                caller.data_mut().gas.quick_step()?;
                let text = read_string(&mut caller, ptr as u32)?;
                Ok(std::str::from_utf8(&text)
                    .ok()
                    .and_then(|s| s.trim().parse::<i64>().ok())
                    .unwrap_or(0))
            },
        ),
        "ToU64" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, ptr: i32| -> Result<i64, Trap> {
                caller.data_mut().gas.quick_step()?;
                let text = read_string(&mut caller, ptr as u32)?;
                Ok(std::str::from_utf8(&text)
                    .ok()
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .unwrap_or(0) as i64)
            },
        ),
        "Concat" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, a: i32, b: i32| -> Result<i32, Trap> {
                let mut first = read_string(&mut caller, a as u32)?;
                let second = read_string(&mut caller, b as u32)?;
                caller
                    .data_mut()
                    .gas
                    .memory_copy((first.len() + second.len()) as u64)?;
                first.extend_from_slice(&second);
                Ok(set_bytes(&mut caller, &first)?)
            },
        ),
        "Equal" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, a: i32, b: i32| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let first = read_string(&mut caller, a as u32)?;
                let second = read_string(&mut caller, b as u32)?;
                Ok(i32::from(first == second))
            },
        ),
        "AddressFrom" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, ptr: i32| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let text = read_string(&mut caller, ptr as u32)?;
                let text = String::from_utf8_lossy(&text).into_owned();
                let addr = hex::decode(text.trim().trim_start_matches("0x"))
                    .map(|bytes| address_from_bytes(&bytes))
                    .unwrap_or_else(|_| Address::zero());
                Ok(set_bytes(&mut caller, addr.as_bytes())?)
            },
        ),
        "AddressToString" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, ptr: i32| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let addr = read_address(&mut caller, ptr as u32)?;
                Ok(set_bytes(&mut caller, hex_text(addr.as_bytes()).as_bytes())?)
            },
        ),
        "U256From" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, ptr: i32| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let value = read_u256(&mut caller, ptr as u32)?;
                Ok(return_u256(&mut caller, value)?)
            },
        ),
        "U256ToString" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, ptr: i32| -> Result<i32, Trap> {
                caller.data_mut().gas.quick_step()?;
                let text = read_string(&mut caller, ptr as u32)?;
                Ok(set_bytes(&mut caller, &text)?)
            },
        ),
        "U256FromU64" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, value: i64| -> Result<i32, Trap> {
                caller.data_mut().gas.fastest_step()?;
                Ok(return_u256(&mut caller, U256::from(value as u64))?)
            },
        ),
        "U256FromI64" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, value: i64| -> Result<i32, Trap> {
                caller.data_mut().gas.fastest_step()?;
                // i64 is widened through its two's complement bits
                Ok(return_u256(&mut caller, U256::from(value as u64))?)
            },
        ),
        "U256_Add" => u256_binop(store, |x, y| x.overflowing_add(y).0),
        "U256_Sub" => u256_binop(store, |x, y| x.overflowing_sub(y).0),
        "U256_Mul" => u256_binop(store, |x, y| x.overflowing_mul(y).0),
        "U256_Div" => u256_binop(store, |x, y| {
            if y.is_zero() {
                U256::zero()
            } else {
                x / y
            }
        }),
        "U256_Mod" => u256_binop(store, |x, y| {
            if y.is_zero() {
                U256::zero()
            } else {
                x % y
            }
        }),
        "U256_Pow" => u256_binop(store, |x, y| {
            x.overflowing_pow(y).0
        }),
        "U256_Cmp" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, x: i32, y: i32| -> Result<i32, Trap> {
                caller.data_mut().gas.fastest_step()?;
                let x = read_u256(&mut caller, x as u32)?;
                let y = read_u256(&mut caller, y as u32)?;
                Ok(match x.cmp(&y) {
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                })
            },
        ),
        "Pow" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, base: i64, exponent: i64| -> Result<i64, Trap> {
                caller.data_mut().gas.fastest_step()?;
                let result = (base as u64).wrapping_pow((exponent as u64).min(u32::MAX as u64) as u32);
                Ok(result as i64)
            },
        ),
        "PrintAddress" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, remark: i32, ptr: i32| -> Result<(), Trap> {
                if caller.data().session.debug() {
                    let remark = read_string(&mut caller, remark as u32)?;
                    let addr = read_address(&mut caller, ptr as u32)?;
                    print_line(&remark, &hex_text(addr.as_bytes()));
                }
                Ok(())
            },
        ),
        "PrintStr" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, remark: i32, ptr: i32| -> Result<(), Trap> {
                if caller.data().session.debug() {
                    let remark = read_string(&mut caller, remark as u32)?;
                    let text = read_string(&mut caller, ptr as u32)?;
                    print_line(&remark, &String::from_utf8_lossy(&text));
                }
                Ok(())
            },
        ),
        "PrintQStr" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, remark: i32, ptr: i32| -> Result<(), Trap> {
                if caller.data().session.debug() {
                    let remark = read_string(&mut caller, remark as u32)?;
                    let (data, _) = parts(&mut caller)?;
                    let text = read_qstring(data, ptr as u32)?;
                    print_line(&remark, &hex::encode(&text));
                }
                Ok(())
            },
        ),
        "PrintUint32T" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, remark: i32, value: i32| -> Result<(), Trap> {
                if caller.data().session.debug() {
                    let remark = read_string(&mut caller, remark as u32)?;
                    print_line(&remark, &(value as u32).to_string());
                }
                Ok(())
            },
        ),
        "PrintInt32T" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, remark: i32, value: i32| -> Result<(), Trap> {
                if caller.data().session.debug() {
                    let remark = read_string(&mut caller, remark as u32)?;
                    print_line(&remark, &value.to_string());
                }
                Ok(())
            },
        ),
        "PrintUint64T" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, remark: i32, value: i64| -> Result<(), Trap> {
                if caller.data().session.debug() {
                    let remark = read_string(&mut caller, remark as u32)?;
                    print_line(&remark, &(value as u64).to_string());
                }
                Ok(())
            },
        ),
        "PrintInt64T" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, remark: i32, value: i64| -> Result<(), Trap> {
                if caller.data().session.debug() {
                    let remark = read_string(&mut caller, remark as u32)?;
                    print_line(&remark, &value.to_string());
                }
                Ok(())
            },
        ),
        "PrintUint256T" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, remark: i32, ptr: i32| -> Result<(), Trap> {
                if caller.data().session.debug() {
                    let remark = read_string(&mut caller, remark as u32)?;
                    let value = read_u256(&mut caller, ptr as u32)?;
                    print_line(&remark, &value.to_string());
                }
                Ok(())
            },
        ),
        "Sender" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, ptr: i32| -> Result<(), Trap> {
                let contract = caller.data().contract;
                let (data, _) = parts(&mut caller)?;
                write_slice(data, ptr as u32, contract.as_bytes())?;
                Ok(())
            },
        ),
        "Store" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, key_ptr: i32, data_ptr: i32| -> Result<(), Trap> {
                let (data, env) = parts(&mut caller)?;
                let key = read_qstring(data, key_ptr as u32)?;
                let value = read_qstring(data, data_ptr as u32)?;
                let slot = word_from_bytes(&key);
                let contract = env.contract;
                let words = split_words(&value);
                env.session.state_mut().set_state(
                    &contract,
                    slot,
                    word_from_u256(U256::from(words.len())),
                );
                for (i, word) in words.iter().enumerate() {
                    env.session
                        .state_mut()
                        .set_state(&contract, slot_add(&slot, i as u64 + 1), *word);
                }
                Ok(())
            },
        ),
        "Load" => Func::wrap(
            &mut *store,
            |mut caller: Caller<'_, Env>, key_ptr: i32, data_ptr: i32| -> Result<i32, Trap> {
                let (data, env) = parts(&mut caller)?;
                let key = read_qstring(data, key_ptr as u32)?;
                let slot = word_from_bytes(&key);
                let contract = env.contract;
                let count =
                    u256_from_word(&env.session.state().get_state(&contract, &slot)).low_u64();
                let mut bytes = Vec::new();
                for i in 1..=count {
                    let chunk = env.session.state().get_state(&contract, &slot_add(&slot, i));
                    bytes.extend_from_slice(trim_leading_zeros(&chunk));
                }
                write_slice(data, data_ptr as u32, &bytes)?;
                Ok(bytes.len() as i32)
            },
        ),
        name => {
            let interface = store.data().interface.clone();
            if let Some(event) = interface.events.get(name) {
                event_trampoline(store, event.clone())
            } else if let Some(call) = interface.calls.get(name) {
                call_trampoline(store, call.clone())
            } else {
                return Err(Error::InvalidImport(name.to_owned()));
            }
        }
    };
    Ok(func)
}

fn print_line(remark: &[u8], value: &str) {
    info!(
        remark = %String::from_utf8_lossy(remark),
        value,
        "contract debug",
    );
}

fn u256_binop(store: &mut Store<Env>, op: fn(U256, U256) -> U256) -> Func {
    Func::wrap(
        &mut *store,
        move |mut caller: Caller<'_, Env>, x: i32, y: i32| -> Result<i32, Trap> {
            caller.data_mut().gas.fastest_step()?;
            let x = read_u256(&mut caller, x as u32)?;
            let y = read_u256(&mut caller, y as u32)?;
            Ok(return_u256(&mut caller, op(x, y))?)
        },
    )
}

fn param_value(caller: &mut Caller<'_, Env>, kind: ParamType, raw: &Value) -> Result<AbiValue, Error> {
    Ok(match kind {
        ParamType::Int32 => AbiValue::Int32(raw.i32().unwrap_or(0)),
        ParamType::Uint32 => AbiValue::Uint32(raw.i32().unwrap_or(0) as u32),
        ParamType::Int64 => AbiValue::Int64(raw.i64().unwrap_or(0)),
        ParamType::Uint64 => AbiValue::Uint64(raw.i64().unwrap_or(0) as u64),
        ParamType::Bool => AbiValue::Bool(raw.i32().unwrap_or(0) == 1),
        ParamType::Address => {
            let ptr = raw.i32().unwrap_or(0) as u32;
            AbiValue::Address(read_address(caller, ptr)?)
        }
        ParamType::String => {
            let ptr = raw.i32().unwrap_or(0) as u32;
            AbiValue::Str(read_string(caller, ptr)?)
        }
        ParamType::Uint256 => {
            let ptr = raw.i32().unwrap_or(0) as u32;
            AbiValue::Uint256(read_u256(caller, ptr)?)
        }
    })
}

/// One import per declared event: packs topics and data and appends a
/// log record to the session.
fn event_trampoline(store: &mut Store<Env>, event: Method) -> Func {
    let params: Vec<ValueType> = event.inputs.iter().map(|p| p.kind.value_type()).collect();
    let ty = FuncType::new(params, []);

    Func::new(
        &mut *store,
        ty,
        move |mut caller: Caller<'_, Env>, args: &[Value], _results: &mut [Value]| {
            caller.data().require_mutable().map_err(Trap::from)?;
            debug!(event = %event.name, "emitting event");

            let selector_hash = crypto::keccak256(&[event.signature().as_bytes()]);
            let mut topics = vec![selector_hash];
            let mut data = Vec::new();
            let mut deferred: Vec<(usize, Vec<u8>)> = Vec::new();

            for (param, raw) in event.inputs.iter().zip(args) {
                let bytes: Vec<u8> = match param.kind {
                    ParamType::Address | ParamType::String => {
                        let ptr = raw.i32().unwrap_or(0) as u32;
                        read_string(&mut caller, ptr).map_err(Trap::from)?
                    }
                    ParamType::Int64 | ParamType::Uint64 => {
                        (raw.i64().unwrap_or(0) as u64).to_be_bytes().to_vec()
                    }
                    ParamType::Int32 | ParamType::Uint32 | ParamType::Bool => {
                        (raw.i32().unwrap_or(0) as u32).to_be_bytes().to_vec()
                    }
                    ParamType::Uint256 => {
                        let ptr = raw.i32().unwrap_or(0) as u32;
                        let value = read_u256(&mut caller, ptr).map_err(Trap::from)?;
                        word_from_u256(value).as_bytes().to_vec()
                    }
                };

                if param.indexed {
                    topics.push(word_from_bytes(&bytes));
                } else if param.kind == ParamType::String {
                    // leave an offset word, payload appended after the
                    // fixed part
                    deferred.push((data.len(), bytes));
                    data.extend_from_slice(&[0u8; 32]);
                } else {
                    data.extend_from_slice(word_from_bytes(&bytes).as_bytes());
                }
            }

            for (at, bytes) in deferred {
                let offset = word_from_u256(U256::from(data.len()));
                data[at..at + 32].copy_from_slice(offset.as_bytes());
                data.extend_from_slice(&abi::pack_bytes_slice(&bytes));
            }

            let env = caller.data_mut();
            env.gas
                .log(data.len() as u64, topics.len() as u64)
                .map_err(Trap::from)?;
            let record = Event {
                address: env.contract,
                topics,
                data,
                block_number: env.session.ctx().number,
            };
            env.session.push_event(record);
            Ok(())
        },
    )
}

/// One import per declared external call: packs calldata, runs a nested
/// call and unmarshals the single declared output. Parameter 0 points at
/// the call metadata block in memory.
fn call_trampoline(store: &mut Store<Env>, call: Method) -> Func {
    let mut params = vec![ValueType::I32];
    params.extend(call.inputs.iter().map(|p| p.kind.value_type()));
    let results: Vec<ValueType> = call
        .outputs
        .first()
        .map(|p| p.kind.value_type())
        .into_iter()
        .collect();
    let ty = FuncType::new(params, results);

    Func::new(
        &mut *store,
        ty,
        move |mut caller: Caller<'_, Env>, args: &[Value], results: &mut [Value]| {
            if args.len() != call.inputs.len() + 1 {
                return Err(Trap::from(Error::BadCalldata(
                    "external call arity mismatch".into(),
                )));
            }

            let mut values = Vec::with_capacity(call.inputs.len());
            for (param, raw) in call.inputs.iter().zip(&args[1..]) {
                values.push(param_value(&mut caller, param.kind, raw).map_err(Trap::from)?);
            }
            let calldata = abi::encode_call(&call, &values).map_err(Trap::from)?;

            // metadata block: pointer to target address, pointer to the
            // value text, and the requested gas cap
            let meta = args[0].i32().unwrap_or(0) as u32;
            let (to, amount, requested) = {
                let (data, env) = parts(&mut caller).map_err(Trap::from)?;
                let addr_ptr = read_u32_le(data, meta).map_err(Trap::from)?;
                let value_ptr = read_u32_le(data, meta + 4).map_err(Trap::from)?;
                let requested = read_u64_le(data, meta + 8).map_err(Trap::from)?;
                // raw 20-byte address, may contain zero bytes
                let to =
                    address_from_bytes(read_slice(data, addr_ptr, 20).map_err(Trap::from)?);
                let amount =
                    u256_from_decimal(read_at(data, env, value_ptr).map_err(Trap::from)?);
                (to, amount, requested)
            };

            let output = {
                let env = caller.data_mut();
                let exists = env.session.state().exist(&to);
                let mut gas = env
                    .gas
                    .call_gas(exists, amount, requested)
                    .map_err(Trap::from)?;
                if !amount.is_zero() {
                    gas += env.gas.stipend();
                }
                let from = env.contract;
                let outcome = env.session.call(from, to, &calldata, gas, amount);
                env.gas.credit(outcome.gas_left);
                env.gas.add_refund(outcome.refund);
                outcome
                    .output
                    .map_err(|err| Trap::from(Error::NestedCallFailed(Box::new(err))))?
            };

            let Some(out) = call.outputs.first() else {
                return Ok(());
            };
            let decoded = abi::decode_single(out.kind, &output).map_err(Trap::from)?;
            results[0] = match decoded {
                AbiValue::Int32(v) => Value::I32(v),
                AbiValue::Uint32(v) => Value::I32(v as i32),
                AbiValue::Int64(v) => Value::I64(v),
                AbiValue::Uint64(v) => Value::I64(v as i64),
                AbiValue::Bool(v) => Value::I32(i32::from(v)),
                AbiValue::Address(addr) => {
                    let ptr = set_bytes(&mut caller, addr.as_bytes()).map_err(Trap::from)?;
                    Value::I32(ptr)
                }
                AbiValue::Str(bytes) => {
                    let ptr = set_bytes(&mut caller, &bytes).map_err(Trap::from)?;
                    Value::I32(ptr)
                }
                AbiValue::Uint256(value) => {
                    let ptr = return_u256(&mut caller, value).map_err(Trap::from)?;
                    Value::I32(ptr)
                }
            };
            Ok(())
        },
    )
}
