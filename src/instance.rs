// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;

use primitive_types::U256;
use wasmi::core::Pages;
use wasmi::{AsContextMut, Engine, Instance, Memory, Store, Value};

use crate::gas::GasCounter;
use crate::interface::ContractInterface;
use crate::session::Session;
use crate::storage::StorageRegistry;
use crate::types::Address;
use crate::{imports, Error};

pub(crate) const MEMORY_EXPORT: &str = "memory";
const PAGE_SIZE: usize = 64 * 1024;

/// Per-frame environment threaded through the wasmi store. Host functions
/// reach the session and the frame state through this.
pub(crate) struct Env {
    pub session: Session,
    pub contract: Address,
    pub caller: Address,
    pub value: U256,
    pub gas: GasCounter,
    pub interface: ContractInterface,
    pub registry: StorageRegistry,
    /// Mutability of the export being executed, resolved at dispatch.
    pub mutable: bool,
    pub creation: bool,
    pub memory: Option<Memory>,
    heap_ptr: u32,
    allocations: BTreeMap<u32, u32>,
}

impl Env {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Session,
        contract: Address,
        caller: Address,
        value: U256,
        gas: GasCounter,
        interface: ContractInterface,
        creation: bool,
    ) -> Self {
        Self {
            session,
            contract,
            caller,
            value,
            gas,
            interface,
            registry: StorageRegistry::new(),
            mutable: false,
            creation,
            memory: None,
            heap_ptr: 0,
            allocations: BTreeMap::new(),
        }
    }

    /// Reserves `len` bytes of the arena plus a terminating zero byte and
    /// records the allocation length for later reads.
    pub fn alloc(&mut self, len: u32) -> u32 {
        let ptr = self.heap_ptr;
        self.heap_ptr += len + 1;
        self.allocations.insert(ptr, len);
        ptr
    }

    pub fn set_heap_base(&mut self, base: u32) {
        self.heap_ptr = self.heap_ptr.max(base);
    }

    /// Fails unless the executing export was dispatched as mutating.
    pub fn require_mutable(&self) -> Result<(), Error> {
        if !self.mutable {
            return Err(Error::MutableForbidden);
        }
        Ok(())
    }
}

fn out_of_bounds(offset: usize, len: usize, mem_len: usize) -> Error {
    Error::MemoryAccessOutOfBounds {
        offset,
        len,
        mem_len,
    }
}

/// Bounds-checked read of `len` bytes at `offset`.
pub(crate) fn read_slice(data: &[u8], offset: u32, len: u32) -> Result<&[u8], Error> {
    let (offset, len) = (offset as usize, len as usize);
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| out_of_bounds(offset, len, data.len()))?;
    Ok(&data[offset..end])
}

/// Bounds-checked write of `bytes` at `offset`.
pub(crate) fn write_slice(data: &mut [u8], offset: u32, bytes: &[u8]) -> Result<(), Error> {
    let offset = offset as usize;
    let end = offset
        .checked_add(bytes.len())
        .filter(|end| *end <= data.len())
        .ok_or_else(|| out_of_bounds(offset, bytes.len(), data.len()))?;
    data[offset..end].copy_from_slice(bytes);
    Ok(())
}

pub(crate) fn read_u32_le(data: &[u8], offset: u32) -> Result<u32, Error> {
    let bytes = read_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_u64_le(data: &[u8], offset: u32) -> Result<u64, Error> {
    let bytes = read_slice(data, offset, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

/// Reads the byte string at `ptr`: the recorded length for arena
/// allocations, a zero-terminated scan for anything else.
pub(crate) fn read_at<'a>(data: &'a [u8], env: &Env, ptr: u32) -> Result<&'a [u8], Error> {
    if let Some(len) = env.allocations.get(&ptr) {
        return read_slice(data, ptr, *len);
    }
    let start = ptr as usize;
    if start > data.len() {
        return Err(out_of_bounds(start, 0, data.len()));
    }
    let len = data[start..]
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(data.len() - start);
    Ok(&data[start..start + len])
}

/// Copies `bytes` into fresh arena memory, growing the linear memory if
/// the bump pointer runs past it, and returns the pointer.
pub(crate) fn set_bytes(
    memory: &Memory,
    mut ctx: impl AsContextMut<UserState = Env>,
    bytes: &[u8],
) -> Result<u32, Error> {
    let needed = {
        let (data, env) = memory.data_and_store_mut(&mut ctx);
        let end = env.heap_ptr as usize + bytes.len() + 1;
        end.saturating_sub(data.len())
    };
    if needed > 0 {
        let pages = needed.div_ceil(PAGE_SIZE) as u32;
        let pages = Pages::new(pages).ok_or(Error::InvalidMemory)?;
        memory
            .grow(&mut ctx, pages)
            .map_err(|_| Error::InvalidMemory)?;
    }

    let (data, env) = memory.data_and_store_mut(&mut ctx);
    let ptr = env.alloc(bytes.len() as u32);
    write_slice(data, ptr, bytes)?;
    Ok(ptr)
}

/// A live contract instance: the store carrying the frame environment,
/// the instantiated module, and its exported linear memory.
pub(crate) struct WrappedInstance {
    store: Store<Env>,
    instance: Instance,
    memory: Memory,
}

impl WrappedInstance {
    /// Instantiates `bytes` with the host import surface resolved against
    /// the frame's interface. The arena starts above the module's data
    /// segments.
    pub fn new(env: Env, bytes: &[u8], heap_base: u32) -> Result<Self, Error> {
        let engine = Engine::default();
        let module = wasmi::Module::new(&engine, bytes)
            .map_err(|err| Error::MalformedModule(err.to_string().into()))?;

        let mut store = Store::new(&engine, env);
        let linker = imports::link(&engine, &mut store, &module)?;
        let instance = linker
            .instantiate(&mut store, &module)?
            .start(&mut store)?;

        let memory = instance
            .get_memory(&store, MEMORY_EXPORT)
            .ok_or(Error::InvalidMemory)?;
        store.data_mut().memory = Some(memory);
        store.data_mut().set_heap_base(heap_base);

        Ok(Self {
            store,
            instance,
            memory,
        })
    }

    pub fn env(&self) -> &Env {
        self.store.data()
    }

    pub fn env_mut(&mut self) -> &mut Env {
        self.store.data_mut()
    }

    pub fn has_export(&self, name: &str) -> bool {
        self.instance.get_func(&self.store, name).is_some()
    }

    /// Calls the export named `name`, returning its single result if the
    /// wasm signature declares one.
    pub fn call_export(
        &mut self,
        name: &str,
        args: &[Value],
    ) -> Result<Option<Value>, Error> {
        let func = self
            .instance
            .get_func(&self.store, name)
            .ok_or_else(|| Error::InvalidFunctionName(name.to_owned()))?;

        let results_len = func.ty(&self.store).results().len();
        let mut results = vec![Value::I64(0); results_len];
        func.call(&mut self.store, args, &mut results)
            .map_err(|err| Error::from(err).normalize())?;
        Ok(results.into_iter().next())
    }

    pub fn data(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    pub fn set_bytes(&mut self, bytes: &[u8]) -> Result<u32, Error> {
        set_bytes(&self.memory, &mut self.store, bytes)
    }

    /// Reads the byte string at `ptr` out of the instance memory.
    pub fn read_at(&self, ptr: u32) -> Result<Vec<u8>, Error> {
        let data = self.memory.data(&self.store);
        read_at(data, self.store.data(), ptr).map(<[u8]>::to_vec)
    }
}
