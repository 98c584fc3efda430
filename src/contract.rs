// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::io::Cursor;

use parity_wasm::elements::{Instruction, Module};
use serde::{Deserialize, Serialize};

use crate::gas::GasSchedule;
use crate::interface::ContractInterface;
use crate::metering;
use crate::Error;

/// The persisted on-chain representation of a contract: raw bytecode,
/// the compiler's interface JSON, and the metered bytecode cache filled
/// in at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractBlob {
    pub code: Vec<u8>,
    pub abi: Vec<u8>,
    pub compiled: Option<Vec<u8>>,
}

impl ContractBlob {
    pub fn new(code: Vec<u8>, abi: Vec<u8>) -> Self {
        Self {
            code,
            abi,
            compiled: None,
        }
    }

    /// Decodes a deployment payload: the blob prefix, then whatever
    /// remains is ABI-encoded constructor calldata.
    pub fn from_deployment(bytes: &[u8]) -> Result<(Self, Vec<u8>), Error> {
        let mut cursor = Cursor::new(bytes);
        let blob: Self = bincode::deserialize_from(&mut cursor)?;
        let consumed = cursor.position() as usize;
        Ok((blob, bytes[consumed..].to_vec()))
    }

    /// Decodes the blob stored as an account's code.
    pub fn from_code(bytes: &[u8]) -> Result<Self, Error> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(bincode::serialize(self)?)
    }

    pub fn interface(&self) -> Result<ContractInterface, Error> {
        ContractInterface::from_json(&self.abi)
    }

    /// The bytes to execute: the compiled cache when present, otherwise
    /// the raw code metered on the spot.
    pub fn execution_bytes(&self, schedule: &GasSchedule) -> Result<Vec<u8>, Error> {
        match &self.compiled {
            Some(bytes) => Ok(bytes.clone()),
            None => metering::instrument_bytes(&self.code, schedule),
        }
    }
}

/// A deserialized module with the section facts the engine needs.
pub struct ContractModule {
    module: Module,
}

impl ContractModule {
    /// Parses and validates executable bytes. A module without exports
    /// cannot be dispatched into and is rejected up front.
    pub fn new(bytes: &[u8]) -> Result<Self, Error> {
        let module = parity_wasm::deserialize_buffer::<Module>(bytes)
            .map_err(|err| Error::MalformedModule(err.to_string().into()))?;
        let exported = module
            .export_section()
            .map(|s| !s.entries().is_empty())
            .unwrap_or(false);
        if !exported {
            return Err(Error::NoExportSection);
        }
        Ok(Self { module })
    }

    pub fn has_export(&self, name: &str) -> bool {
        self.module
            .export_section()
            .map(|s| s.entries().iter().any(|e| e.field() == name))
            .unwrap_or(false)
    }

    /// Initial linear-memory pages declared by the module, charged once
    /// at creation.
    pub fn initial_pages(&self) -> u64 {
        self.module
            .memory_section()
            .and_then(|s| s.entries().first())
            .map(|m| u64::from(m.limits().initial()))
            .unwrap_or(0)
    }

    /// One past the highest byte any data segment initializes; the bump
    /// allocator for host-written bytes starts above this.
    pub fn data_end(&self) -> u32 {
        let Some(data) = self.module.data_section() else {
            return 0;
        };
        data.entries()
            .iter()
            .filter_map(|segment| {
                let offset = segment.offset().as_ref()?.code().first()?;
                match offset {
                    Instruction::I32Const(base) => {
                        Some(*base as u32 + segment.value().len() as u32)
                    }
                    _ => None,
                }
            })
            .max()
            .unwrap_or(0)
    }

    pub fn module(&self) -> &Module {
        &self.module
    }
}
