// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::borrow::Cow;

use thiserror::Error;

/// The error type returned by the kiln VM.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Assert failed: {0}")]
    AssertFailed(String),
    #[error("Bad calldata: {0}")]
    BadCalldata(Cow<'static, str>),
    #[error("Improperly encoded boolean value")]
    BadBoolean,
    #[error(transparent)]
    BlobError(bincode::Error),
    #[error("Contract code storage out of gas")]
    CodeStoreOutOfGas,
    #[error("Contract address collision")]
    ContractAddressCollision,
    #[error("Max call depth exceeded")]
    Depth,
    #[error("Array length exceeded")]
    ExceededArray,
    #[error("Floating point instruction forbidden: {0}")]
    FloatingPointForbidden(String),
    #[error("Insufficient balance for transfer")]
    InsufficientBalance,
    #[error("Invalid function name: {0}")]
    InvalidFunctionName(String),
    #[error("Invalid import: {0}")]
    InvalidImport(String),
    #[error("Invalid memory")]
    InvalidMemory,
    #[error("Invalid payable function: {0}")]
    InvalidPayableFunction(String),
    #[error("Malformed contract interface: {0}")]
    MalformedInterface(serde_json::Error),
    #[error("Malformed module: {0}")]
    MalformedModule(Cow<'static, str>),
    #[error("Max code size exceeded: {0}")]
    MaxCodeSizeExceeded(usize),
    #[error("Memory access out of bounds: offset {offset}, length {len}, memory length {mem_len}")]
    MemoryAccessOutOfBounds {
        offset: usize,
        len: usize,
        mem_len: usize,
    },
    #[error("Mismatch mutable type, parent function type: {parent}, current function type: {current}")]
    MismatchMutableFunction {
        parent: &'static str,
        current: &'static str,
    },
    #[error("Mutable forbidden: this function is not a mutable function")]
    MutableForbidden,
    #[error("Module has no export section")]
    NoExportSection,
    #[error("Contract call failed: {0}")]
    NestedCallFailed(Box<Error>),
    #[error("Out of gas")]
    OutOfGas,
    #[error("Execution reverted: {0}")]
    Reverted(String),
    #[error(transparent)]
    RuntimeError(wasmi::Error),
    #[error("Unsupported type: {0}")]
    UnsupportedType(Cow<'static, str>),
}

impl Error {
    /// Recovers a host-side error carried through the runtime as a trap.
    pub fn normalize(self) -> Self {
        match self {
            Self::RuntimeError(wasmi::Error::Trap(trap)) => {
                match trap.downcast::<Self>() {
                    Some(err) => err,
                    None => Self::RuntimeError(wasmi::Error::Trap(
                        wasmi::core::Trap::new("contract trap"),
                    )),
                }
            }
            err => err,
        }
    }

    /// Whether reverting this error forfeits the remaining gas of the frame.
    pub(crate) fn burns_gas(&self) -> bool {
        !matches!(self, Self::Reverted(_))
    }
}

impl wasmi::core::HostError for Error {}

impl From<wasmi::Error> for Error {
    fn from(err: wasmi::Error) -> Self {
        Self::RuntimeError(err)
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::BlobError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedInterface(err)
    }
}
