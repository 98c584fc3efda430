// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! A deterministic WASM smart-contract execution engine.
//!
//! Contracts are compiled off-chain to wasm plus an interface JSON and
//! persisted as a [`ContractBlob`]. A [`VM`] spawns a [`Session`] per
//! transaction; the session runs creations and calls against a
//! [`StateStore`], metering gas by injected basic-block charges and
//! host-call cost classes, and marshaling arguments and storage through
//! the contract's linear memory.

mod abi;
mod contract;
mod crypto;
mod dispatch;
mod error;
mod event;
mod gas;
mod imports;
mod instance;
mod interface;
mod metering;
mod session;
mod state;
mod storage;
mod types;
mod vm;

pub use contract::{ContractBlob, ContractModule};
pub use error::Error;
pub use event::Event;
pub use gas::{GasSchedule, CALL_CREATE_DEPTH, MAX_CODE_SIZE};
pub use interface::{ContractInterface, Method, Param, ParamType};
pub use metering::GAS_FUNCTION;
pub use session::{Outcome, Session};
pub use state::{BlockContext, MemoryState, StateStore};
pub use storage::StorageType;
pub use types::{Address, Hash, Word, H160, H256, U256};
pub use vm::VM;
