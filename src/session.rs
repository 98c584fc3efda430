// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! The session: one transaction's recursive call tree against a state
//! store. Entry points are `create`, `call`, `call_code`, `delegate_call`
//! and `static_call`; every nested contract call re-enters through the
//! same session.

use primitive_types::U256;
use tracing::{debug, info};

use crate::contract::{ContractBlob, ContractModule};
use crate::dispatch;
use crate::event::Event;
use crate::gas::{GasCounter, GasSchedule, CALL_CREATE_DEPTH, MAX_CODE_SIZE};
use crate::instance::{Env, WrappedInstance};
use crate::state::{BlockContext, StateStore};
use crate::types::{Address, Hash};
use crate::{crypto, metering, Error};

/// The system address exempt from the all-gas penalty on failed calls.
const NO_GAS_BURN_ADDRESS: u64 = 9;

/// Mutability class of the running invocation.
const CLASS_UNDETERMINED: i8 = -1;
const CLASS_NON_MUTATING: i8 = 0;
const CLASS_MUTATING: i8 = 1;

/// The result of one engine entry point: the output or the error it
/// failed with, and the gas left after all penalty rules are applied.
#[derive(Debug)]
pub struct Outcome {
    pub output: Result<Vec<u8>, Error>,
    pub gas_left: u64,
    /// Gas credited back by storage clears, discarded when the frame is
    /// rolled back.
    pub refund: u64,
}

struct SessionInner {
    state: Box<dyn StateStore>,
    ctx: BlockContext,
    schedule: GasSchedule,
    debug: bool,
    depth: usize,
    mutability: i8,
    events: Vec<Event>,
}

/// A session with a state store.
///
/// Host functions hold an alias of the session in the wasmi store data
/// while the original is borrowed by the running frame, so the inner
/// session is leaked on construction and reclaimed when the original is
/// dropped.
pub struct Session {
    inner: &'static mut SessionInner,
    original: bool,
}

// The session is used from a single thread at a time; aliases never leave
// the call tree rooted at the original.
unsafe impl Send for Session {}
unsafe impl Sync for Session {}

impl Drop for Session {
    fn drop(&mut self) {
        if self.original {
            // SAFETY: the inner session was leaked from a box in
            // `Session::new`, and aliases only live inside frames that
            // are gone by the time the original drops.
            unsafe {
                let _ = Box::from_raw(self.inner);
            }
        }
    }
}

impl Session {
    pub(crate) fn new(
        state: Box<dyn StateStore>,
        ctx: BlockContext,
        schedule: GasSchedule,
        debug: bool,
    ) -> Self {
        let inner = Box::leak(Box::new(SessionInner {
            state,
            ctx,
            schedule,
            debug,
            depth: 0,
            mutability: CLASS_UNDETERMINED,
            events: Vec::new(),
        }));
        Self {
            inner,
            original: true,
        }
    }

    /// Aliases the session for a nested frame. Not a [`Clone`] impl: the
    /// alias shares the inner session and must not outlive the original.
    pub(crate) fn alias(&self) -> Self {
        let inner = self.inner as *const SessionInner as *mut SessionInner;
        // SAFETY: frames run strictly nested, so the alias and the
        // original are never used concurrently.
        let inner = unsafe { &mut *inner };
        Self {
            inner,
            original: false,
        }
    }

    /// The state store the session executes against.
    pub fn state(&self) -> &dyn StateStore {
        &*self.inner.state
    }

    pub fn state_mut(&mut self) -> &mut dyn StateStore {
        &mut *self.inner.state
    }

    pub(crate) fn ctx(&self) -> &BlockContext {
        &self.inner.ctx
    }

    pub(crate) fn debug(&self) -> bool {
        self.inner.debug
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        self.inner.events.push(event);
    }

    /// Events emitted so far in this session, in emission order.
    pub fn events(&self) -> &[Event] {
        &self.inner.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.inner.events)
    }

    pub(crate) fn can_transfer(&self, from: &Address, amount: U256) -> bool {
        (self.inner.ctx.can_transfer)(&*self.inner.state, from, amount)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: U256) {
        (self.inner.ctx.transfer)(&mut *self.inner.state, from, to, amount);
    }

    /// Applies one dispatch to the invocation's mutability class. The
    /// first dispatch fixes the class; a mutating dispatch under a
    /// non-mutating class is a protocol violation.
    pub(crate) fn resolve_mutability(&mut self, mutable: bool) -> Result<(), Error> {
        match self.inner.mutability {
            CLASS_UNDETERMINED => {
                self.inner.mutability = if mutable {
                    CLASS_MUTATING
                } else {
                    CLASS_NON_MUTATING
                };
                Ok(())
            }
            CLASS_NON_MUTATING if mutable => Err(Error::MismatchMutableFunction {
                parent: "unmutable",
                current: "mutable",
            }),
            _ => Ok(()),
        }
    }

    fn reset_invocation(&mut self) {
        if self.inner.depth == 0 {
            self.inner.mutability = CLASS_UNDETERMINED;
        }
    }

    /// A rollback point: the state snapshot and the event journal length.
    fn checkpoint(&mut self) -> (usize, usize) {
        (self.inner.state.snapshot(), self.inner.events.len())
    }

    /// Reverts the state and discards events recorded past the checkpoint.
    fn rollback(&mut self, checkpoint: (usize, usize)) {
        self.inner.state.revert_to(checkpoint.0);
        self.inner.events.truncate(checkpoint.1);
    }

    /// Deploys a contract. The payload is the encoded blob followed by
    /// ABI-encoded constructor arguments.
    pub fn create(
        &mut self,
        caller: Address,
        payload: &[u8],
        gas: u64,
        value: U256,
    ) -> (Address, Outcome) {
        self.reset_invocation();
        if self.inner.depth >= CALL_CREATE_DEPTH {
            return (Address::zero(), fail(Error::Depth, gas));
        }
        if !self.can_transfer(&caller, value) {
            return (Address::zero(), fail(Error::InsufficientBalance, gas));
        }

        let nonce = self.inner.state.get_nonce(&caller);
        self.inner.state.set_nonce(&caller, nonce + 1);
        let address = crypto::create_address(&caller, nonce);
        debug!(?address, "creating contract");

        let code_hash = self.inner.state.get_code_hash(&address);
        let occupied = self.inner.state.get_nonce(&address) != 0
            || (code_hash != Hash::zero() && code_hash != crypto::empty_code_hash());
        if occupied {
            return (address, fail(Error::ContractAddressCollision, 0));
        }

        let snapshot = self.checkpoint();
        self.inner.state.create_account(&address);
        self.inner.state.set_nonce(&address, 1);
        self.transfer(&caller, &address, value);

        let (output, mut gas_left, mut refund) =
            self.exec_frame(caller, address, address, payload, gas, value, true);

        let output = output.and_then(|blob| {
            if blob.len() > MAX_CODE_SIZE {
                return Err(Error::MaxCodeSizeExceeded(blob.len()));
            }
            let deposit = blob.len() as u64 * self.inner.schedule.create_data / 2;
            if gas_left < deposit {
                return Err(Error::CodeStoreOutOfGas);
            }
            gas_left -= deposit;
            self.inner.state.set_code(&address, blob.clone());
            Ok(blob)
        });

        if let Err(err) = &output {
            // code-store exhaustion keeps the created account
            if !matches!(err, Error::CodeStoreOutOfGas) {
                self.rollback(snapshot);
                refund = 0;
            }
            if err.burns_gas() {
                gas_left = 0;
            }
            info!(%err, "create failed");
        }
        (
            address,
            Outcome {
                output,
                gas_left,
                refund,
            },
        )
    }

    /// Calls the contract at `addr` with `input` as calldata.
    pub fn call(
        &mut self,
        caller: Address,
        addr: Address,
        input: &[u8],
        gas: u64,
        value: U256,
    ) -> Outcome {
        self.reset_invocation();
        if self.inner.depth >= CALL_CREATE_DEPTH {
            return fail(Error::Depth, gas);
        }
        if !self.can_transfer(&caller, value) {
            return fail(Error::InsufficientBalance, gas);
        }

        if !self.inner.state.exist(&addr) && value.is_zero() {
            return Outcome {
                output: Ok(Vec::new()),
                gas_left: gas,
                refund: 0,
            };
        }

        let snapshot = self.checkpoint();
        if !self.inner.state.exist(&addr) {
            self.inner.state.create_account(&addr);
        }
        self.transfer(&caller, &addr, value);

        if self.inner.state.get_code(&addr).is_empty() {
            return Outcome {
                output: Ok(Vec::new()),
                gas_left: gas,
                refund: 0,
            };
        }

        let (output, mut gas_left, mut refund) =
            self.exec_frame(caller, addr, addr, input, gas, value, false);

        if let Err(err) = &output {
            self.rollback(snapshot);
            refund = 0;
            if err.burns_gas() && addr != Address::from_low_u64_be(NO_GAS_BURN_ADDRESS) {
                gas_left = 0;
            }
            info!(%err, ?addr, "call failed");
        }
        Outcome {
            output,
            gas_left,
            refund,
        }
    }

    /// Runs the code at `addr` against the caller's own address and
    /// storage. Errors revert but keep the remaining gas.
    pub fn call_code(
        &mut self,
        caller: Address,
        addr: Address,
        input: &[u8],
        gas: u64,
        value: U256,
    ) -> Outcome {
        self.reset_invocation();
        if self.inner.depth >= CALL_CREATE_DEPTH {
            return fail(Error::Depth, gas);
        }
        if !self.can_transfer(&caller, value) {
            return fail(Error::InsufficientBalance, gas);
        }

        let snapshot = self.checkpoint();
        let (output, gas_left, mut refund) =
            self.exec_frame(caller, caller, addr, input, gas, value, false);
        if output.is_err() {
            self.rollback(snapshot);
            refund = 0;
        }
        Outcome {
            output,
            gas_left,
            refund,
        }
    }

    /// [`Self::call_code`] preserving the original caller and value of the
    /// parent frame.
    pub fn delegate_call(
        &mut self,
        parent_caller: Address,
        contract: Address,
        addr: Address,
        input: &[u8],
        gas: u64,
        value: U256,
    ) -> Outcome {
        self.reset_invocation();
        if self.inner.depth >= CALL_CREATE_DEPTH {
            return fail(Error::Depth, gas);
        }

        let snapshot = self.checkpoint();
        let (output, gas_left, mut refund) =
            self.exec_frame(parent_caller, contract, addr, input, gas, value, false);
        if output.is_err() {
            self.rollback(snapshot);
            refund = 0;
        }
        Outcome {
            output,
            gas_left,
            refund,
        }
    }

    /// Reserved: static calls are not executed yet.
    pub fn static_call(
        &mut self,
        _caller: Address,
        _addr: Address,
        _input: &[u8],
        _gas: u64,
    ) -> Outcome {
        Outcome {
            output: Ok(Vec::new()),
            gas_left: 1,
            refund: 0,
        }
    }

    /// Runs one frame: decodes the blob, instantiates the metered module
    /// and dispatches into it. `contract` is the storage/identity context,
    /// `code_source` the account whose code runs; the two differ only for
    /// call-code flavors. Returns the frame output, its remaining gas and
    /// its accumulated refund.
    #[allow(clippy::too_many_arguments)]
    fn exec_frame(
        &mut self,
        caller: Address,
        contract: Address,
        code_source: Address,
        input: &[u8],
        gas: u64,
        value: U256,
        creation: bool,
    ) -> (Result<Vec<u8>, Error>, u64, u64) {
        self.inner.depth += 1;
        let result = self.run_frame(caller, contract, code_source, input, gas, value, creation);
        self.inner.depth -= 1;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run_frame(
        &mut self,
        caller: Address,
        contract: Address,
        code_source: Address,
        input: &[u8],
        gas: u64,
        value: U256,
        creation: bool,
    ) -> (Result<Vec<u8>, Error>, u64, u64) {
        let decoded = if creation {
            ContractBlob::from_deployment(input)
        } else {
            ContractBlob::from_code(&self.inner.state.get_code(&code_source))
                .map(|blob| (blob, input.to_vec()))
        };
        let (mut blob, calldata) = match decoded {
            Ok(parts) => parts,
            Err(err) => return (Err(err), gas, 0),
        };

        let mut instance =
            match self.instantiate(&mut blob, caller, contract, gas, value, creation) {
                Ok(instance) => instance,
                Err(err) => return (Err(err), 0, 0),
            };

        let result = dispatch::dispatch(&mut instance, &calldata);
        let gas_left = instance.env().gas.remaining();
        let refund = instance.env().gas.refunded();

        let output = result.and_then(|ret| {
            if creation {
                // the persisted code is the blob carrying the compiled cache
                blob.encode()
            } else {
                Ok(ret)
            }
        });
        (output, gas_left, refund)
    }

    /// Builds the live instance for a frame. Creation validates and meters
    /// the raw code and fills the compiled cache; calls reuse the cache.
    fn instantiate(
        &mut self,
        blob: &mut ContractBlob,
        caller: Address,
        contract: Address,
        gas: u64,
        value: U256,
        creation: bool,
    ) -> Result<WrappedInstance, Error> {
        let schedule = self.inner.schedule;
        let interface = blob.interface()?;
        let mut counter = GasCounter::new(gas, schedule);

        let module = ContractModule::new(&blob.code)?;
        let heap_base = module.data_end();
        let bytes = if creation {
            counter.initial_memory(module.initial_pages())?;
            let compiled = metering::instrument_bytes(&blob.code, &schedule)?;
            blob.compiled = Some(compiled.clone());
            compiled
        } else {
            blob.execution_bytes(&schedule)?
        };

        let env = Env::new(
            self.alias(),
            contract,
            caller,
            value,
            counter,
            interface,
            creation,
        );
        WrappedInstance::new(env, &bytes, heap_base)
    }
}

fn fail(err: Error, gas_left: u64) -> Outcome {
    Outcome {
        output: Err(err),
        gas_left,
        refund: 0,
    }
}
