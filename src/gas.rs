// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use primitive_types::U256;

use crate::types::Word;
use crate::Error;

/// Static cost schedule for host operations and metered instructions.
#[derive(Debug, Clone, Copy)]
pub struct GasSchedule {
    pub quick_step: u64,      // 2
    pub fastest_step: u64,    // 3
    pub fast_step: u64,       // 5
    pub mid_step: u64,        // 8
    pub slow_step: u64,       // 10
    pub ext_step: u64,        // 20

    pub sload: u64,           // 200
    pub balance: u64,         // 400
    pub call: u64,            // 700

    pub call_stipend: u64,        // 2,300
    pub call_value_transfer: u64, // 9,000
    pub call_new_account: u64,    // 25,000

    pub sstore_set: u64,    // 20,000
    pub sstore_reset: u64,  // 5,000
    pub sstore_clear: u64,  // 5,000
    pub sstore_refund: u64, // 15,000

    pub log: u64,       // 375
    pub log_topic: u64, // 375
    pub log_data: u64,  // 8 per byte

    pub sha3: u64,      // 30
    pub sha3_word: u64, // 6

    pub create_data: u64, // 200 per byte
    pub memory: u64,      // 3 per page
    pub copy: u64,        // 3 per word

    /// Cost of a regular metered instruction in the injected charge blocks.
    pub instruction: u64, // 1
}

pub const MAX_CODE_SIZE: usize = 24576;
pub const CALL_CREATE_DEPTH: usize = 1024;

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            quick_step: 2,
            fastest_step: 3,
            fast_step: 5,
            mid_step: 8,
            slow_step: 10,
            ext_step: 20,

            sload: 200,
            balance: 400,
            call: 700,

            call_stipend: 2_300,
            call_value_transfer: 9_000,
            call_new_account: 25_000,

            sstore_set: 20_000,
            sstore_reset: 5_000,
            sstore_clear: 5_000,
            sstore_refund: 15_000,

            log: 375,
            log_topic: 375,
            log_data: 8,

            sha3: 30,
            sha3_word: 6,

            create_data: 200,
            memory: 3,
            copy: 3,

            instruction: 1,
        }
    }
}

/// Tracks the remaining gas of one call frame.
///
/// A failed charge zeroes the counter: once a frame runs out of gas no
/// further work in that frame may be paid for.
#[derive(Debug, Clone)]
pub struct GasCounter {
    gas: u64,
    refund: u64,
    schedule: GasSchedule,
}

impl GasCounter {
    pub fn new(gas: u64, schedule: GasSchedule) -> Self {
        Self {
            gas,
            refund: 0,
            schedule,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.gas
    }

    pub fn refunded(&self) -> u64 {
        self.refund
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    /// Credits gas back to the frame, e.g. the unused remainder of a
    /// nested call.
    pub fn credit(&mut self, gas: u64) {
        self.gas = self.gas.saturating_add(gas);
    }

    /// Folds a nested frame's accumulated refund into this frame's.
    pub fn add_refund(&mut self, refund: u64) {
        self.refund = self.refund.saturating_add(refund);
    }

    /// Consumes all remaining gas, the penalty applied on fatal errors.
    pub fn consume_all(&mut self) {
        self.gas = 0;
    }

    pub fn charge(&mut self, cost: u64) -> Result<(), Error> {
        if cost > self.gas {
            self.gas = 0;
            return Err(Error::OutOfGas);
        }
        self.gas -= cost;
        Ok(())
    }

    pub fn quick_step(&mut self) -> Result<(), Error> {
        self.charge(self.schedule.quick_step)
    }

    pub fn fastest_step(&mut self) -> Result<(), Error> {
        self.charge(self.schedule.fastest_step)
    }

    pub fn balance(&mut self) -> Result<(), Error> {
        self.charge(self.schedule.balance)
    }

    pub fn sload(&mut self) -> Result<(), Error> {
        self.charge(self.schedule.sload)
    }

    /// Storage write cost keyed on the zero-ness transition of the slot.
    pub fn sstore(&mut self, current: &Word, new: &Word) -> Result<(), Error> {
        let zero = Word::zero();
        if *current == zero && *new != zero {
            self.charge(self.schedule.sstore_set)
        } else if *current != zero && *new == zero {
            self.refund += self.schedule.sstore_refund;
            self.charge(self.schedule.sstore_clear)
        } else {
            self.charge(self.schedule.sstore_reset)
        }
    }

    pub fn sha3(&mut self, len: u64) -> Result<(), Error> {
        let words = len.div_ceil(32);
        self.charge(self.schedule.sha3 + words * self.schedule.sha3_word)
    }

    pub fn log(&mut self, data_len: u64, topics: u64) -> Result<(), Error> {
        self.charge(
            self.schedule.log
                + topics * self.schedule.log_topic
                + data_len * self.schedule.log_data,
        )
    }

    /// Per-byte cost of copying host-produced bytes into contract memory.
    pub fn memory_copy(&mut self, len: u64) -> Result<(), Error> {
        let words = len.div_ceil(32);
        self.charge(words * self.schedule.copy)
    }

    /// One-off charge for the module's initial linear memory, applied at
    /// contract creation.
    pub fn initial_memory(&mut self, pages: u64) -> Result<(), Error> {
        self.charge(pages * self.schedule.memory)
    }

    pub fn create_data(&mut self, len: u64) -> Result<(), Error> {
        self.charge(len * self.schedule.create_data / 2)
    }

    /// Charges the base cost of a nested call and computes the gas
    /// forwarded to the callee: the requested cap bounded by 63/64 of what
    /// remains after the base charge.
    pub fn call_gas(
        &mut self,
        target_exists: bool,
        value: U256,
        requested: u64,
    ) -> Result<u64, Error> {
        let mut base = self.schedule.call;
        if !value.is_zero() {
            base += self.schedule.call_value_transfer;
            if !target_exists {
                base += self.schedule.call_new_account;
            }
        }
        self.charge(base)?;

        let cap = self.gas - self.gas / 64;
        let forwarded = if requested > 0 && requested < cap {
            requested
        } else {
            cap
        };
        self.charge(forwarded)?;
        Ok(forwarded)
    }

    pub fn stipend(&self) -> u64 {
        self.schedule.call_stipend
    }
}
