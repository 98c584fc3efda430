// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use crate::gas::GasSchedule;
use crate::session::Session;
use crate::state::{BlockContext, StateStore};

/// The engine configuration: a gas schedule and the debug flag gating the
/// contract `Print*` diagnostics. Sessions are spawned per transaction.
#[derive(Debug, Clone, Copy)]
pub struct VM {
    schedule: GasSchedule,
    debug: bool,
}

impl VM {
    pub fn new() -> Self {
        Self {
            schedule: GasSchedule::default(),
            debug: cfg!(feature = "debug"),
        }
    }

    pub fn with_schedule(schedule: GasSchedule) -> Self {
        Self {
            schedule,
            debug: cfg!(feature = "debug"),
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    /// Opens a session over a state store for one transaction's call tree.
    pub fn session(&self, state: Box<dyn StateStore>, ctx: BlockContext) -> Session {
        Session::new(state, ctx, self.schedule, self.debug)
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}
