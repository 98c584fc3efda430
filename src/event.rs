// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use crate::types::{Address, Hash};

/// A log record appended by a contract through one of its declared event
/// imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The contract that emitted the event.
    pub address: Address,
    /// Topic 0 is the event selector hash; one further topic per indexed
    /// input.
    pub topics: Vec<Hash>,
    /// ABI-packed non-indexed inputs.
    pub data: Vec<u8>,
    /// Block the emitting transaction ran in.
    pub block_number: u64,
}
