// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;

use primitive_types::U256;

use crate::crypto;
use crate::types::{Address, Hash, Word};

/// The persistent state the engine executes against.
///
/// The surrounding node supplies the real implementation; [`MemoryState`]
/// is the in-memory reference used by tests. Snapshots are opaque
/// checkpoints: `revert_to` undoes every mutation made after the matching
/// `snapshot` call.
pub trait StateStore {
    fn get_state(&self, addr: &Address, key: &Hash) -> Word;
    fn set_state(&mut self, addr: &Address, key: Hash, value: Word);

    fn get_balance(&self, addr: &Address) -> U256;
    fn add_balance(&mut self, addr: &Address, amount: U256);
    fn sub_balance(&mut self, addr: &Address, amount: U256);

    fn get_nonce(&self, addr: &Address) -> u64;
    fn set_nonce(&mut self, addr: &Address, nonce: u64);

    fn get_code(&self, addr: &Address) -> Vec<u8>;
    fn set_code(&mut self, addr: &Address, code: Vec<u8>);
    fn get_code_hash(&self, addr: &Address) -> Hash;

    fn create_account(&mut self, addr: &Address);
    fn exist(&self, addr: &Address) -> bool;

    fn snapshot(&mut self) -> usize;
    fn revert_to(&mut self, snapshot: usize);
}

/// Whether `from` holds at least `amount`.
pub fn can_transfer(state: &dyn StateStore, from: &Address, amount: U256) -> bool {
    state.get_balance(from) >= amount
}

/// Moves `amount` between accounts. The caller must have checked
/// [`can_transfer`] first.
pub fn transfer(state: &mut dyn StateStore, from: &Address, to: &Address, amount: U256) {
    state.sub_balance(from, amount);
    state.add_balance(to, amount);
}

/// Block-level execution context, owned by the session for the duration
/// of one top-level invocation.
#[derive(Debug, Clone)]
pub struct BlockContext {
    /// Sender of the top-level transaction.
    pub origin: Address,
    /// Block producer.
    pub coinbase: Address,
    pub number: u64,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub difficulty: U256,
    /// Hash of a past block by number, for the trailing 256-block window.
    pub get_hash: fn(u64) -> Hash,
    /// Whether `from` holds at least `amount`.
    pub can_transfer: fn(&dyn StateStore, &Address, U256) -> bool,
    /// Moves `amount` between accounts.
    pub transfer: fn(&mut dyn StateStore, &Address, &Address, U256),
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            origin: Address::zero(),
            coinbase: Address::zero(),
            number: 0,
            timestamp: 0,
            gas_limit: 0,
            difficulty: U256::zero(),
            get_hash: |_| Hash::zero(),
            can_transfer,
            transfer,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Account {
    balance: U256,
    nonce: u64,
    code: Vec<u8>,
    storage: BTreeMap<Hash, Word>,
}

/// In-memory [`StateStore`] with clone-based snapshots.
#[derive(Debug, Default)]
pub struct MemoryState {
    accounts: BTreeMap<Address, Account>,
    snapshots: Vec<BTreeMap<Address, Account>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    fn account_mut(&mut self, addr: &Address) -> &mut Account {
        self.accounts.entry(*addr).or_default()
    }
}

impl StateStore for MemoryState {
    fn get_state(&self, addr: &Address, key: &Hash) -> Word {
        self.accounts
            .get(addr)
            .and_then(|acc| acc.storage.get(key))
            .copied()
            .unwrap_or_else(Word::zero)
    }

    fn set_state(&mut self, addr: &Address, key: Hash, value: Word) {
        self.account_mut(addr).storage.insert(key, value);
    }

    fn get_balance(&self, addr: &Address) -> U256 {
        self.accounts
            .get(addr)
            .map(|acc| acc.balance)
            .unwrap_or_else(U256::zero)
    }

    fn add_balance(&mut self, addr: &Address, amount: U256) {
        let acc = self.account_mut(addr);
        acc.balance = acc.balance.saturating_add(amount);
    }

    fn sub_balance(&mut self, addr: &Address, amount: U256) {
        let acc = self.account_mut(addr);
        acc.balance = acc.balance.saturating_sub(amount);
    }

    fn get_nonce(&self, addr: &Address) -> u64 {
        self.accounts.get(addr).map(|acc| acc.nonce).unwrap_or(0)
    }

    fn set_nonce(&mut self, addr: &Address, nonce: u64) {
        self.account_mut(addr).nonce = nonce;
    }

    fn get_code(&self, addr: &Address) -> Vec<u8> {
        self.accounts
            .get(addr)
            .map(|acc| acc.code.clone())
            .unwrap_or_default()
    }

    fn set_code(&mut self, addr: &Address, code: Vec<u8>) {
        self.account_mut(addr).code = code;
    }

    fn get_code_hash(&self, addr: &Address) -> Hash {
        match self.accounts.get(addr) {
            Some(acc) => crypto::keccak256(&[&acc.code]),
            None => Hash::zero(),
        }
    }

    fn create_account(&mut self, addr: &Address) {
        // keep the balance if the account already carried one
        let balance = self.get_balance(addr);
        let acc = self.account_mut(addr);
        *acc = Account {
            balance,
            ..Account::default()
        };
    }

    fn exist(&self, addr: &Address) -> bool {
        self.accounts.contains_key(addr)
    }

    fn snapshot(&mut self) -> usize {
        self.snapshots.push(self.accounts.clone());
        self.snapshots.len() - 1
    }

    fn revert_to(&mut self, snapshot: usize) {
        self.accounts = self.snapshots[snapshot].clone();
        self.snapshots.truncate(snapshot);
    }
}
