// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

mod common;

use common::*;
use kiln::{Address, ContractBlob, Error, U256};

const ALICE: u64 = 0xA11CE;

const MINIMAL_ABI: &str =
    r#"{"constructor": {"name": "init", "inputs": [], "outputs": []}}"#;

fn payload(wat: &str, abi: &str) -> Result<Vec<u8>, Error> {
    let code = wat::parse_str(wat).expect("fixture wat compiles");
    ContractBlob::new(code, abi.as_bytes().to_vec()).encode()
}

#[test]
fn create_persists_a_callable_contract() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();

    let counter = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);
    assert_ne!(counter, Address::zero());
    assert_eq!(session.state().get_nonce(&caller), 1);
    assert_eq!(session.state().get_nonce(&counter), 1);

    // the stored code is the blob with its metered cache filled
    let code = session.state().get_code(&counter);
    assert!(!code.is_empty());
    let blob = ContractBlob::from_code(&code)?;
    assert!(blob.compiled.is_some());

    let set = calldata_string_u64(COUNTER_ABI, "set", "alice", 42);
    session.call(caller, counter, &set, GAS, U256::zero()).output?;

    Ok(())
}

#[test]
fn create_charges_a_code_deposit() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();

    let payload = payload(COUNTER_WAT, COUNTER_ABI)?;
    let (_, outcome) = session.create(caller, &payload, GAS, U256::zero());
    outcome.output?;
    assert!(outcome.gas_left < GAS);

    Ok(())
}

#[test]
fn create_transfers_the_endowment() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();
    session.state_mut().add_balance(&caller, U256::from(100));

    let payload = payload(COUNTER_WAT, COUNTER_ABI)?;
    let (address, outcome) = session.create(caller, &payload, GAS, U256::from(40));
    outcome.output?;

    assert_eq!(session.state().get_balance(&caller), U256::from(60));
    assert_eq!(session.state().get_balance(&address), U256::from(40));

    Ok(())
}

#[test]
fn insufficient_balance_fails_before_touching_state() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();

    let payload = payload(COUNTER_WAT, COUNTER_ABI)?;
    let (address, outcome) = session.create(caller, &payload, GAS, U256::from(1));
    assert!(matches!(outcome.output, Err(Error::InsufficientBalance)));
    assert_eq!(outcome.gas_left, GAS);
    assert_eq!(address, Address::zero());
    assert_eq!(session.state().get_nonce(&caller), 0);

    Ok(())
}

#[test]
fn occupied_addresses_collide() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);

    // learn the derived address with a throwaway session
    let mut probe = session();
    let address = deploy(&mut probe, caller, COUNTER_WAT, COUNTER_ABI);

    let mut session = session();
    session.state_mut().set_nonce(&address, 1);

    let payload = payload(COUNTER_WAT, COUNTER_ABI)?;
    let (collided, outcome) = session.create(caller, &payload, GAS, U256::zero());
    assert_eq!(collided, address);
    assert!(matches!(
        outcome.output,
        Err(Error::ContractAddressCollision)
    ));
    assert_eq!(outcome.gas_left, 0);

    // the caller nonce was consumed before the collision was detected
    assert_eq!(session.state().get_nonce(&caller), 1);

    Ok(())
}

#[test]
fn consecutive_creates_derive_distinct_addresses() {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();

    let first = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);
    let second = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);
    assert_ne!(first, second);
    assert_eq!(session.state().get_nonce(&caller), 2);
}

#[test]
fn oversized_code_is_rejected_and_reverted() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();

    let wat = format!(
        r#"(module
            (memory (export "memory") 1)
            (data (i32.const 0) "{}")
            (func (export "init")))"#,
        "x".repeat(25_000)
    );
    let payload = payload(&wat, MINIMAL_ABI)?;
    let (address, outcome) = session.create(caller, &payload, GAS, U256::zero());
    assert!(matches!(
        outcome.output,
        Err(Error::MaxCodeSizeExceeded(_))
    ));
    assert_eq!(outcome.gas_left, 0);
    assert!(!session.state().exist(&address));

    Ok(())
}

#[test]
fn garbage_deployment_payloads_fail_cleanly() {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();

    let (_, outcome) = session.create(caller, b"not a blob", GAS, U256::zero());
    assert!(outcome.output.is_err());
    assert_eq!(outcome.gas_left, 0);
}
