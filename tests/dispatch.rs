// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

mod common;

use common::*;
use kiln::{Address, Error, U256};

const ALICE: u64 = 0xA11CE;

#[test]
fn exports_without_outputs_return_the_sentinel() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();
    let counter = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);

    let set = calldata_string_u64(COUNTER_ABI, "set", "alice", 42);
    let ret = session.call(caller, counter, &set, GAS, U256::zero()).output?;
    assert_eq!(ret, 0i32.to_le_bytes());

    Ok(())
}

#[test]
fn declared_outputs_come_back_as_words() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();
    let counter = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);

    let get = calldata_string(COUNTER_ABI, "get", "alice");
    let ret = session.call(caller, counter, &get, GAS, U256::zero()).output?;
    assert_eq!(ret.len(), 32);
    assert_eq!(u64_return(&ret), 0);

    Ok(())
}

#[test]
fn value_to_a_non_payable_function_is_rejected() {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();
    let counter = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);
    session.state_mut().add_balance(&caller, U256::from(100));

    let set = calldata_string_u64(COUNTER_ABI, "set", "alice", 42);
    let outcome = session.call(caller, counter, &set, GAS, U256::from(5));
    assert!(matches!(
        outcome.output,
        Err(Error::InvalidPayableFunction(_))
    ));
    assert_eq!(outcome.gas_left, 0);

    // the rejected transfer is rolled back
    assert_eq!(session.state().get_balance(&caller), U256::from(100));
    assert_eq!(session.state().get_balance(&counter), U256::zero());
}

#[test]
fn payable_functions_accept_value() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();
    let counter = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);
    session.state_mut().add_balance(&caller, U256::from(100));

    let donate = calldata(COUNTER_ABI, "$donate");
    session.call(caller, counter, &donate, GAS, U256::from(5)).output?;

    assert_eq!(session.state().get_balance(&caller), U256::from(95));
    assert_eq!(session.state().get_balance(&counter), U256::from(5));

    Ok(())
}

#[test]
fn unknown_selectors_fall_back() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();
    let counter = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);

    let ret = session
        .call(caller, counter, &[0xde, 0xad, 0xbe, 0xef], GAS, U256::zero())
        .output?;
    assert_eq!(ret, 0i32.to_le_bytes());

    // short calldata takes the same path
    let ret = session.call(caller, counter, b"xy", GAS, U256::zero()).output?;
    assert_eq!(ret, 0i32.to_le_bytes());

    Ok(())
}

#[test]
fn missing_fallback_is_an_invalid_function() {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();
    let array = deploy(&mut session, caller, ARRAY_WAT, ARRAY_ABI);

    let outcome = session.call(caller, array, &[0xde, 0xad, 0xbe, 0xef], GAS, U256::zero());
    assert!(matches!(
        outcome.output,
        Err(Error::InvalidFunctionName(name)) if name == "Fallback"
    ));
}

#[test]
fn value_bearing_calls_need_the_payable_fallback() {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();
    let counter = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);
    session.state_mut().add_balance(&caller, U256::from(100));

    // the counter exports "Fallback" but not "$Fallback"
    let outcome = session.call(caller, counter, &[0xde, 0xad, 0xbe, 0xef], GAS, U256::from(1));
    assert!(matches!(
        outcome.output,
        Err(Error::InvalidFunctionName(name)) if name == "$Fallback"
    ));
    assert_eq!(session.state().get_balance(&caller), U256::from(100));
}

#[test]
fn truncated_arguments_are_bad_calldata() {
    let caller = Address::from_low_u64_be(ALICE);
    let mut session = session();
    let counter = deploy(&mut session, caller, COUNTER_WAT, COUNTER_ABI);

    // "set" wants two argument words; supply one
    let mut data = selector(COUNTER_ABI, "set").to_vec();
    data.extend_from_slice(&word_u64(32));
    let outcome = session.call(caller, counter, &data, GAS, U256::zero());
    assert!(matches!(outcome.output, Err(Error::BadCalldata(_))));
}

#[test]
fn calls_to_empty_accounts_are_clean_no_ops() -> Result<(), Error> {
    let caller = Address::from_low_u64_be(ALICE);
    let nobody = Address::from_low_u64_be(0xB0B);
    let mut session = session();

    let outcome = session.call(caller, nobody, &[0xde, 0xad, 0xbe, 0xef], GAS, U256::zero());
    assert_eq!(outcome.output?, Vec::<u8>::new());
    assert_eq!(outcome.gas_left, GAS);
    assert!(!session.state().exist(&nobody));

    // with value attached the account is created and keeps the funds
    session.state_mut().add_balance(&caller, U256::from(10));
    let outcome = session.call(caller, nobody, &[], GAS, U256::from(4));
    assert_eq!(outcome.output?, Vec::<u8>::new());
    assert_eq!(outcome.gas_left, GAS);
    assert_eq!(session.state().get_balance(&nobody), U256::from(4));

    Ok(())
}
