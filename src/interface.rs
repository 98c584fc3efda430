// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::crypto;
use crate::Error;

pub const FALLBACK_FUNCTION: &str = "Fallback";
pub const FALLBACK_PAYABLE_FUNCTION: &str = "$Fallback";

/// The value types crossing the ABI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ParamType {
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint32")]
    Uint32,
    #[serde(rename = "uint64")]
    Uint64,
    #[serde(rename = "uint256")]
    Uint256,
    #[serde(rename = "address")]
    Address,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "bool")]
    Bool,
}

impl ParamType {
    pub fn canonical(&self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Uint256 => "uint256",
            Self::Address => "address",
            Self::String => "string",
            Self::Bool => "bool",
        }
    }

    /// The wasm value type carrying this parameter at the host boundary.
    /// Everything is an `i32` pointer or scalar except 64-bit integers.
    pub fn value_type(&self) -> wasmi::core::ValueType {
        match self {
            Self::Int64 | Self::Uint64 => wasmi::core::ValueType::I64,
            _ => wasmi::core::ValueType::I32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(default)]
    pub indexed: bool,
}

/// One declared method, event or external-call target.
#[derive(Debug, Clone, Deserialize)]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Param>,
    #[serde(default)]
    pub outputs: Vec<Param>,
    #[serde(default)]
    pub constant: bool,
}

impl Method {
    /// `name(type,type,...)`, the declared name taken verbatim.
    pub fn signature(&self) -> String {
        let types: Vec<&str> =
            self.inputs.iter().map(|p| p.kind.canonical()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        crypto::selector(&self.signature())
    }

    /// Functions are payable by naming convention: a `$` prefix.
    pub fn payable(&self) -> bool {
        self.name.starts_with('$')
    }

    pub fn mutating(&self) -> bool {
        !self.constant
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawInterface {
    constructor: Method,
    #[serde(default)]
    methods: BTreeMap<String, Method>,
    #[serde(default)]
    events: BTreeMap<String, Method>,
    #[serde(default)]
    calls: BTreeMap<String, Method>,
}

/// The parsed contract interface, built once per contract from the JSON
/// the offline compiler emits, read-only thereafter.
#[derive(Debug, Clone)]
pub struct ContractInterface {
    pub constructor: Method,
    pub methods: BTreeMap<String, Method>,
    pub events: BTreeMap<String, Method>,
    pub calls: BTreeMap<String, Method>,
}

impl ContractInterface {
    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        let raw: RawInterface = serde_json::from_slice(bytes)?;
        Ok(Self {
            constructor: raw.constructor,
            methods: raw.methods,
            events: raw.events,
            calls: raw.calls,
        })
    }

    /// Finds the declared method matching a calldata selector.
    pub fn method_by_selector(&self, sel: [u8; 4]) -> Option<&Method> {
        self.methods.values().find(|m| m.selector() == sel)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Whether a resolved export name runs as mutating. Constructor and
    /// fallback dispatches are always mutating; anything else consults the
    /// declared constant flag.
    pub fn export_mutating(&self, name: &str) -> bool {
        if name == self.constructor.name
            || name == FALLBACK_FUNCTION
            || name == FALLBACK_PAYABLE_FUNCTION
        {
            return true;
        }
        self.methods.get(name).map(Method::mutating).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER_ABI: &str = r#"{
        "constructor": {"name": "init", "inputs": [], "outputs": []},
        "methods": {
            "get": {
                "name": "get",
                "inputs": [{"name": "key", "type": "string"}],
                "outputs": [{"name": "", "type": "uint64"}],
                "constant": true
            },
            "set": {
                "name": "set",
                "inputs": [
                    {"name": "key", "type": "string"},
                    {"name": "value", "type": "uint64"}
                ],
                "outputs": [],
                "constant": false
            }
        },
        "events": {
            "Updated": {
                "name": "Updated",
                "inputs": [
                    {"name": "key", "type": "string", "indexed": true},
                    {"name": "value", "type": "uint64"}
                ]
            }
        }
    }"#;

    #[test]
    fn parses_and_derives_selectors() {
        let interface =
            ContractInterface::from_json(COUNTER_ABI.as_bytes()).unwrap();

        let set = interface.method("set").unwrap();
        assert_eq!(set.signature(), "set(string,uint64)");
        assert_eq!(set.selector(), crypto::selector("set(string,uint64)"));
        assert!(set.mutating());

        let get = interface.method("get").unwrap();
        assert!(!get.mutating());
        assert_eq!(
            interface.method_by_selector(get.selector()).unwrap().name,
            "get"
        );
    }

    #[test]
    fn payable_convention_and_mutability_table() {
        let interface =
            ContractInterface::from_json(COUNTER_ABI.as_bytes()).unwrap();

        assert!(interface.export_mutating("init"));
        assert!(interface.export_mutating("Fallback"));
        assert!(interface.export_mutating("set"));
        assert!(!interface.export_mutating("get"));

        let payable = Method {
            name: "$deposit".into(),
            inputs: vec![],
            outputs: vec![],
            constant: false,
        };
        assert!(payable.payable());
        assert_eq!(payable.signature(), "$deposit()");
    }
}
