// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

//! Block-level gas metering: partitions every function body into basic
//! blocks and injects an `[i64.const cost, call $AddGas]` charge at each
//! block entry. Modules that do not import the charge hook are left
//! untouched.

use parity_wasm::elements::{External, Instruction, Module};

use crate::gas::GasSchedule;
use crate::Error;

/// The reserved charge-hook import name.
pub const GAS_FUNCTION: &str = "AddGas";

/// Deserializes, meters and re-serializes a module. The returned bytes
/// are what Create persists as the compiled cache.
pub fn instrument_bytes(code: &[u8], schedule: &GasSchedule) -> Result<Vec<u8>, Error> {
    let module = parity_wasm::deserialize_buffer::<Module>(code)
        .map_err(|err| Error::MalformedModule(err.to_string().into()))?;
    let module = instrument(module, schedule)?;
    parity_wasm::serialize(module)
        .map_err(|err| Error::MalformedModule(err.to_string().into()))
}

/// Meters every function body of `module` against `schedule`.
pub fn instrument(mut module: Module, schedule: &GasSchedule) -> Result<Module, Error> {
    reject_floats(&module)?;

    let Some(gas_index) = gas_import_index(&module) else {
        return Ok(module);
    };

    if let Some(code) = module.code_section_mut() {
        for body in code.bodies_mut() {
            let instructions = body.code_mut().elements_mut();
            let blocks = partition(instructions, schedule)?;
            inject(instructions, &blocks, gas_index);
        }
    }
    Ok(module)
}

/// The charge hook's index in the function index space: its position
/// among the module's function imports.
pub fn gas_import_index(module: &Module) -> Option<u32> {
    let entries = module.import_section()?.entries();
    let mut func_index = 0u32;
    for entry in entries {
        if let External::Function(_) = entry.external() {
            if entry.field() == GAS_FUNCTION {
                return Some(func_index);
            }
            func_index += 1;
        }
    }
    None
}

/// Floating point is non-deterministic across targets and forbidden in
/// consensus code.
fn reject_floats(module: &Module) -> Result<(), Error> {
    if let Some(code) = module.code_section() {
        for body in code.bodies() {
            for instruction in body.code().elements() {
                let text = instruction.to_string();
                if text.contains("f32") || text.contains("f64") {
                    return Err(Error::FloatingPointForbidden(text));
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
struct BlockEntry {
    /// Injection point: the index of the block's first costed instruction.
    start: usize,
    cost: u64,
}

struct Counter {
    blocks: Vec<(usize, u64, Option<usize>)>,
    stack: Vec<usize>,
}

impl Counter {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn begin(&mut self, cursor: usize) {
        self.stack.push(self.blocks.len());
        self.blocks.push((cursor, 0, None));
    }

    fn finalize(&mut self) -> Result<(), Error> {
        self.stack
            .pop()
            .map(|_| ())
            .ok_or(Error::MalformedModule("unbalanced control flow".into()))
    }

    fn increment(&mut self, cost: u64, index: usize) -> Result<(), Error> {
        let top = *self
            .stack
            .last()
            .ok_or(Error::MalformedModule("unbalanced control flow".into()))?;
        let block = &mut self.blocks[top];
        block.1 += cost;
        block.2.get_or_insert(index);
        Ok(())
    }
}

/// Walks one function body and returns its charged blocks, sorted by
/// start index. Blocks that charge nothing are dropped.
fn partition(
    instructions: &[Instruction],
    schedule: &GasSchedule,
) -> Result<Vec<BlockEntry>, Error> {
    let mut counter = Counter::new();
    counter.begin(0);

    for (i, instruction) in instructions.iter().enumerate() {
        match instruction {
            Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_) => {
                counter.begin(i + 1);
            }
            Instruction::Br(_) | Instruction::BrIf(_) | Instruction::BrTable(_) => {
                counter.finalize()?;
                counter.begin(i + 1);
            }
            Instruction::End => counter.finalize()?,
            Instruction::Else => {
                counter.finalize()?;
                counter.begin(i + 1);
            }
            _ => counter.increment(schedule.instruction, i)?,
        }
    }

    let mut blocks: Vec<BlockEntry> = counter
        .blocks
        .into_iter()
        .filter_map(|(_, cost, first)| {
            first.map(|start| BlockEntry { start, cost })
        })
        .collect();
    blocks.sort_by_key(|b| b.start);
    Ok(blocks)
}

fn inject(instructions: &mut Vec<Instruction>, blocks: &[BlockEntry], gas_index: u32) {
    let mut offset = 0usize;
    for block in blocks {
        let pos = block.start + offset;
        instructions.insert(pos, Instruction::Call(gas_index));
        instructions.insert(pos, Instruction::I64Const(block.cost as i64));
        offset += 2;
    }
}
