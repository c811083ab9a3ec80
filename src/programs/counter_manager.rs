//! Counter-manager program: one counter per authority at a derived address.

use super::{instruction_data, AccountMeta, Instruction, ProgramAccount};
use crate::derivation::find_program_address;
use crate::error::Result;
use crate::types::{RecordAddress, SYSTEM_PROGRAM_ID};
use borsh::{BorshDeserialize, BorshSerialize};

pub const COUNTER_SEED: &[u8] = b"counter";

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Counter {
    pub authority: RecordAddress,
    pub data: u16,
    pub bump: u8,
}

impl ProgramAccount for Counter {
    const NAME: &'static str = "Counter";
}

/// Counter address and bump for `authority`.
pub fn counter_address(
    program_id: &RecordAddress,
    authority: &RecordAddress,
) -> Result<(RecordAddress, u8)> {
    find_program_address(&[COUNTER_SEED, authority.as_ref()], program_id)
}

pub fn init(
    program_id: RecordAddress,
    counter: RecordAddress,
    authority: RecordAddress,
    bump: u8,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "init",
        accounts: vec![
            AccountMeta::new("counter", counter, false),
            AccountMeta::new("authority", authority, true),
            AccountMeta::new_readonly("system_program", SYSTEM_PROGRAM_ID, false),
        ],
        data: instruction_data("init", &bump)?,
    })
}

pub fn increment(
    program_id: RecordAddress,
    counter: RecordAddress,
    authority: RecordAddress,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "increment",
        accounts: vec![
            AccountMeta::new("counter", counter, false),
            AccountMeta::new_readonly("authority", authority, true),
        ],
        data: instruction_data("increment", &())?,
    })
}

/// Close the counter, returning its rent to the authority.
pub fn delete(
    program_id: RecordAddress,
    counter: RecordAddress,
    authority: RecordAddress,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "delete",
        accounts: vec![
            AccountMeta::new("counter", counter, false),
            AccountMeta::new_readonly("authority", authority, true),
        ],
        data: instruction_data("delete", &())?,
    })
}
