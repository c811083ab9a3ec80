//! Split-a-check program: a check with an escrow token account that
//! collects partial payments until the total is covered.

use super::{instruction_data, AccountMeta, Instruction, ProgramAccount};
use crate::derivation::find_program_address;
use crate::error::Result;
use crate::types::{rent_sysvar_id, token_program_id, RecordAddress, SYSTEM_PROGRAM_ID};
use borsh::{BorshDeserialize, BorshSerialize};

pub const CHECK_SEED: &[u8] = b"check";
pub const ESCROW_SEED: &[u8] = b"escrow";

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Check {
    pub authority: RecordAddress,
    pub id: u64,
    pub escrow: RecordAddress,
    pub total: u64,
    pub payed: u64,
    pub token_mint: RecordAddress,
    pub check_bump: u8,
    pub escrow_bump: u8,
}

impl ProgramAccount for Check {
    const NAME: &'static str = "Check";
}

impl Check {
    /// Amount still owed.
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.payed)
    }

    pub fn is_settled(&self) -> bool {
        self.payed >= self.total
    }
}

/// Check address and bump for `id`.
pub fn check_address(program_id: &RecordAddress, id: u64) -> Result<(RecordAddress, u8)> {
    find_program_address(&[CHECK_SEED, &id.to_le_bytes()], program_id)
}

/// Escrow address and bump for `check`.
pub fn escrow_address(
    program_id: &RecordAddress,
    check: &RecordAddress,
) -> Result<(RecordAddress, u8)> {
    find_program_address(&[ESCROW_SEED, check.as_ref()], program_id)
}

#[derive(BorshSerialize)]
struct CreateCheckArgs {
    check_id: u64,
    check_bump: u8,
    escrow_bump: u8,
    total: u64,
}

/// Accounts for [`create_check`].
#[derive(Clone, Debug)]
pub struct CreateCheckAccounts {
    pub check: RecordAddress,
    pub escrow: RecordAddress,
    pub token_mint: RecordAddress,
    /// Authority's token account receiving the settled funds.
    pub receiver: RecordAddress,
    pub authority: RecordAddress,
}

pub fn create_check(
    program_id: RecordAddress,
    accounts: &CreateCheckAccounts,
    check_id: u64,
    check_bump: u8,
    escrow_bump: u8,
    total: u64,
) -> Result<Instruction> {
    let args = CreateCheckArgs {
        check_id,
        check_bump,
        escrow_bump,
        total,
    };
    Ok(Instruction {
        program_id,
        name: "create_check",
        accounts: vec![
            AccountMeta::new("check", accounts.check, false),
            AccountMeta::new("escrow", accounts.escrow, false),
            AccountMeta::new_readonly("token_mint", accounts.token_mint, false),
            AccountMeta::new("receiver", accounts.receiver, false),
            AccountMeta::new_readonly("token_program", token_program_id(), false),
            AccountMeta::new_readonly("rent", rent_sysvar_id(), false),
            AccountMeta::new_readonly("system_program", SYSTEM_PROGRAM_ID, false),
            AccountMeta::new("authority", accounts.authority, true),
        ],
        data: instruction_data("create_check", &args)?,
    })
}

/// Accounts for [`submit_partial_payment`].
#[derive(Clone, Debug)]
pub struct PaymentAccounts {
    pub check: RecordAddress,
    pub escrow: RecordAddress,
    pub token_mint: RecordAddress,
    /// Paying wallet.
    pub authority: RecordAddress,
    /// Payer's token account the amount is drawn from.
    pub payer: RecordAddress,
    /// Check authority's token account receiving the settled funds.
    pub receiver: RecordAddress,
}

pub fn submit_partial_payment(
    program_id: RecordAddress,
    accounts: &PaymentAccounts,
    amount: u64,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "submit_partial_payment",
        accounts: vec![
            AccountMeta::new("check", accounts.check, false),
            AccountMeta::new("escrow", accounts.escrow, false),
            AccountMeta::new_readonly("token_mint", accounts.token_mint, false),
            AccountMeta::new_readonly("token_program", token_program_id(), false),
            AccountMeta::new("authority", accounts.authority, true),
            AccountMeta::new("associated_token", accounts.payer, false),
            AccountMeta::new("receiver", accounts.receiver, false),
        ],
        data: instruction_data("submit_partial_payment", &amount)?,
    })
}
