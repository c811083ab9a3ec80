//! Counter program: any number of counters per authority, each a fresh
//! keypair record.

use super::{instruction_data, AccountMeta, Instruction, ProgramAccount};
use crate::error::Result;
use crate::types::{RecordAddress, RecordFilter, SYSTEM_PROGRAM_ID};
use borsh::{BorshDeserialize, BorshSerialize};

/// Offset of `authority` in a [`Counter`].
pub const AUTHORITY_OFFSET: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Counter {
    pub authority: RecordAddress,
    pub data: u16,
}

impl ProgramAccount for Counter {
    const NAME: &'static str = "Counter";
}

/// Filter selecting every counter `authority` owns.
pub fn owned_by(authority: &RecordAddress) -> RecordFilter {
    RecordFilter::address_at(AUTHORITY_OFFSET, authority)
}

/// `counter` is a fresh record and must co-sign; `authority` pays for it.
pub fn init(
    program_id: RecordAddress,
    counter: RecordAddress,
    authority: RecordAddress,
) -> Result<Instruction> {
    Ok(Instruction {
        program_id,
        name: "init",
        accounts: vec![
            AccountMeta::new("counter", counter, true),
            AccountMeta::new("authority", authority, true),
            AccountMeta::new_readonly("system_program", SYSTEM_PROGRAM_ID, false),
        ],
        data: instruction_data("init", &())?,
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
            AccountMeta::new_readonly("authority", authority, true),
            AccountMeta::new("counter", counter, false),
        ],
        data: instruction_data("increment", &())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::{decode_account, encode_account, instruction_discriminator};

    #[test]
    fn test_counter_layout() {
        let counter = Counter {
            authority: RecordAddress([1; 32]),
            data: 7,
        };
        let data = encode_account(&counter).unwrap();
        assert_eq!(data.len(), 8 + 32 + 2);
        assert!(owned_by(&RecordAddress([1; 32])).matches(&data));
        assert!(!owned_by(&RecordAddress([2; 32])).matches(&data));
        assert_eq!(decode_account::<Counter>(&data).unwrap(), counter);
    }

    #[test]
    fn test_init_is_cosigned_by_the_new_record() {
        let counter = RecordAddress([2; 32]);
        let authority = RecordAddress([1; 32]);
        let ix = init(RecordAddress([9; 32]), counter, authority).unwrap();

        assert_eq!(ix.data, instruction_discriminator("init").to_vec());
        assert_eq!(ix.signers().collect::<Vec<_>>(), vec![&counter, &authority]);
        assert!(ix.account("authority").unwrap().is_writable);
    }

    #[test]
    fn test_increment_needs_only_the_authority() {
        let authority = RecordAddress([1; 32]);
        let ix = increment(RecordAddress([9; 32]), RecordAddress([2; 32]), authority).unwrap();
        assert_eq!(ix.signers().collect::<Vec<_>>(), vec![&authority]);
        assert!(ix.account("counter").unwrap().is_writable);
    }
}
