//! Bindings for the on-chain programs the stores talk to.
//!
//! Accounts are laid out as an 8-byte discriminator followed by a borsh
//! body; instructions carry an 8-byte sighash followed by borsh arguments.
//! Both prefixes are the first 8 bytes of a sha256 over a namespaced name.

pub mod check;
pub mod counter;
pub mod counter_manager;
pub mod tracker;

use crate::error::{ClientError, Result};
use crate::types::RecordAddress;
use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

/// Length of account discriminators and instruction sighashes.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Discriminator for the account type `name` (`sha256("account:<name>")[..8]`).
pub fn account_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    namespaced_hash("account", name)
}

/// Sighash for the instruction `name`, given in snake case.
pub fn instruction_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    namespaced_hash("global", name)
}

fn namespaced_hash(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::new()
        .chain_update(namespace.as_bytes())
        .chain_update(b":")
        .chain_update(name.as_bytes())
        .finalize();
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

/// A typed account owned by one of the programs.
pub trait ProgramAccount: BorshSerialize + BorshDeserialize {
    /// Account type name as declared by the program.
    const NAME: &'static str;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        account_discriminator(Self::NAME)
    }

    /// True when `data` starts with this type's discriminator.
    fn is_type_of(data: &[u8]) -> bool {
        data.get(..DISCRIMINATOR_LEN) == Some(&Self::discriminator()[..])
    }
}

/// Decode account data into `T`.
///
/// Trailing bytes after the body are ignored: accounts are allocated with
/// room to spare and the remainder stays zeroed.
pub fn decode_account<T: ProgramAccount>(data: &[u8]) -> Result<T> {
    if data.len() < DISCRIMINATOR_LEN {
        return Err(ClientError::decode(
            T::NAME,
            format!("{} bytes is shorter than the discriminator", data.len()),
        ));
    }
    let (prefix, mut body) = data.split_at(DISCRIMINATOR_LEN);
    let expected = T::discriminator();
    if prefix != expected.as_slice() {
        return Err(ClientError::decode(
            T::NAME,
            format!(
                "discriminator mismatch: expected {}, found {}",
                hex::encode(expected),
                hex::encode(prefix)
            ),
        ));
    }
    T::deserialize(&mut body).map_err(|e| ClientError::decode(T::NAME, e.to_string()))
}

/// Encode `account` with its discriminator, as the program would store it.
pub fn encode_account<T: ProgramAccount>(account: &T) -> Result<Vec<u8>> {
    let mut data = T::discriminator().to_vec();
    account
        .serialize(&mut data)
        .map_err(|e| ClientError::decode(T::NAME, e.to_string()))?;
    Ok(data)
}

/// Account passed to an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountMeta {
    /// Account name as declared by the instruction, for diagnostics.
    pub name: &'static str,
    pub address: RecordAddress,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(name: &'static str, address: RecordAddress, is_signer: bool) -> Self {
        Self {
            name,
            address,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(name: &'static str, address: RecordAddress, is_signer: bool) -> Self {
        Self {
            name,
            address,
            is_signer,
            is_writable: false,
        }
    }
}

/// A program invocation ready to hand to the writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: RecordAddress,
    /// Instruction name, for diagnostics.
    pub name: &'static str,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl Instruction {
    /// Addresses that must sign.
    pub fn signers(&self) -> impl Iterator<Item = &RecordAddress> {
        self.accounts
            .iter()
            .filter(|meta| meta.is_signer)
            .map(|meta| &meta.address)
    }

    pub fn account(&self, name: &str) -> Option<&AccountMeta> {
        self.accounts.iter().find(|meta| meta.name == name)
    }
}

/// Sighash for `name` followed by the borsh encoding of `args`.
pub fn instruction_data<A: BorshSerialize>(name: &str, args: &A) -> Result<Vec<u8>> {
    let mut data = instruction_discriminator(name).to_vec();
    args.serialize(&mut data)
        .map_err(|e| ClientError::Mutation(format!("encoding {name} arguments: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(BorshSerialize, BorshDeserialize, Debug, PartialEq)]
    struct Sample {
        value: u32,
    }

    impl ProgramAccount for Sample {
        const NAME: &'static str = "Sample";
    }

    #[test]
    fn test_discriminators_are_namespaced() {
        assert_ne!(account_discriminator("init"), instruction_discriminator("init"));
        assert_eq!(account_discriminator("Counter"), account_discriminator("Counter"));
    }

    #[test]
    fn test_known_sighash() {
        // sha256("global:initialize")[..8]
        assert_eq!(
            hex::encode(instruction_discriminator("initialize")),
            "afaf6d1f0d989bed"
        );
    }

    #[test]
    fn test_decode_accepts_trailing_padding() {
        let mut data = encode_account(&Sample { value: 9 }).unwrap();
        data.extend_from_slice(&[0; 16]);
        assert_eq!(decode_account::<Sample>(&data).unwrap(), Sample { value: 9 });
    }

    #[test]
    fn test_decode_rejects_wrong_discriminator() {
        let mut data = encode_account(&Sample { value: 1 }).unwrap();
        data[0] ^= 0xff;
        let err = decode_account::<Sample>(&data).unwrap_err();
        assert!(matches!(err, ClientError::Decode { ref account, .. } if account == "Sample"));
    }

    #[test]
    fn test_decode_rejects_short_data() {
        assert!(decode_account::<Sample>(&[1, 2, 3]).is_err());
        let truncated = &encode_account(&Sample { value: 1 }).unwrap()[..10];
        assert!(decode_account::<Sample>(truncated).is_err());
    }

    #[test]
    fn test_instruction_data_layout() {
        let data = instruction_data("init", &7u8).unwrap();
        assert_eq!(&data[..8], &instruction_discriminator("init"));
        assert_eq!(&data[8..], &[7]);
    }
}
