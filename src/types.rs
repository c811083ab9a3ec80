//! Core types shared by the channel, multiplexer and stores.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;

/// Slot number reported by the channel alongside a change.
pub type Slot = u64;

/// Length in bytes of a [`RecordAddress`].
pub const ADDRESS_LEN: usize = 32;

/// Address of a remote record (32 bytes, base58 in text form).
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct RecordAddress(pub [u8; ADDRESS_LEN]);

impl RecordAddress {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        RecordAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Base58 text form, used for display ids and map keys.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Parse from a byte slice of exactly [`ADDRESS_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ClientError> {
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            ClientError::InvalidAddress(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(RecordAddress(arr))
    }
}

impl AsRef<[u8]> for RecordAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for RecordAddress {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| ClientError::InvalidAddress(format!("{s}: {e}")))?;
        Self::from_slice(&bytes)
    }
}

impl TryFrom<String> for RecordAddress {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordAddress> for String {
    fn from(address: RecordAddress) -> Self {
        address.to_base58()
    }
}

impl fmt::Debug for RecordAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordAddress({})", self.to_base58())
    }
}

impl fmt::Display for RecordAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// State of a record as pushed or fetched from the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSnapshot {
    pub address: RecordAddress,
    pub lamports: u64,
    pub data: Vec<u8>,
    pub slot: Slot,
}

impl RecordSnapshot {
    pub fn new(address: RecordAddress, lamports: u64, data: Vec<u8>, slot: Slot) -> Self {
        Self {
            address,
            lamports,
            data,
            slot,
        }
    }

    /// A record with zero lamports has been closed.
    pub fn is_deleted(&self) -> bool {
        self.lamports == 0
    }
}

/// Confirmation level requested from the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Default for Commitment {
    fn default() -> Self {
        Commitment::Confirmed
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Predicate scoping a program-account query to a subset of records.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordFilter {
    /// Record data is exactly this many bytes.
    DataSize(u64),
    /// Record data contains `bytes` starting at `offset`.
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl RecordFilter {
    /// Memcmp filter matching a 32-byte address at `offset`.
    pub fn address_at(offset: usize, address: &RecordAddress) -> Self {
        RecordFilter::Memcmp {
            offset,
            bytes: address.0.to_vec(),
        }
    }

    /// Evaluate the predicate against raw record data.
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            RecordFilter::DataSize(size) => data.len() as u64 == *size,
            RecordFilter::Memcmp { offset, bytes } => offset
                .checked_add(bytes.len())
                .and_then(|end| data.get(*offset..end))
                .is_some_and(|window| window == bytes.as_slice()),
        }
    }
}

/// True when every filter accepts `data`.
pub fn matches_all(filters: &[RecordFilter], data: &[u8]) -> bool {
    filters.iter().all(|filter| filter.matches(data))
}

/// The system program (all-zero address).
pub const SYSTEM_PROGRAM_ID: RecordAddress = RecordAddress([0; ADDRESS_LEN]);

/// SPL token program address.
pub fn token_program_id() -> RecordAddress {
    "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        .parse()
        .expect("token program id is valid base58")
}

/// Rent sysvar address.
pub fn rent_sysvar_id() -> RecordAddress {
    "SysvarRent111111111111111111111111111111111"
        .parse()
        .expect("rent sysvar id is valid base58")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrips_through_base58() {
        let address = RecordAddress([7; 32]);
        let parsed: RecordAddress = address.to_base58().parse().unwrap();
        assert_eq!(parsed, address);
    }

    #[test]
    fn test_system_program_text_form() {
        assert_eq!(
            SYSTEM_PROGRAM_ID.to_string(),
            "11111111111111111111111111111111"
        );
    }

    #[test]
    fn test_rejects_wrong_length() {
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(matches!(
            short.parse::<RecordAddress>(),
            Err(ClientError::InvalidAddress(_))
        ));
        assert!("not-base58-0OIl".parse::<RecordAddress>().is_err());
    }

    #[test]
    fn test_well_known_ids_parse() {
        assert_ne!(token_program_id(), SYSTEM_PROGRAM_ID);
        assert_ne!(rent_sysvar_id(), SYSTEM_PROGRAM_ID);
    }

    #[test]
    fn test_memcmp_matches() {
        let data = [0u8, 1, 2, 3, 4, 5];
        let hit = RecordFilter::Memcmp {
            offset: 2,
            bytes: vec![2, 3],
        };
        let miss = RecordFilter::Memcmp {
            offset: 5,
            bytes: vec![5, 6],
        };
        assert!(hit.matches(&data));
        assert!(!miss.matches(&data));
        assert!(RecordFilter::DataSize(6).matches(&data));
        assert!(!RecordFilter::DataSize(7).matches(&data));
    }

    #[test]
    fn test_deleted_snapshot() {
        let snapshot = RecordSnapshot::new(RecordAddress::default(), 0, vec![], 1);
        assert!(snapshot.is_deleted());
    }
}
