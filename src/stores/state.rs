//! Reconciliation state for a single derived record.

use crate::error::Result;
use crate::types::{RecordAddress, RecordSnapshot};

/// Lifecycle of one record a store tracks.
///
/// `Unresolved` until the inputs to derive the address are known,
/// `Resolving` until the first read or notification lands, then `Empty` or
/// `Present` as the record is closed and (re)created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityState<T> {
    Unresolved,
    Resolving {
        address: RecordAddress,
        bump: u8,
    },
    Empty {
        address: RecordAddress,
        bump: u8,
    },
    Present {
        address: RecordAddress,
        bump: u8,
        entity: T,
    },
}

impl<T> Default for EntityState<T> {
    fn default() -> Self {
        EntityState::Unresolved
    }
}

impl<T: Clone + PartialEq> EntityState<T> {
    /// Start tracking a freshly derived address.
    pub fn resolving(address: RecordAddress, bump: u8) -> Self {
        EntityState::Resolving { address, bump }
    }

    pub fn address(&self) -> Option<RecordAddress> {
        self.derivation().map(|(address, _)| address)
    }

    pub fn bump(&self) -> Option<u8> {
        self.derivation().map(|(_, bump)| bump)
    }

    /// Address and bump, once derived.
    pub fn derivation(&self) -> Option<(RecordAddress, u8)> {
        match self {
            EntityState::Unresolved => None,
            EntityState::Resolving { address, bump }
            | EntityState::Empty { address, bump }
            | EntityState::Present { address, bump, .. } => Some((*address, *bump)),
        }
    }

    pub fn entity(&self) -> Option<&T> {
        match self {
            EntityState::Present { entity, .. } => Some(entity),
            _ => None,
        }
    }

    /// Apply a notification for the tracked record.
    ///
    /// Snapshots for other addresses are ignored. A zero-lamport snapshot
    /// moves to `Empty`. A decode failure is returned and leaves the state
    /// as it was. Returns whether the state changed.
    pub fn apply<F>(&mut self, snapshot: &RecordSnapshot, decode: F) -> Result<bool>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        let Some((address, bump)) = self.derivation() else {
            return Ok(false);
        };
        if snapshot.address != address {
            return Ok(false);
        }
        let next = if snapshot.is_deleted() {
            EntityState::Empty { address, bump }
        } else {
            EntityState::Present {
                address,
                bump,
                entity: decode(&snapshot.data)?,
            }
        };
        Ok(self.replace(next))
    }

    /// Apply the result of a direct read; `None` means no record exists.
    pub fn apply_fetch<F>(&mut self, fetched: Option<&RecordSnapshot>, decode: F) -> Result<bool>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        match fetched {
            Some(snapshot) => self.apply(snapshot, decode),
            None => match self.derivation() {
                Some((address, bump)) => Ok(self.replace(EntityState::Empty { address, bump })),
                None => Ok(false),
            },
        }
    }

    fn replace(&mut self, next: Self) -> bool {
        if *self == next {
            return false;
        }
        *self = next;
        true
    }
}
