//! Interfaces to the wallet side: submitting mutations and the current
//! identity.

use crate::error::Result;
use crate::programs::Instruction;
use crate::types::RecordAddress;
use crossbeam_channel::Receiver;
use std::fmt;

/// A mutation ready for signing and submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRequest {
    pub instruction: Instruction,
    /// Extra signers beyond the identity, e.g. fresh records being created.
    pub signers: Vec<RecordAddress>,
}

impl MutationRequest {
    pub fn new(instruction: Instruction) -> Self {
        Self {
            instruction,
            signers: Vec::new(),
        }
    }

    pub fn with_signer(mut self, signer: RecordAddress) -> Self {
        self.signers.push(signer);
        self
    }
}

/// Reference to a submitted transaction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TransactionRef(pub String);

impl fmt::Debug for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tx({})", self.0)
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signs and submits mutations.
pub trait RpcWriter: Send + Sync {
    /// Submit and wait for the transaction to be accepted.
    fn submit(&self, request: &MutationRequest) -> Result<TransactionRef>;

    /// Generate a fresh keypair the writer will sign with, returning its
    /// address. Used for records created at non-derived addresses.
    fn new_signer(&self) -> Result<RecordAddress>;
}

/// The connected wallet.
pub trait IdentityProvider: Send + Sync {
    fn public_key(&self) -> Option<RecordAddress>;

    fn is_connected(&self) -> bool {
        self.public_key().is_some()
    }

    /// Receive the new identity every time it changes.
    fn watch(&self) -> Receiver<Option<RecordAddress>>;
}
