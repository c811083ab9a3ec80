//! Subscription keys and consumer handles.

use super::fingerprint::FilterFingerprint;
use super::multiplexer::MultiplexerInner;
use crate::types::{Commitment, RecordAddress, RecordSnapshot};
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::sync::Weak;
use std::time::Duration;

/// Identity of one shared underlying subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// Changes to a single record.
    Account(RecordAddress),
    /// Changes to any record a program owns that matches a filter set.
    Program {
        program_id: RecordAddress,
        commitment: Commitment,
        fingerprint: FilterFingerprint,
    },
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::Account(address) => write!(f, "account:{address}"),
            SubscriptionKey::Program {
                commitment,
                fingerprint,
                ..
            } => write!(f, "{fingerprint}@{commitment}"),
        }
    }
}

/// Unique identifier for a logical subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

/// Table slot: a key scoped to the connection generation it was opened on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TableKey {
    pub(crate) generation: u64,
    pub(crate) key: SubscriptionKey,
}

/// A consumer's view onto a shared subscription.
///
/// Dropping the handle detaches it. When the last handle for a key is
/// dropped the underlying channel subscription is torn down.
pub struct Subscription {
    pub(crate) id: SubscriberId,
    pub(crate) slot: TableKey,
    pub(crate) receiver: Receiver<RecordSnapshot>,
    pub(crate) owner: Weak<MultiplexerInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.slot.key
    }

    /// Connection generation this subscription was opened on.
    pub fn generation(&self) -> u64 {
        self.slot.generation
    }

    /// Receive the next notification (blocking).
    pub fn recv(&self) -> Result<RecordSnapshot, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notification (non-blocking).
    pub fn try_recv(&self) -> Result<RecordSnapshot, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<RecordSnapshot, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Take every notification queued so far, in delivery order.
    pub fn drain(&self) -> Vec<RecordSnapshot> {
        self.receiver.try_iter().collect()
    }

    /// Underlying receiver, for use with `crossbeam_channel::select!`.
    pub fn receiver(&self) -> &Receiver<RecordSnapshot> {
        &self.receiver
    }

    /// Detach explicitly. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.slot.key)
            .field("generation", &self.slot.generation)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.detach(&self.slot, self.id);
        }
    }
}
