//! Interfaces to the remote record channel.
//!
//! The transport (websocket subscriptions, JSON-RPC reads) lives outside
//! this crate. Implementations push change notifications into the
//! [`NotificationSink`] handed to them at subscribe time.

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::types::{Commitment, RecordAddress, RecordFilter, RecordSnapshot};
use std::fmt;
use std::sync::Arc;

/// Callback the channel invokes for every change notification.
pub type NotificationSink = Arc<dyn Fn(RecordSnapshot) + Send + Sync>;

/// Handle for one underlying channel subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelSubscriptionId(pub u64);

impl fmt::Debug for ChannelSubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelSub({})", self.0)
    }
}

/// Push-based access to remote records.
pub trait RecordChannel: Send + Sync {
    /// Notify `sink` whenever the record at `address` changes.
    fn subscribe_account(
        &self,
        address: &RecordAddress,
        commitment: Commitment,
        sink: NotificationSink,
    ) -> Result<ChannelSubscriptionId>;

    fn unsubscribe_account(&self, id: ChannelSubscriptionId) -> Result<()>;

    /// Notify `sink` whenever any record owned by `program_id` and
    /// accepted by every filter changes.
    fn subscribe_program_accounts(
        &self,
        program_id: &RecordAddress,
        commitment: Commitment,
        filters: &[RecordFilter],
        sink: NotificationSink,
    ) -> Result<ChannelSubscriptionId>;

    fn unsubscribe_program_accounts(&self, id: ChannelSubscriptionId) -> Result<()>;

    /// Read a record once. `None` when no record exists.
    fn fetch_account(&self, address: &RecordAddress) -> Result<Option<RecordSnapshot>>;

    /// Read every record owned by `program_id` matching `filters`.
    fn query_program_accounts(
        &self,
        program_id: &RecordAddress,
        filters: &[RecordFilter],
    ) -> Result<Vec<RecordSnapshot>>;
}

/// Builds channels for the connection lifecycle.
pub trait ChannelFactory: Send + Sync {
    fn connect(&self, endpoint: &str, config: &ConnectionConfig) -> Result<Arc<dyn RecordChannel>>;
}
