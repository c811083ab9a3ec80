//! # chainview
//!
//! Client-side core for observing and mutating records owned by a small set
//! of on-chain programs.
//!
//! ## Core Concepts
//!
//! - **Connection**: The current record channel, rebuilt whenever the
//!   endpoint or config changes
//! - **Multiplexer**: One underlying subscription per account or filtered
//!   program query, shared by every consumer
//! - **Programs**: Typed account layouts and instruction builders
//! - **Stores**: View models reconciled from identity changes, reloads,
//!   push notifications and serialized commands
//!
//! ## Example
//!
//! ```ignore
//! use chainview::{ClientConfig, CounterStore, Pump, StoreContext};
//!
//! let config = ClientConfig::load("chainview.json")?;
//! let ctx = StoreContext::from_config(&config, factory, writer, identity);
//!
//! let counter = CounterStore::new(ctx);
//! counter.pump();
//! counter.increment();
//! counter.pump();
//!
//! println!("{:?}", counter.snapshot().value());
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod derivation;
pub mod error;
pub mod programs;
pub mod rpc;
pub mod stores;
pub mod subscriptions;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

// Re-exports
pub use channel::{ChannelFactory, ChannelSubscriptionId, NotificationSink, RecordChannel};
pub use config::{ClientConfig, ConnectionConfig, ProgramIds, DEFAULT_ENDPOINT};
pub use connection::Connection;
pub use derivation::{create_program_address, find_program_address};
pub use error::{ClientError, Result};
pub use programs::{decode_account, AccountMeta, Instruction, ProgramAccount};
pub use rpc::{IdentityProvider, MutationRequest, RpcWriter, TransactionRef};
pub use stores::{
    CheckCommand, CheckStore, CheckView, CommandOutcome, CounterCommand, CounterEntry,
    CounterListCommand, CounterListStore, CounterListView, CounterStore, CounterView,
    EntityState, Pump, StoreContext, StoreDriver, TodoListView, TodoView, TrackerCommand,
    TrackerStore, TrackerView,
};
pub use subscriptions::{
    fingerprint, FilterFingerprint, SubscriberId, Subscription, SubscriptionKey,
    SubscriptionMultiplexer,
};
pub use types::{Commitment, RecordAddress, RecordFilter, RecordSnapshot, Slot};
