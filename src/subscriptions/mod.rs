//! Shared subscriptions to remote record changes.
//!
//! Many consumers ask for the same record or the same program query. The
//! multiplexer keeps exactly one underlying channel subscription per key:
//! - Account keys dedupe on the record address
//! - Program keys dedupe on program id, commitment and the filter
//!   fingerprint, so filter order never matters
//! - The underlying subscription closes as soon as the last consumer drops
//!   its handle
//!
//! # Example
//!
//! ```ignore
//! let mux = SubscriptionMultiplexer::new(connection);
//!
//! let first = mux.subscribe_account(address)?;
//! let second = mux.subscribe_account(address)?; // shares `first`'s channel subscription
//!
//! while let Ok(snapshot) = first.recv() {
//!     if snapshot.is_deleted() {
//!         break;
//!     }
//! }
//! ```

mod fingerprint;
mod multiplexer;
mod types;

pub use fingerprint::{fingerprint, FilterFingerprint};
pub use multiplexer::SubscriptionMultiplexer;
pub use types::{SubscriberId, Subscription, SubscriptionKey};
