//! View-model stores.
//!
//! Each store reconciles four event sources into a view model:
//! - identity changes re-derive the tracked addresses and start over
//! - connection replacements re-open subscriptions on the new channel
//! - reload requests read the records directly, bypassing pushes
//! - push notifications replace the decoded entities
//!
//! Commands are queued and executed one at a time, in submission order, by
//! [`Pump::pump`]. Failures are logged and never stop later events.

mod check;
mod commands;
mod counter;
mod counter_list;
mod driver;
mod state;
mod tracker;

pub use check::{CheckCommand, CheckStore, CheckView};
pub use commands::{CommandOutcome, CommandQueue};
pub use counter::{CounterCommand, CounterStore, CounterView};
pub use counter_list::{CounterEntry, CounterListCommand, CounterListStore, CounterListView};
pub use driver::{Pump, StoreDriver};
pub use state::EntityState;
pub use tracker::{TodoListView, TodoView, TrackerCommand, TrackerStore, TrackerView};

use crate::channel::ChannelFactory;
use crate::config::{ClientConfig, ProgramIds};
use crate::connection::Connection;
use crate::error::Result;
use crate::rpc::{IdentityProvider, MutationRequest, RpcWriter, TransactionRef};
use crate::subscriptions::SubscriptionMultiplexer;
use crate::types::{RecordAddress, RecordFilter, RecordSnapshot};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Collaborators shared by every store.
#[derive(Clone)]
pub struct StoreContext {
    pub connection: Connection,
    pub multiplexer: SubscriptionMultiplexer,
    pub writer: Arc<dyn RpcWriter>,
    pub identity: Arc<dyn IdentityProvider>,
    pub programs: ProgramIds,
}

impl StoreContext {
    pub fn new(
        connection: Connection,
        writer: Arc<dyn RpcWriter>,
        identity: Arc<dyn IdentityProvider>,
        programs: ProgramIds,
    ) -> Self {
        Self {
            multiplexer: SubscriptionMultiplexer::new(connection.clone()),
            connection,
            writer,
            identity,
            programs,
        }
    }

    /// Connect per `config` and wire up a fresh multiplexer.
    pub fn from_config(
        config: &ClientConfig,
        factory: Arc<dyn ChannelFactory>,
        writer: Arc<dyn RpcWriter>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let connection = Connection::new(
            factory,
            config.endpoint.clone(),
            config.connection.clone(),
        );
        Self::new(connection, writer, identity, config.programs.clone())
    }

    pub(crate) fn fetch(&self, address: &RecordAddress) -> Result<Option<RecordSnapshot>> {
        self.connection.channel()?.fetch_account(address)
    }

    pub(crate) fn query(
        &self,
        program_id: &RecordAddress,
        filters: &[RecordFilter],
    ) -> Result<Vec<RecordSnapshot>> {
        self.connection
            .channel()?
            .query_program_accounts(program_id, filters)
    }

    pub(crate) fn submit(&self, request: MutationRequest) -> Result<TransactionRef> {
        let name = request.instruction.name;
        let tx = self.writer.submit(&request)?;
        debug!(instruction = name, %tx, "mutation submitted");
        Ok(tx)
    }
}

/// Identity, connection and reload signals a store drains on each pump.
pub(crate) struct StoreEvents {
    identity: Receiver<Option<RecordAddress>>,
    generations: Receiver<u64>,
    identity_pending: AtomicBool,
    reload_pending: AtomicBool,
}

impl StoreEvents {
    /// Subscribe to `ctx`'s signals. The current identity counts as a change
    /// so the first pump resolves it.
    pub(crate) fn new(ctx: &StoreContext) -> Self {
        Self {
            identity: ctx.identity.watch(),
            generations: ctx.connection.watch(),
            identity_pending: AtomicBool::new(true),
            reload_pending: AtomicBool::new(false),
        }
    }

    /// True if the identity changed since the last call. Bursts collapse
    /// into one change; the store reads the latest key itself.
    pub(crate) fn take_identity_change(&self) -> bool {
        let mut changed = self.identity_pending.swap(false, Ordering::SeqCst);
        while self.identity.try_recv().is_ok() {
            changed = true;
        }
        changed
    }

    /// True if the channel was replaced since the last call.
    pub(crate) fn take_reconnect(&self) -> bool {
        let mut changed = false;
        while self.generations.try_recv().is_ok() {
            changed = true;
        }
        changed
    }

    pub(crate) fn request_reload(&self) {
        self.reload_pending.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_reload(&self) -> bool {
        self.reload_pending.swap(false, Ordering::SeqCst)
    }
}
