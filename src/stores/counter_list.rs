//! Store for every keypair counter the identity owns.

use super::commands::{CommandOutcome, CommandQueue, Outcomes};
use super::driver::Pump;
use super::{StoreContext, StoreEvents};
use crate::error::{ClientError, Result};
use crate::programs::counter::{self, Counter};
use crate::programs::decode_account;
use crate::rpc::{MutationRequest, TransactionRef};
use crate::subscriptions::Subscription;
use crate::types::{RecordAddress, RecordSnapshot};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterEntry {
    pub address: RecordAddress,
    pub counter: Counter,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CounterListView {
    pub authority: Option<RecordAddress>,
    /// Ordered by address.
    pub counters: Vec<CounterEntry>,
}

impl CounterListView {
    pub fn value(&self, address: &RecordAddress) -> Option<u16> {
        self.counters
            .iter()
            .find(|entry| entry.address == *address)
            .map(|entry| entry.counter.data)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterListCommand {
    Init,
    Increment { counter: RecordAddress },
}

#[derive(Default)]
struct Counters {
    authority: Option<RecordAddress>,
    by_address: BTreeMap<RecordAddress, Counter>,
}

impl Counters {
    fn reset(&mut self, authority: Option<RecordAddress>) {
        self.authority = authority;
        self.by_address.clear();
    }

    /// Returns whether anything changed.
    fn apply(&mut self, snapshot: &RecordSnapshot) -> Result<bool> {
        if snapshot.is_deleted() {
            return Ok(self.by_address.remove(&snapshot.address).is_some());
        }
        let counter = decode_account::<Counter>(&snapshot.data)?;
        if Some(counter.authority) != self.authority {
            return Ok(false);
        }
        Ok(self.by_address.insert(snapshot.address, counter.clone()) != Some(counter))
    }

    /// Replace everything with a full read. Counters that fail to decode
    /// keep their previous value.
    fn replace_all(&mut self, snapshots: &[RecordSnapshot]) {
        let mut by_address = BTreeMap::new();
        for snapshot in snapshots {
            match decode_account::<Counter>(&snapshot.data) {
                Ok(counter) => {
                    by_address.insert(snapshot.address, counter);
                }
                Err(e) => {
                    warn!(address = %snapshot.address, error = %e, "counter record skipped");
                    if let Some(counter) = self.by_address.get(&snapshot.address) {
                        by_address.insert(snapshot.address, counter.clone());
                    }
                }
            }
        }
        self.by_address = by_address;
    }

    fn view(&self) -> CounterListView {
        CounterListView {
            authority: self.authority,
            counters: self
                .by_address
                .iter()
                .map(|(address, counter)| CounterEntry {
                    address: *address,
                    counter: counter.clone(),
                })
                .collect(),
        }
    }
}

/// Tracks the identity's counters through one program subscription
/// filtered on the authority.
///
/// Successful mutations trigger a reload.
pub struct CounterListStore {
    ctx: StoreContext,
    events: StoreEvents,
    commands: CommandQueue<CounterListCommand>,
    outcomes: Outcomes<CounterListCommand>,
    counters: RwLock<Counters>,
    view: RwLock<CounterListView>,
    subscription: Mutex<Option<Subscription>>,
    pump_lock: Mutex<()>,
}

impl CounterListStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            events: StoreEvents::new(&ctx),
            ctx,
            commands: CommandQueue::new(),
            outcomes: Outcomes::new(),
            counters: RwLock::new(Counters::default()),
            view: RwLock::new(CounterListView::default()),
            subscription: Mutex::new(None),
            pump_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> CounterListView {
        self.view.read().clone()
    }

    /// Outcome of every command executed from now on.
    pub fn outcomes(&self) -> Receiver<CommandOutcome<CounterListCommand>> {
        self.outcomes.subscribe()
    }

    /// Create a counter at a fresh address.
    pub fn init_counter(&self) {
        self.commands.push(CounterListCommand::Init);
    }

    pub fn increment_counter(&self, counter: RecordAddress) {
        self.commands.push(CounterListCommand::Increment { counter });
    }

    pub fn reload(&self) {
        self.events.request_reload();
    }

    fn program_id(&self) -> RecordAddress {
        self.ctx.programs.counter
    }

    fn pump_once(&self) -> usize {
        let mut handled = 0;

        let mut resolved = false;
        if self.events.take_identity_change() {
            handled += 1;
            resolved = self.resolve_identity();
        }
        if self.events.take_reconnect() {
            handled += 1;
            if !resolved {
                self.resubscribe();
            }
        }
        if self.events.take_reload() {
            handled += 1;
            if let Err(e) = self.refresh() {
                warn!(error = %e, "counter list reload failed");
            }
        }

        let notifications = self
            .subscription
            .lock()
            .as_ref()
            .map(Subscription::drain)
            .unwrap_or_default();
        if !notifications.is_empty() {
            handled += notifications.len();
            self.apply_all(&notifications);
        }

        while let Some(command) = self.commands.try_pop() {
            handled += 1;
            let result = self.execute(command);
            match &result {
                Ok(_) => self.events.request_reload(),
                Err(e) => error!(?command, error = %e, "counter list command failed"),
            }
            self.outcomes.publish(command, result);
        }

        handled
    }

    /// Start over for the current identity. Returns false if the key is
    /// unchanged.
    fn resolve_identity(&self) -> bool {
        let authority = self.ctx.identity.public_key();
        if authority == self.counters.read().authority {
            return false;
        }
        self.subscription.lock().take();
        self.counters.write().reset(authority);
        self.publish();
        debug!(authority = ?authority, "counter list identity resolved");
        if authority.is_some() {
            self.resubscribe();
        }
        true
    }

    fn resubscribe(&self) {
        let Some(authority) = self.counters.read().authority else {
            return;
        };
        let mut slot = self.subscription.lock();
        slot.take();
        match self.ctx.multiplexer.subscribe_program(
            self.program_id(),
            None,
            vec![counter::owned_by(&authority)],
        ) {
            Ok(subscription) => *slot = Some(subscription),
            Err(e) => warn!(%authority, error = %e, "counter list subscribe failed"),
        }
        drop(slot);
        self.events.request_reload();
    }

    fn refresh(&self) -> Result<()> {
        let Some(authority) = self.counters.read().authority else {
            return Ok(());
        };
        let snapshots = self
            .ctx
            .query(&self.program_id(), &[counter::owned_by(&authority)])?;
        {
            let mut counters = self.counters.write();
            if counters.authority != Some(authority) {
                return Ok(());
            }
            counters.replace_all(&snapshots);
        }
        self.publish();
        info!(counters = self.view.read().counters.len(), "counter list reloaded");
        Ok(())
    }

    fn apply_all(&self, snapshots: &[RecordSnapshot]) {
        let mut changed = false;
        {
            let mut counters = self.counters.write();
            for snapshot in snapshots {
                match counters.apply(snapshot) {
                    Ok(applied) => changed |= applied,
                    Err(e) => {
                        warn!(address = %snapshot.address, error = %e, "counter notification dropped")
                    }
                }
            }
        }
        if changed {
            self.publish();
        }
    }

    fn publish(&self) {
        let view = self.counters.read().view();
        *self.view.write() = view;
    }

    fn execute(&self, command: CounterListCommand) -> Result<TransactionRef> {
        let authority = self
            .counters
            .read()
            .authority
            .ok_or(ClientError::MissingPrerequisite("identity"))?;
        let program_id = self.program_id();

        let request = match command {
            CounterListCommand::Init => {
                let address = self.ctx.writer.new_signer()?;
                MutationRequest::new(counter::init(program_id, address, authority)?)
                    .with_signer(address)
            }
            CounterListCommand::Increment { counter: address } => {
                if !self.counters.read().by_address.contains_key(&address) {
                    return Err(ClientError::MissingPrerequisite("counter"));
                }
                MutationRequest::new(counter::increment(program_id, address, authority)?)
            }
        };
        self.ctx.submit(request)
    }
}

impl Pump for CounterListStore {
    fn pump(&self) -> usize {
        let _guard = self.pump_lock.lock();
        let mut total = 0;
        loop {
            let handled = self.pump_once();
            if handled == 0 {
                return total;
            }
            total += handled;
        }
    }
}
