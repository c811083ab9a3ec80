//! Store for the identity's counter-manager counter.

use super::commands::{CommandOutcome, CommandQueue, Outcomes};
use super::driver::Pump;
use super::state::EntityState;
use super::{StoreContext, StoreEvents};
use crate::error::{ClientError, Result};
use crate::programs::counter_manager::{self, Counter};
use crate::programs::decode_account;
use crate::rpc::{MutationRequest, TransactionRef};
use crate::subscriptions::Subscription;
use crate::types::{RecordAddress, RecordSnapshot};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

/// What the UI sees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CounterView {
    pub authority: Option<RecordAddress>,
    pub counter: EntityState<Counter>,
}

impl CounterView {
    pub fn value(&self) -> Option<u16> {
        self.counter.entity().map(|counter| counter.data)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterCommand {
    Init,
    Increment,
    Delete,
}

/// Tracks the counter at `["counter", identity]`.
///
/// Mutations rely on the account subscription to observe their effect.
pub struct CounterStore {
    ctx: StoreContext,
    events: StoreEvents,
    commands: CommandQueue<CounterCommand>,
    outcomes: Outcomes<CounterCommand>,
    view: RwLock<CounterView>,
    subscription: Mutex<Option<Subscription>>,
    pump_lock: Mutex<()>,
}

impl CounterStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            events: StoreEvents::new(&ctx),
            ctx,
            commands: CommandQueue::new(),
            outcomes: Outcomes::new(),
            view: RwLock::new(CounterView::default()),
            subscription: Mutex::new(None),
            pump_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> CounterView {
        self.view.read().clone()
    }

    /// Outcome of every command executed from now on.
    pub fn outcomes(&self) -> Receiver<CommandOutcome<CounterCommand>> {
        self.outcomes.subscribe()
    }

    /// Create the counter at its derived address.
    pub fn init(&self) {
        self.commands.push(CounterCommand::Init);
    }

    pub fn increment(&self) {
        self.commands.push(CounterCommand::Increment);
    }

    pub fn delete(&self) {
        self.commands.push(CounterCommand::Delete);
    }

    /// Read the counter directly on the next pump.
    pub fn reload(&self) {
        self.events.request_reload();
    }

    fn program_id(&self) -> RecordAddress {
        self.ctx.programs.counter_manager
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
                warn!(error = %e, "counter reload failed");
            }
        }

        let notifications = self
            .subscription
            .lock()
            .as_ref()
            .map(Subscription::drain)
            .unwrap_or_default();
        for snapshot in notifications {
            handled += 1;
            self.apply(&snapshot);
        }

        while let Some(command) = self.commands.try_pop() {
            handled += 1;
            let result = self.execute(command);
            if let Err(e) = &result {
                error!(?command, error = %e, "counter command failed");
            }
            self.outcomes.publish(command, result);
        }

        handled
    }

    /// Re-derive the counter for the current identity. Returns false if the
    /// key is unchanged and nothing was redone.
    fn resolve_identity(&self) -> bool {
        let authority = self.ctx.identity.public_key();
        if authority == self.view.read().authority {
            return false;
        }
        // Old notifications belong to the old address
        self.subscription.lock().take();

        let program_id = self.program_id();
        let counter = match authority {
            Some(authority) => match counter_manager::counter_address(&program_id, &authority) {
                Ok((address, bump)) => EntityState::resolving(address, bump),
                Err(e) => {
                    warn!(%authority, error = %e, "counter address derivation failed");
                    EntityState::Unresolved
                }
            },
            None => EntityState::Unresolved,
        };
        debug!(authority = ?authority, address = ?counter.address(), "counter identity resolved");

        let resolved = counter.address().is_some();
        *self.view.write() = CounterView { authority, counter };
        if resolved {
            self.resubscribe();
        }
        true
    }

    fn resubscribe(&self) {
        let Some(address) = self.view.read().counter.address() else {
            return;
        };
        let mut slot = self.subscription.lock();
        slot.take();
        match self.ctx.multiplexer.subscribe_account(address) {
            Ok(subscription) => *slot = Some(subscription),
            Err(e) => warn!(%address, error = %e, "counter subscribe failed"),
        }
        drop(slot);
        // Anything pushed before the subscription opened was missed
        self.events.request_reload();
    }

    fn refresh(&self) -> Result<()> {
        let Some(address) = self.view.read().counter.address() else {
            return Ok(());
        };
        let fetched = self.ctx.fetch(&address)?;
        let mut view = self.view.write();
        if view.counter.address() != Some(address) {
            return Ok(());
        }
        if view
            .counter
            .apply_fetch(fetched.as_ref(), decode_account::<Counter>)?
        {
            debug!(%address, value = ?view.value(), "counter reloaded");
        }
        Ok(())
    }

    fn apply(&self, snapshot: &RecordSnapshot) {
        let mut view = self.view.write();
        match view.counter.apply(snapshot, decode_account::<Counter>) {
            Ok(true) => debug!(address = %snapshot.address, slot = snapshot.slot, value = ?view.value(), "counter updated"),
            Ok(false) => {}
            Err(e) => warn!(address = %snapshot.address, error = %e, "counter notification dropped"),
        }
    }

    fn execute(&self, command: CounterCommand) -> Result<TransactionRef> {
        let (authority, derivation) = {
            let view = self.view.read();
            (view.authority, view.counter.derivation())
        };
        let authority = authority.ok_or(ClientError::MissingPrerequisite("identity"))?;
        let (address, bump) =
            derivation.ok_or(ClientError::MissingPrerequisite("counter address"))?;

        let program_id = self.program_id();
        let instruction = match command {
            CounterCommand::Init => counter_manager::init(program_id, address, authority, bump)?,
            CounterCommand::Increment => counter_manager::increment(program_id, address, authority)?,
            CounterCommand::Delete => counter_manager::delete(program_id, address, authority)?,
        };
        self.ctx.submit(MutationRequest::new(instruction))
    }
}

impl Pump for CounterStore {
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
