//! Store for one selected check and its escrow.

use super::commands::{CommandOutcome, CommandQueue, Outcomes};
use super::driver::Pump;
use super::state::EntityState;
use super::{StoreContext, StoreEvents};
use crate::error::{ClientError, Result};
use crate::programs::check::{self, Check, CreateCheckAccounts, PaymentAccounts};
use crate::programs::decode_account;
use crate::rpc::{MutationRequest, TransactionRef};
use crate::subscriptions::Subscription;
use crate::types::{RecordAddress, RecordSnapshot};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckView {
    pub authority: Option<RecordAddress>,
    /// Id of the selected check.
    pub check_id: Option<u64>,
    pub check: EntityState<Check>,
    /// Escrow address and bump of the selected check.
    pub escrow: Option<(RecordAddress, u8)>,
}

impl CheckView {
    pub fn remaining(&self) -> Option<u64> {
        self.check.entity().map(Check::remaining)
    }

    pub fn is_settled(&self) -> bool {
        self.check.entity().is_some_and(Check::is_settled)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckCommand {
    Select {
        check_id: u64,
    },
    Create {
        total: u64,
        token_mint: RecordAddress,
        receiver: RecordAddress,
    },
    SubmitPayment {
        amount: u64,
        payer: RecordAddress,
        receiver: RecordAddress,
        token_mint: RecordAddress,
    },
}

/// Tracks the check selected by id and submits payments against it.
///
/// Creating a check triggers a reload; payments rely on the account
/// subscription.
pub struct CheckStore {
    ctx: StoreContext,
    events: StoreEvents,
    commands: CommandQueue<CheckCommand>,
    outcomes: Outcomes<CheckCommand>,
    view: RwLock<CheckView>,
    subscription: Mutex<Option<Subscription>>,
    pump_lock: Mutex<()>,
}

impl CheckStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            events: StoreEvents::new(&ctx),
            ctx,
            commands: CommandQueue::new(),
            outcomes: Outcomes::new(),
            view: RwLock::new(CheckView::default()),
            subscription: Mutex::new(None),
            pump_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> CheckView {
        self.view.read().clone()
    }

    /// Outcome of every mutation executed from now on. Selections report
    /// nothing.
    pub fn outcomes(&self) -> Receiver<CommandOutcome<CheckCommand>> {
        self.outcomes.subscribe()
    }

    /// Track the check with `check_id`.
    pub fn select_check(&self, check_id: u64) {
        self.commands.push(CheckCommand::Select { check_id });
    }

    /// Create the selected check, owed `total` of `token_mint`, settling
    /// into the `receiver` token account.
    pub fn create_check(&self, total: u64, token_mint: RecordAddress, receiver: RecordAddress) {
        self.commands.push(CheckCommand::Create {
            total,
            token_mint,
            receiver,
        });
    }

    /// Pay `amount` from the `payer` token account into the escrow.
    pub fn submit_payment(
        &self,
        amount: u64,
        payer: RecordAddress,
        receiver: RecordAddress,
        token_mint: RecordAddress,
    ) {
        self.commands.push(CheckCommand::SubmitPayment {
            amount,
            payer,
            receiver,
            token_mint,
        });
    }

    pub fn reload(&self) {
        self.events.request_reload();
    }

    fn program_id(&self) -> RecordAddress {
        self.ctx.programs.check
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
                warn!(error = %e, "check reload failed");
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
            if let CheckCommand::Select { check_id } = command {
                if let Err(e) = self.select(check_id) {
                    warn!(check_id, error = %e, "check selection failed");
                }
                continue;
            }
            let result = self.mutate(command.clone());
            if let Err(e) = &result {
                error!(?command, error = %e, "check command failed");
            }
            self.outcomes.publish(command, result);
        }

        handled
    }

    /// The check address doesn't depend on the identity, but the entity is
    /// still re-read so nothing from the previous identity's session lingers.
    /// Returns false if the key is unchanged and nothing was redone.
    fn resolve_identity(&self) -> bool {
        let authority = self.ctx.identity.public_key();
        let resolved = {
            let mut view = self.view.write();
            if view.authority == authority {
                return false;
            }
            view.authority = authority;
            if let Some((address, bump)) = view.check.derivation() {
                view.check = EntityState::resolving(address, bump);
            }
            view.check.address().is_some()
        };
        debug!(authority = ?authority, "check identity resolved");
        if resolved {
            self.resubscribe();
        }
        true
    }

    fn select(&self, check_id: u64) -> Result<()> {
        let program_id = self.program_id();
        let (address, bump) = check::check_address(&program_id, check_id)?;
        let escrow = check::escrow_address(&program_id, &address)?;
        {
            let mut view = self.view.write();
            view.check_id = Some(check_id);
            view.check = EntityState::resolving(address, bump);
            view.escrow = Some(escrow);
        }
        info!(check_id, %address, "check selected");
        self.resubscribe();
        Ok(())
    }

    fn resubscribe(&self) {
        let Some(address) = self.view.read().check.address() else {
            return;
        };
        let mut slot = self.subscription.lock();
        slot.take();
        match self.ctx.multiplexer.subscribe_account(address) {
            Ok(subscription) => *slot = Some(subscription),
            Err(e) => warn!(%address, error = %e, "check subscribe failed"),
        }
        drop(slot);
        self.events.request_reload();
    }

    fn refresh(&self) -> Result<()> {
        let Some(address) = self.view.read().check.address() else {
            return Ok(());
        };
        let fetched = self.ctx.fetch(&address)?;
        let mut view = self.view.write();
        if view.check.address() != Some(address) {
            return Ok(());
        }
        if view
            .check
            .apply_fetch(fetched.as_ref(), decode_account::<Check>)?
        {
            debug!(%address, remaining = ?view.remaining(), "check reloaded");
        }
        Ok(())
    }

    fn apply(&self, snapshot: &RecordSnapshot) {
        let mut view = self.view.write();
        match view.check.apply(snapshot, decode_account::<Check>) {
            Ok(true) => debug!(address = %snapshot.address, slot = snapshot.slot, remaining = ?view.remaining(), "check updated"),
            Ok(false) => {}
            Err(e) => warn!(address = %snapshot.address, error = %e, "check notification dropped"),
        }
    }

    fn mutate(&self, command: CheckCommand) -> Result<TransactionRef> {
        let (authority, check_id, (check, check_bump), (escrow, escrow_bump)) =
            self.prerequisites()?;
        match command {
            CheckCommand::Select { .. } => Err(ClientError::Mutation(
                "selecting a check is not a mutation".to_string(),
            )),
            CheckCommand::Create {
                total,
                token_mint,
                receiver,
            } => {
                let accounts = CreateCheckAccounts {
                    check,
                    escrow,
                    token_mint,
                    receiver,
                    authority,
                };
                let instruction = check::create_check(
                    self.program_id(),
                    &accounts,
                    check_id,
                    check_bump,
                    escrow_bump,
                    total,
                )?;
                let tx = self.ctx.submit(MutationRequest::new(instruction))?;
                self.events.request_reload();
                Ok(tx)
            }
            CheckCommand::SubmitPayment {
                amount,
                payer,
                receiver,
                token_mint,
            } => {
                let accounts = PaymentAccounts {
                    check,
                    escrow,
                    token_mint,
                    authority,
                    payer,
                    receiver,
                };
                let instruction =
                    check::submit_partial_payment(self.program_id(), &accounts, amount)?;
                self.ctx.submit(MutationRequest::new(instruction))
            }
        }
    }

    /// Identity, check id, check derivation and escrow derivation.
    fn prerequisites(&self) -> Result<(RecordAddress, u64, (RecordAddress, u8), (RecordAddress, u8))> {
        let view = self.view.read();
        let authority = view
            .authority
            .ok_or(ClientError::MissingPrerequisite("identity"))?;
        let check_id = view
            .check_id
            .ok_or(ClientError::MissingPrerequisite("selected check"))?;
        let derivation = view
            .check
            .derivation()
            .ok_or(ClientError::MissingPrerequisite("check address"))?;
        let escrow = view
            .escrow
            .ok_or(ClientError::MissingPrerequisite("escrow address"))?;
        Ok((authority, check_id, derivation, escrow))
    }
}

impl Pump for CheckStore {
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
