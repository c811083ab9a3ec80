//! Store for the identity's todo lists and their todos.
//!
//! One program subscription filtered on the authority carries changes for
//! both record types, so todos are added, updated and removed in place
//! without re-subscribing per list.

use super::commands::{CommandOutcome, CommandQueue, Outcomes};
use super::driver::Pump;
use super::{StoreContext, StoreEvents};
use crate::error::{ClientError, Result};
use crate::programs::tracker::{self, Todo, TodoList, TrackerAccount};
use crate::rpc::{MutationRequest, TransactionRef};
use crate::subscriptions::Subscription;
use crate::types::{RecordAddress, RecordSnapshot};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TodoView {
    pub address: RecordAddress,
    pub todo: Todo,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TodoListView {
    pub address: RecordAddress,
    pub list: TodoList,
    /// Ordered by creation time.
    pub todos: Vec<TodoView>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackerView {
    pub authority: Option<RecordAddress>,
    /// Ordered by creation time.
    pub todo_lists: Vec<TodoListView>,
}

impl TrackerView {
    pub fn list(&self, address: &RecordAddress) -> Option<&TodoListView> {
        self.todo_lists.iter().find(|list| list.address == *address)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerCommand {
    CreateTodoList { name: String },
    DeleteTodoList { todo_list: RecordAddress },
    CreateTodo { todo_list: RecordAddress, body: String },
    ToggleTodo { todo: RecordAddress },
    DeleteTodo { todo: RecordAddress },
}

/// Decoded records, keyed by address.
#[derive(Default)]
struct Records {
    authority: Option<RecordAddress>,
    lists: BTreeMap<RecordAddress, TodoList>,
    todos: BTreeMap<RecordAddress, Todo>,
}

impl Records {
    fn reset(&mut self, authority: Option<RecordAddress>) {
        self.authority = authority;
        self.lists.clear();
        self.todos.clear();
    }

    /// Returns whether anything changed.
    fn apply(&mut self, snapshot: &RecordSnapshot) -> Result<bool> {
        if snapshot.is_deleted() {
            let removed = self.lists.remove(&snapshot.address).is_some()
                | self.todos.remove(&snapshot.address).is_some();
            return Ok(removed);
        }
        match TrackerAccount::decode(&snapshot.data)? {
            TrackerAccount::TodoList(list) => {
                if Some(list.authority) != self.authority {
                    return Ok(false);
                }
                Ok(self.lists.insert(snapshot.address, list.clone()) != Some(list))
            }
            TrackerAccount::Todo(todo) => {
                if Some(todo.authority) != self.authority {
                    return Ok(false);
                }
                Ok(self.todos.insert(snapshot.address, todo.clone()) != Some(todo))
            }
        }
    }

    /// Replace everything with a full read. Records that fail to decode keep
    /// their previous value.
    fn replace_all(&mut self, snapshots: &[RecordSnapshot]) {
        let mut lists = BTreeMap::new();
        let mut todos = BTreeMap::new();
        for snapshot in snapshots {
            match TrackerAccount::decode(&snapshot.data) {
                Ok(TrackerAccount::TodoList(list)) => {
                    lists.insert(snapshot.address, list);
                }
                Ok(TrackerAccount::Todo(todo)) => {
                    todos.insert(snapshot.address, todo);
                }
                Err(e) => {
                    warn!(address = %snapshot.address, error = %e, "tracker record skipped");
                    if let Some(list) = self.lists.get(&snapshot.address) {
                        lists.insert(snapshot.address, list.clone());
                    }
                    if let Some(todo) = self.todos.get(&snapshot.address) {
                        todos.insert(snapshot.address, todo.clone());
                    }
                }
            }
        }
        self.lists = lists;
        self.todos = todos;
    }

    fn view(&self) -> TrackerView {
        let mut todo_lists: Vec<TodoListView> = self
            .lists
            .iter()
            .map(|(address, list)| {
                let mut todos: Vec<TodoView> = self
                    .todos
                    .iter()
                    .filter(|(_, todo)| todo.todo_list == *address)
                    .map(|(address, todo)| TodoView {
                        address: *address,
                        todo: todo.clone(),
                    })
                    .collect();
                todos.sort_by_key(|view| (view.todo.created_at, view.address));
                TodoListView {
                    address: *address,
                    list: list.clone(),
                    todos,
                }
            })
            .collect();
        todo_lists.sort_by_key(|view| (view.list.created_at, view.address));
        TrackerView {
            authority: self.authority,
            todo_lists,
        }
    }
}

/// Tracks every todo list and todo the identity owns.
///
/// Successful mutations trigger a reload.
pub struct TrackerStore {
    ctx: StoreContext,
    events: StoreEvents,
    commands: CommandQueue<TrackerCommand>,
    outcomes: Outcomes<TrackerCommand>,
    records: RwLock<Records>,
    view: RwLock<TrackerView>,
    subscription: Mutex<Option<Subscription>>,
    pump_lock: Mutex<()>,
}

impl TrackerStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            events: StoreEvents::new(&ctx),
            ctx,
            commands: CommandQueue::new(),
            outcomes: Outcomes::new(),
            records: RwLock::new(Records::default()),
            view: RwLock::new(TrackerView::default()),
            subscription: Mutex::new(None),
            pump_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> TrackerView {
        self.view.read().clone()
    }

    /// Outcome of every command executed from now on.
    pub fn outcomes(&self) -> Receiver<CommandOutcome<TrackerCommand>> {
        self.outcomes.subscribe()
    }

    pub fn create_todo_list(&self, name: impl Into<String>) {
        self.commands
            .push(TrackerCommand::CreateTodoList { name: name.into() });
    }

    pub fn delete_todo_list(&self, todo_list: RecordAddress) {
        self.commands
            .push(TrackerCommand::DeleteTodoList { todo_list });
    }

    pub fn create_todo(&self, todo_list: RecordAddress, body: impl Into<String>) {
        self.commands.push(TrackerCommand::CreateTodo {
            todo_list,
            body: body.into(),
        });
    }

    pub fn toggle_todo(&self, todo: RecordAddress) {
        self.commands.push(TrackerCommand::ToggleTodo { todo });
    }

    pub fn delete_todo(&self, todo: RecordAddress) {
        self.commands.push(TrackerCommand::DeleteTodo { todo });
    }

    pub fn reload(&self) {
        self.events.request_reload();
    }

    fn program_id(&self) -> RecordAddress {
        self.ctx.programs.tracker
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
                warn!(error = %e, "tracker reload failed");
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
            let result = self.execute(command.clone());
            match &result {
                Ok(_) => self.events.request_reload(),
                Err(e) => error!(command = command_name(&command), error = %e, "tracker command failed"),
            }
            self.outcomes.publish(command, result);
        }

        handled
    }

    /// Start over for the current identity. Returns false if the key is
    /// unchanged.
    fn resolve_identity(&self) -> bool {
        let authority = self.ctx.identity.public_key();
        if authority == self.records.read().authority {
            return false;
        }
        self.subscription.lock().take();
        self.records.write().reset(authority);
        self.publish();
        debug!(authority = ?authority, "tracker identity resolved");
        if authority.is_some() {
            self.resubscribe();
        }
        true
    }

    fn resubscribe(&self) {
        let Some(authority) = self.records.read().authority else {
            return;
        };
        let mut slot = self.subscription.lock();
        slot.take();
        match self.ctx.multiplexer.subscribe_program(
            self.program_id(),
            None,
            vec![tracker::owned_by(&authority)],
        ) {
            Ok(subscription) => *slot = Some(subscription),
            Err(e) => warn!(%authority, error = %e, "tracker subscribe failed"),
        }
        drop(slot);
        self.events.request_reload();
    }

    fn refresh(&self) -> Result<()> {
        let Some(authority) = self.records.read().authority else {
            return Ok(());
        };
        let snapshots = self
            .ctx
            .query(&self.program_id(), &[tracker::owned_by(&authority)])?;
        {
            let mut records = self.records.write();
            if records.authority != Some(authority) {
                return Ok(());
            }
            records.replace_all(&snapshots);
        }
        self.publish();
        let view = self.view.read();
        info!(lists = view.todo_lists.len(), "tracker reloaded");
        Ok(())
    }

    fn apply_all(&self, snapshots: &[RecordSnapshot]) {
        let mut changed = false;
        {
            let mut records = self.records.write();
            for snapshot in snapshots {
                match records.apply(snapshot) {
                    Ok(applied) => changed |= applied,
                    Err(e) => {
                        warn!(address = %snapshot.address, error = %e, "tracker notification dropped")
                    }
                }
            }
        }
        if changed {
            self.publish();
        }
    }

    fn publish(&self) {
        let view = self.records.read().view();
        *self.view.write() = view;
    }

    fn execute(&self, command: TrackerCommand) -> Result<TransactionRef> {
        let authority = self
            .records
            .read()
            .authority
            .ok_or(ClientError::MissingPrerequisite("identity"))?;
        let program_id = self.program_id();

        let request = match command {
            TrackerCommand::CreateTodoList { name } => {
                let todo_list = self.ctx.writer.new_signer()?;
                let instruction = tracker::create_todo_list(program_id, todo_list, authority, &name)?;
                MutationRequest::new(instruction).with_signer(todo_list)
            }
            TrackerCommand::DeleteTodoList { todo_list } => {
                MutationRequest::new(tracker::delete_todo_list(program_id, todo_list, authority)?)
            }
            TrackerCommand::CreateTodo { todo_list, body } => {
                let todo = self.ctx.writer.new_signer()?;
                let instruction = tracker::create_todo(program_id, todo_list, todo, authority, &body)?;
                MutationRequest::new(instruction).with_signer(todo)
            }
            TrackerCommand::ToggleTodo { todo } => {
                MutationRequest::new(tracker::toggle_todo(program_id, todo, authority)?)
            }
            TrackerCommand::DeleteTodo { todo } => {
                let todo_list = self
                    .records
                    .read()
                    .todos
                    .get(&todo)
                    .map(|todo| todo.todo_list)
                    .ok_or(ClientError::MissingPrerequisite("todo"))?;
                MutationRequest::new(tracker::delete_todo(program_id, todo_list, todo, authority)?)
            }
        };
        self.ctx.submit(request)
    }
}

fn command_name(command: &TrackerCommand) -> &'static str {
    match command {
        TrackerCommand::CreateTodoList { .. } => "create_todo_list",
        TrackerCommand::DeleteTodoList { .. } => "delete_todo_list",
        TrackerCommand::CreateTodo { .. } => "create_todo",
        TrackerCommand::ToggleTodo { .. } => "toggle_todo",
        TrackerCommand::DeleteTodo { .. } => "delete_todo",
    }
}

impl Pump for TrackerStore {
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
