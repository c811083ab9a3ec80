//! In-memory collaborators for tests and local development.
//!
//! - [`MemoryChannel`] keeps records in a map and pushes changes to its
//!   listeners synchronously, in call order
//! - [`RecordingWriter`] records every submitted mutation and can run a hook
//!   to play the chain's part
//! - [`TestIdentity`] is a wallet whose key tests set directly

use crate::channel::{ChannelFactory, ChannelSubscriptionId, NotificationSink, RecordChannel};
use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crate::programs::{encode_account, ProgramAccount};
use crate::rpc::{IdentityProvider, MutationRequest, RpcWriter, TransactionRef};
use crate::types::{matches_all, Commitment, RecordAddress, RecordFilter, RecordSnapshot};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Address filled with `n`.
pub fn address(n: u8) -> RecordAddress {
    RecordAddress([n; 32])
}

/// Lamports given to records created through [`record_of`].
pub const RECORD_LAMPORTS: u64 = 1_000_000;

/// Snapshot of a live record holding `account`.
pub fn record_of<T: ProgramAccount>(address: RecordAddress, account: &T, slot: u64) -> RecordSnapshot {
    let data = encode_account(account).expect("test account encodes");
    RecordSnapshot::new(address, RECORD_LAMPORTS, data, slot)
}

/// Channel operations in the order they were requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelCall {
    SubscribeAccount {
        id: ChannelSubscriptionId,
        address: RecordAddress,
        commitment: Commitment,
    },
    UnsubscribeAccount {
        id: ChannelSubscriptionId,
    },
    SubscribeProgram {
        id: ChannelSubscriptionId,
        program_id: RecordAddress,
        commitment: Commitment,
        filters: Vec<RecordFilter>,
    },
    UnsubscribeProgram {
        id: ChannelSubscriptionId,
    },
    FetchAccount {
        address: RecordAddress,
    },
    QueryProgramAccounts {
        program_id: RecordAddress,
        filters: Vec<RecordFilter>,
    },
}

struct StoredRecord {
    owner: RecordAddress,
    snapshot: RecordSnapshot,
}

struct ProgramListener {
    program_id: RecordAddress,
    filters: Vec<RecordFilter>,
    sink: NotificationSink,
}

#[derive(Default)]
struct ChannelState {
    records: HashMap<RecordAddress, StoredRecord>,
    accounts: HashMap<ChannelSubscriptionId, (RecordAddress, NotificationSink)>,
    programs: HashMap<ChannelSubscriptionId, ProgramListener>,
    calls: Vec<ChannelCall>,
}

/// Record channel backed by a map.
#[derive(Default)]
pub struct MemoryChannel {
    state: Mutex<ChannelState>,
    next_id: AtomicU64,
    forced_id: Mutex<Option<u64>>,
    fail_subscribes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `snapshot` to its account listeners, and to program listeners
    /// when the record's owner is known.
    pub fn emit(&self, snapshot: RecordSnapshot) {
        let sinks = {
            let state = self.state.lock();
            let owner = state.records.get(&snapshot.address).map(|r| r.owner);
            listeners_for(&state, &snapshot, owner, &snapshot.data)
        };
        for sink in sinks {
            sink(snapshot.clone());
        }
    }

    /// Create or replace a record owned by `owner` and notify listeners.
    pub fn put_record(&self, owner: RecordAddress, snapshot: RecordSnapshot) {
        let sinks = {
            let mut state = self.state.lock();
            state.records.insert(
                snapshot.address,
                StoredRecord {
                    owner,
                    snapshot: snapshot.clone(),
                },
            );
            listeners_for(&state, &snapshot, Some(owner), &snapshot.data)
        };
        for sink in sinks {
            sink(snapshot.clone());
        }
    }

    /// Remove a record and push a zero-lamport snapshot.
    ///
    /// Program listeners are matched against the data the record held, and
    /// receive that data with zero lamports.
    pub fn close_record(&self, address: &RecordAddress, slot: u64) {
        let (account_sinks, program_sinks, last_data) = {
            let mut state = self.state.lock();
            let Some(record) = state.records.remove(address) else {
                return;
            };
            let account_sinks = account_listeners(&state, address);
            let program_sinks = program_listeners(&state, &record.owner, &record.snapshot.data);
            (account_sinks, program_sinks, record.snapshot.data)
        };
        for sink in account_sinks {
            sink(RecordSnapshot::new(*address, 0, Vec::new(), slot));
        }
        for sink in program_sinks {
            sink(RecordSnapshot::new(*address, 0, last_data.clone(), slot));
        }
    }

    pub fn record(&self, address: &RecordAddress) -> Option<RecordSnapshot> {
        self.state
            .lock()
            .records
            .get(address)
            .map(|record| record.snapshot.clone())
    }

    /// Live underlying subscriptions of both kinds.
    pub fn open_subscriptions(&self) -> usize {
        let state = self.state.lock();
        state.accounts.len() + state.programs.len()
    }

    pub fn calls(&self) -> Vec<ChannelCall> {
        self.state.lock().calls.clone()
    }

    /// Number of direct reads (fetches and queries) served so far.
    pub fn read_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    ChannelCall::FetchAccount { .. } | ChannelCall::QueryProgramAccounts { .. }
                )
            })
            .count()
    }

    pub fn fail_subscribes(&self, fail: bool) {
        self.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Hand out `id` for every subscribe until cleared, imitating a
    /// transport that reuses handles.
    pub fn force_subscription_id(&self, id: Option<u64>) {
        *self.forced_id.lock() = id;
    }

    fn allocate_id(&self) -> Result<ChannelSubscriptionId> {
        if self.fail_subscribes.load(Ordering::SeqCst) {
            return Err(ClientError::Channel("subscribe rejected".to_string()));
        }
        let id = match *self.forced_id.lock() {
            Some(id) => id,
            None => self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        Ok(ChannelSubscriptionId(id))
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ClientError::Channel("read rejected".to_string()));
        }
        Ok(())
    }
}

fn account_listeners(state: &ChannelState, address: &RecordAddress) -> Vec<NotificationSink> {
    state
        .accounts
        .values()
        .filter(|(watched, _)| watched == address)
        .map(|(_, sink)| Arc::clone(sink))
        .collect()
}

fn program_listeners(
    state: &ChannelState,
    owner: &RecordAddress,
    data: &[u8],
) -> Vec<NotificationSink> {
    state
        .programs
        .values()
        .filter(|listener| listener.program_id == *owner && matches_all(&listener.filters, data))
        .map(|listener| Arc::clone(&listener.sink))
        .collect()
}

fn listeners_for(
    state: &ChannelState,
    snapshot: &RecordSnapshot,
    owner: Option<RecordAddress>,
    data: &[u8],
) -> Vec<NotificationSink> {
    let mut sinks = account_listeners(state, &snapshot.address);
    if let Some(owner) = owner {
        sinks.extend(program_listeners(state, &owner, data));
    }
    sinks
}

impl RecordChannel for MemoryChannel {
    fn subscribe_account(
        &self,
        address: &RecordAddress,
        commitment: Commitment,
        sink: NotificationSink,
    ) -> Result<ChannelSubscriptionId> {
        let id = self.allocate_id()?;
        let mut state = self.state.lock();
        state.accounts.insert(id, (*address, sink));
        state.calls.push(ChannelCall::SubscribeAccount {
            id,
            address: *address,
            commitment,
        });
        Ok(id)
    }

    fn unsubscribe_account(&self, id: ChannelSubscriptionId) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ChannelCall::UnsubscribeAccount { id });
        state
            .accounts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ClientError::Channel(format!("unknown account subscription {id:?}")))
    }

    fn subscribe_program_accounts(
        &self,
        program_id: &RecordAddress,
        commitment: Commitment,
        filters: &[RecordFilter],
        sink: NotificationSink,
    ) -> Result<ChannelSubscriptionId> {
        let id = self.allocate_id()?;
        let mut state = self.state.lock();
        state.programs.insert(
            id,
            ProgramListener {
                program_id: *program_id,
                filters: filters.to_vec(),
                sink,
            },
        );
        state.calls.push(ChannelCall::SubscribeProgram {
            id,
            program_id: *program_id,
            commitment,
            filters: filters.to_vec(),
        });
        Ok(id)
    }

    fn unsubscribe_program_accounts(&self, id: ChannelSubscriptionId) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ChannelCall::UnsubscribeProgram { id });
        state
            .programs
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ClientError::Channel(format!("unknown program subscription {id:?}")))
    }

    fn fetch_account(&self, address: &RecordAddress) -> Result<Option<RecordSnapshot>> {
        let mut state = self.state.lock();
        state.calls.push(ChannelCall::FetchAccount { address: *address });
        self.check_reads()?;
        Ok(state.records.get(address).map(|record| record.snapshot.clone()))
    }

    fn query_program_accounts(
        &self,
        program_id: &RecordAddress,
        filters: &[RecordFilter],
    ) -> Result<Vec<RecordSnapshot>> {
        let mut state = self.state.lock();
        state.calls.push(ChannelCall::QueryProgramAccounts {
            program_id: *program_id,
            filters: filters.to_vec(),
        });
        self.check_reads()?;
        let mut found: Vec<RecordSnapshot> = state
            .records
            .values()
            .filter(|record| {
                record.owner == *program_id && matches_all(filters, &record.snapshot.data)
            })
            .map(|record| record.snapshot.clone())
            .collect();
        found.sort_by_key(|snapshot| snapshot.address);
        Ok(found)
    }
}

/// Hands out one [`MemoryChannel`] per endpoint.
#[derive(Default)]
pub struct MemoryChannelFactory {
    channels: Mutex<HashMap<String, Arc<MemoryChannel>>>,
    connects: AtomicUsize,
    fail_connects: AtomicBool,
}

impl MemoryChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The channel for `endpoint`, created on first use.
    pub fn channel(&self, endpoint: &str) -> Arc<MemoryChannel> {
        Arc::clone(
            self.channels
                .lock()
                .entry(endpoint.to_string())
                .or_insert_with(|| Arc::new(MemoryChannel::new())),
        )
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }
}

impl ChannelFactory for MemoryChannelFactory {
    fn connect(&self, endpoint: &str, _config: &ConnectionConfig) -> Result<Arc<dyn RecordChannel>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(ClientError::Channel(format!("cannot reach {endpoint}")));
        }
        let channel: Arc<dyn RecordChannel> = self.channel(endpoint);
        Ok(channel)
    }
}

type SubmitHook = Box<dyn Fn(&MutationRequest) -> Result<()> + Send + Sync>;

/// Writer that records requests instead of sending them.
#[derive(Default)]
pub struct RecordingWriter {
    requests: Mutex<Vec<MutationRequest>>,
    fail: AtomicBool,
    signers: AtomicU64,
    hook: Mutex<Option<SubmitHook>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successfully submitted requests, in order.
    pub fn requests(&self) -> Vec<MutationRequest> {
        self.requests.lock().clone()
    }

    /// Names of the submitted instructions, in order.
    pub fn instruction_names(&self) -> Vec<&'static str> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.instruction.name)
            .collect()
    }

    pub fn fail_submits(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Run `hook` on every submit before it is recorded. An error from the
    /// hook fails the submit.
    pub fn on_submit<F>(&self, hook: F)
    where
        F: Fn(&MutationRequest) -> Result<()> + Send + Sync + 'static,
    {
        *self.hook.lock() = Some(Box::new(hook));
    }
}

impl RpcWriter for RecordingWriter {
    fn submit(&self, request: &MutationRequest) -> Result<TransactionRef> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Mutation(format!(
                "{} rejected",
                request.instruction.name
            )));
        }
        if let Some(hook) = self.hook.lock().as_ref() {
            hook(request)?;
        }
        let mut requests = self.requests.lock();
        requests.push(request.clone());
        Ok(TransactionRef(format!("tx-{}", requests.len())))
    }

    fn new_signer(&self) -> Result<RecordAddress> {
        let n = self.signers.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0xA5; 32];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        Ok(RecordAddress(bytes))
    }
}

/// Identity whose key is set by the test.
#[derive(Default)]
pub struct TestIdentity {
    key: RwLock<Option<RecordAddress>>,
    watchers: Mutex<Vec<Sender<Option<RecordAddress>>>>,
}

impl TestIdentity {
    pub fn new(key: Option<RecordAddress>) -> Self {
        Self {
            key: RwLock::new(key),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Change the identity and notify watchers.
    pub fn set(&self, key: Option<RecordAddress>) {
        *self.key.write() = key;
        self.watchers
            .lock()
            .retain(|watcher| watcher.send(key).is_ok());
    }
}

impl IdentityProvider for TestIdentity {
    fn public_key(&self) -> Option<RecordAddress> {
        *self.key.read()
    }

    fn watch(&self) -> Receiver<Option<RecordAddress>> {
        let (sender, receiver) = unbounded();
        self.watchers.lock().push(sender);
        receiver
    }
}
