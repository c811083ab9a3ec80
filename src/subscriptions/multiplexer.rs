//! Subscription multiplexer.
//!
//! Shares one underlying channel subscription among every consumer asking
//! for the same key, fans notifications out to each of them, and tears the
//! underlying subscription down when the last consumer detaches.

use super::fingerprint::fingerprint;
use super::types::{SubscriberId, Subscription, SubscriptionKey, TableKey};
use crate::channel::{ChannelSubscriptionId, NotificationSink, RecordChannel};
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::types::{Commitment, RecordAddress, RecordFilter, RecordSnapshot};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Consumers attached to one underlying subscription.
///
/// Kept behind its own lock so channel callbacks never touch the table.
#[derive(Default)]
struct FanOut {
    subscribers: Mutex<Vec<(SubscriberId, Sender<RecordSnapshot>)>>,
}

impl FanOut {
    fn attach(&self, id: SubscriberId, sender: Sender<RecordSnapshot>) {
        self.subscribers.lock().push((id, sender));
    }

    /// Returns false if `id` was not attached.
    fn detach(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    fn deliver(&self, snapshot: RecordSnapshot) {
        let subscribers = self.subscribers.lock();
        for (_, sender) in subscribers.iter() {
            // A disconnected receiver is mid-drop and about to detach
            let _ = sender.send(snapshot.clone());
        }
    }
}

/// One live underlying subscription.
struct Entry {
    channel_id: ChannelSubscriptionId,
    channel: Arc<dyn RecordChannel>,
    fan_out: Arc<FanOut>,
    subscribers: usize,
}

pub(crate) struct MultiplexerInner {
    connection: Connection,
    table: Mutex<HashMap<TableKey, Entry>>,
    next_id: AtomicU64,
}

impl MultiplexerInner {
    /// Release one consumer; tear down the underlying subscription if it
    /// was the last.
    pub(crate) fn detach(&self, slot: &TableKey, id: SubscriberId) {
        let mut table = self.table.lock();

        let Some(entry) = table.get_mut(slot) else {
            return;
        };
        if !entry.fan_out.detach(id) {
            return;
        }
        entry.subscribers -= 1;
        debug!(key = %slot.key, remaining = entry.subscribers, "subscriber detached");

        if entry.subscribers == 0 {
            if let Some(entry) = table.remove(slot) {
                // Unsubscribe under the table lock so a concurrent subscribe
                // for the same key can't open before this one closes.
                teardown(&slot.key, &entry);
            }
        }
    }
}

impl Drop for MultiplexerInner {
    fn drop(&mut self) {
        for (slot, entry) in self.table.get_mut().drain() {
            teardown(&slot.key, &entry);
        }
    }
}

fn teardown(key: &SubscriptionKey, entry: &Entry) {
    let result = match key {
        SubscriptionKey::Account(_) => entry.channel.unsubscribe_account(entry.channel_id),
        SubscriptionKey::Program { .. } => {
            entry.channel.unsubscribe_program_accounts(entry.channel_id)
        }
    };
    match result {
        Ok(()) => debug!(%key, channel_id = entry.channel_id.0, "underlying unsubscribe"),
        Err(e) => warn!(%key, channel_id = entry.channel_id.0, error = %e, "underlying unsubscribe failed"),
    }
}

/// Deduplicating fan-out over the connection's record channel.
#[derive(Clone)]
pub struct SubscriptionMultiplexer {
    inner: Arc<MultiplexerInner>,
}

impl SubscriptionMultiplexer {
    pub fn new(connection: Connection) -> Self {
        Self {
            inner: Arc::new(MultiplexerInner {
                connection,
                table: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Subscribe to changes of a single record.
    pub fn subscribe_account(&self, address: RecordAddress) -> Result<Subscription> {
        self.subscribe(SubscriptionKey::Account(address), |channel, commitment, sink| {
            channel.subscribe_account(&address, commitment, sink)
        })
    }

    /// Subscribe to changes of any record `program_id` owns that matches
    /// every filter. `None` commitment uses the connection's.
    pub fn subscribe_program(
        &self,
        program_id: RecordAddress,
        commitment: Option<Commitment>,
        filters: Vec<RecordFilter>,
    ) -> Result<Subscription> {
        let commitment =
            commitment.unwrap_or_else(|| self.inner.connection.config().commitment);
        let key = SubscriptionKey::Program {
            program_id,
            commitment,
            fingerprint: fingerprint(&program_id, &filters),
        };
        self.subscribe(key, move |channel, _, sink| {
            channel.subscribe_program_accounts(&program_id, commitment, &filters, sink)
        })
    }

    fn subscribe<F>(&self, key: SubscriptionKey, open: F) -> Result<Subscription>
    where
        F: FnOnce(&dyn RecordChannel, Commitment, NotificationSink) -> Result<ChannelSubscriptionId>,
    {
        let (generation, channel) = self.inner.connection.current()?;
        let slot = TableKey { generation, key };
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = unbounded();

        let mut table = self.inner.table.lock();

        if let Some(entry) = table.get_mut(&slot) {
            entry.fan_out.attach(id, sender);
            entry.subscribers += 1;
            debug!(key = %slot.key, subscribers = entry.subscribers, "joined shared subscription");
        } else {
            let fan_out = Arc::new(FanOut::default());
            // Attach before opening so nothing pushed during subscribe is lost
            fan_out.attach(id, sender);

            let target = Arc::clone(&fan_out);
            let sink: NotificationSink = Arc::new(move |snapshot| target.deliver(snapshot));
            let commitment = self.inner.connection.config().commitment;
            let channel_id = open(channel.as_ref(), commitment, sink)?;

            if let Some((owner, _)) = table.iter().find(|(other, entry)| {
                other.generation == generation
                    && Arc::ptr_eq(&entry.channel, &channel)
                    && entry.channel_id == channel_id
                    && same_kind(&other.key, &slot.key)
            }) {
                // The channel handed out a handle another key already owns.
                // Leave the table untouched; unsubscribing would kill the owner.
                error!(key = %slot.key, owner = %owner.key, channel_id = channel_id.0, "duplicate underlying subscription handle");
                return Err(ClientError::DuplicateSubscription(slot.key.to_string()));
            }

            debug!(key = %slot.key, channel_id = channel_id.0, generation, "underlying subscribe");
            table.insert(
                slot.clone(),
                Entry {
                    channel_id,
                    channel,
                    fan_out,
                    subscribers: 1,
                },
            );
        }

        Ok(Subscription {
            id,
            slot,
            receiver,
            owner: Arc::downgrade(&self.inner),
        })
    }

    /// Number of live underlying subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.table.lock().len()
    }

    /// Consumers attached to `key` on the current connection generation.
    pub fn subscriber_count(&self, key: &SubscriptionKey) -> usize {
        let slot = TableKey {
            generation: self.inner.connection.generation(),
            key: key.clone(),
        };
        self.inner
            .table
            .lock()
            .get(&slot)
            .map_or(0, |entry| entry.subscribers)
    }

    /// Keys with a live underlying subscription, any generation.
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.inner
            .table
            .lock()
            .keys()
            .map(|slot| slot.key.clone())
            .collect()
    }
}

fn same_kind(a: &SubscriptionKey, b: &SubscriptionKey) -> bool {
    matches!(
        (a, b),
        (SubscriptionKey::Account(_), SubscriptionKey::Account(_))
            | (SubscriptionKey::Program { .. }, SubscriptionKey::Program { .. })
    )
}
