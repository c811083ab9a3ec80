//! Integration tests for subscription sharing and teardown.

use chainview::testing::{address, ChannelCall, MemoryChannel, MemoryChannelFactory};
use chainview::{
    ClientError, Commitment, Connection, ConnectionConfig, RecordFilter, RecordSnapshot,
    Subscription, SubscriptionMultiplexer,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

const ENDPOINT: &str = "mem://local";

fn setup() -> (Arc<MemoryChannel>, SubscriptionMultiplexer) {
    let factory = Arc::new(MemoryChannelFactory::new());
    let channel = factory.channel(ENDPOINT);
    let connection = Connection::new(
        factory,
        Some(ENDPOINT.to_string()),
        ConnectionConfig::default(),
    );
    (channel, SubscriptionMultiplexer::new(connection))
}

fn program_calls(channel: &MemoryChannel) -> Vec<ChannelCall> {
    channel
        .calls()
        .into_iter()
        .filter(|call| {
            matches!(
                call,
                ChannelCall::SubscribeProgram { .. } | ChannelCall::UnsubscribeProgram { .. }
            )
        })
        .collect()
}

// --- Sharing ---

#[test]
fn test_two_consumers_one_program_subscription() {
    let (channel, mux) = setup();
    let program = address(50);
    let owner = address(51);

    let first = mux
        .subscribe_program(program, None, vec![RecordFilter::DataSize(100)])
        .unwrap();
    let second = mux
        .subscribe_program(program, None, vec![RecordFilter::DataSize(100)])
        .unwrap();
    assert_eq!(program_calls(&channel).len(), 1);
    assert_eq!(channel.open_subscriptions(), 1);

    // A 100-byte record owned by the program, then its deletion
    channel.put_record(program, RecordSnapshot::new(owner, 10, vec![0; 100], 1));
    channel.close_record(&owner, 2);

    for consumer in [&first, &second] {
        let seen = consumer.drain();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].is_deleted());
        assert_eq!(seen[1].address, owner);
    }

    drop(first);
    assert_eq!(channel.open_subscriptions(), 1);
    assert_eq!(program_calls(&channel).len(), 1);

    drop(second);
    assert_eq!(channel.open_subscriptions(), 0);
    let calls = program_calls(&channel);
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], ChannelCall::SubscribeProgram { .. }));
    assert!(matches!(calls[1], ChannelCall::UnsubscribeProgram { .. }));
}

#[test]
fn test_filter_order_and_duplicates_share() {
    let (channel, mux) = setup();
    let program = address(50);
    let size = RecordFilter::DataSize(8);
    let owner = RecordFilter::address_at(8, &address(1));

    let _a = mux
        .subscribe_program(program, None, vec![size.clone(), owner.clone()])
        .unwrap();
    let _b = mux
        .subscribe_program(program, None, vec![owner.clone(), size.clone(), owner])
        .unwrap();

    assert_eq!(mux.active_subscriptions(), 1);
    assert_eq!(channel.open_subscriptions(), 1);
}

#[test]
fn test_commitment_separates_program_keys() {
    let (channel, mux) = setup();
    let program = address(50);

    let confirmed = mux.subscribe_program(program, None, vec![]).unwrap();
    let explicit = mux
        .subscribe_program(program, Some(Commitment::Confirmed), vec![])
        .unwrap();
    let finalized = mux
        .subscribe_program(program, Some(Commitment::Finalized), vec![])
        .unwrap();

    assert_eq!(confirmed.key(), explicit.key());
    assert_ne!(confirmed.key(), finalized.key());
    assert_eq!(channel.open_subscriptions(), 2);
}

#[test]
fn test_account_and_program_keys_are_independent() {
    let (channel, mux) = setup();
    let _account = mux.subscribe_account(address(1)).unwrap();
    let _program = mux.subscribe_program(address(1), None, vec![]).unwrap();
    assert_eq!(channel.open_subscriptions(), 2);
    assert_eq!(mux.keys().len(), 2);
}

// --- Delivery ---

#[test]
fn test_late_joiner_sees_only_later_notifications() {
    let (channel, mux) = setup();
    let early = mux.subscribe_account(address(1)).unwrap();
    channel.emit(RecordSnapshot::new(address(1), 5, vec![1], 1));

    let late = mux.subscribe_account(address(1)).unwrap();
    channel.emit(RecordSnapshot::new(address(1), 5, vec![2], 2));

    assert_eq!(early.drain().len(), 2);
    let seen = late.drain();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].slot, 2);
}

#[test]
fn test_other_addresses_not_delivered() {
    let (channel, mux) = setup();
    let sub = mux.subscribe_account(address(1)).unwrap();
    channel.emit(RecordSnapshot::new(address(2), 5, vec![1], 1));
    assert!(sub.drain().is_empty());
}

#[test]
fn test_detached_consumer_stops_receiving() {
    let (channel, mux) = setup();
    let stay = mux.subscribe_account(address(1)).unwrap();
    let leave = mux.subscribe_account(address(1)).unwrap();
    let receiver = leave.receiver().clone();

    leave.unsubscribe();
    channel.emit(RecordSnapshot::new(address(1), 5, vec![1], 1));

    assert_eq!(stay.drain().len(), 1);
    assert!(receiver.try_recv().is_err());
}

// --- Failure paths ---

#[test]
fn test_duplicate_channel_handle_rejected() {
    let (channel, mux) = setup();
    channel.force_subscription_id(Some(7));

    let first = mux.subscribe_account(address(1)).unwrap();
    let second = mux.subscribe_account(address(2));
    assert!(matches!(second, Err(ClientError::DuplicateSubscription(_))));

    // The owner of the handle is untouched and never unsubscribed
    assert_eq!(mux.active_subscriptions(), 1);
    assert_eq!(mux.subscriber_count(first.key()), 1);
    assert!(!channel
        .calls()
        .iter()
        .any(|call| matches!(call, ChannelCall::UnsubscribeAccount { .. })));
}

#[test]
fn test_subscribe_after_disconnect() {
    let (_, mux) = setup();
    let live = mux.subscribe_account(address(1)).unwrap();

    mux.connection().set_endpoint(None);
    assert!(matches!(
        mux.subscribe_account(address(1)),
        Err(ClientError::NotConnected)
    ));
    // Existing handle is still valid until dropped
    assert_eq!(mux.active_subscriptions(), 1);
    drop(live);
    assert_eq!(mux.active_subscriptions(), 0);
}

// --- Concurrency ---

#[test]
fn test_concurrent_subscribers_share_one_subscription() {
    let (channel, mux) = setup();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let mux = mux.clone();
            thread::spawn(move || {
                let mut held: Vec<Subscription> = Vec::new();
                for _ in 0..50 {
                    held.push(mux.subscribe_account(address(1)).unwrap());
                    if held.len() > 3 {
                        held.remove(0);
                    }
                }
                held
            })
        })
        .collect();

    let held: Vec<Subscription> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(channel.open_subscriptions(), 1);
    assert_eq!(mux.subscriber_count(held[0].key()), held.len());

    drop(held);
    assert_eq!(channel.open_subscriptions(), 0);
}

// --- Properties ---

#[derive(Debug, Clone)]
enum Op {
    Subscribe(u8),
    Drop(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..3).prop_map(Op::Subscribe),
        (0usize..16).prop_map(Op::Drop),
    ]
}

/// Never more than one open underlying subscription per address.
fn max_open_per_address(calls: &[ChannelCall]) -> usize {
    use std::collections::HashMap;
    let mut owner = HashMap::new();
    let mut open: HashMap<_, usize> = HashMap::new();
    let mut worst = 0;
    for call in calls {
        match call {
            ChannelCall::SubscribeAccount { id, address, .. } => {
                owner.insert(*id, *address);
                let count = open.entry(*address).or_default();
                *count += 1;
                worst = worst.max(*count);
            }
            ChannelCall::UnsubscribeAccount { id } => {
                if let Some(address) = owner.remove(id) {
                    *open.entry(address).or_default() -= 1;
                }
            }
            _ => {}
        }
    }
    worst
}

proptest! {
    #[test]
    fn prop_singleton_per_key(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let (channel, mux) = setup();
        let mut held: Vec<Subscription> = Vec::new();

        for op in ops {
            match op {
                Op::Subscribe(n) => held.push(mux.subscribe_account(address(n)).unwrap()),
                Op::Drop(i) if !held.is_empty() => {
                    let index = i % held.len();
                    drop(held.swap_remove(index));
                }
                Op::Drop(_) => {}
            }

            let live_keys: std::collections::HashSet<_> =
                held.iter().map(|sub| sub.key().clone()).collect();
            prop_assert_eq!(mux.active_subscriptions(), live_keys.len());
            prop_assert_eq!(channel.open_subscriptions(), live_keys.len());
        }

        prop_assert!(max_open_per_address(&channel.calls()) <= 1);
        drop(held);
        prop_assert_eq!(channel.open_subscriptions(), 0);
    }
}
