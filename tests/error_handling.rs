//! Error handling tests: every failure surfaces as a typed error instead of
//! a panic.

use chainview::programs::counter_manager::Counter;
use chainview::programs::tracker::TrackerAccount;
use chainview::programs::{decode_account, DISCRIMINATOR_LEN};
use chainview::testing::{address, MemoryChannelFactory};
use chainview::{
    create_program_address, find_program_address, ClientConfig, ClientError, Connection,
    ConnectionConfig, RecordAddress, SubscriptionMultiplexer,
};
use std::sync::Arc;

// --- Decode errors ---

#[test]
fn test_decode_short_data() {
    let result = decode_account::<Counter>(&[1, 2, 3]);
    assert!(matches!(result, Err(ClientError::Decode { .. })));
}

#[test]
fn test_decode_wrong_discriminator() {
    let data = vec![0u8; DISCRIMINATOR_LEN + 35];
    match decode_account::<Counter>(&data) {
        Err(ClientError::Decode { account, .. }) => assert_eq!(account, "Counter"),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_decode_truncated_body() {
    let mut data = chainview::programs::account_discriminator("Counter").to_vec();
    data.extend_from_slice(&[7u8; 10]);
    assert!(matches!(
        decode_account::<Counter>(&data),
        Err(ClientError::Decode { .. })
    ));
}

#[test]
fn test_unknown_tracker_record() {
    let err = TrackerAccount::decode(&[9u8; 64]).unwrap_err();
    assert!(err.to_string().contains("unknown discriminator"));
}

// --- Address errors ---

#[test]
fn test_invalid_base58_address() {
    let result = "not-base58-0OIl".parse::<RecordAddress>();
    assert!(matches!(result, Err(ClientError::InvalidAddress(_))));
}

#[test]
fn test_wrong_length_address() {
    let short = bs58::encode([1u8; 16]).into_string();
    assert!(matches!(
        short.parse::<RecordAddress>(),
        Err(ClientError::InvalidAddress(_))
    ));
    assert!(RecordAddress::from_slice(&[1u8; 31]).is_err());
}

#[test]
fn test_too_many_seeds() {
    let seed: &[u8] = b"x";
    let seeds = vec![seed; 17];
    assert!(matches!(
        find_program_address(&seeds, &address(1)),
        Err(ClientError::Derivation(_))
    ));
}

#[test]
fn test_seed_too_long() {
    let long = [0u8; 33];
    assert!(matches!(
        create_program_address(&[&long[..]], &address(1)),
        Err(ClientError::Derivation(_))
    ));
}

// --- Connection errors ---

#[test]
fn test_failed_connect_is_not_connected() {
    let factory = Arc::new(MemoryChannelFactory::new());
    factory.fail_connects(true);
    let connection = Connection::new(
        factory.clone(),
        Some("mem://down".to_string()),
        ConnectionConfig::default(),
    );

    assert!(!connection.is_connected());
    assert!(matches!(connection.channel(), Err(ClientError::NotConnected)));

    let mux = SubscriptionMultiplexer::new(connection.clone());
    assert!(matches!(
        mux.subscribe_account(address(1)),
        Err(ClientError::NotConnected)
    ));

    // Recovers once the endpoint is reachable
    factory.fail_connects(false);
    connection.set_endpoint(Some("mem://up".to_string()));
    assert!(mux.subscribe_account(address(1)).is_ok());
}

#[test]
fn test_rejected_subscribe_leaves_no_entry() {
    let factory = Arc::new(MemoryChannelFactory::new());
    let channel = factory.channel("mem://local");
    let mux = SubscriptionMultiplexer::new(Connection::new(
        factory,
        Some("mem://local".to_string()),
        ConnectionConfig::default(),
    ));

    channel.fail_subscribes(true);
    assert!(matches!(
        mux.subscribe_account(address(1)),
        Err(ClientError::Channel(_))
    ));
    assert_eq!(mux.active_subscriptions(), 0);

    channel.fail_subscribes(false);
    let sub = mux.subscribe_account(address(1)).unwrap();
    assert_eq!(mux.subscriber_count(sub.key()), 1);
}

// --- Config errors ---

#[test]
fn test_malformed_config() {
    assert!(matches!(
        ClientConfig::from_json("{ not json"),
        Err(ClientError::Config(_))
    ));
}

#[test]
fn test_config_with_bad_program_id() {
    let json = r#"{ "programs": { "counter_manager": "xyz", "tracker": "xyz", "check": "xyz" } }"#;
    assert!(matches!(
        ClientConfig::from_json(json),
        Err(ClientError::Config(_))
    ));
}

#[test]
fn test_missing_config_file() {
    assert!(matches!(
        ClientConfig::load("/nonexistent/chainview.json"),
        Err(ClientError::Io(_))
    ));
}

#[test]
fn test_error_display() {
    let err = ClientError::MissingPrerequisite("identity");
    assert_eq!(err.to_string(), "Missing prerequisite: identity");
    let err = ClientError::decode("Check", "too short");
    assert_eq!(err.to_string(), "Failed to decode Check: too short");
}
