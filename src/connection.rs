//! Connection lifecycle.
//!
//! Owns the current endpoint and config and rebuilds the channel whenever
//! either changes. Each rebuild bumps the generation; consumers that hold
//! subscriptions on an older generation must re-subscribe.

use crate::channel::{ChannelFactory, RecordChannel};
use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ConnectionState {
    endpoint: Option<String>,
    config: ConnectionConfig,
    channel: Option<Arc<dyn RecordChannel>>,
    generation: u64,
}

struct ConnectionInner {
    factory: Arc<dyn ChannelFactory>,
    state: RwLock<ConnectionState>,
    watchers: Mutex<Vec<Sender<u64>>>,
}

/// Shared handle to the current channel.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection and open the initial channel.
    ///
    /// A failed initial connect is logged and leaves the connection without
    /// a channel; operations then fail with [`ClientError::NotConnected`].
    pub fn new(
        factory: Arc<dyn ChannelFactory>,
        endpoint: Option<String>,
        config: ConnectionConfig,
    ) -> Self {
        let channel = open_channel(factory.as_ref(), endpoint.as_deref(), &config);
        Self {
            inner: Arc::new(ConnectionInner {
                factory,
                state: RwLock::new(ConnectionState {
                    endpoint,
                    config,
                    channel,
                    generation: 0,
                }),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current channel, or `NotConnected`.
    pub fn channel(&self) -> Result<Arc<dyn RecordChannel>> {
        self.current().map(|(_, channel)| channel)
    }

    /// Current generation together with its channel.
    pub fn current(&self) -> Result<(u64, Arc<dyn RecordChannel>)> {
        let state = self.inner.state.read();
        state
            .channel
            .as_ref()
            .map(|channel| (state.generation, Arc::clone(channel)))
            .ok_or(ClientError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.read().channel.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.read().generation
    }

    pub fn endpoint(&self) -> Option<String> {
        self.inner.state.read().endpoint.clone()
    }

    pub fn config(&self) -> ConnectionConfig {
        self.inner.state.read().config.clone()
    }

    /// Switch endpoint. No-op when unchanged.
    pub fn set_endpoint(&self, endpoint: Option<String>) {
        let changed = {
            let mut state = self.inner.state.write();
            if state.endpoint == endpoint {
                false
            } else {
                state.endpoint = endpoint;
                true
            }
        };
        if changed {
            self.reconnect();
        }
    }

    /// Switch config. No-op when unchanged.
    pub fn set_config(&self, config: ConnectionConfig) {
        let changed = {
            let mut state = self.inner.state.write();
            if state.config == config {
                false
            } else {
                state.config = config;
                true
            }
        };
        if changed {
            self.reconnect();
        }
    }

    /// Receive the new generation number after every channel replacement.
    pub fn watch(&self) -> Receiver<u64> {
        let (sender, receiver) = unbounded();
        self.inner.watchers.lock().push(sender);
        receiver
    }

    /// Open a channel for the current settings and install it, unless the
    /// settings changed while connecting. The factory runs without the state
    /// lock held; a superseded result is dropped since the change that
    /// superseded it reconnects on its own.
    fn reconnect(&self) {
        let (endpoint, config) = {
            let state = self.inner.state.read();
            (state.endpoint.clone(), state.config.clone())
        };
        let channel = open_channel(self.inner.factory.as_ref(), endpoint.as_deref(), &config);

        let generation = {
            let mut state = self.inner.state.write();
            if state.endpoint != endpoint || state.config != config {
                debug!(?endpoint, "settings changed while connecting, channel dropped");
                return;
            }
            state.channel = channel;
            state.generation += 1;
            info!(
                endpoint = ?state.endpoint,
                generation = state.generation,
                connected = state.channel.is_some(),
                "connection replaced"
            );
            state.generation
        };

        self.inner
            .watchers
            .lock()
            .retain(|watcher| watcher.send(generation).is_ok());
    }
}

fn open_channel(
    factory: &dyn ChannelFactory,
    endpoint: Option<&str>,
    config: &ConnectionConfig,
) -> Option<Arc<dyn RecordChannel>> {
    let endpoint = endpoint?;
    match factory.connect(endpoint, config) {
        Ok(channel) => Some(channel),
        Err(e) => {
            warn!(endpoint, error = %e, "failed to open channel");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryChannelFactory;
    use crate::types::Commitment;

    #[test]
    fn test_connects_on_creation() {
        let factory = Arc::new(MemoryChannelFactory::new());
        let connection = Connection::new(
            factory.clone(),
            Some("http://a".to_string()),
            ConnectionConfig::default(),
        );
        assert!(connection.is_connected());
        assert_eq!(connection.generation(), 0);
        assert_eq!(factory.connect_count(), 1);
    }

    #[test]
    fn test_no_endpoint_means_not_connected() {
        let factory = Arc::new(MemoryChannelFactory::new());
        let connection = Connection::new(factory, None, ConnectionConfig::default());
        assert!(matches!(connection.channel(), Err(ClientError::NotConnected)));
    }

    #[test]
    fn test_endpoint_change_reconnects_and_notifies() {
        let factory = Arc::new(MemoryChannelFactory::new());
        let connection = Connection::new(
            factory.clone(),
            Some("http://a".to_string()),
            ConnectionConfig::default(),
        );
        let watcher = connection.watch();

        connection.set_endpoint(Some("http://b".to_string()));
        assert_eq!(watcher.try_recv().unwrap(), 1);
        assert_eq!(connection.endpoint().as_deref(), Some("http://b"));

        // Same endpoint again: no reconnect
        connection.set_endpoint(Some("http://b".to_string()));
        assert!(watcher.try_recv().is_err());

        connection.set_config(ConnectionConfig {
            commitment: Commitment::Finalized,
        });
        assert_eq!(watcher.try_recv().unwrap(), 2);
        assert_eq!(factory.connect_count(), 3);
    }

    /// Factory that calls back into the connection while connecting.
    struct ReentrantFactory {
        inner: MemoryChannelFactory,
        connection: Mutex<Option<Connection>>,
        redirect: Mutex<Option<(String, String)>>,
        seen_from_other_thread: Mutex<Vec<Option<String>>>,
    }

    impl ReentrantFactory {
        fn new() -> Self {
            Self {
                inner: MemoryChannelFactory::new(),
                connection: Mutex::new(None),
                redirect: Mutex::new(None),
                seen_from_other_thread: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChannelFactory for ReentrantFactory {
        fn connect(
            &self,
            endpoint: &str,
            config: &ConnectionConfig,
        ) -> Result<Arc<dyn RecordChannel>> {
            let connection = self.connection.lock().clone();
            if let Some(connection) = connection {
                // Blocks forever if the state lock is held across connect
                let (tx, rx) = crossbeam_channel::bounded(1);
                let reader = connection.clone();
                std::thread::spawn(move || {
                    let _ = tx.send(reader.endpoint());
                });
                let seen = rx.recv_timeout(std::time::Duration::from_secs(2)).ok();
                self.seen_from_other_thread.lock().push(seen.flatten());

                let redirect = self.redirect.lock().take();
                if let Some((from, to)) = redirect {
                    if from == endpoint {
                        connection.set_endpoint(Some(to));
                    }
                }
            }
            self.inner.connect(endpoint, config)
        }
    }

    #[test]
    fn test_connect_runs_without_state_lock() {
        let factory = Arc::new(ReentrantFactory::new());
        let connection = Connection::new(
            factory.clone(),
            Some("http://a".to_string()),
            ConnectionConfig::default(),
        );
        *factory.connection.lock() = Some(connection.clone());

        connection.set_endpoint(Some("http://b".to_string()));

        assert_eq!(
            *factory.seen_from_other_thread.lock(),
            vec![Some("http://b".to_string())]
        );
        assert_eq!(connection.generation(), 1);
        assert!(connection.is_connected());
    }

    #[test]
    fn test_superseded_connect_is_dropped() {
        let factory = Arc::new(ReentrantFactory::new());
        let connection = Connection::new(
            factory.clone(),
            Some("http://a".to_string()),
            ConnectionConfig::default(),
        );
        *factory.connection.lock() = Some(connection.clone());
        *factory.redirect.lock() = Some(("http://b".to_string(), "http://c".to_string()));
        let watcher = connection.watch();

        // Switching to b switches to c mid-connect; only c gets installed
        connection.set_endpoint(Some("http://b".to_string()));

        assert_eq!(connection.endpoint().as_deref(), Some("http://c"));
        assert_eq!(watcher.try_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(connection.generation(), 1);

        let c = factory.inner.channel("http://c");
        connection
            .channel()
            .unwrap()
            .fetch_account(&crate::testing::address(1))
            .unwrap();
        assert_eq!(c.read_count(), 1);
        assert_eq!(factory.inner.channel("http://b").read_count(), 0);
    }

    #[test]
    fn test_failed_connect_leaves_no_channel() {
        let factory = Arc::new(MemoryChannelFactory::new());
        factory.fail_connects(true);
        let connection = Connection::new(
            factory,
            Some("http://a".to_string()),
            ConnectionConfig::default(),
        );
        assert!(!connection.is_connected());
    }
}
