//! Background thread that keeps a store pumped.

use crate::error::Result;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Something that processes its ready events when asked.
pub trait Pump: Send + Sync {
    /// Process every ready event; returns how many were handled.
    fn pump(&self) -> usize;
}

/// Pumps a store on a dedicated thread until dropped.
pub struct StoreDriver {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StoreDriver {
    /// Start pumping `store`, sleeping `idle` whenever nothing was ready.
    pub fn spawn(name: &str, store: Arc<dyn Pump>, idle: Duration) -> Result<Self> {
        let (stop, stopped) = bounded::<()>(1);
        let thread_name = format!("store-{name}");
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(thread = %thread_name, "store driver started");
                loop {
                    let handled = store.pump();
                    if handled > 0 {
                        trace!(handled, "pumped");
                        continue;
                    }
                    match stopped.recv_timeout(idle) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(thread = %thread_name, "store driver stopped");
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for the current pump to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StoreDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
